//! Event loop behind `tmuxdash watch`.
//!
//! Multiplexes the poll timer, background task results, operator commands
//! read line by line, and Ctrl+C. The screen is redrawn only when the
//! dashboard revision moves.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::api::Collaborator;
use crate::app::{BackgroundEvent, Dashboard};
use crate::command::{self, OperatorCommand, HELP};
use crate::view;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Apply one operator command. Feedback that is not part of the dashboard
/// state (help text, unknown names) is written to `out`.
pub fn apply_command<C: Collaborator>(
    app: &mut Dashboard<C>,
    cmd: OperatorCommand,
    out: &mut impl Write,
) -> Result<Flow> {
    match cmd {
        OperatorCommand::Session(name) => {
            if !app.select_session(&name) {
                writeln!(out, "no session '{name}'")?;
            }
        }
        OperatorCommand::Window(id) => {
            if !app.select_window(&id) {
                writeln!(out, "no window '{id}' in the selected session")?;
            }
        }
        OperatorCommand::Pane(id) => {
            if !app.select_pane(&id) {
                writeln!(out, "no pane '{id}'")?;
            }
        }
        // Dispatch failures land in the status banner.
        OperatorCommand::Keys(text) => {
            let _ = app.send_text(&text);
        }
        OperatorCommand::Press(keys) => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let _ = app.send_named_keys(&keys);
        }
        OperatorCommand::Do { action, payload } => {
            let _ = app.submit(&action, payload);
        }
        OperatorCommand::Pause => app.set_input_focused(true),
        OperatorCommand::Resume => app.set_input_focused(false),
        OperatorCommand::Refresh => app.refresh(),
        OperatorCommand::Login { user, password } => app.login(&user, &password),
        OperatorCommand::Logout => app.logout(),
        OperatorCommand::Help => writeln!(out, "{HELP}")?,
        OperatorCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn redraw<C: Collaborator>(app: &Dashboard<C>, out: &mut impl Write, clear: bool) -> Result<()> {
    if clear {
        write!(out, "\x1b[2J\x1b[H")?;
    }
    write!(out, "{}", view::render(app))?;
    out.flush().context("Failed to flush output")
}

/// Run until `quit` or Ctrl+C. The caller has already kicked off the session
/// probe or login; their results arrive on `bg_rx`. Once `input` reaches EOF
/// the loop keeps watching without reading commands.
pub async fn run_watch<C, R, W>(
    app: &mut Dashboard<C>,
    mut bg_rx: mpsc::UnboundedReceiver<BackgroundEvent>,
    input: R,
    out: &mut W,
    clear_screen: bool,
) -> Result<()>
where
    C: Collaborator,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut timer = tokio::time::interval(app.poll_interval());
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; polling starts from authentication instead.
    timer.tick().await;

    let mut lines = input.lines();
    let mut input_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut drawn = None;
    loop {
        if drawn != Some(app.revision()) {
            redraw(app, out, clear_screen)?;
            drawn = Some(app.revision());
        }

        tokio::select! {
            _ = timer.tick() => app.tick(),
            Some(event) = bg_rx.recv() => app.handle_background_event(event),
            line = lines.next_line(), if input_open => match line.context("Failed to read input")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match command::parse(&line) {
                    Ok(cmd) => {
                        debug!(?cmd, "Operator command");
                        if apply_command(app, cmd, out)? == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => writeln!(out, "{e}")?,
                },
                None => {
                    debug!("Input closed, watching only");
                    input_open = false;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}
