//! Selection reconciliation.
//!
//! Every poll replaces the whole tree, so the operator's selection has to be
//! re-resolved against the new snapshot: keep what still exists, fall back
//! deterministically when it does not. Overview and pane views share this one
//! routine; the pane view passes its route pane.

use std::cmp::Ordering;

use crate::model::{Pane, Selection, Session, Snapshot, Window};

/// First run of ASCII digits in `name`, if any.
fn leading_number(name: &str) -> Option<u64> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    // A run too long for u64 still sorts among the numeric names, at the end.
    Some(digits.parse().unwrap_or(u64::MAX))
}

/// Numeric-aware session ordering: names with digits first by that number,
/// then names without digits, lexical within ties.
pub fn compare_session_names(a: &str, b: &str) -> Ordering {
    match (leading_number(a), leading_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sessions in display order (see [`compare_session_names`]).
pub fn sorted_sessions(snapshot: &Snapshot) -> Vec<&Session> {
    let mut sessions: Vec<&Session> = snapshot.tmux.sessions.iter().collect();
    sessions.sort_by(|a, b| compare_session_names(&a.name, &b.name));
    sessions
}

/// Windows by ascending index; equal indexes keep their id order.
pub fn sorted_windows(session: &Session) -> Vec<&Window> {
    let mut windows: Vec<&Window> = session.windows.iter().collect();
    windows.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));
    windows
}

/// Where a pane lives in the snapshot: `(session name, window id)`.
pub fn locate_pane<'a>(snapshot: &'a Snapshot, pane_id: &str) -> Option<(&'a str, &'a str)> {
    snapshot.tmux.sessions.iter().find_map(|session| {
        session
            .windows
            .iter()
            .find(|w| w.pane(pane_id).is_some())
            .map(|w| (session.name.as_str(), w.id.as_str()))
    })
}

/// Compute the next selection for a freshly fetched snapshot.
///
/// `route_pane` is the pane named by the view being shown, if any. It seeds
/// an empty selection and switches the pane fallback to the window's active
/// pane.
pub fn reconcile(snapshot: &Snapshot, prev: &Selection, route_pane: Option<&str>) -> Selection {
    let route_pane = route_pane.filter(|p| !p.is_empty());

    let mut prev = prev.clone();
    if prev.is_empty() {
        if let Some(pane_id) = route_pane {
            if let Some((session, window)) = locate_pane(snapshot, pane_id) {
                prev = Selection::new(session, window, pane_id);
            }
        }
    }

    let sessions = sorted_sessions(snapshot);
    let Some(session) = sessions
        .iter()
        .find(|s| s.name == prev.session)
        .or_else(|| sessions.first())
    else {
        return Selection::default();
    };

    let windows = sorted_windows(session);
    let Some(window) = windows
        .iter()
        .find(|w| w.id == prev.window)
        .or_else(|| windows.first())
    else {
        return Selection::new(session.name.as_str(), "", "");
    };

    let pane = resolve_pane(window, &prev.pane, route_pane.is_some())
        .map(|p| p.id.as_str())
        .unwrap_or_default();

    Selection::new(session.name.as_str(), window.id.as_str(), pane)
}

fn resolve_pane<'a>(window: &'a Window, prev_pane: &str, pane_route: bool) -> Option<&'a Pane> {
    if !prev_pane.is_empty() {
        if let Some(pane) = window.pane(prev_pane) {
            return Some(pane);
        }
    } else if pane_route {
        if let Some(pane) = window.panes.iter().find(|p| p.active) {
            return Some(pane);
        }
    }
    window.panes.first()
}

/// The selected session, if it is still in `snapshot`.
pub fn selected_session<'a>(snapshot: &'a Snapshot, selection: &Selection) -> Option<&'a Session> {
    snapshot.session(&selection.session)
}

pub fn selected_window<'a>(snapshot: &'a Snapshot, selection: &Selection) -> Option<&'a Window> {
    selected_session(snapshot, selection)?.window(&selection.window)
}

/// The selected pane, if its whole path is still in `snapshot`.
pub fn selected_pane<'a>(snapshot: &'a Snapshot, selection: &Selection) -> Option<&'a Pane> {
    selected_window(snapshot, selection)?.pane(&selection.pane)
}

/// Selection for an explicit window pick: the window's active pane, else its first.
pub fn select_window(snapshot: &Snapshot, session: &str, window_id: &str) -> Option<Selection> {
    let window = snapshot.session(session)?.window(window_id)?;
    let pane = window
        .panes
        .iter()
        .find(|p| p.active)
        .or_else(|| window.panes.first())
        .map(|p| p.id.as_str())
        .unwrap_or_default();
    Some(Selection::new(session, window_id, pane))
}

/// Selection for an explicit session pick, resolved down to its first window.
pub fn select_session(snapshot: &Snapshot, session: &str) -> Option<Selection> {
    let found = snapshot.session(session)?;
    Some(reconcile(
        snapshot,
        &Selection::new(found.name.as_str(), "", ""),
        None,
    ))
}

/// Selection for an explicit pane pick anywhere in the tree.
pub fn select_pane(snapshot: &Snapshot, pane_id: &str) -> Option<Selection> {
    let (session, window) = locate_pane(snapshot, pane_id)?;
    Some(Selection::new(session, window, pane_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TmuxState;

    fn pane(id: &str, active: bool) -> Pane {
        Pane {
            id: id.to_string(),
            active,
            ..Default::default()
        }
    }

    fn window(id: &str, index: i64, panes: Vec<Pane>) -> Window {
        Window {
            id: id.to_string(),
            index,
            panes,
            ..Default::default()
        }
    }

    fn session(name: &str, windows: Vec<Window>) -> Session {
        Session {
            name: name.to_string(),
            windows,
            ..Default::default()
        }
    }

    fn snapshot(sessions: Vec<Session>) -> Snapshot {
        Snapshot {
            tmux: TmuxState {
                available: true,
                running: true,
                sessions,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sample() -> Snapshot {
        snapshot(vec![
            session(
                "work",
                vec![
                    window("@4", 3, vec![pane("%7", false), pane("%8", true)]),
                    window("@2", 1, vec![pane("%3", false), pane("%4", true)]),
                ],
            ),
            session("w10", vec![window("@9", 0, vec![pane("%20", true)])]),
            session("w2", vec![window("@5", 0, vec![pane("%11", true)])]),
        ])
    }

    #[test]
    fn test_session_ordering_numeric_then_lexical() {
        let snap = snapshot(vec![
            session("w10", vec![]),
            session("alpha", vec![]),
            session("w2", vec![]),
        ]);
        let names: Vec<&str> = sorted_sessions(&snap).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["w2", "w10", "alpha"]);
    }

    #[test]
    fn test_session_ordering_ties_and_digitless() {
        let mut names = vec!["b2", "zeta", "a2", "x-01", "beta", "dev3-7"];
        names.sort_by(|a, b| compare_session_names(a, b));
        assert_eq!(names, vec!["x-01", "a2", "b2", "dev3-7", "beta", "zeta"]);
    }

    #[test]
    fn test_huge_digit_runs_do_not_panic() {
        assert_eq!(
            compare_session_names("s99999999999999999999999", "s1"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_empty_snapshot_collapses_selection() {
        let prev = Selection::new("work", "@2", "%3");
        assert_eq!(
            reconcile(&snapshot(vec![]), &prev, None),
            Selection::default()
        );
    }

    #[test]
    fn test_initial_selection_uses_sorted_order() {
        let next = reconcile(&sample(), &Selection::default(), None);
        assert_eq!(next, Selection::new("w2", "@5", "%11"));
    }

    #[test]
    fn test_selection_stable_under_noop_refresh() {
        let snap = sample();
        for prev in [
            Selection::new("work", "@4", "%8"),
            Selection::new("work", "@2", "%3"),
            Selection::new("w10", "@9", "%20"),
        ] {
            let once = reconcile(&snap, &prev, None);
            assert_eq!(once, prev);
            assert_eq!(reconcile(&snap.clone(), &once, None), once);
        }
    }

    #[test]
    fn test_vanished_pane_falls_back_to_first_pane_of_window() {
        let prev = Selection::new("work", "@4", "%8");
        let snap = snapshot(vec![session(
            "work",
            vec![window("@4", 3, vec![pane("%7", false), pane("%9", true)])],
        )]);
        assert_eq!(
            reconcile(&snap, &prev, Some("%8")),
            Selection::new("work", "@4", "%7")
        );
    }

    #[test]
    fn test_vanished_window_resets_pane_to_new_window() {
        let prev = Selection::new("work", "@4", "%8");
        let snap = snapshot(vec![session(
            "work",
            vec![
                window("@6", 5, vec![pane("%30", false)]),
                window("@2", 1, vec![pane("%3", false), pane("%8", true)]),
            ],
        )]);
        // %8 moved windows (join-pane); selection follows the window fallback.
        assert_eq!(
            reconcile(&snap, &prev, None),
            Selection::new("work", "@2", "%8")
        );

        let snap = snapshot(vec![session(
            "work",
            vec![window("@2", 1, vec![pane("%3", false)])],
        )]);
        assert_eq!(
            reconcile(&snap, &prev, None),
            Selection::new("work", "@2", "%3")
        );
    }

    #[test]
    fn test_vanished_session_falls_back_to_first_session() {
        let prev = Selection::new("gone", "@1", "%1");
        assert_eq!(
            reconcile(&sample(), &prev, None),
            Selection::new("w2", "@5", "%11")
        );
    }

    #[test]
    fn test_session_without_windows_has_no_window() {
        let snap = snapshot(vec![session("empty", vec![])]);
        assert_eq!(
            reconcile(&snap, &Selection::new("empty", "@1", "%1"), None),
            Selection::new("empty", "", "")
        );
    }

    #[test]
    fn test_window_without_panes_has_no_pane() {
        let snap = snapshot(vec![session("s", vec![window("@1", 0, vec![])])]);
        assert_eq!(
            reconcile(&snap, &Selection::new("s", "@1", "%1"), Some("%1")),
            Selection::new("s", "@1", "")
        );
    }

    #[test]
    fn test_route_pane_seeds_empty_selection() {
        assert_eq!(
            reconcile(&sample(), &Selection::default(), Some("%7")),
            Selection::new("work", "@4", "%7")
        );
    }

    #[test]
    fn test_route_view_prefers_active_pane_when_nothing_selected() {
        // Route pane is not in the tree; the fallback window's active pane wins.
        let next = reconcile(&sample(), &Selection::new("work", "@2", ""), Some("%99"));
        assert_eq!(next, Selection::new("work", "@2", "%4"));

        // Outside a pane route the first pane is used.
        let next = reconcile(&sample(), &Selection::new("work", "@2", ""), None);
        assert_eq!(next, Selection::new("work", "@2", "%3"));
    }

    #[test]
    fn test_reconcile_is_independent_of_input_order() {
        let snap = sample();
        let mut reversed = snap.clone();
        reversed.tmux.sessions.reverse();
        for s in &mut reversed.tmux.sessions {
            s.windows.reverse();
        }
        let prev = Selection::new("gone", "", "");
        assert_eq!(reconcile(&snap, &prev, None), reconcile(&reversed, &prev, None));
    }

    #[test]
    fn test_explicit_picks() {
        let snap = sample();
        assert_eq!(
            select_window(&snap, "work", "@2"),
            Some(Selection::new("work", "@2", "%4"))
        );
        assert_eq!(
            select_session(&snap, "work"),
            Some(Selection::new("work", "@2", "%3"))
        );
        assert_eq!(
            select_pane(&snap, "%20"),
            Some(Selection::new("w10", "@9", "%20"))
        );
        assert_eq!(select_pane(&snap, "%404"), None);
        assert_eq!(select_window(&snap, "work", "@9"), None);
    }

    #[test]
    fn test_selected_lookups() {
        let snap = sample();
        let sel = Selection::new("work", "@4", "%8");
        assert_eq!(selected_window(&snap, &sel).map(|w| w.index), Some(3));
        assert!(selected_pane(&snap, &sel).is_some_and(|p| p.active));
        assert!(selected_pane(&snap, &Selection::new("work", "@2", "%8")).is_none());
    }
}
