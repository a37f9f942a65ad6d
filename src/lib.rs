//! Client controller for a tmux dashboard backend: live-state polling,
//! selection reconciliation, action dispatch and the session guard.

pub mod api;
pub mod app;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod model;
pub mod poller;
pub mod reconcile;
pub mod runtime;
pub mod view;

#[cfg(test)]
mod testing;
