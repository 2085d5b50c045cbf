//! Library crate for live-match, the reconciliation engine behind a live chess
//! game view: clock extrapolation, snapshot merging, optimistic moves and polling.

pub mod api;
pub mod config;
pub mod dto;
pub mod error;
pub mod rules;
pub mod services;
pub mod state;
