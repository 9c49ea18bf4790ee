//! BSA Server - HTTP boundary for the reconciliation core
//!
//! Serves the external surface:
//! - `GET /api/v1/state?version={v}` — latest or historical snapshot
//! - `POST /api/v1/propose` — submit a change proposal
//! - `GET /health` — operator-facing degraded signal
//!
//! Reconciliation has no external trigger; it is purely timer-driven.

pub mod app;

pub use app::*;
