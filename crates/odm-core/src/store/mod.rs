//! Persistent download-job store (SQLite via sqlx).
//!
//! Holds one row per job plus per-object error rows, and keeps the live
//! atomic records registered so `flush` persists their latest counters.
//! After `mark_finished` + `flush` return, the terminal state survives a
//! process restart.

pub mod db;
pub mod jobs;
pub mod types;

#[cfg(test)]
mod tests;

pub use db::JobStore;
pub use types::*;
