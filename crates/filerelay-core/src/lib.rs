//! `filerelay-core` delivers files dropped into a directory to an HTTP
//! endpoint, one at a time, in filename order, at least once.
//!
//! ```text
//! scanner::list_pending ──▶ Engine::run_cycle ──▶ DeliveryClient::send
//!          ▲                      │                       │
//!          │                      ▼                       ▼
//!    ProcessedStore ◀── mark ── FINALIZED ◀── classifier::classify
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod paths;
pub mod schedule;
pub mod scanner;
pub mod store;
pub mod types;

pub use error::{RelayError, Result};
