//! FlightSurety Core
//!
//! Shared state model for the flight-delay insurance engine: entity types,
//! the error taxonomy, configuration, and the ledger accessor every
//! operation runs against.
//!
//! # Architecture
//!
//! - **Single store**: every entity lives in one [`StateStore`], passed
//!   explicitly to each operation
//! - **Staged transitions**: operations write to a [`Transition`] overlay;
//!   the write set is applied in one step only on success
//! - **Deterministic**: ordered maps and a stored nonce, so replaying the same
//!   operations yields the same state
//!
//! # Invariants
//!
//! - A registered airline stays registered
//! - A flight status moves from `Unknown` to one terminal code, once
//! - A closed oracle request accepts no further responses
//! - Passenger credit grows only through resolution and drops only to zero

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod storage;
pub mod crypto;
pub mod events;
pub mod metrics;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use types::{
    Address, Airline, Amount, Flight, FlightCode, FlightKey, IndexId, Meta, Oracle,
    OracleRequest, Passenger, Purchase, RequestKey, StatusCode, INDEXES_PER_ORACLE,
};
pub use config::{Config, Policy};
pub use store::{MemoryStore, StateStore, Transition, WriteSet};
pub use storage::RocksStore;
pub use events::EngineEvent;
pub use metrics::Metrics;
