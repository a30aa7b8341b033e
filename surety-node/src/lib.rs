//! FlightSurety Node
//!
//! Runtime around the governance, escrow and oracle-consensus rules.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns the engine and the store
//! - **Staged Transitions**: Every operation commits all of its writes or none
//! - **Post-Commit Events**: Subscribers only see events of applied operations
//! - **Pull Payments**: Credit is debited before the transfer and restored if it fails
//!
//! # Invariants
//!
//! - Escrow conservation: balance == Σ(funding) + Σ(premiums) − Σ(paid)
//! - A request closes at most once; a terminal flight status never changes
//! - A passenger is credited at most once per flight

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod clock;
pub mod engine;
pub mod responder;

// Re-exports
pub use actor::{spawn_engine_actor, EngineActor, EngineHandle, EngineMessage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Rules, SuretyEngine};
pub use responder::{OracleFleet, StatusSource};
