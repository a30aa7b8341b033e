//! Oracle consensus for FlightSurety
//!
//! Resolves a flight's delay status from independent reporters.
//!
//! # Request lifecycle
//!
//! ```text
//!             fetch_flight_status            quorum / default status
//! Unopened ─────────────────────────> Open ───────────────────────────> Closed
//!                                      │ ^
//!                                      └─┘ submit_oracle_response
//! ```
//!
//! - Every oracle holds three index slots, fixed at registration
//! - A request is published under one index; only oracles serving it answer
//! - The first status reported by `min_responses` distinct oracles closes the
//!   request and, if the flight is still `Unknown`, freezes the flight status
//! - A `LateAirline` resolution credits the flight's insurees

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod quorum;
pub mod registry;
pub mod requests;

pub use surety_core::{Error, Result};
pub use quorum::{reduce, ResponseOutcome};
pub use registry::OracleRegistry;
pub use requests::OracleConsensus;
