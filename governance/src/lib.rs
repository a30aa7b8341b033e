//! Airline governance for FlightSurety
//!
//! Admission control over the airline registry and the flight catalogue:
//!
//! - Below the consensus threshold a funded airline admits candidates directly
//! - From the threshold on, a candidate needs votes from a strict majority of
//!   funded registered airlines
//! - Funding unlocks governance rights once it reaches the minimum
//! - Only registered airlines list flights

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod registry;
pub mod flights;

pub use surety_core::{Error, Result};
pub use registry::{AirlineRegistry, Admission};
pub use flights::FlightCatalog;
