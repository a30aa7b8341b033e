//! Insurance escrow for FlightSurety
//!
//! Premiums are pooled, not earmarked. A late-airline resolution credits
//! every unsettled purchase on the flight with 1.5x its premium, and a
//! passenger withdraws the whole credit at once.
//!
//! # Withdrawal
//!
//! ```text
//! prepare_withdrawal ──commit──> Payout::transfer ──ok──> settle_withdrawal
//!  (credit = 0, pool -= c)              │
//!                                       └──err──> restore_credit (compensate)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod insurance;
pub mod payout;

pub use surety_core::{Error, Result};
pub use insurance::InsuranceEscrow;
pub use payout::{Payout, RecordingPayout, Transfer};
