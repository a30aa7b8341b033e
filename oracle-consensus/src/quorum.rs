//! Quorum reducer
//!
//! Folds one response at a time into a request's per-status tallies. The
//! first status whose tally reaches the quorum closes the request; nothing
//! is counted after that.

use serde::Serialize;
use surety_core::{Address, OracleRequest, StatusCode};

/// Result of folding one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResponseOutcome {
    /// Counted, quorum not reached
    Accepted {
        /// Distinct oracles reporting this status so far
        count: usize,
    },
    /// Oracle already answered this request, nothing changed
    Duplicate,
    /// Counted and closed the request
    Resolved {
        /// Frozen status
        status: StatusCode,
    },
}

/// Fold `oracle`'s report of `status` into an open request
///
/// Callers check that the request is open; a closed request is returned as
/// a duplicate untouched.
pub fn reduce(
    request: &mut OracleRequest,
    oracle: Address,
    status: StatusCode,
    min_responses: usize,
) -> ResponseOutcome {
    if !request.open || request.has_responded(&oracle) {
        return ResponseOutcome::Duplicate;
    }

    let responders = request.responses.entry(status).or_default();
    responders.insert(oracle);
    let count = responders.len();

    if count >= min_responses {
        request.open = false;
        request.resolved = Some(status);
        ResponseOutcome::Resolved { status }
    } else {
        ResponseOutcome::Accepted { count }
    }
}
