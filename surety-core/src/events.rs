//! Events published by committed transitions
//!
//! `OracleRequested` is the notification channel for off-engine oracle
//! processes; the rest are an audit trail.

use crate::types::{Address, Amount, FlightCode, IndexId, StatusCode};
use serde::Serialize;

/// Engine event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Operational flag toggled
    OperatingStatusChanged {
        /// New value
        operational: bool,
    },

    /// Caller authorization changed
    CallerAuthorizationChanged {
        /// Caller
        caller: Address,
        /// Authorized after the change
        authorized: bool,
    },

    /// Funding received
    AirlineFunded {
        /// Funder
        airline: Address,
        /// Amount received
        amount: Amount,
        /// Running total
        total: Amount,
        /// Minimum reached
        funded: bool,
    },

    /// Vote recorded
    AirlineVoted {
        /// Candidate
        candidate: Address,
        /// Voter
        voter: Address,
        /// Votes after this one
        votes: usize,
    },

    /// Airline admitted
    AirlineRegistered {
        /// Airline
        airline: Address,
        /// Name
        name: String,
        /// Registered by
        sponsor: Address,
        /// Registered airlines after admission
        count: usize,
    },

    /// Flight registered
    FlightRegistered {
        /// Airline
        airline: Address,
        /// Code
        flight: FlightCode,
        /// Destination
        destination: String,
        /// Departure timestamp
        departure: i64,
    },

    /// Premium received
    InsurancePurchased {
        /// Passenger
        passenger: Address,
        /// Flight
        flight: FlightCode,
        /// Premium received
        amount: Amount,
        /// Total premium on this flight
        total: Amount,
    },

    /// Oracle registered
    OracleRegistered {
        /// Oracle
        oracle: Address,
        /// Assigned indexes
        indexes: Vec<IndexId>,
    },

    /// Request opened; oracles serving `index` should respond
    OracleRequested {
        /// Index slot
        index: IndexId,
        /// Airline
        airline: Address,
        /// Flight
        flight: FlightCode,
        /// Request timestamp
        timestamp: i64,
    },

    /// One oracle response accepted
    OracleReport {
        /// Airline
        airline: Address,
        /// Flight
        flight: FlightCode,
        /// Request timestamp
        timestamp: i64,
        /// Reported status
        status: StatusCode,
        /// Reporting oracle
        oracle: Address,
    },

    /// Request closed with a status
    FlightStatusInfo {
        /// Airline
        airline: Address,
        /// Flight
        flight: FlightCode,
        /// Request timestamp
        timestamp: i64,
        /// Frozen status
        status: StatusCode,
    },

    /// Credit accrued after a late-airline resolution
    PassengerCredited {
        /// Passenger
        passenger: Address,
        /// Flight
        flight: FlightCode,
        /// Amount credited
        amount: Amount,
    },

    /// Credit withdrawn
    CreditPaid {
        /// Passenger
        passenger: Address,
        /// Amount transferred
        amount: Amount,
    },
}

impl EngineEvent {
    /// Short name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::OperatingStatusChanged { .. } => "operating_status_changed",
            EngineEvent::CallerAuthorizationChanged { .. } => "caller_authorization_changed",
            EngineEvent::AirlineFunded { .. } => "airline_funded",
            EngineEvent::AirlineVoted { .. } => "airline_voted",
            EngineEvent::AirlineRegistered { .. } => "airline_registered",
            EngineEvent::FlightRegistered { .. } => "flight_registered",
            EngineEvent::InsurancePurchased { .. } => "insurance_purchased",
            EngineEvent::OracleRegistered { .. } => "oracle_registered",
            EngineEvent::OracleRequested { .. } => "oracle_requested",
            EngineEvent::OracleReport { .. } => "oracle_report",
            EngineEvent::FlightStatusInfo { .. } => "flight_status_info",
            EngineEvent::PassengerCredited { .. } => "passenger_credited",
            EngineEvent::CreditPaid { .. } => "credit_paid",
        }
    }
}
