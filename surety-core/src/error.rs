//! Error types for the surety engine
//!
//! Every failure aborts the whole operation; nothing is partially applied.

use crate::types::{Address, Amount, FlightCode, IndexId};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required role
    #[error("Caller is not authorized: {0}")]
    Unauthorized(String),

    /// Operational flag is false
    #[error("Contract is currently not operational")]
    OperationalGateClosed,

    /// Caller has not reached the minimum funding
    #[error("Airline does not meet minimum funding to register another airline. Contract governance denied!!!")]
    NotFunded,

    /// Candidate lacks a strict majority
    #[error("Need more than half votes to be registered.")]
    InsufficientVotes {
        /// Votes recorded
        votes: usize,
        /// Funded registered airlines
        electorate: usize,
    },

    /// Premium above the cap
    #[error("Amount cannot exceed {max}")]
    PremiumTooHigh {
        /// Configured cap
        max: Amount,
    },

    /// Nothing to withdraw
    #[error("No credit available to pay")]
    NoCredit,

    /// Flight code already registered
    #[error("Flight already registered: {0}")]
    DuplicateFlight(FlightCode),

    /// Flight code not registered (or owned by another airline)
    #[error("Flight is not registered: {0}")]
    UnknownFlight(FlightCode),

    /// Index is not one of the caller's slots
    #[error("Index does not match oracle request")]
    IndexMismatch {
        /// Index submitted
        index: IndexId,
    },

    /// Request is closed or was never opened
    #[error("Flight or timestamp do not match oracle request")]
    RequestClosed,

    /// Oracle registration fee too low
    #[error("Registration fee is required: {required}, offered {offered}")]
    InsufficientFee {
        /// Configured fee
        required: Amount,
        /// Fee sent
        offered: Amount,
    },

    /// Identity already registered
    #[error("Already registered: {0}")]
    AlreadyRegistered(Address),

    /// Zero or malformed amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed identity
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Invalid status code
    #[error("Invalid status code: {0}")]
    InvalidStatus(String),

    /// Flight already left `Unknown`
    #[error("Flight status already resolved: {0}")]
    FlightResolved(FlightCode),

    /// Pool cannot cover a withdrawal
    #[error("Escrow balance {available} cannot cover {requested}")]
    InsufficientEscrow {
        /// Pooled funds
        available: Amount,
        /// Requested withdrawal
        requested: Amount,
    },

    /// External transfer failed (state was compensated)
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Default status pushed before the request timed out
    #[error("Oracle request has not timed out yet: {remaining_secs}s remaining")]
    RequestNotExpired {
        /// Seconds until the timeout
        remaining_secs: i64,
    },

    /// Arithmetic overflow on an amount
    #[error("Amount overflow: {0}")]
    Overflow(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error discriminant for branching and metrics labels
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    OperationalGateClosed,
    NotFunded,
    InsufficientVotes,
    PremiumTooHigh,
    NoCredit,
    DuplicateFlight,
    UnknownFlight,
    IndexMismatch,
    RequestClosed,
    InsufficientFee,
    AlreadyRegistered,
    InvalidAmount,
    InvalidIdentity,
    InvalidStatus,
    FlightResolved,
    InsufficientEscrow,
    TransferFailed,
    RequestNotExpired,
    Overflow,
    Storage,
    Serialization,
    Config,
    Concurrency,
    Io,
}

impl ErrorKind {
    /// Stable label
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::OperationalGateClosed => "operational_gate_closed",
            ErrorKind::NotFunded => "not_funded",
            ErrorKind::InsufficientVotes => "insufficient_votes",
            ErrorKind::PremiumTooHigh => "premium_too_high",
            ErrorKind::NoCredit => "no_credit",
            ErrorKind::DuplicateFlight => "duplicate_flight",
            ErrorKind::UnknownFlight => "unknown_flight",
            ErrorKind::IndexMismatch => "index_mismatch",
            ErrorKind::RequestClosed => "request_closed",
            ErrorKind::InsufficientFee => "insufficient_fee",
            ErrorKind::AlreadyRegistered => "already_registered",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::InvalidIdentity => "invalid_identity",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::FlightResolved => "flight_resolved",
            ErrorKind::InsufficientEscrow => "insufficient_escrow",
            ErrorKind::TransferFailed => "transfer_failed",
            ErrorKind::RequestNotExpired => "request_not_expired",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Storage => "storage",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Config => "config",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Io => "io",
        }
    }
}

impl Error {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::OperationalGateClosed => ErrorKind::OperationalGateClosed,
            Error::NotFunded => ErrorKind::NotFunded,
            Error::InsufficientVotes { .. } => ErrorKind::InsufficientVotes,
            Error::PremiumTooHigh { .. } => ErrorKind::PremiumTooHigh,
            Error::NoCredit => ErrorKind::NoCredit,
            Error::DuplicateFlight(_) => ErrorKind::DuplicateFlight,
            Error::UnknownFlight(_) => ErrorKind::UnknownFlight,
            Error::IndexMismatch { .. } => ErrorKind::IndexMismatch,
            Error::RequestClosed => ErrorKind::RequestClosed,
            Error::InsufficientFee { .. } => ErrorKind::InsufficientFee,
            Error::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            Error::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Error::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            Error::InvalidStatus(_) => ErrorKind::InvalidStatus,
            Error::FlightResolved(_) => ErrorKind::FlightResolved,
            Error::InsufficientEscrow { .. } => ErrorKind::InsufficientEscrow,
            Error::TransferFailed(_) => ErrorKind::TransferFailed,
            Error::RequestNotExpired { .. } => ErrorKind::RequestNotExpired,
            Error::Overflow(_) => ErrorKind::Overflow,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Config(_) => ErrorKind::Config,
            Error::Concurrency(_) => ErrorKind::Concurrency,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
