//! Core types for the surety engine
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact integer arithmetic for money (wei, no floating point)
//! - Ordered collections so iteration never depends on hashing

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Smallest currency units per whole unit (ether)
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Decimal places of the smallest currency unit
pub const WEI_DECIMALS: u32 = 18;

/// Account identity (20-byte address, rendered as `0x`-prefixed hex)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// Zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create from a small integer (big-endian in the low bytes)
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Parse `0x`-prefixed (or bare) hex
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(digits)
            .map_err(|e| Error::InvalidIdentity(format!("{}: {}", s, e)))?;
        let bytes: [u8; 20] = raw
            .try_into()
            .map_err(|_| Error::InvalidIdentity(format!("{}: expected 20 bytes", s)))?;
        Ok(Self(bytes))
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Amount in the smallest currency unit (wei)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    /// Zero
    pub const ZERO: Amount = Amount(0);

    /// Create from wei
    pub const fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Whole ether
    pub const fn ether(units: u64) -> Self {
        Self(units as u128 * WEI_PER_ETHER)
    }

    /// Convert a decimal ether value, rejecting negatives and sub-wei fractions
    pub fn from_ether(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() {
            return Err(Error::InvalidAmount(format!("{} is negative", value)));
        }

        let value = value.normalize();
        if value.scale() > WEI_DECIMALS {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} decimal places",
                value, WEI_DECIMALS
            )));
        }

        let mantissa = u128::try_from(value.mantissa())
            .map_err(|_| Error::InvalidAmount(value.to_string()))?;
        let factor = 10u128.pow(WEI_DECIMALS - value.scale());
        mantissa
            .checked_mul(factor)
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("{} overflows", value)))
    }

    /// Value in wei
    pub const fn wei(&self) -> u128 {
        self.0
    }

    /// Value in ether, `None` when it does not fit a decimal
    pub fn to_ether(&self) -> Option<Decimal> {
        let wei = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(wei, WEI_DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }

    /// Is zero
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Insurance payout for this premium: `premium + premium / 2`
    pub fn payout(self) -> Option<Amount> {
        self.0.checked_add(self.0 / 2).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_ether() {
            Some(ether) => write!(f, "{} ether", ether),
            None => write!(f, "{} wei", self.0),
        }
    }
}

/// Flight code (e.g. "GA101")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightCode(String);

impl FlightCode {
    /// Create new flight code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlightCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlightCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Flight identity: (airline, code, departure timestamp)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightKey {
    /// Operating airline
    pub airline: Address,
    /// Flight code
    pub code: FlightCode,
    /// Departure (seconds since Unix epoch)
    pub departure: i64,
}

/// Flight status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    /// Not resolved yet
    Unknown = 0,
    /// On time
    OnTime = 10,
    /// Late, airline's fault (the insured event)
    LateAirline = 20,
    /// Late due to weather
    LateWeather = 30,
    /// Late due to technical problems
    LateTechnical = 40,
    /// Late for any other reason
    LateOther = 50,
}

impl StatusCode {
    /// All codes a flight may be resolved to
    pub const TERMINAL: [StatusCode; 5] = [
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    /// Numeric code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse from numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StatusCode::Unknown),
            10 => Some(StatusCode::OnTime),
            20 => Some(StatusCode::LateAirline),
            30 => Some(StatusCode::LateWeather),
            40 => Some(StatusCode::LateTechnical),
            50 => Some(StatusCode::LateOther),
            _ => None,
        }
    }

    /// Anything but `Unknown`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusCode::Unknown)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Airline record
///
/// `votes` is only meaningful while `registered` is false; registration
/// is permanent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    /// Identity
    pub address: Address,
    /// Display name
    pub name: String,
    /// Funding reached the minimum
    pub funded: bool,
    /// Total funding received
    pub funded_amount: Amount,
    /// Admitted to the registry
    pub registered: bool,
    /// Registered airlines that voted to admit this one
    pub votes: BTreeSet<Address>,
}

impl Airline {
    /// Unregistered, unfunded record for an identity
    pub fn candidate(address: Address) -> Self {
        Self {
            address,
            name: String::new(),
            funded: false,
            funded_amount: Amount::ZERO,
            registered: false,
            votes: BTreeSet::new(),
        }
    }

    /// Registered and funded
    pub fn is_active(&self) -> bool {
        self.registered && self.funded
    }
}

/// Registered flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// Identity
    pub key: FlightKey,
    /// Destination
    pub destination: String,
    /// Current status (Unknown until resolved, then frozen)
    pub status: StatusCode,
    /// Always true for stored flights
    pub exists: bool,
}

impl Flight {
    /// New flight in `Unknown` status
    pub fn new(key: FlightKey, destination: impl Into<String>) -> Self {
        Self {
            key,
            destination: destination.into(),
            status: StatusCode::Unknown,
            exists: true,
        }
    }
}

/// Premium held for one flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Accumulated premium
    pub premium: Amount,
    /// Credited after a late-airline resolution
    pub settled: bool,
}

/// Passenger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Identity
    pub address: Address,
    /// Purchases by flight code
    pub purchases: BTreeMap<FlightCode, Purchase>,
    /// Withdrawable balance
    pub credit: Amount,
}

impl Passenger {
    /// Passenger without purchases
    pub fn new(address: Address) -> Self {
        Self {
            address,
            purchases: BTreeMap::new(),
            credit: Amount::ZERO,
        }
    }
}

/// Oracle index slot
pub type IndexId = u8;

/// Indexes assigned to every oracle
pub const INDEXES_PER_ORACLE: usize = 3;

/// Registered oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    /// Identity
    pub address: Address,
    /// Assigned at registration, fixed for life
    pub indexes: [IndexId; INDEXES_PER_ORACLE],
}

impl Oracle {
    /// Whether `index` is one of this oracle's slots
    pub fn serves(&self, index: IndexId) -> bool {
        self.indexes.contains(&index)
    }
}

/// Oracle request identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Index slot
    pub index: IndexId,
    /// Airline
    pub airline: Address,
    /// Flight code
    pub flight: FlightCode,
    /// Timestamp supplied by the requester
    pub timestamp: i64,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.index, self.airline, self.flight, self.timestamp
        )
    }
}

/// Oracle request (`Open` until a status reaches quorum, then `Closed`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Identity
    pub key: RequestKey,
    /// Who asked
    pub requester: Address,
    /// Accepting responses
    pub open: bool,
    /// When it was opened (seconds since Unix epoch)
    pub opened_at: i64,
    /// Responders by reported status
    pub responses: BTreeMap<StatusCode, BTreeSet<Address>>,
    /// Status frozen at close
    pub resolved: Option<StatusCode>,
}

impl OracleRequest {
    /// Fresh open request
    pub fn open(key: RequestKey, requester: Address, opened_at: i64) -> Self {
        Self {
            key,
            requester,
            open: true,
            opened_at,
            responses: BTreeMap::new(),
            resolved: None,
        }
    }

    /// Whether `oracle` already answered under any status
    pub fn has_responded(&self, oracle: &Address) -> bool {
        self.responses.values().any(|set| set.contains(oracle))
    }

    /// Number of distinct oracles reporting `status`
    pub fn count(&self, status: StatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }
}

/// Process-wide state outside the entity tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Operational gate
    pub operational: bool,
    /// Administrative identity
    pub admin: Address,
    /// Counter feeding index derivation
    pub index_nonce: u64,
    /// Pooled escrow funds (premiums + airline funding - payouts)
    pub escrow_balance: Amount,
    /// Oracle registration fees
    pub fee_balance: Amount,
    /// Identities allowed to push default statuses
    pub authorized_callers: BTreeSet<Address>,
}

impl Meta {
    /// Genesis meta for an administrator
    pub fn genesis(admin: Address) -> Self {
        Self {
            operational: true,
            admin,
            index_nonce: 0,
            escrow_balance: Amount::ZERO,
            fee_balance: Amount::ZERO,
            authorized_callers: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let address = Address::from_low_u64(0xabcdef);
        let text = address.to_string();
        assert_eq!(text, "0x0000000000000000000000000000000000abcdef");
        assert_eq!(Address::parse(&text).unwrap(), address);
    }

    #[test]
    fn test_address_rejects_short_hex() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("not-hex").is_err());
    }

    #[test]
    fn test_amount_from_ether() {
        assert_eq!(Amount::from_ether(Decimal::from(10)).unwrap(), Amount::ether(10));
        assert_eq!(
            Amount::from_ether(Decimal::new(15, 1)).unwrap().wei(),
            1_500_000_000_000_000_000
        );
        assert!(Amount::from_ether(Decimal::new(-1, 0)).is_err());
        assert!(Amount::from_ether(Decimal::new(1, 19)).is_err());
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::ether(1).to_string(), "1 ether");
        assert_eq!(Amount::ether(1).payout().unwrap().to_string(), "1.5 ether");
    }

    #[test]
    fn test_payout_is_one_and_a_half() {
        assert_eq!(Amount::ether(1).payout(), Some(Amount::from_wei(1_500_000_000_000_000_000)));
        assert_eq!(Amount::ether(3).payout(), Some(Amount::from_wei(4_500_000_000_000_000_000)));
        assert_eq!(Amount::from_wei(u128::MAX).payout(), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusCode::LateAirline.code(), 20);
        assert_eq!(StatusCode::from_code(40), Some(StatusCode::LateTechnical));
        assert_eq!(StatusCode::from_code(41), None);
        assert!(!StatusCode::Unknown.is_terminal());
        assert!(StatusCode::TERMINAL.iter().all(StatusCode::is_terminal));
    }

    #[test]
    fn test_request_counts_distinct_oracles() {
        let key = RequestKey {
            index: 3,
            airline: Address::from_low_u64(1),
            flight: FlightCode::new("GA101"),
            timestamp: 0,
        };
        let mut request = OracleRequest::open(key, Address::from_low_u64(9), 0);
        let oracle = Address::from_low_u64(5);

        request
            .responses
            .entry(StatusCode::LateAirline)
            .or_default()
            .insert(oracle);
        request
            .responses
            .entry(StatusCode::LateAirline)
            .or_default()
            .insert(oracle);

        assert_eq!(request.count(StatusCode::LateAirline), 1);
        assert!(request.has_responded(&oracle));
        assert_eq!(request.count(StatusCode::OnTime), 0);
    }
}
