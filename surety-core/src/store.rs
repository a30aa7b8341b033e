//! Ledger accessor: the state tables every operation reads and writes
//!
//! # Tables
//!
//! - `meta` - operational flag, admin, nonce, pool balances
//! - `airlines` - airline records (key: address)
//! - `flights` - registered flights (key: flight code)
//! - `passengers` - purchases and credit (key: address)
//! - `oracles` - oracle index assignments (key: address)
//! - `requests` - oracle requests (key: index || airline || flight || timestamp)
//!
//! Operations never write to a store directly. They run against a
//! [`Transition`] overlay and the collected [`WriteSet`] is applied in one
//! step only when the operation succeeds.

use crate::events::EngineEvent;
use crate::types::{
    Address, Airline, Flight, FlightCode, Meta, Oracle, OracleRequest, Passenger, RequestKey,
};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Read/apply interface to persistent state
pub trait StateStore {
    /// Process-wide state, `None` before genesis
    fn try_meta(&self) -> Result<Option<Meta>>;

    /// Process-wide state
    fn meta(&self) -> Result<Meta> {
        self.try_meta()?
            .ok_or_else(|| Error::Storage("Meta not initialized".to_string()))
    }

    /// Airline by identity
    fn airline(&self, address: &Address) -> Result<Option<Airline>>;

    /// All airline records (registered or not)
    fn airlines(&self) -> Result<Vec<Airline>>;

    /// Flight by code
    fn flight(&self, code: &FlightCode) -> Result<Option<Flight>>;

    /// All flights
    fn flights(&self) -> Result<Vec<Flight>>;

    /// Passenger by identity
    fn passenger(&self, address: &Address) -> Result<Option<Passenger>>;

    /// All passengers
    fn passengers(&self) -> Result<Vec<Passenger>>;

    /// Oracle by identity
    fn oracle(&self, address: &Address) -> Result<Option<Oracle>>;

    /// Oracle request by key
    fn request(&self, key: &RequestKey) -> Result<Option<OracleRequest>>;

    /// Write meta
    fn put_meta(&mut self, meta: Meta) -> Result<()>;

    /// Write airline
    fn put_airline(&mut self, airline: Airline) -> Result<()>;

    /// Write flight
    fn put_flight(&mut self, flight: Flight) -> Result<()>;

    /// Write passenger
    fn put_passenger(&mut self, passenger: Passenger) -> Result<()>;

    /// Write oracle
    fn put_oracle(&mut self, oracle: Oracle) -> Result<()>;

    /// Write oracle request
    fn put_request(&mut self, request: OracleRequest) -> Result<()>;

    /// Apply a whole transition
    ///
    /// Backends with native batches override this to make the write atomic.
    fn apply(&mut self, writes: WriteSet) -> Result<()> {
        let WriteSet {
            meta,
            airlines,
            flights,
            passengers,
            oracles,
            requests,
        } = writes;

        if let Some(meta) = meta {
            self.put_meta(meta)?;
        }
        for airline in airlines.into_values() {
            self.put_airline(airline)?;
        }
        for flight in flights.into_values() {
            self.put_flight(flight)?;
        }
        for passenger in passengers.into_values() {
            self.put_passenger(passenger)?;
        }
        for oracle in oracles.into_values() {
            self.put_oracle(oracle)?;
        }
        for request in requests.into_values() {
            self.put_request(request)?;
        }

        Ok(())
    }
}

/// Writes collected by one transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    /// Meta replacement
    pub meta: Option<Meta>,
    /// Airline writes
    pub airlines: BTreeMap<Address, Airline>,
    /// Flight writes
    pub flights: BTreeMap<FlightCode, Flight>,
    /// Passenger writes
    pub passengers: BTreeMap<Address, Passenger>,
    /// Oracle writes
    pub oracles: BTreeMap<Address, Oracle>,
    /// Request writes
    pub requests: BTreeMap<RequestKey, OracleRequest>,
}

impl WriteSet {
    /// Number of records written
    pub fn len(&self) -> usize {
        self.meta.is_some() as usize
            + self.airlines.len()
            + self.flights.len()
            + self.passengers.len()
            + self.oracles.len()
            + self.requests.len()
    }

    /// Nothing written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Staged overlay over a store
///
/// Reads see the staged writes first, then the base. Dropping a transition
/// discards everything it staged.
#[derive(Debug)]
pub struct Transition<'a, S: StateStore + ?Sized> {
    base: &'a S,
    writes: WriteSet,
    events: Vec<EngineEvent>,
}

impl<'a, S: StateStore + ?Sized> Transition<'a, S> {
    /// Begin a transition over `base`
    pub fn begin(base: &'a S) -> Self {
        Self {
            base,
            writes: WriteSet::default(),
            events: Vec::new(),
        }
    }

    /// Record an event published when the transition commits
    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Events staged so far
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Split into the write set and the events
    pub fn finish(self) -> (WriteSet, Vec<EngineEvent>) {
        (self.writes, self.events)
    }
}

fn merge<K: Ord + Clone, V: Clone>(
    base: Vec<V>,
    staged: &BTreeMap<K, V>,
    key_of: impl Fn(&V) -> K,
) -> Vec<V> {
    let mut merged: BTreeMap<K, V> = base.into_iter().map(|v| (key_of(&v), v)).collect();
    for (key, value) in staged {
        merged.insert(key.clone(), value.clone());
    }
    merged.into_values().collect()
}

impl<'a, S: StateStore + ?Sized> StateStore for Transition<'a, S> {
    fn try_meta(&self) -> Result<Option<Meta>> {
        match &self.writes.meta {
            Some(meta) => Ok(Some(meta.clone())),
            None => self.base.try_meta(),
        }
    }

    fn airline(&self, address: &Address) -> Result<Option<Airline>> {
        match self.writes.airlines.get(address) {
            Some(airline) => Ok(Some(airline.clone())),
            None => self.base.airline(address),
        }
    }

    fn airlines(&self) -> Result<Vec<Airline>> {
        Ok(merge(self.base.airlines()?, &self.writes.airlines, |a| a.address))
    }

    fn flight(&self, code: &FlightCode) -> Result<Option<Flight>> {
        match self.writes.flights.get(code) {
            Some(flight) => Ok(Some(flight.clone())),
            None => self.base.flight(code),
        }
    }

    fn flights(&self) -> Result<Vec<Flight>> {
        Ok(merge(self.base.flights()?, &self.writes.flights, |f| {
            f.key.code.clone()
        }))
    }

    fn passenger(&self, address: &Address) -> Result<Option<Passenger>> {
        match self.writes.passengers.get(address) {
            Some(passenger) => Ok(Some(passenger.clone())),
            None => self.base.passenger(address),
        }
    }

    fn passengers(&self) -> Result<Vec<Passenger>> {
        Ok(merge(self.base.passengers()?, &self.writes.passengers, |p| {
            p.address
        }))
    }

    fn oracle(&self, address: &Address) -> Result<Option<Oracle>> {
        match self.writes.oracles.get(address) {
            Some(oracle) => Ok(Some(oracle.clone())),
            None => self.base.oracle(address),
        }
    }

    fn request(&self, key: &RequestKey) -> Result<Option<OracleRequest>> {
        match self.writes.requests.get(key) {
            Some(request) => Ok(Some(request.clone())),
            None => self.base.request(key),
        }
    }

    fn put_meta(&mut self, meta: Meta) -> Result<()> {
        self.writes.meta = Some(meta);
        Ok(())
    }

    fn put_airline(&mut self, airline: Airline) -> Result<()> {
        self.writes.airlines.insert(airline.address, airline);
        Ok(())
    }

    fn put_flight(&mut self, flight: Flight) -> Result<()> {
        self.writes.flights.insert(flight.key.code.clone(), flight);
        Ok(())
    }

    fn put_passenger(&mut self, passenger: Passenger) -> Result<()> {
        self.writes.passengers.insert(passenger.address, passenger);
        Ok(())
    }

    fn put_oracle(&mut self, oracle: Oracle) -> Result<()> {
        self.writes.oracles.insert(oracle.address, oracle);
        Ok(())
    }

    fn put_request(&mut self, request: OracleRequest) -> Result<()> {
        self.writes.requests.insert(request.key.clone(), request);
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    meta: Option<Meta>,
    airlines: BTreeMap<Address, Airline>,
    flights: BTreeMap<FlightCode, Flight>,
    passengers: BTreeMap<Address, Passenger>,
    oracles: BTreeMap<Address, Oracle>,
    requests: BTreeMap<RequestKey, OracleRequest>,
}

impl MemoryStore {
    /// Empty store (no meta until genesis)
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn try_meta(&self) -> Result<Option<Meta>> {
        Ok(self.meta.clone())
    }

    fn airline(&self, address: &Address) -> Result<Option<Airline>> {
        Ok(self.airlines.get(address).cloned())
    }

    fn airlines(&self) -> Result<Vec<Airline>> {
        Ok(self.airlines.values().cloned().collect())
    }

    fn flight(&self, code: &FlightCode) -> Result<Option<Flight>> {
        Ok(self.flights.get(code).cloned())
    }

    fn flights(&self) -> Result<Vec<Flight>> {
        Ok(self.flights.values().cloned().collect())
    }

    fn passenger(&self, address: &Address) -> Result<Option<Passenger>> {
        Ok(self.passengers.get(address).cloned())
    }

    fn passengers(&self) -> Result<Vec<Passenger>> {
        Ok(self.passengers.values().cloned().collect())
    }

    fn oracle(&self, address: &Address) -> Result<Option<Oracle>> {
        Ok(self.oracles.get(address).cloned())
    }

    fn request(&self, key: &RequestKey) -> Result<Option<OracleRequest>> {
        Ok(self.requests.get(key).cloned())
    }

    fn put_meta(&mut self, meta: Meta) -> Result<()> {
        self.meta = Some(meta);
        Ok(())
    }

    fn put_airline(&mut self, airline: Airline) -> Result<()> {
        self.airlines.insert(airline.address, airline);
        Ok(())
    }

    fn put_flight(&mut self, flight: Flight) -> Result<()> {
        self.flights.insert(flight.key.code.clone(), flight);
        Ok(())
    }

    fn put_passenger(&mut self, passenger: Passenger) -> Result<()> {
        self.passengers.insert(passenger.address, passenger);
        Ok(())
    }

    fn put_oracle(&mut self, oracle: Oracle) -> Result<()> {
        self.oracles.insert(oracle.address, oracle);
        Ok(())
    }

    fn put_request(&mut self, request: OracleRequest) -> Result<()> {
        self.requests.insert(request.key.clone(), request);
        Ok(())
    }
}
