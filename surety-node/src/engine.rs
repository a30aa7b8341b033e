//! Engine facade
//!
//! One [`SuretyEngine`] owns the store and applies operations one at a time.
//! Each operation runs against a [`Transition`] overlay; only a successful
//! operation is applied, and only then are its events published.

use crate::clock::Clock;
use escrow::{InsuranceEscrow, Payout};
use governance::{Admission, AirlineRegistry, FlightCatalog};
use oracle_consensus::{OracleConsensus, OracleRegistry, ResponseOutcome};
use std::sync::Arc;
use surety_core::{
    Address, Airline, Amount, Config, EngineEvent, Error, Flight, FlightCode, IndexId, Meta,
    Metrics, Oracle, OracleRequest, Purchase, RequestKey, Result, StateStore, StatusCode,
    Transition, INDEXES_PER_ORACLE,
};
use tokio::sync::broadcast;

/// Rule sets resolved from configuration
#[derive(Debug, Clone)]
pub struct Rules {
    /// Airline admission
    pub registry: AirlineRegistry,
    /// Insurance escrow
    pub escrow: InsuranceEscrow,
    /// Oracle registration
    pub oracles: OracleRegistry,
    /// Request lifecycle and quorum
    pub consensus: OracleConsensus,
}

/// Governance, escrow and oracle consensus over one store
pub struct SuretyEngine<S: StateStore> {
    store: S,
    rules: Rules,
    payout: Arc<dyn Payout>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
}

impl<S: StateStore> std::fmt::Debug for SuretyEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuretyEngine")
            .field("rules", &self.rules)
            .field("payout", &self.payout.name())
            .finish()
    }
}

impl<S: StateStore> SuretyEngine<S> {
    /// Open an engine over `store`, applying genesis if the store is empty
    pub fn new(
        store: S,
        config: &Config,
        payout: Arc<dyn Payout>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let policy = config.policy()?;
        let rules = Rules {
            registry: AirlineRegistry::new(&policy),
            escrow: InsuranceEscrow::new(&policy),
            oracles: OracleRegistry::new(&policy),
            consensus: OracleConsensus::new(&policy),
        };
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("Metrics: {}", e)))?;
        let (events, _) = broadcast::channel(config.node.event_capacity.max(1));

        let mut engine = Self {
            store,
            rules,
            payout,
            clock,
            events,
            metrics,
        };

        match engine.store.try_meta()? {
            Some(meta) => {
                tracing::info!(
                    admin = %meta.admin,
                    operational = meta.operational,
                    "Resuming from existing state"
                );
            }
            None => {
                let genesis = &config.genesis;
                engine.stage(false, |rules, tx| {
                    tx.put_meta(Meta::genesis(genesis.admin))?;
                    rules
                        .registry
                        .seed(tx, genesis.first_airline, &genesis.first_airline_name)
                })?;
                tracing::info!(
                    admin = %genesis.admin,
                    first_airline = %genesis.first_airline,
                    "Genesis applied"
                );
            }
        }

        let registered = AirlineRegistry::airlines_count(&engine.store)?;
        engine.metrics.set_registered_airlines(registered);

        Ok(engine)
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Sender side of the event channel, for handles that outlive a borrow
    pub fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Rule sets in force
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back
    pub fn into_store(self) -> S {
        self.store
    }

    /// Run `op` in a transition and apply it on success
    ///
    /// Returns the value and the events that were published.
    fn stage<T, F>(&mut self, gated: bool, op: F) -> Result<(T, Vec<EngineEvent>)>
    where
        F: FnOnce(&Rules, &mut Transition<'_, S>) -> Result<T>,
    {
        let (value, writes, events) = {
            let mut tx = Transition::begin(&self.store);
            if gated {
                require_operational(&tx)?;
            }
            let value = op(&self.rules, &mut tx)?;
            let (writes, events) = tx.finish();
            (value, writes, events)
        };

        if !writes.is_empty() {
            self.store.apply(writes)?;
        }

        for event in &events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }

        Ok((value, events))
    }

    /// Gated operation with metrics
    fn transact<T, F>(&mut self, operation: &'static str, op: F) -> Result<T>
    where
        F: FnOnce(&Rules, &mut Transition<'_, S>) -> Result<T>,
    {
        let result = self.stage(true, op);
        self.observe(operation, result)
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        result: Result<(T, Vec<EngineEvent>)>,
    ) -> Result<T> {
        match result {
            Ok((value, events)) => {
                self.metrics.record_operation(operation);
                for event in &events {
                    match event {
                        EngineEvent::AirlineRegistered { count, .. } => {
                            self.metrics.set_registered_airlines(*count)
                        }
                        EngineEvent::FlightStatusInfo { .. } => self.metrics.record_request_closed(),
                        EngineEvent::PassengerCredited { amount, .. } => {
                            self.metrics.record_credit(amount.wei())
                        }
                        _ => {}
                    }
                }
                Ok(value)
            }
            Err(err) => {
                self.metrics.record_failure(operation, err.kind());
                tracing::warn!(operation, kind = err.kind().as_str(), error = %err, "Operation rejected");
                Err(err)
            }
        }
    }

    // ===== Administration =====

    /// Toggle the operational gate (administrator only, works while closed)
    pub fn set_operating_status(&mut self, caller: Address, operational: bool) -> Result<()> {
        let result = self.stage(false, |_, tx| {
            let mut meta = require_admin(&*tx, &caller)?;
            if meta.operational == operational {
                return Ok(());
            }
            meta.operational = operational;
            tx.put_meta(meta)?;
            tx.emit(EngineEvent::OperatingStatusChanged { operational });
            tracing::info!(operational, "Operating status changed");
            Ok(())
        });
        self.observe("set_operating_status", result)
    }

    /// Current gate value
    pub fn is_operational(&self) -> Result<bool> {
        Ok(self.store.meta()?.operational)
    }

    /// Allow `target` to push default statuses
    pub fn authorize_caller(&mut self, caller: Address, target: Address) -> Result<()> {
        self.transact("authorize_caller", |_, tx| {
            set_authorization(tx, &caller, target, true)
        })
    }

    /// Revoke `target`
    pub fn deauthorize_caller(&mut self, caller: Address, target: Address) -> Result<()> {
        self.transact("deauthorize_caller", |_, tx| {
            set_authorization(tx, &caller, target, false)
        })
    }

    /// Whether `address` may push default statuses
    pub fn is_authorized_caller(&self, address: &Address) -> Result<bool> {
        Ok(self.store.meta()?.authorized_callers.contains(address))
    }

    // ===== Governance =====

    /// Fund `caller`'s airline record
    pub fn fund(&mut self, caller: Address, amount: Amount) -> Result<Airline> {
        self.transact("fund", |rules, tx| rules.registry.fund(tx, caller, amount))
    }

    /// Admit `candidate`
    pub fn register_airline(
        &mut self,
        caller: Address,
        candidate: Address,
        name: &str,
    ) -> Result<Admission> {
        self.transact("register_airline", |rules, tx| {
            rules.registry.register_airline(tx, caller, candidate, name)
        })
    }

    /// Vote for `candidate`
    pub fn vote_airline(&mut self, caller: Address, candidate: Address) -> Result<usize> {
        self.transact("vote_airline", |rules, tx| {
            rules.registry.vote_airline(tx, caller, candidate)
        })
    }

    /// List a flight
    pub fn register_flight(
        &mut self,
        caller: Address,
        code: FlightCode,
        destination: &str,
        departure: i64,
    ) -> Result<Flight> {
        self.transact("register_flight", |_, tx| {
            FlightCatalog::register_flight(tx, caller, code, destination, departure)
        })
    }

    /// Registered airlines
    pub fn airlines_count(&self) -> Result<usize> {
        AirlineRegistry::airlines_count(&self.store)
    }

    /// Whether `address` is a registered airline
    pub fn is_airline(&self, address: &Address) -> Result<bool> {
        AirlineRegistry::is_airline(&self.store, address)
    }

    /// Name of a registered airline
    pub fn airline_name(&self, address: &Address) -> Result<Option<String>> {
        AirlineRegistry::airline_name(&self.store, address)
    }

    /// Full airline record (registered or candidate)
    pub fn airline(&self, address: &Address) -> Result<Option<Airline>> {
        self.store.airline(address)
    }

    /// Whether `code` is registered
    pub fn flight_exists(&self, code: &FlightCode) -> Result<bool> {
        FlightCatalog::flight_exists(&self.store, code)
    }

    /// Status of `code` operated by `airline`
    pub fn view_flight_status(&self, code: &FlightCode, airline: &Address) -> Result<StatusCode> {
        FlightCatalog::view_flight_status(&self.store, code, airline)
    }

    // ===== Escrow =====

    /// Buy insurance
    pub fn buy(&mut self, caller: Address, code: &FlightCode, amount: Amount) -> Result<Purchase> {
        self.transact("buy", |rules, tx| rules.escrow.buy(tx, caller, code, amount))
    }

    /// Credit `passenger` can withdraw
    pub fn credit_to_pay(&self, code: &FlightCode, passenger: &Address) -> Result<Amount> {
        FlightCatalog::require(&self.store, code)?;
        InsuranceEscrow::credit_to_pay(&self.store, passenger)
    }

    /// Withdraw all of `caller`'s credit
    ///
    /// The credit is zeroed and committed before the transfer runs. A failed
    /// transfer is compensated and reported as `TransferFailed`.
    pub fn pay(&mut self, caller: Address, code: &FlightCode) -> Result<Amount> {
        let prepared = self.stage(true, |_, tx| {
            FlightCatalog::require(&*tx, code)?;
            InsuranceEscrow::prepare_withdrawal(tx, caller)
        });
        let amount = match prepared {
            Ok((amount, _)) => amount,
            Err(err) => return self.observe("pay", Err(err)),
        };

        match self.payout.transfer(&caller, amount) {
            Ok(()) => {
                let settled = self.stage(false, |_, tx| {
                    InsuranceEscrow::settle_withdrawal(tx, caller, amount);
                    Ok(amount)
                });
                if settled.is_ok() {
                    self.metrics.record_payment(amount.wei());
                }
                self.observe("pay", settled)
            }
            Err(err) => {
                let reason = match err {
                    Error::TransferFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(passenger = %caller, amount = %amount, reason = %reason, "Transfer failed");

                if let Err(compensation) = self.stage(false, |_, tx| {
                    InsuranceEscrow::restore_credit(tx, caller, amount)
                }) {
                    tracing::error!(
                        passenger = %caller,
                        amount = %amount,
                        error = %compensation,
                        "Compensation failed"
                    );
                    return self.observe("pay", Err(compensation));
                }

                self.observe("pay", Err(Error::TransferFailed(reason)))
            }
        }
    }

    /// Identities that bought insurance
    pub fn passenger_addresses(&self) -> Result<Vec<Address>> {
        InsuranceEscrow::passenger_addresses(&self.store)
    }

    /// Pooled escrow funds (gated like every other escrow call)
    pub fn balance(&self) -> Result<Amount> {
        require_operational(&self.store)?;
        InsuranceEscrow::balance(&self.store)
    }

    /// Oracle registration fees collected
    pub fn fee_balance(&self) -> Result<Amount> {
        Ok(self.store.meta()?.fee_balance)
    }

    // ===== Oracles =====

    /// Register `caller` as an oracle
    pub fn register_oracle(&mut self, caller: Address, fee: Amount) -> Result<Oracle> {
        self.transact("register_oracle", |rules, tx| {
            rules.oracles.register_oracle(tx, caller, fee)
        })
    }

    /// Index slots of `caller`
    pub fn oracle_indexes(&self, caller: &Address) -> Result<[IndexId; INDEXES_PER_ORACLE]> {
        OracleRegistry::oracle_indexes(&self.store, caller)
    }

    /// Ask oracles for the status of `code`
    pub fn fetch_flight_status(
        &mut self,
        caller: Address,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
    ) -> Result<RequestKey> {
        let now = self.clock.now();
        self.transact("fetch_flight_status", |rules, tx| {
            rules
                .consensus
                .fetch_flight_status(tx, caller, airline, code, timestamp, now)
        })
    }

    /// One oracle's answer
    pub fn submit_oracle_response(
        &mut self,
        caller: Address,
        index: IndexId,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        self.transact("submit_oracle_response", |rules, tx| {
            rules
                .consensus
                .submit_oracle_response(tx, caller, index, airline, code, timestamp, status)
        })
    }

    /// Close a timed-out request with a fallback status
    pub fn submit_default_status(
        &mut self,
        caller: Address,
        index: IndexId,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
        status: StatusCode,
    ) -> Result<StatusCode> {
        let now = self.clock.now();
        self.transact("submit_default_status", |rules, tx| {
            rules.consensus.submit_default_status(
                tx, caller, index, airline, code, timestamp, status, now,
            )
        })
    }

    /// Oracle request by key
    pub fn request(&self, key: &RequestKey) -> Result<Option<OracleRequest>> {
        OracleConsensus::request(&self.store, key)
    }
}

fn require_operational<S: StateStore + ?Sized>(store: &S) -> Result<()> {
    if store.meta()?.operational {
        Ok(())
    } else {
        Err(Error::OperationalGateClosed)
    }
}

fn require_admin<S: StateStore + ?Sized>(store: &S, caller: &Address) -> Result<Meta> {
    let meta = store.meta()?;
    if meta.admin != *caller {
        return Err(Error::Unauthorized(format!(
            "{} is not the administrator",
            caller
        )));
    }
    Ok(meta)
}

fn set_authorization<S: StateStore + ?Sized>(
    tx: &mut Transition<'_, S>,
    caller: &Address,
    target: Address,
    authorized: bool,
) -> Result<()> {
    let mut meta = require_admin(&*tx, caller)?;
    let changed = if authorized {
        meta.authorized_callers.insert(target)
    } else {
        meta.authorized_callers.remove(&target)
    };
    if !changed {
        return Ok(());
    }

    tx.put_meta(meta)?;
    tx.emit(EngineEvent::CallerAuthorizationChanged {
        caller: target,
        authorized,
    });
    tracing::info!(caller = %target, authorized, "Caller authorization changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use escrow::RecordingPayout;
    use surety_core::{ErrorKind, MemoryStore};

    const NOW: i64 = 1_700_000_000;

    fn engine_with_clock(clock: ManualClock) -> (SuretyEngine<MemoryStore>, RecordingPayout) {
        let payout = RecordingPayout::new();
        let engine = SuretyEngine::new(
            MemoryStore::new(),
            &Config::default(),
            Arc::new(payout.clone()),
            Arc::new(clock),
        )
        .unwrap();
        (engine, payout)
    }

    fn engine() -> (SuretyEngine<MemoryStore>, RecordingPayout) {
        engine_with_clock(ManualClock::at(NOW))
    }

    fn admin() -> Address {
        Config::default().genesis.admin
    }

    fn seed() -> Address {
        Config::default().genesis.first_airline
    }

    #[test]
    fn test_genesis_state() {
        let (engine, _) = engine();
        assert!(engine.is_operational().unwrap());
        assert_eq!(engine.airlines_count().unwrap(), 1);
        assert_eq!(engine.airline_name(&seed()).unwrap().as_deref(), Some("Garuda Air"));
        assert_eq!(engine.metrics().registered_airlines.get(), 1);
    }

    #[test]
    fn test_genesis_not_repeated() {
        let (mut engine, _) = engine();
        engine.fund(seed(), Amount::ether(10)).unwrap();
        let store = engine.into_store();

        let engine = SuretyEngine::new(
            store,
            &Config::default(),
            Arc::new(RecordingPayout::new()),
            Arc::new(ManualClock::at(0)),
        )
        .unwrap();
        assert!(engine.airline(&seed()).unwrap().unwrap().funded);
    }

    #[test]
    fn test_only_admin_toggles_gate() {
        let (mut engine, _) = engine();
        let err = engine.set_operating_status(seed(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(engine.is_operational().unwrap());

        engine.set_operating_status(admin(), false).unwrap();
        assert!(!engine.is_operational().unwrap());
    }

    #[test]
    fn test_closed_gate_blocks_mutations() {
        let (mut engine, _) = engine();
        engine.set_operating_status(admin(), false).unwrap();

        let err = engine.fund(seed(), Amount::ether(10)).unwrap_err();
        assert_eq!(err.to_string(), "Contract is currently not operational");
        assert_eq!(engine.balance().unwrap_err().kind(), ErrorKind::OperationalGateClosed);
        assert!(!engine.airline(&seed()).unwrap().unwrap().funded);

        engine.set_operating_status(admin(), true).unwrap();
        engine.fund(seed(), Amount::ether(10)).unwrap();
        assert_eq!(engine.balance().unwrap(), Amount::ether(10));
    }

    #[test]
    fn test_events_published_after_commit() {
        let (mut engine, _) = engine();
        let mut events = engine.subscribe();

        engine.fund(seed(), Amount::ether(10)).unwrap();
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::AirlineFunded { funded: true, .. }
        ));

        engine.buy(Address::from_low_u64(50), &FlightCode::new("XX1"), Amount::ether(1))
            .unwrap_err();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_failures_counted_by_kind() {
        let (mut engine, _) = engine();
        engine
            .register_airline(seed(), Address::from_low_u64(3), "Air India")
            .unwrap_err();
        assert_eq!(
            engine
                .metrics()
                .failures_total
                .with_label_values(&["register_airline", "not_funded"])
                .get(),
            1
        );
    }

    #[test]
    fn test_authorized_callers_admin_only() {
        let (mut engine, _) = engine();
        let operator = Address::from_low_u64(77);

        assert_eq!(
            engine.authorize_caller(seed(), operator).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        engine.authorize_caller(admin(), operator).unwrap();
        assert!(engine.is_authorized_caller(&operator).unwrap());
        engine.deauthorize_caller(admin(), operator).unwrap();
        assert!(!engine.is_authorized_caller(&operator).unwrap());
    }

    #[test]
    fn test_pay_compensates_failed_transfer() {
        let clock = ManualClock::at(NOW);
        let (mut engine, payout) = engine_with_clock(clock.clone());
        let passenger = Address::from_low_u64(50);
        let code = FlightCode::new("GA101");

        engine.fund(seed(), Amount::ether(10)).unwrap();
        engine.register_flight(seed(), code.clone(), "NYC", NOW).unwrap();
        engine.buy(passenger, &code, Amount::ether(1)).unwrap();
        engine.authorize_caller(admin(), admin()).unwrap();

        let key = engine.fetch_flight_status(passenger, seed(), &code, NOW).unwrap();
        clock.advance(3600);
        engine
            .submit_default_status(
                admin(),
                key.index,
                seed(),
                &code,
                key.timestamp,
                StatusCode::LateAirline,
            )
            .unwrap();

        let credit = engine.credit_to_pay(&code, &passenger).unwrap();
        assert_eq!(credit, Amount::from_wei(1_500_000_000_000_000_000));

        payout.fail_next(1).unwrap();
        let err = engine.pay(passenger, &code).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransferFailed);
        assert_eq!(engine.credit_to_pay(&code, &passenger).unwrap(), credit);
        assert_eq!(engine.balance().unwrap(), Amount::ether(11));

        assert_eq!(engine.pay(passenger, &code).unwrap(), credit);
        assert_eq!(engine.credit_to_pay(&code, &passenger).unwrap(), Amount::ZERO);
        assert_eq!(payout.total_to(&passenger).unwrap(), credit);
        assert_eq!(
            engine.balance().unwrap(),
            Amount::from_wei(11_000_000_000_000_000_000 - 1_500_000_000_000_000_000)
        );
        assert_eq!(engine.pay(passenger, &code).unwrap_err().kind(), ErrorKind::NoCredit);
    }
}
