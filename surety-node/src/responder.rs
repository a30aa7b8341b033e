//! Simulated oracle fleet
//!
//! Registers a set of oracle identities and answers `OracleRequested`
//! events with the configured status source, the way off-engine oracle
//! processes would.

use crate::actor::EngineHandle;
use oracle_consensus::ResponseOutcome;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use surety_core::{
    Address, Amount, EngineEvent, Error, IndexId, RequestKey, Result, StatusCode,
    INDEXES_PER_ORACLE,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// How simulated oracles pick the status they report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    /// Every oracle reports the same status
    Fixed(StatusCode),
    /// Each report is drawn from the terminal statuses
    Random {
        /// RNG seed
        seed: u64,
    },
}

/// Registered simulated oracles
#[derive(Debug)]
pub struct OracleFleet {
    oracles: Vec<(Address, [IndexId; INDEXES_PER_ORACLE])>,
    source: StatusSource,
    rng: StdRng,
}

impl OracleFleet {
    /// Register `count` oracles with addresses starting at `base`
    pub async fn register(
        handle: &EngineHandle,
        count: usize,
        base: u64,
        fee: Amount,
        source: StatusSource,
    ) -> Result<Self> {
        let mut oracles = Vec::with_capacity(count);
        for n in 0..count as u64 {
            let address = Address::from_low_u64(base + n);
            let oracle = handle.register_oracle(address, fee).await?;
            oracles.push((oracle.address, oracle.indexes));
        }

        let seed = match source {
            StatusSource::Random { seed } => seed,
            StatusSource::Fixed(_) => 0,
        };

        info!(oracles = oracles.len(), source = ?source, "Oracle fleet registered");

        Ok(Self {
            oracles,
            source,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Number of registered oracles
    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    /// True when no oracle was registered
    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    /// Oracles holding `index`
    pub fn serving(&self, index: IndexId) -> Vec<Address> {
        self.oracles
            .iter()
            .filter(|(_, indexes)| indexes.contains(&index))
            .map(|(address, _)| *address)
            .collect()
    }

    fn pick(&mut self) -> StatusCode {
        match self.source {
            StatusSource::Fixed(status) => status,
            StatusSource::Random { .. } => {
                StatusCode::TERMINAL[self.rng.gen_range(0..StatusCode::TERMINAL.len())]
            }
        }
    }

    /// Submit responses for `key` until the request closes
    ///
    /// Returns the resolved status, or `None` when the serving oracles ran
    /// out before a quorum formed.
    pub async fn answer(
        &mut self,
        handle: &EngineHandle,
        key: &RequestKey,
    ) -> Result<Option<StatusCode>> {
        for oracle in self.serving(key.index) {
            let status = self.pick();
            match handle
                .submit_oracle_response(oracle, key.clone(), status)
                .await
            {
                Ok(ResponseOutcome::Resolved { status }) => return Ok(Some(status)),
                Ok(outcome) => debug!(oracle = %oracle, outcome = ?outcome, "Response submitted"),
                Err(Error::RequestClosed) => return Ok(None),
                Err(e @ Error::Concurrency(_)) => return Err(e),
                Err(e) => warn!(oracle = %oracle, error = %e, "Response rejected"),
            }
        }
        Ok(None)
    }

    /// Answer requests from `events` until the channel closes
    pub fn spawn(
        mut self,
        handle: EngineHandle,
        mut events: broadcast::Receiver<EngineEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::OracleRequested {
                        index,
                        airline,
                        flight,
                        timestamp,
                    }) => {
                        let key = RequestKey {
                            index,
                            airline,
                            flight,
                            timestamp,
                        };
                        match self.answer(&handle, &key).await {
                            Ok(Some(status)) => {
                                info!(flight = %key.flight, status = ?status, "Fleet resolved request")
                            }
                            Ok(None) => debug!(flight = %key.flight, "Request left open"),
                            Err(e) => {
                                warn!(error = %e, "Engine unavailable, fleet stopping");
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Oracle fleet lagged behind events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::spawn_engine_actor;
    use crate::clock::ManualClock;
    use crate::engine::SuretyEngine;
    use escrow::RecordingPayout;
    use std::sync::Arc;
    use std::time::Duration;
    use surety_core::{Config, FlightCode, MemoryStore};

    const NOW: i64 = 1_700_000_000;

    async fn setup() -> (EngineHandle, Address, FlightCode) {
        let config = Config::default();
        let engine = SuretyEngine::new(
            MemoryStore::new(),
            &config,
            Arc::new(RecordingPayout::new()),
            Arc::new(ManualClock::at(NOW)),
        )
        .unwrap();
        let (handle, _task) = spawn_engine_actor(engine, 64);

        let airline = config.genesis.first_airline;
        let code = FlightCode::new("GA101");
        handle.fund(airline, Amount::ether(10)).await.unwrap();
        handle
            .register_flight(airline, code.clone(), "LAX", NOW + 7200)
            .await
            .unwrap();
        (handle, airline, code)
    }

    #[tokio::test]
    async fn test_fixed_fleet_resolves_request() {
        let (handle, airline, code) = setup().await;
        let passenger = Address::from_low_u64(500);
        handle.buy(passenger, code.clone(), Amount::ether(1)).await.unwrap();

        let mut fleet = OracleFleet::register(
            &handle,
            60,
            1_000,
            Amount::ether(1),
            StatusSource::Fixed(StatusCode::LateAirline),
        )
        .await
        .unwrap();
        assert_eq!(fleet.len(), 60);

        let key = handle
            .fetch_flight_status(passenger, airline, code.clone(), NOW)
            .await
            .unwrap();
        let resolved = fleet.answer(&handle, &key).await.unwrap();
        assert_eq!(resolved, Some(StatusCode::LateAirline));

        assert_eq!(
            handle.view_flight_status(code.clone(), airline).await.unwrap(),
            StatusCode::LateAirline
        );
        assert_eq!(
            handle.credit_to_pay(code, passenger).await.unwrap(),
            Amount::from_wei(1_500_000_000_000_000_000)
        );
    }

    #[tokio::test]
    async fn test_spawned_fleet_answers_events() {
        let (handle, airline, code) = setup().await;
        let fleet = OracleFleet::register(
            &handle,
            60,
            1_000,
            Amount::ether(1),
            StatusSource::Random { seed: 7 },
        )
        .await
        .unwrap();

        let mut watcher = handle.subscribe();
        let task = fleet.spawn(handle.clone(), handle.subscribe());

        handle
            .fetch_flight_status(Address::from_low_u64(500), airline, code.clone(), NOW)
            .await
            .unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(EngineEvent::FlightStatusInfo { status, .. }) = watcher.recv().await {
                    break status;
                }
            }
        })
        .await
        .unwrap();

        assert!(status.is_terminal());
        assert_eq!(
            handle.view_flight_status(code, airline).await.unwrap(),
            status
        );

        handle.shutdown().await.unwrap();
        task.abort();
    }
}
