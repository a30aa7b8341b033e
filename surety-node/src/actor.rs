//! Single-writer actor around the engine
//!
//! Operations arrive from many tasks but the engine applies them one at a
//! time, in mailbox order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │     Airlines / passengers / oracles / operators       │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               EngineHandle (Clone)                    │
//! │         Sends messages to actor mailbox               │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              EngineActor (Single Task)                │
//! │    SuretyEngine::<op>() → Transition → apply          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ broadcast::channel
//!                       ▼
//!               EngineEvent subscribers
//! ```

use crate::engine::SuretyEngine;
use governance::Admission;
use oracle_consensus::ResponseOutcome;
use prometheus::{Encoder, TextEncoder};
use surety_core::{
    Address, Airline, Amount, EngineEvent, Error, Flight, FlightCode, IndexId, Oracle,
    OracleRequest, Purchase, RequestKey, Result, StateStore, StatusCode, INDEXES_PER_ORACLE,
};
use tokio::sync::{broadcast, mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the engine actor
#[allow(missing_docs)]
#[derive(Debug)]
pub enum EngineMessage {
    SetOperatingStatus {
        caller: Address,
        operational: bool,
        response: Reply<()>,
    },
    IsOperational {
        response: Reply<bool>,
    },
    AuthorizeCaller {
        caller: Address,
        target: Address,
        authorized: bool,
        response: Reply<()>,
    },
    Fund {
        caller: Address,
        amount: Amount,
        response: Reply<Airline>,
    },
    RegisterAirline {
        caller: Address,
        candidate: Address,
        name: String,
        response: Reply<Admission>,
    },
    VoteAirline {
        caller: Address,
        candidate: Address,
        response: Reply<usize>,
    },
    RegisterFlight {
        caller: Address,
        code: FlightCode,
        destination: String,
        departure: i64,
        response: Reply<Flight>,
    },
    Buy {
        caller: Address,
        code: FlightCode,
        amount: Amount,
        response: Reply<Purchase>,
    },
    Pay {
        caller: Address,
        code: FlightCode,
        response: Reply<Amount>,
    },
    RegisterOracle {
        caller: Address,
        fee: Amount,
        response: Reply<Oracle>,
    },
    FetchFlightStatus {
        caller: Address,
        airline: Address,
        code: FlightCode,
        timestamp: i64,
        response: Reply<RequestKey>,
    },
    SubmitOracleResponse {
        caller: Address,
        key: RequestKey,
        status: StatusCode,
        response: Reply<ResponseOutcome>,
    },
    SubmitDefaultStatus {
        caller: Address,
        key: RequestKey,
        status: StatusCode,
        response: Reply<StatusCode>,
    },
    AirlinesCount {
        response: Reply<usize>,
    },
    Airline {
        address: Address,
        response: Reply<Option<Airline>>,
    },
    FlightExists {
        code: FlightCode,
        response: Reply<bool>,
    },
    ViewFlightStatus {
        code: FlightCode,
        airline: Address,
        response: Reply<StatusCode>,
    },
    CreditToPay {
        code: FlightCode,
        passenger: Address,
        response: Reply<Amount>,
    },
    PassengerAddresses {
        response: Reply<Vec<Address>>,
    },
    Balance {
        response: Reply<Amount>,
    },
    OracleIndexes {
        caller: Address,
        response: Reply<[IndexId; INDEXES_PER_ORACLE]>,
    },
    Request {
        key: RequestKey,
        response: Reply<Option<OracleRequest>>,
    },
    RenderMetrics {
        response: Reply<String>,
    },
    Shutdown,
}

/// Actor that owns the engine
#[derive(Debug)]
pub struct EngineActor<S: StateStore> {
    engine: SuretyEngine<S>,
    mailbox: mpsc::Receiver<EngineMessage>,
}

impl<S: StateStore> EngineActor<S> {
    /// Create new actor
    pub fn new(engine: SuretyEngine<S>, mailbox: mpsc::Receiver<EngineMessage>) -> Self {
        Self { engine, mailbox }
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) -> SuretyEngine<S> {
        while let Some(msg) = self.mailbox.recv().await {
            if let EngineMessage::Shutdown = msg {
                tracing::info!("Engine actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
        self.engine
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: EngineMessage) {
        let engine = &mut self.engine;
        match msg {
            EngineMessage::SetOperatingStatus {
                caller,
                operational,
                response,
            } => {
                let _ = response.send(engine.set_operating_status(caller, operational));
            }

            EngineMessage::IsOperational { response } => {
                let _ = response.send(engine.is_operational());
            }

            EngineMessage::AuthorizeCaller {
                caller,
                target,
                authorized,
                response,
            } => {
                let result = if authorized {
                    engine.authorize_caller(caller, target)
                } else {
                    engine.deauthorize_caller(caller, target)
                };
                let _ = response.send(result);
            }

            EngineMessage::Fund {
                caller,
                amount,
                response,
            } => {
                let _ = response.send(engine.fund(caller, amount));
            }

            EngineMessage::RegisterAirline {
                caller,
                candidate,
                name,
                response,
            } => {
                let _ = response.send(engine.register_airline(caller, candidate, &name));
            }

            EngineMessage::VoteAirline {
                caller,
                candidate,
                response,
            } => {
                let _ = response.send(engine.vote_airline(caller, candidate));
            }

            EngineMessage::RegisterFlight {
                caller,
                code,
                destination,
                departure,
                response,
            } => {
                let _ = response.send(engine.register_flight(caller, code, &destination, departure));
            }

            EngineMessage::Buy {
                caller,
                code,
                amount,
                response,
            } => {
                let _ = response.send(engine.buy(caller, &code, amount));
            }

            EngineMessage::Pay {
                caller,
                code,
                response,
            } => {
                let _ = response.send(engine.pay(caller, &code));
            }

            EngineMessage::RegisterOracle {
                caller,
                fee,
                response,
            } => {
                let _ = response.send(engine.register_oracle(caller, fee));
            }

            EngineMessage::FetchFlightStatus {
                caller,
                airline,
                code,
                timestamp,
                response,
            } => {
                let _ = response.send(engine.fetch_flight_status(caller, airline, &code, timestamp));
            }

            EngineMessage::SubmitOracleResponse {
                caller,
                key,
                status,
                response,
            } => {
                let _ = response.send(engine.submit_oracle_response(
                    caller,
                    key.index,
                    key.airline,
                    &key.flight,
                    key.timestamp,
                    status,
                ));
            }

            EngineMessage::SubmitDefaultStatus {
                caller,
                key,
                status,
                response,
            } => {
                let _ = response.send(engine.submit_default_status(
                    caller,
                    key.index,
                    key.airline,
                    &key.flight,
                    key.timestamp,
                    status,
                ));
            }

            EngineMessage::AirlinesCount { response } => {
                let _ = response.send(engine.airlines_count());
            }

            EngineMessage::Airline { address, response } => {
                let _ = response.send(engine.airline(&address));
            }

            EngineMessage::FlightExists { code, response } => {
                let _ = response.send(engine.flight_exists(&code));
            }

            EngineMessage::ViewFlightStatus {
                code,
                airline,
                response,
            } => {
                let _ = response.send(engine.view_flight_status(&code, &airline));
            }

            EngineMessage::CreditToPay {
                code,
                passenger,
                response,
            } => {
                let _ = response.send(engine.credit_to_pay(&code, &passenger));
            }

            EngineMessage::PassengerAddresses { response } => {
                let _ = response.send(engine.passenger_addresses());
            }

            EngineMessage::Balance { response } => {
                let _ = response.send(engine.balance());
            }

            EngineMessage::OracleIndexes { caller, response } => {
                let _ = response.send(engine.oracle_indexes(&caller));
            }

            EngineMessage::Request { key, response } => {
                let _ = response.send(engine.request(&key));
            }

            EngineMessage::RenderMetrics { response } => {
                let _ = response.send(render_metrics(engine));
            }

            EngineMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

fn render_metrics<S: StateStore>(engine: &SuretyEngine<S>) -> Result<String> {
    let families = engine.metrics().registry().gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|e| Error::Serialization(format!("Metrics encoding: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Serialization(e.to_string()))
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Toggle the operational gate
    pub async fn set_operating_status(&self, caller: Address, operational: bool) -> Result<()> {
        self.call(|response| EngineMessage::SetOperatingStatus {
            caller,
            operational,
            response,
        })
        .await
    }

    /// Current gate value
    pub async fn is_operational(&self) -> Result<bool> {
        self.call(|response| EngineMessage::IsOperational { response })
            .await
    }

    /// Allow `target` to push default statuses
    pub async fn authorize_caller(&self, caller: Address, target: Address) -> Result<()> {
        self.call(|response| EngineMessage::AuthorizeCaller {
            caller,
            target,
            authorized: true,
            response,
        })
        .await
    }

    /// Revoke `target`
    pub async fn deauthorize_caller(&self, caller: Address, target: Address) -> Result<()> {
        self.call(|response| EngineMessage::AuthorizeCaller {
            caller,
            target,
            authorized: false,
            response,
        })
        .await
    }

    /// Fund an airline record
    pub async fn fund(&self, caller: Address, amount: Amount) -> Result<Airline> {
        self.call(|response| EngineMessage::Fund {
            caller,
            amount,
            response,
        })
        .await
    }

    /// Admit a candidate airline
    pub async fn register_airline(
        &self,
        caller: Address,
        candidate: Address,
        name: &str,
    ) -> Result<Admission> {
        let name = name.to_string();
        self.call(|response| EngineMessage::RegisterAirline {
            caller,
            candidate,
            name,
            response,
        })
        .await
    }

    /// Vote for a candidate airline
    pub async fn vote_airline(&self, caller: Address, candidate: Address) -> Result<usize> {
        self.call(|response| EngineMessage::VoteAirline {
            caller,
            candidate,
            response,
        })
        .await
    }

    /// List a flight
    pub async fn register_flight(
        &self,
        caller: Address,
        code: FlightCode,
        destination: &str,
        departure: i64,
    ) -> Result<Flight> {
        let destination = destination.to_string();
        self.call(|response| EngineMessage::RegisterFlight {
            caller,
            code,
            destination,
            departure,
            response,
        })
        .await
    }

    /// Buy insurance
    pub async fn buy(&self, caller: Address, code: FlightCode, amount: Amount) -> Result<Purchase> {
        self.call(|response| EngineMessage::Buy {
            caller,
            code,
            amount,
            response,
        })
        .await
    }

    /// Withdraw credit
    pub async fn pay(&self, caller: Address, code: FlightCode) -> Result<Amount> {
        self.call(|response| EngineMessage::Pay {
            caller,
            code,
            response,
        })
        .await
    }

    /// Register an oracle
    pub async fn register_oracle(&self, caller: Address, fee: Amount) -> Result<Oracle> {
        self.call(|response| EngineMessage::RegisterOracle {
            caller,
            fee,
            response,
        })
        .await
    }

    /// Open an oracle request
    pub async fn fetch_flight_status(
        &self,
        caller: Address,
        airline: Address,
        code: FlightCode,
        timestamp: i64,
    ) -> Result<RequestKey> {
        self.call(|response| EngineMessage::FetchFlightStatus {
            caller,
            airline,
            code,
            timestamp,
            response,
        })
        .await
    }

    /// Submit one oracle response
    pub async fn submit_oracle_response(
        &self,
        caller: Address,
        key: RequestKey,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        self.call(|response| EngineMessage::SubmitOracleResponse {
            caller,
            key,
            status,
            response,
        })
        .await
    }

    /// Close a timed-out request
    pub async fn submit_default_status(
        &self,
        caller: Address,
        key: RequestKey,
        status: StatusCode,
    ) -> Result<StatusCode> {
        self.call(|response| EngineMessage::SubmitDefaultStatus {
            caller,
            key,
            status,
            response,
        })
        .await
    }

    /// Registered airlines
    pub async fn airlines_count(&self) -> Result<usize> {
        self.call(|response| EngineMessage::AirlinesCount { response })
            .await
    }

    /// Airline record
    pub async fn airline(&self, address: Address) -> Result<Option<Airline>> {
        self.call(|response| EngineMessage::Airline { address, response })
            .await
    }

    /// Whether a flight code is registered
    pub async fn flight_exists(&self, code: FlightCode) -> Result<bool> {
        self.call(|response| EngineMessage::FlightExists { code, response })
            .await
    }

    /// Flight status
    pub async fn view_flight_status(&self, code: FlightCode, airline: Address) -> Result<StatusCode> {
        self.call(|response| EngineMessage::ViewFlightStatus {
            code,
            airline,
            response,
        })
        .await
    }

    /// Withdrawable credit
    pub async fn credit_to_pay(&self, code: FlightCode, passenger: Address) -> Result<Amount> {
        self.call(|response| EngineMessage::CreditToPay {
            code,
            passenger,
            response,
        })
        .await
    }

    /// Passengers
    pub async fn passenger_addresses(&self) -> Result<Vec<Address>> {
        self.call(|response| EngineMessage::PassengerAddresses { response })
            .await
    }

    /// Pooled escrow funds
    pub async fn balance(&self) -> Result<Amount> {
        self.call(|response| EngineMessage::Balance { response })
            .await
    }

    /// Index slots of an oracle
    pub async fn oracle_indexes(&self, caller: Address) -> Result<[IndexId; INDEXES_PER_ORACLE]> {
        self.call(|response| EngineMessage::OracleIndexes { caller, response })
            .await
    }

    /// Oracle request by key
    pub async fn request(&self, key: RequestKey) -> Result<Option<OracleRequest>> {
        self.call(|response| EngineMessage::Request { key, response })
            .await
    }

    /// Metrics in the Prometheus text format
    pub async fn render_metrics(&self) -> Result<String> {
        self.call(|response| EngineMessage::RenderMetrics { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the engine actor
///
/// The join handle yields the engine back after shutdown.
pub fn spawn_engine_actor<S>(
    engine: SuretyEngine<S>,
    mailbox_capacity: usize,
) -> (EngineHandle, tokio::task::JoinHandle<SuretyEngine<S>>)
where
    S: StateStore + Send + 'static,
{
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1)); // Bounded channel for backpressure
    let events = engine.event_sender();
    let actor = EngineActor::new(engine, rx);

    let task = tokio::spawn(actor.run());

    (EngineHandle { sender: tx, events }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use escrow::RecordingPayout;
    use std::sync::Arc;
    use surety_core::{Config, ErrorKind, MemoryStore};

    fn spawn() -> (EngineHandle, tokio::task::JoinHandle<SuretyEngine<MemoryStore>>) {
        let engine = SuretyEngine::new(
            MemoryStore::new(),
            &Config::default(),
            Arc::new(RecordingPayout::new()),
            Arc::new(ManualClock::at(1_700_000_000)),
        )
        .unwrap();
        spawn_engine_actor(engine, 16)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, task) = spawn();
        assert!(handle.is_operational().await.unwrap());

        handle.shutdown().await.unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.airlines_count().unwrap(), 1);

        let err = handle.airlines_count().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Concurrency);
    }

    #[tokio::test]
    async fn test_actor_serializes_concurrent_funding() {
        let (handle, task) = spawn();
        let seed = Config::default().genesis.first_airline;

        let mut joins = Vec::new();
        for _ in 0..10 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move {
                handle.fund(seed, Amount::ether(1)).await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let airline = handle.airline(seed).await.unwrap().unwrap();
        assert_eq!(airline.funded_amount, Amount::ether(10));
        assert!(airline.funded);
        assert_eq!(handle.balance().await.unwrap(), Amount::ether(10));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_sees_events() {
        let (handle, task) = spawn();
        let mut events = handle.subscribe();
        let seed = Config::default().genesis.first_airline;

        handle.fund(seed, Amount::ether(10)).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.name(), "airline_funded");

        let metrics = handle.render_metrics().await.unwrap();
        assert!(metrics.contains("surety_operations_total"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
