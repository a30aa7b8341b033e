//! RocksDB-backed engine tests
//!
//! State written through the engine survives a reopen, and genesis is not
//! applied twice.

use escrow::RecordingPayout;
use std::sync::Arc;
use surety_core::config::{StorageBackend, StorageConfig};
use surety_core::{Address, Amount, Config, FlightCode, RocksStore, StatusCode};
use surety_node::{spawn_engine_actor, ManualClock, OracleFleet, StatusSource, SuretyEngine};
use tempfile::TempDir;

const NOW: i64 = 1_700_000_000;

fn config(dir: &TempDir) -> Config {
    Config {
        storage: StorageConfig {
            backend: StorageBackend::Rocksdb,
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn open(config: &Config, payout: RecordingPayout) -> SuretyEngine<RocksStore> {
    let store = RocksStore::open(&config.storage).unwrap();
    SuretyEngine::new(
        store,
        config,
        Arc::new(payout),
        Arc::new(ManualClock::at(NOW)),
    )
    .unwrap()
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let seed = config.genesis.first_airline;
    let code = FlightCode::new("GA201");
    let rider = Address::from_low_u64(0x500);

    {
        let mut engine = open(&config, RecordingPayout::new());
        engine.fund(seed, Amount::ether(10)).unwrap();
        engine
            .register_flight(seed, code.clone(), "JFK", NOW + 3600)
            .unwrap();
        engine.buy(rider, &code, Amount::ether(1)).unwrap();
        engine.into_store().close().unwrap();
    }

    let engine = open(&config, RecordingPayout::new());
    assert_eq!(engine.airlines_count().unwrap(), 1);
    assert!(engine.airline(&seed).unwrap().unwrap().funded);
    assert!(engine.flight_exists(&code).unwrap());
    assert_eq!(engine.passenger_addresses().unwrap(), vec![rider]);
    assert_eq!(engine.balance().unwrap(), Amount::ether(11));
    assert_eq!(engine.metrics().registered_airlines.get(), 1);
}

#[tokio::test]
async fn test_actor_and_fleet_over_rocksdb() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let seed = config.genesis.first_airline;
    let code = FlightCode::new("GA202");
    let rider = Address::from_low_u64(0x501);
    let payout = RecordingPayout::new();

    let (handle, task) = spawn_engine_actor(open(&config, payout.clone()), 32);
    handle.fund(seed, Amount::ether(10)).await.unwrap();
    handle
        .register_flight(seed, code.clone(), "JFK", NOW + 3600)
        .await
        .unwrap();
    handle
        .buy(rider, code.clone(), Amount::from_wei(500_000_000_000_000_000))
        .await
        .unwrap();

    let mut fleet = OracleFleet::register(
        &handle,
        60,
        0x1000,
        Amount::ether(1),
        StatusSource::Fixed(StatusCode::LateAirline),
    )
    .await
    .unwrap();

    let key = handle
        .fetch_flight_status(rider, seed, code.clone(), NOW)
        .await
        .unwrap();
    assert_eq!(
        fleet.answer(&handle, &key).await.unwrap(),
        Some(StatusCode::LateAirline)
    );

    let paid = handle.pay(rider, code.clone()).await.unwrap();
    assert_eq!(paid, Amount::from_wei(750_000_000_000_000_000));
    assert_eq!(payout.total_to(&rider).unwrap(), paid);

    handle.shutdown().await.unwrap();
    let engine = task.await.unwrap();
    engine.into_store().close().unwrap();

    let engine = open(&config, RecordingPayout::new());
    assert_eq!(
        engine.view_flight_status(&code, &seed).unwrap(),
        StatusCode::LateAirline
    );
    assert_eq!(engine.credit_to_pay(&code, &rider).unwrap(), Amount::ZERO);
    assert!(!engine.request(&key).unwrap().unwrap().open);
}
