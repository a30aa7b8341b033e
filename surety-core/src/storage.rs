//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `meta` - single record (key: `meta`)
//! - `airlines` - airline records (key: address bytes)
//! - `flights` - flights (key: flight code bytes)
//! - `passengers` - passengers (key: address bytes)
//! - `oracles` - oracle index assignments (key: address bytes)
//! - `requests` - oracle requests (key: bincode of the request key)

use crate::{
    config::StorageConfig,
    error::{Error, Result},
    store::{StateStore, WriteSet},
    types::{
        Address, Airline, Flight, FlightCode, Meta, Oracle, OracleRequest, Passenger, RequestKey,
    },
};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Column family names
const CF_META: &str = "meta";
const CF_AIRLINES: &str = "airlines";
const CF_FLIGHTS: &str = "flights";
const CF_PASSENGERS: &str = "passengers";
const CF_ORACLES: &str = "oracles";
const CF_REQUESTS: &str = "requests";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_META,
    CF_AIRLINES,
    CF_FLIGHTS,
    CF_PASSENGERS,
    CF_ORACLES,
    CF_REQUESTS,
];

const META_KEY: &[u8] = b"meta";

/// RocksDB-backed state store
pub struct RocksStore {
    db: Arc<DB>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = COLUMN_FAMILIES.len(),
            "Opened RocksDB state store"
        );

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Requests accumulate without bound, compress harder
            CF_REQUESTS => opts.set_compression_type(rocksdb::DBCompressionType::Zstd),
            _ => opts.set_compression_type(rocksdb::DBCompressionType::Lz4),
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        let value = bincode::serialize(value)?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(bincode::deserialize(&value)?);
        }
        Ok(values)
    }

    fn request_key(key: &RequestKey) -> Result<Vec<u8>> {
        Ok(bincode::serialize(key)?)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl StateStore for RocksStore {
    fn try_meta(&self) -> Result<Option<Meta>> {
        self.get(CF_META, META_KEY)
    }

    fn airline(&self, address: &Address) -> Result<Option<Airline>> {
        self.get(CF_AIRLINES, address.as_bytes())
    }

    fn airlines(&self) -> Result<Vec<Airline>> {
        self.scan(CF_AIRLINES)
    }

    fn flight(&self, code: &FlightCode) -> Result<Option<Flight>> {
        self.get(CF_FLIGHTS, code.as_str().as_bytes())
    }

    fn flights(&self) -> Result<Vec<Flight>> {
        self.scan(CF_FLIGHTS)
    }

    fn passenger(&self, address: &Address) -> Result<Option<Passenger>> {
        self.get(CF_PASSENGERS, address.as_bytes())
    }

    fn passengers(&self) -> Result<Vec<Passenger>> {
        self.scan(CF_PASSENGERS)
    }

    fn oracle(&self, address: &Address) -> Result<Option<Oracle>> {
        self.get(CF_ORACLES, address.as_bytes())
    }

    fn request(&self, key: &RequestKey) -> Result<Option<OracleRequest>> {
        self.get(CF_REQUESTS, &Self::request_key(key)?)
    }

    fn put_meta(&mut self, meta: Meta) -> Result<()> {
        self.put(CF_META, META_KEY, &meta)
    }

    fn put_airline(&mut self, airline: Airline) -> Result<()> {
        self.put(CF_AIRLINES, airline.address.as_bytes(), &airline)
    }

    fn put_flight(&mut self, flight: Flight) -> Result<()> {
        self.put(CF_FLIGHTS, flight.key.code.as_str().as_bytes(), &flight)
    }

    fn put_passenger(&mut self, passenger: Passenger) -> Result<()> {
        self.put(CF_PASSENGERS, passenger.address.as_bytes(), &passenger)
    }

    fn put_oracle(&mut self, oracle: Oracle) -> Result<()> {
        self.put(CF_ORACLES, oracle.address.as_bytes(), &oracle)
    }

    fn put_request(&mut self, request: OracleRequest) -> Result<()> {
        let key = Self::request_key(&request.key)?;
        self.put(CF_REQUESTS, &key, &request)
    }

    /// Whole transition in one `WriteBatch`
    fn apply(&mut self, writes: WriteSet) -> Result<()> {
        let record_count = writes.len();
        let mut batch = WriteBatch::default();

        if let Some(meta) = &writes.meta {
            let cf = self.cf_handle(CF_META)?;
            batch.put_cf(&cf, META_KEY, bincode::serialize(meta)?);
        }

        let cf = self.cf_handle(CF_AIRLINES)?;
        for (address, airline) in &writes.airlines {
            batch.put_cf(&cf, address.as_bytes(), bincode::serialize(airline)?);
        }

        let cf = self.cf_handle(CF_FLIGHTS)?;
        for (code, flight) in &writes.flights {
            batch.put_cf(&cf, code.as_str().as_bytes(), bincode::serialize(flight)?);
        }

        let cf = self.cf_handle(CF_PASSENGERS)?;
        for (address, passenger) in &writes.passengers {
            batch.put_cf(&cf, address.as_bytes(), bincode::serialize(passenger)?);
        }

        let cf = self.cf_handle(CF_ORACLES)?;
        for (address, oracle) in &writes.oracles {
            batch.put_cf(&cf, address.as_bytes(), bincode::serialize(oracle)?);
        }

        let cf = self.cf_handle(CF_REQUESTS)?;
        for (key, request) in &writes.requests {
            batch.put_cf(&cf, Self::request_key(key)?, bincode::serialize(request)?);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(records = record_count, "Transition committed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Transition;
    use crate::types::{FlightKey, StatusCode};
    use tempfile::TempDir;

    fn test_store() -> (RocksStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        (RocksStore::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_storage_open() {
        let (store, _temp) = test_store();
        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
        assert!(store.meta().is_err());
    }

    #[test]
    fn test_put_and_get_records() {
        let (mut store, _temp) = test_store();
        let admin = Address::from_low_u64(1);
        store.put_meta(Meta::genesis(admin)).unwrap();

        let mut airline = Airline::candidate(Address::from_low_u64(2));
        airline.name = "Garuda Air".to_string();
        store.put_airline(airline.clone()).unwrap();

        assert_eq!(store.meta().unwrap().admin, admin);
        assert_eq!(store.airline(&airline.address).unwrap(), Some(airline));
        assert_eq!(store.airline(&Address::from_low_u64(3)).unwrap(), None);
    }

    #[test]
    fn test_atomic_apply() {
        let (mut store, _temp) = test_store();
        store.put_meta(Meta::genesis(Address::from_low_u64(1))).unwrap();

        let airline = Address::from_low_u64(2);
        let key = RequestKey {
            index: 4,
            airline,
            flight: FlightCode::new("GA101"),
            timestamp: 1_700_000_000,
        };

        let writes = {
            let mut tx = Transition::begin(&store);
            tx.put_flight(Flight::new(
                FlightKey {
                    airline,
                    code: FlightCode::new("GA101"),
                    departure: 1_700_000_000,
                },
                "NYC",
            ))
            .unwrap();
            tx.put_request(OracleRequest::open(key.clone(), airline, 1_700_000_000))
                .unwrap();
            tx.finish().0
        };
        store.apply(writes).unwrap();

        let flight = store.flight(&FlightCode::new("GA101")).unwrap().unwrap();
        assert_eq!(flight.status, StatusCode::Unknown);
        assert!(store.request(&key).unwrap().unwrap().open);
        assert_eq!(store.flights().unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_preserves_state() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..StorageConfig::default()
        };

        {
            let mut store = RocksStore::open(&config).unwrap();
            store.put_meta(Meta::genesis(Address::from_low_u64(1))).unwrap();
            store
                .put_passenger(Passenger::new(Address::from_low_u64(9)))
                .unwrap();
            store.close().unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        assert_eq!(store.passengers().unwrap().len(), 1);
    }
}
