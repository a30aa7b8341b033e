//! Flight catalogue
//!
//! Flight codes are unique across airlines, so lookups are by code and the
//! stored key carries the operating airline and departure.

use surety_core::{
    Address, EngineEvent, Error, Flight, FlightCode, FlightKey, Result, StateStore, StatusCode,
    Transition,
};

/// Flight registration and lookups
#[derive(Debug, Clone, Copy, Default)]
pub struct FlightCatalog;

impl FlightCatalog {
    /// Register a flight for `caller`
    pub fn register_flight<S: StateStore + ?Sized>(
        tx: &mut Transition<'_, S>,
        caller: Address,
        code: FlightCode,
        destination: &str,
        departure: i64,
    ) -> Result<Flight> {
        let is_airline = tx.airline(&caller)?.map_or(false, |a| a.registered);
        if !is_airline {
            return Err(Error::Unauthorized(format!(
                "{} is not a registered airline",
                caller
            )));
        }

        if tx.flight(&code)?.is_some() {
            return Err(Error::DuplicateFlight(code));
        }

        let flight = Flight::new(
            FlightKey {
                airline: caller,
                code: code.clone(),
                departure,
            },
            destination,
        );
        tx.put_flight(flight.clone())?;

        tx.emit(EngineEvent::FlightRegistered {
            airline: caller,
            flight: code.clone(),
            destination: destination.to_string(),
            departure,
        });

        tracing::info!(
            airline = %caller,
            flight = %code,
            destination,
            departure,
            "Flight registered"
        );

        Ok(flight)
    }

    /// Whether `code` is registered
    pub fn flight_exists<S: StateStore + ?Sized>(store: &S, code: &FlightCode) -> Result<bool> {
        Ok(store.flight(code)?.map_or(false, |f| f.exists))
    }

    /// Registered flight or `UnknownFlight`
    pub fn require<S: StateStore + ?Sized>(store: &S, code: &FlightCode) -> Result<Flight> {
        store
            .flight(code)?
            .filter(|f| f.exists)
            .ok_or_else(|| Error::UnknownFlight(code.clone()))
    }

    /// Status of `code` as operated by `airline`
    pub fn view_flight_status<S: StateStore + ?Sized>(
        store: &S,
        code: &FlightCode,
        airline: &Address,
    ) -> Result<StatusCode> {
        let flight = Self::require(store, code)?;
        if flight.key.airline != *airline {
            return Err(Error::UnknownFlight(code.clone()));
        }
        Ok(flight.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_core::{Airline, ErrorKind, MemoryStore, Meta};

    fn store_with_airline(airline: Address) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.put_meta(Meta::genesis(Address::from_low_u64(1))).unwrap();
        let mut record = Airline::candidate(airline);
        record.registered = true;
        store.put_airline(record).unwrap();
        store
    }

    #[test]
    fn test_register_and_view_flight() {
        let airline = Address::from_low_u64(2);
        let mut store = store_with_airline(airline);

        let writes = {
            let mut tx = Transition::begin(&store);
            FlightCatalog::register_flight(&mut tx, airline, "GA101".into(), "NYC", 1_700_000_000)
                .unwrap();
            assert_eq!(tx.events().len(), 1);
            tx.finish().0
        };
        store.apply(writes).unwrap();

        let code = FlightCode::new("GA101");
        assert!(FlightCatalog::flight_exists(&store, &code).unwrap());
        assert_eq!(
            FlightCatalog::view_flight_status(&store, &code, &airline).unwrap(),
            StatusCode::Unknown
        );
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let airline = Address::from_low_u64(2);
        let store = store_with_airline(airline);

        let mut tx = Transition::begin(&store);
        FlightCatalog::register_flight(&mut tx, airline, "GA101".into(), "NYC", 1).unwrap();
        let err = FlightCatalog::register_flight(&mut tx, airline, "GA101".into(), "LAX", 2)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateFlight);
    }

    #[test]
    fn test_unregistered_airline_cannot_list_flights() {
        let store = store_with_airline(Address::from_low_u64(2));
        let mut tx = Transition::begin(&store);
        let err = FlightCatalog::register_flight(
            &mut tx,
            Address::from_low_u64(3),
            "QR7".into(),
            "DOH",
            1,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_view_status_checks_operator() {
        let airline = Address::from_low_u64(2);
        let store = store_with_airline(airline);
        let mut tx = Transition::begin(&store);
        FlightCatalog::register_flight(&mut tx, airline, "GA101".into(), "NYC", 1).unwrap();

        let code = FlightCode::new("GA101");
        let err =
            FlightCatalog::view_flight_status(&tx, &code, &Address::from_low_u64(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFlight);
        assert!(!FlightCatalog::flight_exists(&tx, &FlightCode::new("XX1")).unwrap());
    }
}
