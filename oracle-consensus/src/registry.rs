//! Oracle registration and index assignment

use surety_core::{
    crypto, Address, Amount, EngineEvent, Error, IndexId, Oracle, Policy, Result, StateStore,
    Transition, INDEXES_PER_ORACLE,
};

/// Oracle registration rules
#[derive(Debug, Clone)]
pub struct OracleRegistry {
    registration_fee: Amount,
    index_space: IndexId,
}

impl OracleRegistry {
    /// Create registration rules from a policy
    pub fn new(policy: &Policy) -> Self {
        Self {
            registration_fee: policy.registration_fee,
            index_space: policy.index_space,
        }
    }

    /// Fee required to register
    pub fn registration_fee(&self) -> Amount {
        self.registration_fee
    }

    /// Register `caller` as an oracle, paying `fee`
    pub fn register_oracle<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        fee: Amount,
    ) -> Result<Oracle> {
        if fee < self.registration_fee {
            return Err(Error::InsufficientFee {
                required: self.registration_fee,
                offered: fee,
            });
        }

        if tx.oracle(&caller)?.is_some() {
            return Err(Error::AlreadyRegistered(caller));
        }

        let mut meta = tx.meta()?;
        let indexes = crypto::assign_indexes(&caller, &mut meta.index_nonce, self.index_space)?;
        meta.fee_balance = meta
            .fee_balance
            .checked_add(fee)
            .ok_or_else(|| Error::Overflow("fee balance".to_string()))?;
        tx.put_meta(meta)?;

        let oracle = Oracle {
            address: caller,
            indexes,
        };
        tx.put_oracle(oracle.clone())?;

        tx.emit(EngineEvent::OracleRegistered {
            oracle: caller,
            indexes: indexes.to_vec(),
        });

        tracing::info!(oracle = %caller, indexes = ?indexes, "Oracle registered");
        Ok(oracle)
    }

    /// Index slots of `caller`
    pub fn oracle_indexes<S: StateStore + ?Sized>(
        store: &S,
        caller: &Address,
    ) -> Result<[IndexId; INDEXES_PER_ORACLE]> {
        store
            .oracle(caller)?
            .map(|o| o.indexes)
            .ok_or_else(|| Error::Unauthorized("Not registered as an oracle".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_core::{ErrorKind, MemoryStore, Meta};

    fn setup() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.put_meta(Meta::genesis(Address::from_low_u64(1))).unwrap();
        store
    }

    #[test]
    fn test_register_assigns_three_distinct_indexes() {
        let mut store = setup();
        let registry = OracleRegistry::new(&Policy::default());
        let caller = Address::from_low_u64(100);

        let writes = {
            let mut tx = Transition::begin(&store);
            registry
                .register_oracle(&mut tx, caller, Amount::ether(1))
                .unwrap();
            tx.finish().0
        };
        store.apply(writes).unwrap();

        let indexes = OracleRegistry::oracle_indexes(&store, &caller).unwrap();
        assert!(indexes.iter().all(|i| *i < 10));
        assert_ne!(indexes[0], indexes[1]);
        assert_ne!(indexes[1], indexes[2]);
        assert_ne!(indexes[0], indexes[2]);

        let meta = store.meta().unwrap();
        assert!(meta.index_nonce >= 3);
        assert_eq!(meta.fee_balance, Amount::ether(1));
        assert_eq!(meta.escrow_balance, Amount::ZERO);
    }

    #[test]
    fn test_fee_below_minimum_rejected() {
        let store = setup();
        let registry = OracleRegistry::new(&Policy::default());
        let mut tx = Transition::begin(&store);

        let err = registry
            .register_oracle(&mut tx, Address::from_low_u64(100), Amount::from_wei(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFee);
    }

    #[test]
    fn test_double_registration_rejected() {
        let store = setup();
        let registry = OracleRegistry::new(&Policy::default());
        let caller = Address::from_low_u64(100);
        let mut tx = Transition::begin(&store);

        registry.register_oracle(&mut tx, caller, Amount::ether(1)).unwrap();
        let err = registry
            .register_oracle(&mut tx, caller, Amount::ether(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);
    }

    #[test]
    fn test_indexes_of_unknown_oracle() {
        let store = setup();
        let err = OracleRegistry::oracle_indexes(&store, &Address::from_low_u64(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            err.to_string(),
            "Caller is not authorized: Not registered as an oracle"
        );
    }

    #[test]
    fn test_same_history_same_indexes() {
        let registry = OracleRegistry::new(&Policy::default());
        let run = || {
            let store = setup();
            let mut tx = Transition::begin(&store);
            let mut assigned = Vec::new();
            for n in 0..5 {
                let oracle = registry
                    .register_oracle(&mut tx, Address::from_low_u64(100 + n), Amount::ether(1))
                    .unwrap();
                assigned.push(oracle.indexes);
            }
            assigned
        };
        assert_eq!(run(), run());
    }
}
