//! Airline registry: admission, voting and funding

use serde::Serialize;
use surety_core::{
    Address, Airline, Amount, EngineEvent, Error, Policy, Result, StateStore, Transition,
};

/// How a candidate was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Registry below the consensus threshold
    Direct,
    /// Strict majority of funded registered airlines
    Voted {
        /// Votes counted
        votes: usize,
        /// Funded registered airlines at admission
        electorate: usize,
    },
}

/// Airline admission rules
#[derive(Debug, Clone)]
pub struct AirlineRegistry {
    consensus_threshold: usize,
    min_funding: Amount,
}

impl AirlineRegistry {
    /// Create registry rules from a policy
    pub fn new(policy: &Policy) -> Self {
        Self {
            consensus_threshold: policy.consensus_threshold,
            min_funding: policy.min_funding,
        }
    }

    /// Registered airlines below this count are admitted without votes
    pub fn consensus_threshold(&self) -> usize {
        self.consensus_threshold
    }

    /// Funding that unlocks governance rights
    pub fn min_funding(&self) -> Amount {
        self.min_funding
    }

    /// Register the seed airline (genesis only, unfunded)
    pub fn seed<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        address: Address,
        name: &str,
    ) -> Result<()> {
        if let Some(existing) = tx.airline(&address)? {
            if existing.registered {
                return Err(Error::AlreadyRegistered(address));
            }
        }

        let mut airline = Airline::candidate(address);
        airline.name = name.to_string();
        airline.registered = true;
        tx.put_airline(airline)?;

        tx.emit(EngineEvent::AirlineRegistered {
            airline: address,
            name: name.to_string(),
            sponsor: address,
            count: 1,
        });

        tracing::info!(airline = %address, airline_name = name, "Seed airline registered");
        Ok(())
    }

    /// Admit `candidate`, sponsored by `caller`
    pub fn register_airline<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        candidate: Address,
        name: &str,
    ) -> Result<Admission> {
        self.require_governor(&*tx, &caller)?;

        let mut record = tx
            .airline(&candidate)?
            .unwrap_or_else(|| Airline::candidate(candidate));
        if record.registered {
            return Err(Error::AlreadyRegistered(candidate));
        }

        let registered = Self::airlines_count(&*tx)?;
        let admission = if registered < self.consensus_threshold {
            Admission::Direct
        } else {
            let electorate = Self::funded_count(&*tx)?;
            let votes = record.votes.len();
            if !has_majority(votes, electorate) {
                tracing::warn!(
                    candidate = %candidate,
                    votes,
                    electorate,
                    "Airline registration rejected"
                );
                return Err(Error::InsufficientVotes { votes, electorate });
            }
            Admission::Voted { votes, electorate }
        };

        record.name = name.to_string();
        record.registered = true;
        record.votes.clear();
        tx.put_airline(record)?;

        tx.emit(EngineEvent::AirlineRegistered {
            airline: candidate,
            name: name.to_string(),
            sponsor: caller,
            count: registered + 1,
        });

        tracing::info!(
            airline = %candidate,
            sponsor = %caller,
            admission = ?admission,
            count = registered + 1,
            "Airline registered"
        );

        Ok(admission)
    }

    /// Record `caller`'s vote for `candidate`, returning the vote count
    ///
    /// Repeated votes leave the count unchanged.
    pub fn vote_airline<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        candidate: Address,
    ) -> Result<usize> {
        self.require_governor(&*tx, &caller)?;

        let mut record = tx
            .airline(&candidate)?
            .unwrap_or_else(|| Airline::candidate(candidate));
        if record.registered {
            return Err(Error::AlreadyRegistered(candidate));
        }

        if !record.votes.insert(caller) {
            tracing::debug!(candidate = %candidate, voter = %caller, "Duplicate vote ignored");
            return Ok(record.votes.len());
        }

        let votes = record.votes.len();
        tx.put_airline(record)?;

        tx.emit(EngineEvent::AirlineVoted {
            candidate,
            voter: caller,
            votes,
        });

        tracing::info!(candidate = %candidate, voter = %caller, votes, "Vote recorded");
        Ok(votes)
    }

    /// Accept funding from `caller` into the pool
    pub fn fund<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        amount: Amount,
    ) -> Result<Airline> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount("funding must be positive".to_string()));
        }

        let mut record = tx
            .airline(&caller)?
            .unwrap_or_else(|| Airline::candidate(caller));
        record.funded_amount = record
            .funded_amount
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("funding of {}", caller)))?;
        if record.funded_amount >= self.min_funding {
            record.funded = true;
        }

        let mut meta = tx.meta()?;
        meta.escrow_balance = meta
            .escrow_balance
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("escrow balance".to_string()))?;
        tx.put_meta(meta)?;

        tx.emit(EngineEvent::AirlineFunded {
            airline: caller,
            amount,
            total: record.funded_amount,
            funded: record.funded,
        });

        tracing::info!(
            airline = %caller,
            amount = %amount,
            total = %record.funded_amount,
            funded = record.funded,
            "Funding received"
        );

        tx.put_airline(record.clone())?;
        Ok(record)
    }

    /// Registered airlines
    pub fn airlines_count<S: StateStore + ?Sized>(store: &S) -> Result<usize> {
        Ok(store.airlines()?.iter().filter(|a| a.registered).count())
    }

    /// Registered and funded airlines (the electorate)
    pub fn funded_count<S: StateStore + ?Sized>(store: &S) -> Result<usize> {
        Ok(store.airlines()?.iter().filter(|a| a.is_active()).count())
    }

    /// Whether `address` is a registered airline
    pub fn is_airline<S: StateStore + ?Sized>(store: &S, address: &Address) -> Result<bool> {
        Ok(store.airline(address)?.map_or(false, |a| a.registered))
    }

    /// Name of a registered airline
    pub fn airline_name<S: StateStore + ?Sized>(
        store: &S,
        address: &Address,
    ) -> Result<Option<String>> {
        Ok(store
            .airline(address)?
            .filter(|a| a.registered)
            .map(|a| a.name))
    }

    /// Registered and funded, or the matching error
    fn require_governor<S: StateStore + ?Sized>(&self, store: &S, caller: &Address) -> Result<()> {
        match store.airline(caller)? {
            Some(airline) if airline.registered && airline.funded => Ok(()),
            Some(airline) if airline.registered => Err(Error::NotFunded),
            _ => Err(Error::Unauthorized(format!(
                "{} is not a registered airline",
                caller
            ))),
        }
    }
}

/// Strictly more than half of the electorate
pub fn has_majority(votes: usize, electorate: usize) -> bool {
    votes * 2 > electorate
}
