//! Premium purchase, resolution credit and withdrawal accounting

use surety_core::{
    Address, Amount, EngineEvent, Error, FlightCode, Passenger, Policy, Purchase, Result,
    StateStore, Transition,
};

/// Insurance escrow rules
#[derive(Debug, Clone)]
pub struct InsuranceEscrow {
    max_premium: Amount,
}

impl InsuranceEscrow {
    /// Create escrow rules from a policy
    pub fn new(policy: &Policy) -> Self {
        Self {
            max_premium: policy.max_premium,
        }
    }

    /// Per-purchase premium cap
    pub fn max_premium(&self) -> Amount {
        self.max_premium
    }

    /// Check a premium against the cap
    pub fn check_premium(&self, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount("premium must be positive".to_string()));
        }
        if amount > self.max_premium {
            return Err(Error::PremiumTooHigh {
                max: self.max_premium,
            });
        }
        Ok(())
    }

    /// Buy insurance on `code` for `caller`; purchases on the same flight accumulate
    pub fn buy<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        code: &FlightCode,
        amount: Amount,
    ) -> Result<Purchase> {
        self.check_premium(amount)?;

        let flight = tx
            .flight(code)?
            .filter(|f| f.exists)
            .ok_or_else(|| Error::UnknownFlight(code.clone()))?;
        if flight.status.is_terminal() {
            return Err(Error::FlightResolved(code.clone()));
        }

        let mut passenger = tx
            .passenger(&caller)?
            .unwrap_or_else(|| Passenger::new(caller));
        let purchase = passenger
            .purchases
            .entry(code.clone())
            .or_insert(Purchase {
                premium: Amount::ZERO,
                settled: false,
            });
        purchase.premium = purchase
            .premium
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("premium on {}", code)))?;
        let purchase = *purchase;

        let mut meta = tx.meta()?;
        meta.escrow_balance = meta
            .escrow_balance
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("escrow balance".to_string()))?;

        tx.put_meta(meta)?;
        tx.put_passenger(passenger)?;

        tx.emit(EngineEvent::InsurancePurchased {
            passenger: caller,
            flight: code.clone(),
            amount,
            total: purchase.premium,
        });

        tracing::info!(
            passenger = %caller,
            flight = %code,
            amount = %amount,
            total = %purchase.premium,
            "Insurance purchased"
        );

        Ok(purchase)
    }

    /// Credit every unsettled purchase on `code` with its payout
    ///
    /// Runs when the flight resolves to `LateAirline`. Settled purchases are
    /// skipped, so a second call credits nothing.
    pub fn credit_flight<S: StateStore + ?Sized>(
        tx: &mut Transition<'_, S>,
        code: &FlightCode,
    ) -> Result<Vec<(Address, Amount)>> {
        let mut credited = Vec::new();

        for mut passenger in tx.passengers()? {
            let payout = match passenger.purchases.get_mut(code) {
                Some(purchase) if !purchase.settled => {
                    purchase.settled = true;
                    purchase
                        .premium
                        .payout()
                        .ok_or_else(|| Error::Overflow(format!("payout on {}", code)))?
                }
                _ => continue,
            };

            passenger.credit = passenger
                .credit
                .checked_add(payout)
                .ok_or_else(|| Error::Overflow(format!("credit of {}", passenger.address)))?;

            let address = passenger.address;
            tx.put_passenger(passenger)?;
            tx.emit(EngineEvent::PassengerCredited {
                passenger: address,
                flight: code.clone(),
                amount: payout,
            });

            tracing::info!(passenger = %address, flight = %code, amount = %payout, "Passenger credited");
            credited.push((address, payout));
        }

        Ok(credited)
    }

    /// Withdrawable credit of `passenger`
    pub fn credit_to_pay<S: StateStore + ?Sized>(store: &S, passenger: &Address) -> Result<Amount> {
        Ok(store
            .passenger(passenger)?
            .map_or(Amount::ZERO, |p| p.credit))
    }

    /// First phase of a withdrawal: zero the credit and debit the pool
    ///
    /// Must be committed before the external transfer runs.
    pub fn prepare_withdrawal<S: StateStore + ?Sized>(
        tx: &mut Transition<'_, S>,
        caller: Address,
    ) -> Result<Amount> {
        let mut passenger = tx.passenger(&caller)?.ok_or(Error::NoCredit)?;
        let credit = passenger.credit;
        if credit.is_zero() {
            return Err(Error::NoCredit);
        }

        let mut meta = tx.meta()?;
        let available = meta.escrow_balance;
        meta.escrow_balance = available
            .checked_sub(credit)
            .ok_or(Error::InsufficientEscrow {
                available,
                requested: credit,
            })?;

        passenger.credit = Amount::ZERO;
        tx.put_passenger(passenger)?;
        tx.put_meta(meta)?;

        tracing::debug!(passenger = %caller, amount = %credit, "Withdrawal prepared");
        Ok(credit)
    }

    /// Transfer went through
    pub fn settle_withdrawal<S: StateStore + ?Sized>(
        tx: &mut Transition<'_, S>,
        caller: Address,
        amount: Amount,
    ) {
        tx.emit(EngineEvent::CreditPaid {
            passenger: caller,
            amount,
        });
        tracing::info!(passenger = %caller, amount = %amount, "Credit paid");
    }

    /// Undo a prepared withdrawal whose transfer failed
    pub fn restore_credit<S: StateStore + ?Sized>(
        tx: &mut Transition<'_, S>,
        caller: Address,
        amount: Amount,
    ) -> Result<()> {
        let mut passenger = tx
            .passenger(&caller)?
            .unwrap_or_else(|| Passenger::new(caller));
        passenger.credit = passenger
            .credit
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("credit of {}", caller)))?;

        let mut meta = tx.meta()?;
        meta.escrow_balance = meta
            .escrow_balance
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow("escrow balance".to_string()))?;

        tx.put_passenger(passenger)?;
        tx.put_meta(meta)?;

        tracing::warn!(passenger = %caller, amount = %amount, "Withdrawal compensated");
        Ok(())
    }

    /// Identities that ever bought insurance
    pub fn passenger_addresses<S: StateStore + ?Sized>(store: &S) -> Result<Vec<Address>> {
        Ok(store.passengers()?.into_iter().map(|p| p.address).collect())
    }

    /// Pooled escrow funds
    pub fn balance<S: StateStore + ?Sized>(store: &S) -> Result<Amount> {
        Ok(store.meta()?.escrow_balance)
    }
}
