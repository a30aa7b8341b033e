//! Oracle request lifecycle: open, collect responses, close

use crate::quorum::{reduce, ResponseOutcome};
use escrow::InsuranceEscrow;
use surety_core::{
    crypto, Address, EngineEvent, Error, FlightCode, IndexId, OracleRequest, Policy, RequestKey,
    Result, StateStore, StatusCode, Transition,
};

/// Request and quorum rules
#[derive(Debug, Clone)]
pub struct OracleConsensus {
    min_responses: usize,
    index_space: IndexId,
    request_timeout_secs: i64,
}

impl OracleConsensus {
    /// Create consensus rules from a policy
    pub fn new(policy: &Policy) -> Self {
        Self {
            min_responses: policy.min_responses,
            index_space: policy.index_space,
            request_timeout_secs: policy.request_timeout_secs,
        }
    }

    /// Distinct matching responses that close a request
    pub fn min_responses(&self) -> usize {
        self.min_responses
    }

    /// Open a request for `code` operated by `airline`
    ///
    /// The index is drawn from the requester and the stored nonce. A draw
    /// landing on an open request returns that request and announces it
    /// again; draws landing on closed requests are retried, since a closed
    /// request never reopens.
    pub fn fetch_flight_status<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
        now: i64,
    ) -> Result<RequestKey> {
        let flight = tx
            .flight(code)?
            .filter(|f| f.exists && f.key.airline == airline)
            .ok_or_else(|| Error::UnknownFlight(code.clone()))?;

        let mut meta = tx.meta()?;
        // Enough draws to hit every slot with overwhelming probability
        let attempts = self.index_space as usize * 8;

        for _ in 0..attempts {
            let index = crypto::draw_index(&caller, &mut meta.index_nonce, self.index_space)?;
            let key = RequestKey {
                index,
                airline,
                flight: flight.key.code.clone(),
                timestamp,
            };

            match tx.request(&key)? {
                None => {
                    tx.put_meta(meta)?;
                    tx.put_request(OracleRequest::open(key.clone(), caller, now))?;
                    tx.emit(EngineEvent::OracleRequested {
                        index,
                        airline,
                        flight: code.clone(),
                        timestamp,
                    });

                    tracing::info!(
                        index,
                        airline = %airline,
                        flight = %code,
                        timestamp,
                        "Oracle request opened"
                    );
                    return Ok(key);
                }
                Some(existing) if existing.open => {
                    tx.put_meta(meta)?;
                    // Announce again for oracles that missed the first event
                    tx.emit(EngineEvent::OracleRequested {
                        index,
                        airline,
                        flight: code.clone(),
                        timestamp,
                    });
                    tracing::debug!(request = %key, "Oracle request already open");
                    return Ok(key);
                }
                Some(_) => continue,
            }
        }

        tracing::warn!(flight = %code, timestamp, "Every index slot already closed");
        Err(Error::RequestClosed)
    }

    /// Count one oracle response
    #[allow(clippy::too_many_arguments)]
    pub fn submit_oracle_response<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        index: IndexId,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        let serves = tx.oracle(&caller)?.map_or(false, |o| o.serves(index));
        if !serves {
            return Err(Error::IndexMismatch { index });
        }

        let key = RequestKey {
            index,
            airline,
            flight: code.clone(),
            timestamp,
        };
        let mut request = tx
            .request(&key)?
            .filter(|r| r.open)
            .ok_or(Error::RequestClosed)?;

        let outcome = reduce(&mut request, caller, status, self.min_responses);
        match outcome {
            ResponseOutcome::Duplicate => {
                tracing::debug!(oracle = %caller, request = %key, "Duplicate oracle response ignored");
                return Ok(outcome);
            }
            ResponseOutcome::Accepted { count } => {
                tracing::info!(oracle = %caller, request = %key, status = %status, count, "Oracle response accepted");
            }
            ResponseOutcome::Resolved { .. } => {}
        }

        tx.put_request(request)?;
        tx.emit(EngineEvent::OracleReport {
            airline,
            flight: code.clone(),
            timestamp,
            status,
            oracle: caller,
        });

        if let ResponseOutcome::Resolved { status } = outcome {
            self.finalize(tx, &key, status)?;
        }

        Ok(outcome)
    }

    /// Close a stale request with a status supplied by an authorized caller
    #[allow(clippy::too_many_arguments)]
    pub fn submit_default_status<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        caller: Address,
        index: IndexId,
        airline: Address,
        code: &FlightCode,
        timestamp: i64,
        status: StatusCode,
        now: i64,
    ) -> Result<StatusCode> {
        if !tx.meta()?.authorized_callers.contains(&caller) {
            return Err(Error::Unauthorized(format!(
                "{} may not submit default statuses",
                caller
            )));
        }

        if !status.is_terminal() {
            return Err(Error::InvalidStatus(format!(
                "default status must be terminal, got {}",
                status
            )));
        }

        let key = RequestKey {
            index,
            airline,
            flight: code.clone(),
            timestamp,
        };
        let mut request = tx
            .request(&key)?
            .filter(|r| r.open)
            .ok_or(Error::RequestClosed)?;

        let age = now - request.opened_at;
        if age < self.request_timeout_secs {
            return Err(Error::RequestNotExpired {
                remaining_secs: self.request_timeout_secs - age,
            });
        }

        request.open = false;
        request.resolved = Some(status);
        tx.put_request(request)?;

        tracing::warn!(caller = %caller, request = %key, status = %status, age, "Default status applied");

        self.finalize(tx, &key, status)?;
        Ok(status)
    }

    /// Request by key
    pub fn request<S: StateStore + ?Sized>(
        store: &S,
        key: &RequestKey,
    ) -> Result<Option<OracleRequest>> {
        store.request(key)
    }

    /// Publish a closed request and freeze the flight status
    fn finalize<S: StateStore + ?Sized>(
        &self,
        tx: &mut Transition<'_, S>,
        key: &RequestKey,
        status: StatusCode,
    ) -> Result<()> {
        tx.emit(EngineEvent::FlightStatusInfo {
            airline: key.airline,
            flight: key.flight.clone(),
            timestamp: key.timestamp,
            status,
        });

        tracing::info!(request = %key, status = %status, "Oracle request closed");

        let mut flight = match tx.flight(&key.flight)? {
            Some(flight) => flight,
            None => return Ok(()),
        };

        if flight.status.is_terminal() || !status.is_terminal() {
            tracing::debug!(
                flight = %key.flight,
                current = %flight.status,
                reported = %status,
                "Flight status left unchanged"
            );
            return Ok(());
        }

        flight.status = status;
        tx.put_flight(flight)?;

        if status == StatusCode::LateAirline {
            InsuranceEscrow::credit_flight(tx, &key.flight)?;
        }

        Ok(())
    }
}
