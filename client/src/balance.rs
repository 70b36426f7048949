//! Read-only access to a participant's spendable balance
//!
//! The provider is queried, never mutated. Spending is settled by whoever
//! owns the account; [`BalanceTracker`] only remembers what this session has
//! spent since the last poll so purchases between polls can't double-spend.

use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    #[error("no account for participant {0:?}")]
    UnknownParticipant(String),
    #[error("balance provider unavailable: {0}")]
    Unavailable(String),
}

pub trait BalanceProvider {
    fn get_balance(&self, participant_id: &str) -> Result<u64, BalanceError>;
}

/// A provider that always reports the same amount.
#[derive(Debug, Clone, Copy)]
pub struct FixedBalance(pub u64);

impl BalanceProvider for FixedBalance {
    fn get_balance(&self, _participant_id: &str) -> Result<u64, BalanceError> {
        Ok(self.0)
    }
}

/// An in-memory account whose owner settles spends out of band.
#[derive(Debug, Clone, Default)]
pub struct SharedWallet {
    amount: Arc<AtomicU64>,
}

impl SharedWallet {
    pub fn new(amount: u64) -> Self {
        Self {
            amount: Arc::new(AtomicU64::new(amount)),
        }
    }

    /// Settles a spend; saturates at zero.
    pub fn settle(&self, spent: u64) {
        let _ = self
            .amount
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(spent))
            });
    }

    pub fn amount(&self) -> u64 {
        self.amount.load(Ordering::SeqCst)
    }
}

impl BalanceProvider for SharedWallet {
    fn get_balance(&self, _participant_id: &str) -> Result<u64, BalanceError> {
        Ok(self.amount())
    }
}

/// Outcome of asking the tracker to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Polled(u64),
    /// Too soon after the previous poll; retried once the interval elapses
    Deferred(Duration),
}

#[derive(Debug)]
pub struct BalanceTracker {
    participant_id: String,
    min_interval: Duration,
    polled: Option<u64>,
    spent_since_poll: u64,
    last_poll: Option<Instant>,
    refresh_pending: bool,
}

impl BalanceTracker {
    pub fn new(participant_id: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            participant_id: participant_id.into(),
            min_interval,
            polled: None,
            spent_since_poll: 0,
            last_poll: None,
            refresh_pending: false,
        }
    }

    /// Spendable amount: last polled value minus local spends since then.
    /// Zero until the first successful poll.
    pub fn available(&self) -> u64 {
        self.polled
            .unwrap_or(0)
            .saturating_sub(self.spent_since_poll)
    }

    pub fn has_polled(&self) -> bool {
        self.polled.is_some()
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.refresh_pending
    }

    /// Polls the provider unless the previous poll was less than the minimum
    /// interval ago, in which case the refresh is marked pending.
    pub fn refresh<P: BalanceProvider + ?Sized>(
        &mut self,
        provider: &P,
        now: Instant,
    ) -> Result<Refresh, BalanceError> {
        if let Some(last) = self.last_poll {
            let since = now.saturating_duration_since(last);
            if since < self.min_interval {
                self.refresh_pending = true;
                let wait = self.min_interval - since;
                debug!("Balance poll deferred by {:?}", wait);
                return Ok(Refresh::Deferred(wait));
            }
        }

        self.last_poll = Some(now);
        match provider.get_balance(&self.participant_id) {
            Ok(amount) => {
                self.polled = Some(amount);
                self.spent_since_poll = 0;
                self.refresh_pending = false;
                Ok(Refresh::Polled(amount))
            }
            Err(e) => {
                warn!("Balance poll failed: {}", e);
                self.refresh_pending = true;
                Err(e)
            }
        }
    }

    /// Runs a deferred refresh if one is pending.
    pub fn poll_pending<P: BalanceProvider + ?Sized>(
        &mut self,
        provider: &P,
        now: Instant,
    ) -> Option<Result<Refresh, BalanceError>> {
        if !self.refresh_pending {
            return None;
        }
        Some(self.refresh(provider, now))
    }

    /// Marks the cached value stale; the next `poll_pending` re-reads it.
    pub fn request_refresh(&mut self) {
        self.refresh_pending = true;
    }

    pub fn deduct(&mut self, amount: u64) {
        self.spent_since_poll = self.spent_since_poll.saturating_add(amount);
    }
}
