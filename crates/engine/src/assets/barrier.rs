//! Fan-in join for multi-asset loads.
//!
//! A [`PendingSet`] is seeded with every key up front. Each underlying load settles its own key
//! exactly once, succeeded or failed; when the last key settles the continuation receives the
//! aggregate [`BarrierOutcome`]. The continuation runs at most once per set.

use std::cell::RefCell;

use tracing::debug;

use crate::signal::ListenerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BarrierOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PendingSet {
    pending: Vec<String>,
    outcome: BarrierOutcome,
    fired: bool,
}

impl PendingSet {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            pending: keys.into_iter().map(Into::into).collect(),
            outcome: BarrierOutcome::default(),
            fired: false,
        }
    }

    pub fn push(&mut self, key: impl Into<String>) {
        self.pending.push(key.into());
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Marks the first occurrence of `key` settled.
    ///
    /// Returns the aggregate outcome when this settlement emptied the set for the first time.
    /// Keys that are not pending are ignored.
    pub fn settle(&mut self, key: &str, settlement: Settlement) -> Option<BarrierOutcome> {
        let index = self.pending.iter().position(|pending| pending == key)?;
        let key = self.pending.remove(index);
        match settlement {
            Settlement::Succeeded => self.outcome.succeeded.push(key),
            Settlement::Failed => self.outcome.failed.push(key),
        }
        self.take_if_drained()
    }

    /// Fires a set that was seeded with no keys at all.
    pub fn take_if_empty(&mut self) -> Option<BarrierOutcome> {
        self.take_if_drained()
    }

    fn take_if_drained(&mut self) -> Option<BarrierOutcome> {
        if !self.pending.is_empty() || self.fired {
            return None;
        }
        self.fired = true;
        Some(std::mem::take(&mut self.outcome))
    }
}

/// Settles `key` as succeeded and runs `on_complete` if that drained the set.
pub fn check_completion<F>(key: &str, pending: &RefCell<PendingSet>, on_complete: F) -> ListenerResult
where
    F: FnOnce(BarrierOutcome) -> ListenerResult,
{
    settle_key(key, Settlement::Succeeded, pending, on_complete)
}

/// Settles `key` as failed and runs `on_complete` if that drained the set.
pub fn check_failure<F>(key: &str, pending: &RefCell<PendingSet>, on_complete: F) -> ListenerResult
where
    F: FnOnce(BarrierOutcome) -> ListenerResult,
{
    settle_key(key, Settlement::Failed, pending, on_complete)
}

pub fn settle_key<F>(
    key: &str,
    settlement: Settlement,
    pending: &RefCell<PendingSet>,
    on_complete: F,
) -> ListenerResult
where
    F: FnOnce(BarrierOutcome) -> ListenerResult,
{
    // The borrow ends before the continuation runs so it may inspect the set.
    let outcome = pending.borrow_mut().settle(key, settlement);
    match outcome {
        Some(outcome) => {
            debug!(
                key,
                succeeded = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                "barrier_released"
            );
            on_complete(outcome)
        }
        None => Ok(()),
    }
}
