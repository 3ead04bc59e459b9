//! Transaction manager.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{TxnError, TxnResult};
use crate::events::{EventFeed, EventKind, TransactionEvent};
use crate::registry::{ObjectRegistry, ParticipantMap};
use crate::stats::{StatsSnapshot, TransactionStats};
use crate::transaction::state::{Transaction, TransactionState};
use crate::types::{Outcome, TransactionId};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::time::Instant;
use tracing::{debug, trace};

/// Global listener for the "pending" broadcast.
pub type PendingListener = Box<dyn FnMut(&mut Transaction)>;

/// Listener for the `done` notification.
pub type DoneListener = Box<dyn FnMut(TransactionId, Outcome)>;

/// A transaction the manager has assigned an ID to.
struct Tracked {
    id: TransactionId,
    txn: Transaction,
}

/// Owns submitted transactions and drives them to completion.
///
/// The manager provides:
/// - The expansion loop that lets collaborators add instructions
/// - ID assignment once a transaction is final
/// - Serialization: at most one in-flight transaction per object
/// - Commit scheduling, timeouts and `done` fan-out
///
/// ## Event loop integration
///
/// Nothing is committed inside [`submit`](Self::submit). The host event
/// loop calls [`dispatch`](Self::dispatch) once per iteration, and sleeps
/// no longer than [`next_deadline`](Self::next_deadline) in between.
///
/// ## Conflicts
///
/// A submitted transaction that touches an object of a transaction still
/// waiting to commit is merged into it. One that only overlaps in-flight
/// work, or finished work still waiting for [`apply`](Self::apply), waits
/// in the queue until that work is applied or cancelled.
pub struct TransactionManager<R = ParticipantMap> {
    config: Config,
    clock: Box<dyn Clock>,
    registry: R,
    /// Next transaction ID.
    next_id: u64,
    /// PENDING transactions in submission order.
    scheduled: VecDeque<Tracked>,
    /// COMMITTED transactions waiting for readiness.
    in_flight: Vec<Tracked>,
    /// READY/TIMED_OUT transactions waiting for `apply` (when not auto-applying).
    awaiting_apply: Vec<Tracked>,
    pending_listeners: Vec<PendingListener>,
    done_listeners: Vec<DoneListener>,
    feed: EventFeed,
    stats: TransactionStats,
}

impl TransactionManager<ParticipantMap> {
    /// Creates a manager with an empty [`ParticipantMap`] registry.
    pub fn new(config: Config, clock: impl Clock + 'static) -> Self {
        Self::with_registry(config, clock, ParticipantMap::new())
    }
}

impl<R: ObjectRegistry> TransactionManager<R> {
    /// Creates a manager resolving objects through `registry`.
    pub fn with_registry(config: Config, clock: impl Clock + 'static, registry: R) -> Self {
        let feed = EventFeed::with_max_history(config.event_history);
        Self {
            config,
            clock: Box::new(clock),
            registry,
            next_id: 1,
            scheduled: VecDeque::new(),
            in_flight: Vec::new(),
            awaiting_apply: Vec::new(),
            pending_listeners: Vec::new(),
            done_listeners: Vec::new(),
            feed,
            stats: TransactionStats::new(),
        }
    }

    /// Registers a listener for the global "pending" broadcast.
    ///
    /// Called once per expansion round with the transaction being built;
    /// the listener may add instructions to it.
    pub fn on_pending<F>(&mut self, listener: F)
    where
        F: FnMut(&mut Transaction) + 'static,
    {
        self.pending_listeners.push(Box::new(listener));
    }

    /// Registers a listener for the `done` notification.
    pub fn on_done<F>(&mut self, listener: F)
    where
        F: FnMut(TransactionId, Outcome) + 'static,
    {
        self.done_listeners.push(Box::new(listener));
    }

    /// Submits a NEW transaction.
    ///
    /// Runs the expansion loop to a fixed point, stages the transaction,
    /// then either merges it into a scheduled transaction it conflicts with
    /// (returning that transaction's ID) or assigns it the next ID and
    /// schedules it for the next [`dispatch`](Self::dispatch).
    pub fn submit(&mut self, mut txn: Transaction) -> TxnResult<TransactionId> {
        if txn.state() != TransactionState::New {
            return Err(TxnError::invalid_state("submit", txn.state()));
        }

        let rounds = self.expand(&mut txn)?;
        txn.set_default_timeout(self.config.commit_timeout);
        txn.set_pending()?;
        self.stats.record_submit(rounds);

        // Merge into the latest conflicting transaction so the merged
        // instructions still commit after every earlier conflicting one.
        if let Some(index) = self
            .scheduled
            .iter()
            .rposition(|tracked| tracked.txn.does_intersect(&txn))
        {
            let target = &mut self.scheduled[index];
            target.txn.merge(txn)?;
            target.txn.clear_dirty();
            let id = target.id;
            let objects = target.txn.objects().into_iter().collect();
            debug!(%id, rounds, "merged submission into scheduled transaction");
            self.stats.record_merge();
            self.feed.emit(id, EventKind::Merged { objects });
            return Ok(id);
        }

        let id = TransactionId::new(self.next_id);
        self.next_id += 1;
        txn.assign_id(id);

        let objects: Vec<_> = txn.objects().into_iter().collect();
        debug!(%id, rounds, instructions = txn.len(), ?objects, "transaction submitted");
        self.feed.emit(id, EventKind::Submitted { objects });
        self.scheduled.push_back(Tracked { id, txn });
        Ok(id)
    }

    fn expand(&mut self, txn: &mut Transaction) -> TxnResult<usize> {
        let mut rounds = 0;
        while txn.is_dirty() {
            if rounds == self.config.max_expansion_rounds {
                return Err(TxnError::ExpansionLimit { rounds });
            }
            rounds += 1;
            txn.clear_dirty();
            trace!(round = rounds, instructions = txn.len(), "expansion round");

            for listener in &mut self.pending_listeners {
                listener(txn);
            }
            for object in txn.objects() {
                if let Some(participant) = self.registry.resolve(&object) {
                    trace!(%object, "notifying participant");
                    participant.transaction_pending(txn);
                }
            }
        }
        Ok(rounds)
    }

    /// Runs one event loop iteration.
    ///
    /// Collects outcomes of scheduled and in-flight transactions (emitting
    /// `done` and applying as configured), then commits every scheduled
    /// transaction whose objects are free, until nothing changes. Returns
    /// the number of transactions that finished or started committing.
    pub fn dispatch(&mut self) -> TxnResult<usize> {
        let now = self.clock.now();
        let mut changes = 0;
        loop {
            let step = self.collect_finished(now)? + self.commit_eligible(now)?;
            if step == 0 {
                break;
            }
            changes += step;
        }
        Ok(changes)
    }

    fn collect_finished(&mut self, now: Instant) -> TxnResult<usize> {
        let mut finished = Vec::new();

        let mut index = 0;
        while index < self.in_flight.len() {
            if let Some(outcome) = self.in_flight[index].txn.poll(now) {
                finished.push((self.in_flight.remove(index), outcome));
            } else {
                index += 1;
            }
        }

        // Scheduled transactions can only finish by being cancelled.
        let mut index = 0;
        while index < self.scheduled.len() {
            match self.scheduled[index].txn.poll(now) {
                Some(outcome) => {
                    if let Some(tracked) = self.scheduled.remove(index) {
                        finished.push((tracked, outcome));
                    }
                }
                None => index += 1,
            }
        }

        let count = finished.len();
        for (tracked, outcome) in finished {
            self.finish(tracked, outcome)?;
        }
        Ok(count)
    }

    fn commit_eligible(&mut self, now: Instant) -> TxnResult<usize> {
        let mut committed = 0;
        let mut index = 0;
        while index < self.scheduled.len() {
            let candidate = &self.scheduled[index].txn;
            let blocked = self
                .in_flight
                .iter()
                .any(|tracked| tracked.txn.does_intersect(candidate))
                || self
                    .awaiting_apply
                    .iter()
                    .any(|tracked| tracked.txn.does_intersect(candidate))
                || self
                    .scheduled
                    .iter()
                    .take(index)
                    .any(|tracked| tracked.txn.does_intersect(candidate));
            if blocked {
                trace!(id = %self.scheduled[index].id, "transaction waits for conflicting work");
                index += 1;
                continue;
            }

            let Some(mut tracked) = self.scheduled.remove(index) else {
                break;
            };
            self.stats.record_commit();
            self.feed.emit(tracked.id, EventKind::Committed);
            committed += 1;

            match tracked.txn.commit(now)? {
                Some(outcome) => self.finish(tracked, outcome)?,
                None => self.in_flight.push(tracked),
            }
        }
        Ok(committed)
    }

    fn finish(&mut self, tracked: Tracked, outcome: Outcome) -> TxnResult<()> {
        debug!(id = %tracked.id, %outcome, "transaction done");
        self.stats.record_outcome(outcome);
        self.feed.emit(tracked.id, EventKind::Done(outcome));
        for listener in &mut self.done_listeners {
            listener(tracked.id, outcome);
        }

        if outcome.is_applicable() {
            if self.config.auto_apply {
                self.apply_tracked(tracked)?;
            } else {
                self.awaiting_apply.push(tracked);
            }
        }
        Ok(())
    }

    fn apply_tracked(&mut self, mut tracked: Tracked) -> TxnResult<()> {
        tracked.txn.apply()?;
        self.stats.record_apply();
        self.feed.emit(tracked.id, EventKind::Applied);
        Ok(())
    }

    /// Applies a finished transaction parked because `auto_apply` is off.
    ///
    /// Work queued behind it on the same objects becomes eligible and is
    /// dispatched before this returns.
    pub fn apply(&mut self, id: TransactionId) -> TxnResult<()> {
        let position = self
            .awaiting_apply
            .iter()
            .position(|tracked| tracked.id == id)
            .ok_or(TxnError::UnknownTransaction(id))?;
        let tracked = self.awaiting_apply.remove(position);
        self.apply_tracked(tracked)?;
        self.dispatch()?;
        Ok(())
    }

    /// Returns the earliest commit timeout among in-flight transactions.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight
            .iter()
            .filter_map(|tracked| tracked.txn.deadline())
            .min()
    }

    /// Returns a transaction the manager still holds.
    #[must_use]
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.scheduled
            .iter()
            .chain(&self.in_flight)
            .chain(&self.awaiting_apply)
            .find(|tracked| tracked.id == id)
            .map(|tracked| &tracked.txn)
    }

    /// Returns the number of transactions waiting to commit.
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Returns the number of committed transactions waiting for readiness.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the number of finished transactions waiting for `apply`.
    #[must_use]
    pub fn awaiting_apply_count(&self) -> usize {
        self.awaiting_apply.len()
    }

    /// Returns true if the manager holds no transactions.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduled.is_empty() && self.in_flight.is_empty() && self.awaiting_apply.is_empty()
    }

    /// Returns a snapshot of the manager's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> Receiver<TransactionEvent> {
        self.feed.subscribe()
    }

    /// Returns the lifecycle event feed.
    #[must_use]
    pub fn events(&self) -> &EventFeed {
        &self.feed
    }

    /// Returns the object registry.
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Returns the object registry for registering participants.
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<R> std::fmt::Debug for TransactionManager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("next_id", &self.next_id)
            .field("scheduled", &self.scheduled.len())
            .field("in_flight", &self.in_flight.len())
            .field("awaiting_apply", &self.awaiting_apply.len())
            .finish_non_exhaustive()
    }
}
