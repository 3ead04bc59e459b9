//! Resolution of object IDs to the entities they name.
//!
//! The manager uses the registry for one thing: fanning out the per-object
//! "transaction pending" notification during the expansion loop. The state
//! machine itself never needs it.

use crate::transaction::Transaction;
use crate::types::ObjectId;
use std::collections::HashMap;

/// An entity that wants to hear about transactions touching it.
pub trait TransactionParticipant {
    /// Called during expansion when a transaction names this entity.
    ///
    /// The participant may add further instructions to `txn`.
    fn transaction_pending(&mut self, txn: &mut Transaction);
}

impl<F> TransactionParticipant for F
where
    F: FnMut(&mut Transaction),
{
    fn transaction_pending(&mut self, txn: &mut Transaction) {
        self(txn);
    }
}

/// Maps object IDs to participants.
pub trait ObjectRegistry {
    /// Resolves `object` to its participant, if it still exists.
    fn resolve(&mut self, object: &ObjectId) -> Option<&mut dyn TransactionParticipant>;

    /// Returns true if `object` names a live entity.
    fn contains(&self, object: &ObjectId) -> bool;
}

/// `HashMap`-backed registry; the default for
/// [`TransactionManager`](crate::TransactionManager).
#[derive(Default)]
pub struct ParticipantMap {
    participants: HashMap<ObjectId, Box<dyn TransactionParticipant>>,
}

impl ParticipantMap {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `participant` for `object`, returning the previous one.
    pub fn insert(
        &mut self,
        object: impl Into<ObjectId>,
        participant: impl TransactionParticipant + 'static,
    ) -> Option<Box<dyn TransactionParticipant>> {
        self.participants
            .insert(object.into(), Box::new(participant))
    }

    /// Unregisters the participant for `object`.
    pub fn remove(&mut self, object: &ObjectId) -> Option<Box<dyn TransactionParticipant>> {
        self.participants.remove(object)
    }

    /// Returns the number of registered participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl ObjectRegistry for ParticipantMap {
    fn resolve(&mut self, object: &ObjectId) -> Option<&mut dyn TransactionParticipant> {
        match self.participants.get_mut(object) {
            Some(participant) => Some(participant.as_mut()),
            None => None,
        }
    }

    fn contains(&self, object: &ObjectId) -> bool {
        self.participants.contains_key(object)
    }
}

impl std::fmt::Debug for ParticipantMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut objects: Vec<_> = self.participants.keys().collect();
        objects.sort();
        f.debug_struct("ParticipantMap")
            .field("objects", &objects)
            .finish()
    }
}
