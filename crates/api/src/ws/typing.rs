use std::sync::atomic::{AtomicU64, Ordering};

use bson::oid::ObjectId;
use dashmap::DashMap;

/// In-memory typing state, keyed by (conversation, user). Values are
/// generation counters: every start bumps the generation, and an expiry
/// task only clears the entry while its own generation is still current.
/// A restart loses the state, which is acceptable for an indicator with
/// a short TTL.
pub struct TypingTracker {
    entries: DashMap<(ObjectId, ObjectId), u64>,
    generation: AtomicU64,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Marks the user as typing. Returns the new generation and whether
    /// this was a fresh start; a refresh keeps the indicator alive
    /// without another broadcast.
    pub fn start(&self, conversation_id: ObjectId, user_id: ObjectId) -> (u64, bool) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let started = self
            .entries
            .insert((conversation_id, user_id), generation)
            .is_none();
        (generation, started)
    }

    /// Explicit stop. Returns true when the user actually was typing.
    pub fn stop(&self, conversation_id: ObjectId, user_id: ObjectId) -> bool {
        self.entries.remove(&(conversation_id, user_id)).is_some()
    }

    /// TTL expiry. Clears the entry only when `generation` is still the
    /// latest one, so a refresh that raced the timer wins.
    pub fn expire(&self, conversation_id: ObjectId, user_id: ObjectId, generation: u64) -> bool {
        self.entries
            .remove_if(&(conversation_id, user_id), |_, current| {
                *current == generation
            })
            .is_some()
    }

    pub fn is_typing(&self, conversation_id: ObjectId, user_id: ObjectId) -> bool {
        self.entries.contains_key(&(conversation_id, user_id))
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
