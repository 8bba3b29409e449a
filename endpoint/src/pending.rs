//! Continuations waiting for a RESPONSE, keyed by callback id.

use std::collections::HashMap;

use switchboard_types::CallbackId;

/// Callback ids are handed out from 1 upward and never reused.
///
/// Unanswered entries would accumulate forever, so once the table holds more
/// than `high_water` entries a sweep drops the `batch` oldest live entries,
/// walking ids in allocation order and skipping ones already answered. The
/// walk never goes back. Swept continuations are simply dropped.
#[derive(Debug)]
pub(crate) struct CallbackTable<T> {
    entries: HashMap<u64, T>,
    next_id: CallbackId,
    sweep_cursor: u64,
    high_water: usize,
    batch: u64,
}

impl<T> CallbackTable<T> {
    pub fn new(high_water: usize, batch: u64) -> Self {
        Self {
            entries: HashMap::new(),
            next_id: CallbackId::FIRST,
            sweep_cursor: CallbackId::FIRST.value(),
            high_water,
            batch,
        }
    }

    pub fn insert(&mut self, value: T) -> CallbackId {
        let id = self.next_id;
        self.next_id = id.next();
        self.entries.insert(id.value(), value);
        self.sweep();
        id
    }

    pub fn take(&mut self, id: CallbackId) -> Option<T> {
        self.entries.remove(&id.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns how many entries were evicted.
    fn sweep(&mut self) -> usize {
        if self.entries.len() <= self.high_water {
            return 0;
        }
        let before = self.entries.len();
        let mut evicted = 0;
        while evicted < self.batch && self.sweep_cursor < self.next_id.value() {
            if self.entries.remove(&self.sweep_cursor).is_some() {
                evicted += 1;
            }
            self.sweep_cursor += 1;
        }
        let after = self.entries.len();
        tracing::debug!(before, after, cursor = self.sweep_cursor, "swept unanswered callbacks");
        before - after
    }
}
