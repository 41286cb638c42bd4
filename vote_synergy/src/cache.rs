//! Process-wide memoization of the load step.
//!
//! Loading, sanitizing and joining a batch is by far the most expensive part of
//! the pipeline. The cache runs it at most once per content fingerprint: the
//! first caller computes the value, the concurrent callers for the same key
//! wait for it and share the result.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use log::{debug, warn};

/// SHA-256 fingerprint of the given parts.
///
/// Each part is length-prefixed so that moving bytes from one part to the
/// next changes the fingerprint.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut buffer = String::new();
    for p in parts.iter() {
        buffer.push_str(&p.len().to_string());
        buffer.push(':');
        buffer.push_str(p);
    }
    sha256::digest(buffer)
}

enum SlotState<V> {
    Pending,
    Ready(Arc<V>),
    Failed,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    done: Condvar,
}

impl<V> Slot<V> {
    fn new() -> Slot<V> {
        Slot {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
        }
    }
}

/// A single-flight cache of loaded values, keyed by fingerprint.
pub struct LoadCache<V> {
    slots: Mutex<HashMap<String, Arc<Slot<V>>>>,
}

/// The computation a leader is running.
///
/// Dropping it before `finish` or `abandon` (the load panicked) abandons the
/// entry, so waiters never hang on it.
struct Flight<'a, V> {
    cache: &'a LoadCache<V>,
    key: &'a str,
    slot: Arc<Slot<V>>,
    landed: bool,
}

impl<'a, V> Flight<'a, V> {
    fn finish(mut self, v: V) -> Arc<V> {
        let v = Arc::new(v);
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Ready(v.clone());
        self.slot.done.notify_all();
        self.landed = true;
        v
    }

    fn abandon(&mut self) {
        {
            let mut slots = self.cache.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.get(self.key).map(|s| Arc::ptr_eq(s, &self.slot)) == Some(true) {
                slots.remove(self.key);
            }
        }
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Failed;
        self.slot.done.notify_all();
        self.landed = true;
    }
}

impl<'a, V> Drop for Flight<'a, V> {
    fn drop(&mut self) {
        if !self.landed {
            warn!("get_or_load: computation of {} did not return", self.key);
            self.abandon();
        }
    }
}

impl<V> Default for LoadCache<V> {
    fn default() -> Self {
        LoadCache::new()
    }
}

impl<V> LoadCache<V> {
    pub fn new() -> LoadCache<V> {
        LoadCache {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key`, or computes it with `load`.
    ///
    /// At most one computation per key is in flight. When it fails, its error
    /// goes to the caller that ran it, the entry is removed and the callers
    /// that were waiting on it start over. A panicking computation is handled
    /// like a failed one before the panic goes on.
    pub fn get_or_load<E, F>(&self, key: &str, load: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        loop {
            let (slot, leader) = {
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                match slots.get(key) {
                    Some(slot) => (slot.clone(), false),
                    None => {
                        let slot = Arc::new(Slot::new());
                        slots.insert(key.to_string(), slot.clone());
                        (slot, true)
                    }
                }
            };

            if leader {
                debug!("get_or_load: computing {}", key);
                let mut flight = Flight {
                    cache: self,
                    key,
                    slot,
                    landed: false,
                };
                return match load() {
                    Ok(v) => Ok(flight.finish(v)),
                    Err(e) => {
                        warn!("get_or_load: computation of {} failed", key);
                        flight.abandon();
                        Err(e)
                    }
                };
            }

            let mut state = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
            while let SlotState::Pending = *state {
                state = slot
                    .done
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match &*state {
                SlotState::Ready(v) => {
                    debug!("get_or_load: hit {}", key);
                    return Ok(v.clone());
                }
                // The failed entry is already gone: start over.
                _ => debug!("get_or_load: retrying {}", key),
            }
        }
    }

    /// Forgets the value of `key`. Returns whether there was one.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
