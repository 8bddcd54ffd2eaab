//! Suppression of duplicate messages written to a switch in quick succession

use openflow::messages::{OfpMessage, OfpType};
use services::OfSwitch;
use types::DatapathId;

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Writes messages to switches, dropping a message of a dampened type
/// if the very same message was written to the same switch within the window.
pub struct MessageDamper {
    capacity: usize,
    window: Duration,
    dampened: HashSet<OfpType>,
    cache: Mutex<HashMap<(DatapathId, OfpMessage), Instant>>,
}

impl MessageDamper {
    pub fn new(capacity: usize, window: Duration, dampened: &[OfpType]) -> MessageDamper {
        MessageDamper {
            capacity,
            window,
            dampened: dampened.iter().cloned().collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Writes `msg` unless it is dampened. Returns whether it was written.
    pub fn write(&self, sw: &dyn OfSwitch, msg: &OfpMessage) -> io::Result<bool> {
        if self.is_duplicate(sw.id(), msg, Instant::now()) {
            trace!("Dampened {:?} to switch {}", msg.typ(), sw.id());
            return Ok(false);
        }
        sw.write(msg)?;
        Ok(true)
    }

    /// Writes all messages in order, returning how many were actually written
    pub fn write_all(&self, sw: &dyn OfSwitch, msgs: &[OfpMessage]) -> io::Result<usize> {
        let mut written = 0;
        for msg in msgs {
            if self.write(sw, msg)? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Checks whether `msg` was seen within the window and records it otherwise
    fn is_duplicate(&self, dpid: DatapathId, msg: &OfpMessage, now: Instant) -> bool {
        if !self.dampened.contains(&msg.typ()) || self.capacity == 0 {
            return false;
        }
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        let key = (dpid, msg.clone());
        if let Some(seen) = cache.get(&key) {
            if now.duration_since(*seen) < self.window {
                return true;
            }
        }
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            self.evict(&mut cache, now);
        }
        cache.insert(key, now);
        false
    }

    fn evict(&self, cache: &mut HashMap<(DatapathId, OfpMessage), Instant>, now: Instant) {
        let window = self.window;
        cache.retain(|_, seen| now.duration_since(*seen) < window);
        if cache.len() < self.capacity {
            return;
        }
        let oldest = cache
            .iter()
            .min_by_key(|&(_, seen)| *seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            cache.remove(&key);
        }
    }
}
