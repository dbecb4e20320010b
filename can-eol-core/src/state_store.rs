//! Shared latest-value store
//!
//! Thread-safe cache of the most recent value of every signal, written by the
//! decode pipeline and read by observers (UI indicators, sequencers). Changes
//! are published over channels: one general channel per subscriber, plus a
//! priority channel for a configured subset of signals such as the vehicle
//! power mode.
//!
//! A notification is only sent when the value actually changes. Sends never
//! block: each subscriber channel is bounded, and a change that does not fit
//! in a full channel is dropped and counted. The cache itself is always
//! updated.

use crate::types::SignalValue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard};

/// Default number of undelivered changes a subscriber channel holds
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// A published change
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub signal: String,
    pub value: SignalValue,
}

// A poisoned lock only means another thread panicked mid-update; the map is
// still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct Subscribers {
    general: Vec<SyncSender<StateChange>>,
    priority: Vec<SyncSender<StateChange>>,
}

/// Latest-value cache with change notification
#[derive(Debug)]
pub struct StateStore {
    latest: Mutex<HashMap<String, SignalValue>>,
    subscribers: Mutex<Subscribers>,
    priority_signals: HashSet<String>,
    subscriber_capacity: usize,
    dropped: AtomicU64,
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            latest: Mutex::default(),
            subscribers: Mutex::default(),
            priority_signals: HashSet::new(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            dropped: AtomicU64::new(0),
        }
    }
}

// Deliver to every live subscriber; disconnected ones are removed
fn publish(senders: &mut Vec<SyncSender<StateChange>>, change: &StateChange, dropped: &AtomicU64) {
    senders.retain(|tx| match tx.try_send(change.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            let count = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            log::warn!(
                "Subscriber backlog full, dropped change of {} ({} dropped so far)",
                change.signal,
                count
            );
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    });
}

impl StateStore {
    /// Create a store with no priority signals
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose listed signals also notify the priority channel
    pub fn with_priority_signals<I, S>(signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            priority_signals: signals.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builder method: set the capacity of channels created by later subscribes
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// True if changes of this signal go to the priority channel
    pub fn is_priority(&self, signal_name: &str) -> bool {
        self.priority_signals.contains(signal_name)
    }

    /// Receive every change
    pub fn subscribe(&self) -> Receiver<StateChange> {
        let (tx, rx) = mpsc::sync_channel(self.subscriber_capacity);
        lock(&self.subscribers).general.push(tx);
        rx
    }

    /// Receive changes of priority signals only
    pub fn subscribe_priority(&self) -> Receiver<StateChange> {
        let (tx, rx) = mpsc::sync_channel(self.subscriber_capacity);
        lock(&self.subscribers).priority.push(tx);
        rx
    }

    /// Store a value, notifying subscribers if it differs from the cached one
    ///
    /// # Returns
    /// * `true` if the value changed
    pub fn update(&self, signal_name: &str, value: SignalValue) -> bool {
        {
            let mut latest = lock(&self.latest);
            if latest.get(signal_name) == Some(&value) {
                return false;
            }
            latest.insert(signal_name.to_string(), value.clone());
        }

        let change = StateChange {
            signal: signal_name.to_string(),
            value,
        };

        let mut subscribers = lock(&self.subscribers);
        if self.priority_signals.contains(signal_name) {
            log::debug!("Priority signal {} -> {}", change.signal, change.value);
            publish(&mut subscribers.priority, &change, &self.dropped);
        }
        publish(&mut subscribers.general, &change, &self.dropped);
        true
    }

    /// Latest value of a signal
    pub fn get(&self, signal_name: &str) -> Option<SignalValue> {
        lock(&self.latest).get(signal_name).cloned()
    }

    /// Copy of every cached value
    pub fn snapshot(&self) -> HashMap<String, SignalValue> {
        lock(&self.latest).clone()
    }

    /// Drop every cached value without notifying
    pub fn clear(&self) {
        lock(&self.latest).clear();
    }

    /// Changes not delivered because a subscriber channel was full
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of live subscribers (general, priority)
    pub fn subscriber_count(&self) -> (usize, usize) {
        let subscribers = lock(&self.subscribers);
        (subscribers.general.len(), subscribers.priority.len())
    }
}
