use crate::{config, stat::LeapArray, stat::MetricTrait, utils, Result};
use lru::LruCache;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// LimitKeyCounterBucket counts the passes of every key seen in one bucket time span.
/// The least recently used keys are evicted beyond the configured capacity.
pub struct LimitKeyCounterBucket {
    counter: RwLock<LruCache<String, Arc<AtomicU64>>>,
}

impl Default for LimitKeyCounterBucket {
    fn default() -> Self {
        Self::with_capacity(config::limit_key_capacity())
    }
}

impl fmt::Debug for LimitKeyCounterBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counter = self.counter.read().unwrap();
        f.debug_struct("LimitKeyCounterBucket")
            .field("len", &counter.len())
            .field("cap", &counter.cap())
            .finish()
    }
}

impl MetricTrait for LimitKeyCounterBucket {
    fn reset(&self) {
        self.counter.write().unwrap().clear();
    }
}

impl LimitKeyCounterBucket {
    pub fn with_capacity(cap: usize) -> Self {
        LimitKeyCounterBucket {
            counter: RwLock::new(LruCache::new(cap)),
        }
    }

    /// The counter of `key`, created with zero passes when absent.
    pub fn add_if_absent(&self, key: &str) -> Arc<AtomicU64> {
        if let Some(value) = self.counter.read().unwrap().peek(key) {
            return Arc::clone(value);
        }
        let mut counter = self.counter.write().unwrap();
        if let Some(value) = counter.get(key) {
            return Arc::clone(value);
        }
        let value = Arc::new(AtomicU64::new(0));
        counter.put(key.into(), Arc::clone(&value));
        value
    }

    pub fn add(&self, key: &str, count: u64) {
        self.add_if_absent(key).fetch_add(count, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counter
            .read()
            .unwrap()
            .peek(key)
            .map(|value| value.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counter.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The sliding window of the limit keys of one resource.
pub type LimitKeyLeapArray = LeapArray<LimitKeyCounterBucket>;

/// Outcome of `try_reserve_key_with_time`.
#[derive(Debug)]
pub enum KeyAdmission {
    Reserved(KeyReservation),
    /// The window sum of the key, which leaves no room for the batch.
    Exceeded(u64),
}

/// Passes of a key counted ahead of the rest of the admission.
#[derive(Debug)]
pub struct KeyReservation {
    counter: Arc<AtomicU64>,
    count: u64,
}

impl KeyReservation {
    /// Gives the reserved passes back, e.g. when a later check blocks the invocation.
    /// A bucket recycled meanwhile has already dropped them.
    pub fn release(self) {
        let count = self.count;
        let _ = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                Some(cur.saturating_sub(count))
            });
    }
}

impl LeapArray<LimitKeyCounterBucket> {
    pub fn add_key_with_time(&self, now: u64, key: &str, count: u64) -> Result<()> {
        let bucket = self.get_bucket_of_time(now)?;
        bucket.value().add(key, count);
        Ok(())
    }

    pub fn add_key(&self, key: &str, count: u64) -> Result<()> {
        self.add_key_with_time(utils::curr_time_millis(), key, count)
    }

    /// The passes of `key` in the window ending at `now`.
    pub fn key_sum_with_time(&self, now: u64, key: &str) -> u64 {
        self.get_valid_values(now)
            .iter()
            .map(|bucket| bucket.value().get(key))
            .sum()
    }

    pub fn key_sum(&self, key: &str) -> u64 {
        self.key_sum_with_time(utils::curr_time_millis(), key)
    }

    /// Counts `count` passes of `key` in the bucket of `now` as long as the window
    /// sum stays within `threshold`. The check and the count are one compare-and-swap
    /// on the key's counter, so concurrent callers never overshoot the threshold
    /// together.
    pub fn try_reserve_key_with_time(
        &self,
        now: u64,
        key: &str,
        count: u64,
        threshold: u64,
    ) -> Result<KeyAdmission> {
        let bucket = self.get_bucket_of_time(now)?;
        let current_start = bucket.start_stamp();
        let others: u64 = self
            .get_valid_values_conditional(now, &move |start: u64| start != current_start)
            .iter()
            .map(|bucket| bucket.value().get(key))
            .sum();
        let counter = bucket.value().add_if_absent(key);
        loop {
            let current = counter.load(Ordering::SeqCst);
            let sum = others + current;
            if sum + count > threshold {
                return Ok(KeyAdmission::Exceeded(sum));
            }
            if counter
                .compare_exchange(current, current + count, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(KeyAdmission::Reserved(KeyReservation { counter, count }));
            }
            std::thread::yield_now();
        }
    }

    pub fn try_reserve_key(&self, key: &str, count: u64, threshold: u64) -> Result<KeyAdmission> {
        self.try_reserve_key_with_time(utils::curr_time_millis(), key, count, threshold)
    }
}
