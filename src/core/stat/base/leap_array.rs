use super::MetricTrait;
use crate::base::TimePredicate;
use crate::utils::curr_time_millis;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// start stamp of a bucket that holds no data
const DEFAULT_TIME: u64 = 0;

/// BucketWrap represent a slot to record metrics.
/// The metric itself should be atomic.
/// The scope of time is [start_stamp, start_stamp+bucket_len_ms)
#[derive(Debug, Default)]
pub struct BucketWrap<T: MetricTrait> {
    /// The start timestamp of this statistic bucket wrapper.
    start_stamp: AtomicU64,
    /// The actual data structure to record the metrics (e.g. MetricBucket).
    value: T,
}

impl<T: MetricTrait> BucketWrap<T> {
    pub fn new(start_stamp: u64) -> Self {
        BucketWrap {
            start_stamp: AtomicU64::new(start_stamp),
            value: T::default(),
        }
    }

    pub fn start_stamp(&self) -> u64 {
        self.start_stamp.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn reset_start_stamp(&self, start_stamp: u64) {
        self.start_stamp.store(start_stamp, Ordering::SeqCst);
    }

    pub fn reset_value(&self) {
        self.value.reset();
    }

    pub fn is_time_in_bucket(&self, now: u64, bucket_len_ms: u32) -> bool {
        let start = self.start_stamp();
        start <= now && now < start + (bucket_len_ms as u64)
    }

    pub fn is_deprecated(&self, now: u64, interval: u64) -> bool {
        let start = self.start_stamp();
        now > start && now - start > interval
    }
}

/// The BucketWrap leap array, it treats the inner array as a ring.
/// `sample_count` is the number of BucketWrap, `interval_ms` the time span of the whole ring.
/// For example, bucket_len_ms is 200ms, interval_ms is 1000ms, so sample_count is 5.
///
/// Buckets are recycled lazily: the first caller that lands on a bucket whose start
/// stamp is behind the target resets it under a per-bucket mutex, the counters inside
/// the bucket are atomic and never locked.
#[derive(Debug)]
pub struct LeapArray<T: MetricTrait> {
    bucket_len_ms: u32,
    sample_count: u32,
    interval_ms: u32,
    pub(crate) array: Vec<Arc<BucketWrap<T>>>,
    mutex: Vec<Mutex<()>>,
}

impl<T: MetricTrait> LeapArray<T> {
    pub fn new(sample_count: u32, interval_ms: u32) -> Result<Self> {
        if sample_count == 0 || interval_ms == 0 || interval_ms % sample_count != 0 {
            return Err(Error::msg(
                "Invalid sample count or interval_ms. Time span needs to be evenly divided",
            ));
        }
        let mut array = Vec::with_capacity(sample_count as usize);
        let mut mutex = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            array.push(Arc::new(BucketWrap::default()));
            mutex.push(Mutex::new(()));
        }
        Ok(LeapArray {
            bucket_len_ms: interval_ms / sample_count,
            sample_count,
            interval_ms,
            array,
            mutex,
        })
    }

    pub fn bucket_len_ms(&self) -> u32 {
        self.bucket_len_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    fn reset_bucket(&self, idx: usize, start_stamp: u64) {
        self.array[idx].reset_value();
        self.array[idx].reset_start_stamp(start_stamp);
    }

    pub fn current_bucket(&self) -> Result<Arc<BucketWrap<T>>> {
        self.get_bucket_of_time(curr_time_millis())
    }

    pub fn get_bucket_of_time(&self, now: u64) -> Result<Arc<BucketWrap<T>>> {
        let idx = self.time2idx(now) as usize;
        let target_start = self.calculate_start_stamp(now);
        /*
        Get bucket item at given time from the array.
        - (1) Bucket is absent, then just claim it for the target start.
        - (2) Bucket is up-to-date, then just return the bucket.
        - (3) Bucket is deprecated, then reset it under the bucket's update lock.
        */
        let bucket = &self.array[idx];
        loop {
            let start = bucket.start_stamp();
            if start == DEFAULT_TIME {
                /*
                     B0       B1      B2    NULL      B4
                ||_______|_______|_______|_______|_______||___
                200     400     600     800     1000    1200  timestamp
                                            ^
                                         time=888
                           bucket is empty, so claim it
                */
                if bucket
                    .start_stamp
                    .compare_exchange(DEFAULT_TIME, target_start, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(Arc::clone(bucket));
                }
            } else if start == target_start {
                /*
                    B0       B1      B2     B3      B4
                ||_______|_______|_______|_______|_______||___
                200     400     600     800     1000    1200  timestamp
                                            ^
                                         time=888
                           start of Bucket 3: 800, so it's up-to-date
                */
                return Ok(Arc::clone(bucket));
            } else if target_start > start {
                /*
                  (old)
                            B0       B1      B2    NULL      B4
                |_______||_______|_______|_______|_______|_______||___
                ...    1200     1400    1600    1800    2000    2200  timestamp
                                             ^
                                          time=1676
                         start of Bucket 2: 400, deprecated, should be reset
                The reset and clean-up are not atomic, so the bucket's update lock
                is taken. It is only contended when a bucket is recycled.
                 */
                if let Ok(_guard) = self.mutex[idx].try_lock() {
                    // another thread may have recycled the bucket meanwhile
                    if bucket.start_stamp() < target_start {
                        self.reset_bucket(idx, target_start);
                    }
                    if bucket.start_stamp() == target_start {
                        return Ok(Arc::clone(bucket));
                    }
                } else {
                    std::thread::yield_now();
                }
            } else {
                return Err(Error::msg("invalid time stamp, cannot find bucket"));
            }
        }
    }

    /// compute the start timestamp of the bucket containing `now`
    pub(crate) fn calculate_start_stamp(&self, now: u64) -> u64 {
        now - now % (self.bucket_len_ms as u64)
    }

    pub(crate) fn time2idx(&self, now: u64) -> u64 {
        let idx = now / (self.bucket_len_ms as u64);
        idx % (self.sample_count as u64)
    }

    /// The value of the bucket containing `now`, without rotating anything.
    pub fn get_bucket_value(&self, now: u64) -> Result<&T> {
        let idx = self.time2idx(now) as usize;
        let bucket = &self.array[idx];
        if bucket.is_time_in_bucket(now, self.bucket_len_ms) {
            Ok(bucket.value())
        } else {
            Err(Error::msg("invalid time, cannot get value in the bucket"))
        }
    }

    pub fn get_current_values(&self) -> Vec<Arc<BucketWrap<T>>> {
        self.get_valid_values(curr_time_millis())
    }

    /// Get all BucketWrap between [now - interval_ms, now]
    pub fn get_valid_values(&self, now: u64) -> Vec<Arc<BucketWrap<T>>> {
        self.get_valid_values_conditional(now, &|_| true)
    }

    /// Collects the valid buckets satisfying `condition` on their start stamp.
    /// Deprecated buckets met on the way are cleared, so reads recycle stale data too.
    pub fn get_valid_values_conditional(
        &self,
        now: u64,
        condition: &TimePredicate,
    ) -> Vec<Arc<BucketWrap<T>>> {
        let mut res = Vec::with_capacity(self.sample_count as usize);
        for (idx, bucket) in self.array.iter().enumerate() {
            let start = bucket.start_stamp();
            if start == DEFAULT_TIME {
                continue;
            }
            if bucket.is_deprecated(now, self.interval_ms as u64) {
                self.clear_deprecated(idx, now);
                continue;
            }
            if condition(start) {
                res.push(Arc::clone(bucket));
            }
        }
        res
    }

    /// Zeroes a deprecated bucket and marks it absent. Clearing an already
    /// cleared bucket is a no-op, so repeated reads observe the same state.
    fn clear_deprecated(&self, idx: usize, now: u64) {
        if let Ok(_guard) = self.mutex[idx].try_lock() {
            let bucket = &self.array[idx];
            if bucket.start_stamp() != DEFAULT_TIME
                && bucket.is_deprecated(now, self.interval_ms as u64)
            {
                self.reset_bucket(idx, DEFAULT_TIME);
            }
        }
    }

    /// Clears every bucket.
    pub fn reset(&self) {
        for idx in 0..self.array.len() {
            let _guard = self.mutex[idx].lock().unwrap();
            self.reset_bucket(idx, DEFAULT_TIME);
        }
    }
}
