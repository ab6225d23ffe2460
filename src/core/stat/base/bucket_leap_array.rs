use super::{LeapArray, MetricBucket};
use crate::base::{MetricEvent, WriteStat, DEFAULT_STATISTIC_MAX_RT};
use crate::utils::curr_time_millis;
use crate::{logging, Result};
use std::cmp;

/// a specialization of `LeapArray<T>` with `MetricBucket`
pub type BucketLeapArray = LeapArray<MetricBucket>;

impl WriteStat for BucketLeapArray {
    fn add_count(&self, event: MetricEvent, count: u64) {
        if let Err(err) = self.add_count_with_time(curr_time_millis(), event, count) {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!(
                    "[BucketLeapArray] Fail to add count, event {:?}, error: {:?}",
                    event,
                    err
                );
            });
        }
    }
}

impl BucketLeapArray {
    pub fn add_count_with_time(&self, now: u64, event: MetricEvent, count: u64) -> Result<()> {
        let bucket = self.get_bucket_of_time(now)?;
        bucket.value().add(event, count);
        Ok(())
    }

    /// Takes back `count` events from the bucket containing `now`.
    /// Nothing happens once that bucket has been recycled.
    pub fn sub_count_with_time(&self, now: u64, event: MetricEvent, count: u64) {
        if let Ok(bucket) = self.get_bucket_value(now) {
            bucket.sub(event, count);
        }
    }

    pub fn count(&self, event: MetricEvent) -> u64 {
        self.count_with_time(curr_time_millis(), event)
    }

    pub fn count_with_time(&self, now: u64, event: MetricEvent) -> u64 {
        self.get_valid_values(now)
            .iter()
            .map(|b| b.value().get(event))
            .sum()
    }

    pub fn min_rt(&self) -> u64 {
        self.get_current_values()
            .iter()
            .fold(DEFAULT_STATISTIC_MAX_RT, |res, b| {
                cmp::min(res, b.value().min_rt())
            })
    }

    pub fn max_rt(&self) -> u64 {
        self.get_current_values()
            .iter()
            .fold(0, |res, b| cmp::max(res, b.value().max_rt()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SAMPLE_COUNT: u32 = 20;
    const BUCKET_LEN_MS: u32 = 500; // 500 ms
    const INTERVAL_MS: u32 = BUCKET_LEN_MS * SAMPLE_COUNT; // 10 s

    #[test]
    fn add_count() {
        let arr = BucketLeapArray::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        arr.add_count(MetricEvent::Pass, 3);
        arr.add_count(MetricEvent::Block, 1);
        assert_eq!(arr.count(MetricEvent::Pass), 3);
        assert_eq!(arr.count(MetricEvent::Block), 1);
        assert_eq!(arr.count(MetricEvent::Complete), 0);
    }

    #[test]
    fn min_max_rt() {
        let arr = BucketLeapArray::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        assert_eq!(arr.min_rt(), DEFAULT_STATISTIC_MAX_RT);
        assert_eq!(arr.max_rt(), 0);
        arr.add_count(MetricEvent::Rt, 100);
        arr.add_count(MetricEvent::Rt, 30);
        assert_eq!(arr.min_rt(), 30);
        assert_eq!(arr.max_rt(), 100);
    }

    #[test]
    fn sub_count() {
        let arr = BucketLeapArray::new(SAMPLE_COUNT, INTERVAL_MS).unwrap();
        let now = 1976296040000u64;
        arr.add_count_with_time(now, MetricEvent::Pass, 5).unwrap();
        arr.sub_count_with_time(now + 100, MetricEvent::Pass, 2);
        assert_eq!(arr.count_with_time(now + 100, MetricEvent::Pass), 3);
        // a bucket that is not the one of `now` is left alone
        arr.sub_count_with_time(now + 600, MetricEvent::Pass, 2);
        assert_eq!(arr.count_with_time(now + 600, MetricEvent::Pass), 3);
    }

    #[test]
    fn concurrent() {
        let arr = Arc::new(BucketLeapArray::new(SAMPLE_COUNT, INTERVAL_MS).unwrap());
        let now = 1976296040000u64;
        let mut handles = Vec::with_capacity(3000);
        for t in 0..3000u64 {
            let arr = Arc::clone(&arr);
            handles.push(thread::spawn(move || {
                arr.add_count_with_time(now + (t % 20) * 500, MetricEvent::Pass, 1)
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(
            arr.count_with_time(now + 19 * 500, MetricEvent::Pass),
            3000
        );
    }
}
