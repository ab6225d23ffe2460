use super::{BucketLeapArray, BucketWrap, MetricBucket};
use crate::base::{
    check_validity_for_reuse_statistic, MetricEvent, ReadStat, DEFAULT_STATISTIC_MAX_RT,
};
use crate::utils::curr_time_millis;
use crate::Result;
use std::cmp;
use std::sync::Arc;

/// SlidingWindowMetric is a read-only view on a `BucketLeapArray`.
/// Several views with different windows may share the same inner array,
/// e.g. a resource keeps a 10s array and the rules read its last second.
#[derive(Debug)]
pub struct SlidingWindowMetric {
    bucket_len_ms: u32,
    sample_count: u32,
    interval_ms: u32,
    inner: Arc<BucketLeapArray>,
}

impl SlidingWindowMetric {
    pub fn new(sample_count: u32, interval_ms: u32, inner: Arc<BucketLeapArray>) -> Result<Self> {
        check_validity_for_reuse_statistic(
            sample_count,
            interval_ms,
            inner.sample_count(),
            inner.interval_ms(),
        )?;
        Ok(SlidingWindowMetric {
            bucket_len_ms: interval_ms / sample_count,
            sample_count,
            interval_ms,
            inner,
        })
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn bucket_len_ms(&self) -> u32 {
        self.bucket_len_ms
    }

    /// Get the start time range of the buckets for the provided time.
    /// The actual time span is: [start, end + inner bucket length).
    pub(crate) fn bucket_start_range(&self, t_ms: u64) -> (u64, u64) {
        let end = self.inner.calculate_start_stamp(t_ms);
        let start = (end + self.inner.bucket_len_ms() as u64).saturating_sub(self.interval_ms as u64);
        (start, end)
    }

    pub(crate) fn satisfied_buckets(&self, now: u64) -> Vec<Arc<BucketWrap<MetricBucket>>> {
        let (start, end) = self.bucket_start_range(now);
        self.inner
            .get_valid_values_conditional(now, &move |curr: u64| start <= curr && curr <= end)
    }

    pub fn interval_s(&self) -> f64 {
        self.interval_ms as f64 / 1000.0
    }

    pub fn sum_with_time(&self, now: u64, event: MetricEvent) -> u64 {
        self.satisfied_buckets(now)
            .iter()
            .map(|b| b.value().get(event))
            .sum()
    }

    pub fn qps_with_time(&self, now: u64, event: MetricEvent) -> f64 {
        self.sum_with_time(now, event) as f64 / self.interval_s()
    }

    pub fn max_of_single_bucket(&self, event: MetricEvent) -> u64 {
        self.satisfied_buckets(curr_time_millis())
            .iter()
            .fold(0, |res, b| cmp::max(res, b.value().get(event)))
    }
}

impl ReadStat for SlidingWindowMetric {
    fn qps(&self, event: MetricEvent) -> f64 {
        self.qps_with_time(curr_time_millis(), event)
    }

    fn sum(&self, event: MetricEvent) -> u64 {
        self.sum_with_time(curr_time_millis(), event)
    }

    fn min_rt(&self) -> f64 {
        self.satisfied_buckets(curr_time_millis())
            .iter()
            .fold(DEFAULT_STATISTIC_MAX_RT, |res, b| {
                cmp::min(res, b.value().min_rt())
            }) as f64
    }

    fn avg_rt(&self) -> f64 {
        let now = curr_time_millis();
        let completed = self.sum_with_time(now, MetricEvent::Complete);
        if completed == 0 {
            0f64
        } else {
            self.sum_with_time(now, MetricEvent::Rt) as f64 / completed as f64
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::WriteStat;

    #[test]
    fn invalid_view() {
        let inner = Arc::new(BucketLeapArray::new(20, 10000).unwrap());
        assert!(SlidingWindowMetric::new(3, 1000, inner.clone()).is_err());
        assert!(SlidingWindowMetric::new(2, 8000, inner).is_err());
    }

    #[test]
    fn start_range() {
        let inner = Arc::new(BucketLeapArray::new(20, 10000).unwrap());
        let swm = SlidingWindowMetric::new(4, 2000, inner).unwrap();
        let (start, end) = swm.bucket_start_range(1678416556599);
        assert_eq!(end, 1678416556500);
        assert_eq!(start, 1678416555000);
    }

    #[test]
    fn sum_within_view() {
        let inner = Arc::new(BucketLeapArray::new(20, 10000).unwrap());
        let swm = SlidingWindowMetric::new(2, 1000, inner.clone()).unwrap();
        let now = 1678416550000u64;
        // one pass per bucket for 5 seconds
        for i in 0..10u64 {
            inner
                .add_count_with_time(now + i * 500, MetricEvent::Pass, 1)
                .unwrap();
        }
        let t = now + 9 * 500 + 10;
        // the view covers the last two buckets, the inner array all ten
        assert_eq!(swm.sum_with_time(t, MetricEvent::Pass), 2);
        assert!((swm.qps_with_time(t, MetricEvent::Pass) - 2.0).abs() < f64::EPSILON);
        assert_eq!(inner.count_with_time(t, MetricEvent::Pass), 10);
    }

    #[test]
    fn avg_rt_and_min_rt() {
        let inner = Arc::new(BucketLeapArray::new(2, 1000).unwrap());
        let swm = SlidingWindowMetric::new(2, 1000, inner.clone()).unwrap();
        assert_eq!(swm.avg_rt(), 0f64);
        inner.add_count(MetricEvent::Complete, 2);
        inner.add_count(MetricEvent::Rt, 30);
        inner.add_count(MetricEvent::Rt, 10);
        assert!((swm.avg_rt() - 20.0).abs() < f64::EPSILON);
        assert!((swm.min_rt() - 10.0).abs() < f64::EPSILON);
        assert!(swm.max_of_single_bucket(MetricEvent::Complete) <= 2);
    }
}
