use super::{BucketLeapArray, SlidingWindowMetric};
use crate::{
    base::{ConcurrencyStat, MetricEvent, ReadStat, ResourceType, StatNode, WriteStat},
    config, Result,
};
use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc,
};

/// Per-resource accumulator: the windowed statistic, the in-flight gauge
/// and lifetime totals.
#[derive(Debug)]
pub struct ResourceNode {
    pub(crate) res_name: String,
    pub(crate) resource_type: ResourceType,
    concurrency: AtomicI64,
    total_request: AtomicU64,
    total_error: AtomicU64,
    pub(crate) arr: Arc<BucketLeapArray>,
    pub(crate) metric: Arc<SlidingWindowMetric>,
}

impl ResourceNode {
    pub fn new(res_name: String, resource_type: ResourceType) -> Result<Self> {
        let arr = Arc::new(BucketLeapArray::new(
            config::global_stat_sample_count_total(),
            config::global_stat_interval_ms_total(),
        )?);
        let metric = Arc::new(SlidingWindowMetric::new(
            config::metric_stat_sample_count(),
            config::metric_stat_interval_ms(),
            arr.clone(),
        )?);
        Ok(ResourceNode {
            res_name,
            resource_type,
            concurrency: AtomicI64::new(0),
            total_request: AtomicU64::new(0),
            total_error: AtomicU64::new(0),
            arr,
            metric,
        })
    }

    pub fn res_name(&self) -> &String {
        &self.res_name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn default_metric(&self) -> Arc<SlidingWindowMetric> {
        self.metric.clone()
    }

    /// Windowed sum over the whole 10s array rather than the 1s read view.
    pub fn total_sum(&self, event: MetricEvent) -> u64 {
        self.arr.count(event)
    }
}

impl ReadStat for ResourceNode {
    fn qps(&self, event: MetricEvent) -> f64 {
        self.metric.qps(event)
    }
    fn sum(&self, event: MetricEvent) -> u64 {
        self.metric.sum(event)
    }
    fn min_rt(&self) -> f64 {
        self.metric.min_rt()
    }
    fn avg_rt(&self) -> f64 {
        self.metric.avg_rt()
    }
}

impl WriteStat for ResourceNode {
    fn add_count(&self, event: MetricEvent, count: u64) {
        match event {
            MetricEvent::Pass => {
                self.total_request.fetch_add(count, Ordering::SeqCst);
            }
            MetricEvent::Error => {
                self.total_error.fetch_add(count, Ordering::SeqCst);
            }
            _ => {}
        }
        self.arr.add_count(event, count);
    }
}

impl ConcurrencyStat for ResourceNode {
    fn current_concurrency(&self) -> i64 {
        self.concurrency.load(Ordering::SeqCst)
    }

    fn increase_concurrency(&self) {
        self.concurrency.fetch_add(1, Ordering::SeqCst);
    }

    fn decrease_concurrency(&self) {
        self.concurrency.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StatNode for ResourceNode {
    fn total_request(&self) -> u64 {
        self.total_request.load(Ordering::SeqCst)
    }

    fn total_error(&self) -> u64 {
        self.total_error.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters() {
        let node = ResourceNode::new("abc".into(), ResourceType::Common).unwrap();
        node.add_count(MetricEvent::Pass, 2);
        node.add_count(MetricEvent::Error, 1);
        node.add_count(MetricEvent::Block, 1);
        assert_eq!(node.total_request(), 2);
        assert_eq!(node.total_error(), 1);
        assert_eq!(node.total_sum(MetricEvent::Block), 1);
        assert!(node.sum(MetricEvent::Pass) <= 2);
        assert_eq!(node.res_name(), "abc");
    }

    #[test]
    fn concurrency() {
        let node = ResourceNode::new("abc".into(), ResourceType::Common).unwrap();
        node.increase_concurrency();
        node.increase_concurrency();
        node.decrease_concurrency();
        assert_eq!(node.current_concurrency(), 1);
    }
}
