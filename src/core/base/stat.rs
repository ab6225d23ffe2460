//! Statistic abstractions shared by the resource nodes and the slots.
use crate::{Error, Result};
use enum_map::Enum;
use std::fmt;

pub type TimePredicate = dyn Fn(u64) -> bool;

/// Events recorded by the sliding windows.
/// pass + block == total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum MetricEvent {
    /// rules check pass
    Pass,
    /// rules check block
    Block,
    /// a passed invocation exited
    Complete,
    /// business error reported through `trace_error`, used for circuit breaking
    Error,
    /// response time of completed invocations, unit is millisecond
    Rt,
}

const ILLEGAL_GLOBAL_STATISTIC_PARAMS_ERROR: &str =
    "Invalid parameters, sample_count or interval_ms, for resource's global statistic";
const ILLEGAL_STATISTIC_PARAMS_ERROR: &str =
    "Invalid parameters, sample_count or interval_ms, for metric statistic";
const GLOBAL_STATISTIC_NON_REUSABLE_ERROR: &str = "The parameters, sample_count and interval_ms, mismatch for reusing between resource's global statistic and readonly metric statistic.";

pub trait ReadStat: Send + Sync {
    fn qps(&self, _event: MetricEvent) -> f64 {
        0f64
    }
    fn sum(&self, _event: MetricEvent) -> u64 {
        0
    }
    fn min_rt(&self) -> f64 {
        0f64
    }
    fn avg_rt(&self) -> f64 {
        0f64
    }
}

pub trait WriteStat: Send + Sync {
    fn add_count(&self, _event: MetricEvent, _count: u64) {}
}

pub trait ConcurrencyStat: Send + Sync {
    fn current_concurrency(&self) -> i64;
    fn increase_concurrency(&self);
    fn decrease_concurrency(&self);
}

/// StatNode holds real-time statistics for resources.
pub trait StatNode: ReadStat + WriteStat + ConcurrencyStat + fmt::Debug {
    /// lifetime amount of passed requests
    fn total_request(&self) -> u64;
    /// lifetime amount of traced business errors
    fn total_error(&self) -> u64;
}

pub fn check_validity_for_statistic(
    sample_count: u32,
    interval_ms: u32,
    error_msg: &'static str,
) -> Result<()> {
    if interval_ms == 0 || sample_count == 0 || interval_ms % sample_count != 0 {
        return Err(Error::msg(error_msg));
    }
    Ok(())
}

/// check_validity_for_reuse_statistic checks whether a readonly metric statistic can be built
/// on top of a resource's global statistic.
/// `sample_count` and `interval_ms` describe the read view,
/// `parent_sample_count` and `parent_interval_ms` describe the underlying leap array.
pub fn check_validity_for_reuse_statistic(
    sample_count: u32,
    interval_ms: u32,
    parent_sample_count: u32,
    parent_interval_ms: u32,
) -> Result<()> {
    check_validity_for_statistic(sample_count, interval_ms, ILLEGAL_STATISTIC_PARAMS_ERROR)?;
    let bucket_len_ms = interval_ms / sample_count;

    check_validity_for_statistic(
        parent_sample_count,
        parent_interval_ms,
        ILLEGAL_GLOBAL_STATISTIC_PARAMS_ERROR,
    )?;
    let parent_bucket_len_ms = parent_interval_ms / parent_sample_count;

    // the read view's interval must divide the underlying interval
    if parent_interval_ms % interval_ms != 0 {
        return Err(Error::msg(GLOBAL_STATISTIC_NON_REUSABLE_ERROR));
    }
    // and its buckets must be made of whole underlying buckets
    if bucket_len_ms % parent_bucket_len_ms != 0 {
        return Err(Error::msg(GLOBAL_STATISTIC_NON_REUSABLE_ERROR));
    }
    Ok(())
}
