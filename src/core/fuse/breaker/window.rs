use crate::{base::MetricEvent, stat::BucketLeapArray};

/// Sums of a breaker's window at some instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStat {
    pub pass: u64,
    pub complete: u64,
    pub error: u64,
    pub rt: u64,
}

impl WindowStat {
    pub fn of(stat: &BucketLeapArray, now: u64) -> Self {
        stat.get_valid_values(now)
            .iter()
            .fold(WindowStat::default(), |acc, bucket| {
                let value = bucket.value();
                WindowStat {
                    pass: acc.pass + value.get(MetricEvent::Pass),
                    complete: acc.complete + value.get(MetricEvent::Complete),
                    error: acc.error + value.get(MetricEvent::Error),
                    rt: acc.rt + value.get(MetricEvent::Rt),
                }
            })
    }

    /// `error / pass`, 0 without passes
    pub fn error_ratio(&self) -> f64 {
        if self.pass == 0 {
            0.0
        } else {
            self.error as f64 / self.pass as f64
        }
    }

    /// `rt / pass`, 0 without passes
    pub fn avg_rt(&self) -> f64 {
        if self.pass == 0 {
            0.0
        } else {
            self.rt as f64 / self.pass as f64
        }
    }
}
