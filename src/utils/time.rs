use time::{macros::format_description, OffsetDateTime};

const NANOS_PER_MILLI: i128 = 1_000_000;

#[inline]
pub fn sleep_for_ms(ms: u64) {
    std::thread::sleep(std::time::Duration::from_millis(ms));
}

#[inline]
fn cal_curr_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / NANOS_PER_MILLI) as u64
}

/// Formats a millisecond timestamp as `hh:mm:ss.SSS` (UTC), used in log messages.
pub fn format_time_millis(ts_millis: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(milli2nano(ts_millis))
        .ok()
        .and_then(|t| {
            t.format(format_description!(
                "[hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .ok()
        })
        .unwrap_or_else(|| ts_millis.to_string())
}

/// Current unix timestamp in milliseconds.
/// Reads the cached value once the ticker has been started.
pub fn curr_time_millis() -> u64 {
    let ticker_time = curr_time_millis_with_ticker();
    if ticker_time > 0 {
        ticker_time
    } else {
        cal_curr_time_millis()
    }
}

#[inline]
pub fn curr_time_nanos() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos()
}

#[inline]
pub fn milli2nano<T: Into<i128>>(t: T) -> i128 {
    NANOS_PER_MILLI * t.into()
}

pub use ticker::*;

// provide cached time by a ticker
pub mod ticker {
    use super::*;
    use lazy_static::lazy_static;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Once;

    lazy_static! {
        static ref NOW_IN_MS: AtomicU64 = AtomicU64::new(0);
        static ref TICKER_ONCE: Once = Once::new();
    }

    /// `start_time_ticker()` starts a background thread that caches the current timestamp
    /// every millisecond. Calling it more than once has no further effect.
    pub fn start_time_ticker() {
        TICKER_ONCE.call_once(|| {
            update_time();
            std::thread::spawn(move || loop {
                update_time();
                std::thread::sleep(std::time::Duration::from_millis(1));
            });
        });
    }

    #[inline]
    fn update_time() {
        NOW_IN_MS.store(cal_curr_time_millis(), Ordering::SeqCst);
    }

    #[inline]
    pub(super) fn curr_time_millis_with_ticker() -> u64 {
        NOW_IN_MS.load(Ordering::SeqCst)
    }
}
