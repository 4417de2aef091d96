//! Process-wide time service.
//!
//! The global tick is a count of 100-ns intervals since 1900-01-01 UTC.
//! First access anchors a monotonic [`Instant`] to the wall clock; all
//! later readings are derived from the elapsed monotonic time, so ticks
//! never jump when NTP adjusts the wall clock.

use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::types::OscTime;

/// Seconds from the NTP epoch (1900) to the Unix epoch (1970), RFC 5905.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const TICKS_PER_SECOND: u64 = 10_000_000;

struct ClockAnchor {
    instant: Instant,
    base_ticks: u64,
}

impl ClockAnchor {
    fn from_wall_clock() -> ClockAnchor {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        ClockAnchor {
            instant: Instant::now(),
            base_ticks: NTP_UNIX_OFFSET * TICKS_PER_SECOND + duration_to_ticks(since_unix),
        }
    }

    fn tick(&self) -> u64 {
        self.base_ticks + duration_to_ticks(self.instant.elapsed())
    }
}

fn duration_to_ticks(d: Duration) -> u64 {
    (d.as_nanos() / 100) as u64
}

static ANCHOR: LazyLock<Mutex<ClockAnchor>> =
    LazyLock::new(|| Mutex::new(ClockAnchor::from_wall_clock()));

/// The global tick: 100-ns intervals since 1900-01-01 UTC.
pub fn tick_now() -> u64 {
    ANCHOR.lock().unwrap().tick()
}

/// The current time as an OSC time tag.
pub fn now() -> OscTime {
    OscTime::from_ticks(tick_now())
}

/// A time tag `seconds` from now. Negative offsets saturate at now.
pub fn after_seconds(seconds: f64) -> OscTime {
    let offset_ticks = (seconds * TICKS_PER_SECOND as f64) as i64;
    OscTime::from_ticks(tick_now().saturating_add_signed(offset_ticks))
}

/// Re-anchor the clock to the current wall UTC time.
pub fn restart() {
    *ANCHOR.lock().unwrap() = ClockAnchor::from_wall_clock();
}

/// Re-anchor the clock so that "now" equals `start`. Times before
/// 1900-01-01 UTC are clamped to the epoch.
pub fn set_session_start(start: SystemTime) {
    let base_ticks = match start.duration_since(UNIX_EPOCH) {
        Ok(since_unix) => NTP_UNIX_OFFSET * TICKS_PER_SECOND + duration_to_ticks(since_unix),
        // Pre-1970: representable down to 1900, zero below that.
        Err(err) => {
            let before = duration_to_ticks(err.duration());
            (NTP_UNIX_OFFSET * TICKS_PER_SECOND).saturating_sub(before)
        }
    };
    *ANCHOR.lock().unwrap() = ClockAnchor {
        instant: Instant::now(),
        base_ticks,
    };
}
