use log::error;
use nix::time::{clock_gettime, ClockId};
use senv_common::crypto::{self, MillisecondsSinceEpoch};

/// Monotonic clock counting milliseconds since boot, including time spent suspended.
#[derive(Clone, Copy, Debug, Default)]
pub struct BootClock;

impl crypto::MonotonicClock for BootClock {
    fn now(&self) -> MillisecondsSinceEpoch {
        match clock_gettime(ClockId::CLOCK_BOOTTIME) {
            Ok(t) => {
                MillisecondsSinceEpoch(t.tv_sec() as i64 * 1000 + t.tv_nsec() as i64 / 1_000_000)
            }
            Err(e) => {
                // CLOCK_BOOTTIME is always present on Linux.
                error!("clock_gettime(CLOCK_BOOTTIME) failed: {:?}", e);
                MillisecondsSinceEpoch(0)
            }
        }
    }
}
