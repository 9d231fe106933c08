use log::error;
use senv_common::wire::keymint::DateTime;
use senv_ta::device::WallClock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time from the host's real-time clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> DateTime {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => DateTime { ms_since_epoch: i64::try_from(d.as_millis()).unwrap_or(i64::MAX) },
            Err(e) => {
                error!("system time is before the epoch: {}", e);
                DateTime { ms_since_epoch: 0 }
            }
        }
    }
}
