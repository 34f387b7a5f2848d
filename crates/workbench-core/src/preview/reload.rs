//! Cooldown guard for automatic preview reloads

use std::time::Duration;
use tokio::time::Instant;

/// Allows one automatic reload per cooldown interval
#[derive(Debug)]
pub struct ReloadGuard {
    cooldown: Duration,
    last_reload: Option<Instant>,
}

impl ReloadGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_reload: None,
        }
    }

    /// Claim a reload at `now`; false while the cooldown is running
    pub fn try_reload(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_reload {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_reload = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_reload = None;
    }
}
