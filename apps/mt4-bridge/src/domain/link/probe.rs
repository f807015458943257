//! Connect-Attempt Probe
//!
//! The socket library retries connects on its own and reports each delayed
//! attempt. The probe turns that into a single non-fatal warning once a
//! channel has been delayed twice without ever connecting.

/// Delayed attempts tolerated before warning.
pub const CONNECT_DELAY_WARN_THRESHOLD: u32 = 2;

/// Per-channel connect watchdog.
#[derive(Debug, Clone, Default)]
pub struct ConnectProbe {
    delayed: u32,
    settled: bool,
}

impl ConnectProbe {
    /// Fresh probe, armed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delayed: 0,
            settled: false,
        }
    }

    /// Record a delayed connect attempt.
    ///
    /// Returns `true` exactly once: when the threshold is reached before any
    /// successful connect.
    pub fn on_connect_delayed(&mut self) -> bool {
        if self.settled {
            return false;
        }

        self.delayed += 1;
        if self.delayed >= CONNECT_DELAY_WARN_THRESHOLD {
            self.settled = true;
            return true;
        }
        false
    }

    /// Record a successful connect; the probe stops counting.
    pub const fn on_connected(&mut self) {
        self.settled = true;
    }

    /// Delayed attempts seen so far.
    #[must_use]
    pub const fn delayed_attempts(&self) -> u32 {
        self.delayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_on_second_delay_only() {
        let mut probe = ConnectProbe::new();

        assert!(!probe.on_connect_delayed());
        assert!(probe.on_connect_delayed());
        assert!(!probe.on_connect_delayed());
        assert_eq!(probe.delayed_attempts(), 2);
    }

    #[test]
    fn connect_disarms_probe() {
        let mut probe = ConnectProbe::new();

        assert!(!probe.on_connect_delayed());
        probe.on_connected();
        assert!(!probe.on_connect_delayed());
        assert!(!probe.on_connect_delayed());
    }
}
