use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DetectionThrottle {
    window: Duration,
    last_success: Option<Instant>,
}

impl DetectionThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_success: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    pub fn should_attempt(&self, now: Instant) -> bool {
        match self.last_success {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.window,
        }
    }

    /// Only call once the detection has been validated and persisted.
    pub fn record_success(&mut self, now: Instant) {
        self.last_success = Some(now);
    }
}

impl Default for DetectionThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
