use std::time::Duration;
use std::time::Instant;

pub struct FrameTimer {
    tick: Instant,
    interval: Duration,
}

impl FrameTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            tick: Instant::now(),
            interval,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.tick.elapsed())
    }

    pub fn wait(&mut self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            spin_sleep::sleep(remaining);
        }
        self.tick = Instant::now();
    }
}
