use std::sync::Mutex;
use std::time::Duration;

use viewserver_common::mutex_lock_or_recover;

/// Blocking pause between view server start attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested pauses without sleeping.
#[derive(Debug, Default)]
pub struct MockSleeper {
    durations: Mutex<Vec<Duration>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        mutex_lock_or_recover(&self.durations).len()
    }

    pub fn durations(&self) -> Vec<Duration> {
        mutex_lock_or_recover(&self.durations).clone()
    }
}

impl Sleeper for MockSleeper {
    fn sleep(&self, duration: Duration) {
        mutex_lock_or_recover(&self.durations).push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sleeper_does_not_sleep() {
        let sleeper = MockSleeper::new();
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(sleeper.call_count(), 1);
    }

    #[test]
    fn test_mock_sleeper_tracks_durations() {
        let sleeper = MockSleeper::new();
        sleeper.sleep(Duration::from_millis(10));
        sleeper.sleep(Duration::from_millis(20));
        assert_eq!(
            sleeper.durations(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }
}
