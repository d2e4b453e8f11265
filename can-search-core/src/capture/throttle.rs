//! Rate limiting for repeated error logs

/// Decides which occurrences of a recurring error get logged
///
/// The first occurrence is always logged, then every `interval`-th one, so a
/// bus that fails on every poll does not flood the log.
#[derive(Debug, Clone)]
pub struct ErrorThrottle {
    interval: u64,
    count: u64,
}

impl ErrorThrottle {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            count: 0,
        }
    }

    /// Record one occurrence; true if this one should be logged
    pub fn should_log(&mut self) -> bool {
        self.count += 1;
        (self.count - 1) % self.interval == 0
    }

    /// Occurrences recorded so far
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_every_nth() {
        let mut throttle = ErrorThrottle::new(3);
        let logged: Vec<bool> = (0..7).map(|_| throttle.should_log()).collect();
        assert_eq!(logged, vec![true, false, false, true, false, false, true]);
        assert_eq!(throttle.count(), 7);
    }

    #[test]
    fn test_interval_zero_logs_everything() {
        let mut throttle = ErrorThrottle::new(0);
        assert!(throttle.should_log());
        assert!(throttle.should_log());
    }
}
