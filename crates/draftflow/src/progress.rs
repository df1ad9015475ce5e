/// Default document size the estimator assumes, in characters.
pub const DEFAULT_PROGRESS_TARGET: usize = 4_000;

/// Highest percentage the estimator will report while a stream is in flight.
pub const IN_FLIGHT_CEILING: u8 = 95;

/// Length-based completion heuristic.
///
/// The producer never announces a total size, so this caps below 100. Only
/// the session sets 100, and only on the `complete` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEstimator {
    target: usize,
}

impl ProgressEstimator {
    /// Creates an estimator for the given assumed target length. A zero
    /// target is clamped to one character.
    pub fn new(target: usize) -> Self {
        Self {
            target: target.max(1),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Returns `min(95, len / target * 100)`, rounded down.
    pub fn estimate(&self, current_len: usize) -> u8 {
        let percent = (current_len as u128 * 100) / self.target as u128;
        percent.min(IN_FLIGHT_CEILING as u128) as u8
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_TARGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_linearly_below_ceiling() {
        let estimator = ProgressEstimator::new(200);
        assert_eq!(estimator.estimate(0), 0);
        assert_eq!(estimator.estimate(1), 0);
        assert_eq!(estimator.estimate(100), 50);
        assert_eq!(estimator.estimate(189), 94);
    }

    #[test]
    fn never_reaches_completion() {
        let estimator = ProgressEstimator::new(10);
        assert_eq!(estimator.estimate(10), IN_FLIGHT_CEILING);
        assert_eq!(estimator.estimate(usize::MAX), IN_FLIGHT_CEILING);
    }

    #[test]
    fn zero_target_is_clamped() {
        let estimator = ProgressEstimator::new(0);
        assert_eq!(estimator.target(), 1);
        assert_eq!(estimator.estimate(0), 0);
        assert_eq!(estimator.estimate(5), IN_FLIGHT_CEILING);
    }
}
