//! Repeat-read pacing: bounded iteration over an injected sleep, so the
//! schedule can be simulated in tests without a clock.

use std::time::Duration;

/// Pacing policy for repeated reads. The driver performs the actual
/// sleeping; the policy only decides whether and how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatPolicy {
    /// Delay between consecutive reads.
    pub interval: Duration,
    /// Total time allowed in delays; `None` means unbounded.
    pub budget: Option<Duration>,
    /// Maximum number of reads; `None` means unbounded.
    pub max_reads: Option<u64>,
}

impl RepeatPolicy {
    /// Single read, no delay.
    pub fn once() -> Self {
        Self {
            interval: Duration::ZERO,
            budget: None,
            max_reads: Some(1),
        }
    }

    /// Read at `interval` until the body stops the loop.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            budget: None,
            max_reads: None,
        }
    }

    /// Cap the total time spent in delays.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Cap the number of reads.
    pub fn with_max_reads(mut self, n: u64) -> Self {
        self.max_reads = Some(n);
        self
    }

    /// Delay before read `completed + 1`, or `None` when the schedule is
    /// exhausted. `slept` is the time already spent in delays.
    pub fn next_delay(&self, completed: u64, slept: Duration) -> Option<Duration> {
        if let Some(max) = self.max_reads {
            if completed >= max {
                return None;
            }
        }
        if let Some(budget) = self.budget {
            if slept + self.interval > budget {
                return None;
            }
        }
        Some(self.interval)
    }
}

/// Drive `body` once per scheduled read. `body` receives the number of reads
/// already completed; it returns `Ok(true)` to keep going and `Ok(false)` to
/// stop early (a user interrupt, say). Errors abort immediately. Returns the
/// number of completed reads.
pub fn run<E>(
    policy: &RepeatPolicy,
    mut sleep: impl FnMut(Duration),
    mut body: impl FnMut(u64) -> Result<bool, E>,
) -> Result<u64, E> {
    let mut slept = Duration::ZERO;
    let mut completed = 0u64;
    loop {
        if !body(completed)? {
            return Ok(completed + 1);
        }
        completed += 1;
        match policy.next_delay(completed, slept) {
            None => return Ok(completed),
            Some(delay) => {
                if !delay.is_zero() {
                    sleep(delay);
                }
                slept += delay;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_runs_exactly_one_read() {
        let mut reads = 0;
        let n = run::<()>(&RepeatPolicy::once(), |_| panic!("no sleep"), |_| {
            reads += 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(reads, 1);
    }

    #[test]
    fn max_reads_bounds_the_loop_and_sleeps_between() {
        let policy = RepeatPolicy::every(Duration::from_secs(1)).with_max_reads(3);
        let mut slept = Vec::new();
        let n = run::<()>(&policy, |d| slept.push(d), |_| Ok(true)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(slept, vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn budget_ends_the_schedule() {
        // 1s interval, 2.5s budget: delays at 1s and 2s fit, the third does not.
        let policy = RepeatPolicy::every(Duration::from_secs(1)).with_budget(
            Duration::from_millis(2500),
        );
        let mut slept = Vec::new();
        let n = run::<()>(&policy, |d| slept.push(d), |_| Ok(true)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(slept.len(), 2);
    }

    #[test]
    fn body_can_stop_the_loop() {
        let policy = RepeatPolicy::every(Duration::from_millis(5));
        let n = run::<()>(&policy, |_| {}, |completed| Ok(completed < 1)).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn body_errors_abort() {
        let policy = RepeatPolicy::every(Duration::from_millis(5));
        let err = run(&policy, |_| {}, |completed| {
            if completed == 2 {
                Err("boom")
            } else {
                Ok(true)
            }
        })
        .unwrap_err();
        assert_eq!(err, "boom");
    }

    #[test]
    fn next_delay_respects_both_bounds() {
        let policy = RepeatPolicy::every(Duration::from_secs(1))
            .with_budget(Duration::from_secs(10))
            .with_max_reads(2);
        assert_eq!(
            policy.next_delay(0, Duration::ZERO),
            Some(Duration::from_secs(1))
        );
        assert_eq!(policy.next_delay(2, Duration::from_secs(1)), None);
        assert_eq!(
            RepeatPolicy::every(Duration::from_secs(1))
                .with_budget(Duration::from_secs(1))
                .next_delay(1, Duration::from_secs(1)),
            None
        );
    }
}
