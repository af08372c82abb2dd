use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Slack subtracted from the remaining budget when deriving a per-call
/// timeout, so the out-call gives up before the whole request does.
const CALL_SLACK: Duration = Duration::from_millis(50);

/// Deadline carried by every request and propagated into each outbound
/// call. Checked before store and bundle calls; bundle calls additionally
/// bound their transport timeout by the remaining budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// An unbounded deadline, for callers without a request budget.
    pub fn none() -> Self {
        Deadline { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail with `Cancelled` if the budget is spent.
    pub fn check(&self) -> Result<()> {
        match self.remaining() {
            Some(rem) if rem.is_zero() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Timeout for one outbound call: the smaller of `default` and what is
    /// left of the request budget minus slack. `Cancelled` when nothing
    /// usable remains.
    pub fn call_timeout(&self, default: Duration) -> Result<Duration> {
        match self.remaining() {
            None => Ok(default),
            Some(rem) => {
                let bounded = rem.saturating_sub(CALL_SLACK);
                if bounded.is_zero() {
                    return Err(Error::Cancelled);
                }
                Ok(bounded.min(default))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_cancels() {
        let deadline = Deadline::none();
        assert!(deadline.check().is_ok());
        assert_eq!(
            deadline.call_timeout(Duration::from_secs(5)).unwrap(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn expired_deadline_cancels() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(deadline.check(), Err(Error::Cancelled)));
        assert!(matches!(
            deadline.call_timeout(Duration::from_secs(5)),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn call_timeout_is_bounded_by_remaining_budget() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let timeout = deadline.call_timeout(Duration::from_secs(30)).unwrap();
        assert!(timeout <= Duration::from_secs(1));
        assert!(timeout > Duration::from_millis(500));
    }
}
