//! Retry policy for outbound requests
//!
//! This module models retries as an explicit state machine:
//! - `RetryState` is where a dispatch currently is
//! - `RetryPolicy::transition` is a pure function from (state, event) to the next state
//! - Only idempotent methods are retried, and only after connection-level failures
//! - Delays grow exponentially from `base_delay`, capped at `max_delay`
//!
//! The dispatcher drives the machine; nothing here sleeps or touches the network.

use std::time::Duration;

use crate::domain::types::Method;

/// Where a dispatch currently is. Attempt numbers start at 0 for the first try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Backoff(u32),
    Failed,
    Succeeded,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Failed | RetryState::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    AttemptSucceeded,
    AttemptFailed { retryable: bool },
    BackoffElapsed,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(250), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Next state of a dispatch for `method`. Terminal states absorb every event;
    /// an event that does not apply to the current state leaves it unchanged.
    pub fn transition(&self, state: RetryState, event: RetryEvent, method: Method) -> RetryState {
        match (state, event) {
            (RetryState::Attempting(_), RetryEvent::AttemptSucceeded) => RetryState::Succeeded,
            (RetryState::Attempting(n), RetryEvent::AttemptFailed { retryable }) => {
                if retryable && method.is_idempotent() && n < self.max_retries {
                    RetryState::Backoff(n)
                } else {
                    RetryState::Failed
                }
            }
            (RetryState::Backoff(n), RetryEvent::BackoffElapsed) => RetryState::Attempting(n + 1),
            (state, _) => state,
        }
    }

    /// Delay spent in `Backoff(attempt)`: base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(100), Duration::from_millis(300))
    }

    #[test]
    fn test_delay_calculation() {
        let policy = policy();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300)); // capped
        assert_eq!(policy.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn test_max_delay_never_below_base() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_idempotent_method_retries_until_bound() {
        let policy = policy();
        let failed = RetryEvent::AttemptFailed { retryable: true };

        let mut state = RetryState::Attempting(0);
        let mut attempts = 1;
        while !state.is_terminal() {
            state = policy.transition(state, failed, Method::Get);
            if let RetryState::Backoff(_) = state {
                state = policy.transition(state, RetryEvent::BackoffElapsed, Method::Get);
                attempts += 1;
            }
        }
        assert_eq!(state, RetryState::Failed);
        assert_eq!(attempts, 3); // first try + 2 retries
    }

    #[test]
    fn test_post_is_never_retried() {
        let policy = policy();
        let next = policy.transition(
            RetryState::Attempting(0),
            RetryEvent::AttemptFailed { retryable: true },
            Method::Post,
        );
        assert_eq!(next, RetryState::Failed);
    }

    #[test]
    fn test_non_retryable_failure_fails_immediately() {
        let policy = policy();
        for method in [Method::Get, Method::Put, Method::Delete] {
            let next = policy.transition(
                RetryState::Attempting(0),
                RetryEvent::AttemptFailed { retryable: false },
                method,
            );
            assert_eq!(next, RetryState::Failed);
        }
    }

    #[test]
    fn test_success_and_backoff_transitions() {
        let policy = policy();
        assert_eq!(
            policy.transition(RetryState::Attempting(1), RetryEvent::AttemptSucceeded, Method::Put),
            RetryState::Succeeded
        );
        assert_eq!(
            policy.transition(RetryState::Backoff(1), RetryEvent::BackoffElapsed, Method::Put),
            RetryState::Attempting(2)
        );
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        let policy = policy();
        for state in [RetryState::Failed, RetryState::Succeeded] {
            for event in [
                RetryEvent::AttemptSucceeded,
                RetryEvent::AttemptFailed { retryable: true },
                RetryEvent::BackoffElapsed,
            ] {
                assert_eq!(policy.transition(state, event, Method::Get), state);
            }
        }
    }

    #[test]
    fn test_zero_retries_disables_retry() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        let next = policy.transition(
            RetryState::Attempting(0),
            RetryEvent::AttemptFailed { retryable: true },
            Method::Get,
        );
        assert_eq!(next, RetryState::Failed);
    }
}
