//! Frame throttle for progress samples
//!
//! The engine reports progress at whatever cadence the dongle produces. The
//! relay lets a sample through when the last forwarded one is older than the
//! frame interval, with two exceptions: sentinel samples always pass, and when
//! per-frame bonus is on a changed progress pair earns a fixed credit on top of
//! the elapsed time.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{OperationConfig, ProgressEvent};

/// Throttle verdict for one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    Forward,
    Drop,
}

/// What the relay remembers about the last forwarded sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    pub last_forwarded_at: Option<Instant>,
    pub last_forwarded: Option<ProgressEvent>,
}

/// Per-subscription throttle
#[derive(Debug, Clone)]
pub struct ThrottledProgressRelay {
    frame_interval: Duration,
    frame_bonus: Duration,
    per_frame_bonus: bool,
    state: SubscriptionState,
}

impl ThrottledProgressRelay {
    pub fn new(config: &OperationConfig, frame_bonus: Duration) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            frame_bonus,
            per_frame_bonus: config.per_frame_bonus,
            state: SubscriptionState::default(),
        }
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// Decide whether `sample` would be forwarded at `now`
    pub fn decide(&self, sample: &ProgressEvent, now: Instant) -> RelayDecision {
        if sample.is_terminal() {
            return RelayDecision::Forward;
        }
        let Some(last_at) = self.state.last_forwarded_at else {
            return RelayDecision::Forward;
        };

        let elapsed = now.saturating_duration_since(last_at);
        let changed = self
            .state
            .last_forwarded
            .as_ref()
            .is_some_and(|last| !last.same_progress(sample));
        let bonus = if self.per_frame_bonus && changed {
            self.frame_bonus
        } else {
            Duration::ZERO
        };

        if elapsed + bonus > self.frame_interval {
            RelayDecision::Forward
        } else {
            RelayDecision::Drop
        }
    }

    /// Decide and, on forward, remember `sample` as the last forwarded one
    pub fn offer(&mut self, sample: &ProgressEvent, now: Instant) -> RelayDecision {
        let decision = self.decide(sample, now);
        if decision == RelayDecision::Forward {
            self.state.last_forwarded_at = Some(now);
            self.state.last_forwarded = Some(sample.clone());
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BONUS: Duration = Duration::from_millis(60);

    fn relay(frame_ms: u32, per_frame_bonus: bool) -> ThrottledProgressRelay {
        ThrottledProgressRelay::new(&OperationConfig::new(6000, frame_ms, per_frame_bonus), BONUS)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_sample_always_forwarded() {
        let mut relay = relay(720, false);
        let now = Instant::now();
        assert_eq!(relay.offer(&ProgressEvent::new(0, 0, "start"), now), RelayDecision::Forward);
        assert_eq!(relay.state().last_forwarded_at, Some(now));
    }

    #[test]
    fn test_unchanged_samples_spaced_by_frame_interval() {
        let mut relay = relay(720, false);
        let start = Instant::now();
        let sample = ProgressEvent::new(40, 10, "Flashing");

        let mut forwarded = Vec::new();
        for tick in 0..=40u64 {
            let now = start + ms(tick * 50);
            if relay.offer(&sample, now) == RelayDecision::Forward {
                forwarded.push(tick * 50);
            }
        }

        assert_eq!(forwarded, vec![0, 750, 1500]);
        for pair in forwarded.windows(2) {
            assert!(pair[1] - pair[0] >= 720);
        }
    }

    #[test]
    fn test_sentinels_bypass_throttle() {
        let start = Instant::now();
        for sample in [
            ProgressEvent::new(100, 30, ""),
            ProgressEvent::new(-1, 30, ""),
            ProgressEvent::new(30, 100, ""),
            ProgressEvent::new(30, -1, ""),
        ] {
            let mut relay = relay(720, false);
            relay.offer(&ProgressEvent::new(30, 30, ""), start);
            assert_eq!(relay.offer(&sample, start + ms(1)), RelayDecision::Forward);
        }
    }

    #[test]
    fn test_exactly_frame_interval_is_dropped() {
        let mut relay = relay(720, false);
        let start = Instant::now();
        relay.offer(&ProgressEvent::new(1, 1, ""), start);
        assert_eq!(relay.decide(&ProgressEvent::new(1, 1, ""), start + ms(720)), RelayDecision::Drop);
        assert_eq!(relay.decide(&ProgressEvent::new(1, 1, ""), start + ms(721)), RelayDecision::Forward);
    }

    #[test]
    fn test_changed_progress_earns_bonus() {
        let mut relay = relay(720, true);
        let start = Instant::now();

        assert_eq!(relay.offer(&ProgressEvent::new(40, 10, ""), start), RelayDecision::Forward);
        // 680 + 60 > 720
        assert_eq!(
            relay.offer(&ProgressEvent::new(41, 10, ""), start + ms(680)),
            RelayDecision::Forward
        );
        // unchanged repeat at the same spacing gets no credit
        assert_eq!(
            relay.offer(&ProgressEvent::new(41, 10, ""), start + ms(1360)),
            RelayDecision::Drop
        );
    }

    #[test]
    fn test_bonus_disabled_ignores_change() {
        let mut relay = relay(720, false);
        let start = Instant::now();
        relay.offer(&ProgressEvent::new(40, 10, ""), start);
        assert_eq!(relay.offer(&ProgressEvent::new(41, 10, ""), start + ms(680)), RelayDecision::Drop);
    }

    #[test]
    fn test_bonus_not_enough_for_short_gap() {
        let mut relay = relay(720, true);
        let start = Instant::now();
        relay.offer(&ProgressEvent::new(40, 10, ""), start);
        // 400 + 60 stays under 720
        assert_eq!(relay.offer(&ProgressEvent::new(41, 10, ""), start + ms(400)), RelayDecision::Drop);
    }

    #[test]
    fn test_dropped_sample_is_not_remembered() {
        let mut relay = relay(720, true);
        let start = Instant::now();
        relay.offer(&ProgressEvent::new(40, 10, ""), start);
        relay.offer(&ProgressEvent::new(41, 10, ""), start + ms(100));
        assert_eq!(relay.state().last_forwarded, Some(ProgressEvent::new(40, 10, "")));
        assert_eq!(relay.state().last_forwarded_at, Some(start));
    }
}
