// Focus announcement throttle
//
// Per path: the first request goes out immediately, further requests inside
// the window collapse into one trailing send at the end of the window. A
// request for a different path restarts the throttle and goes out at once.
// Timers live in the hub; this type only decides.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusDecision {
    /// Broadcast now. Any trailing send scheduled earlier is obsolete.
    SendNow,
    /// Broadcast at `deadline` unless `epoch` is invalidated first
    ScheduleTrailing { deadline: Instant, epoch: u64 },
    /// A trailing send for this path is already scheduled
    Coalesced,
}

#[derive(Debug)]
pub struct FocusThrottle {
    window: Duration,
    path: Option<String>,
    last_sent: Option<Instant>,
    pending: bool,
    epoch: u64,
}

impl FocusThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            path: None,
            last_sent: None,
            pending: false,
            epoch: 0,
        }
    }

    /// Path most recently requested by the local user
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn request(&mut self, path: &str, now: Instant) -> FocusDecision {
        if self.path.as_deref() != Some(path) {
            self.path = Some(path.to_string());
            return self.send_now(now);
        }

        let within_window = self
            .last_sent
            .is_some_and(|sent| now.saturating_duration_since(sent) < self.window);
        if !within_window {
            return self.send_now(now);
        }

        if self.pending {
            return FocusDecision::Coalesced;
        }

        self.pending = true;
        // last_sent is set whenever within_window holds
        match self.last_sent.unwrap_or(now).checked_add(self.window) {
            Some(deadline) => FocusDecision::ScheduleTrailing {
                deadline,
                epoch: self.epoch,
            },
            // The window never ends; the pending send stays coalesced
            None => FocusDecision::Coalesced,
        }
    }

    /// Current epoch; bumped by every send, path switch and clear
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Undo the leading send of `epoch` so the next request for the same
    /// path goes out immediately. No-op once anything else happened.
    pub fn rollback_send(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.pending {
            return false;
        }
        self.last_sent = None;
        true
    }

    /// Called by the trailing timer. Returns the path to broadcast if the
    /// scheduled send is still wanted.
    pub fn fire_trailing(&mut self, epoch: u64, now: Instant) -> Option<String> {
        if !self.pending || epoch != self.epoch {
            return None;
        }
        self.pending = false;
        self.last_sent = Some(now);
        self.path.clone()
    }

    /// Forget the focused path and drop any scheduled send
    pub fn clear(&mut self) {
        self.path = None;
        self.last_sent = None;
        self.pending = false;
        self.epoch += 1;
    }

    fn send_now(&mut self, now: Instant) -> FocusDecision {
        self.pending = false;
        self.epoch += 1;
        self.last_sent = Some(now);
        FocusDecision::SendNow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_first_request_sends() {
        let mut throttle = FocusThrottle::new(WINDOW);
        assert_eq!(throttle.request("fields.a.en", Instant::now()), FocusDecision::SendNow);
        assert_eq!(throttle.path(), Some("fields.a.en"));
    }

    #[test]
    fn test_repeats_collapse_into_one_trailing_send() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(WINDOW);
        assert_eq!(throttle.request("fields.a.en", start), FocusDecision::SendNow);

        let decision = throttle.request("fields.a.en", start + Duration::from_secs(1));
        let epoch = match decision {
            FocusDecision::ScheduleTrailing { deadline, epoch } => {
                assert_eq!(deadline, start + WINDOW);
                epoch
            }
            other => panic!("unexpected decision: {other:?}"),
        };
        for secs in 2..9 {
            assert_eq!(
                throttle.request("fields.a.en", start + Duration::from_secs(secs)),
                FocusDecision::Coalesced
            );
        }

        assert_eq!(
            throttle.fire_trailing(epoch, start + WINDOW).as_deref(),
            Some("fields.a.en")
        );
        assert_eq!(throttle.fire_trailing(epoch, start + WINDOW), None);
    }

    #[test]
    fn test_path_switch_sends_and_invalidates_trailing() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(WINDOW);
        throttle.request("fields.a.en", start);
        let FocusDecision::ScheduleTrailing { epoch, .. } =
            throttle.request("fields.a.en", start + Duration::from_secs(1))
        else {
            panic!("expected a trailing send");
        };

        assert_eq!(
            throttle.request("fields.b.en", start + Duration::from_secs(2)),
            FocusDecision::SendNow
        );
        assert!(!throttle.has_pending());
        assert_eq!(throttle.fire_trailing(epoch, start + WINDOW), None);
    }

    #[test]
    fn test_same_path_after_window_sends_again() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(WINDOW);
        throttle.request("fields.a.en", start);
        assert_eq!(
            throttle.request("fields.a.en", start + WINDOW),
            FocusDecision::SendNow
        );
    }

    #[test]
    fn test_clear_forgets_path() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(WINDOW);
        throttle.request("fields.a.en", start);
        let FocusDecision::ScheduleTrailing { epoch, .. } =
            throttle.request("fields.a.en", start + Duration::from_secs(1))
        else {
            panic!("expected a trailing send");
        };

        throttle.clear();
        assert_eq!(throttle.path(), None);
        assert_eq!(throttle.fire_trailing(epoch, start + WINDOW), None);
        assert_eq!(throttle.request("fields.a.en", start + Duration::from_secs(2)), FocusDecision::SendNow);
    }

    #[test]
    fn test_rollback_reopens_window() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(WINDOW);
        assert_eq!(throttle.request("fields.a.en", start), FocusDecision::SendNow);
        let epoch = throttle.epoch();

        assert!(throttle.rollback_send(epoch));
        assert_eq!(
            throttle.request("fields.a.en", start + Duration::from_secs(1)),
            FocusDecision::SendNow
        );
        // A stale rollback leaves the newer send alone
        assert!(!throttle.rollback_send(epoch));
        assert!(matches!(
            throttle.request("fields.a.en", start + Duration::from_secs(2)),
            FocusDecision::ScheduleTrailing { .. }
        ));
    }

    #[test]
    fn test_unbounded_window_does_not_overflow() {
        let start = Instant::now();
        let mut throttle = FocusThrottle::new(Duration::MAX);
        assert_eq!(throttle.request("fields.a.en", start), FocusDecision::SendNow);
        assert_eq!(
            throttle.request("fields.a.en", start + Duration::from_secs(1)),
            FocusDecision::Coalesced
        );
        assert_eq!(
            throttle.request("fields.b.en", start + Duration::from_secs(2)),
            FocusDecision::SendNow
        );
    }
}
