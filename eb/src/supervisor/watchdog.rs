//! Per-stream inactivity watchdog
//!
//! Expiry is a spawned sleep that posts [`LaneRequest::WatchdogFired`] back
//! onto the lane, tagged with the generation it was scheduled under. Every
//! start or reset bumps the generation and aborts the previous task, and the
//! lane only acts on a fire whose generation is still current, so a fire that
//! was already queued when the timer was reset or stopped is ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::messages::LaneRequest;
use crate::domain::StreamKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Idle,
    Armed,
    Fired,
    Cancelled,
}

pub struct WatchdogTimer {
    stream: StreamKey,
    subscription: u64,
    generation: u64,
    phase: WatchdogPhase,
    deadline: Option<Instant>,
    pending: Option<JoinHandle<()>>,
    lane: mpsc::Sender<LaneRequest>,
}

impl WatchdogTimer {
    pub fn new(stream: StreamKey, subscription: u64, lane: mpsc::Sender<LaneRequest>) -> Self {
        Self {
            stream,
            subscription,
            generation: 0,
            phase: WatchdogPhase::Idle,
            deadline: None,
            pending: None,
            lane,
        }
    }

    /// Arm the timer; an armed timer is rescheduled
    pub fn start(&mut self, duration: Duration) {
        debug!(stream = %self.stream, ?duration, "WatchdogTimer::start: called");
        self.schedule(duration);
    }

    /// Invalidate the pending expiry and schedule a new one
    pub fn reset(&mut self, duration: Duration) {
        debug!(stream = %self.stream, generation = self.generation, "WatchdogTimer::reset: called");
        self.schedule(duration);
    }

    /// Cancel the pending expiry; no-op unless armed
    pub fn stop(&mut self) {
        if self.phase != WatchdogPhase::Armed {
            return;
        }
        debug!(stream = %self.stream, generation = self.generation, "WatchdogTimer::stop: called");
        self.abort_pending();
        self.phase = WatchdogPhase::Cancelled;
        self.deadline = None;
    }

    /// Accept a fire notification; false when it is stale
    pub fn on_fire(&mut self, generation: u64) -> bool {
        if self.phase != WatchdogPhase::Armed || generation != self.generation {
            debug!(
                stream = %self.stream,
                generation,
                current = self.generation,
                "WatchdogTimer::on_fire: stale fire ignored"
            );
            return false;
        }
        self.pending = None;
        self.phase = WatchdogPhase::Fired;
        self.deadline = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.phase == WatchdogPhase::Armed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    fn schedule(&mut self, duration: Duration) {
        self.abort_pending();
        self.generation += 1;
        self.phase = WatchdogPhase::Armed;
        self.deadline = Some(Instant::now() + duration);

        let lane = self.lane.clone();
        let fired = LaneRequest::WatchdogFired {
            stream: self.stream,
            subscription: self.subscription,
            generation: self.generation,
        };
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // lane gone means the supervisor shut down
            let _ = lane.send(fired).await;
        }));
    }

    fn abort_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for WatchdogTimer {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn timer() -> (WatchdogTimer, mpsc::Receiver<LaneRequest>) {
        let (tx, rx) = mpsc::channel(16);
        (WatchdogTimer::new(StreamKey::UpdateFlash, 1, tx), rx)
    }

    fn fired_generation(request: LaneRequest) -> u64 {
        match request {
            LaneRequest::WatchdogFired { generation, .. } => generation,
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_duration() {
        let (mut watchdog, mut rx) = timer();
        let start = Instant::now();
        watchdog.start(Duration::from_millis(6000));
        assert!(watchdog.is_armed());
        assert_eq!(watchdog.deadline(), Some(start + Duration::from_millis(6000)));

        let generation = fired_generation(rx.recv().await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(6000));
        assert!(watchdog.on_fire(generation));
        assert_eq!(watchdog.phase(), WatchdogPhase::Fired);
        assert!(!watchdog.on_fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_pushes_deadline_and_invalidates_old_generation() {
        let (mut watchdog, mut rx) = timer();
        watchdog.start(Duration::from_millis(1000));
        let first = watchdog.generation();

        tokio::time::sleep(Duration::from_millis(600)).await;
        watchdog.reset(Duration::from_millis(1000));
        let start = Instant::now();

        let generation = fired_generation(rx.recv().await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_ne!(generation, first);
        assert!(!watchdog.on_fire(first));
        assert!(watchdog.on_fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_and_is_idempotent() {
        let (mut watchdog, mut rx) = timer();
        watchdog.start(Duration::from_millis(6000));
        tokio::time::sleep(Duration::from_millis(10)).await;

        watchdog.stop();
        watchdog.stop();
        assert_eq!(watchdog.phase(), WatchdogPhase::Cancelled);
        assert!(watchdog.deadline().is_none());

        let next = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_fire_after_stop_is_stale() {
        let (mut watchdog, mut rx) = timer();
        watchdog.start(Duration::from_millis(100));
        let generation = fired_generation(rx.recv().await.unwrap());

        watchdog.stop();
        assert!(!watchdog.on_fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_pending_fire() {
        let (mut watchdog, mut rx) = timer();
        watchdog.start(Duration::from_millis(100));
        drop(watchdog);

        // the only sender was inside the dropped timer and its aborted task
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start(u64),
        Reset(u64),
        Stop,
        Advance(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..500).prop_map(Op::Start),
            (1u64..500).prop_map(Op::Reset),
            Just(Op::Stop),
            (0u64..700).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_live_generation(ops in proptest::collection::vec(op(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            runtime.block_on(async move {
                let (tx, mut rx) = mpsc::channel(64);
                let mut watchdog = WatchdogTimer::new(StreamKey::EeDump, 9, tx);
                let mut live: Option<u64> = None;
                let mut accepted = 0usize;

                for op in ops {
                    match op {
                        Op::Start(ms) => {
                            watchdog.start(Duration::from_millis(ms));
                            live = Some(watchdog.generation());
                        }
                        Op::Reset(ms) => {
                            watchdog.reset(Duration::from_millis(ms));
                            live = Some(watchdog.generation());
                        }
                        Op::Stop => {
                            watchdog.stop();
                            live = None;
                        }
                        Op::Advance(ms) => {
                            tokio::time::advance(Duration::from_millis(ms)).await;
                            for _ in 0..4 {
                                tokio::task::yield_now().await;
                            }
                        }
                    }

                    while let Ok(request) = rx.try_recv() {
                        let generation = fired_generation(request);
                        let expected = live == Some(generation);
                        assert_eq!(watchdog.on_fire(generation), expected);
                        if expected {
                            accepted += 1;
                            live = None;
                        }
                    }

                    assert_eq!(watchdog.is_armed(), live.is_some());
                }

                assert!(accepted <= watchdog.generation() as usize);
            });
        }
    }
}
