//! Connection health monitoring

use std::time::Duration;

use rv_protocol::Session;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Probes an agent session with pings at a fixed interval
pub struct HealthMonitor {
    /// Time between probes
    pub interval: Duration,
    /// Consecutive failed probes that end the tunnel
    pub failure_threshold: u32,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(interval: Duration, failure_threshold: u32) -> Self {
        Self {
            interval,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Probe `session` until `done` is cancelled
    ///
    /// When the failure threshold is reached `done` is cancelled, exactly
    /// once, and the monitor returns.
    pub async fn run(self, session: Session, done: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let probe = tokio::select! {
                _ = done.cancelled() => return,
                probe = session.ping() => probe,
            };

            match probe {
                Ok(latency) => {
                    failures = 0;
                    tracing::trace!(latency_ms = latency.as_millis() as u64, "health probe ok");
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        error = %e,
                        failures,
                        threshold = self.failure_threshold,
                        "health probe failed"
                    );
                    if failures >= self.failure_threshold {
                        done.cancel();
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_protocol::{Mode, MuxConfig};

    fn quick_config() -> MuxConfig {
        MuxConfig {
            ping_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_healthy_session_keeps_running() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let session = Session::new(a, Mode::Client, quick_config()).unwrap();
        let _agent = Session::new(b, Mode::Server, quick_config()).unwrap();

        let done = CancellationToken::new();
        let monitor = tokio::spawn(
            HealthMonitor::new(Duration::from_millis(20), 1).run(session, done.clone()),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!done.is_cancelled(), "healthy session must not be failed");

        done.cancel();
        monitor.await.unwrap();
    }

    #[tokio::test]
    async fn test_first_failure_cancels_done() {
        // Peer end is held open but never answers
        let (a, _silent) = tokio::io::duplex(64 * 1024);
        let session = Session::new(a, Mode::Client, quick_config()).unwrap();

        let done = CancellationToken::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            HealthMonitor::new(Duration::from_millis(20), 1).run(session, done.clone()),
        )
        .await
        .expect("monitor should give up after one failed probe");
        assert!(done.is_cancelled());
    }

    #[tokio::test]
    async fn test_threshold_tolerates_fewer_failures() {
        let (a, _silent) = tokio::io::duplex(64 * 1024);
        let session = Session::new(a, Mode::Client, quick_config()).unwrap();

        let done = CancellationToken::new();
        let monitor = tokio::spawn(
            HealthMonitor::new(Duration::from_millis(20), 3).run(session, done.clone()),
        );

        // Two probes at most can fail in this window
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(!done.is_cancelled());

        tokio::time::timeout(Duration::from_secs(2), monitor)
            .await
            .expect("monitor should stop after the third failure")
            .unwrap();
        assert!(done.is_cancelled());
    }

    #[test]
    fn test_zero_threshold_clamped() {
        assert_eq!(HealthMonitor::new(Duration::from_secs(1), 0).failure_threshold, 1);
    }
}
