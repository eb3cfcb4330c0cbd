//! Periodic ping and time packets for an authenticated session.

use std::sync::Arc;
use std::time::Duration;

use mdbeta_net::ServerPacket;
use mdbeta_world::WorldClock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::trace;

use crate::outbox::Outbox;

/// Owns the keepalive task. Dropping the scheduler stops it.
pub struct KeepaliveScheduler {
    task: JoinHandle<()>,
}

impl KeepaliveScheduler {
    /// Start sending `Ping` every `ping_every` and `Time` every `time_every`.
    ///
    /// Both fire once immediately. The task ends by itself once the outbox is closed.
    pub fn start(
        outbox: Outbox,
        clock: Arc<WorldClock>,
        ping_every: Duration,
        time_every: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ping = interval(ping_every);
            ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut time = interval(time_every);
            time.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let packet = tokio::select! {
                    _ = ping.tick() => ServerPacket::Ping,
                    _ = time.tick() => ServerPacket::Time { tick: clock.now().0 },
                };
                if outbox.send(packet).is_err() {
                    trace!("keepalive stopped: outbox closed");
                    break;
                }
            }
        });
        Self { task }
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for KeepaliveScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbeta_core::SimTick;

    #[tokio::test(start_paused = true)]
    async fn test_ping_and_time_cadence() {
        let (outbox, mut rx) = Outbox::channel();
        let clock = Arc::new(WorldClock::starting_at(SimTick(6000)));
        let _keepalive = KeepaliveScheduler::start(
            outbox,
            clock,
            Duration::from_secs(5),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_millis(20_500)).await;

        let mut pings = 0;
        let mut times = 0;
        while let Ok(packet) = rx.try_recv() {
            match packet {
                ServerPacket::Ping => pings += 1,
                ServerPacket::Time { tick } => {
                    assert_eq!(tick, 6000);
                    times += 1;
                }
                other => panic!("unexpected packet {other:?}"),
            }
        }
        // t = 0, 5, 10, 15, 20 and t = 0, 10, 20
        assert_eq!(pings, 5);
        assert_eq!(times, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_sending() {
        let (outbox, mut rx) = Outbox::channel();
        let clock = Arc::new(WorldClock::starting_at(SimTick::ZERO));
        let keepalive = KeepaliveScheduler::start(
            outbox,
            clock,
            Duration::from_secs(5),
            Duration::from_secs(10),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(keepalive);
        while rx.try_recv().is_ok() {}

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(rx.try_recv().is_err());
    }
}
