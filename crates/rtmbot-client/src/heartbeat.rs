//! Application-level liveness probes.
//!
//! The transport has no usable keepalive, so the session sends a `ping`
//! frame every interval and the server answers with a `pong` carrying the
//! same id. The monitor never waits for a particular answer: it compares the
//! two counters at each tick.

use crate::outbound::Ping;
use crate::session::{DisconnectReason, Session};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Ping/pong counters shared by the heartbeat loop and pong dispatch.
#[derive(Debug)]
pub struct Heartbeat {
    last_ping: AtomicI32,
    last_pong: AtomicI32,
    max_missed: i32,
}

impl Heartbeat {
    /// Counters starting at zero; `max_missed` is the tolerated gap.
    pub fn new(max_missed: i32) -> Self {
        Self {
            last_ping: AtomicI32::new(0),
            last_pong: AtomicI32::new(0),
            max_missed,
        }
    }

    /// Id of the most recent ping.
    pub fn last_ping(&self) -> i32 {
        self.last_ping.load(Ordering::Acquire)
    }

    /// Highest ping id acknowledged so far.
    pub fn last_pong(&self) -> i32 {
        self.last_pong.load(Ordering::Acquire)
    }

    /// More than `max_missed` pings are unanswered.
    pub fn is_overdue(&self) -> bool {
        self.last_ping() - self.last_pong() > self.max_missed
    }

    /// Allocate the id of the next ping.
    pub fn next_ping(&self) -> i32 {
        self.last_ping.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a pong. The acknowledged id never moves backwards, and ids
    /// that were never issued are ignored.
    pub fn acknowledge(&self, reply_to: i32) {
        if reply_to > self.last_ping() {
            debug!(reply_to, "Pong for a ping that was never sent");
            return;
        }
        self.last_pong.fetch_max(reply_to, Ordering::AcqRel);
    }
}

/// Tick every `period` until the session closes or the peer stops answering.
pub(crate) async fn run(session: Session, period: Duration, mut closed: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = closed.changed() => return,
        }

        let heartbeat = session.heartbeat();
        if heartbeat.is_overdue() {
            let (last_ping, last_pong) = (heartbeat.last_ping(), heartbeat.last_pong());
            warn!(last_ping, last_pong, "Heartbeat timed out");
            // Another trigger may already have won; that is fine here.
            let _ = session
                .shutdown(DisconnectReason::HeartbeatTimeout {
                    last_ping,
                    last_pong,
                })
                .await;
            return;
        }

        let id = heartbeat.next_ping();
        match session.send_frame(&Ping::new(id)).await {
            Ok(()) => debug!(id, "Ping sent"),
            Err(e) => warn!(id, error = %e, "Failed to send ping"),
        }
    }
}
