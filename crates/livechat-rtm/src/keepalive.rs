//! Keepalive pinger.

use crate::{session::Outbound, transport::Frame};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default interval between keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Queues an empty ping frame every `interval` until `cancel` fires or the
/// writer queue closes. The first ping goes out one full interval after start.
pub(crate) async fn run_keepalive(
    writer: mpsc::Sender<Outbound>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Keepalive cancelled");
                return;
            }
            _ = ticker.tick() => {
                if writer.send(Outbound::frame(Frame::Ping(Vec::new()))).await.is_err() {
                    warn!("Writer queue closed; stopping keepalive");
                    return;
                }
                debug!(?interval, "Keepalive ping queued");
            }
        }
    }
}
