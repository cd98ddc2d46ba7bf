use std::time::Duration;

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use super::connection::Handle;
use crate::pubsub::message::Outbound;

/// Sends PING on whatever connection is current, every interval.
#[derive(Debug)]
pub(crate) struct PingWorker {
    handle_rx: watch::Receiver<Option<Handle>>,
    interval: Duration,
}

/// Running ping worker
#[derive(Debug)]
pub(crate) struct PingWorkerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PingWorker {
    pub fn new(handle_rx: watch::Receiver<Option<Handle>>, interval: Duration) -> Self {
        Self {
            handle_rx,
            interval,
        }
    }

    pub fn start(self) -> PingWorkerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        PingWorkerHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        log::debug!("Ping worker start, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut stop_rx => {
                    log::debug!("Stop");
                    break;
                }

                _ = ticker.tick() => {
                    let handle = self.handle_rx.borrow().clone();
                    let Some(handle) = handle else {
                        log::trace!("No connection ready, skip ping");
                        continue;
                    };

                    let sent = tokio::select! {
                        biased;

                        _ = &mut stop_rx => {
                            log::debug!(
                                "Stop while ping on connection #{} is queued",
                                handle.generation()
                            );
                            break;
                        }

                        sent = handle.send(Outbound::Ping) => sent,
                    };

                    if sent {
                        log::trace!("Send ping on connection #{}", handle.generation());
                    } else {
                        log::trace!("Connection #{} gone, ping dropped", handle.generation());
                    }
                }
            }
        }
    }
}

impl PingWorkerHandle {
    /// Stop the worker and wait it exits
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(err) = self.task.await {
            log::debug!("Ping worker exit abnormally: {}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::Instant;
    use url::Url;

    use super::*;
    use crate::{
        pubsub::client::{
            connection::ConnectionManager,
            mock::{socket_pair, MockConnector, SinkMode},
            observer::Observers,
        },
        subscription::Subscriptions,
    };

    #[tokio::test(start_paused = true)]
    async fn test_ping_every_interval_on_current_connection() {
        let (socket, mut remote) = socket_pair();
        let mut manager = ConnectionManager::new(
            MockConnector::new(vec![Ok(socket)]),
            Url::parse("wss://pubsub.test").unwrap(),
            Arc::new(Subscriptions::default()),
            Observers::new(8),
        );

        let worker = PingWorker::new(manager.watch_handle(), Duration::from_secs(60)).start();
        let _stream = manager.connect().await.unwrap();

        let start = Instant::now();
        for _ in 0..2 {
            let frame = remote.outbound.recv().await.unwrap();
            assert_eq!(frame.to_text().unwrap(), json!({"type": "PING"}).to_string());
        }
        assert!(start.elapsed() >= Duration::from_secs(120));

        worker.stop().await;
        manager.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_without_connection_is_noop() {
        let (handle_tx, handle_rx) = watch::channel(None);
        let worker = PingWorker::new(handle_rx, Duration::from_secs(60)).start();

        tokio::time::sleep(Duration::from_secs(150)).await;

        assert!(handle_tx.borrow().is_none());
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_connection_stalled() {
        let (socket, mut remote) = socket_pair();
        let mut manager = ConnectionManager::new(
            MockConnector::new(vec![Ok(socket)]),
            Url::parse("wss://pubsub.test").unwrap(),
            Arc::new(Subscriptions::default()),
            Observers::new(8),
        );

        let _stream = manager.connect().await.unwrap();
        let worker = PingWorker::new(manager.watch_handle(), Duration::from_secs(60)).start();

        remote.set_sink(SinkMode::Stall);

        // enough ticks to fill the outgoing queue behind the stuck write
        tokio::time::sleep(Duration::from_secs(40 * 60)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(1), worker.stop()).await;
        assert!(stopped.is_ok());
        assert!(remote.outbound.try_recv().is_err());

        manager.close();
    }
}
