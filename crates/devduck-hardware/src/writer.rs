//! Single-writer worker.
//!
//! Every physical write goes through one bounded queue drained by one dedicated
//! thread, so `SerialChannel::send` is never called from two contexts at once.
//! Producers (talk loop, one-shot gestures, routine steps) only enqueue.
//! A dedicated thread is used because serial I/O and the settle delay block.
//! Writes tied to a cancellation token are dropped by the worker if the token
//! fires while they wait in the queue.

use crate::channel::SerialChannel;
use crate::command::GestureCommand;
use crate::error::{HardwareError, HardwareResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum WriterMessage {
    Write {
        command: GestureCommand,
        ack: Option<oneshot::Sender<HardwareResult<()>>>,
        cancel: Option<CancellationToken>,
    },
    Shutdown,
}

/// Counters kept by the worker.
#[derive(Debug, Default)]
pub struct WriterStats {
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl WriterStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Writes dropped because their token was cancelled while queued.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Cloneable producer handle for the serial writer.
#[derive(Clone)]
pub struct CommandWriter {
    tx: mpsc::Sender<WriterMessage>,
    channel: Arc<SerialChannel>,
    stats: Arc<WriterStats>,
    worker: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl std::fmt::Debug for CommandWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWriter")
            .field("closed", &self.tx.is_closed())
            .field("sent", &self.stats.sent())
            .field("failed", &self.stats.failed())
            .finish()
    }
}

impl CommandWriter {
    /// Start the worker thread. `capacity` bounds the queue (minimum 1).
    pub fn spawn(channel: Arc<SerialChannel>, capacity: usize) -> HardwareResult<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(WriterStats::default());

        let worker_channel = Arc::clone(&channel);
        let worker_stats = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name("duck-serial-writer".into())
            .spawn(move || run_worker(worker_channel, rx, worker_stats))
            .map_err(HardwareError::WorkerSpawn)?;

        Ok(Self {
            tx,
            channel,
            stats,
            worker: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Queue a command and wait until the worker has written it (or failed).
    pub async fn send(&self, command: GestureCommand) -> HardwareResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let message = WriterMessage::Write {
            command,
            ack: Some(ack_tx),
            cancel: None,
        };
        self.submit(message, ack_rx).await
    }

    /// Like [`send`](Self::send), but returns `Cancelled` as soon as `cancel`
    /// fires, whether the command is waiting for queue space or queued behind
    /// other work. A cancelled command is never written. A write already in
    /// progress is allowed to finish so the frame stays whole.
    pub async fn send_cancellable(
        &self,
        command: GestureCommand,
        cancel: &CancellationToken,
    ) -> HardwareResult<()> {
        if cancel.is_cancelled() {
            return Err(HardwareError::Cancelled);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let message = WriterMessage::Write {
            command,
            ack: Some(ack_tx),
            cancel: Some(cancel.clone()),
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HardwareError::Cancelled),
            result = self.submit(message, ack_rx) => result,
        }
    }

    /// Queue a command without waiting for the write.
    pub async fn enqueue(&self, command: GestureCommand) -> HardwareResult<()> {
        self.tx
            .send(WriterMessage::Write {
                command,
                ack: None,
                cancel: None,
            })
            .await
            .map_err(|_| HardwareError::QueueClosed)
    }

    async fn submit(
        &self,
        message: WriterMessage,
        ack_rx: oneshot::Receiver<HardwareResult<()>>,
    ) -> HardwareResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| HardwareError::QueueClosed)?;
        ack_rx.await.map_err(|_| HardwareError::WorkerGone)?
    }

    pub fn channel(&self) -> &Arc<SerialChannel> {
        &self.channel
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Commands waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop the worker after the commands already queued ahead of the
    /// shutdown marker, then close the serial port.
    pub async fn shutdown(&self) {
        if self.tx.send(WriterMessage::Shutdown).await.is_err() {
            return;
        }
        let handle = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!(target: "devduck::hardware", "serial writer did not exit cleanly");
            }
        }
    }
}

fn run_worker(
    channel: Arc<SerialChannel>,
    mut rx: mpsc::Receiver<WriterMessage>,
    stats: Arc<WriterStats>,
) {
    info!(target: "devduck::hardware", "serial writer started");
    while let Some(message) = rx.blocking_recv() {
        match message {
            WriterMessage::Write {
                command,
                ack,
                cancel,
            } => {
                let result = if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    debug!(target: "devduck::hardware", %command, "dropping cancelled command");
                    stats.skipped.fetch_add(1, Ordering::Relaxed);
                    Err(HardwareError::Cancelled)
                } else {
                    let result = channel.send(command);
                    match &result {
                        Ok(()) => stats.sent.fetch_add(1, Ordering::Relaxed),
                        Err(_) => stats.failed.fetch_add(1, Ordering::Relaxed),
                    };
                    result
                };
                if let Some(ack) = ack {
                    // The producer may have stopped waiting.
                    let _ = ack.send(result);
                }
            }
            WriterMessage::Shutdown => {
                debug!(target: "devduck::hardware", "serial writer shutdown requested");
                break;
            }
        }
    }
    rx.close();
    channel.close();
    info!(target: "devduck::hardware", "serial writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HardwareConfig;
    use crate::sim::SimulatedPorts;
    use std::time::{Duration, Instant};

    fn writer_over(sim: Arc<SimulatedPorts>) -> CommandWriter {
        let config = HardwareConfig {
            settle_delay_ms: 0,
            reconnect_cooldown_ms: 0,
            fallback_port: None,
            ..Default::default()
        };
        let channel = Arc::new(SerialChannel::new(config, sim));
        CommandWriter::spawn(channel, 8).unwrap()
    }

    #[tokio::test]
    async fn test_send_waits_for_write() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let writer = writer_over(sim.clone());
        writer.send(GestureCommand::Nod).await.unwrap();
        assert_eq!(sim.wire().bytes(), b"NOD\n".to_vec());
        assert_eq!(writer.stats().sent(), 1);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_reports_hardware_absent() {
        let sim = Arc::new(SimulatedPorts::empty());
        let writer = writer_over(sim);
        let err = writer.send(GestureCommand::Nod).await.unwrap_err();
        assert_eq!(err.kind(), "discovery_failure");
        assert_eq!(writer.stats().failed(), 1);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_command_is_never_written() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        sim.set_byte_delay(Duration::from_millis(20));
        let writer = writer_over(sim.clone());

        // Keep the worker busy for ~400ms.
        for _ in 0..5 {
            writer.enqueue(GestureCommand::Nod).await.unwrap();
        }
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = writer.send_cancellable(GestureCommand::Left, &cancel).await;
        assert!(matches!(result, Err(HardwareError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(200));

        // Drain the backlog, then check LEFT never reached the wire.
        writer.send(GestureCommand::Right).await.unwrap();
        let wire = sim.wire();
        assert_eq!(wire.count(GestureCommand::Left), 0);
        assert_eq!(wire.count(GestureCommand::Nod), 5);
        assert_eq!(wire.commands().last(), Some(&GestureCommand::Right));
        assert_eq!(writer.stats().skipped(), 1);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_already_cancelled_is_not_queued() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let writer = writer_over(sim.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            writer.send_cancellable(GestureCommand::Nod, &cancel).await,
            Err(HardwareError::Cancelled)
        ));
        assert_eq!(writer.queued(), 0);
        writer.shutdown().await;
        assert!(sim.wire().bytes().is_empty());
        assert_eq!(writer.stats().skipped(), 0);
    }

    #[tokio::test]
    async fn test_queue_closed_after_shutdown() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let writer = writer_over(sim.clone());
        writer.enqueue(GestureCommand::Left).await.unwrap();
        writer.shutdown().await;
        assert!(writer.is_closed());
        assert!(matches!(
            writer.send(GestureCommand::Right).await,
            Err(HardwareError::QueueClosed)
        ));
        assert_eq!(sim.wire().commands(), vec![GestureCommand::Left]);
        assert!(!writer.channel().is_connected());
    }
}
