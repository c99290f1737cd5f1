//! Animation Scheduler - the talking loop and one-shot gestures.
//!
//! ```text
//!            start_talking (hardware ok, no live session)
//!   ┌──────┐ ─────────────────────────────────────────► ┌─────────┐
//!   │ Idle │                                            │ Talking │
//!   └──────┘ ◄───────────────────────────────────────── └─────────┘
//!            loop observes cancel / gives up after N failed sends
//! ```
//!
//! Each talking session owns its own cancellation token, so a stop followed
//! immediately by a start never leaks a stale flag into the new session. All
//! motion, looped or one-shot, goes through the [`CommandWriter`] queue.

use crate::channel::SerialChannel;
use crate::command::GestureCommand;
use crate::config::{AnimationConfig, DuckConfig};
use crate::error::{HardwareError, HardwareResult};
use crate::port::PortBackend;
use crate::routine::{Routine, RoutineBook};
use crate::writer::CommandWriter;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something the duck can be asked to do once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Gesture(GestureCommand),
    Routine(Arc<Routine>),
}

impl Action {
    /// Resolve an HTTP/action name: any gesture token, `greet`, or `goodluck`.
    pub fn from_name(name: &str, routines: &RoutineBook) -> Option<Action> {
        let folded: String = name
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "greet" | "greeting" => Some(Action::Routine(Arc::new(routines.greeting.clone()))),
            "goodluck" => Some(Action::Routine(Arc::new(routines.good_luck.clone()))),
            _ => folded.parse::<GestureCommand>().ok().map(Action::Gesture),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Action::Gesture(cmd) => cmd.wire_token().to_lowercase(),
            Action::Routine(routine) => routine.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkState {
    Idle,
    Talking,
}

impl TalkState {
    pub fn as_str(self) -> &'static str {
        match self {
            TalkState::Idle => "idle",
            TalkState::Talking => "talking",
        }
    }
}

/// Outcome of [`AnimationScheduler::start_talking`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkStart {
    Started,
    AlreadyTalking,
    HardwareUnavailable,
}

impl TalkStart {
    pub fn as_str(self) -> &'static str {
        match self {
            TalkStart::Started => "started",
            TalkStart::AlreadyTalking => "already_talking",
            TalkStart::HardwareUnavailable => "hardware_unavailable",
        }
    }
}

struct TalkSession {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TalkSession {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Decrements the live-loop count when a loop task ends, however it ends.
struct LoopGuard(Arc<AtomicUsize>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AnimationScheduler {
    writer: CommandWriter,
    config: AnimationConfig,
    routines: RoutineBook,
    session: Mutex<Option<TalkSession>>,
    next_session: AtomicU64,
    live_loops: Arc<AtomicUsize>,
}

impl AnimationScheduler {
    pub fn new(writer: CommandWriter, config: AnimationConfig, routines: RoutineBook) -> Self {
        Self {
            writer,
            config,
            routines,
            session: Mutex::new(None),
            next_session: AtomicU64::new(1),
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wire up channel, writer and scheduler from configuration.
    pub fn from_config(config: &DuckConfig) -> HardwareResult<Self> {
        let channel = Arc::new(SerialChannel::from_config(config.hardware.clone()));
        let writer = CommandWriter::spawn(channel, config.hardware.queue_capacity)?;
        Ok(Self::new(writer, config.animation.clone(), RoutineBook::default()))
    }

    /// Same as [`from_config`](Self::from_config) over an explicit port backend.
    pub fn with_backend(
        config: &DuckConfig,
        backend: Arc<dyn PortBackend>,
        routines: RoutineBook,
    ) -> HardwareResult<Self> {
        let channel = Arc::new(SerialChannel::new(config.hardware.clone(), backend));
        let writer = CommandWriter::spawn(channel, config.hardware.queue_capacity)?;
        Ok(Self::new(writer, config.animation.clone(), routines))
    }

    pub fn writer(&self) -> &CommandWriter {
        &self.writer
    }

    pub fn channel(&self) -> &Arc<SerialChannel> {
        self.writer.channel()
    }

    pub fn routines(&self) -> &RoutineBook {
        &self.routines
    }

    pub fn state(&self) -> TalkState {
        match self.lock_session().as_ref() {
            Some(session) if session.is_live() => TalkState::Talking,
            _ => TalkState::Idle,
        }
    }

    /// Talk-loop tasks still running (a just-stopped loop counts until it
    /// observes its cancellation).
    pub fn active_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    /// Check the hardware off the async runtime; the first check may connect.
    pub async fn hardware_available(&self) -> bool {
        let channel = Arc::clone(self.writer.channel());
        tokio::task::spawn_blocking(move || channel.is_available())
            .await
            .unwrap_or(false)
    }

    /// Open the serial link in the background so the first gesture is quick.
    pub fn warm_up(&self) -> JoinHandle<bool> {
        let channel = Arc::clone(self.writer.channel());
        tokio::task::spawn_blocking(move || channel.is_available())
    }

    /// Start the talking loop. Idempotent; a no-op when hardware is absent.
    pub async fn start_talking(&self) -> TalkStart {
        if !self.hardware_available().await {
            debug!(target: "devduck::hardware", "duck hardware not available; skipping talk animation start");
            return TalkStart::HardwareUnavailable;
        }

        let mut slot = self.lock_session();
        if slot.as_ref().is_some_and(TalkSession::is_live) {
            return TalkStart::AlreadyTalking;
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        let guard = LoopGuard(Arc::clone(&self.live_loops));
        let handle = tokio::spawn(talk_loop(
            id,
            self.writer.clone(),
            self.config.clone(),
            cancel.clone(),
            guard,
        ));
        *slot = Some(TalkSession { id, cancel, handle });
        info!(target: "devduck::hardware", session = id, "duck talk animation started");
        TalkStart::Started
    }

    /// Request the loop to stop. Does not wait: the loop stops within one
    /// step-wait, even when its next command is stuck behind a queue backlog
    /// (that command is then never written). Returns false if nothing was
    /// talking.
    pub fn stop_talking(&self) -> bool {
        let slot = self.lock_session();
        match slot.as_ref() {
            Some(session) if !session.cancel.is_cancelled() => {
                session.cancel.cancel();
                info!(target: "devduck::hardware", session = session.id, "duck talk animation stop requested");
                true
            }
            _ => false,
        }
    }

    /// Run a gesture or routine on its own task, independent of the talking
    /// state. Dropping the handle detaches it. Resolves to the number of
    /// commands the duck received.
    pub fn fire_once(&self, action: Action) -> JoinHandle<usize> {
        let writer = self.writer.clone();
        debug!(target: "devduck::hardware", action = %action.name(), "fire once");
        tokio::spawn(async move {
            match action {
                Action::Gesture(command) => match writer.send(command).await {
                    Ok(()) => 1,
                    Err(e) => {
                        debug!(target: "devduck::hardware", %command, error = %e, "gesture not delivered");
                        0
                    }
                },
                Action::Routine(routine) => routine.play(&writer).await,
            }
        })
    }

    pub fn greet(&self) -> JoinHandle<usize> {
        self.fire_once(Action::Routine(Arc::new(self.routines.greeting.clone())))
    }

    pub fn good_luck(&self) -> JoinHandle<usize> {
        self.fire_once(Action::Routine(Arc::new(self.routines.good_luck.clone())))
    }

    pub fn acknowledge(&self) -> JoinHandle<usize> {
        self.fire_once(Action::Routine(Arc::new(self.routines.acknowledgement.clone())))
    }

    /// Stop talking, wait for the loop, then stop the writer and close the port.
    pub async fn shutdown(&self) {
        self.stop_talking();
        let handle = self.lock_session().take().map(|s| s.handle);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.writer.shutdown().await;
        info!(target: "devduck::hardware", "animation scheduler shut down");
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<TalkSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Sleep unless cancelled first. Returns true if cancelled.
async fn cancellable_wait(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

async fn talk_loop(
    session: u64,
    writer: CommandWriter,
    config: AnimationConfig,
    cancel: CancellationToken,
    _guard: LoopGuard,
) {
    if config.talk_pattern.is_empty() {
        warn!(target: "devduck::hardware", session, "empty talk pattern; nothing to animate");
        return;
    }
    if cancellable_wait(config.jitter_delay(), &cancel).await {
        debug!(target: "devduck::hardware", session, "talk loop cancelled before first motion");
        return;
    }

    let max_failures = config.max_consecutive_failures.max(1);
    let step_wait = config.step_wait();
    let mut failures = 0u32;

    'talking: loop {
        for &command in &config.talk_pattern {
            if cancel.is_cancelled() {
                break 'talking;
            }
            match writer.send_cancellable(command, &cancel).await {
                Ok(()) => failures = 0,
                Err(HardwareError::Cancelled) => break 'talking,
                Err(e) => {
                    failures += 1;
                    if failures >= max_failures {
                        warn!(target: "devduck::hardware", session, error = %e, failures, "talk loop giving up");
                        break 'talking;
                    }
                }
            }
            if cancellable_wait(step_wait, &cancel).await {
                break 'talking;
            }
        }
    }
    info!(target: "devduck::hardware", session, "duck talk animation ended");
}
