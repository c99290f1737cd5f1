//! Serial Channel - the one process-wide link to the duck.
//!
//! The port is opened lazily on first demand (a send or an availability check)
//! under a mutex, so concurrent callers never open duplicate handles. Failures
//! are values, never panics: a failed connect leaves the channel `Failed` until
//! the cooldown passes; a failed write drops the handle so the next demand
//! re-runs discovery.
//!
//! ```text
//!   Disconnected ──demand──► Connecting ──open ok──► Connected
//!        ▲                       │                      │
//!        │                   open/discovery          write error
//!        │                     failed                   │
//!        │                       ▼                      │
//!        └──── cooldown ───── Failed                    │
//!        └──────────────────────────────────────────────┘
//! ```

use crate::command::{GestureCommand, LINE_TERMINATOR};
use crate::config::HardwareConfig;
use crate::discovery::discover_port;
use crate::error::{HardwareError, HardwareResult};
use crate::port::{PortBackend, SerialLink, SystemPorts};
use crate::sim::SimulatedPorts;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of the serial connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Failed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

struct Connection {
    port: String,
    link: SerialLink,
}

#[derive(Default)]
struct Inner {
    // Some iff state == Connected.
    connection: Option<Connection>,
    selected_port: Option<String>,
    failed_at: Option<Instant>,
    // A write died mid-frame; the firmware may hold a partial token.
    needs_resync: bool,
}

pub struct SerialChannel {
    config: HardwareConfig,
    backend: Arc<dyn PortBackend>,
    inner: Mutex<Inner>,
    state: AtomicU8,
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("baud_rate", &self.config.baud_rate)
            .field("state", &self.state())
            .finish()
    }
}

impl SerialChannel {
    /// Build a channel over the given backend. Nothing is opened yet.
    pub fn new(config: HardwareConfig, backend: Arc<dyn PortBackend>) -> Self {
        Self {
            config,
            backend,
            inner: Mutex::new(Inner::default()),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    /// Real hardware, or the in-memory duck when `simulate` is set.
    pub fn from_config(config: HardwareConfig) -> Self {
        let backend: Arc<dyn PortBackend> = if config.simulate {
            info!(target: "devduck::hardware", "simulated duck enabled; no serial hardware will be used");
            Arc::new(SimulatedPorts::with_duck())
        } else {
            Arc::new(SystemPorts)
        };
        Self::new(config, backend)
    }

    /// Lock-free, best-effort view of the connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    /// Port chosen by the most recent successful discovery.
    pub fn selected_port(&self) -> Option<String> {
        self.lock().selected_port.clone()
    }

    /// Port of the live connection, if any.
    pub fn connected_port(&self) -> Option<String> {
        self.lock().connection.as_ref().map(|c| c.port.clone())
    }

    /// Check the hardware, connecting lazily if needed. Blocks for the settle
    /// delay on a fresh connect.
    pub fn is_available(&self) -> bool {
        let mut inner = self.lock();
        self.ensure_connected(&mut inner).is_ok()
    }

    /// Encode and write one command. Never panics; every failure is a value.
    pub fn send(&self, command: GestureCommand) -> HardwareResult<()> {
        let mut inner = self.lock();
        if let Err(e) = self.ensure_connected(&mut inner) {
            debug!(target: "devduck::hardware", %command, error = %e, "skipping send (no serial)");
            return Err(e);
        }

        let mut frame = Vec::with_capacity(16);
        if inner.needs_resync {
            // Terminate whatever half token the last failed write left behind.
            frame.push(LINE_TERMINATOR);
        }
        frame.extend_from_slice(&command.encode());
        let result = match inner.connection.as_mut() {
            Some(conn) => conn
                .link
                .write_all(&frame)
                .and_then(|_| conn.link.flush())
                .map_err(|source| HardwareError::Write {
                    port: conn.port.clone(),
                    source,
                }),
            None => Err(HardwareError::Discovery("connection vanished".into())),
        };

        match result {
            Ok(()) => {
                if inner.needs_resync {
                    debug!(target: "devduck::hardware", "line buffer resynced");
                    inner.needs_resync = false;
                }
                debug!(target: "devduck::hardware", %command, "sent");
                Ok(())
            }
            Err(e) => {
                warn!(target: "devduck::hardware", %command, error = %e, "serial write failed; dropping connection");
                self.invalidate(&mut inner);
                Err(e)
            }
        }
    }

    /// Explicit teardown (shutdown path).
    pub fn close(&self) {
        let mut inner = self.lock();
        if let Some(mut conn) = inner.connection.take() {
            let _ = conn.link.flush();
            info!(target: "devduck::hardware", port = %conn.port, "serial connection closed");
        }
        inner.failed_at = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-send must not take the duck down with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn ensure_connected(&self, inner: &mut Inner) -> HardwareResult<()> {
        if inner.connection.is_some() {
            return Ok(());
        }

        if let Some(failed_at) = inner.failed_at {
            let cooldown = self.config.reconnect_cooldown();
            let elapsed = failed_at.elapsed();
            if elapsed < cooldown {
                return Err(HardwareError::Unavailable {
                    retry_in_ms: (cooldown - elapsed).as_millis() as u64,
                });
            }
        }

        self.set_state(ConnectionState::Connecting);

        let (port, source) = match discover_port(&self.config, self.backend.as_ref()) {
            Ok(found) => found,
            Err(e) => {
                warn!(target: "devduck::hardware", error = %e, "duck discovery failed");
                self.mark_failed(inner);
                return Err(e);
            }
        };

        let link = match self
            .backend
            .open(&port, self.config.baud_rate, self.config.write_timeout())
        {
            Ok(link) => link,
            Err(source) => {
                warn!(target: "devduck::hardware", port = %port, error = %source, "could not open serial port");
                self.mark_failed(inner);
                return Err(HardwareError::Connect { port, source });
            }
        };

        // Opening the port resets the microcontroller.
        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }

        info!(
            target: "devduck::hardware",
            port = %port,
            baud = self.config.baud_rate,
            source = ?source,
            "connected to duck"
        );
        inner.selected_port = Some(port.clone());
        inner.connection = Some(Connection { port, link });
        inner.failed_at = None;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    fn mark_failed(&self, inner: &mut Inner) {
        inner.connection = None;
        inner.failed_at = Some(Instant::now());
        self.set_state(ConnectionState::Failed);
    }

    fn invalidate(&self, inner: &mut Inner) {
        inner.connection = None;
        inner.failed_at = None;
        inner.needs_resync = true;
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedPorts, SIM_DUCK_PORT};

    fn fast_config() -> HardwareConfig {
        HardwareConfig {
            settle_delay_ms: 0,
            reconnect_cooldown_ms: 0,
            fallback_port: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_not_opened_until_first_send() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let channel = SerialChannel::new(fast_config(), sim.clone());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(sim.open_count(), 0);

        channel.send(GestureCommand::Nod).unwrap();
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert_eq!(channel.selected_port().as_deref(), Some(SIM_DUCK_PORT));
        assert_eq!(channel.connected_port().as_deref(), Some(SIM_DUCK_PORT));
        assert_eq!(sim.wire().bytes(), b"NOD\n".to_vec());

        channel.send(GestureCommand::Shake).unwrap();
        assert_eq!(sim.open_count(), 1);
    }

    #[test]
    fn test_no_port_degrades_to_failure_values() {
        let sim = Arc::new(SimulatedPorts::empty());
        let channel = SerialChannel::new(fast_config(), sim.clone());
        assert!(!channel.is_available());
        assert_eq!(channel.state(), ConnectionState::Failed);
        for cmd in GestureCommand::ALL {
            let err = channel.send(cmd).unwrap_err();
            assert!(!err.is_fatal());
        }
        assert!(sim.wire().bytes().is_empty());
    }

    #[test]
    fn test_connect_failure_sets_failed() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        sim.set_refuse_open(true);
        let channel = SerialChannel::new(fast_config(), sim.clone());
        let err = channel.send(GestureCommand::Nod).unwrap_err();
        assert_eq!(err.kind(), "connect_failure");
        assert_eq!(channel.state(), ConnectionState::Failed);

        sim.set_refuse_open(false);
        channel.send(GestureCommand::Nod).unwrap();
        assert!(channel.is_connected());
    }

    #[test]
    fn test_cooldown_short_circuits_retries() {
        let sim = Arc::new(SimulatedPorts::empty());
        let config = HardwareConfig {
            reconnect_cooldown_ms: 60_000,
            ..fast_config()
        };
        let channel = SerialChannel::new(config, sim.clone());
        assert!(channel.send(GestureCommand::Nod).is_err());
        assert_eq!(sim.discovery_count(), 1);
        let err = channel.send(GestureCommand::Nod).unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert_eq!(sim.discovery_count(), 1);
    }

    #[test]
    fn test_torn_frame_is_terminated_before_next_command() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let channel = SerialChannel::new(fast_config(), sim.clone());
        channel.send(GestureCommand::Nod).unwrap();

        sim.fail_after_bytes(2);
        let err = channel.send(GestureCommand::Shake).unwrap_err();
        assert_eq!(err.kind(), "write_failure");
        assert_eq!(channel.state(), ConnectionState::Disconnected);

        channel.send(GestureCommand::Left).unwrap();
        channel.send(GestureCommand::Right).unwrap();
        let wire = sim.wire();
        assert_eq!(wire.bytes(), b"NOD\nSH\nLEFT\nRIGHT\n".to_vec());
        assert_eq!(
            wire.commands(),
            vec![GestureCommand::Nod, GestureCommand::Left, GestureCommand::Right]
        );
        assert_eq!(sim.open_count(), 2);
    }

    #[test]
    fn test_close_releases_handle() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let channel = SerialChannel::new(fast_config(), sim.clone());
        assert!(channel.is_available());
        channel.close();
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        channel.send(GestureCommand::Left).unwrap();
        assert_eq!(sim.open_count(), 2);
    }
}
