//! In-memory duck: a port backend whose wire is a byte buffer.
//!
//! Used by the test suite and by `simulate = true` runs without hardware. The
//! link accepts one byte per `write` call so a second concurrent writer would
//! show up as interleaved frames on the wire. Faults are scriptable: failed
//! writes, a write torn partway through a frame, and a slow line.

use crate::command::{GestureCommand, LINE_TERMINATOR};
use crate::port::{PortBackend, PortInfo, SerialLink};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SIM_DUCK_PORT: &str = "/dev/sim-duck";

/// Everything written to the simulated device, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SimWire {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SimWire {
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Complete (terminated) lines.
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.bytes();
        let mut lines: Vec<String> = bytes
            .split(|b| *b == LINE_TERMINATOR)
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        // Text after the last terminator is an unfinished frame.
        lines.pop();
        lines
    }

    pub fn commands(&self) -> Vec<GestureCommand> {
        self.lines().iter().filter_map(|l| l.parse().ok()).collect()
    }

    pub fn count(&self, command: GestureCommand) -> usize {
        self.commands().into_iter().filter(|c| *c == command).count()
    }

    /// Every frame is a known token and nothing is left half-written. Bare
    /// terminators (resync markers) are allowed.
    pub fn is_well_formed(&self) -> bool {
        let bytes = self.bytes();
        if bytes.last().is_some_and(|b| *b != LINE_TERMINATOR) {
            return false;
        }
        self.lines().iter().all(|line| {
            line.is_empty() || GestureCommand::ALL.iter().any(|c| c.wire_token() == line)
        })
    }

    pub fn clear(&self) {
        if let Ok(mut bytes) = self.bytes.lock() {
            bytes.clear();
        }
    }

    fn push(&self, byte: u8) {
        if let Ok(mut bytes) = self.bytes.lock() {
            bytes.push(byte);
        }
    }
}

/// Scriptable port backend backed by a [`SimWire`].
#[derive(Debug, Default)]
pub struct SimulatedPorts {
    ports: Mutex<Vec<PortInfo>>,
    devices: Mutex<HashSet<String>>,
    wire: SimWire,
    list_calls: AtomicUsize,
    open_calls: AtomicUsize,
    refuse_open: AtomicBool,
    faults: Arc<LinkFaults>,
}

/// Fault script shared by every link the backend hands out.
#[derive(Debug, Default)]
struct LinkFaults {
    failing_writes: AtomicUsize,
    // Bytes still accepted before one write fails; None when unarmed.
    tear_after: Mutex<Option<usize>>,
    byte_delay_us: AtomicU64,
}

impl SimulatedPorts {
    /// No devices at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One Arduino-looking device at [`SIM_DUCK_PORT`].
    pub fn with_duck() -> Self {
        let sim = Self::default();
        sim.add_port(PortInfo {
            device: SIM_DUCK_PORT.to_string(),
            description: "Simulated Arduino Uno".to_string(),
            hwid: "USB VID:PID=2341:0043 SER=DUCK".to_string(),
        });
        sim
    }

    pub fn add_port(&self, info: PortInfo) {
        if let Ok(mut ports) = self.ports.lock() {
            ports.push(info);
        }
    }

    /// A device path that exists but is not reported by enumeration.
    pub fn add_device(&self, device: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(device.to_string());
        }
    }

    pub fn remove_all_ports(&self) {
        if let Ok(mut ports) = self.ports.lock() {
            ports.clear();
        }
        if let Ok(mut devices) = self.devices.lock() {
            devices.clear();
        }
    }

    pub fn wire(&self) -> SimWire {
        self.wire.clone()
    }

    /// Number of enumeration passes (one per discovery attempt without override).
    pub fn discovery_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn open_count(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn set_refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    /// The next `n` writes fail with `BrokenPipe` before touching the wire.
    pub fn fail_next_writes(&self, n: usize) {
        self.faults.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Accept `n` more bytes, then fail one write, leaving a torn frame.
    pub fn fail_after_bytes(&self, n: usize) {
        if let Ok(mut tear) = self.faults.tear_after.lock() {
            *tear = Some(n);
        }
    }

    /// Time the line takes per byte.
    pub fn set_byte_delay(&self, delay: Duration) {
        let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
        self.faults.byte_delay_us.store(micros, Ordering::SeqCst);
    }

    fn known(&self, device: &str) -> bool {
        let listed = self
            .ports
            .lock()
            .map(|ports| ports.iter().any(|p| p.device == device))
            .unwrap_or(false);
        listed
            || self
                .devices
                .lock()
                .map(|devices| devices.contains(device))
                .unwrap_or(false)
    }
}

impl PortBackend for SimulatedPorts {
    fn list_ports(&self) -> io::Result<Vec<PortInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ports.lock().map(|p| p.clone()).unwrap_or_default())
    }

    fn exists(&self, device: &str) -> bool {
        self.known(device)
    }

    fn open(&self, device: &str, _baud_rate: u32, _timeout: Duration) -> io::Result<SerialLink> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "port busy"));
        }
        if !self.known(device) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{device}: no such device")));
        }
        Ok(Box::new(SimLink {
            wire: self.wire.clone(),
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct SimLink {
    wire: SimWire,
    faults: Arc<LinkFaults>,
}

impl SimLink {
    fn torn(&self) -> bool {
        let Ok(mut tear) = self.faults.tear_after.lock() else {
            return false;
        };
        match *tear {
            Some(0) => {
                *tear = None;
                true
            }
            Some(n) => {
                *tear = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

impl Write for SimLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let should_fail = self
            .faults
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated unplug"));
        }
        let Some(byte) = buf.first() else {
            return Ok(0);
        };
        if self.torn() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated unplug mid-frame"));
        }
        match self.faults.byte_delay_us.load(Ordering::SeqCst) {
            0 => std::thread::yield_now(),
            micros => std::thread::sleep(Duration::from_micros(micros)),
        }
        self.wire.push(*byte);
        Ok(1)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
