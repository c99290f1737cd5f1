//! Port backends: how the channel enumerates, checks and opens serial devices.
//!
//! `SystemPorts` talks to real hardware through the `serialport` crate; the
//! simulated backend lives in [`crate::sim`].

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// What enumeration tells us about one serial device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortInfo {
    /// Device path, e.g. `/dev/cu.usbmodem11101` or `COM3`.
    pub device: String,
    pub description: String,
    /// Hardware id string (`USB VID:PID=2341:0043 SER=...`).
    pub hwid: String,
}

/// An open, write-only link to the duck.
pub type SerialLink = Box<dyn Write + Send>;

/// Access to the system's serial devices.
pub trait PortBackend: Send + Sync {
    fn list_ports(&self) -> io::Result<Vec<PortInfo>>;

    fn exists(&self, device: &str) -> bool;

    fn open(&self, device: &str, baud_rate: u32, timeout: Duration) -> io::Result<SerialLink>;
}

/// Real serial devices via `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortBackend for SystemPorts {
    fn list_ports(&self) -> io::Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(ports.into_iter().map(port_info_from).collect())
    }

    fn exists(&self, device: &str) -> bool {
        Path::new(device).exists()
    }

    fn open(&self, device: &str, baud_rate: u32, timeout: Duration) -> io::Result<SerialLink> {
        let port = serialport::new(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| io::Error::new(io_kind(&e), e.to_string()))?;
        Ok(Box::new(SystemLink(port)))
    }
}

fn io_kind(err: &serialport::Error) -> io::ErrorKind {
    match err.kind() {
        serialport::ErrorKind::NoDevice => io::ErrorKind::NotFound,
        serialport::ErrorKind::Io(kind) => kind,
        _ => io::ErrorKind::Other,
    }
}

fn port_info_from(info: serialport::SerialPortInfo) -> PortInfo {
    let (description, hwid) = match &info.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let description = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_default();
            let hwid = format!(
                "USB VID:PID={:04X}:{:04X} SER={}",
                usb.vid,
                usb.pid,
                usb.serial_number.as_deref().unwrap_or("")
            );
            (description, hwid)
        }
        serialport::SerialPortType::PciPort => ("PCI serial".to_string(), String::new()),
        serialport::SerialPortType::BluetoothPort => ("Bluetooth serial".to_string(), String::new()),
        _ => (String::new(), String::new()),
    };
    PortInfo {
        device: info.port_name,
        description,
        hwid,
    }
}

struct SystemLink(Box<dyn serialport::SerialPort>);

impl Write for SystemLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
