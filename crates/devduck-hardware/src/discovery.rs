//! Port discovery: explicit override, then fingerprint match, then fallback path.

use crate::config::HardwareConfig;
use crate::error::{HardwareError, HardwareResult};
use crate::port::{PortBackend, PortInfo};
use tracing::{debug, warn};

/// Where a discovered port came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Override,
    Fingerprint,
    Fallback,
}

/// True if any fingerprint is a case-insensitive substring of the port's
/// description, hardware id or device path.
pub fn matches_fingerprint(info: &PortInfo, fingerprints: &[String]) -> bool {
    let description = info.description.to_lowercase();
    let hwid = info.hwid.to_lowercase();
    let device = info.device.to_lowercase();
    fingerprints.iter().any(|fp| {
        let fp = fp.to_lowercase();
        !fp.is_empty() && (description.contains(&fp) || hwid.contains(&fp) || device.contains(&fp))
    })
}

/// Resolve the duck's port. First match wins.
pub fn discover_port(
    config: &HardwareConfig,
    backend: &dyn PortBackend,
) -> HardwareResult<(String, PortSource)> {
    if let Some(port) = config.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return Ok((port.to_string(), PortSource::Override));
    }

    match backend.list_ports() {
        Ok(ports) => {
            debug!(target: "devduck::hardware", count = ports.len(), "enumerated serial ports");
            if let Some(found) = ports
                .iter()
                .find(|p| matches_fingerprint(p, &config.fingerprints))
            {
                return Ok((found.device.clone(), PortSource::Fingerprint));
            }
        }
        Err(e) => {
            warn!(target: "devduck::hardware", error = %e, "serial port enumeration failed");
        }
    }

    if let Some(fallback) = config.fallback_port.as_deref() {
        if backend.exists(fallback) {
            return Ok((fallback.to_string(), PortSource::Fallback));
        }
    }

    Err(HardwareError::Discovery(format!(
        "no port matched {:?} and no fallback device present",
        config.fingerprints
    )))
}
