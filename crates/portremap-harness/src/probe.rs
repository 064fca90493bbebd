//! The bind probe run as the child process of every end-to-end case.
//!
//! The probe binds a TCP listener through the standard library, so the call
//! reaches libc's `bind` (and any preloaded replacement) exactly as a server's
//! would, then reports what the kernel actually assigned.

use std::net::{IpAddr, SocketAddr, TcpListener};

use serde::{Deserialize, Serialize};

/// What one probe observed. Printed as a single JSON line on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub requested: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.bound.is_some()
    }
}

/// Binds `host:port` and reports the port the listener ended up on.
///
/// The listener is dropped before returning; the probe only cares where the
/// kernel put it.
#[must_use]
pub fn probe_bind(host: IpAddr, port: u16) -> ProbeReport {
    let result = TcpListener::bind(SocketAddr::new(host, port)).and_then(|l| l.local_addr());
    match result {
        Ok(local) => ProbeReport {
            requested: port,
            bound: Some(local.port()),
            errno: None,
            error: None,
        },
        Err(err) => ProbeReport {
            requested: port,
            bound: None,
            errno: err.raw_os_error(),
            error: Some(err.to_string()),
        },
    }
}

/// Reports a port the kernel currently considers free on `host`.
pub fn free_port(host: IpAddr) -> std::io::Result<u16> {
    Ok(TcpListener::bind(SocketAddr::new(host, 0))?
        .local_addr()?
        .port())
}
