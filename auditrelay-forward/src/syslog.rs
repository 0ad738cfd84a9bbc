//! Fire-and-forget UDP delivery to a syslog collector.
//!
//! One datagram per event, payload sent verbatim: no framing, no
//! acknowledgment, no retry. A failed send is the caller's to log; it never
//! poisons the handle.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use auditrelay_core::config::SyslogTarget;

use crate::error::ForwardError;

/// Where the cycle controller pushes payloads.
pub trait DatagramSink {
    /// Transmit one message. Errors are per-message and non-fatal.
    fn send(&mut self, payload: &str) -> io::Result<()>;

    /// Release the underlying resource. Safe to call more than once.
    fn close(&mut self);
}

/// Opens [`SyslogHandle`]s to one configured collector.
#[derive(Debug, Clone)]
pub struct SyslogForwarder {
    host: String,
    port: u16,
}

impl SyslogForwarder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the collector and bind a connectionless socket of the same
    /// address family.
    pub fn open(&self) -> Result<SyslogHandle, ForwardError> {
        let init_err = |source| ForwardError::TransportInit {
            destination: self.destination(),
            source,
        };

        let target = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(init_err)?
            .next()
            .ok_or_else(|| {
                init_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "destination resolved to no addresses",
                ))
            })?;

        let bind: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).map_err(init_err)?;

        tracing::debug!("syslog transport open to {target}");
        Ok(SyslogHandle {
            socket: Some(socket),
            target,
        })
    }
}

impl From<&SyslogTarget> for SyslogForwarder {
    fn from(target: &SyslogTarget) -> Self {
        Self::new(target.host.clone(), target.port)
    }
}

/// An open UDP socket aimed at the collector. Closed on drop.
#[derive(Debug)]
pub struct SyslogHandle {
    socket: Option<UdpSocket>,
    target: SocketAddr,
}

impl SyslogHandle {
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

impl DatagramSink for SyslogHandle {
    fn send(&mut self, payload: &str) -> io::Result<()> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "syslog handle already closed",
            ));
        };
        let sent = socket.send_to(payload.as_bytes(), self.target)?;
        if sent < payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: {sent} of {} bytes", payload.len()),
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!("syslog transport to {} closed", self.target);
        }
    }
}

impl Drop for SyslogHandle {
    fn drop(&mut self) {
        self.close();
    }
}
