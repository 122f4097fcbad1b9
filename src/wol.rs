//! Wake-on-LAN
//!
//! Hosts with a configured MAC address can be turned on by broadcasting a
//! magic packet: six `0xFF` bytes followed by the MAC repeated sixteen times.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{PollerError, Result};

/// Default WOL port (discard protocol)
pub const DEFAULT_WOL_PORT: u16 = 9;

/// Default broadcast address
pub const DEFAULT_BROADCAST_ADDRESS: &str = "255.255.255.255";

/// A 6-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Build the 102-byte magic packet for this address
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFF; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }

    /// Broadcast the magic packet
    pub async fn wake(&self, broadcast_address: &str, port: u16) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| PollerError::Wol(format!("Failed to create UDP socket: {}", e)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| PollerError::Wol(format!("Failed to enable broadcast: {}", e)))?;
        socket
            .send_to(&self.magic_packet(), (broadcast_address, port))
            .await
            .map_err(|e| PollerError::Wol(format!("Failed to send magic packet: {}", e)))?;

        debug!("Sent magic packet to {} via {}:{}", self, broadcast_address, port);
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = PollerError;

    /// Parses `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        let separator = if trimmed.contains(':') {
            ':'
        } else if trimmed.contains('-') {
            '-'
        } else {
            return Err(PollerError::config(format!(
                "MAC address '{}' must use ':' or '-' as separator",
                trimmed
            )));
        };

        let parts: Vec<&str> = trimmed.split(separator).collect();
        if parts.len() != 6 {
            return Err(PollerError::config(format!(
                "MAC address must have 6 octets, found {}",
                parts.len()
            )));
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(PollerError::config(format!(
                    "MAC octet '{}' must be 2 hex digits",
                    part
                )));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| PollerError::config(format!("Invalid MAC octet: '{}'", part)))?;
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddress {
    type Error = PollerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
