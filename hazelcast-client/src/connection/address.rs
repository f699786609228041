//! Member addresses and their resolution.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use hazelcast_core::protocol::codecs::client::WireAddress;
use hazelcast_core::{HazelcastError, Result};

/// Ports tried, in order, for an address configured without one.
pub const DEFAULT_PORTS: [u16; 3] = [5701, 5702, 5703];

/// A host and port, possibly unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    /// Creates an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host part.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parses a configured address into its candidates.
    ///
    /// `host:port` yields one address; a bare host yields one address per
    /// entry of [`DEFAULT_PORTS`]. IPv6 literals with a port use brackets.
    pub fn parse_candidates(input: &str) -> Result<Vec<Address>> {
        let input = input.trim();
        if input.is_empty() {
            return Err(HazelcastError::Configuration(
                "address must not be empty".to_string(),
            ));
        }

        if let Ok(socket) = input.parse::<SocketAddr>() {
            return Ok(vec![Address::from(socket)]);
        }

        let (host, port) = match input.strip_prefix('[') {
            Some(rest) => {
                let (host, tail) = rest.split_once(']').ok_or_else(|| {
                    HazelcastError::Configuration(format!("unterminated IPv6 literal: {input}"))
                })?;
                (host, tail.strip_prefix(':'))
            }
            None if input.matches(':').count() > 1 => (input, None),
            None => match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            },
        };

        if host.is_empty() {
            return Err(HazelcastError::Configuration(format!(
                "address has no host: {input}"
            )));
        }

        match port {
            Some(port) => {
                let port = port.parse::<u16>().map_err(|_| {
                    HazelcastError::Configuration(format!("invalid port in address: {input}"))
                })?;
                Ok(vec![Address::new(host, port)])
            }
            None => Ok(DEFAULT_PORTS
                .iter()
                .map(|port| Address::new(host, *port))
                .collect()),
        }
    }

    /// Converts an address received from a member.
    pub fn from_wire(address: &WireAddress) -> Result<Self> {
        let port = u16::try_from(address.port).map_err(|_| {
            HazelcastError::Protocol(format!("member reported invalid port {}", address.port))
        })?;
        Ok(Self::new(address.host.clone(), port))
    }

    /// Converts into the wire representation.
    pub fn to_wire(&self) -> WireAddress {
        WireAddress::new(self.host.clone(), i32::from(self.port))
    }

    /// Resolves the host, preserving resolver order.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let resolved: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| HazelcastError::Connection(format!("cannot resolve {self}: {e}")))?
            .collect();
        if resolved.is_empty() {
            return Err(HazelcastError::Connection(format!(
                "{self} resolved to no addresses"
            )));
        }
        Ok(resolved)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(socket: SocketAddr) -> Self {
        Self::new(socket.ip().to_string(), socket.port())
    }
}

impl FromStr for Address {
    type Err = HazelcastError;

    /// Parses `host:port`. Use [`Address::parse_candidates`] for bare hosts.
    fn from_str(s: &str) -> Result<Self> {
        let mut candidates = Self::parse_candidates(s)?;
        if candidates.len() != 1 {
            return Err(HazelcastError::Configuration(format!(
                "address needs an explicit port: {s}"
            )));
        }
        Ok(candidates.remove(0))
    }
}
