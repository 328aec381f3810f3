//! Entry and host identities.

use crate::{Error, FarmPath, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::debug;

/// Node name of the farm-wide shared entry.
pub const COMMON_NODE: &str = "common";

/// Which record of a farm an entry watcher owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryIdentity {
    /// The host's own record, keyed by its address. Ephemeral.
    Private(String),
    /// The shared `common` record. Persistent.
    Common,
}

impl EntryIdentity {
    /// Creates a private identity for the given node name.
    pub fn private(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name == COMMON_NODE || name.is_empty() || name.contains('/') {
            return Err(Error::InvalidNodeName(name));
        }
        Ok(Self::Private(name))
    }

    /// Name of the node below the farm path.
    #[must_use]
    pub fn node_name(&self) -> &str {
        match self {
            Self::Private(name) => name,
            Self::Common => COMMON_NODE,
        }
    }

    /// Full path of the entry's node in the given farm.
    pub fn node_path(&self, farm: &FarmPath) -> Result<String> {
        farm.child(self.node_name())
    }

    /// Whether the remote record lives only as long as the owning session.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Whether payloads carry the host name of the owning host.
    #[must_use]
    pub fn injects_hostname(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    #[must_use]
    pub fn is_common(&self) -> bool {
        matches!(self, Self::Common)
    }
}

impl fmt::Display for EntryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_name())
    }
}

/// Identity of the running host, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Address naming the host's private node.
    pub address: String,
    /// Host name injected into private payloads.
    pub hostname: String,
}

impl HostIdentity {
    /// Creates an identity from explicit values.
    pub fn new(address: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            hostname: hostname.into(),
        }
    }

    /// Resolves the identity of this host, applying any overrides.
    ///
    /// The address is the source address of the primary outbound IPv4 route.
    /// No packet is sent: connecting a UDP socket only selects the route.
    pub fn resolve(address: Option<&str>, hostname: Option<&str>) -> Self {
        let address = address
            .map(str::to_string)
            .unwrap_or_else(|| outbound_address().to_string());
        let hostname = hostname.map(str::to_string).unwrap_or_else(local_hostname);
        debug!(%address, %hostname, "Resolved host identity");
        Self { address, hostname }
    }

    /// The private entry identity of this host.
    pub fn private_entry(&self) -> Result<EntryIdentity> {
        EntryIdentity::private(self.address.clone())
    }
}

fn outbound_address() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
