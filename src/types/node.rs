use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A managed machine in a deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: u64,
    pub name: String,
    pub deployment: String,
}

impl Node {
    pub fn new(id: u64, name: impl Into<String>, deployment: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            deployment: deployment.into(),
        }
    }
}

/// Network address with its prefix length. Displays in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl NodeAddress {
    pub fn new(addr: IpAddr, prefix: u8) -> Self {
        Self { addr, prefix }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Address family filter used by `ipaddress(...)` lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressClass {
    #[default]
    All,
    V4Only,
    V6Only,
}

impl AddressClass {
    /// Unknown class names fall back to `All`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "v4_only" => Self::V4Only,
            "v6_only" => Self::V6Only,
            _ => Self::All,
        }
    }

    pub fn admits(&self, addr: &IpAddr) -> bool {
        match self {
            Self::All => true,
            Self::V4Only => addr.is_ipv4(),
            Self::V6Only => addr.is_ipv6(),
        }
    }
}
