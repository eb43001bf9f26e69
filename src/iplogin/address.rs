//! Fixed-width address encoding and client address resolution.
//!
//! IPv4 and IPv6 addresses share one total order: IPv4 is encoded as an
//! IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) and the resulting 128 bits are
//! compared as an unsigned integer. The same 16 bytes, big endian, are what the
//! database stores, so `bytea` comparison and in-memory comparison agree.

use axum::http::HeaderMap;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// A client address normalized for range comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressKey(u128);

impl AddressKey {
    #[must_use]
    pub fn from_ip(ip: IpAddr) -> Self {
        let v6 = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self(u128::from(v6))
    }

    /// Parse a textual address. Returns `None` for anything that is not a
    /// plain IPv4 or IPv6 literal.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<IpAddr>().ok().map(Self::from_ip)
    }

    /// Decode a stored address: 16 bytes, or 4 bytes for legacy IPv4 rows.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Some(Self(u128::from_be_bytes(raw)))
            }
            4 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                Some(Self::from_ip(IpAddr::from(raw)))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// The address in its natural form (IPv4-mapped addresses become IPv4).
    #[must_use]
    pub fn to_ip(self) -> IpAddr {
        let v6 = Ipv6Addr::from(self.0);
        v6.to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4)
    }
}

impl From<IpAddr> for AddressKey {
    fn from(ip: IpAddr) -> Self {
        Self::from_ip(ip)
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ip())
    }
}

/// Resolve the client address of a request.
///
/// Proxy headers are only honored when `trust_forwarded` is set; otherwise the
/// socket peer address is used. Returns `None` when nothing parses.
#[must_use]
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> Option<AddressKey> {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(value) = forwarded {
            return AddressKey::parse(value);
        }
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(value) = real_ip {
            return AddressKey::parse(value);
        }
    }
    peer.map(|addr| AddressKey::from_ip(addr.ip()))
}
