//! Textual IP address to tagged byte encoding

use std::net::{AddrParseError, IpAddr};

use crate::models::AddressFamily;

/// Width of the binary address columns; IPv4 values are zero padded to it
pub const STORED_ADDRESS_LEN: usize = 16;

/// An address in network byte order, tagged with its family.
///
/// The variant fixes the byte length, so family and length cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodedAddress {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl EncodedAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            EncodedAddress::V4(_) => AddressFamily::V4,
            EncodedAddress::V6(_) => AddressFamily::V6,
        }
    }

    /// Big-endian bytes, 4 for IPv4 and 16 for IPv6
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EncodedAddress::V4(octets) => octets,
            EncodedAddress::V6(octets) => octets,
        }
    }

    /// Bytes as stored in the 16 byte columns: IPv4 octets followed by zeros.
    ///
    /// Padding on the right keeps byte-wise ordering within a family identical
    /// to numeric address ordering.
    pub fn padded(&self) -> [u8; STORED_ADDRESS_LEN] {
        let mut out = [0u8; STORED_ADDRESS_LEN];
        let bytes = self.as_bytes();
        out[..bytes.len()].copy_from_slice(bytes);
        out
    }
}

/// Parse a textual IPv4 or IPv6 literal.
///
/// Anything else, including the empty string, fails with the parse error;
/// there is no zero or empty fallback value.
pub fn parse_address(address: &str) -> Result<EncodedAddress, AddrParseError> {
    let ip: IpAddr = address.parse()?;
    Ok(match ip {
        IpAddr::V4(v4) => EncodedAddress::V4(v4.octets()),
        IpAddr::V6(v6) => EncodedAddress::V6(v6.octets()),
    })
}
