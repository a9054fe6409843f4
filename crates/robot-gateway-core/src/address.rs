//! Robot network address.

use std::{fmt, net::Ipv4Addr, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Address parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid robot address: {input:?}")]
pub struct AddressError {
    /// The rejected input.
    pub input: String,
}

/// IPv4 address of a robot.
///
/// Parsing accepts exactly four dot-separated groups of one to three ASCII
/// digits, each in `0..=255`. Leading zeros are allowed (`192.168.001.010`),
/// which `Ipv4Addr::from_str` would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RobotAddress(Ipv4Addr);

impl RobotAddress {
    /// Parse a dotted-quad address.
    ///
    /// # Errors
    /// Returns error if the input is not a well-formed dotted quad.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError {
            input: input.to_string(),
        };

        let mut octets = [0u8; 4];
        let mut groups = input.split('.');
        for octet in &mut octets {
            let group = groups.next().ok_or_else(invalid)?;
            if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *octet = group.parse::<u8>().map_err(|_| invalid())?;
        }
        if groups.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(Ipv4Addr::from(octets)))
    }

    /// The underlying IPv4 address.
    #[must_use]
    pub const fn ip(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for RobotAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip)
    }
}

impl FromStr for RobotAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RobotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for RobotAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RobotAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
