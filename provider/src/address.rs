//! Object addresses: `<type>.<name>` for managed resources and
//! `data.<type>.<name>` for data sources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Diagnostic, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    Managed,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub mode: Mode,
    pub type_name: String,
    pub name: String,
}

impl Address {
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: Mode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: Mode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.mode == Mode::Data
    }
}

/// Letters, digits, `_` and `-`, starting with a letter or `_`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode == Mode::Data {
            f.write_str("data.")?;
        }
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let address = match parts.as_slice() {
            ["data", type_name, name] => Address::data(*type_name, *name),
            [type_name, name] if *type_name != "data" => Address::managed(*type_name, *name),
            _ => return Err(invalid_address(s)),
        };
        if !is_valid_name(&address.type_name) || !is_valid_name(&address.name) {
            return Err(invalid_address(s));
        }
        Ok(address)
    }
}

fn invalid_address(s: &str) -> Error {
    Error::invalid(Diagnostic::error(
        "Invalid address",
        format!(
            "{:?} is not of the form <type>.<name> or data.<type>.<name>",
            s
        ),
    ))
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_managed_and_data_addresses() {
        let addr: Address = "pomeriumzero_route.app".parse().unwrap();
        assert_eq!(addr, Address::managed("pomeriumzero_route", "app"));
        assert_eq!(addr.to_string(), "pomeriumzero_route.app");

        let addr: Address = "data.pomeriumzero_cluster.main".parse().unwrap();
        assert!(addr.is_data());
        assert_eq!(addr.to_string(), "data.pomeriumzero_cluster.main");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "route", "a.b.c", "data.x", "1abc.name", "t.na me"] {
            assert!(bad.parse::<Address>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn serializes_as_a_plain_string() {
        let addr = Address::data("pomeriumzero_policy", "p");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"data.pomeriumzero_policy.p\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
