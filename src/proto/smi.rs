//! SMIv2 object names and value syntaxes

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Object identifier.
///
/// Ordering is lexicographic over sub-identifiers, which is exactly the
/// MIB tree ordering used by GETNEXT/GETBULK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid {
    components: Vec<u32>,
}

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    pub fn from_slice(components: &[u32]) -> Self {
        Self {
            components: components.to_vec(),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let components: std::result::Result<Vec<u32>, _> = s
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>())
            .collect();

        match components {
            Ok(comps) if !comps.is_empty() => Ok(Self::new(comps)),
            _ => Err(Error::parse(format!("invalid OID: {}", s))),
        }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// New OID with `component` appended.
    pub fn child(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self::new(components)
    }

    /// New OID with all of `suffix` appended.
    pub fn extend(&self, suffix: &[u32]) -> Self {
        let mut components = self.components.clone();
        components.extend_from_slice(suffix);
        Self::new(components)
    }

    /// True if `self` is `prefix` or lies below it in the tree.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }

    pub fn cmp_lexicographic(&self, other: &Oid) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Oid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Oid::parse(&s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> String {
        oid.to_string()
    }
}

impl From<&[u32]> for Oid {
    fn from(components: &[u32]) -> Self {
        Oid::from_slice(components)
    }
}

/// SMIv2 value syntaxes, including the SNMPv2 exception markers that
/// travel in place of a value (RFC 3416 §4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i32),
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    pub fn is_end_of_mib_view(&self) -> bool {
        matches!(self, Value::EndOfMibView)
    }

    /// Exists only in SNMPv2; a v1 response may not carry it (RFC 2576).
    pub fn is_counter64(&self) -> bool {
        matches!(self, Value::Counter64(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "INTEGER: {}", v),
            Value::OctetString(v) => match std::str::from_utf8(v) {
                Ok(s) => write!(f, "STRING: {}", s),
                Err(_) => write!(f, "HEX-STRING: {}", hex::encode(v)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "OID: {}", oid),
            Value::IpAddress(a) => write!(f, "IpAddress: {}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) => write!(f, "Counter32: {}", v),
            Value::Gauge32(v) => write!(f, "Gauge32: {}", v),
            Value::TimeTicks(v) => write!(f, "Timeticks: ({})", v),
            Value::Opaque(v) => write!(f, "Opaque: {}", hex::encode(v)),
            Value::Counter64(v) => write!(f, "Counter64: {}", v),
            Value::NoSuchObject => write!(f, "No Such Object available on this agent at this OID"),
            Value::NoSuchInstance => write!(f, "No Such Instance currently exists at this OID"),
            Value::EndOfMibView => write!(f, "No more variables left in this MIB View"),
        }
    }
}

/// (name, value) pair inside a PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub name: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(name: Oid, value: Value) -> Self {
        Self { name, value }
    }

    pub fn null(name: Oid) -> Self {
        Self {
            name,
            value: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_parse() {
        let oid = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
        assert_eq!(oid.components(), &[1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.1.0");
        assert!(Oid::parse("").is_err());
        assert!(Oid::parse("1.3.x").is_err());
    }

    #[test]
    fn test_oid_tree_ordering() {
        let a = Oid::parse("1.3.6.1.2.1.1.1").unwrap();
        let b = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
        let c = Oid::parse("1.3.6.1.2.1.1.2").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(b.starts_with(&a));
        assert!(!c.starts_with(&a));
        assert!(a.starts_with(&a));
    }

    #[test]
    fn test_oid_child_extend() {
        let base = Oid::parse("1.3.6.1").unwrap();
        assert_eq!(base.child(2).to_string(), "1.3.6.1.2");
        assert_eq!(base.extend(&[2, 1]).to_string(), "1.3.6.1.2.1");
    }

    #[test]
    fn test_value_exceptions() {
        assert!(Value::EndOfMibView.is_exception());
        assert!(Value::NoSuchObject.is_exception());
        assert!(!Value::Null.is_exception());
        assert!(Value::Counter64(1).is_counter64());
    }
}
