//! SNMP protocol data model: SMI values, PDUs and message envelopes

use serde::{Deserialize, Serialize};

pub mod msg;
pub mod oids;
pub mod pdu;
pub mod smi;

pub use msg::{
    CommunityMessage, HeaderData, ScopedPdu, ScopedPduData, SnmpMessage, UsmSecurityParams,
    V3Message,
};
pub use pdu::{ErrorStatus, Pdu, PduType, SnmpPdu, TrapV1Pdu};
pub use smi::{Oid, Value, VarBind};

/// Message processing model numbers (RFC 3411).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageProcessingModel {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2c")]
    V2c,
    #[serde(rename = "v3")]
    V3,
}

impl MessageProcessingModel {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
            Self::V3 => 3,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            3 => Some(Self::V3),
            _ => None,
        }
    }
}

/// Security model numbers (RFC 3411).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityModel {
    /// SNMPv1 community model
    #[serde(rename = "v1")]
    V1,
    /// SNMPv2c community model
    #[serde(rename = "v2c")]
    V2c,
    /// User-based security model (RFC 3414)
    #[serde(rename = "usm")]
    Usm,
}

impl SecurityModel {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2c => 2,
            Self::Usm => 3,
        }
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::V1),
            2 => Some(Self::V2c),
            3 => Some(Self::Usm),
            _ => None,
        }
    }
}

/// Security level; the ordering reflects the RFC 3411 lattice
/// (noAuthNoPriv < authNoPriv < authPriv).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    #[serde(rename = "noAuthNoPriv")]
    NoAuthNoPriv,
    #[serde(rename = "authNoPriv")]
    AuthNoPriv,
    #[serde(rename = "authPriv")]
    AuthPriv,
}

impl SecurityLevel {
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::NoAuthNoPriv)
    }

    pub fn requires_priv(&self) -> bool {
        matches!(self, Self::AuthPriv)
    }

    /// Level as encoded in v3 msgFlags (auth bit 0x01, priv bit 0x02).
    pub fn flag_bits(&self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    pub fn from_flag_bits(flags: u8) -> Option<Self> {
        match flags & 0x03 {
            0x00 => Some(Self::NoAuthNoPriv),
            0x01 => Some(Self::AuthNoPriv),
            0x03 => Some(Self::AuthPriv),
            _ => None, // priv without auth is invalid
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthNoPriv => write!(f, "noAuthNoPriv"),
            Self::AuthNoPriv => write!(f, "authNoPriv"),
            Self::AuthPriv => write!(f, "authPriv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_level_ordering() {
        assert!(SecurityLevel::NoAuthNoPriv < SecurityLevel::AuthNoPriv);
        assert!(SecurityLevel::AuthNoPriv < SecurityLevel::AuthPriv);
    }

    #[test]
    fn test_flag_bits_roundtrip() {
        for level in [
            SecurityLevel::NoAuthNoPriv,
            SecurityLevel::AuthNoPriv,
            SecurityLevel::AuthPriv,
        ] {
            assert_eq!(SecurityLevel::from_flag_bits(level.flag_bits()), Some(level));
        }
        // priv-without-auth is rejected
        assert_eq!(SecurityLevel::from_flag_bits(0x02), None);
    }

    #[test]
    fn test_model_numbers() {
        assert_eq!(MessageProcessingModel::from_u32(3), Some(MessageProcessingModel::V3));
        assert_eq!(MessageProcessingModel::from_u32(2), None);
        assert_eq!(SecurityModel::Usm.as_u32(), 3);
    }
}
