//! Wire message envelopes for the three protocol versions

use super::pdu::{Pdu, SnmpPdu};
use super::SecurityModel;

/// SNMPv1 (version field 0) or SNMPv2c (version field 1) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityMessage {
    /// Raw wire version: 0 = v1, 1 = v2c
    pub version: u32,
    pub community: Vec<u8>,
    pub pdu: SnmpPdu,
}

/// SNMPv3 msgGlobalData (RFC 3412 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderData {
    pub msg_id: u32,
    pub msg_max_size: u32,
    pub msg_flags: u8,
    pub security_model: u32,
}

pub const MSG_FLAG_AUTH: u8 = 0x01;
pub const MSG_FLAG_PRIV: u8 = 0x02;
pub const MSG_FLAG_REPORTABLE: u8 = 0x04;

/// Smallest msgMaxSize any engine must accept (RFC 3411 §3.1.3).
pub const MIN_MSG_MAX_SIZE: u32 = 484;

impl HeaderData {
    pub fn is_authenticated(&self) -> bool {
        self.msg_flags & MSG_FLAG_AUTH != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.msg_flags & MSG_FLAG_PRIV != 0
    }

    pub fn is_reportable(&self) -> bool {
        self.msg_flags & MSG_FLAG_REPORTABLE != 0
    }

    pub fn security_model(&self) -> Option<SecurityModel> {
        SecurityModel::from_u32(self.security_model)
    }
}

/// Scoped PDU: the v3 envelope naming the context the PDU operates in
/// (RFC 3412 §6.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPdu {
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub pdu: Pdu,
}

/// Plaintext scoped PDU, or the encrypted octets before the security
/// model has processed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedPduData {
    Plaintext(ScopedPdu),
    Encrypted(Vec<u8>),
}

/// A whole SNMPv3 message. `security_params` holds the raw octets of
/// msgSecurityParameters; their interpretation belongs to the security
/// model selected by the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Message {
    pub header: HeaderData,
    pub security_params: Vec<u8>,
    pub data: ScopedPduData,
}

impl V3Message {
    pub fn scoped_pdu(&self) -> Option<&ScopedPdu> {
        match &self.data {
            ScopedPduData::Plaintext(scoped) => Some(scoped),
            ScopedPduData::Encrypted(_) => None,
        }
    }
}

/// USM security parameters (RFC 3414 §2.4), decoded from the octets in
/// `V3Message::security_params`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub authoritative_engine_id: Vec<u8>,
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
    pub user_name: Vec<u8>,
    pub auth_params: Vec<u8>,
    pub priv_params: Vec<u8>,
}

/// Any decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpMessage {
    Community(CommunityMessage),
    V3(Box<V3Message>),
}
