//! Security models: community-based (SNMPv1/v2c) and user-based (USM)

pub mod community;
pub mod crypto;
pub mod usm;

pub use community::{CommunityEntry, CommunityStore};
pub use crypto::{AuthProtocol, PrivProtocol};
pub use usm::{UsmSecurityModel, UsmStats, UsmUserEntry, UsmVerified};

use crate::error::ErrorIndication;
use crate::proto::{Oid, Value};

/// Status information handed up from the security layer: the error
/// indication plus, when a Report PDU should be generated, the counter
/// VarBind that Report must carry (RFC 3412 §4.1.2).
#[derive(Debug, Clone)]
pub struct StatusInformation {
    pub error_indication: ErrorIndication,
    pub oid: Option<Oid>,
    pub value: Option<Value>,
}

impl StatusInformation {
    pub fn new(error_indication: ErrorIndication) -> Self {
        Self {
            error_indication,
            oid: None,
            value: None,
        }
    }

    pub fn with_report(error_indication: ErrorIndication, oid: Oid, value: Value) -> Self {
        Self {
            error_indication,
            oid: Some(oid),
            value: Some(value),
        }
    }

    pub fn wants_report(&self) -> bool {
        self.oid.is_some()
    }
}
