//! Message processing models: per-version codecs between scoped PDUs
//! and whole-message octets (RFC 3412 §4)

pub mod community;
pub mod proxy;
pub mod v3;

pub use community::CommunityMessageProcessor;
pub use v3::V3MessageProcessor;

use crate::error::ErrorIndication;
use crate::proto::{MessageProcessingModel, Pdu, PduType, SecurityLevel, SecurityModel};
use crate::security::StatusInformation;

/// Largest UDP payload the engine will emit.
pub const MAX_MSG_SIZE: u32 = 65507;

/// The data elements a message processing model extracts from one
/// inbound message (RFC 3412 §4.2.1 prepareDataElements).
#[derive(Debug)]
pub struct InboundMessage {
    pub mp_model: MessageProcessingModel,
    pub security_model: SecurityModel,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    /// Always in v2 form; v1 PDUs are translated at ingress.
    pub pdu: Pdu,
    /// The untranslated v1 request, kept so the response can be
    /// downgraded faithfully (RFC 2576).
    pub orig_v1_pdu: Option<Pdu>,
    /// v3 msgID for response correlation; None for community versions.
    pub msg_id: Option<u32>,
    pub max_size_response: u32,
    pub reportable: bool,
}

impl InboundMessage {
    pub fn pdu_type(&self) -> PduType {
        self.pdu.pdu_type
    }
}

/// Result of running one inbound message through its model.
#[derive(Debug)]
pub enum InboundOutcome {
    Message(Box<InboundMessage>),
    /// Security processing failed. `octets` carries a ready Report
    /// message when the inbound message allowed one (reportable flag,
    /// v3 only); the dispatcher sends it and drops the message.
    ReportDue {
        octets: Option<Vec<u8>>,
        status: StatusInformation,
    },
    /// Not deliverable and not reportable; the dispatcher counts it.
    Dropped(ErrorIndication),
}
