//! Message processing for SNMPv1 (model 0) and SNMPv2c (model 1)

use std::sync::Arc;

use tracing::debug;

use super::proxy;
use super::{InboundMessage, InboundOutcome, MAX_MSG_SIZE};
use crate::codec;
use crate::core::EngineIdentity;
use crate::error::ErrorIndication;
use crate::proto::{
    CommunityMessage, MessageProcessingModel, Pdu, PduType, SecurityLevel, SecurityModel, SnmpPdu,
    TrapV1Pdu,
};
use crate::security::CommunityStore;
use crate::{Error, Result};

/// The shared v1/v2c model: community resolution via the community
/// table, plus RFC 2576 translation at the version boundary.
pub struct CommunityMessageProcessor {
    identity: Arc<EngineIdentity>,
    communities: Arc<CommunityStore>,
}

impl CommunityMessageProcessor {
    pub fn new(identity: Arc<EngineIdentity>, communities: Arc<CommunityStore>) -> Self {
        Self {
            identity,
            communities,
        }
    }

    fn wire_version(mp_model: MessageProcessingModel) -> u32 {
        match mp_model {
            MessageProcessingModel::V1 => 0,
            _ => 1,
        }
    }

    /// RFC 3412 §4.2.1 for community messages.
    pub fn prepare_data_elements(&self, msg: CommunityMessage) -> InboundOutcome {
        let entry = match self.communities.resolve(&msg.community) {
            Some(entry) => entry.clone(),
            None => {
                debug!(
                    community = %String::from_utf8_lossy(&msg.community),
                    "unknown community name"
                );
                return InboundOutcome::Dropped(ErrorIndication::UnknownCommunityName);
            }
        };

        let (mp_model, security_model) = if msg.version == 0 {
            (MessageProcessingModel::V1, SecurityModel::V1)
        } else {
            (MessageProcessingModel::V2c, SecurityModel::V2c)
        };

        let (pdu, orig_v1_pdu) = match msg.pdu {
            SnmpPdu::Generic(pdu) => {
                if mp_model == MessageProcessingModel::V1
                    && pdu.pdu_type == PduType::GetBulkRequest
                {
                    // GETBULK does not exist in SNMPv1
                    return InboundOutcome::Dropped(ErrorIndication::UnknownPduHandler);
                }
                let orig = (mp_model == MessageProcessingModel::V1).then(|| pdu.clone());
                (pdu, orig)
            }
            SnmpPdu::TrapV1(trap) => (proxy::v1_trap_to_v2(&trap), None),
        };

        InboundOutcome::Message(Box::new(InboundMessage {
            mp_model,
            security_model,
            security_name: entry.security_name,
            security_level: SecurityLevel::NoAuthNoPriv,
            context_engine_id: self.identity.engine_id().to_vec(),
            context_name: entry.context_name.into_bytes(),
            pdu,
            orig_v1_pdu,
            msg_id: None,
            max_size_response: MAX_MSG_SIZE,
            reportable: false,
        }))
    }

    /// RFC 3412 §4.1.1: requests and notifications leaving this engine.
    pub fn prepare_outgoing_message(
        &self,
        mp_model: MessageProcessingModel,
        security_name: &str,
        pdu: &Pdu,
    ) -> Result<Vec<u8>> {
        let entry = self.communities.community_for(security_name).ok_or_else(|| {
            Error::security(format!("no community maps to securityName {}", security_name))
        })?;

        let wire_pdu = if mp_model == MessageProcessingModel::V1 {
            match pdu.pdu_type {
                PduType::TrapV2 => {
                    SnmpPdu::TrapV1(self.downgrade_trap(pdu)?)
                }
                PduType::GetBulkRequest => {
                    return Err(Error::not_supported("GETBULK cannot be sent as SNMPv1"))
                }
                _ => SnmpPdu::Generic(pdu.clone()),
            }
        } else {
            SnmpPdu::Generic(pdu.clone())
        };

        codec::encode_community_message(&CommunityMessage {
            version: Self::wire_version(mp_model),
            community: entry.community.clone().into_bytes(),
            pdu: wire_pdu,
        })
    }

    /// RFC 3412 §4.1.2: the response path, fed from cached request
    /// state. v1 responses are downgraded per RFC 2576.
    pub fn prepare_response_message(
        &self,
        mp_model: MessageProcessingModel,
        security_name: &str,
        response: &Pdu,
        orig_v1_pdu: Option<&Pdu>,
    ) -> Result<Vec<u8>> {
        let entry = self.communities.community_for(security_name).ok_or_else(|| {
            Error::security(format!("no community maps to securityName {}", security_name))
        })?;

        let wire_pdu = if mp_model == MessageProcessingModel::V1 {
            proxy::v2_to_v1_response(response, orig_v1_pdu)
        } else {
            response.clone()
        };

        codec::encode_community_message(&CommunityMessage {
            version: Self::wire_version(mp_model),
            community: entry.community.clone().into_bytes(),
            pdu: SnmpPdu::Generic(wire_pdu),
        })
    }

    fn downgrade_trap(&self, pdu: &Pdu) -> Result<TrapV1Pdu> {
        // agent-addr is advisory in a v1 trap; 0.0.0.0 when the engine
        // is not bound to a single interface
        proxy::v2_trap_to_v1(pdu, [0, 0, 0, 0])
    }
}
