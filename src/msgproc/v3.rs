//! Message processing for SNMPv3 (model 3, RFC 3412 §6-§7)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::{InboundMessage, InboundOutcome, MAX_MSG_SIZE};
use crate::codec;
use crate::core::EngineIdentity;
use crate::error::ErrorIndication;
use crate::proto::msg::{MIN_MSG_MAX_SIZE, MSG_FLAG_REPORTABLE};
use crate::proto::{
    HeaderData, MessageProcessingModel, Pdu, PduType, ScopedPdu, ScopedPduData, SecurityLevel,
    SecurityModel, VarBind, V3Message,
};
use crate::security::usm::UsmOutgoing;
use crate::security::{StatusInformation, UsmSecurityModel};
use crate::{Error, Result};

/// The v3 model: frames scoped PDUs, allocates msgIDs and defers
/// security to USM.
pub struct V3MessageProcessor {
    identity: Arc<EngineIdentity>,
    usm: Arc<UsmSecurityModel>,
    next_msg_id: AtomicU32,
}

impl V3MessageProcessor {
    pub fn new(identity: Arc<EngineIdentity>, usm: Arc<UsmSecurityModel>) -> Self {
        Self {
            identity,
            usm,
            next_msg_id: AtomicU32::new(rand::thread_rng().gen_range(1..0x4000_0000)),
        }
    }

    /// Fresh 31-bit msgID; independent of requestID (RFC 3412 §6.2).
    fn alloc_msg_id(&self) -> u32 {
        loop {
            let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff;
            if id != 0 {
                return id;
            }
        }
    }

    /// RFC 3412 §7.1: build an outgoing request or notification.
    /// Returns the octets and the msgID for response correlation.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_outgoing_message(
        &self,
        target_engine_id: &[u8],
        security_name: &str,
        security_level: SecurityLevel,
        context_engine_id: &[u8],
        context_name: &[u8],
        pdu: &Pdu,
        expect_response: bool,
    ) -> Result<(Vec<u8>, u32)> {
        let msg_id = self.alloc_msg_id();
        let mut flags = security_level.flag_bits();
        if expect_response {
            flags |= MSG_FLAG_REPORTABLE;
        }
        let header = HeaderData {
            msg_id,
            msg_max_size: MAX_MSG_SIZE,
            msg_flags: flags,
            security_model: SecurityModel::Usm.as_u32(),
        };

        // the peer is authoritative for requests; use its cached clock
        let (boots, time) = self.usm.peer_times(target_engine_id).unwrap_or((0, 0));

        let scoped = ScopedPdu {
            context_engine_id: if context_engine_id.is_empty() {
                target_engine_id.to_vec()
            } else {
                context_engine_id.to_vec()
            },
            context_name: context_name.to_vec(),
            pdu: pdu.clone(),
        };

        let octets = self.usm.generate_msg(
            header,
            &UsmOutgoing {
                engine_id: target_engine_id,
                engine_boots: boots,
                engine_time: time,
                user_name: security_name,
                security_level,
            },
            &scoped,
        )?;
        Ok((octets, msg_id))
    }

    /// RFC 3412 §7.1 (response branch): this engine is authoritative.
    pub fn prepare_response_message(
        &self,
        msg_id: u32,
        security_name: &str,
        security_level: SecurityLevel,
        context_engine_id: &[u8],
        context_name: &[u8],
        pdu: &Pdu,
    ) -> Result<Vec<u8>> {
        let header = HeaderData {
            msg_id,
            msg_max_size: MAX_MSG_SIZE,
            msg_flags: security_level.flag_bits(),
            security_model: SecurityModel::Usm.as_u32(),
        };
        let scoped = ScopedPdu {
            context_engine_id: context_engine_id.to_vec(),
            context_name: context_name.to_vec(),
            pdu: pdu.clone(),
        };
        self.usm.generate_msg(
            header,
            &UsmOutgoing {
                engine_id: self.identity.engine_id(),
                engine_boots: self.identity.boots(),
                engine_time: self.identity.time(),
                user_name: security_name,
                security_level,
            },
            &scoped,
        )
    }

    /// RFC 3412 §7.2.6: build the Report message for failed security
    /// processing. Returns None when the status carries no counter.
    pub fn prepare_report_message(
        &self,
        inbound: &V3Message,
        status: &StatusInformation,
    ) -> Result<Option<Vec<u8>>> {
        let (oid, value) = match (&status.oid, &status.value) {
            (Some(oid), Some(value)) => (oid.clone(), value.clone()),
            _ => return Ok(None),
        };

        let request_id = match &inbound.data {
            ScopedPduData::Plaintext(scoped) => scoped.pdu.request_id,
            ScopedPduData::Encrypted(_) => 0,
        };
        let report = Pdu::new(PduType::Report, request_id, vec![VarBind::new(oid, value)]);

        // time-sync reports must be authenticated or the peer cannot
        // trust the clock they carry (RFC 3414 §3.2.7a)
        let (level, user_name) = if status.error_indication == ErrorIndication::NotInTimeWindow {
            let user = codec::decode_usm_security_params(&inbound.security_params)
                .map(|p| String::from_utf8_lossy(&p.user_name).into_owned())
                .unwrap_or_default();
            (SecurityLevel::AuthNoPriv, user)
        } else {
            (SecurityLevel::NoAuthNoPriv, String::new())
        };

        let header = HeaderData {
            msg_id: inbound.header.msg_id,
            msg_max_size: MAX_MSG_SIZE,
            msg_flags: level.flag_bits(),
            security_model: SecurityModel::Usm.as_u32(),
        };
        let scoped = ScopedPdu {
            context_engine_id: self.identity.engine_id().to_vec(),
            context_name: Vec::new(),
            pdu: report,
        };
        let octets = self.usm.generate_msg(
            header,
            &UsmOutgoing {
                engine_id: self.identity.engine_id(),
                engine_boots: self.identity.boots(),
                engine_time: self.identity.time(),
                user_name: &user_name,
                security_level: level,
            },
            &scoped,
        )?;
        Ok(Some(octets))
    }

    /// RFC 3412 §7.2: decode and unsecure one inbound v3 message.
    pub fn prepare_data_elements(&self, raw: &[u8], msg: V3Message) -> Result<InboundOutcome> {
        if msg.header.msg_max_size < MIN_MSG_MAX_SIZE {
            return Err(Error::decode(format!(
                "msgMaxSize {} below minimum {}",
                msg.header.msg_max_size, MIN_MSG_MAX_SIZE
            )));
        }
        if msg.header.security_model() != Some(SecurityModel::Usm) {
            debug!(model = msg.header.security_model, "unknown security model");
            return Ok(InboundOutcome::Dropped(ErrorIndication::UnknownSecurityModel));
        }

        let verified = match self.usm.process_incoming(
            raw,
            &msg,
            self.identity.engine_id(),
            self.identity.boots(),
            self.identity.time(),
        )? {
            Ok(verified) => verified,
            Err(status) => {
                let octets = if msg.header.is_reportable() && status.wants_report() {
                    self.prepare_report_message(&msg, &status)?
                } else {
                    None
                };
                return Ok(InboundOutcome::ReportDue { octets, status });
            }
        };

        Ok(InboundOutcome::Message(Box::new(InboundMessage {
            mp_model: MessageProcessingModel::V3,
            security_model: SecurityModel::Usm,
            security_name: verified.security_name,
            security_level: verified.security_level,
            context_engine_id: verified.scoped_pdu.context_engine_id,
            context_name: verified.scoped_pdu.context_name,
            pdu: verified.scoped_pdu.pdu,
            orig_v1_pdu: None,
            msg_id: Some(msg.header.msg_id),
            max_size_response: msg.header.msg_max_size.min(MAX_MSG_SIZE),
            reportable: msg.header.is_reportable(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{oids, Oid, SnmpMessage};
    use crate::security::{AuthProtocol, UsmUserEntry};

    const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x04mpv3";

    fn setup() -> (Arc<EngineIdentity>, Arc<UsmSecurityModel>, V3MessageProcessor) {
        let identity = Arc::new(EngineIdentity::new(ENGINE_ID.to_vec(), 2));
        let usm = Arc::new(UsmSecurityModel::new(vec![
            UsmUserEntry {
                user_name: "usr-none".into(),
                auth_protocol: None,
                auth_password: String::new(),
                priv_protocol: None,
                priv_password: String::new(),
            },
            UsmUserEntry {
                user_name: "usr-md5".into(),
                auth_protocol: Some(AuthProtocol::HmacMd5),
                auth_password: "authkey1".into(),
                priv_protocol: None,
                priv_password: String::new(),
            },
        ]));
        let mp = V3MessageProcessor::new(identity.clone(), usm.clone());
        (identity, usm, mp)
    }

    fn get_pdu() -> Pdu {
        Pdu::new(
            PduType::GetRequest,
            314,
            vec![VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap())],
        )
    }

    #[test]
    fn test_request_response_msg_id_correlation() {
        let (_, usm, mp) = setup();
        usm.note_peer_times(ENGINE_ID, 2, 0);

        let (octets, msg_id) = mp
            .prepare_outgoing_message(
                ENGINE_ID,
                "usr-none",
                SecurityLevel::NoAuthNoPriv,
                b"",
                b"",
                &get_pdu(),
                true,
            )
            .unwrap();
        assert!(msg_id > 0 && msg_id < 0x8000_0000);

        let msg = match codec::decode_message(&octets).unwrap() {
            SnmpMessage::V3(m) => m,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(msg.header.msg_id, msg_id);
        assert!(msg.header.is_reportable());

        match mp.prepare_data_elements(&octets, *msg).unwrap() {
            InboundOutcome::Message(inbound) => {
                assert_eq!(inbound.msg_id, Some(msg_id));
                assert_eq!(inbound.security_name, "usr-none");
                assert_eq!(inbound.context_engine_id, ENGINE_ID);
                assert_eq!(inbound.pdu.request_id, 314);
                assert!(inbound.reportable);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_discovery_elicits_report_with_engine_id() {
        let (_, _, mp) = setup();
        // discovery: empty authoritative engine id, empty user
        let (octets, msg_id) = mp
            .prepare_outgoing_message(
                b"",
                "",
                SecurityLevel::NoAuthNoPriv,
                b"",
                b"",
                &get_pdu(),
                true,
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            SnmpMessage::V3(m) => m,
            other => panic!("unexpected message: {:?}", other),
        };
        let outcome = mp.prepare_data_elements(&octets, *msg).unwrap();
        let report_octets = match outcome {
            InboundOutcome::ReportDue { octets, status } => {
                assert_eq!(status.error_indication, ErrorIndication::UnknownEngineId);
                octets.expect("reportable message must produce a Report")
            }
            other => panic!("unexpected outcome: {:?}", other),
        };

        let report = match codec::decode_message(&report_octets).unwrap() {
            SnmpMessage::V3(m) => m,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(report.header.msg_id, msg_id);
        let params = codec::decode_usm_security_params(&report.security_params).unwrap();
        assert_eq!(params.authoritative_engine_id, ENGINE_ID);
        let scoped = report.scoped_pdu().expect("plaintext report");
        assert_eq!(scoped.pdu.pdu_type, PduType::Report);
        assert_eq!(
            scoped.pdu.var_binds[0].name,
            *oids::USM_STATS_UNKNOWN_ENGINE_IDS
        );
    }

    #[test]
    fn test_small_msg_max_size_is_parse_error() {
        let (_, _, mp) = setup();
        let (octets, _) = mp
            .prepare_outgoing_message(
                ENGINE_ID,
                "usr-none",
                SecurityLevel::NoAuthNoPriv,
                b"",
                b"",
                &get_pdu(),
                false,
            )
            .unwrap();
        let mut msg = match codec::decode_message(&octets).unwrap() {
            SnmpMessage::V3(m) => *m,
            other => panic!("unexpected message: {:?}", other),
        };
        msg.header.msg_max_size = 100;
        assert!(mp.prepare_data_elements(&octets, msg).is_err());
    }

    #[test]
    fn test_response_message_echoes_msg_id() {
        let (_, _, mp) = setup();
        let response = get_pdu().response_to();
        let octets = mp
            .prepare_response_message(
                0x1234,
                "usr-md5",
                SecurityLevel::AuthNoPriv,
                ENGINE_ID,
                b"",
                &response,
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            SnmpMessage::V3(m) => m,
            other => panic!("unexpected message: {:?}", other),
        };
        assert_eq!(msg.header.msg_id, 0x1234);
        assert!(msg.header.is_authenticated());
        assert!(!msg.header.is_reportable());
        let params = codec::decode_usm_security_params(&msg.security_params).unwrap();
        assert_eq!(params.authoritative_engine_id, ENGINE_ID);
        assert_eq!(params.authoritative_engine_boots, 2);
    }
}
