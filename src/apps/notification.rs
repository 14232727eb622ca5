//! Notification originator and receiver (RFC 3413 §3.3-§3.4): traps
//! are fire-and-forget, informs ride the generator's retry/ack path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::generator::{CommandGenerator, CommandOutcome};
use crate::access::{VacmTables, ViewType};
use crate::config::TargetEntry;
use crate::core::{
    EngineIdentity, MsgAndPduDispatcher, PduHandler, SendPduParams, StateReference,
};
use crate::msgproc::InboundMessage;
use crate::proto::{oids, Oid, Pdu, PduType, Value, VarBind};
use crate::{Error, Result};

pub struct NotificationOriginator {
    dispatcher: Arc<MsgAndPduDispatcher>,
    generator: Arc<CommandGenerator>,
    identity: Arc<EngineIdentity>,
    vacm: Arc<VacmTables>,
    targets: HashMap<String, TargetEntry>,
}

impl NotificationOriginator {
    pub fn new(
        dispatcher: Arc<MsgAndPduDispatcher>,
        generator: Arc<CommandGenerator>,
        identity: Arc<EngineIdentity>,
        vacm: Arc<VacmTables>,
        targets: Vec<TargetEntry>,
    ) -> Self {
        let targets = targets.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            dispatcher,
            generator,
            identity,
            vacm,
            targets,
        }
    }

    fn target(&self, name: &str) -> Result<&TargetEntry> {
        self.targets
            .get(name)
            .ok_or_else(|| Error::parse(format!("unknown target: {}", name)))
    }

    /// SNMPv2-Trap varbind layout: sysUpTime.0, snmpTrapOID.0, payload.
    fn build_notification(
        &self,
        pdu_type: PduType,
        request_id: i32,
        trap_oid: &Oid,
        var_binds: &[VarBind],
    ) -> Pdu {
        let mut all = Vec::with_capacity(var_binds.len() + 2);
        all.push(VarBind::new(
            oids::SYS_UPTIME.clone(),
            Value::TimeTicks(self.identity.uptime_ticks()),
        ));
        all.push(VarBind::new(
            oids::SNMP_TRAP_OID.clone(),
            Value::ObjectIdentifier(trap_oid.clone()),
        ));
        all.extend(var_binds.iter().cloned());
        Pdu::new(pdu_type, request_id, all)
    }

    /// VACM notify view gate for one destination.
    fn notify_allowed(&self, target: &TargetEntry, trap_oid: &Oid) -> bool {
        if self.vacm.groups.is_empty() {
            return true;
        }
        self.vacm
            .is_access_allowed(
                target.effective_security_model(),
                &target.security_name,
                target.security_level,
                ViewType::Notify,
                "",
                trap_oid,
            )
            .is_ok()
    }

    /// Fire-and-forget trap to one configured target.
    pub async fn send_trap(
        &self,
        target_name: &str,
        trap_oid: &Oid,
        var_binds: &[VarBind],
    ) -> Result<()> {
        let target = self.target(target_name)?.clone();
        if !self.notify_allowed(&target, trap_oid) {
            warn!(target = %target.name, %trap_oid, "notify view denies trap, skipped");
            return Ok(());
        }
        let pdu = self.build_notification(PduType::TrapV2, rand::random::<i32>() & 0x7fff_ffff, trap_oid, var_binds);

        let address = target.socket_addr()?;
        let domain = if address.is_ipv6() {
            oids::TRANSPORT_UDP_IPV6.clone()
        } else {
            oids::TRANSPORT_UDP_IPV4.clone()
        };
        // the notifier is the authoritative engine for traps
        let engine_id = self.identity.engine_id().to_vec();
        let params = SendPduParams {
            domain,
            address,
            mp_model: target.mp_model,
            security_model: target.effective_security_model(),
            security_name: target.security_name.clone(),
            security_level: target.security_level,
            target_engine_id: engine_id.clone(),
            context_engine_id: engine_id,
            context_name: Vec::new(),
            pdu,
            expect_response: false,
            timeout: target.timeout(),
            retries: 0,
        };
        self.dispatcher.send_pdu(params).await?;
        debug!(target = %target.name, %trap_oid, "trap sent");
        Ok(())
    }

    /// Inform: confirmed, retried and completed by the acknowledging
    /// Response. The receiver is the authoritative engine, so informs
    /// go through the generator's discovery machinery.
    pub async fn send_inform(
        &self,
        target_name: &str,
        trap_oid: &Oid,
        var_binds: &[VarBind],
    ) -> Result<CommandOutcome> {
        let target = self.target(target_name)?;
        if !self.notify_allowed(target, trap_oid) {
            return Err(Error::access_control(format!(
                "notify view denies {} for target {}",
                trap_oid, target_name
            )));
        }
        let pdu = self.build_notification(
            PduType::InformRequest,
            rand::random::<i32>() & 0x7fff_ffff,
            trap_oid,
            var_binds,
        );
        self.generator.send_confirmed(target_name, pdu).await
    }
}

/// A notification delivered to the application.
#[derive(Debug, Clone)]
pub struct ReceivedNotification {
    pub source: SocketAddr,
    pub security_name: String,
    pub context_name: Vec<u8>,
    pub trap_oid: Option<Oid>,
    pub var_binds: Vec<VarBind>,
    /// True when this arrived as an InformRequest (and was acked).
    pub informed: bool,
}

/// Receives SNMPv2-Trap and InformRequest PDUs (v1 traps arrive here
/// already translated) and acknowledges informs.
pub struct NotificationReceiver {
    tx: mpsc::UnboundedSender<ReceivedNotification>,
}

impl NotificationReceiver {
    pub const PDU_TYPES: &'static [PduType] = &[PduType::TrapV2, PduType::InformRequest];

    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReceivedNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    /// Register under the wildcard context engine ID: traps are scoped
    /// to the *sender's* engine, which we cannot enumerate up front.
    pub fn register(self: &Arc<Self>, dispatcher: &MsgAndPduDispatcher) -> Result<()> {
        dispatcher.register_context_engine_id(b"", Self::PDU_TYPES, self.clone())
    }

    fn extract_trap_oid(pdu: &Pdu) -> Option<Oid> {
        pdu.var_binds.iter().find_map(|vb| {
            if vb.name == *oids::SNMP_TRAP_OID {
                match &vb.value {
                    Value::ObjectIdentifier(oid) => Some(oid.clone()),
                    _ => None,
                }
            } else {
                None
            }
        })
    }
}

#[async_trait]
impl PduHandler for NotificationReceiver {
    async fn process_pdu(
        &self,
        dispatcher: Arc<MsgAndPduDispatcher>,
        source: SocketAddr,
        message: &InboundMessage,
        state_ref: Option<StateReference>,
    ) -> Result<()> {
        if !message.pdu.pdu_type.is_notification_class() {
            return Err(Error::protocol(format!(
                "unexpected PDU class {:?} for notification receiver",
                message.pdu.pdu_type
            )));
        }

        let notification = ReceivedNotification {
            source,
            security_name: message.security_name.clone(),
            context_name: message.context_name.clone(),
            trap_oid: Self::extract_trap_oid(&message.pdu),
            var_binds: message.pdu.var_binds.clone(),
            informed: message.pdu.pdu_type == PduType::InformRequest,
        };
        debug!(
            %source,
            trap_oid = ?notification.trap_oid,
            informed = notification.informed,
            "notification received"
        );
        let _ = self.tx.send(notification);

        // informs are acknowledged by echoing the request
        if let Some(state_ref) = state_ref {
            let response = message.pdu.response_to();
            dispatcher
                .return_response_pdu(state_ref, response, None)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_trap_oid() {
        let pdu = Pdu::new(
            PduType::TrapV2,
            1,
            vec![
                VarBind::new(oids::SYS_UPTIME.clone(), Value::TimeTicks(7)),
                VarBind::new(
                    oids::SNMP_TRAP_OID.clone(),
                    Value::ObjectIdentifier(Oid::parse("1.3.6.1.6.3.1.1.5.1").unwrap()),
                ),
            ],
        );
        assert_eq!(
            NotificationReceiver::extract_trap_oid(&pdu),
            Some(Oid::parse("1.3.6.1.6.3.1.1.5.1").unwrap())
        );

        let bare = Pdu::new(PduType::TrapV2, 1, Vec::new());
        assert_eq!(NotificationReceiver::extract_trap_oid(&bare), None);
    }
}
