//! Command generator application (RFC 3413 §3.1): issue requests
//! against configured targets and iterate walks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::TargetEntry;
use crate::core::{DispatchResponse, MsgAndPduDispatcher, SendPduParams};
use crate::error::ErrorIndication;
use crate::proto::{
    oids, ErrorStatus, MessageProcessingModel, Oid, Pdu, PduType, SecurityLevel, VarBind,
};
use crate::{Error, Result};

/// What one completed request yields, mirroring the classic
/// (errorStatus, errorIndex, varBinds) callback triple.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub error_status: ErrorStatus,
    pub error_index: u32,
    pub var_binds: Vec<VarBind>,
}

/// Walk behaviour knobs.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// A v1 agent answers "end of MIB" with noSuchName; treat that as a
    /// normal end of walk.
    pub treat_no_such_name_as_end_of_view: bool,
    /// Repetition count for bulk walks.
    pub max_repetitions: u32,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            treat_no_such_name_as_end_of_view: true,
            max_repetitions: 10,
        }
    }
}

pub struct CommandGenerator {
    dispatcher: Arc<MsgAndPduDispatcher>,
    targets: HashMap<String, TargetEntry>,
    /// target name → discovered authoritative engine ID (v3)
    engine_ids: DashMap<String, Vec<u8>>,
    next_request_id: AtomicI32,
}

impl CommandGenerator {
    pub fn new(dispatcher: Arc<MsgAndPduDispatcher>, targets: Vec<TargetEntry>) -> Self {
        let targets = targets.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            dispatcher,
            targets,
            engine_ids: DashMap::new(),
            next_request_id: AtomicI32::new(rand::thread_rng().gen_range(1..0x4000_0000)),
        }
    }

    fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff
    }

    fn target(&self, name: &str) -> Result<&TargetEntry> {
        self.targets
            .get(name)
            .ok_or_else(|| Error::parse(format!("unknown target: {}", name)))
    }

    fn params_for(
        &self,
        target: &TargetEntry,
        pdu: Pdu,
        engine_id: Vec<u8>,
        expect_response: bool,
    ) -> Result<SendPduParams> {
        let address = target.socket_addr()?;
        let domain = if address.is_ipv6() {
            oids::TRANSPORT_UDP_IPV6.clone()
        } else {
            oids::TRANSPORT_UDP_IPV4.clone()
        };
        Ok(SendPduParams {
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
            expect_response,
            timeout: target.timeout(),
            retries: target.retries,
        })
    }

    /// v3 targets need the peer's authoritative engine ID before real
    /// traffic can flow; learn it with a discovery probe (RFC 3414 §4).
    async fn ensure_engine(&self, target: &TargetEntry) -> Result<Vec<u8>> {
        if target.mp_model != MessageProcessingModel::V3 {
            return Ok(Vec::new());
        }
        if let Some(engine_id) = self.engine_ids.get(&target.name) {
            return Ok(engine_id.value().clone());
        }

        debug!(target = %target.name, "discovering authoritative engine");
        let probe = Pdu::new(PduType::GetRequest, self.next_request_id(), Vec::new());
        let mut params = self.params_for(target, probe, Vec::new(), true)?;
        params.security_name = String::new();
        params.security_level = SecurityLevel::NoAuthNoPriv;

        let response = self.dispatcher.send_pdu(params).await?.response().await?;
        if let Some(indication) = response.error_indication {
            return Err(Error::timeout(format!(
                "engine discovery failed: {}",
                indication
            )));
        }
        match response.pdu {
            Some(pdu)
                if pdu.pdu_type == PduType::Report && !response.context_engine_id.is_empty() =>
            {
                debug!(
                    target = %target.name,
                    engine_id = %hex::encode(&response.context_engine_id),
                    "engine discovered"
                );
                self.engine_ids
                    .insert(target.name.clone(), response.context_engine_id.clone());
                Ok(response.context_engine_id)
            }
            _ => Err(Error::protocol("unexpected reply to discovery probe")),
        }
    }

    fn classify_report(pdu: &Pdu) -> Option<ErrorIndication> {
        let oid = &pdu.var_binds.first()?.name;
        if oid == &*oids::USM_STATS_NOT_IN_TIME_WINDOWS {
            Some(ErrorIndication::NotInTimeWindow)
        } else if oid == &*oids::USM_STATS_UNKNOWN_ENGINE_IDS {
            Some(ErrorIndication::UnknownEngineId)
        } else if oid == &*oids::USM_STATS_UNKNOWN_USER_NAMES {
            Some(ErrorIndication::UnknownUserName)
        } else if oid == &*oids::USM_STATS_WRONG_DIGESTS {
            Some(ErrorIndication::WrongDigest)
        } else if oid == &*oids::USM_STATS_DECRYPTION_ERRORS {
            Some(ErrorIndication::DecryptionError)
        } else if oid == &*oids::USM_STATS_UNSUPPORTED_SEC_LEVELS {
            Some(ErrorIndication::UnsupportedSecurityLevel)
        } else {
            Some(ErrorIndication::ReportPduReceived)
        }
    }

    fn indication_to_error(indication: ErrorIndication) -> Error {
        match indication {
            ErrorIndication::RequestTimedOut => Error::timeout(indication.to_string()),
            ErrorIndication::EngineShutdown => Error::invalid_state(indication.to_string()),
            ErrorIndication::TransportError => Error::transport(indication.to_string()),
            other => Error::protocol(other.to_string()),
        }
    }

    /// Send one confirmed-class PDU and wait for the matching Response.
    /// Reports are handled inline: a time-window Report triggers one
    /// resynchronised resend, a stale engine ID one rediscovery.
    pub async fn send_confirmed(&self, target_name: &str, pdu: Pdu) -> Result<CommandOutcome> {
        // keep the dispatcher loop alive while this request is pending
        self.dispatcher.transport().job_started();
        let result = self.send_confirmed_inner(target_name, pdu).await;
        self.dispatcher.transport().job_finished();
        result
    }

    async fn send_confirmed_inner(&self, target_name: &str, pdu: Pdu) -> Result<CommandOutcome> {
        let target = self.target(target_name)?.clone();

        for attempt in 0..2 {
            let engine_id = self.ensure_engine(&target).await?;
            let params = self.params_for(&target, pdu.clone(), engine_id, true)?;
            let response: DispatchResponse =
                self.dispatcher.send_pdu(params).await?.response().await?;

            if let Some(indication) = response.error_indication {
                return Err(Self::indication_to_error(indication));
            }
            let rsp_pdu = response
                .pdu
                .ok_or_else(|| Error::internal("response event without PDU"))?;

            match rsp_pdu.pdu_type {
                PduType::Response => {
                    return Ok(CommandOutcome {
                        error_status: rsp_pdu.error_status,
                        error_index: rsp_pdu.error_index,
                        var_binds: rsp_pdu.var_binds,
                    });
                }
                PduType::Report => {
                    let indication = Self::classify_report(&rsp_pdu)
                        .unwrap_or(ErrorIndication::ReportPduReceived);
                    warn!(target = %target.name, %indication, attempt, "report received");
                    match indication {
                        // USM cached the peer clock from the report;
                        // one resend is enough to resynchronise
                        ErrorIndication::NotInTimeWindow if attempt == 0 => continue,
                        ErrorIndication::UnknownEngineId if attempt == 0 => {
                            self.engine_ids.remove(&target.name);
                            continue;
                        }
                        other => return Err(Self::indication_to_error(other)),
                    }
                }
                other => {
                    return Err(Error::protocol(format!(
                        "unexpected PDU type {:?} in response",
                        other
                    )))
                }
            }
        }
        Err(Error::timeout("request abandoned after report retry"))
    }

    pub async fn get(&self, target: &str, names: &[Oid]) -> Result<CommandOutcome> {
        let var_binds = names.iter().cloned().map(VarBind::null).collect();
        let pdu = Pdu::new(PduType::GetRequest, self.next_request_id(), var_binds);
        self.send_confirmed(target, pdu).await
    }

    pub async fn get_next(&self, target: &str, names: &[Oid]) -> Result<CommandOutcome> {
        let var_binds = names.iter().cloned().map(VarBind::null).collect();
        let pdu = Pdu::new(PduType::GetNextRequest, self.next_request_id(), var_binds);
        self.send_confirmed(target, pdu).await
    }

    pub async fn get_bulk(
        &self,
        target: &str,
        non_repeaters: u32,
        max_repetitions: u32,
        names: &[Oid],
    ) -> Result<CommandOutcome> {
        let var_binds = names.iter().cloned().map(VarBind::null).collect();
        let pdu = Pdu::get_bulk(
            self.next_request_id(),
            non_repeaters,
            max_repetitions,
            var_binds,
        );
        self.send_confirmed(target, pdu).await
    }

    pub async fn set(&self, target: &str, var_binds: Vec<VarBind>) -> Result<CommandOutcome> {
        let pdu = Pdu::new(PduType::SetRequest, self.next_request_id(), var_binds);
        self.send_confirmed(target, pdu).await
    }

    /// GETNEXT walk. The callback decides continuation: return true to
    /// keep walking, false to stop.
    pub async fn walk<F>(
        &self,
        target: &str,
        start: &Oid,
        options: &WalkOptions,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&VarBind) -> bool,
    {
        let mut current = start.clone();
        loop {
            let outcome = self.get_next(target, &[current.clone()]).await?;
            if outcome.error_status == ErrorStatus::NoSuchName
                && options.treat_no_such_name_as_end_of_view
            {
                return Ok(());
            }
            if outcome.error_status != ErrorStatus::NoError {
                return Err(Error::protocol(format!(
                    "{} at index {}",
                    outcome.error_status, outcome.error_index
                )));
            }
            let Some(vb) = outcome.var_binds.first() else {
                return Ok(());
            };
            if vb.value.is_end_of_mib_view() {
                return Ok(());
            }
            // a non-increasing OID would walk forever
            if vb.name <= current {
                return Err(Error::protocol(format!(
                    "agent returned non-increasing OID {} after {}",
                    vb.name, current
                )));
            }
            if !callback(vb) {
                return Ok(());
            }
            current = vb.name.clone();
        }
    }

    /// GETBULK walk over a single column of variables.
    pub async fn bulk_walk<F>(
        &self,
        target: &str,
        start: &Oid,
        options: &WalkOptions,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(&VarBind) -> bool,
    {
        let mut current = start.clone();
        loop {
            let outcome = self
                .get_bulk(target, 0, options.max_repetitions, &[current.clone()])
                .await?;
            if outcome.error_status != ErrorStatus::NoError {
                if outcome.error_status == ErrorStatus::NoSuchName
                    && options.treat_no_such_name_as_end_of_view
                {
                    return Ok(());
                }
                return Err(Error::protocol(format!(
                    "{} at index {}",
                    outcome.error_status, outcome.error_index
                )));
            }
            if outcome.var_binds.is_empty() {
                return Ok(());
            }
            for vb in &outcome.var_binds {
                if vb.value.is_end_of_mib_view() {
                    return Ok(());
                }
                if vb.name <= current {
                    return Err(Error::protocol(format!(
                        "agent returned non-increasing OID {} after {}",
                        vb.name, current
                    )));
                }
                if !callback(vb) {
                    return Ok(());
                }
                current = vb.name.clone();
            }
        }
    }

    /// Invalidate the discovered engine for a target, forcing fresh
    /// discovery on the next request.
    pub fn forget_engine(&self, target_name: &str) {
        self.engine_ids.remove(target_name);
    }
}
