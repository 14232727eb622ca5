//! Command responder application (RFC 3413 §3.2): GET / GETNEXT /
//! GETBULK / SET against the MIB instrumentation, behind VACM.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::access::{VacmError, VacmTables, ViewType};
use crate::core::{EngineCounters, MsgAndPduDispatcher, PduHandler, StateReference};
use crate::error::ErrorIndication;
use crate::mib::{AccessDecision, MibStore, SmiError, SmiErrorKind};
use crate::msgproc::InboundMessage;
use crate::proto::{oids, Oid, Pdu, PduType, SecurityModel, Value, VarBind};
use crate::security::StatusInformation;
use crate::{Error, Result};

pub struct CommandResponder {
    vacm: Arc<VacmTables>,
    mib: Arc<RwLock<MibStore>>,
    counters: Arc<EngineCounters>,
    /// GETBULK response ceiling; the repetition count is clamped by
    /// `max_var_binds / R` with truncating division.
    max_var_binds: u32,
}

impl CommandResponder {
    pub const PDU_TYPES: &'static [PduType] = &[
        PduType::GetRequest,
        PduType::GetNextRequest,
        PduType::GetBulkRequest,
        PduType::SetRequest,
    ];

    pub fn new(
        vacm: Arc<VacmTables>,
        mib: Arc<RwLock<MibStore>>,
        counters: Arc<EngineCounters>,
        max_var_binds: u32,
    ) -> Self {
        Self {
            vacm,
            mib,
            counters,
            max_var_binds,
        }
    }

    pub fn register(
        self: &Arc<Self>,
        dispatcher: &MsgAndPduDispatcher,
        context_engine_id: &[u8],
    ) -> Result<()> {
        dispatcher.register_context_engine_id(context_engine_id, Self::PDU_TYPES, self.clone())
    }

    /// The per-VarBind access callback handed to the MIB layer: VACM
    /// first, then the rfc2576 §4.1.2.1 rule hiding Counter64 values
    /// from SNMPv1 walkers.
    fn make_access_check<'a>(
        &'a self,
        message: &'a InboundMessage,
        context: &'a str,
    ) -> impl Fn(&Oid, Option<&Value>, usize, ViewType) -> std::result::Result<AccessDecision, SmiError> + 'a
    {
        move |name, value, idx, view_type| {
            match self.vacm.is_access_allowed(
                message.security_model,
                &message.security_name,
                message.security_level,
                view_type,
                context,
                name,
            ) {
                Ok(()) => {
                    if message.security_model == SecurityModel::V1
                        && matches!(value, Some(Value::Counter64(_)))
                        && matches!(
                            message.pdu.pdu_type,
                            PduType::GetNextRequest | PduType::GetBulkRequest
                        )
                    {
                        return Ok(AccessDecision::NotInView);
                    }
                    Ok(AccessDecision::Granted)
                }
                Err(VacmError::NotInView) => Ok(AccessDecision::NotInView),
                Err(
                    VacmError::NoSuchView | VacmError::NoAccessEntry | VacmError::NoGroupName,
                ) => Err(SmiError::new(SmiErrorKind::Authorization, idx)),
                Err(VacmError::NoSuchContext) => {
                    let count = EngineCounters::bump(&self.counters.unknown_contexts);
                    Err(SmiError::with_report(
                        SmiErrorKind::GenErr,
                        idx,
                        oids::SNMP_UNKNOWN_CONTEXTS.clone(),
                        Value::Counter32(count),
                    ))
                }
                Err(VacmError::OtherError) => Err(SmiError::new(SmiErrorKind::GenErr, idx)),
            }
        }
    }

    async fn handle_operation(
        &self,
        message: &InboundMessage,
    ) -> std::result::Result<Vec<VarBind>, SmiError> {
        let context = String::from_utf8_lossy(&message.context_name).into_owned();
        let ac = self.make_access_check(message, &context);
        let pdu = &message.pdu;

        match pdu.pdu_type {
            PduType::GetRequest => self.mib.read().await.read_vars(&pdu.var_binds, &ac),
            PduType::GetNextRequest => self.mib.read().await.read_next_vars(&pdu.var_binds, &ac),
            PduType::GetBulkRequest => {
                let store = self.mib.read().await;
                self.handle_get_bulk(&store, pdu, &ac)
            }
            PduType::SetRequest => self.mib.write().await.write_vars(&pdu.var_binds, &ac),
            _ => Err(SmiError::new(SmiErrorKind::GenErr, 0)),
        }
    }

    /// RFC 3416 §4.2.3: N singletons, then up to M' repetitions of the
    /// R repeating variables, row by row, stopping early once a whole
    /// row is endOfMibView.
    fn handle_get_bulk(
        &self,
        store: &MibStore,
        pdu: &Pdu,
        ac: &crate::mib::AccessCheck,
    ) -> std::result::Result<Vec<VarBind>, SmiError> {
        let n = (pdu.non_repeaters as usize).min(pdu.var_binds.len());
        let r = pdu.var_binds.len() - n;

        let mut out = if n > 0 {
            store.read_next_vars(&pdu.var_binds[..n], ac)?
        } else {
            Vec::new()
        };

        if r > 0 {
            // truncating division: R beyond the ceiling means zero rows
            let m = pdu.max_repetitions.min(self.max_var_binds / r as u32);
            let mut row: Vec<VarBind> = pdu.var_binds[n..].to_vec();
            for _ in 0..m {
                let next = store.read_next_vars(&row, ac)?;
                let exhausted = next.iter().all(|vb| vb.value.is_end_of_mib_view());
                out.extend(next.iter().cloned());
                if exhausted {
                    break;
                }
                row = next;
            }
        }

        if out.is_empty() {
            return Err(SmiError::new(SmiErrorKind::GenErr, 0));
        }
        Ok(out)
    }
}

#[async_trait]
impl PduHandler for CommandResponder {
    async fn process_pdu(
        &self,
        dispatcher: Arc<MsgAndPduDispatcher>,
        source: SocketAddr,
        message: &InboundMessage,
        state_ref: Option<StateReference>,
    ) -> Result<()> {
        let state_ref = state_ref
            .ok_or_else(|| Error::protocol("command responder invoked without state reference"))?;
        if !message.pdu.pdu_type.is_request_class() {
            return Err(Error::protocol(format!(
                "unexpected PDU class {:?} for command responder",
                message.pdu.pdu_type
            )));
        }
        debug!(
            %source,
            pdu_type = ?message.pdu.pdu_type,
            request_id = message.pdu.request_id,
            security_name = %message.security_name,
            "processing request"
        );

        let mut response = message.pdu.response_to();
        match self.handle_operation(message).await {
            Ok(var_binds) => {
                response.var_binds = var_binds;
                dispatcher.return_response_pdu(state_ref, response, None).await
            }
            Err(smi) => match smi.report {
                Some((oid, value)) => {
                    let status = StatusInformation::with_report(
                        ErrorIndication::UnknownContext,
                        oid,
                        value,
                    );
                    dispatcher
                        .return_response_pdu(state_ref, response, Some(status))
                        .await
                }
                None => {
                    response.error_status = smi.kind.error_status();
                    response.error_index = smi.idx as u32 + 1;
                    dispatcher.return_response_pdu(state_ref, response, None).await
                }
            },
        }
    }
}
