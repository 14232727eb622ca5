//! Message & PDU dispatcher (RFC 3412 §4): the central router between
//! transports, message processing models and applications.
//!
//! Responder-side lifecycle per inbound message: decode (message
//! processing + security), authorize and instrument (application), then
//! exactly one outbound message — Response, Report, or nothing for
//! trap-class PDUs — released through `return_response_pdu`, which
//! frees the state slot.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::{EngineCounters, EngineIdentity};
use crate::codec;
use crate::error::ErrorIndication;
use crate::msgproc::{CommunityMessageProcessor, InboundMessage, InboundOutcome, V3MessageProcessor};
use crate::proto::{
    oids, ErrorStatus, MessageProcessingModel, Oid, Pdu, PduType, SecurityLevel, SecurityModel,
    SnmpMessage, Value, VarBind,
};
use crate::security::StatusInformation;
use crate::transport::{InboundDatagram, TransportDispatcher};
use crate::{Error, Result};

/// Opaque positive 31-bit identifier of one live inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateReference(i32);

impl std::fmt::Display for StateReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sr-{}", self.0)
    }
}

/// Opaque handle of one outbound confirmed-class request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PduHandle(i32);

impl std::fmt::Display for PduHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ph-{}", self.0)
    }
}

/// Everything needed to emit the response that matches one inbound
/// confirmed-class request.
#[derive(Debug, Clone)]
pub struct CachedRequestState {
    pub domain: Oid,
    pub source: SocketAddr,
    pub mp_model: MessageProcessingModel,
    pub security_model: SecurityModel,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub msg_id: Option<u32>,
    pub max_size_response: u32,
    pub reportable: bool,
    pub orig_v1_pdu: Option<Pdu>,
    pub request_pdu_type: PduType,
}

/// What a generator gets back for one request: the matched Response or
/// Report PDU, or an error indication (timeout, transport, shutdown).
/// `context_engine_id` carries the responding engine's ID so discovery
/// can learn it from a Report.
#[derive(Debug)]
pub struct DispatchResponse {
    pub error_indication: Option<ErrorIndication>,
    pub pdu: Option<Pdu>,
    pub context_engine_id: Vec<u8>,
}

impl DispatchResponse {
    fn indication(error_indication: ErrorIndication) -> Self {
        Self {
            error_indication: Some(error_indication),
            pdu: None,
            context_engine_id: Vec::new(),
        }
    }
}

/// Parameters of `send_pdu` (RFC 3412 §4.1.1 sendPdu).
#[derive(Debug, Clone)]
pub struct SendPduParams {
    pub domain: Oid,
    pub address: SocketAddr,
    pub mp_model: MessageProcessingModel,
    pub security_model: SecurityModel,
    pub security_name: String,
    pub security_level: SecurityLevel,
    /// v3: the authoritative peer engine (empty while undiscovered).
    pub target_engine_id: Vec<u8>,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub pdu: Pdu,
    pub expect_response: bool,
    pub timeout: Duration,
    pub retries: u32,
}

/// A pending confirmed-class request awaiting its response.
struct PendingEntry {
    tx: oneshot::Sender<DispatchResponse>,
    security_name: String,
    security_level: SecurityLevel,
    context_engine_id: Vec<u8>,
    context_name: Vec<u8>,
}

/// Handle returned by `send_pdu`; await `response()` for the outcome.
pub struct SendRequest {
    pub handle: PduHandle,
    rx: Option<oneshot::Receiver<DispatchResponse>>,
}

impl SendRequest {
    pub async fn response(self) -> Result<DispatchResponse> {
        match self.rx {
            Some(rx) => rx
                .await
                .map_err(|_| Error::invalid_state("dispatcher dropped pending request")),
            None => Err(Error::invalid_state("request did not expect a response")),
        }
    }
}

/// An application receiving PDUs for a context engine ID (RFC 3413).
#[async_trait]
pub trait PduHandler: Send + Sync {
    async fn process_pdu(
        &self,
        dispatcher: Arc<MsgAndPduDispatcher>,
        source: SocketAddr,
        message: &InboundMessage,
        state_ref: Option<StateReference>,
    ) -> Result<()>;
}

pub struct MsgAndPduDispatcher {
    identity: Arc<EngineIdentity>,
    counters: Arc<EngineCounters>,
    transport: Arc<TransportDispatcher>,
    community_mp: CommunityMessageProcessor,
    v3_mp: V3MessageProcessor,
    handlers: DashMap<(Vec<u8>, PduType), Arc<dyn PduHandler>>,
    pending: DashMap<PduHandle, PendingEntry>,
    /// v3 msgID → pending handle
    msg_index: DashMap<u32, PduHandle>,
    /// community requestID → pending handle
    req_index: DashMap<i32, PduHandle>,
    state_cache: DashMap<StateReference, CachedRequestState>,
    next_handle: AtomicI32,
    next_state_ref: AtomicI32,
}

impl MsgAndPduDispatcher {
    pub fn new(
        identity: Arc<EngineIdentity>,
        counters: Arc<EngineCounters>,
        transport: Arc<TransportDispatcher>,
        community_mp: CommunityMessageProcessor,
        v3_mp: V3MessageProcessor,
    ) -> Self {
        Self {
            identity,
            counters,
            transport,
            community_mp,
            v3_mp,
            handlers: DashMap::new(),
            pending: DashMap::new(),
            msg_index: DashMap::new(),
            req_index: DashMap::new(),
            state_cache: DashMap::new(),
            next_handle: AtomicI32::new(1),
            next_state_ref: AtomicI32::new(1),
        }
    }

    pub fn identity(&self) -> &Arc<EngineIdentity> {
        &self.identity
    }

    pub fn counters(&self) -> &Arc<EngineCounters> {
        &self.counters
    }

    pub fn transport(&self) -> &Arc<TransportDispatcher> {
        &self.transport
    }

    fn alloc_handle(&self) -> PduHandle {
        PduHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff)
    }

    fn alloc_state_ref(&self) -> StateReference {
        StateReference(self.next_state_ref.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff)
    }

    /// Register an application for PDU types under a context engine ID
    /// (RFC 3412 §4.5 registerContextEngineID).
    pub fn register_context_engine_id(
        &self,
        context_engine_id: &[u8],
        pdu_types: &[PduType],
        handler: Arc<dyn PduHandler>,
    ) -> Result<()> {
        for pdu_type in pdu_types {
            let key = (context_engine_id.to_vec(), *pdu_type);
            if self.handlers.contains_key(&key) {
                return Err(Error::invalid_state(format!(
                    "handler already registered for {:?}",
                    pdu_type
                )));
            }
            self.handlers.insert(key, handler.clone());
        }
        Ok(())
    }

    pub fn unregister_context_engine_id(&self, context_engine_id: &[u8], pdu_types: &[PduType]) {
        for pdu_type in pdu_types {
            self.handlers
                .remove(&(context_engine_id.to_vec(), *pdu_type));
        }
    }

    fn encode_outgoing(&self, params: &SendPduParams) -> Result<(Vec<u8>, Option<u32>)> {
        match params.mp_model {
            MessageProcessingModel::V1 | MessageProcessingModel::V2c => {
                let octets = self.community_mp.prepare_outgoing_message(
                    params.mp_model,
                    &params.security_name,
                    &params.pdu,
                )?;
                Ok((octets, None))
            }
            MessageProcessingModel::V3 => {
                let (octets, msg_id) = self.v3_mp.prepare_outgoing_message(
                    &params.target_engine_id,
                    &params.security_name,
                    params.security_level,
                    &params.context_engine_id,
                    &params.context_name,
                    &params.pdu,
                    params.expect_response,
                )?;
                Ok((octets, Some(msg_id)))
            }
        }
    }

    async fn dispatch_attempt(&self, params: &SendPduParams, handle: PduHandle) -> Result<()> {
        let (octets, msg_id) = self.encode_outgoing(params)?;
        if params.expect_response {
            match msg_id {
                Some(id) => {
                    self.msg_index.insert(id, handle);
                }
                None => {
                    self.req_index.insert(params.pdu.request_id, handle);
                }
            }
        }
        self.transport
            .send_message(&params.domain, params.address, &octets)
            .await
    }

    /// RFC 3412 §4.1.1: allocate a handle, build the message, send it,
    /// and schedule retransmissions. Each retry re-enters the message
    /// processing model, so v3 retries carry a fresh msgID while the
    /// requestID stays stable.
    pub async fn send_pdu(self: &Arc<Self>, params: SendPduParams) -> Result<SendRequest> {
        let handle = self.alloc_handle();

        let rx = if params.expect_response {
            let (tx, rx) = oneshot::channel();
            self.pending.insert(
                handle,
                PendingEntry {
                    tx,
                    security_name: params.security_name.clone(),
                    security_level: params.security_level,
                    context_engine_id: params.context_engine_id.clone(),
                    context_name: params.context_name.clone(),
                },
            );
            Some(rx)
        } else {
            None
        };

        // first attempt inline so configuration errors surface to the
        // caller instead of a timeout
        if let Err(e) = self.dispatch_attempt(&params, handle).await {
            self.drop_pending(handle);
            return Err(e);
        }

        if params.expect_response {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                for attempt in 0..params.retries {
                    tokio::time::sleep(params.timeout).await;
                    if !dispatcher.pending.contains_key(&handle) {
                        dispatcher.unindex(handle);
                        return;
                    }
                    debug!(%handle, attempt = attempt + 1, "retransmitting request");
                    if let Err(e) = dispatcher.dispatch_attempt(&params, handle).await {
                        warn!(%handle, error = %e, "retransmission failed");
                        dispatcher.complete(
                            handle,
                            DispatchResponse::indication(ErrorIndication::TransportError),
                        );
                        return;
                    }
                }
                tokio::time::sleep(params.timeout).await;
                dispatcher.complete(
                    handle,
                    DispatchResponse::indication(ErrorIndication::RequestTimedOut),
                );
            });
        }

        Ok(SendRequest { handle, rx })
    }

    fn unindex(&self, handle: PduHandle) {
        self.msg_index.retain(|_, h| *h != handle);
        self.req_index.retain(|_, h| *h != handle);
    }

    fn drop_pending(&self, handle: PduHandle) {
        self.pending.remove(&handle);
        self.unindex(handle);
    }

    /// Deliver the outcome for a pending request exactly once.
    fn complete(&self, handle: PduHandle, response: DispatchResponse) {
        self.unindex(handle);
        if let Some((_, entry)) = self.pending.remove(&handle) {
            let _ = entry.tx.send(response);
        }
    }

    /// Invalidate a pending handle; a late response is silently dropped
    /// (§5 cancellation semantics).
    pub fn cancel_pending(&self, handle: PduHandle) {
        self.drop_pending(handle);
    }

    /// Engine shutdown: fail all outstanding requests.
    pub fn cancel_all(&self) {
        let handles: Vec<PduHandle> = self.pending.iter().map(|e| *e.key()).collect();
        for handle in handles {
            self.complete(
                handle,
                DispatchResponse::indication(ErrorIndication::EngineShutdown),
            );
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Entry point for every received datagram.
    pub async fn process_incoming(self: &Arc<Self>, dgram: InboundDatagram) {
        let msg = match codec::decode_message(&dgram.octets) {
            Ok(msg) => msg,
            Err(e) => {
                EngineCounters::bump(&self.counters.in_asn_parse_errs);
                debug!(source = %dgram.source, error = %e, "undecodable message dropped");
                return;
            }
        };

        let outcome = match msg {
            SnmpMessage::Community(community_msg) => {
                self.community_mp.prepare_data_elements(community_msg)
            }
            SnmpMessage::V3(v3_msg) => {
                match self.v3_mp.prepare_data_elements(&dgram.octets, *v3_msg) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        EngineCounters::bump(&self.counters.in_asn_parse_errs);
                        debug!(source = %dgram.source, error = %e, "v3 message dropped");
                        return;
                    }
                }
            }
        };

        match outcome {
            InboundOutcome::Dropped(indication) => {
                match indication {
                    ErrorIndication::UnknownCommunityName => {
                        EngineCounters::bump(&self.counters.in_bad_community_names);
                    }
                    _ => {
                        EngineCounters::bump(&self.counters.silent_drops);
                    }
                }
                debug!(source = %dgram.source, %indication, "message dropped");
            }
            InboundOutcome::ReportDue { octets, status } => {
                debug!(source = %dgram.source, indication = %status.error_indication, "security failure");
                if let Some(octets) = octets {
                    if let Err(e) = self
                        .transport
                        .send_message(&dgram.domain, dgram.source, &octets)
                        .await
                    {
                        warn!(error = %e, "failed to send Report");
                    }
                }
            }
            InboundOutcome::Message(inbound) => match inbound.pdu.pdu_type {
                PduType::Response | PduType::Report => {
                    self.process_response_pdu(*inbound);
                }
                _ => {
                    self.process_request_pdu(&dgram, *inbound).await;
                }
            },
        }
    }

    /// RFC 3412 §4.1.1 processResponsePdu: correlate and hand the PDU to
    /// the waiting generator.
    fn process_response_pdu(&self, inbound: InboundMessage) {
        let handle = match inbound.mp_model {
            MessageProcessingModel::V3 => inbound
                .msg_id
                .and_then(|id| self.msg_index.get(&id).map(|h| *h)),
            _ => self
                .req_index
                .get(&inbound.pdu.request_id)
                .map(|h| *h),
        };

        let Some(handle) = handle else {
            EngineCounters::bump(&self.counters.silent_drops);
            debug!("unmatched response dropped");
            return;
        };

        // a matched Response must echo the request's security and
        // context parameters; a mismatch is an attack or a confusion
        if inbound.pdu.pdu_type == PduType::Response {
            if let Some(entry) = self.pending.get(&handle) {
                let sec_matches = entry.security_name == inbound.security_name
                    && entry.security_level == inbound.security_level;
                let ctx_matches = inbound.mp_model != MessageProcessingModel::V3
                    || (entry.context_engine_id == inbound.context_engine_id
                        && entry.context_name == inbound.context_name);
                if !sec_matches || !ctx_matches {
                    drop(entry);
                    EngineCounters::bump(&self.counters.silent_drops);
                    warn!(%handle, "response with mismatched security parameters dropped");
                    return;
                }
            }
        }

        self.complete(
            handle,
            DispatchResponse {
                error_indication: None,
                context_engine_id: inbound.context_engine_id,
                pdu: Some(inbound.pdu),
            },
        );
    }

    /// RFC 3412 §4.2.1 processPdu: route a request-class or
    /// notification PDU to its registered application.
    async fn process_request_pdu(self: &Arc<Self>, dgram: &InboundDatagram, inbound: InboundMessage) {
        // exact context engine ID first, then the wildcard registration
        // (empty ID) used by notification receivers
        let key = (inbound.context_engine_id.clone(), inbound.pdu.pdu_type);
        let handler = self
            .handlers
            .get(&key)
            .or_else(|| self.handlers.get(&(Vec::new(), inbound.pdu.pdu_type)))
            .map(|h| h.value().clone());

        let Some(handler) = handler else {
            let count = EngineCounters::bump(&self.counters.unknown_pdu_handlers);
            debug!(pdu_type = ?inbound.pdu.pdu_type, "no handler for context engine ID");
            if inbound.mp_model == MessageProcessingModel::V3
                && inbound.reportable
                && inbound.pdu.pdu_type.is_confirmed_class()
            {
                let report = Pdu::new(
                    PduType::Report,
                    inbound.pdu.request_id,
                    vec![VarBind::new(
                        oids::SNMP_UNKNOWN_PDU_HANDLERS.clone(),
                        Value::Counter32(count),
                    )],
                );
                let result = self.v3_mp.prepare_response_message(
                    inbound.msg_id.unwrap_or(0),
                    &inbound.security_name,
                    inbound.security_level,
                    &inbound.context_engine_id,
                    &inbound.context_name,
                    &report,
                );
                match result {
                    Ok(octets) => {
                        if let Err(e) = self
                            .transport
                            .send_message(&dgram.domain, dgram.source, &octets)
                            .await
                        {
                            warn!(error = %e, "failed to send unknownPduHandler Report");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to build unknownPduHandler Report"),
                }
            }
            return;
        };

        let state_ref = if inbound.pdu.pdu_type.is_confirmed_class() {
            let state_ref = self.alloc_state_ref();
            self.state_cache.insert(
                state_ref,
                CachedRequestState {
                    domain: dgram.domain.clone(),
                    source: dgram.source,
                    mp_model: inbound.mp_model,
                    security_model: inbound.security_model,
                    security_name: inbound.security_name.clone(),
                    security_level: inbound.security_level,
                    context_engine_id: inbound.context_engine_id.clone(),
                    context_name: inbound.context_name.clone(),
                    msg_id: inbound.msg_id,
                    max_size_response: inbound.max_size_response,
                    reportable: inbound.reportable,
                    orig_v1_pdu: inbound.orig_v1_pdu.clone(),
                    request_pdu_type: inbound.pdu.pdu_type,
                },
            );
            Some(state_ref)
        } else {
            None
        };

        if let Err(e) = handler
            .process_pdu(self.clone(), dgram.source, &inbound, state_ref)
            .await
        {
            error!(error = %e, "application failed to process PDU");
            if let Some(state_ref) = state_ref {
                self.state_cache.remove(&state_ref);
                EngineCounters::bump(&self.counters.silent_drops);
            }
        }
    }

    /// RFC 3412 §4.1.2 returnResponsePdu: emit the one response a cached
    /// request is owed and release its state slot. A populated
    /// `status` asks for a Report instead (v3 with the reportable flag
    /// set; otherwise the message is silently dropped and counted).
    pub async fn return_response_pdu(
        &self,
        state_ref: StateReference,
        pdu: Pdu,
        status: Option<StatusInformation>,
    ) -> Result<()> {
        let (_, state) = self.state_cache.remove(&state_ref).ok_or_else(|| {
            Error::invalid_state(format!("{} already released", state_ref))
        })?;

        let report_requested = status.as_ref().map(|s| s.wants_report()).unwrap_or(false);
        let octets = match state.mp_model {
            MessageProcessingModel::V1 | MessageProcessingModel::V2c => {
                if report_requested {
                    // community versions cannot carry Reports
                    EngineCounters::bump(&self.counters.silent_drops);
                    return Ok(());
                }
                self.community_mp.prepare_response_message(
                    state.mp_model,
                    &state.security_name,
                    &pdu,
                    state.orig_v1_pdu.as_ref(),
                )?
            }
            MessageProcessingModel::V3 => {
                if report_requested {
                    if !state.reportable {
                        EngineCounters::bump(&self.counters.silent_drops);
                        return Ok(());
                    }
                    let status = status.unwrap_or_else(|| {
                        StatusInformation::new(ErrorIndication::UnknownContext)
                    });
                    let (oid, value) = match (status.oid, status.value) {
                        (Some(oid), Some(value)) => (oid, value),
                        _ => return Err(Error::dispatch("report requested without counter")),
                    };
                    let report = Pdu::new(
                        PduType::Report,
                        pdu.request_id,
                        vec![VarBind::new(oid, value)],
                    );
                    self.v3_mp.prepare_response_message(
                        state.msg_id.unwrap_or(0),
                        &state.security_name,
                        state.security_level,
                        &state.context_engine_id,
                        &state.context_name,
                        &report,
                    )?
                } else {
                    self.v3_mp.prepare_response_message(
                        state.msg_id.unwrap_or(0),
                        &state.security_name,
                        state.security_level,
                        &state.context_engine_id,
                        &state.context_name,
                        &pdu,
                    )?
                }
            }
        };

        // RFC 3416 §4.2: a response that exceeds the requester's limit
        // degrades to tooBig with an empty binding list
        let octets = if octets.len() > state.max_size_response as usize {
            let mut too_big = Pdu::new(PduType::Response, pdu.request_id, Vec::new());
            too_big.error_status = ErrorStatus::TooBig;
            let retry = match state.mp_model {
                MessageProcessingModel::V1 | MessageProcessingModel::V2c => {
                    self.community_mp.prepare_response_message(
                        state.mp_model,
                        &state.security_name,
                        &too_big,
                        state.orig_v1_pdu.as_ref(),
                    )?
                }
                MessageProcessingModel::V3 => self.v3_mp.prepare_response_message(
                    state.msg_id.unwrap_or(0),
                    &state.security_name,
                    state.security_level,
                    &state.context_engine_id,
                    &state.context_name,
                    &too_big,
                )?,
            };
            if retry.len() > state.max_size_response as usize {
                EngineCounters::bump(&self.counters.silent_drops);
                return Ok(());
            }
            retry
        } else {
            octets
        };

        self.transport
            .send_message(&state.domain, state.source, &octets)
            .await
    }
}
