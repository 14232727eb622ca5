//! Engine orchestrator: wires identity, transports, dispatcher,
//! security models and applications together.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::dispatcher::MsgAndPduDispatcher;
use super::persistence;
use super::{EngineCounters, EngineIdentity};
use crate::access::VacmTables;
use crate::apps::{
    CommandGenerator, CommandResponder, NotificationOriginator, NotificationReceiver,
    ReceivedNotification,
};
use crate::config::EngineConfig;
use crate::mib::{MibAccess, MibStore};
use crate::msgproc::{CommunityMessageProcessor, V3MessageProcessor};
use crate::proto::{oids, Oid, Value};
use crate::security::{CommunityStore, UsmSecurityModel};
use crate::transport::{InboundDatagram, TransportDispatcher};
use crate::{Error, Result};

/// One SNMP engine instance: command generator and responder in a
/// single process (RFC 3411 §3.1).
pub struct SnmpEngine {
    config: EngineConfig,
    identity: Arc<EngineIdentity>,
    counters: Arc<EngineCounters>,
    usm: Arc<UsmSecurityModel>,
    communities: Arc<CommunityStore>,
    vacm: Arc<VacmTables>,
    mib: Arc<RwLock<MibStore>>,
    transport: Arc<TransportDispatcher>,
    dispatcher: Arc<MsgAndPduDispatcher>,
    generator: Arc<CommandGenerator>,
    originator: Arc<NotificationOriginator>,
    responder: Option<Arc<CommandResponder>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<InboundDatagram>>,
    notification_rx: Option<mpsc::UnboundedReceiver<ReceivedNotification>>,
    tasks: Vec<JoinHandle<()>>,
    is_running: bool,
}

impl SnmpEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let state = persistence::load_or_create(
            Path::new(&config.general.state_file),
            config.engine_id_bytes()?.as_deref(),
        )?;
        info!(
            engine_id = %hex::encode(&state.engine_id),
            boots = state.boots,
            "engine identity ready"
        );

        let identity = Arc::new(EngineIdentity::new(state.engine_id, state.boots));
        let counters = Arc::new(EngineCounters::default());
        let usm = Arc::new(UsmSecurityModel::new(config.usm_users.clone()));
        let communities = Arc::new(CommunityStore::new(config.communities.clone()));
        let vacm = Arc::new(config.vacm.clone());
        let mib = Arc::new(RwLock::new(Self::build_mib(
            &config,
            identity.clone(),
            counters.clone(),
            usm.clone(),
        )));

        let mut transport = TransportDispatcher::new();
        let inbound_rx = transport.take_receiver();
        let transport = Arc::new(transport);

        let dispatcher = Arc::new(MsgAndPduDispatcher::new(
            identity.clone(),
            counters.clone(),
            transport.clone(),
            CommunityMessageProcessor::new(identity.clone(), communities.clone()),
            V3MessageProcessor::new(identity.clone(), usm.clone()),
        ));

        let generator = Arc::new(CommandGenerator::new(
            dispatcher.clone(),
            config.targets.clone(),
        ));
        let originator = Arc::new(NotificationOriginator::new(
            dispatcher.clone(),
            generator.clone(),
            identity.clone(),
            vacm.clone(),
            config.targets.clone(),
        ));

        Ok(Self {
            config,
            identity,
            counters,
            usm,
            communities,
            vacm,
            mib,
            transport,
            dispatcher,
            generator,
            originator,
            responder: None,
            inbound_rx,
            notification_rx: None,
            tasks: Vec::new(),
            is_running: false,
        })
    }

    /// The initial MIB population: the SNMPv2-MIB system group from
    /// configuration plus the engine's own statistics counters.
    fn build_mib(
        config: &EngineConfig,
        identity: Arc<EngineIdentity>,
        counters: Arc<EngineCounters>,
        usm: Arc<UsmSecurityModel>,
    ) -> MibStore {
        let mut store = MibStore::new();
        let system = &*oids::SYSTEM_GROUP;

        store.register_scalar(
            system.extend(&[1, 0]),
            Value::OctetString(config.general.description.clone().into_bytes()),
            MibAccess::ReadOnly,
        );
        store.register_scalar(
            system.extend(&[2, 0]),
            Value::ObjectIdentifier(Oid::from_slice(&[1, 3, 6, 1, 4, 1, 99999, 1])),
            MibAccess::ReadOnly,
        );
        {
            let identity = identity.clone();
            store.register_dynamic(
                system.extend(&[3, 0]),
                Arc::new(move || Value::TimeTicks(identity.uptime_ticks())),
            );
        }
        store.register_scalar(
            system.extend(&[4, 0]),
            Value::OctetString(config.general.contact.clone().into_bytes()),
            MibAccess::ReadWrite,
        );
        store.register_scalar(
            system.extend(&[5, 0]),
            Value::OctetString(config.general.name.clone().into_bytes()),
            MibAccess::ReadWrite,
        );
        store.register_scalar(
            system.extend(&[6, 0]),
            Value::OctetString(config.general.location.clone().into_bytes()),
            MibAccess::ReadWrite,
        );
        store.register_scalar(system.extend(&[7, 0]), Value::Integer(72), MibAccess::ReadOnly);

        {
            let counters = counters.clone();
            store.register_dynamic(
                oids::SNMP_IN_ASN_PARSE_ERRS.clone(),
                Arc::new(move || {
                    Value::Counter32(
                        counters
                            .in_asn_parse_errs
                            .load(std::sync::atomic::Ordering::Relaxed),
                    )
                }),
            );
        }
        {
            let counters = counters.clone();
            store.register_dynamic(
                oids::SNMP_SILENT_DROPS.clone(),
                Arc::new(move || {
                    Value::Counter32(
                        counters
                            .silent_drops
                            .load(std::sync::atomic::Ordering::Relaxed),
                    )
                }),
            );
        }

        let usm_counters: [(&Oid, fn(&crate::security::UsmStats) -> u32); 6] = [
            (&oids::USM_STATS_UNSUPPORTED_SEC_LEVELS, |s| {
                s.unsupported_sec_levels
                    .load(std::sync::atomic::Ordering::Relaxed)
            }),
            (&oids::USM_STATS_NOT_IN_TIME_WINDOWS, |s| {
                s.not_in_time_windows
                    .load(std::sync::atomic::Ordering::Relaxed)
            }),
            (&oids::USM_STATS_UNKNOWN_USER_NAMES, |s| {
                s.unknown_user_names
                    .load(std::sync::atomic::Ordering::Relaxed)
            }),
            (&oids::USM_STATS_UNKNOWN_ENGINE_IDS, |s| {
                s.unknown_engine_ids
                    .load(std::sync::atomic::Ordering::Relaxed)
            }),
            (&oids::USM_STATS_WRONG_DIGESTS, |s| {
                s.wrong_digests.load(std::sync::atomic::Ordering::Relaxed)
            }),
            (&oids::USM_STATS_DECRYPTION_ERRORS, |s| {
                s.decryption_errors
                    .load(std::sync::atomic::Ordering::Relaxed)
            }),
        ];
        for (oid, read) in usm_counters {
            let usm = usm.clone();
            store.register_dynamic(
                (*oid).clone(),
                Arc::new(move || Value::Counter32(read(&usm.stats))),
            );
        }

        store
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting SNMP engine");

        let v4_addr = self.config.transport.socket_addr_v4()?;
        let bound_v4 = self
            .transport
            .register_udp(oids::TRANSPORT_UDP_IPV4.clone(), v4_addr)
            .await?;
        info!(%bound_v4, "UDP/IPv4 transport listening");
        if let Some(v6_addr) = self.config.transport.socket_addr_v6()? {
            let bound_v6 = self
                .transport
                .register_udp(oids::TRANSPORT_UDP_IPV6.clone(), v6_addr)
                .await?;
            info!(%bound_v6, "UDP/IPv6 transport listening");
        }

        if self.config.agent.enabled {
            let responder = Arc::new(CommandResponder::new(
                self.vacm.clone(),
                self.mib.clone(),
                self.counters.clone(),
                self.config.agent.max_var_binds,
            ));
            responder.register(&self.dispatcher, self.identity.engine_id())?;
            self.responder = Some(responder);
            info!("command responder registered");
        }

        if self.config.notifications.receiver_enabled {
            let (receiver, rx) = NotificationReceiver::new();
            receiver.register(&self.dispatcher)?;
            self.notification_rx = Some(rx);
            info!("notification receiver registered");
        }

        let mut inbound_rx = self
            .inbound_rx
            .take()
            .ok_or_else(|| Error::invalid_state("engine already started"))?;
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(async move {
            while let Some(dgram) = inbound_rx.recv().await {
                dispatcher.process_incoming(dgram).await;
            }
        });
        self.tasks.push(task);

        self.is_running = true;
        info!("SNMP engine started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping SNMP engine");
        self.is_running = false;

        // fail outstanding requests, then stop moving datagrams
        self.dispatcher.cancel_all();
        self.transport.wait_jobs_done().await;
        self.transport.close();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        info!("SNMP engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn identity(&self) -> &Arc<EngineIdentity> {
        &self.identity
    }

    pub fn counters(&self) -> &Arc<EngineCounters> {
        &self.counters
    }

    pub fn usm(&self) -> &Arc<UsmSecurityModel> {
        &self.usm
    }

    pub fn communities(&self) -> &Arc<CommunityStore> {
        &self.communities
    }

    pub fn vacm(&self) -> &Arc<VacmTables> {
        &self.vacm
    }

    pub fn mib(&self) -> &Arc<RwLock<MibStore>> {
        &self.mib
    }

    pub fn transport(&self) -> &Arc<TransportDispatcher> {
        &self.transport
    }

    pub fn dispatcher(&self) -> &Arc<MsgAndPduDispatcher> {
        &self.dispatcher
    }

    pub fn generator(&self) -> &Arc<CommandGenerator> {
        &self.generator
    }

    pub fn notifications(&self) -> &Arc<NotificationOriginator> {
        &self.originator
    }

    /// Stream of received traps/informs; available once after `start`
    /// when the receiver role is enabled.
    pub fn take_notification_receiver(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<ReceivedNotification>> {
        self.notification_rx.take()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for SnmpEngine {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if self.is_running {
            error!("engine dropped while running; outstanding requests cancelled");
            self.dispatcher.cancel_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, LoggingConfig, TargetEntry, TransportConfig};
    use crate::proto::{
        ErrorStatus, MessageProcessingModel, Oid, SecurityLevel, SecurityModel, VarBind,
    };
    use std::net::SocketAddr;
    use tempfile::TempDir;

    fn base_config(dir: &TempDir, name: &str) -> EngineConfig {
        let mut config = EngineConfig::default_config();
        config.general.state_file = dir
            .path()
            .join(format!("{}.json", name))
            .to_string_lossy()
            .into_owned();
        config.general.description = "test-agent".to_string();
        config.transport = TransportConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            bind_address_v6: None,
        };
        config.logging = LoggingConfig {
            level: "debug".to_string(),
            file: None,
            format: LogFormat::Compact,
        };
        config
    }

    fn add_write_access(config: &mut EngineConfig) {
        for entry in &mut config.vacm.access {
            if entry.group_name == "readers" {
                entry.write_view = "internet".to_string();
            }
        }
    }

    async fn start_agent(dir: &TempDir) -> (SnmpEngine, SocketAddr) {
        let mut config = base_config(dir, "agent");
        add_write_access(&mut config);
        let mut engine = SnmpEngine::new(config).unwrap();
        engine.start().await.unwrap();
        // the transport registers synchronously; fetch the bound port
        let addr = engine
            .transport()
            .local_addr(&oids::TRANSPORT_UDP_IPV4)
            .unwrap();
        (engine, addr)
    }

    fn manager_config(dir: &TempDir, agent_addr: SocketAddr) -> EngineConfig {
        let mut config = base_config(dir, "manager");
        config.agent.enabled = false;
        config.targets = vec![
            TargetEntry {
                name: "agent-v2c".to_string(),
                address: agent_addr.to_string(),
                mp_model: MessageProcessingModel::V2c,
                security_model: None,
                security_name: "cs".to_string(),
                security_level: SecurityLevel::NoAuthNoPriv,
                timeout_ms: 2000,
                retries: 1,
            },
            TargetEntry {
                name: "agent-v1".to_string(),
                address: agent_addr.to_string(),
                mp_model: MessageProcessingModel::V1,
                security_model: None,
                security_name: "cs".to_string(),
                security_level: SecurityLevel::NoAuthNoPriv,
                timeout_ms: 2000,
                retries: 1,
            },
            TargetEntry {
                name: "agent-v3".to_string(),
                address: agent_addr.to_string(),
                mp_model: MessageProcessingModel::V3,
                security_model: Some(SecurityModel::Usm),
                security_name: "operator".to_string(),
                security_level: SecurityLevel::AuthPriv,
                timeout_ms: 2000,
                retries: 1,
            },
        ];
        config
    }

    #[tokio::test]
    async fn test_v2c_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (_agent, agent_addr) = start_agent(&dir).await;

        let mut manager = SnmpEngine::new(manager_config(&dir, agent_addr)).unwrap();
        manager.start().await.unwrap();

        let outcome = manager
            .generator()
            .get(
                "agent-v2c",
                &[Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()],
            )
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);
        assert_eq!(outcome.error_index, 0);
        assert_eq!(
            outcome.var_binds[0].value,
            Value::OctetString(b"test-agent".to_vec())
        );
    }

    #[tokio::test]
    async fn test_v1_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (_agent, agent_addr) = start_agent(&dir).await;

        let mut manager = SnmpEngine::new(manager_config(&dir, agent_addr)).unwrap();
        manager.start().await.unwrap();

        let outcome = manager
            .generator()
            .get("agent-v1", &[Oid::parse("1.3.6.1.2.1.1.5.0").unwrap()])
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);
        assert_eq!(
            outcome.var_binds[0].value,
            Value::OctetString(b"ferrosnmp-1".to_vec())
        );
    }

    #[tokio::test]
    async fn test_v3_discovery_and_auth_priv_get() {
        let dir = TempDir::new().unwrap();
        let (agent, agent_addr) = start_agent(&dir).await;

        let mut manager = SnmpEngine::new(manager_config(&dir, agent_addr)).unwrap();
        manager.start().await.unwrap();

        let outcome = manager
            .generator()
            .get("agent-v3", &[Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()])
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);
        assert_eq!(
            outcome.var_binds[0].value,
            Value::OctetString(b"test-agent".to_vec())
        );

        // the discovery probe bumped the agent's unknownEngineIDs stat
        assert!(
            agent
                .usm()
                .stats
                .unknown_engine_ids
                .load(std::sync::atomic::Ordering::Relaxed)
                >= 1
        );

        // second request reuses the discovered engine, no extra probe
        let before = agent
            .usm()
            .stats
            .unknown_engine_ids
            .load(std::sync::atomic::Ordering::Relaxed);
        let outcome = manager
            .generator()
            .get("agent-v3", &[Oid::parse("1.3.6.1.2.1.1.5.0").unwrap()])
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);
        assert_eq!(
            agent
                .usm()
                .stats
                .unknown_engine_ids
                .load(std::sync::atomic::Ordering::Relaxed),
            before
        );
    }

    #[tokio::test]
    async fn test_v2c_set_roundtrip() {
        let dir = TempDir::new().unwrap();
        let (agent, agent_addr) = start_agent(&dir).await;

        let mut manager = SnmpEngine::new(manager_config(&dir, agent_addr)).unwrap();
        manager.start().await.unwrap();

        let outcome = manager
            .generator()
            .set(
                "agent-v2c",
                vec![VarBind::new(
                    Oid::parse("1.3.6.1.2.1.1.6.0").unwrap(),
                    Value::OctetString(b"rack 7".to_vec()),
                )],
            )
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);

        let stored = agent
            .mib()
            .read()
            .await
            .current_value(&Oid::parse("1.3.6.1.2.1.1.6.0").unwrap());
        assert_eq!(stored, Some(Value::OctetString(b"rack 7".to_vec())));
    }

    #[tokio::test]
    async fn test_walk_system_group() {
        let dir = TempDir::new().unwrap();
        let (_agent, agent_addr) = start_agent(&dir).await;

        let mut manager = SnmpEngine::new(manager_config(&dir, agent_addr)).unwrap();
        manager.start().await.unwrap();

        let mut seen = Vec::new();
        manager
            .generator()
            .walk(
                "agent-v2c",
                &Oid::parse("1.3.6.1.2.1.1").unwrap(),
                &crate::apps::WalkOptions::default(),
                |vb| {
                    if !vb.name.starts_with(&Oid::parse("1.3.6.1.2.1.1").unwrap()) {
                        return false;
                    }
                    seen.push(vb.name.clone());
                    true
                },
            )
            .await
            .unwrap();
        // sysDescr through sysServices
        assert!(seen.len() >= 7);
        assert_eq!(seen[0], Oid::parse("1.3.6.1.2.1.1.1.0").unwrap());
    }

    #[tokio::test]
    async fn test_trap_and_inform_delivery() {
        let dir = TempDir::new().unwrap();

        // receiver engine with the notification receiver role
        let mut receiver_config = base_config(&dir, "receiver");
        receiver_config.agent.enabled = false;
        receiver_config.notifications.receiver_enabled = true;
        let mut receiver = SnmpEngine::new(receiver_config).unwrap();
        receiver.start().await.unwrap();
        let receiver_addr = receiver
            .transport()
            .local_addr(&oids::TRANSPORT_UDP_IPV4)
            .unwrap();
        let mut notifications = receiver.take_notification_receiver().unwrap();

        // sender engine with the receiver as notification target
        let mut sender_config = base_config(&dir, "sender");
        sender_config.agent.enabled = false;
        sender_config.targets = vec![TargetEntry {
            name: "nms".to_string(),
            address: receiver_addr.to_string(),
            mp_model: MessageProcessingModel::V2c,
            security_model: None,
            security_name: "cs".to_string(),
            security_level: SecurityLevel::NoAuthNoPriv,
            timeout_ms: 2000,
            retries: 1,
        }];
        sender_config.notifications.targets = vec!["nms".to_string()];
        let mut sender = SnmpEngine::new(sender_config).unwrap();
        sender.start().await.unwrap();

        let cold_start = Oid::parse("1.3.6.1.6.3.1.1.5.1").unwrap();
        sender
            .notifications()
            .send_trap("nms", &cold_start, &[])
            .await
            .unwrap();

        let received = notifications.recv().await.unwrap();
        assert_eq!(received.trap_oid, Some(cold_start.clone()));
        assert!(!received.informed);

        let outcome = sender
            .notifications()
            .send_inform("nms", &cold_start, &[])
            .await
            .unwrap();
        assert_eq!(outcome.error_status, ErrorStatus::NoError);

        let received = notifications.recv().await.unwrap();
        assert!(received.informed);
    }
}
