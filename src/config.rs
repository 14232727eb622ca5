//! Configuration management for the ferrosnmp engine

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::access::VacmTables;
use crate::proto::{MessageProcessingModel, SecurityLevel, SecurityModel};
use crate::security::{CommunityEntry, UsmUserEntry};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub general: GeneralConfig,
    pub transport: TransportConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub communities: Vec<CommunityEntry>,
    #[serde(default)]
    pub usm_users: Vec<UsmUserEntry>,
    #[serde(default)]
    pub vacm: VacmTables,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
    #[serde(default)]
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Fixed snmpEngineID as hex; omitted = persisted/generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,
    /// Where snmpEngineBoots lives between restarts.
    pub state_file: String,
    pub description: String,
    pub contact: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub bind_address: String,
    pub port: u16,
    /// Optional IPv6 listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address_v6: Option<String>,
}

impl TransportConfig {
    pub fn socket_addr_v4(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| Error::parse(format!("invalid bind address: {}", self.bind_address)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn socket_addr_v6(&self) -> Result<Option<SocketAddr>> {
        match &self.bind_address_v6 {
            Some(addr) => {
                let ip: IpAddr = addr
                    .parse()
                    .map_err(|_| Error::parse(format!("invalid v6 bind address: {}", addr)))?;
                Ok(Some(SocketAddr::new(ip, self.port)))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    /// GETBULK response ceiling (RFC 3413 command responder).
    pub max_var_binds: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_var_binds: 64,
        }
    }
}

/// snmpTargetAddrTable + snmpTargetParamsTable rolled into one row: a
/// named destination with its messaging and security parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub name: String,
    pub address: String,
    pub mp_model: MessageProcessingModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_model: Option<SecurityModel>,
    pub security_name: String,
    #[serde(default = "TargetEntry::default_security_level")]
    pub security_level: SecurityLevel,
    #[serde(default = "TargetEntry::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "TargetEntry::default_retries")]
    pub retries: u32,
}

impl TargetEntry {
    fn default_security_level() -> SecurityLevel {
        SecurityLevel::NoAuthNoPriv
    }

    fn default_timeout_ms() -> u64 {
        1500
    }

    fn default_retries() -> u32 {
        3
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|_| Error::parse(format!("invalid target address: {}", self.address)))
    }

    /// The security model implied by the messaging model when none is
    /// pinned explicitly.
    pub fn effective_security_model(&self) -> SecurityModel {
        match self.security_model {
            Some(model) => model,
            None => match self.mp_model {
                MessageProcessingModel::V1 => SecurityModel::V1,
                MessageProcessingModel::V2c => SecurityModel::V2c,
                MessageProcessingModel::V3 => SecurityModel::Usm,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Names of target entries that receive traps/informs.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Send InformRequest instead of Trap to these targets.
    #[serde(default)]
    pub inform_targets: Vec<String>,
    /// Accept inbound notifications (trap receiver role).
    #[serde(default)]
    pub receiver_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| Error::parse(format!("Invalid TOML: {}", e)))?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let mut settings = config::Config::builder();

        // Load from environment variables with FERROSNMP_ prefix
        settings = settings.add_source(config::Environment::with_prefix("FERROSNMP").separator("_"));

        let config = settings.build()?;
        let engine_config = config.try_deserialize()?;
        Ok(engine_config)
    }

    pub fn engine_id_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.general.engine_id {
            Some(hex_id) => {
                let bytes = hex::decode(hex_id)
                    .map_err(|_| Error::parse("engine_id must be hex octets"))?;
                if bytes.len() < 5 || bytes.len() > 32 {
                    return Err(Error::parse("engine_id must be 5..=32 octets"));
                }
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine_id_bytes()?;
        self.transport.socket_addr_v4()?;
        self.transport.socket_addr_v6()?;

        for user in &self.usm_users {
            if user.priv_protocol.is_some() && user.auth_protocol.is_none() {
                return Err(Error::parse(format!(
                    "USM user {} has privacy without authentication",
                    user.user_name
                )));
            }
            if user.auth_protocol.is_some() && user.auth_password.len() < 8 {
                return Err(Error::parse(format!(
                    "USM user {} auth passphrase shorter than 8 octets",
                    user.user_name
                )));
            }
            if user.priv_protocol.is_some() && user.priv_password.len() < 8 {
                return Err(Error::parse(format!(
                    "USM user {} priv passphrase shorter than 8 octets",
                    user.user_name
                )));
            }
        }

        // every target's securityName must resolve in the security
        // model it selects
        for target in &self.targets {
            target.socket_addr()?;
            let resolves = match target.effective_security_model() {
                SecurityModel::Usm => self
                    .usm_users
                    .iter()
                    .any(|u| u.user_name == target.security_name),
                SecurityModel::V1 | SecurityModel::V2c => self
                    .communities
                    .iter()
                    .any(|c| c.security_name == target.security_name),
            };
            if !resolves {
                return Err(Error::parse(format!(
                    "target {} references unknown securityName {}",
                    target.name, target.security_name
                )));
            }
            if target.mp_model == MessageProcessingModel::V3
                && target.security_level > SecurityLevel::NoAuthNoPriv
            {
                let user = self
                    .usm_users
                    .iter()
                    .find(|u| u.user_name == target.security_name);
                if let Some(user) = user {
                    if target.security_level > user.max_security_level() {
                        return Err(Error::parse(format!(
                            "target {} requests {} but user {} cannot provide it",
                            target.name,
                            target.security_level,
                            user.user_name
                        )));
                    }
                }
            }
        }

        for name in self
            .notifications
            .targets
            .iter()
            .chain(self.notifications.inform_targets.iter())
        {
            if !self.targets.iter().any(|t| &t.name == name) {
                return Err(Error::parse(format!(
                    "notification target {} is not a configured target",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn default_config() -> Self {
        use crate::access::{
            AccessEntry, ContextMatch, GroupEntry, ViewFamilyEntry, ViewTreeKind,
        };
        use crate::proto::Oid;
        use crate::security::{AuthProtocol, PrivProtocol};

        Self {
            general: GeneralConfig {
                engine_id: None,
                state_file: "/var/lib/ferrosnmp/engine.json".to_string(),
                description: "ferrosnmp SNMP engine".to_string(),
                contact: "admin@ferrosnmp.local".to_string(),
                name: "ferrosnmp-1".to_string(),
                location: "Network Operations Center".to_string(),
            },
            transport: TransportConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 161,
                bind_address_v6: None,
            },
            agent: AgentConfig {
                enabled: true,
                max_var_binds: 64,
            },
            communities: vec![CommunityEntry {
                name: "default-read".to_string(),
                community: "public".to_string(),
                security_name: "cs".to_string(),
                context_name: String::new(),
            }],
            usm_users: vec![UsmUserEntry {
                user_name: "operator".to_string(),
                auth_protocol: Some(AuthProtocol::HmacSha1),
                auth_password: "authpass1".to_string(),
                priv_protocol: Some(PrivProtocol::AesCfb128),
                priv_password: "privpass1".to_string(),
            }],
            vacm: VacmTables {
                groups: vec![
                    GroupEntry {
                        security_model: SecurityModel::V1,
                        security_name: "cs".to_string(),
                        group_name: "readers".to_string(),
                    },
                    GroupEntry {
                        security_model: SecurityModel::V2c,
                        security_name: "cs".to_string(),
                        group_name: "readers".to_string(),
                    },
                    GroupEntry {
                        security_model: SecurityModel::Usm,
                        security_name: "operator".to_string(),
                        group_name: "admins".to_string(),
                    },
                ],
                access: vec![
                    AccessEntry {
                        group_name: "readers".to_string(),
                        context_prefix: String::new(),
                        context_match: ContextMatch::Exact,
                        security_model: None,
                        security_level: SecurityLevel::NoAuthNoPriv,
                        read_view: "internet".to_string(),
                        write_view: String::new(),
                        notify_view: "internet".to_string(),
                    },
                    AccessEntry {
                        group_name: "admins".to_string(),
                        context_prefix: String::new(),
                        context_match: ContextMatch::Exact,
                        security_model: Some(SecurityModel::Usm),
                        security_level: SecurityLevel::AuthNoPriv,
                        read_view: "internet".to_string(),
                        write_view: "internet".to_string(),
                        notify_view: "internet".to_string(),
                    },
                ],
                views: vec![ViewFamilyEntry {
                    view_name: "internet".to_string(),
                    subtree: Oid::from_slice(&[1, 3, 6, 1]),
                    mask: Vec::new(),
                    kind: ViewTreeKind::Included,
                }],
                contexts: Vec::new(),
            },
            targets: Vec::new(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
                format: LogFormat::Full,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = EngineConfig::default_config();
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig::default_config();
        let toml_text = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_text).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.transport.port, 161);
        assert_eq!(parsed.communities[0].community, "public");
    }

    #[test]
    fn test_priv_without_auth_rejected() {
        let mut config = EngineConfig::default_config();
        config.usm_users[0].auth_protocol = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unresolvable_target_security_name() {
        let mut config = EngineConfig::default_config();
        config.targets.push(TargetEntry {
            name: "router".to_string(),
            address: "192.0.2.1:161".to_string(),
            mp_model: MessageProcessingModel::V2c,
            security_model: None,
            security_name: "nobody".to_string(),
            security_level: SecurityLevel::NoAuthNoPriv,
            timeout_ms: 1000,
            retries: 1,
        });
        assert!(config.validate().is_err());

        config.targets[0].security_name = "cs".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_target_level_beyond_user_capability() {
        let mut config = EngineConfig::default_config();
        config.usm_users[0].priv_protocol = None;
        config.targets.push(TargetEntry {
            name: "secure-agent".to_string(),
            address: "192.0.2.2:161".to_string(),
            mp_model: MessageProcessingModel::V3,
            security_model: None,
            security_name: "operator".to_string(),
            security_level: SecurityLevel::AuthPriv,
            timeout_ms: 1000,
            retries: 1,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_id_hex_validation() {
        let mut config = EngineConfig::default_config();
        config.general.engine_id = Some("80001f8804616263".to_string());
        assert!(config.validate().is_ok());
        config.general.engine_id = Some("80".to_string());
        assert!(config.validate().is_err());
        config.general.engine_id = Some("not-hex".to_string());
        assert!(config.validate().is_err());
    }
}
