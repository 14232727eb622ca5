//! ferrosnmp-walk: GETNEXT/GETBULK walk of a remote agent

use clap::Parser;
use tracing::debug;

use ferrosnmp::apps::WalkOptions;
use ferrosnmp::config::{
    AgentConfig, EngineConfig, GeneralConfig, LogFormat, LoggingConfig, TargetEntry,
    TransportConfig,
};
use ferrosnmp::core::SnmpEngine;
use ferrosnmp::proto::{MessageProcessingModel, Oid, SecurityLevel};
use ferrosnmp::security::{AuthProtocol, CommunityEntry, PrivProtocol, UsmUserEntry};
use ferrosnmp::utils::setup_logging;
use ferrosnmp::{Error, Result};

#[derive(Parser)]
#[command(name = "ferrosnmp-walk")]
#[command(about = "Walk an SNMP agent's MIB")]
#[command(version = ferrosnmp::VERSION)]
struct Cli {
    /// Agent address (host:port)
    agent: String,

    /// Starting OID
    #[arg(default_value = "1.3.6.1.2.1")]
    oid: String,

    /// Protocol version: 1, 2c or 3
    #[arg(short = 'v', long, default_value = "2c")]
    version: String,

    /// Community string (v1/v2c)
    #[arg(short, long, default_value = "public")]
    community: String,

    /// USM user name (v3)
    #[arg(short, long)]
    user: Option<String>,

    /// Authentication: md5 or sha, with passphrase (v3)
    #[arg(long)]
    auth_protocol: Option<String>,
    #[arg(long)]
    auth_password: Option<String>,

    /// Privacy: des, 3des, aes128, aes192 or aes256, with passphrase (v3)
    #[arg(long)]
    priv_protocol: Option<String>,
    #[arg(long)]
    priv_password: Option<String>,

    /// Use GETBULK instead of GETNEXT
    #[arg(short, long)]
    bulk: bool,

    /// Max repetitions for GETBULK
    #[arg(long, default_value_t = 10)]
    max_repetitions: u32,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 1500)]
    timeout: u64,

    /// Retry count
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn parse_auth(cli: &Cli) -> Result<(Option<AuthProtocol>, Option<PrivProtocol>, SecurityLevel)> {
    let auth = match cli.auth_protocol.as_deref() {
        None => None,
        Some("md5") => Some(AuthProtocol::HmacMd5),
        Some("sha") => Some(AuthProtocol::HmacSha1),
        Some(other) => return Err(Error::parse(format!("unknown auth protocol: {}", other))),
    };
    let privacy = match cli.priv_protocol.as_deref() {
        None => None,
        Some("des") => Some(PrivProtocol::DesCbc),
        Some("3des") => Some(PrivProtocol::TripleDesEde),
        Some("aes128") => Some(PrivProtocol::AesCfb128),
        Some("aes192") => Some(PrivProtocol::AesCfb192),
        Some("aes256") => Some(PrivProtocol::AesCfb256),
        Some(other) => return Err(Error::parse(format!("unknown priv protocol: {}", other))),
    };
    let level = match (auth.is_some(), privacy.is_some()) {
        (true, true) => SecurityLevel::AuthPriv,
        (true, false) => SecurityLevel::AuthNoPriv,
        (false, false) => SecurityLevel::NoAuthNoPriv,
        (false, true) => return Err(Error::parse("privacy requires authentication")),
    };
    Ok((auth, privacy, level))
}

fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mp_model = match cli.version.as_str() {
        "1" => MessageProcessingModel::V1,
        "2c" => MessageProcessingModel::V2c,
        "3" => MessageProcessingModel::V3,
        other => return Err(Error::parse(format!("unknown version: {}", other))),
    };

    let mut config = EngineConfig::default_config();
    config.general = GeneralConfig {
        engine_id: None,
        state_file: std::env::temp_dir()
            .join(format!("ferrosnmp-walk-{}.json", std::process::id()))
            .to_string_lossy()
            .into_owned(),
        description: "ferrosnmp-walk".to_string(),
        contact: String::new(),
        name: "ferrosnmp-walk".to_string(),
        location: String::new(),
    };
    config.transport = TransportConfig {
        bind_address: "0.0.0.0".to_string(),
        port: 0,
        bind_address_v6: None,
    };
    config.agent = AgentConfig {
        enabled: false,
        max_var_binds: 64,
    };
    config.logging = LoggingConfig {
        level: cli.log_level.clone(),
        file: None,
        format: LogFormat::Compact,
    };
    config.communities = vec![CommunityEntry {
        name: "cli".to_string(),
        community: cli.community.clone(),
        security_name: "cli-user".to_string(),
        context_name: String::new(),
    }];

    let (security_name, security_level) = if mp_model == MessageProcessingModel::V3 {
        let user = cli
            .user
            .clone()
            .ok_or_else(|| Error::parse("v3 requires --user"))?;
        let (auth, privacy, level) = parse_auth(cli)?;
        config.usm_users = vec![UsmUserEntry {
            user_name: user.clone(),
            auth_protocol: auth,
            auth_password: cli.auth_password.clone().unwrap_or_default(),
            priv_protocol: privacy,
            priv_password: cli.priv_password.clone().unwrap_or_default(),
        }];
        (user, level)
    } else {
        config.usm_users = Vec::new();
        ("cli-user".to_string(), SecurityLevel::NoAuthNoPriv)
    };

    config.targets = vec![TargetEntry {
        name: "agent".to_string(),
        address: cli.agent.clone(),
        mp_model,
        security_model: None,
        security_name,
        security_level,
        timeout_ms: cli.timeout,
        retries: cli.retries,
    }];

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    setup_logging(&config.logging)?;

    let start = Oid::parse(&cli.oid)?;
    let mut engine = SnmpEngine::new(config)?;
    engine.start().await?;
    debug!(agent = %cli.agent, %start, "starting walk");

    let options = WalkOptions {
        treat_no_such_name_as_end_of_view: true,
        max_repetitions: cli.max_repetitions,
    };
    let mut count = 0usize;
    let callback = |vb: &ferrosnmp::proto::VarBind| {
        println!("{} = {}", vb.name, vb.value);
        count += 1;
        true
    };

    let result = if cli.bulk {
        engine
            .generator()
            .bulk_walk("agent", &start, &options, callback)
            .await
    } else {
        engine.generator().walk("agent", &start, &options, callback).await
    };

    engine.stop().await?;
    result?;

    eprintln!("{} variables", count);
    Ok(())
}
