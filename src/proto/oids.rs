//! Well-known object identifiers used by the engine itself

use once_cell::sync::Lazy;

use super::smi::Oid;

/// sysUpTime.0 (SNMPv2-MIB)
pub static SYS_UPTIME: Lazy<Oid> = Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 2, 1, 1, 3, 0]));

/// snmpTrapOID.0 (SNMPv2-MIB)
pub static SNMP_TRAP_OID: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0]));

/// snmpTrapEnterprise.0 (SNMPv2-MIB)
pub static SNMP_TRAP_ENTERPRISE: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 1, 1, 4, 3, 0]));

/// snmpTraps: the standard trap subtree coldStart(1) .. egpNeighborLoss(5)
/// generic v1 traps map into (RFC 2576 §3.1).
pub static SNMP_TRAPS: Lazy<Oid> = Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 1, 1, 5]));

/// snmpInASNParseErrs (SNMPv2-MIB)
pub static SNMP_IN_ASN_PARSE_ERRS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 2, 1, 11, 6, 0]));

/// snmpSilentDrops (SNMPv2-MIB)
pub static SNMP_SILENT_DROPS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 2, 1, 11, 31, 0]));

/// snmpUnknownPDUHandlers (SNMP-MPD-MIB)
pub static SNMP_UNKNOWN_PDU_HANDLERS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 11, 2, 1, 3, 0]));

/// snmpUnknownContexts (SNMP-TARGET-MIB)
pub static SNMP_UNKNOWN_CONTEXTS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 12, 1, 5, 0]));

// usmStats family (SNMP-USER-BASED-SM-MIB, RFC 3414 §5)

pub static USM_STATS_UNSUPPORTED_SEC_LEVELS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 1, 0]));

pub static USM_STATS_NOT_IN_TIME_WINDOWS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 2, 0]));

pub static USM_STATS_UNKNOWN_USER_NAMES: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 3, 0]));

pub static USM_STATS_UNKNOWN_ENGINE_IDS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0]));

pub static USM_STATS_WRONG_DIGESTS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 5, 0]));

pub static USM_STATS_DECRYPTION_ERRORS: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 3, 15, 1, 1, 6, 0]));

/// Transport domain: UDP over IPv4 (snmpUDPDomain)
pub static TRANSPORT_UDP_IPV4: Lazy<Oid> = Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 6, 1, 1]));

/// Transport domain: UDP over IPv6 (transportDomainUdpIpv6)
pub static TRANSPORT_UDP_IPV6: Lazy<Oid> =
    Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 2, 1, 100, 1, 2]));

/// The SNMPv2 system group (sysDescr .. sysLocation live below here).
pub static SYSTEM_GROUP: Lazy<Oid> = Lazy::new(|| Oid::from_slice(&[1, 3, 6, 1, 2, 1, 1]));
