//! Community-based security for SNMPv1/v2c (RFC 3584, SNMP-COMMUNITY-MIB)

use serde::{Deserialize, Serialize};

/// snmpCommunityTable row: maps a community string to a security name
/// and the context the request lands in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityEntry {
    /// Administrative row name (snmpCommunityIndex).
    pub name: String,
    pub community: String,
    pub security_name: String,
    #[serde(default)]
    pub context_name: String,
}

/// The community table. Lookups run on every v1/v2c message; the table
/// is small and scanned linearly like its MIB counterpart.
#[derive(Debug, Clone, Default)]
pub struct CommunityStore {
    entries: Vec<CommunityEntry>,
}

impl CommunityStore {
    pub fn new(entries: Vec<CommunityEntry>) -> Self {
        Self { entries }
    }

    pub fn add(&mut self, entry: CommunityEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inbound: community octets to (securityName, contextName).
    pub fn resolve(&self, community: &[u8]) -> Option<&CommunityEntry> {
        self.entries
            .iter()
            .find(|e| e.community.as_bytes() == community)
    }

    /// Outbound: security name back to the community string to put on
    /// the wire.
    pub fn community_for(&self, security_name: &str) -> Option<&CommunityEntry> {
        self.entries
            .iter()
            .find(|e| e.security_name == security_name)
    }
}
