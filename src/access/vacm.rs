//! View-based Access Control Model (RFC 3415 §3.2)
//!
//! `is_access_allowed` is a pure function of its inputs and the
//! configured tables; it holds no state of its own.

use serde::{Deserialize, Serialize};

use crate::proto::{Oid, SecurityLevel, SecurityModel};

/// The kind of access a PDU class needs (RFC 3415 viewType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewType {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "notify")]
    Notify,
}

/// Denial reasons (RFC 3415 §3.2 return codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VacmError {
    NoSuchView,
    NoAccessEntry,
    NoGroupName,
    NoSuchContext,
    NotInView,
    OtherError,
}

impl std::fmt::Display for VacmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoSuchView => "noSuchView",
            Self::NoAccessEntry => "noAccessEntry",
            Self::NoGroupName => "noGroupName",
            Self::NoSuchContext => "noSuchContext",
            Self::NotInView => "notInView",
            Self::OtherError => "otherError",
        };
        f.write_str(s)
    }
}

/// vacmSecurityToGroupTable row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntry {
    pub security_model: SecurityModel,
    pub security_name: String,
    pub group_name: String,
}

/// How an access entry's context prefix is compared to the request
/// context (vacmAccessContextMatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextMatch {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "prefix")]
    Prefix,
}

/// vacmAccessTable row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEntry {
    pub group_name: String,
    #[serde(default)]
    pub context_prefix: String,
    #[serde(default = "ContextMatch::exact")]
    pub context_match: ContextMatch,
    /// None matches any security model (wildcard row).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_model: Option<SecurityModel>,
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub read_view: String,
    #[serde(default)]
    pub write_view: String,
    #[serde(default)]
    pub notify_view: String,
}

impl ContextMatch {
    fn exact() -> Self {
        ContextMatch::Exact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewTreeKind {
    #[serde(rename = "included")]
    Included,
    #[serde(rename = "excluded")]
    Excluded,
}

/// vacmViewTreeFamilyTable row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFamilyEntry {
    pub view_name: String,
    pub subtree: Oid,
    /// Family mask, one bit per sub-identifier starting at the MSB of
    /// the first octet; missing trailing bits count as ones. Empty means
    /// plain subtree containment.
    #[serde(default, with = "hex_mask")]
    pub mask: Vec<u8>,
    pub kind: ViewTreeKind,
}

mod hex_mask {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mask: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(mask))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

impl ViewFamilyEntry {
    /// Family match: every masked position of the subtree equals the
    /// corresponding position of `oid`, and `oid` is at least as long.
    fn matches(&self, oid: &Oid) -> bool {
        let subtree = self.subtree.components();
        let oid = oid.components();
        if oid.len() < subtree.len() {
            return false;
        }
        for (i, &arc) in subtree.iter().enumerate() {
            if self.mask_bit(i) && oid[i] != arc {
                return false;
            }
        }
        true
    }

    fn mask_bit(&self, i: usize) -> bool {
        match self.mask.get(i / 8) {
            Some(byte) => byte & (0x80 >> (i % 8)) != 0,
            None => true,
        }
    }
}

/// The three VACM tables plus the set of context names this engine
/// serves (default: the empty context). `contexts` sits first so the
/// TOML serializer emits it before the table arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VacmTables {
    #[serde(default)]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
    #[serde(default)]
    pub views: Vec<ViewFamilyEntry>,
}

impl VacmTables {
    fn context_known(&self, context_name: &str) -> bool {
        context_name.is_empty() || self.contexts.iter().any(|c| c == context_name)
    }

    fn group_of(&self, security_model: SecurityModel, security_name: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.security_model == security_model && g.security_name == security_name)
            .map(|g| g.group_name.as_str())
    }

    /// RFC 3415 §3.2 decision procedure.
    pub fn is_access_allowed(
        &self,
        security_model: SecurityModel,
        security_name: &str,
        security_level: SecurityLevel,
        view_type: ViewType,
        context_name: &str,
        oid: &Oid,
    ) -> Result<(), VacmError> {
        // 3.2 (1)
        if !self.context_known(context_name) {
            return Err(VacmError::NoSuchContext);
        }

        // 3.2 (2)
        let group = self
            .group_of(security_model, security_name)
            .ok_or(VacmError::NoGroupName)?;

        // 3.2 (4): candidate rows, then precedence: exact context over
        // prefix, longer prefix over shorter, higher securityLevel last.
        let entry = self
            .access
            .iter()
            .filter(|e| e.group_name == group)
            .filter(|e| match e.security_model {
                Some(model) => model == security_model,
                None => true,
            })
            .filter(|e| e.security_level <= security_level)
            .filter(|e| match e.context_match {
                ContextMatch::Exact => e.context_prefix == context_name,
                ContextMatch::Prefix => context_name.starts_with(&e.context_prefix),
            })
            .max_by_key(|e| {
                (
                    e.context_match == ContextMatch::Exact,
                    e.context_prefix.len(),
                    e.security_level,
                )
            })
            .ok_or(VacmError::NoAccessEntry)?;

        // 3.2 (5)
        let view_name = match view_type {
            ViewType::Read => &entry.read_view,
            ViewType::Write => &entry.write_view,
            ViewType::Notify => &entry.notify_view,
        };
        if view_name.is_empty() {
            return Err(VacmError::NoSuchView);
        }

        // 3.2 (6): the matching family with the longest subtree wins.
        let family = self
            .views
            .iter()
            .filter(|v| v.view_name == *view_name)
            .filter(|v| v.matches(oid))
            .max_by_key(|v| (v.subtree.len(), v.subtree.clone()));

        match family {
            Some(v) if v.kind == ViewTreeKind::Included => Ok(()),
            Some(_) => Err(VacmError::NotInView),
            None => Err(VacmError::NotInView),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> VacmTables {
        VacmTables {
            groups: vec![GroupEntry {
                security_model: SecurityModel::V2c,
                security_name: "cs".into(),
                group_name: "readers".into(),
            }],
            access: vec![AccessEntry {
                group_name: "readers".into(),
                context_prefix: String::new(),
                context_match: ContextMatch::Exact,
                security_model: None,
                security_level: SecurityLevel::NoAuthNoPriv,
                read_view: "sys".into(),
                write_view: String::new(),
                notify_view: "sys".into(),
            }],
            views: vec![
                ViewFamilyEntry {
                    view_name: "sys".into(),
                    subtree: Oid::parse("1.3.6.1.2.1.1").unwrap(),
                    mask: Vec::new(),
                    kind: ViewTreeKind::Included,
                },
                ViewFamilyEntry {
                    view_name: "sys".into(),
                    subtree: Oid::parse("1.3.6.1.2.1.1.7").unwrap(),
                    mask: Vec::new(),
                    kind: ViewTreeKind::Excluded,
                },
            ],
            contexts: Vec::new(),
        }
    }

    fn check(tables: &VacmTables, oid: &str, view_type: ViewType) -> Result<(), VacmError> {
        tables.is_access_allowed(
            SecurityModel::V2c,
            "cs",
            SecurityLevel::NoAuthNoPriv,
            view_type,
            "",
            &Oid::parse(oid).unwrap(),
        )
    }

    #[test]
    fn test_included_and_excluded_subtrees() {
        let t = tables();
        assert_eq!(check(&t, "1.3.6.1.2.1.1.1.0", ViewType::Read), Ok(()));
        assert_eq!(
            check(&t, "1.3.6.1.2.1.1.7.0", ViewType::Read),
            Err(VacmError::NotInView)
        );
        assert_eq!(
            check(&t, "1.3.6.1.2.1.2.1.0", ViewType::Read),
            Err(VacmError::NotInView)
        );
    }

    #[test]
    fn test_missing_tables() {
        let t = tables();
        assert_eq!(
            check(&t, "1.3.6.1.2.1.1.1.0", ViewType::Write),
            Err(VacmError::NoSuchView)
        );
        assert_eq!(
            t.is_access_allowed(
                SecurityModel::V1,
                "cs",
                SecurityLevel::NoAuthNoPriv,
                ViewType::Read,
                "",
                &Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()
            ),
            Err(VacmError::NoGroupName)
        );
        assert_eq!(
            t.is_access_allowed(
                SecurityModel::V2c,
                "cs",
                SecurityLevel::NoAuthNoPriv,
                ViewType::Read,
                "other-context",
                &Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()
            ),
            Err(VacmError::NoSuchContext)
        );
    }

    #[test]
    fn test_security_level_precedence() {
        let mut t = tables();
        t.groups.push(GroupEntry {
            security_model: SecurityModel::Usm,
            security_name: "operator".into(),
            group_name: "admins".into(),
        });
        t.access.push(AccessEntry {
            group_name: "admins".into(),
            context_prefix: String::new(),
            context_match: ContextMatch::Exact,
            security_model: Some(SecurityModel::Usm),
            security_level: SecurityLevel::AuthNoPriv,
            read_view: "sys".into(),
            write_view: "sys".into(),
            notify_view: String::new(),
        });
        // a noAuthNoPriv request cannot use an authNoPriv row
        assert_eq!(
            t.is_access_allowed(
                SecurityModel::Usm,
                "operator",
                SecurityLevel::NoAuthNoPriv,
                ViewType::Read,
                "",
                &Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()
            ),
            Err(VacmError::NoAccessEntry)
        );
        // an authPriv request can
        assert_eq!(
            t.is_access_allowed(
                SecurityModel::Usm,
                "operator",
                SecurityLevel::AuthPriv,
                ViewType::Write,
                "",
                &Oid::parse("1.3.6.1.2.1.1.4.0").unwrap()
            ),
            Ok(())
        );
    }

    #[test]
    fn test_view_mask_wildcard() {
        // include 1.3.6.1.2.1.2.2.1.*.3 : mask 11111111 101 -> ff a0
        let t = VacmTables {
            groups: vec![GroupEntry {
                security_model: SecurityModel::V2c,
                security_name: "cs".into(),
                group_name: "g".into(),
            }],
            access: vec![AccessEntry {
                group_name: "g".into(),
                context_prefix: String::new(),
                context_match: ContextMatch::Exact,
                security_model: None,
                security_level: SecurityLevel::NoAuthNoPriv,
                read_view: "ifrow".into(),
                write_view: String::new(),
                notify_view: String::new(),
            }],
            views: vec![ViewFamilyEntry {
                view_name: "ifrow".into(),
                subtree: Oid::parse("1.3.6.1.2.1.2.2.1.5.3").unwrap(),
                mask: vec![0xff, 0xa0],
                kind: ViewTreeKind::Included,
            }],
            contexts: Vec::new(),
        };
        // position 9 (the column index 5) is wildcarded
        let allowed = |oid: &str| {
            t.is_access_allowed(
                SecurityModel::V2c,
                "cs",
                SecurityLevel::NoAuthNoPriv,
                ViewType::Read,
                "",
                &Oid::parse(oid).unwrap(),
            )
        };
        assert_eq!(allowed("1.3.6.1.2.1.2.2.1.5.3"), Ok(()));
        assert_eq!(allowed("1.3.6.1.2.1.2.2.1.99.3"), Ok(()));
        assert_eq!(allowed("1.3.6.1.2.1.2.2.1.5.4"), Err(VacmError::NotInView));
    }
}
