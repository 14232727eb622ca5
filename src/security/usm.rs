//! User-based Security Model (RFC 3414)

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::crypto::{AuthProtocol, PrivProtocol, AUTH_PARAMS_LEN};
use super::StatusInformation;
use crate::codec;
use crate::error::ErrorIndication;
use crate::proto::{
    oids, HeaderData, ScopedPdu, ScopedPduData, SecurityLevel, UsmSecurityParams, V3Message, Value,
};
use crate::{Error, Result};

/// Acceptable clock drift between peers (RFC 3414 §2.2.3).
pub const TIME_WINDOW_SECS: u32 = 150;

/// usmUserTable row as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsmUserEntry {
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_protocol: Option<AuthProtocol>,
    #[serde(default)]
    pub auth_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priv_protocol: Option<PrivProtocol>,
    #[serde(default)]
    pub priv_password: String,
}

impl UsmUserEntry {
    /// Highest level this user's key material supports.
    pub fn max_security_level(&self) -> SecurityLevel {
        match (self.auth_protocol, self.priv_protocol) {
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            _ => SecurityLevel::NoAuthNoPriv,
        }
    }
}

/// Keys localised to one (engineID, user) pair.
struct LocalizedKeys {
    auth_protocol: Option<AuthProtocol>,
    priv_protocol: Option<PrivProtocol>,
    auth_key: Option<Zeroizing<Vec<u8>>>,
    priv_key: Option<Zeroizing<Vec<u8>>>,
}

/// Cached timeliness state for an authoritative peer engine.
#[derive(Debug, Clone)]
struct PeerTimeline {
    boots: u32,
    time: u32,
    learned_at: Instant,
    latest_received_time: u32,
}

impl PeerTimeline {
    fn estimated_time(&self) -> u32 {
        self.time
            .saturating_add(self.learned_at.elapsed().as_secs() as u32)
    }
}

/// usmStats counter group; OIDs are returned alongside increments so a
/// Report PDU can carry the counter (RFC 3414 §3.2).
#[derive(Debug, Default)]
pub struct UsmStats {
    pub unsupported_sec_levels: AtomicU32,
    pub not_in_time_windows: AtomicU32,
    pub unknown_user_names: AtomicU32,
    pub unknown_engine_ids: AtomicU32,
    pub wrong_digests: AtomicU32,
    pub decryption_errors: AtomicU32,
}

impl UsmStats {
    fn bump(&self, counter: &AtomicU32) -> u32 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn report(&self, indication: ErrorIndication) -> StatusInformation {
        let (oid, value) = match indication {
            ErrorIndication::UnsupportedSecurityLevel => (
                oids::USM_STATS_UNSUPPORTED_SEC_LEVELS.clone(),
                self.bump(&self.unsupported_sec_levels),
            ),
            ErrorIndication::NotInTimeWindow => (
                oids::USM_STATS_NOT_IN_TIME_WINDOWS.clone(),
                self.bump(&self.not_in_time_windows),
            ),
            ErrorIndication::UnknownUserName => (
                oids::USM_STATS_UNKNOWN_USER_NAMES.clone(),
                self.bump(&self.unknown_user_names),
            ),
            ErrorIndication::UnknownEngineId => (
                oids::USM_STATS_UNKNOWN_ENGINE_IDS.clone(),
                self.bump(&self.unknown_engine_ids),
            ),
            ErrorIndication::WrongDigest => (
                oids::USM_STATS_WRONG_DIGESTS.clone(),
                self.bump(&self.wrong_digests),
            ),
            ErrorIndication::DecryptionError => (
                oids::USM_STATS_DECRYPTION_ERRORS.clone(),
                self.bump(&self.decryption_errors),
            ),
            other => return StatusInformation::new(other),
        };
        StatusInformation::with_report(indication, oid, Value::Counter32(value))
    }
}

/// Outgoing message parameters the message processing model supplies.
pub struct UsmOutgoing<'a> {
    /// Authoritative engine ID: the peer's for requests, ours for
    /// responses/reports; empty during discovery.
    pub engine_id: &'a [u8],
    pub engine_boots: u32,
    pub engine_time: u32,
    pub user_name: &'a str,
    pub security_level: SecurityLevel,
}

/// A successfully unsecured inbound message.
#[derive(Debug)]
pub struct UsmVerified {
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub scoped_pdu: ScopedPdu,
    pub peer_engine_id: Vec<u8>,
    pub peer_engine_boots: u32,
    pub peer_engine_time: u32,
}

/// The model itself: user table, per-engine localised key cache, peer
/// timeliness cache and the usmStats group.
pub struct UsmSecurityModel {
    users: DashMap<String, UsmUserEntry>,
    localized: DashMap<(Vec<u8>, String), Arc<LocalizedKeys>>,
    timeline: DashMap<Vec<u8>, PeerTimeline>,
    pub stats: Arc<UsmStats>,
    salt_counter: AtomicU64,
}

impl Default for UsmSecurityModel {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl UsmSecurityModel {
    pub fn new(users: Vec<UsmUserEntry>) -> Self {
        let table = DashMap::new();
        for user in users {
            table.insert(user.user_name.clone(), user);
        }
        Self {
            users: table,
            localized: DashMap::new(),
            timeline: DashMap::new(),
            stats: Arc::new(UsmStats::default()),
            salt_counter: AtomicU64::new(rand::random()),
        }
    }

    pub fn add_user(&self, user: UsmUserEntry) {
        // localisations of a replaced user are stale
        self.localized
            .retain(|(_, name), _| name != &user.user_name);
        self.users.insert(user.user_name.clone(), user);
    }

    pub fn user(&self, name: &str) -> Option<UsmUserEntry> {
        self.users.get(name).map(|u| u.value().clone())
    }

    /// Record an authoritative peer's timeliness values; non-authoritative
    /// engines record without validation (RFC 3414 §3.2.7b).
    pub fn note_peer_times(&self, engine_id: &[u8], boots: u32, time: u32) {
        let mut entry = self
            .timeline
            .entry(engine_id.to_vec())
            .or_insert_with(|| PeerTimeline {
                boots,
                time,
                learned_at: Instant::now(),
                latest_received_time: time,
            });
        if boots > entry.boots || (boots == entry.boots && time > entry.latest_received_time) {
            entry.boots = boots;
            entry.time = time;
            entry.learned_at = Instant::now();
            entry.latest_received_time = time;
        }
    }

    /// Current (boots, estimated time) for a known peer.
    pub fn peer_times(&self, engine_id: &[u8]) -> Option<(u32, u32)> {
        self.timeline
            .get(engine_id)
            .map(|t| (t.boots, t.estimated_time()))
    }

    pub fn knows_engine(&self, engine_id: &[u8]) -> bool {
        self.timeline.contains_key(engine_id)
    }

    fn next_salt(&self) -> u64 {
        self.salt_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn localized_keys(&self, engine_id: &[u8], user_name: &str) -> Result<Arc<LocalizedKeys>> {
        let cache_key = (engine_id.to_vec(), user_name.to_string());
        if let Some(keys) = self.localized.get(&cache_key) {
            return Ok(keys.value().clone());
        }
        let user = self
            .user(user_name)
            .ok_or_else(|| Error::security(format!("unknown USM user: {}", user_name)))?;
        let auth_key = match user.auth_protocol {
            Some(proto) => Some(proto.localize_password(user.auth_password.as_bytes(), engine_id)?),
            None => None,
        };
        let priv_key = match (user.auth_protocol, user.priv_protocol) {
            (Some(auth), Some(proto)) => {
                Some(proto.localize_password(auth, user.priv_password.as_bytes(), engine_id)?)
            }
            _ => None,
        };
        let keys = Arc::new(LocalizedKeys {
            auth_protocol: user.auth_protocol,
            priv_protocol: user.priv_protocol,
            auth_key,
            priv_key,
        });
        self.localized.insert(cache_key, keys.clone());
        Ok(keys)
    }

    /// RFC 3414 §3.1: secure an outgoing message, encrypting and
    /// authenticating per the requested level.
    pub fn generate_msg(
        &self,
        header: HeaderData,
        outgoing: &UsmOutgoing<'_>,
        scoped_pdu: &ScopedPdu,
    ) -> Result<Vec<u8>> {
        let level = outgoing.security_level;

        if level == SecurityLevel::NoAuthNoPriv {
            let params = UsmSecurityParams {
                authoritative_engine_id: outgoing.engine_id.to_vec(),
                authoritative_engine_boots: outgoing.engine_boots,
                authoritative_engine_time: outgoing.engine_time,
                user_name: outgoing.user_name.as_bytes().to_vec(),
                auth_params: Vec::new(),
                priv_params: Vec::new(),
            };
            let (sp_octets, _) = codec::encode_usm_security_params(&params)?;
            let msg = V3Message {
                header,
                security_params: sp_octets,
                data: ScopedPduData::Plaintext(scoped_pdu.clone()),
            };
            let (octets, _) = codec::encode_v3_message(&msg)?;
            return Ok(octets);
        }

        let keys = self.localized_keys(outgoing.engine_id, outgoing.user_name)?;
        let auth_protocol = keys
            .auth_protocol
            .ok_or_else(|| Error::security("securityLevel requires an auth protocol"))?;
        let auth_key = keys
            .auth_key
            .as_ref()
            .ok_or_else(|| Error::security("no localized auth key"))?;

        let (data, priv_params) = if level.requires_priv() {
            let priv_protocol = keys
                .priv_protocol
                .ok_or_else(|| Error::security("securityLevel requires a priv protocol"))?;
            let priv_key = keys
                .priv_key
                .as_ref()
                .ok_or_else(|| Error::security("no localized priv key"))?;
            let plaintext = codec::encode_scoped_pdu(scoped_pdu)?;
            let (ciphertext, salt) = priv_protocol.encrypt(
                priv_key,
                outgoing.engine_boots,
                outgoing.engine_time,
                self.next_salt(),
                &plaintext,
            )?;
            (ScopedPduData::Encrypted(ciphertext), salt)
        } else {
            (ScopedPduData::Plaintext(scoped_pdu.clone()), Vec::new())
        };

        let params = UsmSecurityParams {
            authoritative_engine_id: outgoing.engine_id.to_vec(),
            authoritative_engine_boots: outgoing.engine_boots,
            authoritative_engine_time: outgoing.engine_time,
            user_name: outgoing.user_name.as_bytes().to_vec(),
            auth_params: vec![0u8; AUTH_PARAMS_LEN],
            priv_params,
        };
        let (sp_octets, auth_offset) = codec::encode_usm_security_params(&params)?;
        let msg = V3Message {
            header,
            security_params: sp_octets,
            data,
        };
        let (mut octets, sp_value_offset) = codec::encode_v3_message(&msg)?;

        let digest_at = sp_value_offset + auth_offset;
        let digest = auth_protocol.sign(auth_key, &octets)?;
        octets[digest_at..digest_at + AUTH_PARAMS_LEN].copy_from_slice(&digest);
        Ok(octets)
    }

    /// RFC 3414 §3.2: authenticate, time-check and decrypt an inbound
    /// message.
    ///
    /// The outer `Err` is a malformed message (caller counts it as a
    /// parse error and drops); the inner `Err` is a security failure
    /// with Report material.
    pub fn process_incoming(
        &self,
        raw_msg: &[u8],
        msg: &V3Message,
        local_engine_id: &[u8],
        local_boots: u32,
        local_time: u32,
    ) -> Result<std::result::Result<UsmVerified, StatusInformation>> {
        let params = codec::decode_usm_security_params(&msg.security_params)?;
        let level = match SecurityLevel::from_flag_bits(msg.header.msg_flags) {
            Some(level) => level,
            None => return Err(Error::decode("invalid msgFlags: priv without auth")),
        };

        let engine_id = params.authoritative_engine_id.clone();
        if engine_id.is_empty() {
            // engine discovery probe (RFC 3414 §4)
            debug!("USM engine discovery from peer");
            return Ok(Err(self.stats.report(ErrorIndication::UnknownEngineId)));
        }

        let authoritative = engine_id == local_engine_id;
        if !authoritative {
            // non-authoritative side records the peer clock without
            // validation
            self.note_peer_times(
                &engine_id,
                params.authoritative_engine_boots,
                params.authoritative_engine_time,
            );
        }

        let user_name = String::from_utf8_lossy(&params.user_name).into_owned();
        if level == SecurityLevel::NoAuthNoPriv {
            let scoped_pdu = match &msg.data {
                ScopedPduData::Plaintext(scoped) => scoped.clone(),
                ScopedPduData::Encrypted(_) => {
                    return Err(Error::decode("encrypted scoped PDU at noAuthNoPriv"))
                }
            };
            if self.user(&user_name).is_none() && authoritative {
                return Ok(Err(self.stats.report(ErrorIndication::UnknownUserName)));
            }
            return Ok(Ok(UsmVerified {
                security_name: user_name,
                security_level: level,
                scoped_pdu,
                peer_engine_id: engine_id,
                peer_engine_boots: params.authoritative_engine_boots,
                peer_engine_time: params.authoritative_engine_time,
            }));
        }

        let user = match self.user(&user_name) {
            Some(user) => user,
            None => return Ok(Err(self.stats.report(ErrorIndication::UnknownUserName))),
        };
        if level > user.max_security_level() {
            return Ok(Err(self
                .stats
                .report(ErrorIndication::UnsupportedSecurityLevel)));
        }
        let keys = self.localized_keys(&engine_id, &user.user_name)?;

        // authentication over the whole message with zeroed digest field
        let auth_protocol = match keys.auth_protocol {
            Some(proto) => proto,
            None => {
                return Ok(Err(self
                    .stats
                    .report(ErrorIndication::UnsupportedSecurityLevel)))
            }
        };
        let auth_key = keys
            .auth_key
            .as_ref()
            .ok_or_else(|| Error::security("no localized auth key"))?;
        let auth_range = codec::locate_usm_auth_params(raw_msg)?;
        if auth_range.len() != AUTH_PARAMS_LEN {
            return Ok(Err(self.stats.report(ErrorIndication::WrongDigest)));
        }
        let mut zeroed = raw_msg.to_vec();
        zeroed[auth_range.clone()].fill(0);
        if !auth_protocol.verify(auth_key, &zeroed, &params.auth_params)? {
            warn!(user = %user_name, "USM digest verification failed");
            return Ok(Err(self.stats.report(ErrorIndication::WrongDigest)));
        }

        // timeliness only matters once the message is authentic
        if authoritative {
            let drift = params.authoritative_engine_time.abs_diff(local_time);
            if params.authoritative_engine_boots != local_boots || drift > TIME_WINDOW_SECS {
                return Ok(Err(self.stats.report(ErrorIndication::NotInTimeWindow)));
            }
        }

        let scoped_pdu = if level.requires_priv() {
            let priv_protocol = match keys.priv_protocol {
                Some(proto) => proto,
                None => {
                    return Ok(Err(self
                        .stats
                        .report(ErrorIndication::UnsupportedSecurityLevel)))
                }
            };
            let priv_key = keys
                .priv_key
                .as_ref()
                .ok_or_else(|| Error::security("no localized priv key"))?;
            let ciphertext = match &msg.data {
                ScopedPduData::Encrypted(ct) => ct,
                ScopedPduData::Plaintext(_) => {
                    return Err(Error::decode("plaintext scoped PDU at authPriv"))
                }
            };
            let plaintext = match priv_protocol.decrypt(
                priv_key,
                params.authoritative_engine_boots,
                params.authoritative_engine_time,
                &params.priv_params,
                ciphertext,
            ) {
                Ok(plaintext) => plaintext,
                Err(_) => return Ok(Err(self.stats.report(ErrorIndication::DecryptionError))),
            };
            match codec::decode_scoped_pdu(&plaintext) {
                Ok(scoped) => scoped,
                Err(_) => return Ok(Err(self.stats.report(ErrorIndication::DecryptionError))),
            }
        } else {
            match &msg.data {
                ScopedPduData::Plaintext(scoped) => scoped.clone(),
                ScopedPduData::Encrypted(_) => {
                    return Err(Error::decode("encrypted scoped PDU at authNoPriv"))
                }
            }
        };

        Ok(Ok(UsmVerified {
            security_name: user_name,
            security_level: level,
            scoped_pdu,
            peer_engine_id: engine_id,
            peer_engine_boots: params.authoritative_engine_boots,
            peer_engine_time: params.authoritative_engine_time,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::msg::{MSG_FLAG_AUTH, MSG_FLAG_PRIV, MSG_FLAG_REPORTABLE};
    use crate::proto::{Oid, Pdu, PduType, VarBind};

    const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x04test";

    fn users() -> Vec<UsmUserEntry> {
        vec![
            UsmUserEntry {
                user_name: "usr-none".into(),
                auth_protocol: None,
                auth_password: String::new(),
                priv_protocol: None,
                priv_password: String::new(),
            },
            UsmUserEntry {
                user_name: "usr-md5".into(),
                auth_protocol: Some(AuthProtocol::HmacMd5),
                auth_password: "authkey1".into(),
                priv_protocol: None,
                priv_password: String::new(),
            },
            UsmUserEntry {
                user_name: "usr-sha-aes".into(),
                auth_protocol: Some(AuthProtocol::HmacSha1),
                auth_password: "authkey1".into(),
                priv_protocol: Some(PrivProtocol::AesCfb128),
                priv_password: "privkey1".into(),
            },
        ]
    }

    fn scoped_pdu() -> ScopedPdu {
        ScopedPdu {
            context_engine_id: ENGINE_ID.to_vec(),
            context_name: Vec::new(),
            pdu: Pdu::new(
                PduType::GetRequest,
                1001,
                vec![VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap())],
            ),
        }
    }

    fn header(flags: u8) -> HeaderData {
        HeaderData {
            msg_id: 0x2000,
            msg_max_size: 65507,
            msg_flags: flags,
            security_model: 3,
        }
    }

    fn roundtrip(
        usm: &UsmSecurityModel,
        user: &str,
        level: SecurityLevel,
        flags: u8,
    ) -> std::result::Result<UsmVerified, StatusInformation> {
        let octets = usm
            .generate_msg(
                header(flags),
                &UsmOutgoing {
                    engine_id: ENGINE_ID,
                    engine_boots: 5,
                    engine_time: 1000,
                    user_name: user,
                    security_level: level,
                },
                &scoped_pdu(),
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        usm.process_incoming(&octets, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
    }

    #[test]
    fn test_noauth_roundtrip() {
        let usm = UsmSecurityModel::new(users());
        let verified = roundtrip(
            &usm,
            "usr-none",
            SecurityLevel::NoAuthNoPriv,
            MSG_FLAG_REPORTABLE,
        )
        .unwrap();
        assert_eq!(verified.security_name, "usr-none");
        assert_eq!(verified.security_level, SecurityLevel::NoAuthNoPriv);
        assert_eq!(verified.scoped_pdu, scoped_pdu());
    }

    #[test]
    fn test_auth_roundtrip() {
        let usm = UsmSecurityModel::new(users());
        let verified = roundtrip(
            &usm,
            "usr-md5",
            SecurityLevel::AuthNoPriv,
            MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE,
        )
        .unwrap();
        assert_eq!(verified.security_level, SecurityLevel::AuthNoPriv);
        assert_eq!(verified.scoped_pdu, scoped_pdu());
    }

    #[test]
    fn test_auth_priv_roundtrip() {
        let usm = UsmSecurityModel::new(users());
        let verified = roundtrip(
            &usm,
            "usr-sha-aes",
            SecurityLevel::AuthPriv,
            MSG_FLAG_AUTH | MSG_FLAG_PRIV | MSG_FLAG_REPORTABLE,
        )
        .unwrap();
        assert_eq!(verified.security_level, SecurityLevel::AuthPriv);
        assert_eq!(verified.scoped_pdu, scoped_pdu());
    }

    #[test]
    fn test_wrong_digest_flagged_and_counted() {
        let usm = UsmSecurityModel::new(users());
        let octets = usm
            .generate_msg(
                header(MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE),
                &UsmOutgoing {
                    engine_id: ENGINE_ID,
                    engine_boots: 5,
                    engine_time: 1000,
                    user_name: "usr-md5",
                    security_level: SecurityLevel::AuthNoPriv,
                },
                &scoped_pdu(),
            )
            .unwrap();

        // flip the last digest byte
        let range = codec::locate_usm_auth_params(&octets).unwrap();
        let mut tampered = octets.clone();
        tampered[range.end - 1] ^= 0x01;

        let msg = match codec::decode_message(&tampered).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        let status = usm
            .process_incoming(&tampered, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
            .unwrap_err();
        assert_eq!(status.error_indication, ErrorIndication::WrongDigest);
        assert_eq!(status.oid, Some(oids::USM_STATS_WRONG_DIGESTS.clone()));
        assert_eq!(status.value, Some(Value::Counter32(1)));
        assert_eq!(usm.stats.wrong_digests.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_not_in_time_window() {
        let usm = UsmSecurityModel::new(users());
        let octets = usm
            .generate_msg(
                header(MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE),
                &UsmOutgoing {
                    engine_id: ENGINE_ID,
                    engine_boots: 4, // stale boots
                    engine_time: 1000,
                    user_name: "usr-md5",
                    security_level: SecurityLevel::AuthNoPriv,
                },
                &scoped_pdu(),
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        let status = usm
            .process_incoming(&octets, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
            .unwrap_err();
        assert_eq!(status.error_indication, ErrorIndication::NotInTimeWindow);

        // drift beyond 150 seconds also fails
        let octets = usm
            .generate_msg(
                header(MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE),
                &UsmOutgoing {
                    engine_id: ENGINE_ID,
                    engine_boots: 5,
                    engine_time: 700,
                    user_name: "usr-md5",
                    security_level: SecurityLevel::AuthNoPriv,
                },
                &scoped_pdu(),
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        let status = usm
            .process_incoming(&octets, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
            .unwrap_err();
        assert_eq!(status.error_indication, ErrorIndication::NotInTimeWindow);
    }

    #[test]
    fn test_unknown_engine_discovery() {
        let usm = UsmSecurityModel::new(users());
        let octets = usm
            .generate_msg(
                header(MSG_FLAG_REPORTABLE),
                &UsmOutgoing {
                    engine_id: b"",
                    engine_boots: 0,
                    engine_time: 0,
                    user_name: "",
                    security_level: SecurityLevel::NoAuthNoPriv,
                },
                &scoped_pdu(),
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        let status = usm
            .process_incoming(&octets, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
            .unwrap_err();
        assert_eq!(status.error_indication, ErrorIndication::UnknownEngineId);
        assert_eq!(status.oid, Some(oids::USM_STATS_UNKNOWN_ENGINE_IDS.clone()));
    }

    #[test]
    fn test_unknown_user() {
        let usm = UsmSecurityModel::new(users());
        let stranger = UsmSecurityModel::new(vec![UsmUserEntry {
            user_name: "stranger".into(),
            auth_protocol: Some(AuthProtocol::HmacMd5),
            auth_password: "whatever1".into(),
            priv_protocol: None,
            priv_password: String::new(),
        }]);
        let octets = stranger
            .generate_msg(
                header(MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE),
                &UsmOutgoing {
                    engine_id: ENGINE_ID,
                    engine_boots: 5,
                    engine_time: 1000,
                    user_name: "stranger",
                    security_level: SecurityLevel::AuthNoPriv,
                },
                &scoped_pdu(),
            )
            .unwrap();
        let msg = match codec::decode_message(&octets).unwrap() {
            crate::proto::SnmpMessage::V3(msg) => msg,
            other => panic!("unexpected message: {:?}", other),
        };
        let status = usm
            .process_incoming(&octets, &msg, ENGINE_ID, 5, 1000)
            .unwrap()
            .unwrap_err();
        assert_eq!(status.error_indication, ErrorIndication::UnknownUserName);
    }

    #[test]
    fn test_peer_timeline_cache() {
        let usm = UsmSecurityModel::new(users());
        assert!(!usm.knows_engine(b"peer-1"));
        usm.note_peer_times(b"peer-1", 2, 100);
        assert!(usm.knows_engine(b"peer-1"));
        let (boots, time) = usm.peer_times(b"peer-1").unwrap();
        assert_eq!(boots, 2);
        assert!(time >= 100);

        // stale update is ignored
        usm.note_peer_times(b"peer-1", 1, 50);
        assert_eq!(usm.peer_times(b"peer-1").unwrap().0, 2);

        // reboot advances
        usm.note_peer_times(b"peer-1", 3, 10);
        assert_eq!(usm.peer_times(b"peer-1").unwrap().0, 3);
    }
}
