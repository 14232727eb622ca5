//! Durable engine state: snmpEngineBoots survives restarts; losing it
//! forces a fresh snmpEngineID (RFC 3414 §2.5.1)

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;

/// Boots latch at 2^31-1, after which the engine must be re-keyed.
const MAX_BOOTS: u32 = 0x7fff_ffff;

#[derive(Debug, Serialize, Deserialize)]
struct BootRecord {
    engine_id: String,
    boots: u32,
    last_boot: DateTime<Utc>,
}

/// The identity material loaded (or minted) at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub engine_id: Vec<u8>,
    pub boots: u32,
}

/// A fresh engine ID: enterprise number with the RFC 3411 format bit
/// set, format octet 5 (administratively assigned octets), random tail.
pub fn generate_engine_id() -> Vec<u8> {
    let mut engine_id = vec![0x80, 0x01, 0x86, 0x9f, 0x05];
    engine_id.extend(rand::random::<[u8; 8]>());
    engine_id
}

/// Load the boot record, increment the counter and write it back. A
/// missing or corrupt record, or a changed engine ID, restarts the
/// counter at 1 — with a regenerated engine ID when none is configured.
pub fn load_or_create(path: &Path, configured_engine_id: Option<&[u8]>) -> Result<EngineState> {
    let previous = std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<BootRecord>(&contents).ok())
        .and_then(|record| {
            hex::decode(&record.engine_id)
                .ok()
                .map(|engine_id| (engine_id, record.boots))
        });

    let state = match previous {
        Some((stored_id, boots)) => {
            let same_engine = configured_engine_id
                .map(|configured| configured == stored_id.as_slice())
                .unwrap_or(true);
            if same_engine {
                EngineState {
                    engine_id: stored_id,
                    boots: boots.saturating_add(1).min(MAX_BOOTS),
                }
            } else {
                // configuration moved to a different engine identity
                EngineState {
                    engine_id: configured_engine_id
                        .map(|id| id.to_vec())
                        .unwrap_or_else(generate_engine_id),
                    boots: 1,
                }
            }
        }
        None => {
            let engine_id = match configured_engine_id {
                Some(id) => id.to_vec(),
                None => {
                    let engine_id = generate_engine_id();
                    warn!(
                        engine_id = %hex::encode(&engine_id),
                        "no persisted engine state; generated a new snmpEngineID"
                    );
                    engine_id
                }
            };
            EngineState { engine_id, boots: 1 }
        }
    };

    let record = BootRecord {
        engine_id: hex::encode(&state.engine_id),
        boots: state.boots,
        last_boot: Utc::now(),
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
    info!(
        engine_id = %record.engine_id,
        boots = record.boots,
        "engine state persisted"
    );

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_boots_increment_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let first = load_or_create(&path, None).unwrap();
        assert_eq!(first.boots, 1);
        assert!(first.engine_id.len() >= 5 && first.engine_id.len() <= 32);

        let second = load_or_create(&path, None).unwrap();
        assert_eq!(second.boots, 2);
        assert_eq!(second.engine_id, first.engine_id);
    }

    #[test]
    fn test_corrupt_record_regenerates_engine_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let first = load_or_create(&path, None).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let second = load_or_create(&path, None).unwrap();
        assert_eq!(second.boots, 1);
        assert_ne!(second.engine_id, first.engine_id);
    }

    #[test]
    fn test_configured_engine_id_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");

        let configured = b"\x80\x00\x00\x01\x04my-engine";
        let first = load_or_create(&path, Some(configured)).unwrap();
        assert_eq!(first.engine_id, configured);
        assert_eq!(first.boots, 1);

        // same configured identity keeps counting
        let second = load_or_create(&path, Some(configured)).unwrap();
        assert_eq!(second.boots, 2);

        // a different configured identity restarts the counter
        let other = b"\x80\x00\x00\x01\x04other-eng";
        let third = load_or_create(&path, Some(other)).unwrap();
        assert_eq!(third.engine_id, other);
        assert_eq!(third.boots, 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_engine_id(), generate_engine_id());
    }
}
