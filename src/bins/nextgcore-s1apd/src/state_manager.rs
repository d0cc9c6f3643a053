//! S1AP State Manager
//!
//! Owns the live `S1apState` and IMSI table and checkpoints them into a
//! key/value store. One manager per S1AP task; it is constructed explicitly
//! and handed to whoever needs it.

use std::sync::Arc;

use ogs_core::ogs_assert;
use ogs_dbi::{KvStore, KvStoreError};
use ogs_proto as proto;
use ogs_proto::Message;
use ogs_s1ap::S1apError;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::context::S1AP_TASK_NAME;
use crate::state::{S1apImsiMap, S1apState};
use crate::state_converter::*;

/// Key of the main state snapshot
pub const S1AP_STATE_TABLE: &str = "s1ap_state";
/// Key of the IMSI table snapshot
pub const S1AP_IMSI_MAP_TABLE: &str = "s1ap_imsi_map";

/// Per-UE record key
pub fn ue_state_key(imsi64: u64) -> String {
    format!("IMSI{:015}:{}", imsi64, S1AP_TASK_NAME)
}

/// Pattern matching every per-UE record of the task
pub fn ue_state_key_pattern() -> String {
    format!("IMSI*{}*", S1AP_TASK_NAME)
}

/// State manager errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Store error: {0}")]
    Store(#[from] KvStoreError),
    #[error("Failed to decode {key}: {reason}")]
    Decode { key: String, reason: String },
    #[error("No UE state for IMSI {0:015}")]
    UeNotFound(u64),
    #[error("Persistence disabled")]
    PersistenceDisabled,
    #[error(transparent)]
    S1ap(#[from] S1apError),
}

pub type StateResult<T> = Result<T, StateError>;

/// Content hash of a serialized record
pub fn state_hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Write `bytes` under `key` unless they hash to `last_hash`.
/// Returns whether a write happened; `last_hash` follows successful writes.
pub fn write_if_changed(
    store: &dyn KvStore,
    key: &str,
    bytes: &[u8],
    last_hash: &mut Option<[u8; 32]>,
) -> Result<bool, KvStoreError> {
    let hash = state_hash(bytes);
    if last_hash.as_ref() == Some(&hash) {
        log::trace!("{} unchanged, write skipped", key);
        return Ok(false);
    }
    store.write(key, bytes)?;
    *last_hash = Some(hash);
    Ok(true)
}

fn decode<M: Message + Default>(key: &str, bytes: &[u8]) -> StateResult<M> {
    M::decode(bytes).map_err(|e| StateError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// S1AP state manager
pub struct S1apStateManager {
    store: Arc<dyn KvStore>,
    persist_enabled: bool,
    max_ues: usize,
    max_enbs: usize,
    state_cache: Option<S1apState>,
    imsi_map: Option<S1apImsiMap>,
    last_state_hash: Option<[u8; 32]>,
}

impl S1apStateManager {
    /// Manager bound to `store`; nothing is allocated before `init`
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            persist_enabled: false,
            max_ues: 0,
            max_enbs: 0,
            state_cache: None,
            imsi_map: None,
            last_state_hash: None,
        }
    }

    /// Allocate the tables, then load prior snapshots when persistence is on.
    /// Read failures leave the tables empty.
    pub fn init(&mut self, max_ues: usize, max_enbs: usize, persist_enabled: bool) {
        self.max_ues = max_ues;
        self.max_enbs = max_enbs;
        self.persist_enabled = persist_enabled;
        self.state_cache = Some(S1apState::new(max_ues, max_enbs));
        self.imsi_map = Some(S1apImsiMap::new(max_ues));
        self.last_state_hash = None;

        if persist_enabled {
            if let Err(e) = self.read_state_from_db() {
                log::error!("Failed to read S1AP state, starting empty: {}", e);
                self.state_cache = Some(S1apState::new(max_ues, max_enbs));
            }
            if let Err(e) = self.read_imsi_map_from_db() {
                log::error!("Failed to read S1AP IMSI map, starting empty: {}", e);
                self.imsi_map = Some(S1apImsiMap::new(max_ues));
            }
            match self.read_ue_state_from_db() {
                Ok(n) => log::info!("Restored {} UE state record(s)", n),
                Err(e) => log::error!("Failed to read S1AP UE states: {}", e),
            }
        }
        log::info!(
            "S1AP state initialized (max_ues {}, max_enbs {}, persistence {})",
            max_ues,
            max_enbs,
            if persist_enabled { "on" } else { "off" }
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.state_cache.is_some()
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist_enabled
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Live state; `read_from_db` reloads it from the store first
    pub fn get_state(&mut self, read_from_db: bool) -> &mut S1apState {
        ogs_assert!(self.state_cache.is_some(), "S1AP state accessed before init");
        if read_from_db && self.persist_enabled {
            if let Err(e) = self.read_state_from_db() {
                log::error!("Failed to reload S1AP state: {}", e);
            }
            if let Err(e) = self.read_ue_state_from_db() {
                log::error!("Failed to reload S1AP UE states: {}", e);
            }
        }
        self.state_mut()
    }

    pub fn get_s1ap_imsi_map(&mut self) -> &mut S1apImsiMap {
        ogs_assert!(self.imsi_map.is_some(), "S1AP IMSI map accessed before init");
        self.imsi_map_mut()
    }

    /// Both tables at once, for handlers that touch both
    pub fn tables_mut(&mut self) -> (&mut S1apState, &mut S1apImsiMap) {
        ogs_assert!(self.is_initialized(), "S1AP state accessed before init");
        let max_ues = self.max_ues;
        let max_enbs = self.max_enbs;
        (
            self.state_cache.get_or_insert_with(|| S1apState::new(max_ues, max_enbs)),
            self.imsi_map.get_or_insert_with(|| S1apImsiMap::new(max_ues)),
        )
    }

    fn state_mut(&mut self) -> &mut S1apState {
        let (max_ues, max_enbs) = (self.max_ues, self.max_enbs);
        self.state_cache.get_or_insert_with(|| S1apState::new(max_ues, max_enbs))
    }

    fn imsi_map_mut(&mut self) -> &mut S1apImsiMap {
        let max_ues = self.max_ues;
        self.imsi_map.get_or_insert_with(|| S1apImsiMap::new(max_ues))
    }

    // ------------------------------------------------------------------------
    // Main state
    // ------------------------------------------------------------------------

    /// Checkpoint the main state. Skipped when persistence is off or the
    /// snapshot hashes the same as the last one written.
    pub fn put_state(&mut self) -> StateResult<bool> {
        ogs_assert!(self.is_initialized(), "S1AP state written before init");
        if !self.persist_enabled {
            return Ok(false);
        }
        let bytes = match self.state_cache.as_ref() {
            Some(state) => state_to_proto(state).encode_to_vec(),
            None => return Ok(false),
        };
        let written = write_if_changed(self.store.as_ref(), S1AP_STATE_TABLE, &bytes, &mut self.last_state_hash)
            .map_err(|e| {
                log::error!("Failed to write {}: {}", S1AP_STATE_TABLE, e);
                StateError::from(e)
            })?;
        if written {
            log::debug!("Wrote {} ({} bytes)", S1AP_STATE_TABLE, bytes.len());
        }
        Ok(written)
    }

    fn read_state_from_db(&mut self) -> StateResult<()> {
        let Some(bytes) = self.store.read(S1AP_STATE_TABLE)? else {
            log::debug!("No {} in store", S1AP_STATE_TABLE);
            return Ok(());
        };
        let record: proto::S1apState = decode(S1AP_STATE_TABLE, &bytes)?;
        proto_to_state(&record, self.state_mut());
        self.last_state_hash = Some(state_hash(&bytes));
        Ok(())
    }

    /// Drop every table. Safe to call more than once.
    pub fn free_state(&mut self) {
        let Some(mut state) = self.state_cache.take() else {
            return;
        };
        for assoc_id in state.enbs().keys() {
            if let Ok(enb) = state.enbs.get_mut(&assoc_id) {
                enb.ue_id_coll.clear();
            }
        }
        let _ = state.ues.destroy();
        let _ = state.mmeid2associd.destroy();
        let _ = state.enbs.destroy();
        if let Some(mut imsi_map) = self.imsi_map.take() {
            let _ = imsi_map.mme_ue_id_imsi_htbl.destroy();
        }
        self.last_state_hash = None;
        log::info!("S1AP state freed");
    }

    // ------------------------------------------------------------------------
    // IMSI map
    // ------------------------------------------------------------------------

    /// Write the IMSI table; not change-tracked
    pub fn put_s1ap_imsi_map(&mut self) -> StateResult<()> {
        ogs_assert!(self.imsi_map.is_some(), "S1AP IMSI map written before init");
        if !self.persist_enabled {
            return Ok(());
        }
        let bytes = match self.imsi_map.as_ref() {
            Some(imsi_map) => s1ap_imsi_map_to_proto(imsi_map).encode_to_vec(),
            None => return Ok(()),
        };
        self.store.write(S1AP_IMSI_MAP_TABLE, &bytes).map_err(|e| {
            log::error!("Failed to write {}: {}", S1AP_IMSI_MAP_TABLE, e);
            StateError::from(e)
        })
    }

    fn read_imsi_map_from_db(&mut self) -> StateResult<()> {
        let Some(bytes) = self.store.read(S1AP_IMSI_MAP_TABLE)? else {
            return Ok(());
        };
        let record: proto::S1apImsiMap = decode(S1AP_IMSI_MAP_TABLE, &bytes)?;
        proto_to_s1ap_imsi_map(&record, self.imsi_map_mut());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Per-UE records
    // ------------------------------------------------------------------------

    /// Write the record of the UE attached to `imsi64`
    pub fn put_ue_state(&self, imsi64: u64) -> StateResult<()> {
        if !self.persist_enabled {
            return Ok(());
        }
        let (Some(state), Some(imsi_map)) = (self.state_cache.as_ref(), self.imsi_map.as_ref()) else {
            return Err(StateError::UeNotFound(imsi64));
        };
        let ue = state
            .get_ue_by_imsi(imsi_map, imsi64)
            .ok_or(StateError::UeNotFound(imsi64))?;
        let key = ue_state_key(imsi64);
        self.store.write(&key, &ue_to_proto(ue).encode_to_vec())?;
        log::debug!("Wrote {}", key);
        Ok(())
    }

    pub fn delete_ue_state(&self, imsi64: u64) -> StateResult<bool> {
        if !self.persist_enabled {
            return Ok(false);
        }
        let key = ue_state_key(imsi64);
        let existed = self.store.delete(&key)?;
        log::debug!("Deleted {} (existed: {})", key, existed);
        Ok(existed)
    }

    /// Load every per-UE record into the state, replacing any snapshot entry
    /// for the same UE. All records are decoded before any is applied; one
    /// bad record fails the whole read. Returns the number of UEs restored.
    pub fn read_ue_state_from_db(&mut self) -> StateResult<usize> {
        if !self.persist_enabled {
            return Err(StateError::PersistenceDisabled);
        }
        let keys = self.store.get_keys(&ue_state_key_pattern())?;
        let mut ues = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(bytes) = self.store.read(key)? else {
                continue;
            };
            let record: proto::UeDescription = decode(key, &bytes)?;
            ues.push(proto_to_ue(&record));
        }

        let state = self.state_mut();
        let mut count = 0;
        for ue in ues {
            let comp = ue.comp_s1ap_id;
            state.remove_ue(comp);
            if ue.has_mme_ue_s1ap_id() {
                // The record is newer than a snapshot UE holding the same id
                if let Some(older) = state.find_comp_id_by_mme_id(ue.mme_ue_s1ap_id) {
                    state.remove_ue(older);
                }
            }
            match state.insert_ue(ue) {
                Ok(()) => count += 1,
                Err(e) => log::error!("Failed to restore UE {:#x}: {}", comp, e),
            }
        }
        Ok(count)
    }
}
