//! S1AP task state
//!
//! `S1apState` owns the eNB and UE tables. The MME UE id index and every
//! eNB's UE id collection are derived lookups; all mutation goes through the
//! methods below so the tables never disagree.

use ogs_core::KeyedMap;
use ogs_s1ap::{S1apError, S1apResult, INVALID_ENB_ID, INVALID_MME_UE_S1AP_ID};

use crate::context::*;

/// Aggregate S1AP state
#[derive(Debug, Clone, PartialEq)]
pub struct S1apState {
    /// sctp_assoc_id -> eNB
    pub(crate) enbs: KeyedMap<u32, EnbDescription>,
    /// comp_s1ap_id -> UE
    pub(crate) ues: KeyedMap<u64, UeDescription>,
    /// mme_ue_s1ap_id -> sctp_assoc_id
    pub(crate) mmeid2associd: KeyedMap<u32, u32>,
    /// eNBs that completed S1 Setup and are READY or SHUTDOWN
    pub(crate) num_enbs: u32,
}

impl S1apState {
    pub fn new(max_ues: usize, max_enbs: usize) -> Self {
        Self {
            enbs: KeyedMap::new("s1ap_eNB_coll", max_enbs),
            ues: KeyedMap::new("s1ap_ue_state", max_ues),
            mmeid2associd: KeyedMap::new("s1ap_mme_id2assoc_id_coll", max_ues)
                .with_invalid_key(INVALID_MME_UE_S1AP_ID),
            num_enbs: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    pub fn enbs(&self) -> &KeyedMap<u32, EnbDescription> {
        &self.enbs
    }

    pub fn ues(&self) -> &KeyedMap<u64, UeDescription> {
        &self.ues
    }

    pub fn mmeid2associd(&self) -> &KeyedMap<u32, u32> {
        &self.mmeid2associd
    }

    pub fn num_enbs(&self) -> u32 {
        self.num_enbs
    }

    /// READY-or-later eNBs counted from the table
    pub fn ready_enb_count(&self) -> u32 {
        self.enbs.values().filter(|enb| enb.s1_state.is_counted()).count() as u32
    }

    /// Check the incremental counter against the table
    pub fn verify_num_enbs(&self) -> bool {
        let counted = self.ready_enb_count();
        if counted != self.num_enbs {
            log::error!("num_enbs drift: counter {} table {}", self.num_enbs, counted);
            return false;
        }
        true
    }

    pub fn get_enb(&self, sctp_assoc_id: u32) -> Option<&EnbDescription> {
        self.enbs.get(&sctp_assoc_id).ok()
    }

    /// eNB with the given global eNB id
    pub fn get_enb_by_enb_id(&self, enb_id: u32) -> Option<&EnbDescription> {
        if enb_id == INVALID_ENB_ID {
            return None;
        }
        self.enbs.values().find(|enb| enb.enb_id == enb_id)
    }

    pub fn get_ue(&self, comp_s1ap_id: u64) -> Option<&UeDescription> {
        self.ues.get(&comp_s1ap_id).ok()
    }

    pub fn get_ue_mut(&mut self, comp_s1ap_id: u64) -> Option<&mut UeDescription> {
        self.ues.get_mut(&comp_s1ap_id).ok()
    }

    pub fn get_ue_by_enb_and_id(&self, sctp_assoc_id: u32, enb_ue_s1ap_id: u32) -> Option<&UeDescription> {
        self.get_ue(s1ap_generate_comp_id(enb_ue_s1ap_id, sctp_assoc_id))
    }

    /// Composite id of the UE holding `mme_ue_s1ap_id`
    ///
    /// The association index must lead to an eNB whose UE collection holds
    /// the UE; anything else is treated as not found.
    pub fn find_comp_id_by_mme_id(&self, mme_ue_s1ap_id: u32) -> Option<u64> {
        let assoc_id = *self.mmeid2associd.get(&mme_ue_s1ap_id).ok()?;
        let enb = self.get_enb(assoc_id)?;
        let found = enb.ue_id_coll.iter().copied().find(|comp| {
            self.get_ue(*comp)
                .map(|ue| ue.mme_ue_s1ap_id == mme_ue_s1ap_id)
                .unwrap_or(false)
        });
        if found.is_none() {
            log::warn!(
                "MME_UE_S1AP_ID[{:#x}] indexed on assoc {} but not in its UE collection",
                mme_ue_s1ap_id,
                assoc_id
            );
        }
        found
    }

    pub fn get_ue_by_mme_id(&self, mme_ue_s1ap_id: u32) -> Option<&UeDescription> {
        self.find_comp_id_by_mme_id(mme_ue_s1ap_id)
            .and_then(|comp| self.get_ue(comp))
    }

    /// Linear scan for the UE attached to `imsi64`
    pub fn get_ue_by_imsi(&self, imsi_map: &S1apImsiMap, imsi64: u64) -> Option<&UeDescription> {
        self.ues.values().find(|ue| {
            ue.has_mme_ue_s1ap_id() && imsi_map.get_imsi(ue.mme_ue_s1ap_id) == Some(imsi64)
        })
    }

    // ------------------------------------------------------------------------
    // eNB mutation
    // ------------------------------------------------------------------------

    /// Register an eNB; fails if the association is already known
    pub fn add_enb(&mut self, enb: EnbDescription) -> S1apResult<()> {
        let counted = enb.s1_state.is_counted();
        self.enbs.insert(enb.sctp_assoc_id, enb)?;
        if counted {
            self.num_enbs += 1;
        }
        Ok(())
    }

    /// Change the S1 state of an eNB, keeping `num_enbs` in step.
    /// Returns the previous state.
    pub fn set_enb_state(&mut self, sctp_assoc_id: u32, new_state: EnbS1State) -> S1apResult<EnbS1State> {
        let enb = self
            .enbs
            .get_mut(&sctp_assoc_id)
            .map_err(|_| S1apError::UnknownEnb(sctp_assoc_id))?;
        let old_state = enb.s1_state;
        enb.s1_state = new_state;
        match (old_state.is_counted(), new_state.is_counted()) {
            (false, true) => self.num_enbs += 1,
            (true, false) => self.num_enbs = self.num_enbs.saturating_sub(1),
            _ => {}
        }
        if old_state != new_state {
            log::debug!("eNB assoc {} {} -> {}", sctp_assoc_id, old_state, new_state);
        }
        Ok(old_state)
    }

    /// Mutable eNB access for fields other than the S1 state and UE ids
    pub fn update_enb<F>(&mut self, sctp_assoc_id: u32, f: F) -> S1apResult<()>
    where
        F: FnOnce(&mut EnbDescription),
    {
        let enb = self
            .enbs
            .get_mut(&sctp_assoc_id)
            .map_err(|_| S1apError::UnknownEnb(sctp_assoc_id))?;
        let (state, ue_ids) = (enb.s1_state, enb.ue_id_coll.clone());
        f(enb);
        // State and UE membership only change through the indexed paths
        enb.s1_state = state;
        enb.ue_id_coll = ue_ids;
        Ok(())
    }

    /// Hand out the next UE stream on an eNB
    pub fn allocate_stream(&mut self, sctp_assoc_id: u32) -> S1apResult<u16> {
        self.enbs
            .get_mut(&sctp_assoc_id)
            .map(|enb| enb.allocate_stream())
            .map_err(|_| S1apError::UnknownEnb(sctp_assoc_id))
    }

    /// Remove an eNB after removing every UE it serves.
    /// Returns the eNB and its removed UEs.
    pub fn remove_enb(&mut self, sctp_assoc_id: u32) -> Option<(EnbDescription, Vec<UeDescription>)> {
        let ue_ids: Vec<u64> = self.get_enb(sctp_assoc_id)?.ue_id_coll.iter().copied().collect();
        let removed: Vec<UeDescription> = ue_ids.into_iter().filter_map(|comp| self.remove_ue(comp)).collect();
        let enb = self.enbs.remove(&sctp_assoc_id).ok()?;
        if enb.s1_state.is_counted() {
            self.num_enbs = self.num_enbs.saturating_sub(1);
        }
        log::info!(
            "Removed eNB assoc {} enb_id {:#x} with {} UE(s)",
            sctp_assoc_id,
            enb.enb_id,
            removed.len()
        );
        Some((enb, removed))
    }

    // ------------------------------------------------------------------------
    // UE mutation
    // ------------------------------------------------------------------------

    /// Create a UE on an eNB. Nothing is registered if either step fails.
    pub fn new_ue(&mut self, sctp_assoc_id: u32, enb_ue_s1ap_id: u32) -> S1apResult<&mut UeDescription> {
        let ue = UeDescription::new(sctp_assoc_id, enb_ue_s1ap_id);
        let comp = ue.comp_s1ap_id;
        self.insert_ue(ue)?;
        self.ues.get_mut(&comp).map_err(S1apError::from)
    }

    /// Register a complete UE: UE table, eNB collection and, when
    /// attached, the MME UE id index.
    pub fn insert_ue(&mut self, ue: UeDescription) -> S1apResult<()> {
        let comp = ue.comp_s1ap_id;
        let (assoc_id, mme_ue_s1ap_id) = (ue.sctp_assoc_id, ue.mme_ue_s1ap_id);
        if !self.enbs.contains(&assoc_id) {
            return Err(S1apError::UnknownEnb(assoc_id));
        }
        if mme_ue_s1ap_id != INVALID_MME_UE_S1AP_ID {
            self.check_mme_ue_s1ap_id_free(mme_ue_s1ap_id, comp)?;
        }
        self.ues.insert(comp, ue)?;
        if let Ok(enb) = self.enbs.get_mut(&assoc_id) {
            enb.ue_id_coll.insert(comp);
        }
        if mme_ue_s1ap_id != INVALID_MME_UE_S1AP_ID {
            self.index_mme_ue_s1ap_id(mme_ue_s1ap_id, assoc_id);
        }
        Ok(())
    }

    /// Attach an MME UE S1AP ID to a UE and index it
    pub fn set_mme_ue_s1ap_id(&mut self, comp_s1ap_id: u64, mme_ue_s1ap_id: u32) -> S1apResult<()> {
        if mme_ue_s1ap_id == INVALID_MME_UE_S1AP_ID {
            return Err(S1apError::InvalidIeValue {
                ie_name: "MME-UE-S1AP-ID",
                reason: "invalid id".to_string(),
            });
        }
        self.ues.get(&comp_s1ap_id)?;
        self.check_mme_ue_s1ap_id_free(mme_ue_s1ap_id, comp_s1ap_id)?;
        let ue = self.ues.get_mut(&comp_s1ap_id)?;
        let (old, assoc_id) = (ue.mme_ue_s1ap_id, ue.sctp_assoc_id);
        ue.mme_ue_s1ap_id = mme_ue_s1ap_id;
        if old != INVALID_MME_UE_S1AP_ID && old != mme_ue_s1ap_id {
            let _ = self.mmeid2associd.remove(&old);
        }
        self.index_mme_ue_s1ap_id(mme_ue_s1ap_id, assoc_id);
        Ok(())
    }

    /// An MME UE id belongs to at most one live UE
    fn check_mme_ue_s1ap_id_free(&self, mme_ue_s1ap_id: u32, comp_s1ap_id: u64) -> S1apResult<()> {
        match self.find_comp_id_by_mme_id(mme_ue_s1ap_id) {
            Some(holder) if holder != comp_s1ap_id => Err(S1apError::InvalidIeValue {
                ie_name: "MME-UE-S1AP-ID",
                reason: format!("{:#x} already held by UE {:#x}", mme_ue_s1ap_id, holder),
            }),
            _ => Ok(()),
        }
    }

    fn index_mme_ue_s1ap_id(&mut self, mme_ue_s1ap_id: u32, assoc_id: u32) {
        if self.mmeid2associd.insert(mme_ue_s1ap_id, assoc_id).is_err() {
            if let Ok(previous) = self.mmeid2associd.update(mme_ue_s1ap_id, assoc_id) {
                if previous != assoc_id {
                    log::debug!(
                        "MME_UE_S1AP_ID[{:#x}] moved from assoc {} to {}",
                        mme_ue_s1ap_id,
                        previous,
                        assoc_id
                    );
                }
            }
        }
    }

    /// Remove a UE from the UE table, its eNB collection and the MME UE id
    /// index (when the index still points at this UE's association).
    pub fn remove_ue(&mut self, comp_s1ap_id: u64) -> Option<UeDescription> {
        let ue = self.ues.remove(&comp_s1ap_id).ok()?;
        if let Ok(enb) = self.enbs.get_mut(&ue.sctp_assoc_id) {
            enb.ue_id_coll.remove(&comp_s1ap_id);
        }
        if ue.has_mme_ue_s1ap_id() && self.mmeid2associd.get(&ue.mme_ue_s1ap_id).ok() == Some(&ue.sctp_assoc_id) {
            let _ = self.mmeid2associd.remove(&ue.mme_ue_s1ap_id);
        }
        log::debug!(
            "Removed UE ENB_UE_S1AP_ID[{:#x}] MME_UE_S1AP_ID[{:#x}] assoc {}",
            ue.enb_ue_s1ap_id,
            ue.mme_ue_s1ap_id,
            ue.sctp_assoc_id
        );
        Some(ue)
    }

    /// Drop UEs whose MME UE id has no IMSI, and collection entries with no
    /// UE behind them. Returns the number of UEs removed.
    pub fn remove_ues_without_imsi_from_ue_id_coll(&mut self, imsi_map: &S1apImsiMap) -> usize {
        for assoc_id in self.enbs.keys() {
            let dangling: Vec<u64> = match self.enbs.get(&assoc_id) {
                Ok(enb) => enb
                    .ue_id_coll
                    .iter()
                    .copied()
                    .filter(|comp| !self.ues.contains(comp))
                    .collect(),
                Err(_) => continue,
            };
            if let Ok(enb) = self.enbs.get_mut(&assoc_id) {
                for comp in dangling {
                    enb.ue_id_coll.remove(&comp);
                }
            }
        }

        let orphans: Vec<u64> = self
            .ues
            .iter()
            .filter(|(_, ue)| !ue.has_mme_ue_s1ap_id() || imsi_map.get_imsi(ue.mme_ue_s1ap_id).is_none())
            .map(|(comp, _)| *comp)
            .collect();
        let count = orphans.len();
        for comp in orphans {
            self.remove_ue(comp);
        }
        if count > 0 {
            log::info!("Removed {} UE(s) without IMSI", count);
        }
        count
    }

    /// Every index agrees with the UE table
    pub fn is_consistent(&self) -> bool {
        for (comp, ue) in self.ues.iter() {
            match self.get_enb(ue.sctp_assoc_id) {
                Some(enb) if enb.ue_id_coll.contains(comp) => {}
                _ => return false,
            }
            if ue.has_mme_ue_s1ap_id() && self.find_comp_id_by_mme_id(ue.mme_ue_s1ap_id) != Some(*comp) {
                return false;
            }
        }
        for enb in self.enbs.values() {
            if enb.ue_id_coll.iter().any(|comp| !self.ues.contains(comp)) {
                return false;
            }
        }
        self.verify_num_enbs()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        let _ = self.ues.clear();
        let _ = self.mmeid2associd.clear();
        let _ = self.enbs.clear();
        self.num_enbs = 0;
    }
}

// ============================================================================
// IMSI side table
// ============================================================================

/// mme_ue_s1ap_id -> IMSI
#[derive(Debug, Clone, PartialEq)]
pub struct S1apImsiMap {
    pub(crate) mme_ue_id_imsi_htbl: KeyedMap<u32, u64>,
}

impl S1apImsiMap {
    pub fn new(max_ues: usize) -> Self {
        Self {
            mme_ue_id_imsi_htbl: KeyedMap::new("s1ap_mme_ue_id_imsi_htbl", max_ues)
                .with_invalid_key(INVALID_MME_UE_S1AP_ID),
        }
    }

    pub fn get_imsi(&self, mme_ue_s1ap_id: u32) -> Option<u64> {
        self.mme_ue_id_imsi_htbl.get(&mme_ue_s1ap_id).ok().copied()
    }

    /// Insert or overwrite
    pub fn insert(&mut self, mme_ue_s1ap_id: u32, imsi64: u64) -> S1apResult<()> {
        match self.mme_ue_id_imsi_htbl.insert(mme_ue_s1ap_id, imsi64) {
            Ok(()) => Ok(()),
            Err(ogs_core::MapError::KeyAlreadyExists) => {
                self.mme_ue_id_imsi_htbl.update(mme_ue_s1ap_id, imsi64)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(&mut self, mme_ue_s1ap_id: u32) -> Option<u64> {
        self.mme_ue_id_imsi_htbl.remove(&mme_ue_s1ap_id).ok()
    }

    pub fn find_mme_ue_s1ap_id(&self, imsi64: u64) -> Option<u32> {
        self.mme_ue_id_imsi_htbl.for_each(|_, imsi| *imsi == imsi64).ok()
    }

    pub fn entries(&self) -> &KeyedMap<u32, u64> {
        &self.mme_ue_id_imsi_htbl
    }

    pub fn len(&self) -> usize {
        self.mme_ue_id_imsi_htbl.size()
    }

    pub fn is_empty(&self) -> bool {
        self.mme_ue_id_imsi_htbl.is_empty()
    }

    pub fn clear(&mut self) {
        let _ = self.mme_ue_id_imsi_htbl.clear();
    }
}
