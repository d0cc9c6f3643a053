//! S1AP state <-> protobuf conversion
//!
//! Live structures and their persisted records map field for field. The one
//! exception is `num_enbs`, which is recomputed from the eNB table on the
//! way out and restored verbatim on the way in.

use bytes::Bytes;
use ogs_proto as proto;
use ogs_s1ap::{PagingDrx, PlmnId, SupportedTaItem};

use crate::context::*;
use crate::state::{S1apImsiMap, S1apState};

// ============================================================================
// Enumerations
// ============================================================================

impl From<EnbS1State> for proto::EnbS1State {
    fn from(state: EnbS1State) -> Self {
        match state {
            EnbS1State::Init => proto::EnbS1State::S1apInit,
            EnbS1State::Reseting => proto::EnbS1State::S1apReseting,
            EnbS1State::Ready => proto::EnbS1State::S1apReady,
            EnbS1State::Shutdown => proto::EnbS1State::S1apShutdown,
        }
    }
}

impl From<proto::EnbS1State> for EnbS1State {
    fn from(state: proto::EnbS1State) -> Self {
        match state {
            proto::EnbS1State::S1apInit => EnbS1State::Init,
            proto::EnbS1State::S1apReseting => EnbS1State::Reseting,
            proto::EnbS1State::S1apReady => EnbS1State::Ready,
            proto::EnbS1State::S1apShutdown => EnbS1State::Shutdown,
        }
    }
}

impl From<UeS1State> for proto::UeS1State {
    fn from(state: UeS1State) -> Self {
        match state {
            UeS1State::Invalid => proto::UeS1State::S1apUeInvalidState,
            UeS1State::WaitingCsr => proto::UeS1State::S1apUeWaitingCsr,
            UeS1State::Handover => proto::UeS1State::S1apUeHandover,
            UeS1State::Connected => proto::UeS1State::S1apUeConnected,
            UeS1State::WaitingCrr => proto::UeS1State::S1apUeWaitingCrr,
        }
    }
}

impl From<proto::UeS1State> for UeS1State {
    fn from(state: proto::UeS1State) -> Self {
        match state {
            proto::UeS1State::S1apUeInvalidState => UeS1State::Invalid,
            proto::UeS1State::S1apUeWaitingCsr => UeS1State::WaitingCsr,
            proto::UeS1State::S1apUeHandover => UeS1State::Handover,
            proto::UeS1State::S1apUeConnected => UeS1State::Connected,
            proto::UeS1State::S1apUeWaitingCrr => UeS1State::WaitingCrr,
        }
    }
}

// ============================================================================
// Supported TA list
// ============================================================================

pub fn supported_ta_list_to_proto(list: &[SupportedTaItem]) -> proto::SupportedTaList {
    proto::SupportedTaList {
        list_count: list.len() as u32,
        supported_tai_items: list
            .iter()
            .map(|item| proto::SupportedTaiItems {
                tac: item.tac as u32,
                bplmnlist_count: item.broadcast_plmns.len() as u32,
                bplmns: item.broadcast_plmns.iter().map(|p| p.to_tbcd().to_vec()).collect(),
            })
            .collect(),
    }
}

pub fn proto_to_supported_ta_list(list: &proto::SupportedTaList) -> Vec<SupportedTaItem> {
    list.supported_tai_items
        .iter()
        .map(|item| SupportedTaItem {
            tac: item.tac as u16,
            broadcast_plmns: item
                .bplmns
                .iter()
                .filter_map(|raw| match <[u8; 3]>::try_from(raw.as_slice()) {
                    Ok(octets) => Some(PlmnId::from_tbcd(octets)),
                    Err(_) => {
                        log::warn!("Skipping broadcast PLMN of {} octets", raw.len());
                        None
                    }
                })
                .collect(),
        })
        .collect()
}

// ============================================================================
// eNB / UE
// ============================================================================

pub fn enb_to_proto(enb: &EnbDescription) -> proto::EnbDescription {
    proto::EnbDescription {
        enb_id: enb.enb_id,
        s1_state: proto::EnbS1State::from(enb.s1_state) as i32,
        enb_name: enb.enb_name.clone(),
        default_paging_drx: enb.default_paging_drx.to_u32(),
        nb_ue_associated: enb.nb_ue_associated() as u32,
        sctp_assoc_id: enb.sctp_assoc_id,
        next_sctp_stream: enb.next_sctp_stream as u32,
        instreams: enb.instreams as u32,
        outstreams: enb.outstreams as u32,
        ran_cp_ipaddr: enb.ran_cp_ipaddr.to_vec(),
        ran_cp_ipaddr_sz: enb.ran_cp_ipaddr.len() as u32,
        supported_ta_list: Some(supported_ta_list_to_proto(&enb.supported_ta_list)),
        ue_ids: enb.ue_id_coll.iter().copied().collect(),
    }
}

pub fn proto_to_enb(record: &proto::EnbDescription) -> EnbDescription {
    let ipaddr_len = (record.ran_cp_ipaddr_sz as usize).min(record.ran_cp_ipaddr.len());
    if record.nb_ue_associated as usize != record.ue_ids.len() {
        log::warn!(
            "eNB assoc {}: nb_ue_associated {} but {} UE ids",
            record.sctp_assoc_id,
            record.nb_ue_associated,
            record.ue_ids.len()
        );
    }
    EnbDescription {
        enb_id: record.enb_id,
        s1_state: record.s1_state().into(),
        enb_name: record.enb_name.clone(),
        default_paging_drx: PagingDrx::from_u32(record.default_paging_drx).unwrap_or_default(),
        sctp_assoc_id: record.sctp_assoc_id,
        next_sctp_stream: record.next_sctp_stream as u16,
        instreams: record.instreams as u16,
        outstreams: record.outstreams as u16,
        ran_cp_ipaddr: Bytes::copy_from_slice(&record.ran_cp_ipaddr[..ipaddr_len]),
        supported_ta_list: record
            .supported_ta_list
            .as_ref()
            .map(proto_to_supported_ta_list)
            .unwrap_or_default(),
        ue_id_coll: record.ue_ids.iter().copied().collect(),
    }
}

pub fn ue_to_proto(ue: &UeDescription) -> proto::UeDescription {
    let ho = &ue.s1ap_handover_state;
    proto::UeDescription {
        s1_ue_state: proto::UeS1State::from(ue.s1_ue_state) as i32,
        enb_ue_s1ap_id: ue.enb_ue_s1ap_id,
        mme_ue_s1ap_id: ue.mme_ue_s1ap_id,
        sctp_assoc_id: ue.sctp_assoc_id,
        sctp_stream_recv: ue.sctp_stream_recv as u32,
        sctp_stream_send: ue.sctp_stream_send as u32,
        s1ap_ue_context_rel_timer: Some(proto::Timer {
            id: ue.s1ap_ue_context_rel_timer.id,
            msec: ue.s1ap_ue_context_rel_timer.msec,
        }),
        s1ap_handover_state: Some(proto::S1apHandoverState {
            mme_ue_s1ap_id: ho.mme_ue_s1ap_id,
            source_enb_id: ho.source_enb_id,
            target_enb_id: ho.target_enb_id,
            target_enb_ue_s1ap_id: ho.target_enb_ue_s1ap_id,
            target_sctp_stream_recv: ho.target_sctp_stream_recv as u32,
            target_sctp_stream_send: ho.target_sctp_stream_send as u32,
            source_enb_ue_s1ap_id: ho.source_enb_ue_s1ap_id,
            source_sctp_stream_recv: ho.source_sctp_stream_recv as u32,
            source_sctp_stream_send: ho.source_sctp_stream_send as u32,
        }),
        comp_s1ap_id: ue.comp_s1ap_id,
    }
}

pub fn proto_to_ue(record: &proto::UeDescription) -> UeDescription {
    let timer = record
        .s1ap_ue_context_rel_timer
        .as_ref()
        .map(|t| UeRelTimer { id: t.id, msec: t.msec })
        .unwrap_or_default();
    let s1ap_handover_state = record
        .s1ap_handover_state
        .as_ref()
        .map(|ho| S1apHandoverState {
            mme_ue_s1ap_id: ho.mme_ue_s1ap_id,
            source_enb_id: ho.source_enb_id,
            target_enb_id: ho.target_enb_id,
            target_enb_ue_s1ap_id: ho.target_enb_ue_s1ap_id,
            target_sctp_stream_recv: ho.target_sctp_stream_recv as u16,
            target_sctp_stream_send: ho.target_sctp_stream_send as u16,
            source_enb_ue_s1ap_id: ho.source_enb_ue_s1ap_id,
            source_sctp_stream_recv: ho.source_sctp_stream_recv as u16,
            source_sctp_stream_send: ho.source_sctp_stream_send as u16,
        })
        .unwrap_or_default();
    UeDescription {
        s1_ue_state: record.s1_ue_state().into(),
        enb_ue_s1ap_id: record.enb_ue_s1ap_id,
        mme_ue_s1ap_id: record.mme_ue_s1ap_id,
        sctp_assoc_id: record.sctp_assoc_id,
        sctp_stream_recv: record.sctp_stream_recv as u16,
        sctp_stream_send: record.sctp_stream_send as u16,
        s1ap_ue_context_rel_timer: timer,
        s1ap_handover_state,
        comp_s1ap_id: record.comp_s1ap_id,
    }
}

// ============================================================================
// Aggregate state
// ============================================================================

/// Snapshot the live state; `num_enbs` is recomputed from the eNB table
pub fn state_to_proto(state: &S1apState) -> proto::S1apState {
    let num_enbs = state.ready_enb_count();
    if num_enbs != state.num_enbs() {
        log::warn!("num_enbs corrected on snapshot: {} -> {}", state.num_enbs(), num_enbs);
    }
    proto::S1apState {
        enbs: state.enbs().iter().map(|(assoc, enb)| (*assoc, enb_to_proto(enb))).collect(),
        mmeid2associd: state.mmeid2associd().iter().map(|(mme, assoc)| (*mme, *assoc)).collect(),
        num_enbs,
        ues: state.ues().iter().map(|(comp, ue)| (*comp, ue_to_proto(ue))).collect(),
    }
}

/// Replace the content of `state` with a snapshot
///
/// Table sizes of `state` are kept; every entry is taken from `record`.
pub fn proto_to_state(record: &proto::S1apState, state: &mut S1apState) {
    state.clear();
    for (assoc_id, enb) in &record.enbs {
        if state.enbs.insert(*assoc_id, proto_to_enb(enb)).is_err() {
            log::error!("Failed to restore eNB assoc {}", assoc_id);
        }
    }
    for (comp, ue) in &record.ues {
        if state.ues.insert(*comp, proto_to_ue(ue)).is_err() {
            log::error!("Failed to restore UE {:#x}", comp);
        }
    }
    for (mme_ue_s1ap_id, assoc_id) in &record.mmeid2associd {
        if state.mmeid2associd.insert(*mme_ue_s1ap_id, *assoc_id).is_err() {
            log::error!("Failed to restore MME_UE_S1AP_ID[{:#x}]", mme_ue_s1ap_id);
        }
    }
    state.num_enbs = record.num_enbs;
    ogs_core::ogs_expect!(state.verify_num_enbs());
}

pub fn s1ap_imsi_map_to_proto(imsi_map: &S1apImsiMap) -> proto::S1apImsiMap {
    proto::S1apImsiMap {
        mme_ue_id_imsi_map: imsi_map.entries().iter().map(|(mme, imsi)| (*mme, *imsi)).collect(),
    }
}

pub fn proto_to_s1ap_imsi_map(record: &proto::S1apImsiMap, imsi_map: &mut S1apImsiMap) {
    imsi_map.clear();
    for (mme_ue_s1ap_id, imsi64) in &record.mme_ue_id_imsi_map {
        if imsi_map.insert(*mme_ue_s1ap_id, *imsi64).is_err() {
            log::error!("Failed to restore IMSI of MME_UE_S1AP_ID[{:#x}]", mme_ue_s1ap_id);
        }
    }
}
