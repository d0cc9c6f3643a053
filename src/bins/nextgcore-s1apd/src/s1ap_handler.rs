//! S1AP Message Handling
//!
//! One function per S1AP procedure or MME-APP request. Handlers run to
//! completion against the task tables and record what they touched in a
//! [`HandlerOutcome`], which the task turns into checkpoints afterwards.

use std::time::Duration;

use ogs_core::{TimerMgr, TIMER_INACTIVE_ID};
use ogs_s1ap::{
    build_downlink_nas_transport, build_handover_command, build_paging, build_reset_acknowledge,
    build_s1_setup_failure, build_s1_setup_response, build_ue_context_release_command, cause_misc,
    cause_protocol, cause_transport, Cause, DeregisteredUe, EnbInitiatedResetAck, HandoverCommandReq,
    HandoverNotify, InitialUeMessage, MmeAppMessage, MmeUeIdNotification, NasDlDataReq, PagingRequest,
    Reset, ResetKind, ResetType, S1ReleaseCause, S1SetupRequest, S1apError, S1apResult, SctpNewPeer,
    TimeToWait, UeAssociatedLogicalS1Connection, UeContextReleaseCommandReq, UeContextReleaseComplete,
    UeContextReleaseRequest, UplinkNasTransport, ENB_UE_S1AP_ID_MASK, INVALID_ENB_ID,
    INVALID_ENB_UE_S1AP_ID, INVALID_MME_UE_S1AP_ID, S1AP_ENB_NAME_MAX_LEN,
};

use crate::config::S1apConfig;
use crate::context::{
    s1ap_generate_comp_id, EnbDescription, EnbS1State, S1apHandoverState, S1apTimerId, UeDescription,
    UeRelTimer, UeS1State, S1AP_FIRST_UE_STREAM, S1AP_ITTI_UE_PER_DEREGISTER_MESSAGE, S1AP_NON_UE_STREAM,
};
use crate::s1ap_path::{
    s1ap_send_non_ue_signalling, s1ap_send_to_enb, s1ap_send_to_enb_ue, s1ap_send_to_mme_app,
    s1ap_send_ue_signalling, S1apSink,
};
use crate::state::{S1apImsiMap, S1apState};
use crate::ta_match::{s1ap_mme_compare_ta_lists, s1ap_paging_compare_ta_lists, TaListMatch};

/// UE identity index is IMSI mod 1024 (TS 36.304)
const UE_IDENTITY_INDEX_MODULUS: u64 = 1024;

// ============================================================================
// Handler Context
// ============================================================================

/// What a handler changed, for checkpointing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// eNB/UE tables changed
    pub state_changed: bool,
    /// IMSI map changed
    pub imsi_map_changed: bool,
    /// MME UE ids whose per-UE record should be rewritten
    pub ue_updates: Vec<u32>,
    /// IMSIs whose per-UE record should be deleted
    pub ue_deletes: Vec<u64>,
}

impl HandlerOutcome {
    pub fn is_empty(&self) -> bool {
        !self.state_changed && !self.imsi_map_changed && self.ue_updates.is_empty() && self.ue_deletes.is_empty()
    }

    fn ue_changed(&mut self, mme_ue_s1ap_id: u32) {
        if mme_ue_s1ap_id != INVALID_MME_UE_S1AP_ID && !self.ue_updates.contains(&mme_ue_s1ap_id) {
            self.ue_updates.push(mme_ue_s1ap_id);
        }
    }
}

/// Everything a handler may touch
pub struct S1apHandlerCtx<'a> {
    pub state: &'a mut S1apState,
    pub imsi_map: &'a mut S1apImsiMap,
    pub config: &'a S1apConfig,
    pub timers: &'a TimerMgr<S1apTimerId>,
    pub sink: &'a mut dyn S1apSink,
    /// S1 Setup is refused until MME-APP reports the HSS link up
    pub hss_associated: bool,
    pub outcome: HandlerOutcome,
}

impl<'a> S1apHandlerCtx<'a> {
    pub fn new(
        state: &'a mut S1apState,
        imsi_map: &'a mut S1apImsiMap,
        config: &'a S1apConfig,
        timers: &'a TimerMgr<S1apTimerId>,
        sink: &'a mut dyn S1apSink,
        hss_associated: bool,
    ) -> Self {
        Self {
            state,
            imsi_map,
            config,
            timers,
            sink,
            hss_associated,
            outcome: HandlerOutcome::default(),
        }
    }

    /// Consume the context, keeping only the outcome
    pub fn into_outcome(self) -> HandlerOutcome {
        self.outcome
    }
}

fn unknown_ue(mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32) -> S1apError {
    S1apError::UnknownUe {
        mme_ue_s1ap_id,
        enb_ue_s1ap_id,
    }
}

/// UE by MME UE id, else by (association, eNB UE id)
fn find_ue_comp_id(state: &S1apState, sctp_assoc_id: u32, mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32) -> Option<u64> {
    if mme_ue_s1ap_id != INVALID_MME_UE_S1AP_ID {
        if let Some(comp) = state.find_comp_id_by_mme_id(mme_ue_s1ap_id) {
            return Some(comp);
        }
    }
    state
        .get_ue_by_enb_and_id(sctp_assoc_id, enb_ue_s1ap_id)
        .map(|ue| ue.comp_s1ap_id)
}

/// First UE with this eNB UE id on any eNB, in association order
fn find_ue_comp_id_any_enb(state: &S1apState, enb_ue_s1ap_id: u32) -> Option<u64> {
    state.enbs().keys().into_iter().find_map(|assoc_id| {
        state
            .get_ue_by_enb_and_id(assoc_id, enb_ue_s1ap_id)
            .map(|ue| ue.comp_s1ap_id)
    })
}

// ============================================================================
// SCTP association events
// ============================================================================

/// A new SCTP association came up
pub fn handle_new_association(ctx: &mut S1apHandlerCtx<'_>, peer: &SctpNewPeer) -> S1apResult<()> {
    let assoc_id = peer.assoc_id;

    match ctx.state.get_enb(assoc_id).map(|enb| enb.s1_state) {
        None => {
            let mut enb = EnbDescription::new(assoc_id);
            enb.instreams = peer.instreams;
            enb.outstreams = peer.outstreams;
            enb.ran_cp_ipaddr = peer.ran_cp_ipaddr.clone();
            ctx.state.add_enb(enb)?;
            log::info!(
                "New eNB association {} (instreams {} outstreams {})",
                assoc_id,
                peer.instreams,
                peer.outstreams
            );
        }
        Some(s1_state @ (EnbS1State::Shutdown | EnbS1State::Reseting)) => {
            log::warn!("Association {} refused, eNB still in {}", assoc_id, s1_state);
            return Err(S1apError::InvalidState(format!("eNB assoc {assoc_id} is {s1_state}")));
        }
        Some(_) => {
            ctx.state.update_enb(assoc_id, |enb| {
                enb.instreams = peer.instreams;
                enb.outstreams = peer.outstreams;
                enb.ran_cp_ipaddr = peer.ran_cp_ipaddr.clone();
                enb.next_sctp_stream = S1AP_FIRST_UE_STREAM;
            })?;
            ctx.state.set_enb_state(assoc_id, EnbS1State::Init)?;
            log::info!("eNB association {} restarted", assoc_id);
        }
    }

    ctx.outcome.state_changed = true;
    Ok(())
}

/// Tell MME-APP about every UE of an eNB, in bounded batches
fn send_enb_deregistered_ind(ctx: &mut S1apHandlerCtx<'_>, sctp_assoc_id: u32) -> S1apResult<usize> {
    let Some(enb) = ctx.state.get_enb(sctp_assoc_id) else {
        return Ok(0);
    };
    let enb_id = enb.enb_id;
    let ues: Vec<DeregisteredUe> = enb
        .ue_id_coll
        .iter()
        .filter_map(|comp| ctx.state.get_ue(*comp))
        .map(|ue| DeregisteredUe {
            mme_ue_s1ap_id: ue.mme_ue_s1ap_id,
            enb_ue_s1ap_id: ue.enb_ue_s1ap_id,
        })
        .collect();

    for batch in ues.chunks(S1AP_ITTI_UE_PER_DEREGISTER_MESSAGE) {
        s1ap_send_to_mme_app(
            ctx.sink,
            MmeAppMessage::EnbDeregisteredInd {
                enb_id,
                ues: batch.to_vec(),
            },
        )?;
    }
    Ok(ues.len())
}

/// SCTP association lost (shutdown) or reset by the peer
pub fn handle_sctp_disconnection(ctx: &mut S1apHandlerCtx<'_>, sctp_assoc_id: u32, reset: bool) -> S1apResult<()> {
    let enb = ctx
        .state
        .get_enb(sctp_assoc_id)
        .ok_or(S1apError::UnknownEnb(sctp_assoc_id))?;
    let nb_ue = enb.nb_ue_associated();
    log::info!(
        "SCTP {} on assoc {} (enb_id {:#x}, {} UE(s))",
        if reset { "reset" } else { "shutdown" },
        sctp_assoc_id,
        enb.enb_id,
        nb_ue
    );

    if nb_ue == 0 {
        if reset {
            ctx.state.set_enb_state(sctp_assoc_id, EnbS1State::Init)?;
        } else {
            ctx.state.remove_enb(sctp_assoc_id);
        }
        ctx.outcome.state_changed = true;
        return Ok(());
    }

    send_enb_deregistered_ind(ctx, sctp_assoc_id)?;
    let next = if reset { EnbS1State::Reseting } else { EnbS1State::Shutdown };
    ctx.state.set_enb_state(sctp_assoc_id, next)?;
    ctx.outcome.state_changed = true;
    Ok(())
}

/// Drop a READY eNB that announced the same eNB id on another association.
/// Returns true when one was removed.
pub fn clean_stale_enb_state(ctx: &mut S1apHandlerCtx<'_>, new_enb: &EnbDescription) -> bool {
    if new_enb.enb_id == INVALID_ENB_ID {
        return false;
    }
    let stale = ctx
        .state
        .enbs()
        .values()
        .find(|enb| {
            enb.enb_id == new_enb.enb_id
                && enb.sctp_assoc_id != new_enb.sctp_assoc_id
                && enb.s1_state == EnbS1State::Ready
        })
        .map(|enb| enb.sctp_assoc_id);
    let Some(stale_assoc_id) = stale else {
        return false;
    };

    log::warn!(
        "eNB {:#x} moved from assoc {} to {}, dropping stale context",
        new_enb.enb_id,
        stale_assoc_id,
        new_enb.sctp_assoc_id
    );
    if let Err(e) = send_enb_deregistered_ind(ctx, stale_assoc_id) {
        log::error!("Deregistered indication for stale eNB failed: {}", e);
    }
    if let Some((_, ues)) = ctx.state.remove_enb(stale_assoc_id) {
        for ue in &ues {
            release_ue_resources(ctx, ue);
        }
    }
    ctx.outcome.state_changed = true;
    true
}

// ============================================================================
// S1 Setup
// ============================================================================

fn send_s1_setup_failure(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    cause: Cause,
    time_to_wait: Option<TimeToWait>,
) -> S1apResult<()> {
    log::warn!("S1 Setup Failure to assoc {}: {}", sctp_assoc_id, cause);
    s1ap_send_non_ue_signalling(ctx.sink, sctp_assoc_id, build_s1_setup_failure(cause, time_to_wait))
}

/// Handle S1 Setup Request
pub fn handle_s1_setup_request(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    stream: u16,
    req: &S1SetupRequest,
) -> S1apResult<()> {
    if stream != S1AP_NON_UE_STREAM {
        log::error!("S1 Setup Request on stream {} of assoc {}", stream, sctp_assoc_id);
        return send_s1_setup_failure(ctx, sctp_assoc_id, Cause::Protocol(cause_protocol::UNSPECIFIED), None);
    }
    if !ctx.hss_associated {
        log::warn!("S1 Setup from assoc {} while HSS is not associated", sctp_assoc_id);
        return send_s1_setup_failure(ctx, sctp_assoc_id, Cause::Misc(cause_misc::UNSPECIFIED), None);
    }
    let Some(s1_state) = ctx.state.get_enb(sctp_assoc_id).map(|enb| enb.s1_state) else {
        log::error!("S1 Setup Request from unknown assoc {}", sctp_assoc_id);
        return Ok(());
    };
    if matches!(s1_state, EnbS1State::Reseting | EnbS1State::Shutdown) {
        return send_s1_setup_failure(
            ctx,
            sctp_assoc_id,
            Cause::Transport(cause_transport::TRANSPORT_RESOURCE_UNAVAILABLE),
            Some(TimeToWait::V20s),
        );
    }
    if !s1_state.is_counted() && ctx.state.num_enbs() as usize >= ctx.config.max_enbs {
        log::error!("eNB limit {} reached", ctx.config.max_enbs);
        return send_s1_setup_failure(
            ctx,
            sctp_assoc_id,
            Cause::Misc(cause_misc::CONTROL_PROCESSING_OVERLOAD),
            Some(TimeToWait::V20s),
        );
    }

    let ta_match = s1ap_mme_compare_ta_lists(&req.supported_tas, &ctx.config.served_tais);
    if ta_match != TaListMatch::Ok {
        log::error!("No served TA in S1 Setup from assoc {}: {:?}", sctp_assoc_id, ta_match);
        return send_s1_setup_failure(
            ctx,
            sctp_assoc_id,
            Cause::Misc(cause_misc::UNKNOWN_PLMN),
            Some(TimeToWait::V20s),
        );
    }

    let enb_id = req.global_enb_id.enb_id.value();
    let enb_name: String = req
        .enb_name
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(S1AP_ENB_NAME_MAX_LEN)
        .collect();
    ctx.state.update_enb(sctp_assoc_id, |enb| {
        enb.enb_id = enb_id;
        enb.enb_name = enb_name;
        enb.default_paging_drx = req.default_paging_drx;
        enb.supported_ta_list = req.supported_tas.clone();
    })?;
    ctx.outcome.state_changed = true;

    if let Some(candidate) = ctx.state.get_enb(sctp_assoc_id).cloned() {
        clean_stale_enb_state(ctx, &candidate);
    }

    let pdu = build_s1_setup_response(
        ctx.config.mme_name.as_deref(),
        ctx.config.served_gummei_items(),
        ctx.config.relative_capacity,
    );
    s1ap_send_non_ue_signalling(ctx.sink, sctp_assoc_id, pdu)?;
    ctx.state.set_enb_state(sctp_assoc_id, EnbS1State::Ready)?;

    log::info!(
        "S1 Setup done: eNB {:#x} on assoc {} ({} eNB(s))",
        enb_id,
        sctp_assoc_id,
        ctx.state.num_enbs()
    );
    Ok(())
}

// ============================================================================
// NAS Transport
// ============================================================================

/// Handle Initial UE Message
pub fn handle_initial_ue_message(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    stream: u16,
    msg: &InitialUeMessage,
) -> S1apResult<()> {
    let enb = ctx
        .state
        .get_enb(sctp_assoc_id)
        .ok_or(S1apError::UnknownEnb(sctp_assoc_id))?;
    if enb.s1_state != EnbS1State::Ready {
        return Err(S1apError::InvalidState(format!(
            "Initial UE Message on assoc {} in {}",
            sctp_assoc_id, enb.s1_state
        )));
    }
    let enb_id = enb.enb_id;
    let enb_ue_s1ap_id = msg.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;

    if ctx.state.get_ue_by_enb_and_id(sctp_assoc_id, enb_ue_s1ap_id).is_some() {
        log::warn!(
            "Duplicate Initial UE Message ENB_UE_S1AP_ID[{:#x}] on assoc {}",
            enb_ue_s1ap_id,
            sctp_assoc_id
        );
        return Ok(());
    }

    let comp_s1ap_id = ctx.state.new_ue(sctp_assoc_id, enb_ue_s1ap_id)?.comp_s1ap_id;
    let stream_send = ctx.state.allocate_stream(sctp_assoc_id)?;
    let msec = ctx.config.ue_context_release_timer_msec();
    if let Some(ue) = ctx.state.get_ue_mut(comp_s1ap_id) {
        ue.s1_ue_state = UeS1State::WaitingCsr;
        ue.sctp_stream_recv = stream;
        ue.sctp_stream_send = stream_send;
        ue.s1ap_ue_context_rel_timer = UeRelTimer {
            id: TIMER_INACTIVE_ID,
            msec,
        };
    }
    ctx.outcome.state_changed = true;

    log::debug!(
        "New UE ENB_UE_S1AP_ID[{:#x}] on assoc {} streams {}/{}",
        enb_ue_s1ap_id,
        sctp_assoc_id,
        stream,
        stream_send
    );
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::InitialUeMessage {
            sctp_assoc_id,
            enb_id,
            enb_ue_s1ap_id,
            nas: msg.nas_pdu.clone(),
            tai: msg.tai,
            ecgi: msg.ecgi,
            rrc_establishment_cause: msg.rrc_establishment_cause,
            s_tmsi: msg.s_tmsi,
            csg_id: msg.csg_id,
            gummei: msg.gummei,
        },
    )
}

/// Handle Uplink NAS Transport
pub fn handle_uplink_nas_transport(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    msg: &UplinkNasTransport,
) -> S1apResult<()> {
    let enb_ue_s1ap_id = msg.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let ue = find_ue_comp_id(ctx.state, sctp_assoc_id, msg.mme_ue_s1ap_id, enb_ue_s1ap_id)
        .and_then(|comp| ctx.state.get_ue(comp))
        .ok_or_else(|| unknown_ue(msg.mme_ue_s1ap_id, enb_ue_s1ap_id))?;

    let (mme_ue_s1ap_id, enb_ue_s1ap_id) = (ue.mme_ue_s1ap_id, ue.enb_ue_s1ap_id);
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::UplinkDataInd {
            enb_ue_s1ap_id,
            mme_ue_s1ap_id,
            nas: msg.nas_pdu.clone(),
            tai: msg.tai,
            ecgi: msg.ecgi,
        },
    )
}

/// Send a NAS message to a UE.
///
/// Returns false when the UE is being released and the message is dropped.
pub fn generate_downlink_nas_transport(ctx: &mut S1apHandlerCtx<'_>, req: &NasDlDataReq) -> S1apResult<bool> {
    let enb_ue_s1ap_id = req.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let comp_s1ap_id = ctx
        .state
        .find_comp_id_by_mme_id(req.mme_ue_s1ap_id)
        .or_else(|| find_ue_comp_id_any_enb(ctx.state, enb_ue_s1ap_id))
        .ok_or_else(|| unknown_ue(req.mme_ue_s1ap_id, enb_ue_s1ap_id))?;

    let ue = ctx
        .state
        .get_ue(comp_s1ap_id)
        .ok_or_else(|| unknown_ue(req.mme_ue_s1ap_id, enb_ue_s1ap_id))?;
    if ue.s1_ue_state == UeS1State::WaitingCrr {
        log::warn!(
            "Downlink NAS to MME_UE_S1AP_ID[{:#x}] dropped, release in progress",
            req.mme_ue_s1ap_id
        );
        return Ok(false);
    }

    if !ue.has_mme_ue_s1ap_id() {
        ctx.state.set_mme_ue_s1ap_id(comp_s1ap_id, req.mme_ue_s1ap_id)?;
        ctx.outcome.state_changed = true;
    }
    if ctx.imsi_map.get_imsi(req.mme_ue_s1ap_id) != Some(req.imsi64) {
        ctx.imsi_map.insert(req.mme_ue_s1ap_id, req.imsi64)?;
        ctx.outcome.imsi_map_changed = true;
    }
    ctx.outcome.ue_changed(req.mme_ue_s1ap_id);

    let ue = ctx
        .state
        .get_ue(comp_s1ap_id)
        .ok_or_else(|| unknown_ue(req.mme_ue_s1ap_id, enb_ue_s1ap_id))?;
    let pdu = build_downlink_nas_transport(ue.mme_ue_s1ap_id, ue.enb_ue_s1ap_id, req.nas_msg.clone());
    s1ap_send_to_enb_ue(ctx.sink, ue, pdu)?;
    Ok(true)
}

/// MME-APP assigned an MME UE S1AP ID
pub fn handle_mme_ue_id_notification(ctx: &mut S1apHandlerCtx<'_>, notif: &MmeUeIdNotification) -> S1apResult<()> {
    let enb_ue_s1ap_id = notif.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let comp_s1ap_id = s1ap_generate_comp_id(enb_ue_s1ap_id, notif.sctp_assoc_id);
    if ctx.state.get_ue(comp_s1ap_id).is_none() {
        return Err(unknown_ue(notif.mme_ue_s1ap_id, enb_ue_s1ap_id));
    }
    ctx.state.set_mme_ue_s1ap_id(comp_s1ap_id, notif.mme_ue_s1ap_id)?;
    ctx.outcome.state_changed = true;
    ctx.outcome.ue_changed(notif.mme_ue_s1ap_id);
    log::debug!(
        "ENB_UE_S1AP_ID[{:#x}] assoc {} -> MME_UE_S1AP_ID[{:#x}]",
        enb_ue_s1ap_id,
        notif.sctp_assoc_id,
        notif.mme_ue_s1ap_id
    );
    Ok(())
}

// ============================================================================
// UE Context Release
// ============================================================================

/// Handle UE Context Release Request from the eNB
pub fn handle_ue_context_release_request(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    msg: &UeContextReleaseRequest,
) -> S1apResult<()> {
    let enb_ue_s1ap_id = msg.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let Some(comp_s1ap_id) = find_ue_comp_id(ctx.state, sctp_assoc_id, msg.mme_ue_s1ap_id, enb_ue_s1ap_id) else {
        log::warn!(
            "UE Context Release Request for unknown MME_UE_S1AP_ID[{:#x}] ENB_UE_S1AP_ID[{:#x}]",
            msg.mme_ue_s1ap_id,
            enb_ue_s1ap_id
        );
        return Err(unknown_ue(msg.mme_ue_s1ap_id, enb_ue_s1ap_id));
    };
    let ue = ctx
        .state
        .get_ue(comp_s1ap_id)
        .ok_or_else(|| unknown_ue(msg.mme_ue_s1ap_id, enb_ue_s1ap_id))?;

    // Source eNB of a completed handover asks to drop its side
    let ho = ue.s1ap_handover_state;
    if ue.sctp_assoc_id != sctp_assoc_id && enb_ue_s1ap_id == ho.source_enb_ue_s1ap_id {
        log::info!(
            "Release Request from handover source assoc {} for MME_UE_S1AP_ID[{:#x}]",
            sctp_assoc_id,
            ue.mme_ue_s1ap_id
        );
        let mme_ue_s1ap_id = ue.mme_ue_s1ap_id;
        let pdu = build_ue_context_release_command(
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
            S1ReleaseCause::from_release_request(msg.cause),
        )?;
        return s1ap_send_ue_signalling(ctx.sink, sctp_assoc_id, ho.source_sctp_stream_send, mme_ue_s1ap_id, pdu);
    }

    // A mismatching eNB UE id means the request raced a new context
    if ue.enb_ue_s1ap_id != enb_ue_s1ap_id {
        log::warn!(
            "UE Context Release Request ENB_UE_S1AP_ID[{:#x}] does not match context [{:#x}]",
            enb_ue_s1ap_id,
            ue.enb_ue_s1ap_id
        );
        return Err(S1apError::InvalidIeValue {
            ie_name: "eNB-UE-S1AP-ID",
            reason: format!("{enb_ue_s1ap_id:#x} != {:#x}", ue.enb_ue_s1ap_id),
        });
    }

    let enb_id = ctx
        .state
        .get_enb(ue.sctp_assoc_id)
        .map(|enb| enb.enb_id)
        .unwrap_or(INVALID_ENB_ID);
    let (mme_ue_s1ap_id, enb_ue_s1ap_id) = (ue.mme_ue_s1ap_id, ue.enb_ue_s1ap_id);
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::UeContextReleaseReq {
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
            enb_id,
            relcause: S1ReleaseCause::from_release_request(msg.cause),
            cause: msg.cause,
        },
    )
}

/// MME-APP asks for a UE context release
pub fn handle_ue_context_release_command(
    ctx: &mut S1apHandlerCtx<'_>,
    cmd: &UeContextReleaseCommandReq,
) -> S1apResult<()> {
    let Some(comp_s1ap_id) = ctx.state.find_comp_id_by_mme_id(cmd.mme_ue_s1ap_id) else {
        log::warn!(
            "UE Context Release Command for unknown MME_UE_S1AP_ID[{:#x}]",
            cmd.mme_ue_s1ap_id
        );
        return Ok(());
    };
    let ue = ctx
        .state
        .get_ue(comp_s1ap_id)
        .cloned()
        .ok_or_else(|| unknown_ue(cmd.mme_ue_s1ap_id, cmd.enb_ue_s1ap_id))?;

    // After a handover the source eNB still holds the old context
    let enb_ue_s1ap_id = cmd.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let ho = ue.s1ap_handover_state;
    if cmd.enb_ue_s1ap_id != INVALID_ENB_UE_S1AP_ID
        && enb_ue_s1ap_id != ue.enb_ue_s1ap_id
        && enb_ue_s1ap_id == ho.source_enb_ue_s1ap_id
    {
        if cmd.cause.is_local_only() {
            return Ok(());
        }
        let source_assoc_id = ctx
            .state
            .get_enb_by_enb_id(ho.source_enb_id)
            .map(|enb| enb.sctp_assoc_id)
            .ok_or(S1apError::UnknownEnb(ho.source_enb_id))?;
        log::info!(
            "Releasing source side ENB_UE_S1AP_ID[{:#x}] of MME_UE_S1AP_ID[{:#x}]",
            enb_ue_s1ap_id,
            cmd.mme_ue_s1ap_id
        );
        let pdu = build_ue_context_release_command(cmd.mme_ue_s1ap_id, enb_ue_s1ap_id, cmd.cause)?;
        return s1ap_send_ue_signalling(
            ctx.sink,
            source_assoc_id,
            ho.source_sctp_stream_send,
            cmd.mme_ue_s1ap_id,
            pdu,
        );
    }

    if cmd.cause.is_local_only() {
        log::info!(
            "Local release of MME_UE_S1AP_ID[{:#x}] ({:?})",
            cmd.mme_ue_s1ap_id,
            cmd.cause
        );
        s1ap_remove_ue(ctx, comp_s1ap_id);
        return Ok(());
    }

    let pdu = build_ue_context_release_command(ue.mme_ue_s1ap_id, ue.enb_ue_s1ap_id, cmd.cause)?;
    s1ap_send_to_enb_ue(ctx.sink, &ue, pdu)?;

    let timer = ue.s1ap_ue_context_rel_timer;
    if timer.id != TIMER_INACTIVE_ID {
        ctx.timers.cancel(timer.id);
    }
    let timer_id = ctx.timers.start(
        S1apTimerId::UeContextRelease,
        Duration::from_millis(u64::from(timer.msec)),
        u64::from(ue.mme_ue_s1ap_id),
    );
    if let Some(ue) = ctx.state.get_ue_mut(comp_s1ap_id) {
        ue.s1_ue_state = UeS1State::WaitingCrr;
        ue.s1ap_ue_context_rel_timer.id = timer_id;
    }
    ctx.outcome.state_changed = true;
    ctx.outcome.ue_changed(ue.mme_ue_s1ap_id);
    Ok(())
}

/// Handle UE Context Release Complete
pub fn handle_ue_context_release_complete(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    msg: &UeContextReleaseComplete,
) -> S1apResult<()> {
    let Some(comp_s1ap_id) = ctx.state.find_comp_id_by_mme_id(msg.mme_ue_s1ap_id) else {
        log::warn!(
            "UE Context Release Complete for unknown MME_UE_S1AP_ID[{:#x}]",
            msg.mme_ue_s1ap_id
        );
        return Ok(());
    };
    let ue_assoc_id = ctx.state.get_ue(comp_s1ap_id).map(|ue| ue.sctp_assoc_id);
    if ue_assoc_id != Some(sctp_assoc_id) {
        // Source eNB answering after handover, the UE lives on
        log::debug!(
            "UE Context Release Complete from assoc {} for MME_UE_S1AP_ID[{:#x}] ignored",
            sctp_assoc_id,
            msg.mme_ue_s1ap_id
        );
        return Ok(());
    }
    s1ap_mme_release_ue_context(ctx, comp_s1ap_id)
}

/// The release guard fired before the eNB answered
pub fn handle_ue_context_release_timer_expiry(ctx: &mut S1apHandlerCtx<'_>, mme_ue_s1ap_id: u32) -> S1apResult<()> {
    let Some(comp_s1ap_id) = ctx.state.find_comp_id_by_mme_id(mme_ue_s1ap_id) else {
        log::warn!("Release timer expired for unknown MME_UE_S1AP_ID[{:#x}]", mme_ue_s1ap_id);
        return Ok(());
    };
    if let Some(ue) = ctx.state.get_ue_mut(comp_s1ap_id) {
        ue.s1ap_ue_context_rel_timer.id = TIMER_INACTIVE_ID;
    }
    log::warn!("UE Context Release Complete timeout for MME_UE_S1AP_ID[{:#x}]", mme_ue_s1ap_id);
    s1ap_mme_release_ue_context(ctx, comp_s1ap_id)
}

/// Report the release to MME-APP and drop the UE
pub fn s1ap_mme_release_ue_context(ctx: &mut S1apHandlerCtx<'_>, comp_s1ap_id: u64) -> S1apResult<()> {
    let ue = ctx
        .state
        .get_ue(comp_s1ap_id)
        .cloned()
        .ok_or_else(|| unknown_ue(INVALID_MME_UE_S1AP_ID, (comp_s1ap_id >> 32) as u32))?;
    let enb_id = ctx
        .state
        .get_enb(ue.sctp_assoc_id)
        .map(|enb| enb.enb_id)
        .unwrap_or(INVALID_ENB_ID);

    s1ap_remove_ue(ctx, comp_s1ap_id);
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::UeContextReleaseComplete {
            mme_ue_s1ap_id: ue.mme_ue_s1ap_id,
            enb_ue_s1ap_id: ue.enb_ue_s1ap_id,
            enb_id,
            sctp_assoc_id: ue.sctp_assoc_id,
        },
    )
}

/// Stop the UE's timer and forget its IMSI binding
fn release_ue_resources(ctx: &mut S1apHandlerCtx<'_>, ue: &UeDescription) {
    let timer_id = ue.s1ap_ue_context_rel_timer.id;
    if timer_id != TIMER_INACTIVE_ID {
        ctx.timers.cancel(timer_id);
    }
    if ue.has_mme_ue_s1ap_id() {
        if let Some(imsi64) = ctx.imsi_map.remove(ue.mme_ue_s1ap_id) {
            ctx.outcome.imsi_map_changed = true;
            ctx.outcome.ue_deletes.push(imsi64);
        }
        ctx.outcome.ue_updates.retain(|id| *id != ue.mme_ue_s1ap_id);
    }
}

/// Settle an eNB that was waiting for its UEs to go
fn settle_enb_after_ue_removal(ctx: &mut S1apHandlerCtx<'_>, sctp_assoc_id: u32) {
    let pending = ctx
        .state
        .get_enb(sctp_assoc_id)
        .filter(|enb| enb.nb_ue_associated() == 0)
        .map(|enb| enb.s1_state);
    match pending {
        Some(EnbS1State::Reseting) => {
            log::info!("Last UE of reset assoc {} gone, back to {}", sctp_assoc_id, EnbS1State::Init);
            let _ = ctx.state.set_enb_state(sctp_assoc_id, EnbS1State::Init);
        }
        Some(EnbS1State::Shutdown) => {
            log::info!("Last UE of shut down assoc {} gone", sctp_assoc_id);
            ctx.state.remove_enb(sctp_assoc_id);
        }
        _ => {}
    }
}

/// Remove a UE and everything hanging off it
pub fn s1ap_remove_ue(ctx: &mut S1apHandlerCtx<'_>, comp_s1ap_id: u64) -> Option<UeDescription> {
    let ue = ctx.state.remove_ue(comp_s1ap_id)?;
    release_ue_resources(ctx, &ue);
    ctx.outcome.state_changed = true;
    settle_enb_after_ue_removal(ctx, ue.sctp_assoc_id);
    Some(ue)
}

/// MME-APP asks to drop a context it knows is stale
pub fn remove_stale_ue_context(ctx: &mut S1apHandlerCtx<'_>, enb_ue_s1ap_id: u32, enb_id: u32) -> S1apResult<()> {
    let sctp_assoc_id = ctx
        .state
        .get_enb_by_enb_id(enb_id)
        .map(|enb| enb.sctp_assoc_id)
        .ok_or(S1apError::UnknownEnb(enb_id))?;
    let enb_ue_s1ap_id = enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let comp_s1ap_id = s1ap_generate_comp_id(enb_ue_s1ap_id, sctp_assoc_id);
    match s1ap_remove_ue(ctx, comp_s1ap_id) {
        Some(_) => {
            log::info!("Removed stale UE ENB_UE_S1AP_ID[{:#x}] of eNB {:#x}", enb_ue_s1ap_id, enb_id);
            Ok(())
        }
        None => Err(unknown_ue(INVALID_MME_UE_S1AP_ID, enb_ue_s1ap_id)),
    }
}

// ============================================================================
// Reset
// ============================================================================

fn resolve_reset_item(
    state: &S1apState,
    sctp_assoc_id: u32,
    item: &UeAssociatedLogicalS1Connection,
) -> UeAssociatedLogicalS1Connection {
    match (item.mme_ue_s1ap_id, item.enb_ue_s1ap_id) {
        (Some(mme_ue_s1ap_id), enb_ue_s1ap_id) => {
            let enb_ue_s1ap_id = enb_ue_s1ap_id.map(|id| id & ENB_UE_S1AP_ID_MASK);
            match state.get_ue_by_mme_id(mme_ue_s1ap_id) {
                Some(ue) if enb_ue_s1ap_id.is_none() || enb_ue_s1ap_id == Some(ue.enb_ue_s1ap_id) => {
                    UeAssociatedLogicalS1Connection {
                        mme_ue_s1ap_id: Some(ue.mme_ue_s1ap_id),
                        enb_ue_s1ap_id: Some(ue.enb_ue_s1ap_id),
                    }
                }
                _ => {
                    log::warn!("Reset item MME_UE_S1AP_ID[{:#x}] has no matching UE", mme_ue_s1ap_id);
                    UeAssociatedLogicalS1Connection {
                        mme_ue_s1ap_id: Some(mme_ue_s1ap_id),
                        enb_ue_s1ap_id,
                    }
                }
            }
        }
        (None, Some(enb_ue_s1ap_id)) => {
            let enb_ue_s1ap_id = enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
            if state.get_ue_by_enb_and_id(sctp_assoc_id, enb_ue_s1ap_id).is_none() {
                log::warn!("Reset item ENB_UE_S1AP_ID[{:#x}] has no matching UE", enb_ue_s1ap_id);
            }
            UeAssociatedLogicalS1Connection {
                mme_ue_s1ap_id: None,
                enb_ue_s1ap_id: Some(enb_ue_s1ap_id),
            }
        }
        (None, None) => *item,
    }
}

/// Handle Reset from the eNB; MME-APP acknowledges via
/// [`handle_enb_initiated_reset_ack`]
pub fn handle_enb_reset(ctx: &mut S1apHandlerCtx<'_>, sctp_assoc_id: u32, stream: u16, reset: &Reset) -> S1apResult<()> {
    let enb = ctx
        .state
        .get_enb(sctp_assoc_id)
        .ok_or(S1apError::UnknownEnb(sctp_assoc_id))?;
    if enb.s1_state != EnbS1State::Ready {
        log::warn!("Reset on assoc {} in {} ignored", sctp_assoc_id, enb.s1_state);
        return Ok(());
    }
    let enb_id = enb.enb_id;

    let (reset_kind, ue_to_reset_list) = match &reset.reset_type {
        ResetType::S1Interface => {
            let list: Vec<UeAssociatedLogicalS1Connection> = enb
                .ue_id_coll
                .iter()
                .filter_map(|comp| ctx.state.get_ue(*comp))
                .map(|ue| UeAssociatedLogicalS1Connection {
                    mme_ue_s1ap_id: ue.has_mme_ue_s1ap_id().then_some(ue.mme_ue_s1ap_id),
                    enb_ue_s1ap_id: Some(ue.enb_ue_s1ap_id),
                })
                .collect();
            (ResetKind::All, list)
        }
        ResetType::PartOfS1Interface(items) => {
            if items.is_empty() {
                return Err(S1apError::MissingMandatoryIe("UE-associatedLogicalS1-ConnectionListRes"));
            }
            let list: Vec<UeAssociatedLogicalS1Connection> = items
                .iter()
                .map(|item| resolve_reset_item(ctx.state, sctp_assoc_id, item))
                .collect();
            (ResetKind::Partial, list)
        }
    };

    log::info!(
        "Reset ({:?}, {}) from eNB {:#x}: {} UE(s)",
        reset_kind,
        reset.cause,
        enb_id,
        ue_to_reset_list.len()
    );
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::EnbInitiatedResetReq {
            reset_kind,
            enb_id,
            sctp_assoc_id,
            sctp_stream_id: stream,
            ue_to_reset_list,
        },
    )
}

/// MME-APP is done with an eNB reset, answer the eNB
pub fn handle_enb_initiated_reset_ack(ctx: &mut S1apHandlerCtx<'_>, ack: &EnbInitiatedResetAck) -> S1apResult<()> {
    let connections = match ack.reset_kind {
        ResetKind::All => Vec::new(),
        ResetKind::Partial => {
            if ack.ue_to_reset_list.is_empty() {
                return Err(S1apError::MissingMandatoryIe("UE-associatedLogicalS1-ConnectionListResAck"));
            }
            ack.ue_to_reset_list.clone()
        }
    };
    s1ap_send_to_enb(
        ctx.sink,
        ack.sctp_assoc_id,
        ack.sctp_stream_id,
        build_reset_acknowledge(connections),
    )
}

// ============================================================================
// Paging
// ============================================================================

/// Page a UE on every READY eNB serving one of its TAIs
pub fn handle_paging_request(ctx: &mut S1apHandlerCtx<'_>, req: &PagingRequest) -> S1apResult<()> {
    let imsi64: u64 = req.imsi.parse().map_err(|_| S1apError::InvalidIeValue {
        ie_name: "IMSI",
        reason: format!("'{}' is not numeric", req.imsi),
    })?;
    let ue_identity_index_value = (imsi64 % UE_IDENTITY_INDEX_MODULUS) as u16;

    let targets: Vec<u32> = ctx
        .state
        .enbs()
        .values()
        .filter(|enb| {
            enb.s1_state == EnbS1State::Ready && s1ap_paging_compare_ta_lists(&enb.supported_ta_list, &req.tai_lists)
        })
        .map(|enb| enb.sctp_assoc_id)
        .collect();
    if targets.is_empty() {
        log::error!("No eNB serves the paging area of IMSI {}", req.imsi);
        return Err(S1apError::ProtocolError(format!("no eNB to page IMSI {}", req.imsi)));
    }

    let mut targets = targets;
    targets.sort_unstable();
    for sctp_assoc_id in targets {
        s1ap_send_non_ue_signalling(ctx.sink, sctp_assoc_id, build_paging(req, ue_identity_index_value))?;
    }
    Ok(())
}

// ============================================================================
// Handover
// ============================================================================

/// Send Handover Command to the source eNB
pub fn handle_handover_command(ctx: &mut S1apHandlerCtx<'_>, req: &HandoverCommandReq) -> S1apResult<()> {
    let comp_s1ap_id = ctx
        .state
        .find_comp_id_by_mme_id(req.mme_ue_s1ap_id)
        .ok_or_else(|| unknown_ue(req.mme_ue_s1ap_id, req.src_enb_ue_s1ap_id))?;
    let target_assoc_id = ctx
        .state
        .get_enb_by_enb_id(req.target_enb_id)
        .map(|enb| enb.sctp_assoc_id)
        .ok_or(S1apError::UnknownEnb(req.target_enb_id))?;
    let target_stream = ctx.state.allocate_stream(target_assoc_id)?;

    let ue = ctx
        .state
        .get_ue_mut(comp_s1ap_id)
        .ok_or_else(|| unknown_ue(req.mme_ue_s1ap_id, req.src_enb_ue_s1ap_id))?;
    if req.src_enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK != ue.enb_ue_s1ap_id {
        log::warn!(
            "Handover Command source ENB_UE_S1AP_ID[{:#x}] differs from context [{:#x}]",
            req.src_enb_ue_s1ap_id,
            ue.enb_ue_s1ap_id
        );
    }
    ue.s1_ue_state = UeS1State::Handover;
    ue.s1ap_handover_state = S1apHandoverState {
        mme_ue_s1ap_id: req.mme_ue_s1ap_id,
        source_enb_id: req.source_enb_id,
        target_enb_id: req.target_enb_id,
        target_enb_ue_s1ap_id: req.tgt_enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK,
        target_sctp_stream_recv: 0,
        target_sctp_stream_send: target_stream,
        source_enb_ue_s1ap_id: ue.enb_ue_s1ap_id,
        source_sctp_stream_recv: ue.sctp_stream_recv,
        source_sctp_stream_send: ue.sctp_stream_send,
    };
    let ue = ue.clone();
    ctx.outcome.state_changed = true;
    ctx.outcome.ue_changed(ue.mme_ue_s1ap_id);

    let pdu = build_handover_command(
        ue.mme_ue_s1ap_id,
        ue.enb_ue_s1ap_id,
        req.handover_type,
        req.tgt_src_container.clone(),
    );
    s1ap_send_to_enb_ue(ctx.sink, &ue, pdu)
}

/// Handle Handover Notify from the target eNB: the UE moves over
pub fn handle_handover_notify(
    ctx: &mut S1apHandlerCtx<'_>,
    sctp_assoc_id: u32,
    stream: u16,
    msg: &HandoverNotify,
) -> S1apResult<()> {
    if ctx.state.get_enb(sctp_assoc_id).is_none() {
        return Err(S1apError::UnknownEnb(sctp_assoc_id));
    }
    let target_enb_ue_s1ap_id = msg.enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
    let source_comp_id = ctx
        .state
        .find_comp_id_by_mme_id(msg.mme_ue_s1ap_id)
        .ok_or_else(|| unknown_ue(msg.mme_ue_s1ap_id, target_enb_ue_s1ap_id))?;
    let source = ctx
        .state
        .get_ue(source_comp_id)
        .cloned()
        .ok_or_else(|| unknown_ue(msg.mme_ue_s1ap_id, target_enb_ue_s1ap_id))?;

    let target_comp_id = s1ap_generate_comp_id(target_enb_ue_s1ap_id, sctp_assoc_id);
    if target_comp_id == source_comp_id {
        log::warn!("Repeated Handover Notify for MME_UE_S1AP_ID[{:#x}]", msg.mme_ue_s1ap_id);
        return Ok(());
    }
    if ctx.state.get_ue(target_comp_id).is_some() {
        return Err(S1apError::InvalidState(format!(
            "ENB_UE_S1AP_ID[{target_enb_ue_s1ap_id:#x}] already in use on assoc {sctp_assoc_id}"
        )));
    }

    let ho = source.s1ap_handover_state;
    let stream_send = if ho.target_sctp_stream_send != 0 {
        ho.target_sctp_stream_send
    } else {
        ctx.state.allocate_stream(sctp_assoc_id)?
    };
    let mut target = UeDescription::new(sctp_assoc_id, target_enb_ue_s1ap_id);
    target.s1_ue_state = UeS1State::Connected;
    target.mme_ue_s1ap_id = msg.mme_ue_s1ap_id;
    target.sctp_stream_recv = stream;
    target.sctp_stream_send = stream_send;
    target.s1ap_ue_context_rel_timer = UeRelTimer {
        id: TIMER_INACTIVE_ID,
        msec: ctx.config.ue_context_release_timer_msec(),
    };
    target.s1ap_handover_state = S1apHandoverState {
        target_sctp_stream_recv: stream,
        target_sctp_stream_send: stream_send,
        ..ho
    };

    // The IMSI binding follows the MME UE id, so it stays
    ctx.state.remove_ue(source_comp_id);
    if source.s1ap_ue_context_rel_timer.id != TIMER_INACTIVE_ID {
        ctx.timers.cancel(source.s1ap_ue_context_rel_timer.id);
    }
    ctx.state.insert_ue(target)?;
    settle_enb_after_ue_removal(ctx, source.sctp_assoc_id);
    ctx.outcome.state_changed = true;
    ctx.outcome.ue_changed(msg.mme_ue_s1ap_id);

    log::info!(
        "Handover of MME_UE_S1AP_ID[{:#x}] to assoc {} ENB_UE_S1AP_ID[{:#x}]",
        msg.mme_ue_s1ap_id,
        sctp_assoc_id,
        target_enb_ue_s1ap_id
    );
    s1ap_send_to_mme_app(
        ctx.sink,
        MmeAppMessage::HandoverNotify {
            mme_ue_s1ap_id: msg.mme_ue_s1ap_id,
            target_enb_ue_s1ap_id,
            target_sctp_assoc_id: sctp_assoc_id,
            ecgi: msg.ecgi,
            tai: msg.tai,
        },
    )
}
