//! S1AP Task State Machine
//!
//! Dispatches SCTP events, decoded PDUs, MME-APP requests and timer
//! expiries to the handlers, then checkpoints whatever the handler changed.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ogs_core::{TimerEntry, TimerMgr, TIMER_INACTIVE_ID};
use ogs_dbi::KvStore;
use ogs_s1ap::{
    EnbInitiatedResetAck, HandoverCommandReq, MmeUeIdNotification, NasDlDataReq, PagingRequest, S1apError,
    S1apPdu, S1apResult, SctpCloseAssociation, SctpDataInd, SctpNewPeer, UeContextReleaseCommandReq,
};

use crate::config::S1apConfig;
use crate::context::{S1apTimerId, UeS1State};
use crate::s1ap_handler::*;
use crate::s1ap_path::S1apSink;
use crate::state_manager::{S1apStateManager, StateError};

// ============================================================================
// Messages
// ============================================================================

/// Everything the S1AP task receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S1apTaskMessage {
    /// SCTP: new association
    SctpNewAssociation(SctpNewPeer),
    /// SCTP: association shut down or reset
    SctpCloseAssociation(SctpCloseAssociation),
    /// SCTP: decoded S1AP PDU
    SctpDataInd(SctpDataInd),
    /// MME-APP: NAS payload for a UE
    NasDlDataReq(NasDlDataReq),
    /// MME-APP: release a UE context
    UeContextReleaseCommand(UeContextReleaseCommandReq),
    /// MME-APP: MME UE S1AP ID assigned
    MmeUeIdNotification(MmeUeIdNotification),
    /// MME-APP: reset handled, acknowledge to the eNB
    EnbInitiatedResetAck(EnbInitiatedResetAck),
    /// MME-APP: page a UE
    PagingRequest(PagingRequest),
    /// MME-APP: send Handover Command to the source eNB
    HandoverCommand(HandoverCommandReq),
    /// MME-APP: drop a stale UE context
    RemoveStaleUeContext { enb_ue_s1ap_id: u32, enb_id: u32 },
    /// MME-APP: HSS association is up, S1 Setup may proceed
    Activate,
    /// Stop the task
    Terminate,
}

impl S1apTaskMessage {
    pub fn name(&self) -> &'static str {
        match self {
            S1apTaskMessage::SctpNewAssociation(_) => "SCTP_NEW_ASSOCIATION",
            S1apTaskMessage::SctpCloseAssociation(_) => "SCTP_CLOSE_ASSOCIATION",
            S1apTaskMessage::SctpDataInd(_) => "SCTP_DATA_IND",
            S1apTaskMessage::NasDlDataReq(_) => "S1AP_NAS_DL_DATA_REQ",
            S1apTaskMessage::UeContextReleaseCommand(_) => "S1AP_UE_CONTEXT_RELEASE_COMMAND",
            S1apTaskMessage::MmeUeIdNotification(_) => "MME_APP_S1AP_MME_UE_ID_NOTIFICATION",
            S1apTaskMessage::EnbInitiatedResetAck(_) => "S1AP_ENB_INITIATED_RESET_ACK",
            S1apTaskMessage::PagingRequest(_) => "S1AP_PAGING_REQUEST",
            S1apTaskMessage::HandoverCommand(_) => "MME_APP_HANDOVER_COMMAND",
            S1apTaskMessage::RemoveStaleUeContext { .. } => "S1AP_REMOVE_STALE_UE_CONTEXT",
            S1apTaskMessage::Activate => "ACTIVATE_MESSAGE",
            S1apTaskMessage::Terminate => "TERMINATE_MESSAGE",
        }
    }

    /// Whether handling can never touch the eNB/UE tables
    pub fn is_task_state_same(&self) -> bool {
        matches!(
            self,
            S1apTaskMessage::EnbInitiatedResetAck(_)
                | S1apTaskMessage::PagingRequest(_)
                | S1apTaskMessage::Activate
                | S1apTaskMessage::Terminate
        )
    }

    /// Whether handling can never touch a per-UE record
    pub fn is_ue_state_same(&self) -> bool {
        matches!(
            self,
            S1apTaskMessage::SctpNewAssociation(_)
                | S1apTaskMessage::EnbInitiatedResetAck(_)
                | S1apTaskMessage::PagingRequest(_)
                | S1apTaskMessage::Activate
                | S1apTaskMessage::Terminate
        )
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Generic FSM contract
pub trait Fsm {
    type Event;

    /// Enter the initial state
    fn init(&mut self);

    /// Enter the final state
    fn fini(&mut self);

    /// Dispatch an event
    fn dispatch(&mut self, event: Self::Event);
}

/// S1AP task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S1apTaskState {
    Initial,
    Operational,
    Final,
}

impl fmt::Display for S1apTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S1apTaskState::Initial => write!(f, "INITIAL"),
            S1apTaskState::Operational => write!(f, "OPERATIONAL"),
            S1apTaskState::Final => write!(f, "FINAL"),
        }
    }
}

/// The S1AP task
pub struct S1apTask<S: S1apSink> {
    state: S1apTaskState,
    config: S1apConfig,
    manager: S1apStateManager,
    timers: TimerMgr<S1apTimerId>,
    sink: S,
    hss_associated: bool,
}

impl<S: S1apSink> S1apTask<S> {
    pub fn new(config: S1apConfig, store: Arc<dyn KvStore>, sink: S) -> Self {
        Self {
            state: S1apTaskState::Initial,
            config,
            manager: S1apStateManager::new(store),
            timers: TimerMgr::new(),
            sink,
            hss_associated: false,
        }
    }

    pub fn state(&self) -> S1apTaskState {
        self.state
    }

    pub fn config(&self) -> &S1apConfig {
        &self.config
    }

    pub fn manager(&self) -> &S1apStateManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut S1apStateManager {
        &mut self.manager
    }

    pub fn timers(&self) -> &TimerMgr<S1apTimerId> {
        &self.timers
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn is_hss_associated(&self) -> bool {
        self.hss_associated
    }

    fn transition(&mut self, new_state: S1apTaskState) {
        log::debug!("S1AP task: {} -> {}", self.state, new_state);
        self.state = new_state;
    }

    /// Handle one message and checkpoint the result
    pub fn handle_message(&mut self, msg: S1apTaskMessage) -> S1apResult<()> {
        if self.state != S1apTaskState::Operational {
            log::error!("{} received in state {}", msg.name(), self.state);
            return Err(S1apError::InvalidState(format!("S1AP task is {}", self.state)));
        }
        log::debug!("S1AP task received {}", msg.name());

        match msg {
            S1apTaskMessage::Activate => {
                log::info!("HSS associated, accepting S1 Setup");
                self.hss_associated = true;
                return Ok(());
            }
            S1apTaskMessage::Terminate => {
                self.fini();
                return Ok(());
            }
            _ => {}
        }

        let task_state_same = msg.is_task_state_same();
        let ue_state_same = msg.is_ue_state_same();
        let (state, imsi_map) = self.manager.tables_mut();
        let mut ctx = S1apHandlerCtx::new(
            state,
            imsi_map,
            &self.config,
            &self.timers,
            &mut self.sink,
            self.hss_associated,
        );
        let result = dispatch_message(&mut ctx, msg);
        let outcome = ctx.into_outcome();

        if let Err(e) = &result {
            log::warn!("S1AP handler failed: {}", e);
        }
        if task_state_same && outcome.state_changed {
            log::error!("Task state changed by a message declared stateless");
        }
        if ue_state_same && !outcome.ue_updates.is_empty() {
            log::error!("UE state changed by a message declared UE-stateless");
        }
        self.checkpoint(&outcome);
        result
    }

    /// Persist what a handler changed
    fn checkpoint(&mut self, outcome: &HandlerOutcome) {
        if !self.manager.persist_enabled() || outcome.is_empty() {
            return;
        }
        if outcome.state_changed {
            if let Err(e) = self.manager.put_state() {
                log::error!("S1AP state checkpoint failed: {}", e);
            }
        }
        if outcome.imsi_map_changed || !outcome.ue_updates.is_empty() {
            if let Err(e) = self.manager.put_s1ap_imsi_map() {
                log::error!("S1AP IMSI map checkpoint failed: {}", e);
            }
        }
        for imsi64 in &outcome.ue_deletes {
            if let Err(e) = self.manager.delete_ue_state(*imsi64) {
                log::error!("Failed to delete UE state of IMSI {:015}: {}", imsi64, e);
            }
        }
        for mme_ue_s1ap_id in &outcome.ue_updates {
            let Some(imsi64) = self.manager.get_s1ap_imsi_map().get_imsi(*mme_ue_s1ap_id) else {
                log::debug!("MME_UE_S1AP_ID[{:#x}] has no IMSI yet", mme_ue_s1ap_id);
                continue;
            };
            match self.manager.put_ue_state(imsi64) {
                Ok(()) | Err(StateError::UeNotFound(_)) => {}
                Err(e) => log::error!("Failed to write UE state of IMSI {:015}: {}", imsi64, e),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    /// Fire every timer due at `now`. Returns the number handled.
    pub fn process_timers_at(&mut self, now: Instant) -> usize {
        let expired = self.timers.process_expired_at(now);
        let count = expired.len();
        for entry in expired {
            self.handle_timer(entry);
        }
        count
    }

    pub fn process_timers(&mut self) -> usize {
        self.process_timers_at(Instant::now())
    }

    /// Time until the next timer, if any
    pub fn next_timeout(&self) -> Option<Duration> {
        self.timers.next_expiration_at(Instant::now())
    }

    fn handle_timer(&mut self, entry: TimerEntry<S1apTimerId>) {
        match entry.timer_type {
            S1apTimerId::UeContextRelease => {
                let mme_ue_s1ap_id = entry.data as u32;
                let (state, imsi_map) = self.manager.tables_mut();
                // A re-armed timer leaves the old entry stale
                let armed = state
                    .get_ue_by_mme_id(mme_ue_s1ap_id)
                    .map(|ue| ue.s1ap_ue_context_rel_timer.id);
                if armed != Some(entry.id) {
                    log::debug!("Stale release timer {} for MME_UE_S1AP_ID[{:#x}]", entry.id, mme_ue_s1ap_id);
                    return;
                }
                let mut ctx = S1apHandlerCtx::new(
                    state,
                    imsi_map,
                    &self.config,
                    &self.timers,
                    &mut self.sink,
                    self.hss_associated,
                );
                let result = handle_ue_context_release_timer_expiry(&mut ctx, mme_ue_s1ap_id);
                let outcome = ctx.into_outcome();
                if let Err(e) = result {
                    log::error!("Release timer handling failed: {}", e);
                }
                self.checkpoint(&outcome);
            }
        }
    }

    /// Timer ids do not survive a restart: drop them, then give restored
    /// UEs waiting for a release complete a fresh guard timer.
    fn rearm_release_timers(&mut self) -> usize {
        let (state, _) = self.manager.tables_mut();
        let mut rearmed = 0;
        for ue in state.ues.values_mut() {
            ue.s1ap_ue_context_rel_timer.id = TIMER_INACTIVE_ID;
            if ue.s1_ue_state != UeS1State::WaitingCrr {
                continue;
            }
            ue.s1ap_ue_context_rel_timer.id = self.timers.start(
                S1apTimerId::UeContextRelease,
                Duration::from_millis(u64::from(ue.s1ap_ue_context_rel_timer.msec)),
                u64::from(ue.mme_ue_s1ap_id),
            );
            rearmed += 1;
        }
        rearmed
    }
}

impl<S: S1apSink> Fsm for S1apTask<S> {
    type Event = S1apTaskMessage;

    fn init(&mut self) {
        self.manager
            .init(self.config.max_ues, self.config.max_enbs, self.config.use_stateless);

        if self.config.use_stateless {
            let (state, imsi_map) = self.manager.tables_mut();
            let removed = state.remove_ues_without_imsi_from_ue_id_coll(imsi_map);
            let rearmed = self.rearm_release_timers();
            if removed > 0 || rearmed > 0 {
                if let Err(e) = self.manager.put_state() {
                    log::error!("S1AP state checkpoint failed: {}", e);
                }
            }
        }
        self.transition(S1apTaskState::Operational);
    }

    fn fini(&mut self) {
        if self.state == S1apTaskState::Final {
            return;
        }
        if self.manager.is_initialized() {
            if let Err(e) = self.manager.put_state() {
                log::error!("Final S1AP state checkpoint failed: {}", e);
            }
        }
        self.timers.clear();
        self.manager.free_state();
        self.transition(S1apTaskState::Final);
    }

    fn dispatch(&mut self, event: S1apTaskMessage) {
        // Errors are logged where they happen
        let _ = self.handle_message(event);
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn dispatch_message(ctx: &mut S1apHandlerCtx<'_>, msg: S1apTaskMessage) -> S1apResult<()> {
    match msg {
        S1apTaskMessage::SctpNewAssociation(peer) => handle_new_association(ctx, &peer),
        S1apTaskMessage::SctpCloseAssociation(close) => handle_sctp_disconnection(ctx, close.assoc_id, close.reset),
        S1apTaskMessage::SctpDataInd(ind) => dispatch_pdu(ctx, ind),
        S1apTaskMessage::NasDlDataReq(req) => generate_downlink_nas_transport(ctx, &req).map(|_| ()),
        S1apTaskMessage::UeContextReleaseCommand(cmd) => handle_ue_context_release_command(ctx, &cmd),
        S1apTaskMessage::MmeUeIdNotification(notif) => handle_mme_ue_id_notification(ctx, &notif),
        S1apTaskMessage::EnbInitiatedResetAck(ack) => handle_enb_initiated_reset_ack(ctx, &ack),
        S1apTaskMessage::PagingRequest(req) => handle_paging_request(ctx, &req),
        S1apTaskMessage::HandoverCommand(req) => handle_handover_command(ctx, &req),
        S1apTaskMessage::RemoveStaleUeContext { enb_ue_s1ap_id, enb_id } => {
            remove_stale_ue_context(ctx, enb_ue_s1ap_id, enb_id)
        }
        S1apTaskMessage::Activate | S1apTaskMessage::Terminate => Ok(()),
    }
}

fn dispatch_pdu(ctx: &mut S1apHandlerCtx<'_>, ind: SctpDataInd) -> S1apResult<()> {
    let SctpDataInd { assoc_id, stream, pdu } = ind;
    match &pdu {
        S1apPdu::S1SetupRequest(req) => handle_s1_setup_request(ctx, assoc_id, stream, req),
        S1apPdu::InitialUeMessage(msg) => handle_initial_ue_message(ctx, assoc_id, stream, msg),
        S1apPdu::UplinkNasTransport(msg) => handle_uplink_nas_transport(ctx, assoc_id, msg),
        S1apPdu::UeContextReleaseRequest(msg) => handle_ue_context_release_request(ctx, assoc_id, msg),
        S1apPdu::UeContextReleaseComplete(msg) => handle_ue_context_release_complete(ctx, assoc_id, msg),
        S1apPdu::Reset(reset) => handle_enb_reset(ctx, assoc_id, stream, reset),
        S1apPdu::HandoverNotify(msg) => handle_handover_notify(ctx, assoc_id, stream, msg),
        other => {
            log::warn!("Unhandled S1AP PDU {} on assoc {}", other.name(), assoc_id);
            Err(S1apError::ProtocolError(format!("unhandled PDU {}", other.name())))
        }
    }
}
