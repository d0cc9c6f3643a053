//! S1AP Context Model
//!
//! eNB and UE descriptors of the MME S1AP task. An eNB exists per SCTP
//! association; a UE is keyed by its composite S1AP id and refers to its
//! eNB by association id only.

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;
use ogs_core::TIMER_INACTIVE_ID;
use ogs_s1ap::{PagingDrx, SupportedTaItem, ENB_UE_S1AP_ID_MASK, INVALID_ENB_ID, INVALID_MME_UE_S1AP_ID};

// ============================================================================
// Constants
// ============================================================================

/// Task name used in persisted UE keys
pub const S1AP_TASK_NAME: &str = "S1AP";
/// Stream reserved for non-UE-associated signalling
pub const S1AP_NON_UE_STREAM: u16 = 0;
/// First stream handed out to UEs
pub const S1AP_FIRST_UE_STREAM: u16 = 1;
/// Default UE context release guard timer
pub const S1AP_UE_CONTEXT_RELEASE_TIMER_MSEC: u32 = 4000;
/// Largest batch of UEs per eNB deregistered indication
pub const S1AP_ITTI_UE_PER_DEREGISTER_MESSAGE: usize = 128;

/// Composite UE key: eNB UE S1AP ID in the high word, association in the low
pub fn s1ap_generate_comp_id(enb_ue_s1ap_id: u32, sctp_assoc_id: u32) -> u64 {
    ((enb_ue_s1ap_id as u64) << 32) | sctp_assoc_id as u64
}

/// Split a composite id into (enb_ue_s1ap_id, sctp_assoc_id)
pub fn s1ap_split_comp_id(comp_s1ap_id: u64) -> (u32, u32) {
    ((comp_s1ap_id >> 32) as u32, comp_s1ap_id as u32)
}

// ============================================================================
// eNB Context
// ============================================================================

/// S1 state of an eNB association
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnbS1State {
    /// Association up, S1 Setup not done
    #[default]
    Init,
    /// Association reset, UEs being released
    Reseting,
    /// S1 Setup done
    Ready,
    /// Association shut down, UEs being released
    Shutdown,
}

impl EnbS1State {
    /// Whether an eNB in this state counts towards `num_enbs`: READY, or
    /// SHUTDOWN while its UEs are still being released
    pub fn is_counted(self) -> bool {
        self >= EnbS1State::Ready
    }
}

impl fmt::Display for EnbS1State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnbS1State::Init => write!(f, "S1AP_INIT"),
            EnbS1State::Reseting => write!(f, "S1AP_RESETING"),
            EnbS1State::Ready => write!(f, "S1AP_READY"),
            EnbS1State::Shutdown => write!(f, "S1AP_SHUTDOWN"),
        }
    }
}

/// eNB descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnbDescription {
    /// Global eNB id value, `INVALID_ENB_ID` until S1 Setup
    pub enb_id: u32,
    pub s1_state: EnbS1State,
    pub enb_name: String,
    pub default_paging_drx: PagingDrx,
    /// SCTP association, unique among live eNBs
    pub sctp_assoc_id: u32,
    /// Next stream handed to a UE, wraps to 1
    pub next_sctp_stream: u16,
    pub instreams: u16,
    pub outstreams: u16,
    /// Raw control-plane address
    pub ran_cp_ipaddr: Bytes,
    pub supported_ta_list: Vec<SupportedTaItem>,
    /// Composite ids of the UEs on this eNB (non-owning)
    pub ue_id_coll: BTreeSet<u64>,
}

impl EnbDescription {
    /// Fresh eNB for an association: INIT, unknown eNB id, no UEs
    pub fn new(sctp_assoc_id: u32) -> Self {
        Self {
            enb_id: INVALID_ENB_ID,
            s1_state: EnbS1State::Init,
            enb_name: String::new(),
            default_paging_drx: PagingDrx::default(),
            sctp_assoc_id,
            next_sctp_stream: S1AP_FIRST_UE_STREAM,
            instreams: 0,
            outstreams: 0,
            ran_cp_ipaddr: Bytes::new(),
            supported_ta_list: Vec::new(),
            ue_id_coll: BTreeSet::new(),
        }
    }

    pub fn nb_ue_associated(&self) -> usize {
        self.ue_id_coll.len()
    }

    /// Hand out the next UE stream
    pub fn allocate_stream(&mut self) -> u16 {
        let stream = self.next_sctp_stream;
        self.next_sctp_stream = self.next_sctp_stream.wrapping_add(1);
        if self.next_sctp_stream >= self.instreams {
            self.next_sctp_stream = S1AP_FIRST_UE_STREAM;
        }
        stream
    }
}

// ============================================================================
// UE Context
// ============================================================================

/// S1AP state of a UE context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UeS1State {
    #[default]
    Invalid,
    /// Waiting for Initial Context Setup Response
    WaitingCsr,
    Handover,
    Connected,
    /// Waiting for UE Context Release Complete
    WaitingCrr,
}

impl fmt::Display for UeS1State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UeS1State::Invalid => write!(f, "S1AP_UE_INVALID_STATE"),
            UeS1State::WaitingCsr => write!(f, "S1AP_UE_WAITING_CSR"),
            UeS1State::Handover => write!(f, "S1AP_UE_HANDOVER"),
            UeS1State::Connected => write!(f, "S1AP_UE_CONNECTED"),
            UeS1State::WaitingCrr => write!(f, "S1AP_UE_WAITING_CRR"),
        }
    }
}

/// UE context release guard timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeRelTimer {
    /// `TIMER_INACTIVE_ID` when not armed
    pub id: u64,
    pub msec: u32,
}

impl Default for UeRelTimer {
    fn default() -> Self {
        Self {
            id: TIMER_INACTIVE_ID,
            msec: S1AP_UE_CONTEXT_RELEASE_TIMER_MSEC,
        }
    }
}

/// Timers owned by the S1AP task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S1apTimerId {
    /// UE context release guard, data is the MME UE S1AP ID
    UeContextRelease,
}

/// S1 handover bookkeeping of a UE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct S1apHandoverState {
    pub mme_ue_s1ap_id: u32,
    pub source_enb_id: u32,
    pub target_enb_id: u32,
    /// 24 bits
    pub target_enb_ue_s1ap_id: u32,
    pub target_sctp_stream_recv: u16,
    pub target_sctp_stream_send: u16,
    pub source_enb_ue_s1ap_id: u32,
    pub source_sctp_stream_recv: u16,
    pub source_sctp_stream_send: u16,
}

/// UE descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeDescription {
    pub s1_ue_state: UeS1State,
    pub enb_ue_s1ap_id: u32,
    /// `INVALID_MME_UE_S1AP_ID` until MME-APP assigns one
    pub mme_ue_s1ap_id: u32,
    pub sctp_assoc_id: u32,
    pub sctp_stream_recv: u16,
    pub sctp_stream_send: u16,
    pub s1ap_ue_context_rel_timer: UeRelTimer,
    pub s1ap_handover_state: S1apHandoverState,
    pub comp_s1ap_id: u64,
}

impl UeDescription {
    pub fn new(sctp_assoc_id: u32, enb_ue_s1ap_id: u32) -> Self {
        let enb_ue_s1ap_id = enb_ue_s1ap_id & ENB_UE_S1AP_ID_MASK;
        Self {
            s1_ue_state: UeS1State::Invalid,
            enb_ue_s1ap_id,
            mme_ue_s1ap_id: INVALID_MME_UE_S1AP_ID,
            sctp_assoc_id,
            sctp_stream_recv: 0,
            sctp_stream_send: 0,
            s1ap_ue_context_rel_timer: UeRelTimer::default(),
            s1ap_handover_state: S1apHandoverState::default(),
            comp_s1ap_id: s1ap_generate_comp_id(enb_ue_s1ap_id, sctp_assoc_id),
        }
    }

    pub fn has_mme_ue_s1ap_id(&self) -> bool {
        self.mme_ue_s1ap_id != INVALID_MME_UE_S1AP_ID
    }
}
