//! Inter-task messages
//!
//! Typed messages exchanged between the S1AP task and its neighbours: the
//! SCTP layer below and MME-APP above.

use bytes::Bytes;

use crate::pdu::S1apPdu;
use crate::types::*;

// ============================================================================
// SCTP <-> S1AP
// ============================================================================

/// A new SCTP association came up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctpNewPeer {
    pub assoc_id: u32,
    pub instreams: u16,
    pub outstreams: u16,
    /// Raw control-plane address of the eNB (4 or 16 octets)
    pub ran_cp_ipaddr: Bytes,
}

/// An SCTP association went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SctpCloseAssociation {
    pub assoc_id: u32,
    /// true for a peer reset, false for a shutdown
    pub reset: bool,
}

/// Decoded S1AP PDU received on an association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctpDataInd {
    pub assoc_id: u32,
    pub stream: u16,
    pub pdu: S1apPdu,
}

/// S1AP PDU to be encoded and sent on an association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SctpDataReq {
    pub assoc_id: u32,
    pub stream: u16,
    /// Owning UE, `INVALID_MME_UE_S1AP_ID` for non-UE signalling
    pub mme_ue_s1ap_id: u32,
    pub pdu: S1apPdu,
}

// ============================================================================
// MME-APP -> S1AP
// ============================================================================

/// Release causes used between MME-APP and S1AP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S1ReleaseCause {
    NasNormalRelease,
    NasDetach,
    RadioEutranGeneratedReason,
    InitialContextSetupFailed,
    CsfbTriggered,
    NasUeNotAvailableForPs,
    RadioMultipleErabId,
    InvalidMmeUeS1apId,
    NasMmeOffloading,
    /// Release without signalling towards the eNB
    ImplicitContextRelease,
    SctpShutdownOrReset,
    InvalidEnbId,
}

impl S1ReleaseCause {
    /// Causes that tear the UE down locally without a command to the eNB
    pub fn is_local_only(self) -> bool {
        matches!(
            self,
            S1ReleaseCause::ImplicitContextRelease
                | S1ReleaseCause::SctpShutdownOrReset
                | S1ReleaseCause::InvalidEnbId
        )
    }

    /// S1AP cause carried by the UE Context Release Command
    pub fn to_s1ap_cause(self) -> Option<Cause> {
        match self {
            S1ReleaseCause::NasDetach => Some(Cause::Nas(cause_nas::DETACH)),
            S1ReleaseCause::NasNormalRelease => Some(Cause::Nas(cause_nas::UNSPECIFIED)),
            S1ReleaseCause::RadioEutranGeneratedReason => Some(Cause::RadioNetwork(
                cause_radio_network::RELEASE_DUE_TO_EUTRAN_GENERATED_REASON,
            )),
            S1ReleaseCause::InitialContextSetupFailed => {
                Some(Cause::RadioNetwork(cause_radio_network::UNSPECIFIED))
            }
            S1ReleaseCause::CsfbTriggered => {
                Some(Cause::RadioNetwork(cause_radio_network::CS_FALLBACK_TRIGGERED))
            }
            S1ReleaseCause::NasUeNotAvailableForPs => Some(Cause::RadioNetwork(
                cause_radio_network::UE_NOT_AVAILABLE_FOR_PS_SERVICE,
            )),
            S1ReleaseCause::RadioMultipleErabId => Some(Cause::RadioNetwork(
                cause_radio_network::MULTIPLE_E_RAB_ID_INSTANCES,
            )),
            S1ReleaseCause::InvalidMmeUeS1apId => {
                Some(Cause::RadioNetwork(cause_radio_network::UNKNOWN_MME_UE_S1AP_ID))
            }
            S1ReleaseCause::NasMmeOffloading => Some(Cause::RadioNetwork(
                cause_radio_network::LOAD_BALANCING_TAU_REQUIRED,
            )),
            S1ReleaseCause::ImplicitContextRelease
            | S1ReleaseCause::SctpShutdownOrReset
            | S1ReleaseCause::InvalidEnbId => None,
        }
    }

    /// Release cause MME-APP sees for an eNB-requested release
    pub fn from_release_request(cause: Cause) -> Self {
        match cause {
            Cause::RadioNetwork(cause_radio_network::UE_NOT_AVAILABLE_FOR_PS_SERVICE) => {
                S1ReleaseCause::NasUeNotAvailableForPs
            }
            Cause::RadioNetwork(cause_radio_network::CS_FALLBACK_TRIGGERED) => {
                S1ReleaseCause::CsfbTriggered
            }
            _ => S1ReleaseCause::RadioEutranGeneratedReason,
        }
    }
}

/// Downlink NAS payload for a UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasDlDataReq {
    pub enb_ue_s1ap_id: u32,
    pub mme_ue_s1ap_id: u32,
    /// Subscriber the MME UE id belongs to
    pub imsi64: u64,
    pub nas_msg: Bytes,
}

/// Release a UE context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeContextReleaseCommandReq {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub cause: S1ReleaseCause,
}

/// MME UE S1AP ID assigned by MME-APP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmeUeIdNotification {
    pub enb_ue_s1ap_id: u32,
    pub mme_ue_s1ap_id: u32,
    pub sctp_assoc_id: u32,
}

/// Reset scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    All,
    Partial,
}

/// MME-APP finished processing an eNB initiated reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnbInitiatedResetAck {
    pub reset_kind: ResetKind,
    pub sctp_assoc_id: u32,
    pub sctp_stream_id: u16,
    pub ue_to_reset_list: Vec<UeAssociatedLogicalS1Connection>,
}

/// UE identity used for paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingId {
    STmsi(STmsi),
    Imsi,
}

/// One paging TAI list as provisioned for the UE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingTaiList {
    pub tais: Vec<Tai>,
}

/// Page an idle UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingRequest {
    pub imsi: String,
    pub paging_id: PagingId,
    pub domain: CnDomain,
    pub tai_lists: Vec<PagingTaiList>,
}

/// Handover command towards the source eNB, after the target acked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverCommandReq {
    pub mme_ue_s1ap_id: u32,
    pub src_enb_ue_s1ap_id: u32,
    pub tgt_enb_ue_s1ap_id: u32,
    pub source_enb_id: u32,
    pub target_enb_id: u32,
    pub source_assoc_id: u32,
    pub handover_type: HandoverType,
    pub tgt_src_container: Bytes,
}

// ============================================================================
// S1AP -> MME-APP
// ============================================================================

/// UE ids handed to MME-APP when an eNB goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeregisteredUe {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
}

/// Messages sent to MME-APP
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmeAppMessage {
    InitialUeMessage {
        sctp_assoc_id: u32,
        enb_id: u32,
        enb_ue_s1ap_id: u32,
        nas: Bytes,
        tai: Tai,
        ecgi: Ecgi,
        rrc_establishment_cause: RrcEstablishmentCause,
        s_tmsi: Option<STmsi>,
        csg_id: Option<u32>,
        gummei: Option<Gummei>,
    },
    UplinkDataInd {
        enb_ue_s1ap_id: u32,
        mme_ue_s1ap_id: u32,
        nas: Bytes,
        tai: Tai,
        ecgi: Ecgi,
    },
    UeContextReleaseReq {
        mme_ue_s1ap_id: u32,
        enb_ue_s1ap_id: u32,
        enb_id: u32,
        relcause: S1ReleaseCause,
        cause: Cause,
    },
    UeContextReleaseComplete {
        mme_ue_s1ap_id: u32,
        enb_ue_s1ap_id: u32,
        enb_id: u32,
        sctp_assoc_id: u32,
    },
    EnbDeregisteredInd {
        enb_id: u32,
        ues: Vec<DeregisteredUe>,
    },
    EnbInitiatedResetReq {
        reset_kind: ResetKind,
        enb_id: u32,
        sctp_assoc_id: u32,
        sctp_stream_id: u16,
        ue_to_reset_list: Vec<UeAssociatedLogicalS1Connection>,
    },
    HandoverNotify {
        mme_ue_s1ap_id: u32,
        target_enb_ue_s1ap_id: u32,
        target_sctp_assoc_id: u32,
        ecgi: Ecgi,
        tai: Tai,
    },
}

impl MmeAppMessage {
    /// Message name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            MmeAppMessage::InitialUeMessage { .. } => "S1AP_INITIAL_UE_MESSAGE",
            MmeAppMessage::UplinkDataInd { .. } => "S1AP_UPLINK_DATA_IND",
            MmeAppMessage::UeContextReleaseReq { .. } => "S1AP_UE_CONTEXT_RELEASE_REQ",
            MmeAppMessage::UeContextReleaseComplete { .. } => "S1AP_UE_CONTEXT_RELEASE_COMPLETE",
            MmeAppMessage::EnbDeregisteredInd { .. } => "S1AP_ENB_DEREGISTERED_IND",
            MmeAppMessage::EnbInitiatedResetReq { .. } => "S1AP_ENB_INITIATED_RESET_REQ",
            MmeAppMessage::HandoverNotify { .. } => "S1AP_HANDOVER_NOTIFY",
        }
    }
}
