//! S1AP procedure messages
//!
//! In-memory form of the S1AP PDUs exchanged with the ASN.1 codec. The
//! codec hands decoded messages to the S1AP task as [`S1apPdu`] and takes
//! outgoing ones back in the same shape.

use bytes::Bytes;

use crate::types::*;

// ============================================================================
// eNB -> MME
// ============================================================================

/// S1 Setup Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S1SetupRequest {
    pub global_enb_id: GlobalEnbId,
    pub enb_name: Option<String>,
    pub supported_tas: Vec<SupportedTaItem>,
    pub default_paging_drx: PagingDrx,
}

/// Initial UE Message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialUeMessage {
    pub enb_ue_s1ap_id: u32,
    pub nas_pdu: Bytes,
    pub tai: Tai,
    pub ecgi: Ecgi,
    pub rrc_establishment_cause: RrcEstablishmentCause,
    pub s_tmsi: Option<STmsi>,
    pub csg_id: Option<u32>,
    pub gummei: Option<Gummei>,
}

/// Uplink NAS Transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkNasTransport {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub nas_pdu: Bytes,
    pub ecgi: Ecgi,
    pub tai: Tai,
}

/// UE Context Release Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseRequest {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub cause: Cause,
}

/// UE Context Release Complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseComplete {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
}

/// Reset type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetType {
    /// Reset the whole S1 interface
    S1Interface,
    /// Reset the listed UE-associated logical connections
    PartOfS1Interface(Vec<UeAssociatedLogicalS1Connection>),
}

/// Reset (eNB initiated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    pub cause: Cause,
    pub reset_type: ResetType,
}

/// Handover Notify, received from the target eNB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverNotify {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub ecgi: Ecgi,
    pub tai: Tai,
}

// ============================================================================
// MME -> eNB
// ============================================================================

/// S1 Setup Response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S1SetupResponse {
    pub mme_name: Option<String>,
    pub served_gummeis: Vec<ServedGummeiItem>,
    pub relative_mme_capacity: u8,
}

/// S1 Setup Failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S1SetupFailure {
    pub cause: Cause,
    pub time_to_wait: Option<TimeToWait>,
}

/// Downlink NAS Transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkNasTransport {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub nas_pdu: Bytes,
}

/// UE Context Release Command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseCommand {
    pub ue_s1ap_ids: UeS1apIds,
    pub cause: Cause,
}

/// Paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paging {
    pub ue_identity_index_value: u16,
    pub s_tmsi: Option<STmsi>,
    pub imsi: Option<String>,
    pub cn_domain: CnDomain,
    pub tai_list: Vec<Tai>,
}

/// Handover Command, sent to the source eNB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverCommand {
    pub mme_ue_s1ap_id: u32,
    pub enb_ue_s1ap_id: u32,
    pub handover_type: HandoverType,
    pub target_to_source_container: Bytes,
}

/// Reset Acknowledge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetAcknowledge {
    /// Empty for a full reset
    pub connections: Vec<UeAssociatedLogicalS1Connection>,
}

// ============================================================================
// PDU
// ============================================================================

/// Decoded S1AP PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S1apPdu {
    S1SetupRequest(S1SetupRequest),
    S1SetupResponse(S1SetupResponse),
    S1SetupFailure(S1SetupFailure),
    InitialUeMessage(InitialUeMessage),
    UplinkNasTransport(UplinkNasTransport),
    DownlinkNasTransport(DownlinkNasTransport),
    UeContextReleaseRequest(UeContextReleaseRequest),
    UeContextReleaseCommand(UeContextReleaseCommand),
    UeContextReleaseComplete(UeContextReleaseComplete),
    Paging(Paging),
    Reset(Reset),
    ResetAcknowledge(ResetAcknowledge),
    HandoverCommand(HandoverCommand),
    HandoverNotify(HandoverNotify),
    /// A procedure this MME does not handle, by procedure code
    Unsupported(u8),
}

impl S1apPdu {
    /// Procedure name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            S1apPdu::S1SetupRequest(_) => "S1SetupRequest",
            S1apPdu::S1SetupResponse(_) => "S1SetupResponse",
            S1apPdu::S1SetupFailure(_) => "S1SetupFailure",
            S1apPdu::InitialUeMessage(_) => "InitialUEMessage",
            S1apPdu::UplinkNasTransport(_) => "UplinkNASTransport",
            S1apPdu::DownlinkNasTransport(_) => "DownlinkNASTransport",
            S1apPdu::UeContextReleaseRequest(_) => "UEContextReleaseRequest",
            S1apPdu::UeContextReleaseCommand(_) => "UEContextReleaseCommand",
            S1apPdu::UeContextReleaseComplete(_) => "UEContextReleaseComplete",
            S1apPdu::Paging(_) => "Paging",
            S1apPdu::Reset(_) => "Reset",
            S1apPdu::ResetAcknowledge(_) => "ResetAcknowledge",
            S1apPdu::HandoverCommand(_) => "HandoverCommand",
            S1apPdu::HandoverNotify(_) => "HandoverNotify",
            S1apPdu::Unsupported(_) => "Unsupported",
        }
    }
}
