//! S1AP Message Builders
//!
//! Assemble outgoing S1AP PDUs from context values. Encoding to APER is done
//! by the codec on the SCTP side.

use bytes::Bytes;

use crate::error::{S1apError, S1apResult};
use crate::message::{PagingId, PagingRequest, S1ReleaseCause};
use crate::pdu::*;
use crate::types::*;

/// Build an S1 Setup Response PDU
pub fn build_s1_setup_response(
    mme_name: Option<&str>,
    served_gummeis: Vec<ServedGummeiItem>,
    relative_mme_capacity: u8,
) -> S1apPdu {
    S1apPdu::S1SetupResponse(S1SetupResponse {
        mme_name: mme_name.map(str::to_owned),
        served_gummeis,
        relative_mme_capacity,
    })
}

/// Build an S1 Setup Failure PDU
pub fn build_s1_setup_failure(cause: Cause, time_to_wait: Option<TimeToWait>) -> S1apPdu {
    S1apPdu::S1SetupFailure(S1SetupFailure { cause, time_to_wait })
}

/// Build a Downlink NAS Transport PDU
pub fn build_downlink_nas_transport(mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32, nas_pdu: Bytes) -> S1apPdu {
    S1apPdu::DownlinkNasTransport(DownlinkNasTransport {
        mme_ue_s1ap_id,
        enb_ue_s1ap_id,
        nas_pdu,
    })
}

/// Build a UE Context Release Command PDU
///
/// Fails for causes that have no S1AP counterpart (local releases).
pub fn build_ue_context_release_command(
    mme_ue_s1ap_id: u32,
    enb_ue_s1ap_id: u32,
    cause: S1ReleaseCause,
) -> S1apResult<S1apPdu> {
    let cause = cause.to_s1ap_cause().ok_or_else(|| S1apError::InvalidIeValue {
        ie_name: "Cause",
        reason: format!("{cause:?} has no S1AP cause"),
    })?;
    Ok(S1apPdu::UeContextReleaseCommand(UeContextReleaseCommand {
        ue_s1ap_ids: UeS1apIds::Pair {
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
        },
        cause,
    }))
}

/// Build a Paging PDU
///
/// The TAI list is the concatenation of every paging TAI list.
pub fn build_paging(req: &PagingRequest, ue_identity_index_value: u16) -> S1apPdu {
    let (s_tmsi, imsi) = match req.paging_id {
        PagingId::STmsi(s_tmsi) => (Some(s_tmsi), None),
        PagingId::Imsi => (None, Some(req.imsi.clone())),
    };
    S1apPdu::Paging(Paging {
        ue_identity_index_value,
        s_tmsi,
        imsi,
        cn_domain: req.domain,
        tai_list: req.tai_lists.iter().flat_map(|l| l.tais.iter().copied()).collect(),
    })
}

/// Build a Handover Command PDU
pub fn build_handover_command(
    mme_ue_s1ap_id: u32,
    enb_ue_s1ap_id: u32,
    handover_type: HandoverType,
    target_to_source_container: Bytes,
) -> S1apPdu {
    S1apPdu::HandoverCommand(HandoverCommand {
        mme_ue_s1ap_id,
        enb_ue_s1ap_id,
        handover_type,
        target_to_source_container,
    })
}

/// Build a Reset Acknowledge PDU
pub fn build_reset_acknowledge(connections: Vec<UeAssociatedLogicalS1Connection>) -> S1apPdu {
    S1apPdu::ResetAcknowledge(ResetAcknowledge { connections })
}
