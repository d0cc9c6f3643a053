//! S1AP Error Types

use std::fmt;

use ogs_core::MapError;

/// S1AP Result type
pub type S1apResult<T> = Result<T, S1apError>;

/// S1AP Error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S1apError {
    /// No eNB on this SCTP association
    UnknownEnb(u32),
    /// No UE context for these ids
    UnknownUe { mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32 },
    /// Procedure not allowed in the current eNB/UE state
    InvalidState(String),
    /// Invalid IE value
    InvalidIeValue { ie_name: &'static str, reason: String },
    /// Missing mandatory IE
    MissingMandatoryIe(&'static str),
    /// Protocol error
    ProtocolError(String),
    /// Context store error
    Map(MapError),
}

impl fmt::Display for S1apError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            S1apError::UnknownEnb(assoc_id) => write!(f, "Unknown eNB on assoc {assoc_id}"),
            S1apError::UnknownUe {
                mme_ue_s1ap_id,
                enb_ue_s1ap_id,
            } => write!(
                f,
                "Unknown UE MME_UE_S1AP_ID[{mme_ue_s1ap_id:#x}] ENB_UE_S1AP_ID[{enb_ue_s1ap_id:#x}]"
            ),
            S1apError::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            S1apError::InvalidIeValue { ie_name, reason } => {
                write!(f, "Invalid IE value for {ie_name}: {reason}")
            }
            S1apError::MissingMandatoryIe(ie_name) => {
                write!(f, "Missing mandatory IE: {ie_name}")
            }
            S1apError::ProtocolError(msg) => write!(f, "Protocol error: {msg}"),
            S1apError::Map(e) => write!(f, "Map error: {e}"),
        }
    }
}

impl std::error::Error for S1apError {}

impl From<MapError> for S1apError {
    fn from(e: MapError) -> Self {
        S1apError::Map(e)
    }
}
