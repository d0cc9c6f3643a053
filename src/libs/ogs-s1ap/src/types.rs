//! S1AP information elements
//!
//! Identity and IE types shared by the decoded PDUs, the inter-task messages
//! and the persisted context, per 3GPP TS 36.413.

use std::fmt;

/// eNB UE S1AP ID is 24 bits wide
pub const ENB_UE_S1AP_ID_MASK: u32 = 0x00FF_FFFF;
/// MME UE S1AP ID not yet assigned
pub const INVALID_MME_UE_S1AP_ID: u32 = 0xFFFF_FFFF;
/// eNB UE S1AP ID absent
pub const INVALID_ENB_UE_S1AP_ID: u32 = 0xFFFF_FFFF;
/// Global eNB ID not learnt yet (no S1 Setup)
pub const INVALID_ENB_ID: u32 = 0xFFFF_FFFF;
/// maxnoofBPLMNs
pub const S1AP_MAX_BROADCAST_PLMNS: usize = 6;
/// maxnoofTACs
pub const S1AP_MAX_TAI_ITEMS: usize = 256;
/// Upper bound on the eNB name length
pub const S1AP_ENB_NAME_MAX_LEN: usize = 150;

// ============================================================================
// PLMN / TAI / ECGI
// ============================================================================

/// PLMN identity, kept as decimal digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlmnId {
    pub mcc_digit1: u8,
    pub mcc_digit2: u8,
    pub mcc_digit3: u8,
    pub mnc_digit1: u8,
    pub mnc_digit2: u8,
    /// 0xF for a two-digit MNC
    pub mnc_digit3: u8,
}

impl PlmnId {
    /// Build from numeric MCC/MNC; `mnc_len` is 2 or 3
    pub fn new(mcc: u16, mnc: u16, mnc_len: u8) -> Self {
        let (mnc_digit1, mnc_digit2, mnc_digit3) = if mnc_len == 2 {
            ((mnc / 10 % 10) as u8, (mnc % 10) as u8, 0xF)
        } else {
            ((mnc / 100 % 10) as u8, (mnc / 10 % 10) as u8, (mnc % 10) as u8)
        };
        Self {
            mcc_digit1: (mcc / 100 % 10) as u8,
            mcc_digit2: (mcc / 10 % 10) as u8,
            mcc_digit3: (mcc % 10) as u8,
            mnc_digit1,
            mnc_digit2,
            mnc_digit3,
        }
    }

    /// Decode the 3-octet TBCD form carried in S1AP
    pub fn from_tbcd(octets: [u8; 3]) -> Self {
        Self {
            mcc_digit1: octets[0] & 0x0F,
            mcc_digit2: octets[0] >> 4,
            mcc_digit3: octets[1] & 0x0F,
            mnc_digit3: octets[1] >> 4,
            mnc_digit1: octets[2] & 0x0F,
            mnc_digit2: octets[2] >> 4,
        }
    }

    /// Encode to the 3-octet TBCD form
    pub fn to_tbcd(&self) -> [u8; 3] {
        [
            (self.mcc_digit2 << 4) | (self.mcc_digit1 & 0x0F),
            (self.mnc_digit3 << 4) | (self.mcc_digit3 & 0x0F),
            (self.mnc_digit2 << 4) | (self.mnc_digit1 & 0x0F),
        ]
    }

    pub fn mcc(&self) -> u16 {
        self.mcc_digit1 as u16 * 100 + self.mcc_digit2 as u16 * 10 + self.mcc_digit3 as u16
    }

    pub fn mnc(&self) -> u16 {
        if self.mnc_len() == 2 {
            self.mnc_digit1 as u16 * 10 + self.mnc_digit2 as u16
        } else {
            self.mnc_digit1 as u16 * 100 + self.mnc_digit2 as u16 * 10 + self.mnc_digit3 as u16
        }
    }

    pub fn mnc_len(&self) -> u8 {
        if self.mnc_digit3 == 0xF {
            2
        } else {
            3
        }
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mnc_len() == 2 {
            write!(f, "{:03}-{:02}", self.mcc(), self.mnc())
        } else {
            write!(f, "{:03}-{:03}", self.mcc(), self.mnc())
        }
    }
}

/// Tracking Area Identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tai {
    pub plmn: PlmnId,
    pub tac: u16,
}

/// E-UTRAN Cell Global Identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ecgi {
    pub plmn: PlmnId,
    /// 28-bit cell identity
    pub cell_identity: u32,
}

/// S-TMSI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct STmsi {
    pub mme_code: u8,
    pub m_tmsi: u32,
}

/// GUMMEI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gummei {
    pub plmn: PlmnId,
    pub mme_gid: u16,
    pub mme_code: u8,
}

/// Served GUMMEI item of the S1 Setup Response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServedGummeiItem {
    pub served_plmns: Vec<PlmnId>,
    pub served_group_ids: Vec<u16>,
    pub served_mme_codes: Vec<u8>,
}

/// eNB ID choice of the Global eNB ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnbId {
    /// 20-bit macro eNB ID
    Macro(u32),
    /// 28-bit home eNB ID
    Home(u32),
}

impl EnbId {
    pub fn value(&self) -> u32 {
        match *self {
            EnbId::Macro(id) => id & 0x000F_FFFF,
            EnbId::Home(id) => id & 0x0FFF_FFFF,
        }
    }
}

/// Global eNB ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEnbId {
    pub plmn: PlmnId,
    pub enb_id: EnbId,
}

/// Supported TA item advertised in S1 Setup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedTaItem {
    pub tac: u16,
    pub broadcast_plmns: Vec<PlmnId>,
}

/// UE S1AP IDs of a UE Context Release Command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeS1apIds {
    Pair { mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32 },
    MmeOnly(u32),
}

/// UE-associated logical S1 connection item (Reset / Reset Acknowledge)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UeAssociatedLogicalS1Connection {
    pub mme_ue_s1ap_id: Option<u32>,
    pub enb_ue_s1ap_id: Option<u32>,
}

// ============================================================================
// Enumerated IEs
// ============================================================================

/// Default paging DRX
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PagingDrx {
    V32,
    V64,
    #[default]
    V128,
    V256,
}

impl PagingDrx {
    pub fn to_u32(self) -> u32 {
        match self {
            PagingDrx::V32 => 0,
            PagingDrx::V64 => 1,
            PagingDrx::V128 => 2,
            PagingDrx::V256 => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PagingDrx::V32),
            1 => Some(PagingDrx::V64),
            2 => Some(PagingDrx::V128),
            3 => Some(PagingDrx::V256),
            _ => None,
        }
    }
}

/// Time to wait in S1 Setup Failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeToWait {
    V1s,
    V2s,
    V5s,
    V10s,
    V20s,
    V60s,
}

/// RRC establishment cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RrcEstablishmentCause {
    Emergency,
    HighPriorityAccess,
    MtAccess,
    #[default]
    MoSignalling,
    MoData,
    DelayTolerantAccess,
    MoVoiceCall,
}

/// CN domain of a paging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CnDomain {
    #[default]
    Ps,
    Cs,
}

/// Handover type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandoverType {
    #[default]
    IntraLte,
    LteToUtran,
    LteToGeran,
    UtranToLte,
    GeranToLte,
}

// ============================================================================
// Cause
// ============================================================================

/// S1AP cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    RadioNetwork(u8),
    Transport(u8),
    Nas(u8),
    Protocol(u8),
    Misc(u8),
}

/// CauseRadioNetwork values
pub mod cause_radio_network {
    pub const UNSPECIFIED: u8 = 0;
    pub const RELEASE_DUE_TO_EUTRAN_GENERATED_REASON: u8 = 3;
    pub const UNKNOWN_MME_UE_S1AP_ID: u8 = 13;
    pub const USER_INACTIVITY: u8 = 20;
    pub const RADIO_CONNECTION_WITH_UE_LOST: u8 = 21;
    pub const LOAD_BALANCING_TAU_REQUIRED: u8 = 22;
    pub const CS_FALLBACK_TRIGGERED: u8 = 23;
    pub const UE_NOT_AVAILABLE_FOR_PS_SERVICE: u8 = 24;
    pub const MULTIPLE_E_RAB_ID_INSTANCES: u8 = 31;
}

/// CauseTransport values
pub mod cause_transport {
    pub const TRANSPORT_RESOURCE_UNAVAILABLE: u8 = 0;
    pub const UNSPECIFIED: u8 = 1;
}

/// CauseNas values
pub mod cause_nas {
    pub const NORMAL_RELEASE: u8 = 0;
    pub const AUTHENTICATION_FAILURE: u8 = 1;
    pub const DETACH: u8 = 2;
    pub const UNSPECIFIED: u8 = 3;
}

/// CauseProtocol values
pub mod cause_protocol {
    pub const SEMANTIC_ERROR: u8 = 4;
    pub const UNSPECIFIED: u8 = 6;
}

/// CauseMisc values
pub mod cause_misc {
    pub const CONTROL_PROCESSING_OVERLOAD: u8 = 0;
    pub const HARDWARE_FAILURE: u8 = 2;
    pub const OM_INTERVENTION: u8 = 3;
    pub const UNSPECIFIED: u8 = 4;
    pub const UNKNOWN_PLMN: u8 = 5;
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::RadioNetwork(v) => write!(f, "radioNetwork({v})"),
            Cause::Transport(v) => write!(f, "transport({v})"),
            Cause::Nas(v) => write!(f, "nas({v})"),
            Cause::Protocol(v) => write!(f, "protocol({v})"),
            Cause::Misc(v) => write!(f, "misc({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plmn_tbcd_two_digit_mnc() {
        let plmn = PlmnId::new(1, 1, 2);
        assert_eq!(plmn.to_tbcd(), [0x00, 0xF1, 0x10]);
        assert_eq!(PlmnId::from_tbcd(plmn.to_tbcd()), plmn);
        assert_eq!(plmn.mnc_len(), 2);
        assert_eq!(plmn.to_string(), "001-01");
    }

    #[test]
    fn test_plmn_tbcd_three_digit_mnc() {
        let plmn = PlmnId::new(310, 410, 3);
        assert_eq!(plmn.mcc(), 310);
        assert_eq!(plmn.mnc(), 410);
        assert_eq!(PlmnId::from_tbcd(plmn.to_tbcd()), plmn);
        assert_eq!(plmn.to_string(), "310-410");
    }

    #[test]
    fn test_enb_id_width() {
        assert_eq!(EnbId::Macro(0xFFF_FFFF).value(), 0xF_FFFF);
        assert_eq!(EnbId::Home(0xFFFF_FFFF).value(), 0xFFF_FFFF);
    }

    #[test]
    fn test_paging_drx_codes() {
        for drx in [PagingDrx::V32, PagingDrx::V64, PagingDrx::V128, PagingDrx::V256] {
            assert_eq!(PagingDrx::from_u32(drx.to_u32()), Some(drx));
        }
        assert_eq!(PagingDrx::from_u32(9), None);
    }
}
