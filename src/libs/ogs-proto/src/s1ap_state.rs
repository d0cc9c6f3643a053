//! S1AP task records
//!
//! Field tags are the stored wire format and must not be renumbered. Maps
//! are ordered so that encoding the same state twice yields identical bytes.

use std::collections::BTreeMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timer {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint32, tag = "2")]
    pub msec: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedTaiItems {
    #[prost(uint32, tag = "1")]
    pub tac: u32,
    #[prost(uint32, tag = "2")]
    pub bplmnlist_count: u32,
    /// 3-octet TBCD PLMN identities
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub bplmns: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SupportedTaList {
    #[prost(uint32, tag = "1")]
    pub list_count: u32,
    #[prost(message, repeated, tag = "2")]
    pub supported_tai_items: Vec<SupportedTaiItems>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EnbS1State {
    S1apInit = 0,
    S1apReseting = 1,
    S1apReady = 2,
    S1apShutdown = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnbDescription {
    #[prost(uint32, tag = "1")]
    pub enb_id: u32,
    #[prost(enumeration = "EnbS1State", tag = "2")]
    pub s1_state: i32,
    #[prost(string, tag = "3")]
    pub enb_name: String,
    #[prost(uint32, tag = "4")]
    pub default_paging_drx: u32,
    #[prost(uint32, tag = "5")]
    pub nb_ue_associated: u32,
    #[prost(uint32, tag = "6")]
    pub sctp_assoc_id: u32,
    #[prost(uint32, tag = "7")]
    pub next_sctp_stream: u32,
    #[prost(uint32, tag = "8")]
    pub instreams: u32,
    #[prost(uint32, tag = "9")]
    pub outstreams: u32,
    #[prost(bytes = "vec", tag = "10")]
    pub ran_cp_ipaddr: Vec<u8>,
    #[prost(uint32, tag = "11")]
    pub ran_cp_ipaddr_sz: u32,
    #[prost(message, optional, tag = "12")]
    pub supported_ta_list: Option<SupportedTaList>,
    /// Composite S1AP ids of the UEs served by this eNB
    #[prost(uint64, repeated, tag = "13")]
    pub ue_ids: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum UeS1State {
    S1apUeInvalidState = 0,
    S1apUeWaitingCsr = 1,
    S1apUeHandover = 2,
    S1apUeConnected = 3,
    S1apUeWaitingCrr = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct S1apHandoverState {
    #[prost(uint32, tag = "1")]
    pub mme_ue_s1ap_id: u32,
    #[prost(uint32, tag = "2")]
    pub source_enb_id: u32,
    #[prost(uint32, tag = "3")]
    pub target_enb_id: u32,
    #[prost(uint32, tag = "4")]
    pub target_enb_ue_s1ap_id: u32,
    #[prost(uint32, tag = "5")]
    pub target_sctp_stream_recv: u32,
    #[prost(uint32, tag = "6")]
    pub target_sctp_stream_send: u32,
    #[prost(uint32, tag = "7")]
    pub source_enb_ue_s1ap_id: u32,
    #[prost(uint32, tag = "8")]
    pub source_sctp_stream_recv: u32,
    #[prost(uint32, tag = "9")]
    pub source_sctp_stream_send: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UeDescription {
    #[prost(enumeration = "UeS1State", tag = "1")]
    pub s1_ue_state: i32,
    #[prost(uint32, tag = "2")]
    pub enb_ue_s1ap_id: u32,
    #[prost(uint32, tag = "3")]
    pub mme_ue_s1ap_id: u32,
    #[prost(uint32, tag = "4")]
    pub sctp_assoc_id: u32,
    #[prost(uint32, tag = "5")]
    pub sctp_stream_recv: u32,
    #[prost(uint32, tag = "6")]
    pub sctp_stream_send: u32,
    #[prost(message, optional, tag = "7")]
    pub s1ap_ue_context_rel_timer: Option<Timer>,
    #[prost(message, optional, tag = "8")]
    pub s1ap_handover_state: Option<S1apHandoverState>,
    #[prost(uint64, tag = "9")]
    pub comp_s1ap_id: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct S1apState {
    #[prost(btree_map = "uint32, message", tag = "1")]
    pub enbs: BTreeMap<u32, EnbDescription>,
    #[prost(btree_map = "uint32, uint32", tag = "2")]
    pub mmeid2associd: BTreeMap<u32, u32>,
    #[prost(uint32, tag = "3")]
    pub num_enbs: u32,
    #[prost(btree_map = "uint64, message", tag = "4")]
    pub ues: BTreeMap<u64, UeDescription>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct S1apImsiMap {
    #[prost(btree_map = "uint32, uint64", tag = "1")]
    pub mme_ue_id_imsi_map: BTreeMap<u32, u64>,
}
