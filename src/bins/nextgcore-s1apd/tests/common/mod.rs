//! Common test utilities
//!
//! A test MME wraps one S1AP task over an in-memory store and a recording
//! sink, with helpers that drive eNBs and UEs through the usual procedures.

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use nextgcore_s1apd::{Fsm, RecordingSink, S1apConfig, S1apTask, S1apTaskMessage};
use ogs_dbi::InMemoryKvStore;
use ogs_s1ap::*;

pub const TEST_IMSI: u64 = 1010123456789;

pub fn test_plmn() -> PlmnId {
    PlmnId::new(1, 1, 2)
}

pub fn setup_request(enb_id: u32, tac: u16) -> S1SetupRequest {
    S1SetupRequest {
        global_enb_id: GlobalEnbId {
            plmn: test_plmn(),
            enb_id: EnbId::Macro(enb_id),
        },
        enb_name: Some(format!("enb-{enb_id:x}")),
        supported_tas: vec![SupportedTaItem {
            tac,
            broadcast_plmns: vec![test_plmn()],
        }],
        default_paging_drx: PagingDrx::V128,
    }
}

pub fn initial_ue_message(enb_ue_s1ap_id: u32) -> InitialUeMessage {
    InitialUeMessage {
        enb_ue_s1ap_id,
        nas_pdu: Bytes::from_static(b"attach-request"),
        tai: Tai { plmn: test_plmn(), tac: 1 },
        ecgi: Ecgi { plmn: test_plmn(), cell_identity: 0x10 },
        rrc_establishment_cause: RrcEstablishmentCause::MoSignalling,
        s_tmsi: None,
        csg_id: None,
        gummei: None,
    }
}

/// One S1AP task plus its store, restartable over the same store
pub struct TestMme {
    pub store: Arc<InMemoryKvStore>,
    pub config: S1apConfig,
    pub task: S1apTask<RecordingSink>,
}

impl TestMme {
    pub fn new(stateless: bool) -> Self {
        let config = S1apConfig {
            use_stateless: stateless,
            ..S1apConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: S1apConfig) -> Self {
        let store = Arc::new(InMemoryKvStore::new());
        let task = Self::start_task(&store, &config);
        Self { store, config, task }
    }

    fn start_task(store: &Arc<InMemoryKvStore>, config: &S1apConfig) -> S1apTask<RecordingSink> {
        let mut task = S1apTask::new(config.clone(), store.clone(), RecordingSink::new());
        task.init();
        task.handle_message(S1apTaskMessage::Activate).unwrap();
        task
    }

    /// Drop the task without a final checkpoint and start a new one
    pub fn crash_and_restart(&mut self) {
        self.task = Self::start_task(&self.store, &self.config);
    }

    pub fn send(&mut self, msg: S1apTaskMessage) -> S1apResult<()> {
        self.task.handle_message(msg)
    }

    pub fn pdu(&mut self, assoc_id: u32, stream: u16, pdu: S1apPdu) -> S1apResult<()> {
        self.send(S1apTaskMessage::SctpDataInd(SctpDataInd { assoc_id, stream, pdu }))
    }

    pub fn to_enb(&mut self) -> Vec<SctpDataReq> {
        self.task.sink_mut().take_to_enb()
    }

    pub fn to_mme_app(&mut self) -> Vec<MmeAppMessage> {
        self.task.sink_mut().take_to_mme_app()
    }

    pub fn connect(&mut self, assoc_id: u32) {
        self.send(S1apTaskMessage::SctpNewAssociation(SctpNewPeer {
            assoc_id,
            instreams: 8,
            outstreams: 8,
            ran_cp_ipaddr: Bytes::from(vec![192, 168, 0, assoc_id as u8]),
        }))
        .unwrap();
    }

    /// Association plus successful S1 Setup
    pub fn bring_up_enb(&mut self, assoc_id: u32, enb_id: u32) {
        self.connect(assoc_id);
        self.pdu(assoc_id, 0, S1apPdu::S1SetupRequest(setup_request(enb_id, 1)))
            .unwrap();
        let sent = self.to_enb();
        assert!(
            matches!(sent.last().map(|r| &r.pdu), Some(S1apPdu::S1SetupResponse(_))),
            "S1 Setup of eNB {enb_id:#x} failed: {sent:?}"
        );
    }

    /// Initial UE Message, MME UE id assignment and a first downlink NAS
    pub fn attach(&mut self, assoc_id: u32, enb_ue_s1ap_id: u32, mme_ue_s1ap_id: u32, imsi64: u64) {
        self.pdu(assoc_id, 1, S1apPdu::InitialUeMessage(initial_ue_message(enb_ue_s1ap_id)))
            .unwrap();
        self.send(S1apTaskMessage::MmeUeIdNotification(MmeUeIdNotification {
            enb_ue_s1ap_id,
            mme_ue_s1ap_id,
            sctp_assoc_id: assoc_id,
        }))
        .unwrap();
        self.send(S1apTaskMessage::NasDlDataReq(NasDlDataReq {
            enb_ue_s1ap_id,
            mme_ue_s1ap_id,
            imsi64,
            nas_msg: Bytes::from_static(b"attach-accept"),
        }))
        .unwrap();
        self.to_enb();
        self.to_mme_app();
    }

    pub fn release_command(&mut self, mme_ue_s1ap_id: u32, enb_ue_s1ap_id: u32, cause: S1ReleaseCause) {
        self.send(S1apTaskMessage::UeContextReleaseCommand(UeContextReleaseCommandReq {
            mme_ue_s1ap_id,
            enb_ue_s1ap_id,
            cause,
        }))
        .unwrap();
    }
}
