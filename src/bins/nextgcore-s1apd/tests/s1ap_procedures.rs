//! S1AP procedure integration tests
//!
//! Drive the S1AP task through complete eNB and UE procedures and check the
//! PDUs towards the eNB, the messages towards MME-APP and the final tables.
//!
//! Reference: 3GPP TS 36.413

mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use common::*;
use nextgcore_s1apd::context::{EnbS1State, UeS1State};
use nextgcore_s1apd::S1apTaskMessage;
use ogs_s1ap::*;

// ============================================================================
// S1 Setup
// ============================================================================

#[test]
fn test_s1_setup_then_duplicate_enb_id_on_new_association() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x100);
    mme.attach(1, 10, 1000, TEST_IMSI);

    // Same eNB reconnects on another association before the old one is torn down
    mme.bring_up_enb(2, 0x100);

    let state = mme.task.manager_mut().get_state(false);
    assert!(state.get_enb(1).is_none());
    assert_eq!(state.get_enb(2).map(|enb| enb.s1_state), Some(EnbS1State::Ready));
    assert_eq!(state.num_enbs(), 1);
    assert!(state.ues().is_empty());

    let sent = mme.to_mme_app();
    assert!(sent.iter().any(|m| matches!(
        m,
        MmeAppMessage::EnbDeregisteredInd { enb_id: 0x100, ues } if ues.len() == 1
    )));
    assert_eq!(mme.task.manager_mut().get_s1ap_imsi_map().get_imsi(1000), None);
}

#[test]
fn test_s1_setup_rejected_when_enb_limit_reached() {
    let config = nextgcore_s1apd::S1apConfig {
        max_enbs: 1,
        ..Default::default()
    };
    let mut mme = TestMme::with_config(config);
    mme.bring_up_enb(1, 0x1);

    mme.connect(2);
    mme.pdu(2, 0, S1apPdu::S1SetupRequest(setup_request(0x2, 1))).unwrap();
    let sent = mme.to_enb();
    match &sent[0].pdu {
        S1apPdu::S1SetupFailure(failure) => {
            assert_eq!(failure.cause, Cause::Misc(cause_misc::CONTROL_PROCESSING_OVERLOAD));
            assert_eq!(failure.time_to_wait, Some(TimeToWait::V20s));
        }
        other => panic!("expected S1 Setup Failure, got {other:?}"),
    }

    // A READY eNB repeating its setup is not counted twice
    mme.pdu(1, 0, S1apPdu::S1SetupRequest(setup_request(0x1, 1))).unwrap();
    assert!(matches!(mme.to_enb()[0].pdu, S1apPdu::S1SetupResponse(_)));
}

#[test]
fn test_s1_setup_with_unserved_tac() {
    let mut mme = TestMme::new(false);
    mme.connect(1);
    mme.pdu(1, 0, S1apPdu::S1SetupRequest(setup_request(0x1, 99))).unwrap();
    match &mme.to_enb()[0].pdu {
        S1apPdu::S1SetupFailure(failure) => {
            assert_eq!(failure.cause, Cause::Misc(cause_misc::UNKNOWN_PLMN));
        }
        other => panic!("expected S1 Setup Failure, got {other:?}"),
    }
    let state = mme.task.manager_mut().get_state(false);
    assert_eq!(state.get_enb(1).map(|enb| enb.s1_state), Some(EnbS1State::Init));
    assert_eq!(state.num_enbs(), 0);
}

// ============================================================================
// Attach and release
// ============================================================================

#[test]
fn test_attach_uplink_and_normal_release() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.pdu(
        1,
        1,
        S1apPdu::UplinkNasTransport(UplinkNasTransport {
            mme_ue_s1ap_id: 500,
            enb_ue_s1ap_id: 7,
            nas_pdu: Bytes::from_static(b"attach-complete"),
            ecgi: Ecgi::default(),
            tai: Tai::default(),
        }),
    )
    .unwrap();
    assert!(matches!(
        mme.to_mme_app()[0],
        MmeAppMessage::UplinkDataInd { mme_ue_s1ap_id: 500, enb_ue_s1ap_id: 7, .. }
    ));

    mme.release_command(500, 7, S1ReleaseCause::NasDetach);
    let sent = mme.to_enb();
    assert!(matches!(sent[0].pdu, S1apPdu::UeContextReleaseCommand(_)));
    assert_eq!(sent[0].mme_ue_s1ap_id, 500);
    assert_eq!(mme.task.timers().count(), 1);

    mme.pdu(
        1,
        1,
        S1apPdu::UeContextReleaseComplete(UeContextReleaseComplete {
            mme_ue_s1ap_id: 500,
            enb_ue_s1ap_id: 7,
        }),
    )
    .unwrap();
    assert!(matches!(
        mme.to_mme_app()[0],
        MmeAppMessage::UeContextReleaseComplete { mme_ue_s1ap_id: 500, enb_id: 0x1, .. }
    ));
    assert_eq!(mme.task.timers().count(), 0);
    assert!(mme.task.manager_mut().get_state(false).ues().is_empty());
}

#[test]
fn test_downlink_nas_dropped_while_waiting_release() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);
    mme.release_command(500, 7, S1ReleaseCause::NasNormalRelease);
    mme.to_enb();

    mme.send(S1apTaskMessage::NasDlDataReq(NasDlDataReq {
        enb_ue_s1ap_id: 7,
        mme_ue_s1ap_id: 500,
        imsi64: TEST_IMSI,
        nas_msg: Bytes::from_static(b"late"),
    }))
    .unwrap();
    assert!(mme.to_enb().is_empty());
}

#[test]
fn test_release_guard_expires_without_complete() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);
    mme.release_command(500, 7, S1ReleaseCause::NasDetach);

    let later = Instant::now() + Duration::from_millis(u64::from(mme.config.ue_context_release_timer_msec()) + 100);
    assert_eq!(mme.task.process_timers_at(later), 1);
    assert!(matches!(
        mme.to_mme_app()[0],
        MmeAppMessage::UeContextReleaseComplete { mme_ue_s1ap_id: 500, .. }
    ));

    // The eNB answering late finds nothing to release
    mme.pdu(
        1,
        1,
        S1apPdu::UeContextReleaseComplete(UeContextReleaseComplete {
            mme_ue_s1ap_id: 500,
            enb_ue_s1ap_id: 7,
        }),
    )
    .unwrap();
    assert!(mme.to_mme_app().is_empty());
}

#[test]
fn test_enb_release_request_forwarded_to_mme_app() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.pdu(
        1,
        1,
        S1apPdu::UeContextReleaseRequest(UeContextReleaseRequest {
            mme_ue_s1ap_id: 500,
            enb_ue_s1ap_id: 7,
            cause: Cause::RadioNetwork(cause_radio_network::USER_INACTIVITY),
        }),
    )
    .unwrap();
    assert!(matches!(
        mme.to_mme_app()[0],
        MmeAppMessage::UeContextReleaseReq {
            mme_ue_s1ap_id: 500,
            relcause: S1ReleaseCause::RadioEutranGeneratedReason,
            ..
        }
    ));
}

// ============================================================================
// Association loss
// ============================================================================

#[test]
fn test_sctp_shutdown_waits_for_ue_releases() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);
    mme.attach(1, 8, 501, TEST_IMSI + 1);

    mme.send(S1apTaskMessage::SctpCloseAssociation(SctpCloseAssociation {
        assoc_id: 1,
        reset: false,
    }))
    .unwrap();
    match &mme.to_mme_app()[0] {
        MmeAppMessage::EnbDeregisteredInd { enb_id, ues } => {
            assert_eq!(*enb_id, 0x1);
            assert_eq!(ues.len(), 2);
        }
        other => panic!("expected eNB deregistered indication, got {other:?}"),
    }
    {
        let state = mme.task.manager_mut().get_state(false);
        assert_eq!(state.get_enb(1).map(|enb| enb.s1_state), Some(EnbS1State::Shutdown));
        assert_eq!(state.num_enbs(), 1);
    }

    mme.release_command(500, 7, S1ReleaseCause::SctpShutdownOrReset);
    assert!(mme.task.manager_mut().get_state(false).get_enb(1).is_some());
    mme.release_command(501, 8, S1ReleaseCause::SctpShutdownOrReset);
    assert!(mme.to_enb().is_empty());
    assert!(mme.task.manager_mut().get_state(false).get_enb(1).is_none());
    assert_eq!(mme.task.manager_mut().get_state(false).num_enbs(), 0);
}

#[test]
fn test_sctp_reset_returns_enb_to_init() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.send(S1apTaskMessage::SctpCloseAssociation(SctpCloseAssociation {
        assoc_id: 1,
        reset: true,
    }))
    .unwrap();
    assert_eq!(
        mme.task.manager_mut().get_state(false).get_enb(1).map(|enb| enb.s1_state),
        Some(EnbS1State::Reseting)
    );
    mme.release_command(500, 7, S1ReleaseCause::SctpShutdownOrReset);
    assert_eq!(
        mme.task.manager_mut().get_state(false).get_enb(1).map(|enb| enb.s1_state),
        Some(EnbS1State::Init)
    );
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn test_full_reset_round_trip() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.pdu(
        1,
        0,
        S1apPdu::Reset(Reset {
            cause: Cause::Misc(cause_misc::OM_INTERVENTION),
            reset_type: ResetType::S1Interface,
        }),
    )
    .unwrap();
    let (kind, list) = match mme.to_mme_app().remove(0) {
        MmeAppMessage::EnbInitiatedResetReq {
            reset_kind,
            ue_to_reset_list,
            ..
        } => (reset_kind, ue_to_reset_list),
        other => panic!("expected reset request, got {other:?}"),
    };
    assert_eq!(kind, ResetKind::All);
    assert_eq!(
        list,
        vec![UeAssociatedLogicalS1Connection {
            mme_ue_s1ap_id: Some(500),
            enb_ue_s1ap_id: Some(7),
        }]
    );

    mme.send(S1apTaskMessage::EnbInitiatedResetAck(EnbInitiatedResetAck {
        reset_kind: ResetKind::All,
        sctp_assoc_id: 1,
        sctp_stream_id: 0,
        ue_to_reset_list: list,
    }))
    .unwrap();
    let sent = mme.to_enb();
    assert_eq!(sent[0].assoc_id, 1);
    match &sent[0].pdu {
        S1apPdu::ResetAcknowledge(ack) => assert!(ack.connections.is_empty()),
        other => panic!("expected Reset Acknowledge, got {other:?}"),
    }
}

// ============================================================================
// Paging
// ============================================================================

#[test]
fn test_paging_reaches_only_matching_enbs() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.bring_up_enb(2, 0x2);
    mme.connect(3);

    mme.send(S1apTaskMessage::PagingRequest(PagingRequest {
        imsi: TEST_IMSI.to_string(),
        paging_id: PagingId::STmsi(STmsi { mme_code: 1, m_tmsi: 0x1234 }),
        domain: CnDomain::Ps,
        tai_lists: vec![PagingTaiList {
            tais: vec![Tai { plmn: test_plmn(), tac: 1 }],
        }],
    }))
    .unwrap();
    let sent = mme.to_enb();
    let assocs: Vec<u32> = sent.iter().map(|r| r.assoc_id).collect();
    assert_eq!(assocs, vec![1, 2]);
    match &sent[0].pdu {
        S1apPdu::Paging(paging) => {
            assert_eq!(paging.ue_identity_index_value, (TEST_IMSI % 1024) as u16);
        }
        other => panic!("expected Paging, got {other:?}"),
    }
}

// ============================================================================
// Handover
// ============================================================================

#[test]
fn test_s1_handover_moves_ue_to_target() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.bring_up_enb(2, 0x2);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.send(S1apTaskMessage::HandoverCommand(HandoverCommandReq {
        mme_ue_s1ap_id: 500,
        src_enb_ue_s1ap_id: 7,
        tgt_enb_ue_s1ap_id: 70,
        source_enb_id: 0x1,
        target_enb_id: 0x2,
        source_assoc_id: 1,
        handover_type: HandoverType::IntraLte,
        tgt_src_container: Bytes::from_static(b"container"),
    }))
    .unwrap();
    let sent = mme.to_enb();
    assert_eq!(sent[0].assoc_id, 1);
    assert!(matches!(sent[0].pdu, S1apPdu::HandoverCommand(_)));

    mme.pdu(
        2,
        3,
        S1apPdu::HandoverNotify(HandoverNotify {
            mme_ue_s1ap_id: 500,
            enb_ue_s1ap_id: 70,
            ecgi: Ecgi::default(),
            tai: Tai::default(),
        }),
    )
    .unwrap();
    assert!(matches!(
        mme.to_mme_app()[0],
        MmeAppMessage::HandoverNotify { mme_ue_s1ap_id: 500, target_sctp_assoc_id: 2, .. }
    ));
    {
        let state = mme.task.manager_mut().get_state(false);
        let ue = state.get_ue_by_mme_id(500).unwrap();
        assert_eq!((ue.sctp_assoc_id, ue.enb_ue_s1ap_id), (2, 70));
        assert_eq!(ue.s1_ue_state, UeS1State::Connected);
        assert_eq!(state.get_enb(1).unwrap().nb_ue_associated(), 0);
        assert!(state.is_consistent());
    }
    assert_eq!(mme.task.manager_mut().get_s1ap_imsi_map().get_imsi(500), Some(TEST_IMSI));

    // MME-APP then releases the source side
    mme.release_command(500, 7, S1ReleaseCause::RadioEutranGeneratedReason);
    let sent = mme.to_enb();
    assert_eq!(sent[0].assoc_id, 1);
    assert!(matches!(sent[0].pdu, S1apPdu::UeContextReleaseCommand(_)));
    assert!(mme.task.manager_mut().get_state(false).get_ue_by_mme_id(500).is_some());
}

#[test]
fn test_remove_stale_ue_context() {
    let mut mme = TestMme::new(false);
    mme.bring_up_enb(1, 0x1);
    mme.attach(1, 7, 500, TEST_IMSI);

    mme.send(S1apTaskMessage::RemoveStaleUeContext {
        enb_ue_s1ap_id: 7,
        enb_id: 0x1,
    })
    .unwrap();
    assert!(mme.task.manager_mut().get_state(false).ues().is_empty());
    assert!(mme
        .send(S1apTaskMessage::RemoveStaleUeContext {
            enb_ue_s1ap_id: 7,
            enb_id: 0x1,
        })
        .is_err());
}
