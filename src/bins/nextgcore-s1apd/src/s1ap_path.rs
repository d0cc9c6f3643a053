//! S1AP Path Functions
//!
//! Outbound side of the S1AP task: PDUs towards the SCTP layer and
//! messages towards MME-APP both leave through an [`S1apSink`].

use std::sync::mpsc::{channel, Receiver, Sender};

use ogs_s1ap::{MmeAppMessage, S1apError, S1apPdu, S1apResult, SctpDataReq, INVALID_MME_UE_S1AP_ID};

use crate::context::{UeDescription, S1AP_NON_UE_STREAM};

/// Destination of everything the S1AP task emits
pub trait S1apSink {
    /// Hand a PDU to the SCTP layer
    fn sctp_data_req(&mut self, req: SctpDataReq) -> S1apResult<()>;

    /// Hand a message to MME-APP
    fn mme_app_send(&mut self, msg: MmeAppMessage) -> S1apResult<()>;
}

// ============================================================================
// Sinks
// ============================================================================

/// Keeps every outbound message in order of emission
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub to_enb: Vec<SctpDataReq>,
    pub to_mme_app: Vec<MmeAppMessage>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_to_enb(&mut self) -> Vec<SctpDataReq> {
        std::mem::take(&mut self.to_enb)
    }

    pub fn take_to_mme_app(&mut self) -> Vec<MmeAppMessage> {
        std::mem::take(&mut self.to_mme_app)
    }

    pub fn is_empty(&self) -> bool {
        self.to_enb.is_empty() && self.to_mme_app.is_empty()
    }
}

impl S1apSink for RecordingSink {
    fn sctp_data_req(&mut self, req: SctpDataReq) -> S1apResult<()> {
        self.to_enb.push(req);
        Ok(())
    }

    fn mme_app_send(&mut self, msg: MmeAppMessage) -> S1apResult<()> {
        self.to_mme_app.push(msg);
        Ok(())
    }
}

/// Forwards onto the SCTP and MME-APP task queues
pub struct ChannelSink {
    sctp_tx: Sender<SctpDataReq>,
    mme_app_tx: Sender<MmeAppMessage>,
}

impl ChannelSink {
    /// Sink plus the receiving ends for the SCTP and MME-APP tasks
    pub fn new() -> (Self, Receiver<SctpDataReq>, Receiver<MmeAppMessage>) {
        let (sctp_tx, sctp_rx) = channel();
        let (mme_app_tx, mme_app_rx) = channel();
        (Self { sctp_tx, mme_app_tx }, sctp_rx, mme_app_rx)
    }
}

impl S1apSink for ChannelSink {
    fn sctp_data_req(&mut self, req: SctpDataReq) -> S1apResult<()> {
        self.sctp_tx
            .send(req)
            .map_err(|_| S1apError::ProtocolError("SCTP task queue closed".to_string()))
    }

    fn mme_app_send(&mut self, msg: MmeAppMessage) -> S1apResult<()> {
        self.mme_app_tx
            .send(msg)
            .map_err(|_| S1apError::ProtocolError("MME-APP task queue closed".to_string()))
    }
}

// ============================================================================
// Send helpers
// ============================================================================

/// Send non-UE-associated signalling on `stream`
pub fn s1ap_send_to_enb(sink: &mut dyn S1apSink, sctp_assoc_id: u32, stream: u16, pdu: S1apPdu) -> S1apResult<()> {
    log::debug!("[S1AP] {} -> assoc {} stream {}", pdu.name(), sctp_assoc_id, stream);
    sink.sctp_data_req(SctpDataReq {
        assoc_id: sctp_assoc_id,
        stream,
        mme_ue_s1ap_id: INVALID_MME_UE_S1AP_ID,
        pdu,
    })
}

/// Send non-UE-associated signalling on the common stream
pub fn s1ap_send_non_ue_signalling(sink: &mut dyn S1apSink, sctp_assoc_id: u32, pdu: S1apPdu) -> S1apResult<()> {
    s1ap_send_to_enb(sink, sctp_assoc_id, S1AP_NON_UE_STREAM, pdu)
}

/// Send UE-associated signalling on an explicit association and stream
pub fn s1ap_send_ue_signalling(
    sink: &mut dyn S1apSink,
    sctp_assoc_id: u32,
    stream: u16,
    mme_ue_s1ap_id: u32,
    pdu: S1apPdu,
) -> S1apResult<()> {
    log::debug!(
        "[S1AP] {} -> MME_UE_S1AP_ID[{:#x}] assoc {} stream {}",
        pdu.name(),
        mme_ue_s1ap_id,
        sctp_assoc_id,
        stream
    );
    sink.sctp_data_req(SctpDataReq {
        assoc_id: sctp_assoc_id,
        stream,
        mme_ue_s1ap_id,
        pdu,
    })
}

/// Send UE-associated signalling on the UE's stream
pub fn s1ap_send_to_enb_ue(sink: &mut dyn S1apSink, ue: &UeDescription, pdu: S1apPdu) -> S1apResult<()> {
    s1ap_send_ue_signalling(sink, ue.sctp_assoc_id, ue.sctp_stream_send, ue.mme_ue_s1ap_id, pdu)
}

pub fn s1ap_send_to_mme_app(sink: &mut dyn S1apSink, msg: MmeAppMessage) -> S1apResult<()> {
    log::debug!("[S1AP] {} -> MME-APP", msg.name());
    sink.mme_app_send(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogs_s1ap::build_downlink_nas_transport;

    #[test]
    fn test_send_to_enb_ue_uses_ue_stream() {
        let mut sink = RecordingSink::new();
        let mut ue = UeDescription::new(3, 5);
        ue.mme_ue_s1ap_id = 100;
        ue.sctp_stream_send = 2;
        let pdu = build_downlink_nas_transport(100, 5, bytes::Bytes::from_static(b"nas"));
        s1ap_send_to_enb_ue(&mut sink, &ue, pdu).unwrap();
        let sent = sink.take_to_enb();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].assoc_id, sent[0].stream, sent[0].mme_ue_s1ap_id), (3, 2, 100));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_non_ue_signalling_on_stream_zero() {
        let mut sink = RecordingSink::new();
        s1ap_send_non_ue_signalling(&mut sink, 4, S1apPdu::Unsupported(0)).unwrap();
        assert_eq!(sink.to_enb[0].stream, 0);
        assert_eq!(sink.to_enb[0].mme_ue_s1ap_id, INVALID_MME_UE_S1AP_ID);
    }

    #[test]
    fn test_channel_sink() {
        let (mut sink, sctp_rx, mme_app_rx) = ChannelSink::new();
        s1ap_send_non_ue_signalling(&mut sink, 1, S1apPdu::Unsupported(0)).unwrap();
        s1ap_send_to_mme_app(
            &mut sink,
            MmeAppMessage::EnbDeregisteredInd { enb_id: 1, ues: vec![] },
        )
        .unwrap();
        assert_eq!(sctp_rx.try_recv().unwrap().assoc_id, 1);
        assert!(matches!(mme_app_rx.try_recv().unwrap(), MmeAppMessage::EnbDeregisteredInd { .. }));

        drop(sctp_rx);
        assert!(s1ap_send_non_ue_signalling(&mut sink, 1, S1apPdu::Unsupported(0)).is_err());
    }
}
