//! Property-Based Tests for the S1AP state tables
//!
//! Random sequences of eNB/UE mutations must leave every derived index
//! (eNB UE collections, MME UE id index, READY eNB count) in agreement
//! with the UE and eNB tables, and must survive a snapshot restore.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::context::*;
    use crate::state::{S1apImsiMap, S1apState};
    use crate::state_converter::{proto_to_state, state_to_proto};

    // ========================================================================
    // Strategies for generating test data
    // ========================================================================

    #[derive(Debug, Clone)]
    enum Op {
        AddEnb(u32),
        SetEnbState(u32, EnbS1State),
        RemoveEnb(u32),
        NewUe(u32, u32),
        SetMmeId(u32, u32, u32),
        RemoveUe(u32, u32),
    }

    fn arb_enb_state() -> impl Strategy<Value = EnbS1State> {
        prop_oneof![
            Just(EnbS1State::Init),
            Just(EnbS1State::Reseting),
            Just(EnbS1State::Ready),
            Just(EnbS1State::Shutdown),
        ]
    }

    /// Small id spaces so operations collide often
    fn arb_op() -> impl Strategy<Value = Op> {
        let assoc = 1u32..5;
        let enb_ue = 0u32..6;
        let mme = 1u32..8;
        prop_oneof![
            assoc.clone().prop_map(Op::AddEnb),
            (assoc.clone(), arb_enb_state()).prop_map(|(a, s)| Op::SetEnbState(a, s)),
            assoc.clone().prop_map(Op::RemoveEnb),
            (assoc.clone(), enb_ue.clone()).prop_map(|(a, u)| Op::NewUe(a, u)),
            (assoc.clone(), enb_ue.clone(), mme).prop_map(|(a, u, m)| Op::SetMmeId(a, u, m)),
            (assoc, enb_ue).prop_map(|(a, u)| Op::RemoveUe(a, u)),
        ]
    }

    fn apply(state: &mut S1apState, op: &Op) {
        // Rejected operations must leave the tables untouched, so results are ignored
        match *op {
            Op::AddEnb(assoc) => {
                let mut enb = EnbDescription::new(assoc);
                enb.instreams = 4;
                let _ = state.add_enb(enb);
            }
            Op::SetEnbState(assoc, s1_state) => {
                let _ = state.set_enb_state(assoc, s1_state);
            }
            Op::RemoveEnb(assoc) => {
                let _ = state.remove_enb(assoc);
            }
            Op::NewUe(assoc, enb_ue) => {
                let _ = state.new_ue(assoc, enb_ue);
            }
            Op::SetMmeId(assoc, enb_ue, mme) => {
                let comp = s1ap_generate_comp_id(enb_ue, assoc);
                // One UE per MME UE id, as MME-APP guarantees
                if state.find_comp_id_by_mme_id(mme).is_none() {
                    let _ = state.set_mme_ue_s1ap_id(comp, mme);
                }
            }
            Op::RemoveUe(assoc, enb_ue) => {
                let _ = state.remove_ue(s1ap_generate_comp_id(enb_ue, assoc));
            }
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_comp_id_splits_back(enb_ue in any::<u32>(), assoc in any::<u32>()) {
            let masked = enb_ue & 0x00FF_FFFF;
            let ue = UeDescription::new(assoc, enb_ue);
            prop_assert_eq!(ue.enb_ue_s1ap_id, masked);
            prop_assert_eq!(s1ap_split_comp_id(ue.comp_s1ap_id), (masked, assoc));
        }

        #[test]
        fn prop_streams_stay_in_range(instreams in 0u16..64, draws in 1usize..200) {
            let mut enb = EnbDescription::new(1);
            enb.instreams = instreams;
            for _ in 0..draws {
                let stream = enb.allocate_stream();
                prop_assert!(stream >= S1AP_FIRST_UE_STREAM);
                prop_assert!(instreams <= 1 || stream < instreams);
            }
        }

        #[test]
        fn prop_tables_stay_consistent(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut state = S1apState::new(64, 8);
            for op in &ops {
                apply(&mut state, op);
                prop_assert!(state.is_consistent(), "inconsistent after {:?}", op);
                prop_assert_eq!(state.num_enbs(), state.ready_enb_count());
            }
        }

        #[test]
        fn prop_snapshot_restores_same_state(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut state = S1apState::new(64, 8);
            for op in &ops {
                apply(&mut state, op);
            }
            let record = state_to_proto(&state);
            let mut restored = S1apState::new(64, 8);
            proto_to_state(&record, &mut restored);
            prop_assert!(restored.is_consistent());
            prop_assert_eq!(restored, state);
        }

        #[test]
        fn prop_orphan_cleanup_keeps_mapped_ues(ops in prop::collection::vec(arb_op(), 1..60)) {
            let mut state = S1apState::new(64, 8);
            for op in &ops {
                apply(&mut state, op);
            }
            let mut imsi_map = S1apImsiMap::new(64);
            let mapped: Vec<u32> = state
                .ues()
                .values()
                .filter(|ue| ue.has_mme_ue_s1ap_id() && ue.mme_ue_s1ap_id % 2 == 0)
                .map(|ue| ue.mme_ue_s1ap_id)
                .collect();
            for mme in &mapped {
                imsi_map.insert(*mme, 1010000000000 + u64::from(*mme)).unwrap();
            }

            state.remove_ues_without_imsi_from_ue_id_coll(&imsi_map);
            prop_assert!(state.is_consistent());
            prop_assert_eq!(state.ues().size(), mapped.len());
            for mme in &mapped {
                prop_assert!(state.get_ue_by_mme_id(*mme).is_some());
            }
        }
    }
}
