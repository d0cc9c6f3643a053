//! Tracking area matching
//!
//! S1 Setup: the eNB's supported TAs against the TAIs served by this MME.
//! Paging: the eNB's supported TAs against the UE's paging TAI lists.

use ogs_s1ap::{PagingTaiList, PlmnId, SupportedTaItem, Tai};

/// Outcome of matching one list of broadcast PLMNs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlmnMatch {
    NoMatch,
    AtLeastOneMatch,
    CompleteMatch,
}

/// Outcome of matching a supported TA list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaListMatch {
    Ok,
    UnknownPlmn,
    UnknownTac,
    UnknownTacAndPlmn,
}

fn is_served_plmn(plmn: &PlmnId, served: &[Tai]) -> bool {
    served.iter().any(|tai| tai.plmn == *plmn)
}

fn is_served_tac(tac: u16, served: &[Tai]) -> bool {
    served.iter().any(|tai| tai.tac == tac)
}

/// Match broadcast PLMNs against the served PLMNs.
///
/// A complete match is all PLMNs but one.
pub fn s1ap_mme_compare_plmns(bplmns: &[PlmnId], served: &[Tai]) -> PlmnMatch {
    if bplmns.is_empty() {
        log::error!("Empty broadcast PLMN list");
        return PlmnMatch::NoMatch;
    }
    let matching = bplmns.iter().filter(|plmn| is_served_plmn(plmn, served)).count();
    if matching == 0 {
        PlmnMatch::NoMatch
    } else if matching == bplmns.len() - 1 {
        PlmnMatch::CompleteMatch
    } else {
        PlmnMatch::AtLeastOneMatch
    }
}

/// Match an eNB's supported TA list against the served TAIs
pub fn s1ap_mme_compare_ta_lists(ta_list: &[SupportedTaItem], served: &[Tai]) -> TaListMatch {
    let mut tac_seen = false;
    let mut plmn_seen = false;

    for item in ta_list {
        let tac_ok = is_served_tac(item.tac, served);
        let plmn_ok = s1ap_mme_compare_plmns(&item.broadcast_plmns, served) != PlmnMatch::NoMatch;
        if tac_ok && plmn_ok {
            return TaListMatch::Ok;
        }
        tac_seen |= tac_ok;
        plmn_seen |= plmn_ok;
    }

    match (tac_seen, plmn_seen) {
        (true, _) => TaListMatch::UnknownPlmn,
        (false, true) => TaListMatch::UnknownTac,
        (false, false) => TaListMatch::UnknownTacAndPlmn,
    }
}

/// Whether an eNB serves any TAI of the paging lists
pub fn s1ap_paging_compare_ta_lists(enb_ta_list: &[SupportedTaItem], paging_lists: &[PagingTaiList]) -> bool {
    for item in enb_ta_list {
        if item.broadcast_plmns.is_empty() {
            log::error!("Supported TA item TAC {} has no broadcast PLMN", item.tac);
            continue;
        }
        for list in paging_lists {
            for tai in &list.tais {
                if tai.tac != item.tac {
                    continue;
                }
                if item.broadcast_plmns.contains(&tai.plmn) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plmn(mcc: u16, mnc: u16) -> PlmnId {
        PlmnId::new(mcc, mnc, 2)
    }

    fn served() -> Vec<Tai> {
        vec![
            Tai { plmn: plmn(1, 1), tac: 1 },
            Tai { plmn: plmn(1, 2), tac: 2 },
        ]
    }

    #[test]
    fn test_two_of_three_is_complete() {
        let bplmns = [plmn(1, 1), plmn(1, 2), plmn(999, 99)];
        assert_eq!(s1ap_mme_compare_plmns(&bplmns, &served()), PlmnMatch::CompleteMatch);
    }

    #[test]
    fn test_one_of_three_is_partial() {
        let bplmns = [plmn(1, 1), plmn(998, 98), plmn(999, 99)];
        assert_eq!(s1ap_mme_compare_plmns(&bplmns, &served()), PlmnMatch::AtLeastOneMatch);
    }

    #[test]
    fn test_all_matching_is_partial() {
        let bplmns = [plmn(1, 1), plmn(1, 2)];
        assert_eq!(s1ap_mme_compare_plmns(&bplmns, &served()), PlmnMatch::AtLeastOneMatch);
    }

    #[test]
    fn test_no_plmn_match() {
        assert_eq!(s1ap_mme_compare_plmns(&[plmn(999, 99)], &served()), PlmnMatch::NoMatch);
        assert_eq!(s1ap_mme_compare_plmns(&[], &served()), PlmnMatch::NoMatch);
    }

    #[test]
    fn test_ta_list_results() {
        let item = |tac, bplmns: Vec<PlmnId>| SupportedTaItem { tac, broadcast_plmns: bplmns };
        let served = served();

        assert_eq!(
            s1ap_mme_compare_ta_lists(&[item(1, vec![plmn(1, 1)])], &served),
            TaListMatch::Ok
        );
        assert_eq!(
            s1ap_mme_compare_ta_lists(&[item(1, vec![plmn(999, 99)])], &served),
            TaListMatch::UnknownPlmn
        );
        assert_eq!(
            s1ap_mme_compare_ta_lists(&[item(9, vec![plmn(1, 1)])], &served),
            TaListMatch::UnknownTac
        );
        assert_eq!(
            s1ap_mme_compare_ta_lists(&[item(9, vec![plmn(999, 99)])], &served),
            TaListMatch::UnknownTacAndPlmn
        );
        // TAC and PLMN each seen, never on the same item
        assert_eq!(
            s1ap_mme_compare_ta_lists(
                &[item(1, vec![plmn(999, 99)]), item(9, vec![plmn(1, 1)])],
                &served
            ),
            TaListMatch::UnknownPlmn
        );
        assert_eq!(s1ap_mme_compare_ta_lists(&[], &served), TaListMatch::UnknownTacAndPlmn);
    }

    #[test]
    fn test_paging_match_requires_tac_and_plmn() {
        let enb = vec![SupportedTaItem { tac: 1, broadcast_plmns: vec![plmn(1, 1)] }];
        let hit = vec![PagingTaiList { tais: vec![Tai { plmn: plmn(1, 1), tac: 1 }] }];
        let wrong_plmn = vec![PagingTaiList { tais: vec![Tai { plmn: plmn(1, 2), tac: 1 }] }];
        let wrong_tac = vec![PagingTaiList { tais: vec![Tai { plmn: plmn(1, 1), tac: 2 }] }];
        assert!(s1ap_paging_compare_ta_lists(&enb, &hit));
        assert!(!s1ap_paging_compare_ta_lists(&enb, &wrong_plmn));
        assert!(!s1ap_paging_compare_ta_lists(&enb, &wrong_tac));
    }

    #[test]
    fn test_paging_skips_items_without_plmn() {
        let enb = vec![
            SupportedTaItem { tac: 1, broadcast_plmns: vec![] },
            SupportedTaItem { tac: 2, broadcast_plmns: vec![plmn(1, 1)] },
        ];
        let lists = vec![
            PagingTaiList { tais: vec![Tai { plmn: plmn(1, 1), tac: 1 }] },
            PagingTaiList { tais: vec![Tai { plmn: plmn(1, 1), tac: 2 }] },
        ];
        assert!(s1ap_paging_compare_ta_lists(&enb, &lists));
        assert!(!s1ap_paging_compare_ta_lists(&enb[..1], &lists));
    }
}
