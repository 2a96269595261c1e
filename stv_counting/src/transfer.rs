//! Transfer engine: the surplus-transfer and elimination-transfer
//! arithmetic that computes one stage's vote movements.
//!
//! Both operations only ever look at papers whose *first* preference is
//! the source candidate; votes a candidate received by transfer are not
//! re-examined later. Papers whose remaining preference chain is
//! exhausted become non-transferable losses, counted but never treated
//! as errors.

use std::collections::BTreeSet;

use log::debug;

use crate::config::*;
use crate::tally::Tally;

fn first_preference(ballot: &Ballot) -> Option<CandidateNumber> {
    ballot.prefs.first().copied()
}

/// The first candidate in the paper's ranked list that can still receive
/// votes: not the source, not already elected, not eliminated.
fn next_usable_preference(
    ballot: &Ballot,
    source: CandidateNumber,
    elected: &BTreeSet<CandidateNumber>,
    tally: &Tally,
) -> Result<Option<CandidateNumber>, CountingError> {
    for &p in &ballot.prefs {
        if p == source || elected.contains(&p) {
            continue;
        }
        if tally.is_eliminated(p)? {
            continue;
        }
        return Ok(Some(p));
    }
    Ok(None)
}

/// Lays down explicit zero entries so every continuing candidate keeps an
/// aligned stage sequence, whether or not votes reach it this stage.
fn open_stage(tally: &mut Tally, stage: u32) -> Result<(), CountingError> {
    let continuing: Vec<CandidateNumber> = tally.continuing().map(|(n, _)| n).collect();
    for n in continuing {
        tally.record(n, stage, StageEntry::Untouched)?;
    }
    Ok(())
}

/// Moves the surplus of an elected candidate to the next usable
/// preference of each of its transferable papers, at a fractional
/// transfer weight, re-rounding every accumulation to 5 decimals.
pub(crate) fn transfer_surplus(
    tally: &mut Tally,
    ballots: &[Ballot],
    stage: u32,
    source: CandidateNumber,
) -> Result<StageAction, CountingError> {
    if tally.is_eliminated(source)? {
        return Err(CountingError::invariant(format!(
            "surplus transfer from eliminated candidate {}",
            source
        )));
    }
    let total = tally.total_votes(source)?;
    let quota = Votes::from_weight(tally.quota());
    if total <= quota {
        return Err(CountingError::invariant(format!(
            "candidate {} holds no surplus: {} against quota {}",
            source, total, quota
        )));
    }
    let surplus = total - quota;

    let non_transferable_weight: u64 = ballots
        .iter()
        .filter(|b| first_preference(b) == Some(source) && b.prefs.len() == 1)
        .map(|b| b.weight)
        .sum();

    let divisor = total - Votes::from_weight(non_transferable_weight);
    let transfer_weight = if divisor > Votes::ZERO {
        round5(surplus.get() / divisor.get())
    } else {
        0.0
    };
    debug!(
        "transfer_surplus: candidate {} total {} surplus {} weight {}",
        source, total, surplus, transfer_weight
    );

    let elected = tally.elected_candidates();
    open_stage(tally, stage)?;

    let mut non_transferable = Votes::ZERO;
    for ballot in ballots
        .iter()
        .filter(|b| first_preference(b) == Some(source) && b.prefs.len() > 1)
    {
        let contribution = Votes::new(ballot.weight as f64 * transfer_weight);
        match next_usable_preference(ballot, source, &elected, tally)? {
            Some(target) => {
                tally.record(
                    target,
                    stage,
                    StageEntry::Transfer {
                        from: source,
                        amount: contribution,
                    },
                )?;
            }
            None => {
                non_transferable += contribution;
            }
        }
    }
    if transfer_weight == 0.0 {
        // No transferable papers at all: the whole surplus is lost.
        non_transferable = surplus;
    }
    tally.record(source, stage, StageEntry::SurplusRemoval(surplus))?;

    Ok(StageAction::SurplusTransfer {
        from: source,
        surplus,
        transfer_weight,
        non_transferable,
    })
}

/// Eliminates the lowest-total candidate and moves the full, unweighted
/// weight of each of its papers to the next usable preference.
pub(crate) fn transfer_elimination(
    tally: &mut Tally,
    ballots: &[Ballot],
    stage: u32,
    source: CandidateNumber,
) -> Result<StageAction, CountingError> {
    if tally.is_eliminated(source)? {
        return Err(CountingError::invariant(format!(
            "candidate {} eliminated twice",
            source
        )));
    }
    let total = tally.total_votes(source)?;
    let lowest = tally
        .continuing()
        .map(|(_, s)| s.total_votes().get())
        .fold(f64::INFINITY, f64::min);
    if total.get() > lowest {
        return Err(CountingError::invariant(format!(
            "candidate {} is not the lowest-total candidate",
            source
        )));
    }
    debug!(
        "transfer_elimination: candidate {} total {}",
        source, total
    );

    let elected = tally.elected_candidates();
    open_stage(tally, stage)?;

    let mut transferred = Votes::ZERO;
    let mut non_transferable = Votes::ZERO;
    for ballot in ballots.iter().filter(|b| first_preference(b) == Some(source)) {
        let amount = Votes::from_weight(ballot.weight);
        match next_usable_preference(ballot, source, &elected, tally)? {
            Some(target) => {
                tally.record(
                    target,
                    stage,
                    StageEntry::Transfer {
                        from: source,
                        amount,
                    },
                )?;
                transferred += amount;
            }
            None => {
                non_transferable += amount;
            }
        }
    }
    tally.record(source, stage, StageEntry::EliminationRemoval)?;
    tally.mark_eliminated(source)?;

    Ok(StageAction::Elimination {
        eliminated: source,
        transferred,
        non_transferable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn assert_votes(actual: Votes, expected: f64) {
        assert!(
            (actual.get() - expected).abs() < 1e-9,
            "expected {} votes, found {}",
            expected,
            actual
        );
    }

    // 3 seats, 100 valid votes, quota 26. Candidate 1 polls 40 first
    // preferences of which 10 carry no further preference.
    fn surplus_fixture() -> (Tally, Vec<Ballot>) {
        let mut builder = Builder::new("Test Ward", 3).candidates(&[
            ("A", ""),
            ("B", ""),
            ("C", ""),
            ("D", ""),
            ("E", ""),
        ]);
        builder.add_ballot(10, &[1]).unwrap();
        builder.add_ballot(3, &[1, 2]).unwrap();
        builder.add_ballot(27, &[1, 3]).unwrap();
        builder.add_ballot(20, &[2]).unwrap();
        builder.add_ballot(15, &[3]).unwrap();
        builder.add_ballot(17, &[4, 2]).unwrap();
        builder.add_ballot(8, &[5, 2]).unwrap();
        let data = builder.build().unwrap();
        assert_eq!(data.quota, 26);
        let mut tally = Tally::new(&data);
        for (idx, _) in data.candidates.iter().enumerate() {
            let n = CandidateNumber(idx as u32 + 1);
            tally
                .record(n, 1, StageEntry::FirstPreference(Votes::ZERO))
                .unwrap();
        }
        for b in &data.ballots {
            let first = b.prefs[0];
            tally
                .record(
                    first,
                    1,
                    StageEntry::FirstPreference(Votes::from_weight(b.weight)),
                )
                .unwrap();
        }
        (tally, data.ballots)
    }

    #[test]
    fn surplus_weight_and_contributions() {
        let (mut tally, ballots) = surplus_fixture();
        let a = CandidateNumber(1);
        assert_votes(tally.total_votes(a).unwrap(), 40.0);

        let action = transfer_surplus(&mut tally, &ballots, 2, a).unwrap();
        match action {
            StageAction::SurplusTransfer {
                from,
                surplus,
                transfer_weight,
                non_transferable,
            } => {
                assert_eq!(from, a);
                assert_votes(surplus, 14.0);
                // round5(14 / (40 - 10))
                assert!((transfer_weight - 0.46667).abs() < 1e-9);
                assert_votes(non_transferable, 0.0);
            }
            other => panic!("expected a surplus transfer, got {:?}", other),
        }
        // The source drops to exactly quota.
        assert_votes(tally.total_votes(a).unwrap(), 26.0);
        // Per-paper contributions are rounded at every step: the 3-paper
        // bundle moves round5(3 * 0.46667) = 1.40001.
        assert_votes(tally.total_votes(CandidateNumber(2)).unwrap(), 21.40001);
        assert_votes(tally.total_votes(CandidateNumber(3)).unwrap(), 27.60009);
        // Untouched candidates keep aligned sequences.
        assert_votes(tally.total_votes(CandidateNumber(4)).unwrap(), 17.0);
        assert_votes(tally.total_votes(CandidateNumber(5)).unwrap(), 8.0);
    }

    #[test]
    fn surplus_requires_a_surplus() {
        let (mut tally, ballots) = surplus_fixture();
        let res = transfer_surplus(&mut tally, &ballots, 2, CandidateNumber(2));
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
    }

    #[test]
    fn elimination_moves_full_weights() {
        let (mut tally, ballots) = surplus_fixture();
        let e = CandidateNumber(5);
        let action = transfer_elimination(&mut tally, &ballots, 2, e).unwrap();
        match action {
            StageAction::Elimination {
                eliminated,
                transferred,
                non_transferable,
            } => {
                assert_eq!(eliminated, e);
                assert_votes(transferred, 8.0);
                assert_votes(non_transferable, 0.0);
            }
            other => panic!("expected an elimination, got {:?}", other),
        }
        assert!(tally.is_eliminated(e).unwrap());
        // The full 8-paper weight lands on the second preference.
        assert_votes(tally.total_votes(CandidateNumber(2)).unwrap(), 28.0);
    }

    #[test]
    fn elimination_skips_elected_candidates() {
        let (mut tally, ballots) = surplus_fixture();
        // Candidate 1 is already at quota, so the 8-vote bundle ranked
        // [5, 1] must fall through to nothing and become a loss.
        let mut ballots = ballots;
        ballots[6] = Ballot {
            weight: 8,
            prefs: vec![CandidateNumber(5), CandidateNumber(1)],
        };
        let action = transfer_elimination(&mut tally, &ballots, 2, CandidateNumber(5)).unwrap();
        match action {
            StageAction::Elimination {
                transferred,
                non_transferable,
                ..
            } => {
                assert_votes(transferred, 0.0);
                assert_votes(non_transferable, 8.0);
            }
            other => panic!("expected an elimination, got {:?}", other),
        }
    }

    #[test]
    fn elimination_requires_the_lowest_total() {
        let (mut tally, ballots) = surplus_fixture();
        // Candidate 4 holds 17 votes while candidate 5 holds 8.
        let res = transfer_elimination(&mut tally, &ballots, 2, CandidateNumber(4));
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
    }

    #[test]
    fn exhausted_surplus_papers_are_recorded_losses() {
        let mut builder = Builder::new("Test Ward", 1).candidates(&[("A", ""), ("B", "")]);
        // Quota 21; candidate 1 polls 40, and its only bundle with a
        // further preference just repeats candidate 1.
        builder.add_ballot(10, &[1]).unwrap();
        builder.add_ballot(30, &[1, 1]).unwrap();
        let data = builder.build().unwrap();
        assert_eq!(data.quota, 21);
        let mut tally = Tally::new(&data);
        for n in [CandidateNumber(1), CandidateNumber(2)] {
            tally
                .record(n, 1, StageEntry::FirstPreference(Votes::ZERO))
                .unwrap();
        }
        for b in &data.ballots {
            tally
                .record(
                    b.prefs[0],
                    1,
                    StageEntry::FirstPreference(Votes::from_weight(b.weight)),
                )
                .unwrap();
        }
        // The 30-paper bundle repeats the source, so its chain is
        // exhausted after filtering and its weighted value is dropped.
        let action = transfer_surplus(&mut tally, &data.ballots, 2, CandidateNumber(1)).unwrap();
        match action {
            StageAction::SurplusTransfer {
                surplus,
                transfer_weight,
                non_transferable,
                ..
            } => {
                assert_votes(surplus, 19.0);
                // round5(19 / (40 - 10))
                assert!((transfer_weight - 0.63333).abs() < 1e-9);
                // round5(30 * 0.63333)
                assert_votes(non_transferable, 18.99990);
            }
            other => panic!("expected a surplus transfer, got {:?}", other),
        }
        assert_votes(tally.total_votes(CandidateNumber(2)).unwrap(), 0.0);
    }
}
