//! Tally state: per-candidate vote totals across stages plus
//! election/elimination status. All mutation during a count flows through
//! here and is checked against the counting invariants; the count is
//! forward-only and no rollback is offered.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::config::*;

pub(crate) struct CandidateState {
    pub(crate) candidate: Candidate,
    pub(crate) entries: Vec<StageEntry>,
    pub(crate) eliminated: bool,
}

impl CandidateState {
    pub(crate) fn total_votes(&self) -> Votes {
        self.entries.iter().map(|e| e.delta()).sum()
    }
}

pub(crate) struct Tally {
    candidates: BTreeMap<CandidateNumber, CandidateState>,
    quota: u64,
    seats: u32,
}

impl Tally {
    pub(crate) fn new(data: &BallotData) -> Tally {
        let mut candidates = BTreeMap::new();
        for (idx, c) in data.candidates.iter().enumerate() {
            candidates.insert(
                CandidateNumber(idx as u32 + 1),
                CandidateState {
                    candidate: c.clone(),
                    entries: Vec::new(),
                    eliminated: false,
                },
            );
        }
        Tally {
            candidates,
            quota: data.quota,
            seats: data.info.seats,
        }
    }

    pub(crate) fn quota(&self) -> u64 {
        self.quota
    }

    fn state(&self, number: CandidateNumber) -> Result<&CandidateState, CountingError> {
        self.candidates
            .get(&number)
            .ok_or_else(|| CountingError::invariant(format!("unknown candidate {}", number)))
    }

    pub(crate) fn name(&self, number: CandidateNumber) -> Result<&str, CountingError> {
        self.state(number).map(|s| s.candidate.name.as_str())
    }

    pub(crate) fn total_votes(&self, number: CandidateNumber) -> Result<Votes, CountingError> {
        self.state(number).map(|s| s.total_votes())
    }

    pub(crate) fn is_eliminated(&self, number: CandidateNumber) -> Result<bool, CountingError> {
        self.state(number).map(|s| s.eliminated)
    }

    /// Every candidate still in the count, in candidate order.
    pub(crate) fn continuing(&self) -> impl Iterator<Item = (CandidateNumber, &CandidateState)> {
        self.candidates
            .iter()
            .filter(|(_, s)| !s.eliminated)
            .map(|(n, s)| (*n, s))
    }

    /// Records the entry for a stage, merging with whatever the stage
    /// already holds for this candidate. Stages must be filled
    /// contiguously: anything else is a defect in the caller.
    pub(crate) fn record(
        &mut self,
        number: CandidateNumber,
        stage: u32,
        entry: StageEntry,
    ) -> Result<(), CountingError> {
        let state = self
            .candidates
            .get_mut(&number)
            .ok_or_else(|| CountingError::invariant(format!("unknown candidate {}", number)))?;
        if state.eliminated {
            return Err(CountingError::invariant(format!(
                "candidate {} received an entry after elimination",
                number
            )));
        }
        let filled = state.entries.len();
        let stage_idx = (stage as usize).saturating_sub(1);
        if stage == 0 {
            return Err(CountingError::invariant("stages are numbered from 1"));
        }
        if stage_idx == filled {
            state.entries.push(entry);
            return Ok(());
        }
        if stage_idx + 1 == filled {
            let merged = merge_entries(number, state.entries[stage_idx], entry)?;
            state.entries[stage_idx] = merged;
            return Ok(());
        }
        Err(CountingError::invariant(format!(
            "stage {} recorded out of order for candidate {} ({} stages filled)",
            stage, number, filled
        )))
    }

    pub(crate) fn mark_eliminated(&mut self, number: CandidateNumber) -> Result<(), CountingError> {
        let quota = self.quota;
        let state = self
            .candidates
            .get_mut(&number)
            .ok_or_else(|| CountingError::invariant(format!("unknown candidate {}", number)))?;
        if state.eliminated {
            return Err(CountingError::invariant(format!(
                "candidate {} eliminated twice",
                number
            )));
        }
        if state.total_votes().get() >= quota as f64 {
            return Err(CountingError::invariant(format!(
                "candidate {} reached quota and cannot be eliminated",
                number
            )));
        }
        debug!("mark_eliminated: candidate {}", number);
        state.eliminated = true;
        Ok(())
    }

    /// Candidates at or above quota that have not been eliminated.
    pub(crate) fn elected_candidates(&self) -> BTreeSet<CandidateNumber> {
        self.candidates
            .iter()
            .filter(|(_, s)| !s.eliminated && s.total_votes().get() >= self.quota as f64)
            .map(|(n, _)| *n)
            .collect()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.elected_candidates().len() == self.seats as usize
    }
}

fn merge_entries(
    number: CandidateNumber,
    current: StageEntry,
    new: StageEntry,
) -> Result<StageEntry, CountingError> {
    use StageEntry::*;
    match (current, new) {
        (Untouched, e) => Ok(e),
        (e, Untouched) => Ok(e),
        (FirstPreference(a), FirstPreference(b)) => Ok(FirstPreference(a + b)),
        (
            Transfer {
                from: f1,
                amount: a1,
            },
            Transfer {
                from: f2,
                amount: a2,
            },
        ) if f1 == f2 => Ok(Transfer {
            from: f1,
            amount: a1 + a2,
        }),
        (cur, new) => Err(CountingError::invariant(format!(
            "conflicting entries for candidate {} in one stage: {:?} then {:?}",
            number, cur, new
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn small_tally() -> Tally {
        let mut builder = Builder::new("Test Ward", 1).candidates(&[("A", ""), ("B", "")]);
        builder.add_ballot(30, &[1]).unwrap();
        builder.add_ballot(10, &[2, 1]).unwrap();
        let data = builder.build().unwrap();
        // 40 valid votes, quota 21
        assert_eq!(data.quota, 21);
        Tally::new(&data)
    }

    #[test]
    fn totals_accumulate_with_rounding() {
        let mut tally = small_tally();
        let a = CandidateNumber(1);
        tally
            .record(a, 1, StageEntry::FirstPreference(Votes::from_weight(30)))
            .unwrap();
        tally
            .record(
                a,
                2,
                StageEntry::Transfer {
                    from: CandidateNumber(2),
                    amount: Votes::new(0.33333),
                },
            )
            .unwrap();
        tally
            .record(
                a,
                2,
                StageEntry::Transfer {
                    from: CandidateNumber(2),
                    amount: Votes::new(0.33333),
                },
            )
            .unwrap();
        assert!((tally.total_votes(a).unwrap().get() - 30.66666).abs() < 1e-9);
    }

    #[test]
    fn skipping_a_stage_is_an_invariant_violation() {
        let mut tally = small_tally();
        let a = CandidateNumber(1);
        tally
            .record(a, 1, StageEntry::FirstPreference(Votes::from_weight(30)))
            .unwrap();
        let res = tally.record(a, 3, StageEntry::Untouched);
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
    }

    #[test]
    fn eliminated_candidates_receive_nothing() {
        let mut tally = small_tally();
        let b = CandidateNumber(2);
        tally
            .record(b, 1, StageEntry::FirstPreference(Votes::from_weight(10)))
            .unwrap();
        tally.mark_eliminated(b).unwrap();
        let res = tally.record(
            b,
            2,
            StageEntry::Transfer {
                from: CandidateNumber(1),
                amount: Votes::new(1.0),
            },
        );
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
        assert!(tally.elected_candidates().is_empty() || !tally.elected_candidates().contains(&b));
    }

    #[test]
    fn candidates_at_quota_cannot_be_eliminated() {
        let mut tally = small_tally();
        let a = CandidateNumber(1);
        tally
            .record(a, 1, StageEntry::FirstPreference(Votes::from_weight(30)))
            .unwrap();
        let res = tally.mark_eliminated(a);
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
    }

    #[test]
    fn election_threshold_is_inclusive() {
        let mut tally = small_tally();
        let a = CandidateNumber(1);
        let b = CandidateNumber(2);
        tally
            .record(a, 1, StageEntry::FirstPreference(Votes::from_weight(21)))
            .unwrap();
        tally
            .record(b, 1, StageEntry::FirstPreference(Votes::from_weight(19)))
            .unwrap();
        let elected = tally.elected_candidates();
        assert!(elected.contains(&a));
        assert!(!elected.contains(&b));
        assert!(tally.is_complete());
    }

    #[test]
    fn conflicting_sources_in_one_stage_are_rejected() {
        let mut tally = small_tally();
        let a = CandidateNumber(1);
        tally
            .record(a, 1, StageEntry::FirstPreference(Votes::from_weight(30)))
            .unwrap();
        tally
            .record(
                a,
                2,
                StageEntry::Transfer {
                    from: CandidateNumber(2),
                    amount: Votes::new(1.0),
                },
            )
            .unwrap();
        let res = tally.record(
            a,
            2,
            StageEntry::SurplusRemoval(Votes::new(2.0)),
        );
        assert!(matches!(res, Err(CountingError::InvariantViolation { .. })));
    }
}
