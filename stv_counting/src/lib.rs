mod ballot;
mod config;
mod tally;
mod transfer;

pub mod builder;
pub mod manual;

use log::{debug, info};

pub use crate::ballot::load;
pub use crate::config::*;

use crate::tally::Tally;
use crate::transfer::{transfer_elimination, transfer_surplus};

/// The two states of the count controller.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CountState {
    Counting,
    Complete,
}

/// The stage-advancement state machine.
///
/// [`Count::new`] runs the stage-1 first-preference tally. Each
/// [`Count::advance`] then performs exactly one action and snapshots the
/// stage for reporting: a surplus transfer when the highest-total
/// candidate sits above quota, otherwise the elimination of the
/// lowest-total candidate. Once the seats are filled the machine is
/// `Complete` and further `advance` calls are no-ops.
pub struct Count {
    ward: WardInfo,
    ballots: Vec<Ballot>,
    rules: CountRules,
    tally: Tally,
    stage: u32,
    state: CountState,
    reports: Vec<StageReport>,
}

impl Count {
    pub fn new(data: BallotData, rules: &CountRules) -> Result<Count, CountingError> {
        if data.candidates.is_empty() {
            return Err(CountingError::EmptyElection);
        }
        info!(
            "Counting {:?}: {} candidates, {} papers, {} seats, quota {}",
            data.info.name,
            data.candidates.len(),
            data.ballots.len(),
            data.info.seats,
            data.quota
        );
        let mut tally = Tally::new(&data);
        let numbers: Vec<CandidateNumber> = tally.continuing().map(|(n, _)| n).collect();
        for n in numbers {
            tally.record(n, 1, StageEntry::FirstPreference(Votes::ZERO))?;
        }
        let mut non_transferable = Votes::ZERO;
        for b in &data.ballots {
            match b.prefs.first() {
                Some(&first) => tally.record(
                    first,
                    1,
                    StageEntry::FirstPreference(Votes::from_weight(b.weight)),
                )?,
                None => non_transferable += Votes::from_weight(b.weight),
            }
        }
        let mut count = Count {
            ward: data.info,
            ballots: data.ballots,
            rules: *rules,
            tally,
            stage: 1,
            state: CountState::Counting,
            reports: Vec::new(),
        };
        let action = StageAction::FirstPreferences { non_transferable };
        let narrative = count.narrative(&action)?;
        count.push_report(action, narrative);
        count.check_complete();
        Ok(count)
    }

    pub fn state(&self) -> CountState {
        self.state
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.state == CountState::Complete
    }

    pub fn quota(&self) -> u64 {
        self.tally.quota()
    }

    /// Performs one stage of counting. Idempotent once complete.
    pub fn advance(&mut self) -> Result<CountState, CountingError> {
        if self.state == CountState::Complete {
            return Ok(CountState::Complete);
        }
        let stage = self.stage + 1;
        let quota = Votes::from_weight(self.tally.quota());
        let highest = self.select_highest(stage)?;
        let action = if self.tally.total_votes(highest)? > quota {
            transfer_surplus(&mut self.tally, &self.ballots, stage, highest)?
        } else {
            let lowest = self.select_lowest(stage)?;
            transfer_elimination(&mut self.tally, &self.ballots, stage, lowest)?
        };
        self.stage = stage;
        let narrative = self.narrative(&action)?;
        debug!("stage {}: {}", stage, narrative);
        self.push_report(action, narrative);
        self.check_complete();
        Ok(self.state)
    }

    /// The per-stage snapshots produced so far.
    pub fn reports(&self) -> &[StageReport] {
        &self.reports
    }

    pub fn into_result(self) -> Result<CountResult, CountingError> {
        let elected: Vec<CandidateNumber> = self.tally.elected_candidates().into_iter().collect();
        let mut winners: Vec<String> = Vec::new();
        for &n in &elected {
            winners.push(self.tally.name(n)?.to_string());
        }
        Ok(CountResult {
            ward: self.ward.name.clone(),
            seats: self.ward.seats,
            quota: self.tally.quota(),
            valid_votes: self.ward.valid_votes(),
            stages: self.reports,
            elected,
            winners,
        })
    }

    fn narrative(&self, action: &StageAction) -> Result<String, CountingError> {
        match action {
            StageAction::FirstPreferences { .. } => {
                Ok("First preference votes counted.".to_string())
            }
            StageAction::SurplusTransfer { from, surplus, .. } => Ok(format!(
                "Transferring {} surplus votes from {}.",
                surplus,
                self.tally.name(*from)?
            )),
            StageAction::Elimination {
                eliminated,
                transferred,
                ..
            } => Ok(format!(
                "Transferring {} votes from eliminated candidate {}.",
                transferred,
                self.tally.name(*eliminated)?
            )),
        }
    }

    fn push_report(&mut self, action: StageAction, narrative: String) {
        let elected: Vec<CandidateNumber> =
            self.tally.elected_candidates().into_iter().collect();
        let valid = self.ward.valid_votes();
        let mut standings: Vec<CandidateStanding> = Vec::new();
        for (number, state) in self.tally.continuing() {
            let total = state.total_votes();
            let mut cumulative = Votes::ZERO;
            let mut stages: Vec<StageVotes> = Vec::new();
            for entry in &state.entries {
                let delta = entry.delta();
                cumulative += delta;
                stages.push(StageVotes {
                    cumulative_votes: cumulative,
                    votes: delta,
                });
            }
            let percentage = if valid > 0 {
                (total.get() / valid as f64 * 1000.0).floor() / 10.0
            } else {
                0.0
            };
            standings.push(CandidateStanding {
                number,
                name: state.candidate.name.clone(),
                party: state.candidate.party.clone(),
                total_votes: total,
                percentage,
                stages,
            });
        }
        self.reports.push(StageReport {
            stage: self.stage,
            action,
            narrative,
            standings,
            elected,
        });
    }

    fn check_complete(&mut self) {
        if self.tally.is_complete() {
            self.state = CountState::Complete;
            info!(
                "All {} seats filled in stage {}.",
                self.ward.seats, self.stage
            );
        }
    }

    fn select_highest(&self, stage: u32) -> Result<CandidateNumber, CountingError> {
        let mut best: Vec<CandidateNumber> = Vec::new();
        let mut best_total = f64::NEG_INFINITY;
        for (n, s) in self.tally.continuing() {
            let t = s.total_votes().get();
            if t > best_total {
                best_total = t;
                best = vec![n];
            } else if t == best_total {
                best.push(n);
            }
        }
        if best.is_empty() {
            return Err(CountingError::NoConvergence);
        }
        self.break_tie(best, stage)
    }

    fn select_lowest(&self, stage: u32) -> Result<CandidateNumber, CountingError> {
        let elected = self.tally.elected_candidates();
        let mut worst: Vec<CandidateNumber> = Vec::new();
        let mut worst_total = f64::INFINITY;
        for (n, s) in self.tally.continuing() {
            if elected.contains(&n) {
                continue;
            }
            let t = s.total_votes().get();
            if t < worst_total {
                worst_total = t;
                worst = vec![n];
            } else if t == worst_total {
                worst.push(n);
            }
        }
        if worst.is_empty() {
            // Seats remain unfilled but no candidate can be eliminated.
            return Err(CountingError::NoConvergence);
        }
        self.break_tie(worst, stage)
    }

    fn break_tie(
        &self,
        tied: Vec<CandidateNumber>,
        stage: u32,
    ) -> Result<CandidateNumber, CountingError> {
        let ordered = match self.rules.tie_break {
            TieBreakPolicy::ByCandidateNumber => {
                let mut res = tied;
                res.sort();
                res
            }
            TieBreakPolicy::Random(seed) => {
                let mut keyed: Vec<(String, CandidateNumber)> = Vec::new();
                for &n in tied.iter() {
                    let digest =
                        sha256::digest(format!("{:08}{:08}{}", seed, stage, self.tally.name(n)?));
                    keyed.push((digest, n));
                }
                keyed.sort();
                keyed.into_iter().map(|p| p.1).collect()
            }
        };
        ordered
            .first()
            .copied()
            .ok_or_else(|| CountingError::invariant("tie-break over an empty set"))
    }
}

/// Runs a full count for the given ballot data and rules.
///
/// Fails with [`CountingError::NoConvergence`] when the remaining seats
/// can never be filled (every continuing candidate already elected, or
/// the stage guard trips).
pub fn run_count(data: BallotData, rules: &CountRules) -> Result<CountResult, CountingError> {
    let max_stages = data.candidates.len() as u32 + data.info.seats + 1;
    let mut count = Count::new(data, rules)?;
    while !count.is_complete() {
        if count.stage() > max_stages {
            return Err(CountingError::NoConvergence);
        }
        count.advance()?;
    }
    count.into_result()
}
