// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

/// Stable identity of a candidate: the 1-based position on the ballot
/// paper, assigned in file order at load time.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CandidateNumber(pub u32);

impl Display for CandidateNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered candidate.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Candidate {
    pub name: String,
    /// Party code as it appears in the input, `None` when the field was
    /// left empty.
    pub party: Option<String>,
    /// Declared successful in the source data. Informational only: the
    /// count does not consult it.
    pub successful: bool,
}

/// One row of the ballot data: the number of identical papers and the
/// ranked preferences, in order. The terminating sentinel of the file
/// format has already been stripped. `prefs` may be empty (a paper that
/// carries no usable preference at all).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Ballot {
    pub weight: u64,
    pub prefs: Vec<CandidateNumber>,
}

/// Ward-level election metadata from the file header.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct WardInfo {
    pub name: String,
    pub seats: u32,
    pub electorate: u64,
    pub votes_cast: u64,
    pub rejected_votes: u64,
}

impl WardInfo {
    pub fn valid_votes(&self) -> u64 {
        self.votes_cast - self.rejected_votes
    }
}

/// The validated output of the ballot store.
///
/// `quota` is the Droop quota, `valid_votes / (seats + 1) + 1` in integer
/// arithmetic. It is computed exactly once, here, and never recomputed
/// during the count.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotData {
    pub info: WardInfo,
    /// In ballot-paper order; index `i` holds candidate number `i + 1`.
    pub candidates: Vec<Candidate>,
    pub ballots: Vec<Ballot>,
    pub quota: u64,
}

// ********* Vote arithmetic ***********

/// Rounds to 5 decimal places. Applied after every arithmetic step, not
/// only at the end, so long counts accumulate no fractional drift.
pub fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// A vote amount. Surplus transfers move fractional votes, so this wraps
/// a float; all construction and accumulation goes through [`round5`].
#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
pub struct Votes(f64);

impl Votes {
    pub const ZERO: Votes = Votes(0.0);

    pub fn new(v: f64) -> Votes {
        Votes(round5(v))
    }

    pub fn from_weight(w: u64) -> Votes {
        Votes(w as f64)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Sum for Votes {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Votes::ZERO, |acc, v| acc + v)
    }
}

impl AddAssign for Votes {
    fn add_assign(&mut self, rhs: Votes) {
        self.0 = round5(self.0 + rhs.0);
    }
}

impl Add for Votes {
    type Output = Votes;
    fn add(self, rhs: Votes) -> Votes {
        Votes(round5(self.0 + rhs.0))
    }
}

impl Sub for Votes {
    type Output = Votes;
    fn sub(self, rhs: Votes) -> Votes {
        Votes(round5(self.0 - rhs.0))
    }
}

impl Neg for Votes {
    type Output = Votes;
    fn neg(self) -> Votes {
        Votes(-self.0)
    }
}

impl Display for Votes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry in a candidate's per-stage sequence. Sequences are filled
/// contiguously, one entry per stage, so cumulative sums stay aligned
/// across candidates.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum StageEntry {
    /// Stage 1: the first-preference total.
    FirstPreference(Votes),
    /// Votes received from the stage's source candidate.
    Transfer {
        from: CandidateNumber,
        amount: Votes,
    },
    /// A surplus leaving an elected candidate, recorded at the
    /// transferring candidate's own stage.
    SurplusRemoval(Votes),
    /// Marks the stage at which this candidate left the count.
    EliminationRemoval,
    /// No movement for this candidate at this stage.
    Untouched,
}

impl StageEntry {
    /// The signed vote delta this entry applies to the running total.
    pub fn delta(&self) -> Votes {
        match self {
            StageEntry::FirstPreference(v) => *v,
            StageEntry::Transfer { amount, .. } => *amount,
            StageEntry::SurplusRemoval(v) => -*v,
            StageEntry::EliminationRemoval => Votes::ZERO,
            StageEntry::Untouched => Votes::ZERO,
        }
    }
}

// ******** Output data structures *********

/// One slice of a candidate's breakdown: the running total through this
/// stage and the votes moved at this stage (negative when a surplus left).
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct StageVotes {
    pub cumulative_votes: Votes,
    pub votes: Votes,
}

/// Snapshot of one candidate after a completed stage.
#[derive(PartialEq, Debug, Clone)]
pub struct CandidateStanding {
    pub number: CandidateNumber,
    pub name: String,
    pub party: Option<String>,
    pub total_votes: Votes,
    /// Share of the valid vote, floor-truncated to one decimal.
    pub percentage: f64,
    pub stages: Vec<StageVotes>,
}

/// The action that produced a stage.
#[derive(PartialEq, Debug, Clone)]
pub enum StageAction {
    /// Stage 1: first preferences counted. `non_transferable` is the
    /// weight of papers that carried no preference at all.
    FirstPreferences { non_transferable: Votes },
    SurplusTransfer {
        from: CandidateNumber,
        surplus: Votes,
        transfer_weight: f64,
        non_transferable: Votes,
    },
    Elimination {
        eliminated: CandidateNumber,
        transferred: Votes,
        non_transferable: Votes,
    },
}

/// Everything a presentation layer needs about one completed stage.
#[derive(PartialEq, Debug, Clone)]
pub struct StageReport {
    pub stage: u32,
    pub action: StageAction,
    /// Display text for the stage transition.
    pub narrative: String,
    /// Standings of every candidate still in the count, in candidate
    /// order.
    pub standings: Vec<CandidateStanding>,
    /// Candidates at or above quota after this stage. Grows
    /// monotonically over the count.
    pub elected: Vec<CandidateNumber>,
}

/// Final outcome of a completed count.
#[derive(PartialEq, Debug, Clone)]
pub struct CountResult {
    pub ward: String,
    pub seats: u32,
    pub quota: u64,
    pub valid_votes: u64,
    pub stages: Vec<StageReport>,
    pub elected: Vec<CandidateNumber>,
    /// Names of the elected candidates, in candidate order.
    pub winners: Vec<String>,
}

/// Errors that prevent a count from loading or completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CountingError {
    /// The ballot data could not be understood. Fatal: surfaced before
    /// any tallying starts, with the offending line.
    MalformedInput { lineno: usize, message: String },
    /// A counting invariant was broken. Signals a programming defect;
    /// the state machine halts rather than advancing further.
    InvariantViolation { message: String },
    EmptyElection,
    NoConvergence,
}

impl CountingError {
    pub(crate) fn invariant(message: impl Into<String>) -> CountingError {
        CountingError::InvariantViolation {
            message: message.into(),
        }
    }
}

impl Error for CountingError {}

impl Display for CountingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountingError::MalformedInput { lineno, message } => {
                write!(f, "malformed ballot data at line {}: {}", lineno, message)
            }
            CountingError::InvariantViolation { message } => {
                write!(f, "counting invariant violated: {}", message)
            }
            CountingError::EmptyElection => write!(f, "the election contains no candidates"),
            CountingError::NoConvergence => {
                write!(f, "the count cannot fill the remaining seats")
            }
        }
    }
}

// ********* Configuration **********

/// How to order candidates that tie on the relevant total.
///
/// The source data gives no rule for ties, so the policy is explicit
/// rather than inherited from sort stability.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakPolicy {
    /// The lowest candidate number wins the tie. Arbitrary but
    /// reproducible.
    ByCandidateNumber,
    /// A deterministic drawing of lots: candidates are ordered by a
    /// cryptographic hash over the seed, the stage and the candidate
    /// name.
    Random(u32),
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CountRules {
    pub tie_break: TieBreakPolicy,
}

impl CountRules {
    pub const DEFAULT_RULES: CountRules = CountRules {
        tie_break: TieBreakPolicy::ByCandidateNumber,
    };
}
