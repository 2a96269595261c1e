pub use crate::config::*;

/// A builder for assembling ballot data without going through the file
/// format. Register the candidates first, then add papers.
///
/// ```
/// use stv_counting::builder::Builder;
/// use stv_counting::{run_count, CountRules};
/// # use stv_counting::CountingError;
///
/// let mut builder = Builder::new("Example Ward", 1)
///     .candidates(&[("Anna", "Ind"), ("Bob", "")]);
/// builder.add_ballot(3, &[1, 2])?;
/// builder.add_ballot(1, &[2])?;
///
/// let result = run_count(builder.build()?, &CountRules::DEFAULT_RULES)?;
/// assert_eq!(result.winners, vec!["Anna".to_string()]);
/// # Ok::<(), CountingError>(())
/// ```
pub struct Builder {
    name: String,
    seats: u32,
    candidates: Vec<Candidate>,
    ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new(name: &str, seats: u32) -> Builder {
        Builder {
            name: name.to_string(),
            seats,
            candidates: Vec::new(),
            ballots: Vec::new(),
        }
    }

    /// Registers the candidates, in ballot-paper order. An empty party
    /// code means no party.
    pub fn candidates(self, cands: &[(&str, &str)]) -> Builder {
        Builder {
            candidates: cands
                .iter()
                .map(|(name, party)| Candidate {
                    name: name.to_string(),
                    party: if party.is_empty() {
                        None
                    } else {
                        Some(party.to_string())
                    },
                    successful: false,
                })
                .collect(),
            ..self
        }
    }

    /// Adds `weight` identical papers carrying the given ranked
    /// preferences (1-based candidate numbers).
    pub fn add_ballot(&mut self, weight: u64, prefs: &[u32]) -> Result<(), CountingError> {
        if weight == 0 {
            return Err(CountingError::invariant("ballot weight must be positive"));
        }
        let mut numbers: Vec<CandidateNumber> = Vec::with_capacity(prefs.len());
        for &p in prefs {
            if p < 1 || p as usize > self.candidates.len() {
                return Err(CountingError::invariant(format!(
                    "preference {} is outside the registered roster of {} candidates",
                    p,
                    self.candidates.len()
                )));
            }
            numbers.push(CandidateNumber(p));
        }
        self.ballots.push(Ballot {
            weight,
            prefs: numbers,
        });
        Ok(())
    }

    /// Finalizes the data. The electorate and votes cast are taken to be
    /// the sum of the paper weights, with no rejected votes; the Droop
    /// quota is computed here, once.
    pub fn build(self) -> Result<BallotData, CountingError> {
        if self.candidates.is_empty() {
            return Err(CountingError::EmptyElection);
        }
        if self.seats == 0 {
            return Err(CountingError::invariant("at least one seat is required"));
        }
        let votes_cast: u64 = self.ballots.iter().map(|b| b.weight).sum();
        let info = WardInfo {
            name: self.name,
            seats: self.seats,
            electorate: votes_cast,
            votes_cast,
            rejected_votes: 0,
        };
        let quota = info.valid_votes() / (info.seats as u64 + 1) + 1;
        Ok(BallotData {
            info,
            candidates: self.candidates,
            ballots: self.ballots,
            quota,
        })
    }
}
