//! The ballot store: parses the raw text of a ballot file into validated,
//! typed data. See the [manual](crate::manual) for the file format.

use log::{debug, warn};

use crate::config::*;

fn malformed(lineno: usize, message: impl Into<String>) -> CountingError {
    CountingError::MalformedInput {
        lineno,
        message: message.into(),
    }
}

fn header_int(lineno: usize, field: &str, what: &str) -> Result<u64, CountingError> {
    field
        .parse::<u64>()
        .map_err(|_| malformed(lineno, format!("{} is not a number: {:?}", what, field)))
}

/// Parses a complete ballot file.
///
/// Line 1 is the ward name; line 2 carries `seats no_candidates
/// no_data_lines electorate votes_cast rejected_votes`; then one
/// comma-separated record per candidate and one whitespace-separated row
/// per voting pattern, each row terminated by a `0` sentinel. Candidate
/// numbers are assigned sequentially from 1 in file order, never taken
/// from the file itself.
pub fn load(raw: &str) -> Result<BallotData, CountingError> {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.is_empty() {
        return Err(CountingError::EmptyElection);
    }

    let name = lines[0].trim();
    if name.is_empty() {
        return Err(malformed(1, "expected the ward name on the first line"));
    }

    let header = lines
        .get(1)
        .ok_or_else(|| malformed(2, "missing the six-field header line"))?;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(malformed(
            2,
            format!("expected six integers in the header, found {}", fields.len()),
        ));
    }
    let seats = header_int(2, fields[0], "seats")?;
    let no_candidates = header_int(2, fields[1], "number of candidates")? as usize;
    let no_data_lines = header_int(2, fields[2], "number of data lines")? as usize;
    let electorate = header_int(2, fields[3], "electorate")?;
    let votes_cast = header_int(2, fields[4], "votes cast")?;
    let rejected_votes = header_int(2, fields[5], "rejected votes")?;

    if seats == 0 {
        return Err(malformed(2, "at least one seat is required"));
    }
    if no_candidates == 0 {
        return Err(malformed(2, "at least one candidate is required"));
    }
    if rejected_votes > votes_cast {
        return Err(malformed(
            2,
            format!(
                "rejected votes ({}) exceed votes cast ({})",
                rejected_votes, votes_cast
            ),
        ));
    }

    let info = WardInfo {
        name: name.to_string(),
        seats: seats as u32,
        electorate,
        votes_cast,
        rejected_votes,
    };

    let mut candidates: Vec<Candidate> = Vec::with_capacity(no_candidates);
    for i in 0..no_candidates {
        let lineno = 3 + i;
        let line = lines
            .get(2 + i)
            .ok_or_else(|| malformed(lineno, "missing candidate record"))?;
        let fields: Vec<&str> = line.split(',').collect();
        match fields.as_slice() {
            [name, party, successful] => {
                let party = party.trim();
                candidates.push(Candidate {
                    name: name.trim().to_string(),
                    party: if party.is_empty() {
                        None
                    } else {
                        Some(party.to_string())
                    },
                    successful: successful.trim() == "1",
                });
            }
            _ => {
                return Err(malformed(
                    lineno,
                    "expected a candidate record: name,party,successful",
                ))
            }
        }
    }

    let first_data = 2 + no_candidates;
    let mut ballots: Vec<Ballot> = Vec::with_capacity(no_data_lines);
    for j in 0..no_data_lines {
        let lineno = first_data + j + 1;
        let line = lines
            .get(first_data + j)
            .ok_or_else(|| malformed(lineno, "missing ballot record"))?;
        let mut values: Vec<u64> = Vec::new();
        for field in line.split_whitespace() {
            let v = field
                .parse::<u64>()
                .map_err(|_| malformed(lineno, format!("ballot field is not a number: {:?}", field)))?;
            values.push(v);
        }
        match values.as_slice() {
            [weight, prefs @ .., 0] => {
                if *weight == 0 {
                    return Err(malformed(lineno, "ballot weight must be positive"));
                }
                let mut numbers: Vec<CandidateNumber> = Vec::with_capacity(prefs.len());
                for &p in prefs {
                    if p < 1 || p > no_candidates as u64 {
                        return Err(malformed(
                            lineno,
                            format!("preference {} is outside 1..={}", p, no_candidates),
                        ));
                    }
                    numbers.push(CandidateNumber(p as u32));
                }
                ballots.push(Ballot {
                    weight: *weight,
                    prefs: numbers,
                });
            }
            _ => {
                return Err(malformed(
                    lineno,
                    "expected a weight, the ranked preferences and the terminating 0",
                ))
            }
        }
    }

    for (idx, line) in lines.iter().enumerate().skip(first_data + no_data_lines) {
        if !line.trim().is_empty() {
            return Err(malformed(
                idx + 1,
                "unexpected extra data after the declared ballot rows",
            ));
        }
    }

    // The header stays authoritative for the quota; a weight mismatch is
    // reported but never fatal.
    let weight_sum: u64 = ballots.iter().map(|b| b.weight).sum();
    if weight_sum != info.valid_votes() {
        warn!(
            "ballot weights sum to {} but the header declares {} valid votes",
            weight_sum,
            info.valid_votes()
        );
    }

    let quota = info.valid_votes() / (info.seats as u64 + 1) + 1;
    debug!(
        "load: ward {:?}, {} candidates, {} papers, quota {}",
        info.name,
        candidates.len(),
        ballots.len(),
        quota
    );

    Ok(BallotData {
        info,
        candidates,
        ballots,
        quota,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Cairnfield Ward
3 5 7 5000 120 20
Alice ADAMS,SNP,1
Bob BROWN,Lab,0
Cara CAMPBELL,Grn,1
Dan DUFF,Con,0
Eve EWART,,0
10 1 0
3 1 2 0
27 1 3 0
20 2 0
15 3 0
17 4 2 0
8 5 2 0
";

    #[test]
    fn parses_a_complete_file() {
        let data = load(SAMPLE).unwrap();
        assert_eq!(data.info.name, "Cairnfield Ward");
        assert_eq!(data.info.seats, 3);
        assert_eq!(data.info.electorate, 5000);
        assert_eq!(data.info.valid_votes(), 100);
        assert_eq!(data.quota, 26);
        assert_eq!(data.candidates.len(), 5);
        assert_eq!(data.candidates[0].name, "Alice ADAMS");
        assert_eq!(data.candidates[0].party.as_deref(), Some("SNP"));
        assert!(data.candidates[0].successful);
        assert_eq!(data.candidates[4].party, None);
        assert!(!data.candidates[3].successful);
        assert_eq!(data.ballots.len(), 7);
        assert_eq!(data.ballots[0].weight, 10);
        assert!(data.ballots[0].prefs == vec![CandidateNumber(1)]);
        assert_eq!(
            data.ballots[6].prefs,
            vec![CandidateNumber(5), CandidateNumber(2)]
        );
    }

    #[test]
    fn quota_is_droop() {
        // floor(100 / (3 + 1)) + 1
        let data = load(SAMPLE).unwrap();
        assert_eq!(data.quota, data.info.valid_votes() / 4 + 1);
    }

    #[test]
    fn rejects_non_numeric_header() {
        let bad = SAMPLE.replace("3 5 7 5000 120 20", "3 five 7 5000 120 20");
        match load(&bad) {
            Err(CountingError::MalformedInput { lineno: 2, .. }) => {}
            other => panic!("expected a header error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_short_header() {
        let bad = SAMPLE.replace("3 5 7 5000 120 20", "3 5 7 5000 120");
        assert!(matches!(
            load(&bad),
            Err(CountingError::MalformedInput { lineno: 2, .. })
        ));
    }

    #[test]
    fn rejects_missing_sentinel() {
        let bad = SAMPLE.replace("20 2 0\n", "20 2\n");
        assert!(matches!(
            load(&bad),
            Err(CountingError::MalformedInput { lineno: 11, .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_preference() {
        let bad = SAMPLE.replace("20 2 0\n", "20 6 0\n");
        assert!(matches!(
            load(&bad),
            Err(CountingError::MalformedInput { lineno: 11, .. })
        ));
    }

    #[test]
    fn rejects_extra_rows() {
        let bad = format!("{}4 1 0\n", SAMPLE);
        assert!(matches!(
            load(&bad),
            Err(CountingError::MalformedInput { .. })
        ));
    }

    #[test]
    fn rejects_candidate_count_mismatch() {
        // Drop one candidate record: the first ballot row is then read as
        // a candidate and fails the comma-split check.
        let bad = SAMPLE.replace("Dan DUFF,Con,0\n", "");
        assert!(matches!(
            load(&bad),
            Err(CountingError::MalformedInput { .. })
        ));
    }

    #[test]
    fn weight_mismatch_is_not_fatal() {
        let lenient = SAMPLE.replace("3 5 7 5000 120 20", "3 5 7 5000 130 20");
        let data = load(&lenient).unwrap();
        // Header-derived values are kept authoritative.
        assert_eq!(data.info.valid_votes(), 110);
        assert_eq!(data.quota, 28);
    }

    #[test]
    fn accepts_a_paper_with_no_preferences() {
        let with_empty = SAMPLE
            .replace("3 5 7 5000 120 20", "3 5 8 5000 121 20")
            .replace("8 5 2 0\n", "8 5 2 0\n1 0\n");
        let data = load(&with_empty).unwrap();
        assert_eq!(data.ballots.len(), 8);
        assert!(data.ballots[7].prefs.is_empty());
    }
}
