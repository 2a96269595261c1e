use log::{debug, info, warn};

use stv_counting::*;

use snafu::{prelude::*, Snafu};

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::tabulate::summary::*;

#[derive(Debug, Snafu)]
pub enum WardError {
    #[snafu(display("Error opening ballot file {path}"))]
    OpeningBallotFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error in the ballot data"))]
    BallotData { source: CountingError },
    #[snafu(display("Error while counting"))]
    Counting { source: CountingError },
    #[snafu(display("Error opening summary file"))]
    OpeningJson { source: std::io::Error },
    #[snafu(display("Error reading JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type WardResult<T> = Result<T, WardError>;

pub mod summary {
    use crate::tabulate::*;

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub ward: String,
        pub seats: u32,
        pub electorate: u64,
        #[serde(rename = "votesCast")]
        pub votes_cast: u64,
        #[serde(rename = "rejectedVotes")]
        pub rejected_votes: u64,
        pub quota: u64,
    }

    pub fn read_summary(path: String) -> WardResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }
}

fn action_to_json(action: &StageAction) -> JSValue {
    match action {
        StageAction::FirstPreferences { non_transferable } => json!({
            "type": "firstPreferences",
            "nonTransferable": non_transferable.get(),
        }),
        StageAction::SurplusTransfer {
            from,
            surplus,
            transfer_weight,
            non_transferable,
        } => json!({
            "type": "surplusTransfer",
            "from": from.0,
            "surplus": surplus.get(),
            "transferWeight": transfer_weight,
            "nonTransferable": non_transferable.get(),
        }),
        StageAction::Elimination {
            eliminated,
            transferred,
            non_transferable,
        } => json!({
            "type": "elimination",
            "eliminated": eliminated.0,
            "transferred": transferred.get(),
            "nonTransferable": non_transferable.get(),
        }),
    }
}

fn result_stats_to_json(rs: &CountResult) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for report in rs.stages.iter() {
        let candidates: Vec<JSValue> = report
            .standings
            .iter()
            .map(|standing| {
                let stages: Vec<JSValue> = standing
                    .stages
                    .iter()
                    .map(|sv| {
                        json!({
                            "cumulativeVotes": sv.cumulative_votes.get(),
                            "votes": sv.votes.get(),
                        })
                    })
                    .collect();
                json!({
                    "number": standing.number.0,
                    "name": standing.name,
                    "party": standing.party,
                    "totalVotes": standing.total_votes.get(),
                    "percentage": standing.percentage,
                    "stages": stages,
                })
            })
            .collect();
        let elected: Vec<u32> = report.elected.iter().map(|n| n.0).collect();
        let js = json!({
            "stage": report.stage,
            "narrative": report.narrative,
            "action": action_to_json(&report.action),
            "elected": elected,
            "candidates": candidates,
        });
        l.push(js);
    }
    l
}

fn build_summary_js(info: &WardInfo, quota: u64, rv: &CountResult) -> JSValue {
    let c = OutputConfig {
        ward: info.name.clone(),
        seats: info.seats,
        electorate: info.electorate,
        votes_cast: info.votes_cast,
        rejected_votes: info.rejected_votes,
        quota,
    };
    json!({
        "config": c,
        "results": result_stats_to_json(rv),
        "winners": rv.winners,
    })
}

fn validate_rules(args: &Args) -> WardResult<CountRules> {
    let tie_break = match args.tiebreak.as_deref() {
        None | Some("candidate-number") => TieBreakPolicy::ByCandidateNumber,
        Some("random") => {
            let seed = match args.random_seed {
                Some(x) => x,
                None => {
                    whatever!("The random tie-break mode requires --random-seed")
                }
            };
            TieBreakPolicy::Random(seed)
        }
        Some(x) => {
            whatever!("Cannot use tie-break mode {:?} (not implemented)", x)
        }
    };
    Ok(CountRules { tie_break })
}

pub fn run_tabulation(args: &Args) -> WardResult<()> {
    let rules = validate_rules(args)?;

    let raw = fs::read_to_string(&args.input).context(OpeningBallotFileSnafu {
        path: args.input.clone(),
    })?;
    let data = load(&raw).context(BallotDataSnafu {})?;
    let info = data.info.clone();
    let quota = data.quota;
    info!(
        "Loaded {:?}: {} candidates, {} voting patterns",
        info.name,
        data.candidates.len(),
        data.ballots.len()
    );

    let result = run_count(data, &rules).context(CountingSnafu {})?;

    println!("{}: {} seats, quota {}.", result.ward, result.seats, quota);
    for report in &result.stages {
        println!("Stage {}: {}", report.stage, report.narrative);
        for standing in &report.standings {
            debug!(
                "  stage {}: {} {} ({}%)",
                report.stage, standing.total_votes, standing.name, standing.percentage
            );
        }
    }
    println!(
        "All {} seats filled in stage {}.",
        result.seats,
        result.stages.len()
    );
    if let Some(last) = result.stages.last() {
        for number in &result.elected {
            if let Some(standing) = last.standings.iter().find(|s| s.number == *number) {
                match &standing.party {
                    Some(party) => println!("Elected: {} ({})", standing.name, party),
                    None => println!("Elected: {}", standing.name),
                }
            }
        }
    }

    let result_js = build_summary_js(&info, quota, &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    match args.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => fs::write(path, &pretty_js_stats).context(WritingSummarySnafu {
            path: path.to_string(),
        })?,
        None => {}
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        let summary_ref = read_summary(summary_p.clone())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}
