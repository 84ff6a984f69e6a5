use coy_core::relationship::RelationshipSnapshot;
use coy_core::RelationshipStatus;

use crate::commands::common::{evaluate_pair, format_pair_line, PairReport};
use crate::error::CliError;

pub fn run_table(as_json: bool) -> Result<(), CliError> {
    let reports = resolution_table();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", format_pair_line(report));
        }
    }

    Ok(())
}

/// Every (mine, theirs) pair including unknown, in a stable order
pub fn resolution_table() -> Vec<PairReport> {
    let statuses: Vec<Option<RelationshipStatus>> = std::iter::once(None)
        .chain(RelationshipStatus::ALL.into_iter().map(Some))
        .collect();

    statuses
        .iter()
        .flat_map(|mine| {
            statuses.iter().map(move |theirs| {
                evaluate_pair(&RelationshipSnapshot {
                    mine: *mine,
                    theirs: *theirs,
                    ..RelationshipSnapshot::default()
                })
            })
        })
        .collect()
}
