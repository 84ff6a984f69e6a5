use coy_core::relationship::RelationshipSnapshot;

use crate::commands::common::{evaluate_pair, format_pair_line, parse_status};
use crate::error::CliError;

pub fn run_resolve(
    mine: &str,
    theirs: &str,
    known_friends: Option<bool>,
    blocked: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let snapshot = RelationshipSnapshot {
        mine: parse_status(mine)?,
        theirs: parse_status(theirs)?,
        known_friends,
        blocked,
    };
    let report = evaluate_pair(&snapshot);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_pair_line(&report));
    }

    Ok(())
}
