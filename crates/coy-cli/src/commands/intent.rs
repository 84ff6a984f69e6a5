use coy_core::relationship::intent_for_add_action;
use coy_core::{AddIntent, RelationshipStatus};
use serde::Serialize;

use crate::commands::common::parse_status;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct IntentReport {
    intent: AddIntent,
    /// My status after the action, `None` when nothing is written
    next_mine: Option<RelationshipStatus>,
}

pub fn run_intent(mine: &str, theirs: &str, as_json: bool) -> Result<(), CliError> {
    let intent = intent_for_add_action(parse_status(mine)?, parse_status(theirs)?);
    let report = IntentReport {
        intent,
        next_mine: intent.next_status(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let next = report
            .next_mine
            .map_or("unchanged", RelationshipStatus::as_str);
        println!("{intent} (my status becomes {next})");
    }

    Ok(())
}
