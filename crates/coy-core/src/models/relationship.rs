//! Relationship status and derived views

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One user's directional record of how they regard a counterpart.
///
/// The two directions of a pair are written independently and are not
/// required to agree at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipStatus {
    Friends,
    IUnadded,
    TheyUnadded,
    BothUnadded,
    PendingAdd,
    Blocked,
}

impl RelationshipStatus {
    /// All status values, in declaration order
    pub const ALL: [Self; 6] = [
        Self::Friends,
        Self::IUnadded,
        Self::TheyUnadded,
        Self::BothUnadded,
        Self::PendingAdd,
        Self::Blocked,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Friends => "friends",
            Self::IUnadded => "iUnadded",
            Self::TheyUnadded => "theyUnadded",
            Self::BothUnadded => "bothUnadded",
            Self::PendingAdd => "pendingAdd",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    /// Accepts the camelCase wire names as well as snake/kebab case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("unknown relationship status '{s}'"))
    }
}

/// UI-facing relationship state. Blocked pairs have no view at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipView {
    Friends,
    IUnadded,
    TheyUnadded,
    BothUnadded,
}

impl RelationshipView {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Friends => "friends",
            Self::IUnadded => "iUnadded",
            Self::TheyUnadded => "theyUnadded",
            Self::BothUnadded => "bothUnadded",
        }
    }
}

impl fmt::Display for RelationshipView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an "add/restore" action should do for the current pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddIntent {
    /// Become friends again without a request
    RestoreDirectly,
    /// Send an add request
    SendRequest,
    /// A request is already outstanding
    Wait,
}

impl AddIntent {
    /// The caller's own status after carrying out this intent, or `None`
    /// when nothing is written.
    #[must_use]
    pub const fn next_status(self) -> Option<RelationshipStatus> {
        match self {
            Self::RestoreDirectly => Some(RelationshipStatus::Friends),
            Self::SendRequest => Some(RelationshipStatus::PendingAdd),
            Self::Wait => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RestoreDirectly => "restoreDirectly",
            Self::SendRequest => "sendRequest",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for AddIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a pair, including the blocked short-circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RelationshipGate {
    /// Relationship does not exist for display; the conversation is hidden
    Hidden,
    Visible {
        view: RelationshipView,
        can_send: bool,
    },
}

impl RelationshipGate {
    #[must_use]
    pub const fn view(self) -> Option<RelationshipView> {
        match self {
            Self::Hidden => None,
            Self::Visible { view, .. } => Some(view),
        }
    }

    #[must_use]
    pub const fn can_send(self) -> bool {
        match self {
            Self::Hidden => false,
            Self::Visible { can_send, .. } => can_send,
        }
    }
}
