//! Relationship resolution table.
//!
//! Pure read-side reconciliation of the two independently written status
//! directions. Every function here is total: combinations the table does not
//! name fall through to a documented default, because transient
//! inconsistent pairs are expected while the two sides are being written.

use serde::{Deserialize, Serialize};

use crate::models::{AddIntent, RelationshipGate, RelationshipStatus, RelationshipView};

use RelationshipStatus::{Blocked, BothUnadded, Friends, IUnadded, PendingAdd, TheyUnadded};

/// Both directions of a pair as seen from "my" side, plus the out-of-band
/// signals. `None` statuses are still loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub mine: Option<RelationshipStatus>,
    pub theirs: Option<RelationshipStatus>,
    /// Result of an authoritative friendship check, when one was made
    pub known_friends: Option<bool>,
    /// Either side blocked the other
    pub blocked: bool,
}

impl RelationshipSnapshot {
    #[must_use]
    pub const fn new(mine: RelationshipStatus, theirs: RelationshipStatus) -> Self {
        Self {
            mine: Some(mine),
            theirs: Some(theirs),
            known_friends: None,
            blocked: false,
        }
    }

    #[must_use]
    pub const fn with_known_friends(mut self, known_friends: Option<bool>) -> Self {
        self.known_friends = known_friends;
        self
    }

    /// Blocked flag or a blocked status on either side hides the pair
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked || self.mine == Some(Blocked) || self.theirs == Some(Blocked)
    }

    #[must_use]
    pub fn gate(&self) -> RelationshipGate {
        if self.is_blocked() {
            return RelationshipGate::Hidden;
        }
        RelationshipGate::Visible {
            view: resolve(self.mine, self.theirs, self.known_friends),
            can_send: can_send(self.mine, self.theirs, self.known_friends),
        }
    }

    #[must_use]
    pub fn add_intent(&self) -> Option<AddIntent> {
        if self.is_blocked() {
            return None;
        }
        Some(intent_for_add_action(self.mine, self.theirs))
    }
}

/// Derive the UI-facing view. First matching rule wins.
#[must_use]
#[allow(clippy::match_same_arms)] // one arm per table row
pub fn resolve(
    mine: Option<RelationshipStatus>,
    theirs: Option<RelationshipStatus>,
    known_friends: Option<bool>,
) -> RelationshipView {
    if known_friends == Some(true) {
        return RelationshipView::Friends;
    }

    match (mine, theirs) {
        (Some(Friends), Some(Friends)) => RelationshipView::Friends,
        (Some(BothUnadded), Some(BothUnadded)) => RelationshipView::BothUnadded,
        // I added first; waiting on them
        (Some(PendingAdd), Some(BothUnadded)) => RelationshipView::TheyUnadded,
        // They added first; I may add back
        (Some(BothUnadded), Some(PendingAdd)) => RelationshipView::IUnadded,
        // Both requested; awaiting mutual acceptance
        (Some(PendingAdd), Some(PendingAdd)) => RelationshipView::TheyUnadded,
        (Some(IUnadded), Some(TheyUnadded)) => RelationshipView::IUnadded,
        (Some(TheyUnadded), Some(IUnadded)) => RelationshipView::TheyUnadded,
        (Some(IUnadded), Some(Friends)) => RelationshipView::IUnadded,
        (Some(Friends), Some(IUnadded)) => RelationshipView::TheyUnadded,
        (Some(PendingAdd), Some(TheyUnadded | IUnadded)) => RelationshipView::TheyUnadded,
        (Some(TheyUnadded | IUnadded), Some(PendingAdd)) => RelationshipView::IUnadded,
        (Some(PendingAdd), Some(Friends)) => RelationshipView::TheyUnadded,
        _ => fallback_view(known_friends),
    }
}

/// Optimistic default while status is loading, unless friendship is known
/// not to exist.
const fn fallback_view(known_friends: Option<bool>) -> RelationshipView {
    match known_friends {
        Some(false) => RelationshipView::IUnadded,
        _ => RelationshipView::Friends,
    }
}

/// Sending is allowed only for known friends or a mutual `friends` pair.
///
/// The loading fallback resolves to a `friends` view but is not sendable.
#[must_use]
pub fn can_send(
    mine: Option<RelationshipStatus>,
    theirs: Option<RelationshipStatus>,
    known_friends: Option<bool>,
) -> bool {
    known_friends == Some(true) || matches!((mine, theirs), (Some(Friends), Some(Friends)))
}

/// Decide what an "add/restore" action does. Side-effect free.
#[must_use]
#[allow(clippy::match_same_arms)] // one arm per table row
pub fn intent_for_add_action(
    mine: Option<RelationshipStatus>,
    theirs: Option<RelationshipStatus>,
) -> AddIntent {
    match (mine, theirs) {
        // Counterpart never fully unadded
        (Some(IUnadded), Some(TheyUnadded | Friends)) => AddIntent::RestoreDirectly,
        // First mover
        (Some(BothUnadded), Some(BothUnadded)) => AddIntent::SendRequest,
        (Some(PendingAdd), Some(BothUnadded)) => AddIntent::Wait,
        // Second mover completes the mutual add
        (Some(BothUnadded), Some(PendingAdd)) => AddIntent::SendRequest,
        (Some(PendingAdd), Some(PendingAdd)) => AddIntent::RestoreDirectly,
        (Some(TheyUnadded), Some(IUnadded)) => AddIntent::SendRequest,
        _ => AddIntent::SendRequest,
    }
}
