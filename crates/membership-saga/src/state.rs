//! Membership saga steps and outcomes.

/// Steps of one membership operation, in order.
///
/// ```text
/// Start ──► EligibilityChecked ──► UniquenessChecked ──► Mutated ──► Notified ──► Done
/// ```
///
/// Removal skips `EligibilityChecked`. Any step before `Mutated` may exit
/// with an error and leaves the roster untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum MembershipStep {
    #[default]
    Start,
    EligibilityChecked,
    UniquenessChecked,
    /// The roster changed. Later failures are not rolled back.
    Mutated,
    /// The notification attempt finished, delivered or failed. Skipped for
    /// background dispatch.
    Notified,
    Done,
}

impl MembershipStep {
    /// Returns true once the roster has been changed.
    pub fn is_past_point_of_no_return(&self) -> bool {
        *self >= MembershipStep::Mutated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStep::Start => "Start",
            MembershipStep::EligibilityChecked => "EligibilityChecked",
            MembershipStep::UniquenessChecked => "UniquenessChecked",
            MembershipStep::Mutated => "Mutated",
            MembershipStep::Notified => "Notified",
            MembershipStep::Done => "Done",
        }
    }
}

impl std::fmt::Display for MembershipStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a successful operation did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    Removed,
    /// Nothing to do, e.g. removing someone who was not a member.
    Unchanged,
}

/// What happened to the notification after the roster changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    /// Delivery failed; the membership change stands.
    Failed(String),
    /// Handed to a background task; the result is only logged.
    Dispatched,
    /// No notification was due.
    Skipped,
}

impl NotificationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, NotificationOutcome::Failed(_))
    }
}
