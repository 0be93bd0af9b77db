//! Vote values and the three-way cast dispatch.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::models::Vote;

/// A signed endorsement: +1 or −1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i8(self) -> i8 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            VoteValue::Up => VoteValue::Down,
            VoteValue::Down => VoteValue::Up,
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        value.as_i8()
    }
}

impl TryFrom<i8> for VoteValue {
    type Error = DomainError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(DomainError::Validation(format!("vote value must be +1 or -1, got {other}"))),
        }
    }
}

/// What a cast does to the stored vote for one (user, justification) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    /// No vote yet: insert one with the cast value.
    Create,
    /// Same direction cast again: retract the existing vote.
    Delete,
    /// Opposite direction: flip the existing row in place.
    Switch,
}

/// Decides the dispatch branch. Storage adapters call this while holding
/// their transaction so read and write stay atomic.
pub fn resolve_vote(existing: Option<VoteValue>, cast: VoteValue) -> VoteAction {
    match existing {
        None => VoteAction::Create,
        Some(current) if current == cast => VoteAction::Delete,
        Some(_) => VoteAction::Switch,
    }
}

/// Result of an applied cast, as reported by the storage port.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    Created(Vote),
    /// The row kept its id and `created_at`; only the value changed.
    Switched(Vote),
    Removed,
}

impl VoteOutcome {
    pub fn current(&self) -> Option<VoteValue> {
        match self {
            VoteOutcome::Created(v) | VoteOutcome::Switched(v) => Some(v.value),
            VoteOutcome::Removed => None,
        }
    }
}

/// Sum of all vote values; recomputed from the full set on every read.
pub fn vote_sum<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> i64 {
    votes.into_iter().map(|v| i64::from(v.value.as_i8())).sum()
}
