//! # Domain Models
//!
//! These structs represent the core entities of Agora.
//! We use UUID v7 for time-ordered, globally unique identification, so
//! "lowest id" doubles as "created first" wherever a tie needs breaking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;
use crate::vote::VoteValue;

/// A registered account. Owned by the identity store, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Opaque hash produced by the `CredentialHasher`
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to persist a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// A subject that debates are opened on. Titles are not unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A bounded discussion on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debate {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub creator_id: Uuid,
    pub is_private: bool,
    /// Terminal for joining, justifications and votes. Comments stay open.
    pub is_closed: bool,
    pub started_at: DateTime<Utc>,
}

/// A labeled position within a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stance {
    pub id: Uuid,
    pub debate_id: Uuid,
    pub label: String,
}

/// A user's membership in a debate. Unique per (user_id, debate_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub debate_id: Uuid,
    pub role: Role,
    pub stance_id: Option<Uuid>,
    pub joined_at: DateTime<Utc>,
}

/// An argument authored in support of a stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub stance_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A reply under a justification; `parent_id` forms a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub justification_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A signed endorsement. At most one per (user_id, justification_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub justification_id: Uuid,
    pub value: VoteValue,
    pub created_at: DateTime<Utc>,
}

/// Filter for debate listings. `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebateFilter {
    pub topic_id: Option<Uuid>,
    pub private: Option<bool>,
    pub closed: Option<bool>,
    pub limit: Option<usize>,
}

impl DebateFilter {
    pub fn matches(&self, debate: &Debate) -> bool {
        self.topic_id.map_or(true, |t| debate.topic_id == t)
            && self.private.map_or(true, |p| debate.is_private == p)
            && self.closed.map_or(true, |c| debate.is_closed == c)
    }
}

/// Filter for participant aggregates, joined against the owning debate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantFilter {
    pub user_id: Option<Uuid>,
    pub debate_id: Option<Uuid>,
    pub debate_closed: Option<bool>,
    pub debate_private: Option<bool>,
}

impl ParticipantFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { user_id: Some(user_id), ..Self::default() }
    }

    pub fn matches(&self, participant: &Participant, debate: &Debate) -> bool {
        self.user_id.map_or(true, |u| participant.user_id == u)
            && self.debate_id.map_or(true, |d| participant.debate_id == d)
            && self.debate_closed.map_or(true, |c| debate.is_closed == c)
            && self.debate_private.map_or(true, |p| debate.is_private == p)
    }
}
