//! # Core Traits (Ports)
//!
//! Any storage or auth adapter must implement these traits to be wired into
//! the services. Multi-entity writes that must be atomic are expressed as a
//! single port call, so each adapter owns its own transaction boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, StorageResult};
use crate::models::{
    Comment, Debate, DebateFilter, Justification, NewUser, Participant, ParticipantFilter, Stance,
    Topic, User, Vote,
};
use crate::role::Role;
use crate::vote::{VoteOutcome, VoteValue};

/// Identity store contract. Email and username are unique.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StorageResult<Option<User>>;
    /// Fails with `StorageError::Conflict` on a duplicate email or username.
    async fn create_user(&self, user: NewUser) -> StorageResult<User>;
    async fn update_user(&self, user: User) -> StorageResult<User>;
}

/// Persistence contract for topics, debates, stances and participants.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DebateRepo: Send + Sync {
    // Topic Operations
    async fn create_topic(&self, topic: Topic) -> StorageResult<()>;
    async fn get_topic(&self, id: Uuid) -> StorageResult<Option<Topic>>;
    async fn list_topics(&self) -> StorageResult<Vec<Topic>>;

    // Debate Operations
    /// Atomic: the debate, its initial stances and the creator's participant
    /// row are written together or not at all.
    async fn create_debate(&self, debate: Debate, stances: Vec<Stance>, creator: Participant) -> StorageResult<()>;
    async fn get_debate(&self, id: Uuid) -> StorageResult<Option<Debate>>;
    /// Most recently started first.
    async fn list_debates(&self, filter: &DebateFilter) -> StorageResult<Vec<Debate>>;
    async fn close_debate(&self, id: Uuid) -> StorageResult<()>;
    /// Cascades to participants, stances, justifications, comments and votes.
    async fn delete_debate(&self, id: Uuid) -> StorageResult<()>;

    // Stance Operations
    async fn create_stance(&self, stance: Stance) -> StorageResult<()>;
    async fn get_stance(&self, id: Uuid) -> StorageResult<Option<Stance>>;
    async fn list_stances(&self, debate_id: Uuid) -> StorageResult<Vec<Stance>>;
    async fn rename_stance(&self, id: Uuid, label: String) -> StorageResult<()>;
    async fn delete_stance(&self, id: Uuid) -> StorageResult<()>;

    // Participant Operations
    /// Fails with `StorageError::Conflict` if (user_id, debate_id) exists.
    async fn insert_participant(&self, participant: Participant) -> StorageResult<()>;
    async fn get_participant(&self, id: Uuid) -> StorageResult<Option<Participant>>;
    async fn find_participant(&self, user_id: Uuid, debate_id: Uuid) -> StorageResult<Option<Participant>>;
    async fn list_participants(&self, debate_id: Uuid) -> StorageResult<Vec<Participant>>;
    /// Fails with `StorageError::NotFound` if the row vanished concurrently.
    async fn update_participant_role(&self, id: Uuid, role: Role) -> StorageResult<Participant>;
    async fn update_participant_stance(&self, id: Uuid, stance_id: Option<Uuid>) -> StorageResult<Participant>;
    async fn delete_participant(&self, id: Uuid) -> StorageResult<()>;

    // Aggregates
    async fn count_participants(&self, filter: &ParticipantFilter) -> StorageResult<u64>;
    async fn count_participants_by_role(&self, filter: &ParticipantFilter) -> StorageResult<Vec<(Role, u64)>>;
    /// The user's participant rows joined with their debates.
    async fn list_participations(&self, user_id: Uuid) -> StorageResult<Vec<(Participant, Debate)>>;
}

/// Persistence contract for justifications, comments and votes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DiscussionRepo: Send + Sync {
    // Justification Operations
    async fn create_justification(&self, justification: Justification) -> StorageResult<()>;
    async fn get_justification(&self, id: Uuid) -> StorageResult<Option<Justification>>;
    async fn list_justifications_for_stance(&self, stance_id: Uuid) -> StorageResult<Vec<Justification>>;
    async fn list_justifications_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Justification>>;

    // Comment Operations
    async fn create_comment(&self, comment: Comment) -> StorageResult<()>;
    async fn get_comment(&self, id: Uuid) -> StorageResult<Option<Comment>>;
    /// Flat list for one justification; threading happens on read.
    async fn list_comments(&self, justification_id: Uuid) -> StorageResult<Vec<Comment>>;
    async fn list_comments_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Comment>>;

    // Vote Operations
    /// Reads the existing vote for (user_id, justification_id) and applies
    /// `vote::resolve_vote` under one transaction boundary.
    async fn apply_vote(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        justification_id: Uuid,
        value: VoteValue,
        at: DateTime<Utc>,
    ) -> StorageResult<VoteOutcome>;
    async fn list_votes(&self, justification_id: Uuid) -> StorageResult<Vec<Vote>>;
    async fn list_votes_by_user(&self, user_id: Uuid) -> StorageResult<Vec<Vote>>;
}

/// Credential hashing contract. Plaintext never reaches the stores.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String>;
    async fn verify_password(&self, password: &str, hash: &str) -> bool;
}
