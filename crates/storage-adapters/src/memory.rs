//! # In-memory store
//!
//! Implements every repository port over plain maps behind a single
//! `tokio::sync::RwLock`. Each port call takes the lock once, which makes
//! multi-row writes and the vote dispatch atomic, and uniqueness is checked
//! while the write lock is held.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    resolve_vote, Comment, Debate, DebateFilter, DebateRepo, DiscussionRepo, Justification, NewUser,
    Participant, ParticipantFilter, Role, Stance, StorageError, StorageResult, Topic, User, UserRepo,
    Vote, VoteAction, VoteOutcome, VoteValue,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    topics: BTreeMap<Uuid, Topic>,
    debates: BTreeMap<Uuid, Debate>,
    stances: BTreeMap<Uuid, Stance>,
    participants: BTreeMap<Uuid, Participant>,
    justifications: BTreeMap<Uuid, Justification>,
    comments: BTreeMap<Uuid, Comment>,
    votes: BTreeMap<Uuid, Vote>,
}

const LABEL_CONFLICT: &str = "stances.debate_id, stances.label";

impl Tables {
    fn participations(&self, filter: &ParticipantFilter) -> impl Iterator<Item = (&Participant, &Debate)> + '_ {
        let filter = filter.clone();
        self.participants.values().filter_map(move |p| {
            let debate = self.debates.get(&p.debate_id)?;
            filter.matches(p, debate).then_some((p, debate))
        })
    }

    fn stance_ids_of(&self, debate_id: Uuid) -> Vec<Uuid> {
        self.stances.values().filter(|s| s.debate_id == debate_id).map(|s| s.id).collect()
    }

    /// Labels are unique per debate, ignoring ASCII case.
    fn label_taken(&self, debate_id: Uuid, label: &str, except: Uuid) -> bool {
        self.stances
            .values()
            .any(|s| s.debate_id == debate_id && s.id != except && s.label.eq_ignore_ascii_case(label))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|r| key(r));
    rows
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict("email".into()));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict("username".into()));
        }
        let user = User {
            id: Uuid::now_v7(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_picture: None,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: User) -> StorageResult<User> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(StorageError::NotFound { entity: "User", id: user.id });
        }
        let clash = |u: &&User| u.id != user.id;
        if tables.users.values().filter(clash).any(|u| u.email == user.email) {
            return Err(StorageError::Conflict("email".into()));
        }
        if tables.users.values().filter(clash).any(|u| u.username == user.username) {
            return Err(StorageError::Conflict("username".into()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl DebateRepo for MemoryStore {
    async fn create_topic(&self, topic: Topic) -> StorageResult<()> {
        self.tables.write().await.topics.insert(topic.id, topic);
        Ok(())
    }

    async fn get_topic(&self, id: Uuid) -> StorageResult<Option<Topic>> {
        Ok(self.tables.read().await.topics.get(&id).cloned())
    }

    async fn list_topics(&self) -> StorageResult<Vec<Topic>> {
        let topics = self.tables.read().await.topics.values().cloned().collect();
        Ok(sorted_by(topics, |t: &Topic| t.title.to_lowercase()))
    }

    async fn create_debate(&self, debate: Debate, stances: Vec<Stance>, creator: Participant) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.topics.contains_key(&debate.topic_id) {
            return Err(StorageError::NotFound { entity: "Topic", id: debate.topic_id });
        }
        for (i, stance) in stances.iter().enumerate() {
            if stances[..i].iter().any(|s| s.label.eq_ignore_ascii_case(&stance.label)) {
                return Err(StorageError::Conflict(LABEL_CONFLICT.into()));
            }
        }
        for stance in stances {
            tables.stances.insert(stance.id, stance);
        }
        tables.participants.insert(creator.id, creator);
        tables.debates.insert(debate.id, debate);
        Ok(())
    }

    async fn get_debate(&self, id: Uuid) -> StorageResult<Option<Debate>> {
        Ok(self.tables.read().await.debates.get(&id).cloned())
    }

    async fn list_debates(&self, filter: &DebateFilter) -> StorageResult<Vec<Debate>> {
        let tables = self.tables.read().await;
        let mut debates: Vec<Debate> = tables.debates.values().filter(|d| filter.matches(d)).cloned().collect();
        debates.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            debates.truncate(limit);
        }
        Ok(debates)
    }

    async fn close_debate(&self, id: Uuid) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let debate = tables
            .debates
            .get_mut(&id)
            .ok_or(StorageError::NotFound { entity: "Debate", id })?;
        debate.is_closed = true;
        Ok(())
    }

    async fn delete_debate(&self, id: Uuid) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if tables.debates.remove(&id).is_none() {
            return Err(StorageError::NotFound { entity: "Debate", id });
        }
        let stance_ids = tables.stance_ids_of(id);
        let justification_ids: Vec<Uuid> = tables
            .justifications
            .values()
            .filter(|j| stance_ids.contains(&j.stance_id))
            .map(|j| j.id)
            .collect();

        tables.votes.retain(|_, v| !justification_ids.contains(&v.justification_id));
        tables.comments.retain(|_, c| !justification_ids.contains(&c.justification_id));
        tables.justifications.retain(|_, j| !justification_ids.contains(&j.id));
        tables.stances.retain(|_, s| s.debate_id != id);
        tables.participants.retain(|_, p| p.debate_id != id);
        debug!(debate_id = %id, justifications = justification_ids.len(), "debate cascade removed");
        Ok(())
    }

    async fn create_stance(&self, stance: Stance) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.debates.contains_key(&stance.debate_id) {
            return Err(StorageError::NotFound { entity: "Debate", id: stance.debate_id });
        }
        if tables.label_taken(stance.debate_id, &stance.label, stance.id) {
            return Err(StorageError::Conflict(LABEL_CONFLICT.into()));
        }
        tables.stances.insert(stance.id, stance);
        Ok(())
    }

    async fn get_stance(&self, id: Uuid) -> StorageResult<Option<Stance>> {
        Ok(self.tables.read().await.stances.get(&id).cloned())
    }

    async fn list_stances(&self, debate_id: Uuid) -> StorageResult<Vec<Stance>> {
        let tables = self.tables.read().await;
        Ok(tables.stances.values().filter(|s| s.debate_id == debate_id).cloned().collect())
    }

    async fn rename_stance(&self, id: Uuid, label: String) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let debate_id = tables
            .stances
            .get(&id)
            .map(|s| s.debate_id)
            .ok_or(StorageError::NotFound { entity: "Stance", id })?;
        if tables.label_taken(debate_id, &label, id) {
            return Err(StorageError::Conflict(LABEL_CONFLICT.into()));
        }
        if let Some(stance) = tables.stances.get_mut(&id) {
            stance.label = label;
        }
        Ok(())
    }

    async fn delete_stance(&self, id: Uuid) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if tables.justifications.values().any(|j| j.stance_id == id) {
            return Err(StorageError::Conflict("justifications.stance_id".into()));
        }
        if tables.stances.remove(&id).is_none() {
            return Err(StorageError::NotFound { entity: "Stance", id });
        }
        for participant in tables.participants.values_mut() {
            if participant.stance_id == Some(id) {
                participant.stance_id = None;
            }
        }
        Ok(())
    }

    async fn insert_participant(&self, participant: Participant) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .participants
            .values()
            .any(|p| p.user_id == participant.user_id && p.debate_id == participant.debate_id)
        {
            return Err(StorageError::Conflict("participants.user_id, participants.debate_id".into()));
        }
        if !tables.debates.contains_key(&participant.debate_id) {
            return Err(StorageError::NotFound { entity: "Debate", id: participant.debate_id });
        }
        tables.participants.insert(participant.id, participant);
        Ok(())
    }

    async fn get_participant(&self, id: Uuid) -> StorageResult<Option<Participant>> {
        Ok(self.tables.read().await.participants.get(&id).cloned())
    }

    async fn find_participant(&self, user_id: Uuid, debate_id: Uuid) -> StorageResult<Option<Participant>> {
        let tables = self.tables.read().await;
        Ok(tables
            .participants
            .values()
            .find(|p| p.user_id == user_id && p.debate_id == debate_id)
            .cloned())
    }

    async fn list_participants(&self, debate_id: Uuid) -> StorageResult<Vec<Participant>> {
        let tables = self.tables.read().await;
        let rows = tables.participants.values().filter(|p| p.debate_id == debate_id).cloned().collect();
        Ok(sorted_by(rows, |p: &Participant| (p.joined_at, p.id)))
    }

    async fn update_participant_role(&self, id: Uuid, role: Role) -> StorageResult<Participant> {
        let mut tables = self.tables.write().await;
        let participant = tables
            .participants
            .get_mut(&id)
            .ok_or(StorageError::NotFound { entity: "Participant", id })?;
        participant.role = role;
        Ok(participant.clone())
    }

    async fn update_participant_stance(&self, id: Uuid, stance_id: Option<Uuid>) -> StorageResult<Participant> {
        let mut tables = self.tables.write().await;
        let participant = tables
            .participants
            .get_mut(&id)
            .ok_or(StorageError::NotFound { entity: "Participant", id })?;
        participant.stance_id = stance_id;
        Ok(participant.clone())
    }

    async fn delete_participant(&self, id: Uuid) -> StorageResult<()> {
        match self.tables.write().await.participants.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound { entity: "Participant", id }),
        }
    }

    async fn count_participants(&self, filter: &ParticipantFilter) -> StorageResult<u64> {
        Ok(self.tables.read().await.participations(filter).count() as u64)
    }

    async fn count_participants_by_role(&self, filter: &ParticipantFilter) -> StorageResult<Vec<(Role, u64)>> {
        let tables = self.tables.read().await;
        let mut counts: BTreeMap<Role, u64> = BTreeMap::new();
        for (participant, _) in tables.participations(filter) {
            *counts.entry(participant.role).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn list_participations(&self, user_id: Uuid) -> StorageResult<Vec<(Participant, Debate)>> {
        let tables = self.tables.read().await;
        let rows = tables
            .participations(&ParticipantFilter::for_user(user_id))
            .map(|(p, d)| (p.clone(), d.clone()))
            .collect();
        Ok(sorted_by(rows, |(p, _): &(Participant, Debate)| (p.joined_at, p.id)))
    }
}

#[async_trait]
impl DiscussionRepo for MemoryStore {
    async fn create_justification(&self, justification: Justification) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.stances.contains_key(&justification.stance_id) {
            return Err(StorageError::NotFound { entity: "Stance", id: justification.stance_id });
        }
        tables.justifications.insert(justification.id, justification);
        Ok(())
    }

    async fn get_justification(&self, id: Uuid) -> StorageResult<Option<Justification>> {
        Ok(self.tables.read().await.justifications.get(&id).cloned())
    }

    async fn list_justifications_for_stance(&self, stance_id: Uuid) -> StorageResult<Vec<Justification>> {
        let tables = self.tables.read().await;
        Ok(tables.justifications.values().filter(|j| j.stance_id == stance_id).cloned().collect())
    }

    async fn list_justifications_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Justification>> {
        let tables = self.tables.read().await;
        Ok(tables.justifications.values().filter(|j| j.author_id == author_id).cloned().collect())
    }

    async fn create_comment(&self, comment: Comment) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.justifications.contains_key(&comment.justification_id) {
            return Err(StorageError::NotFound { entity: "Justification", id: comment.justification_id });
        }
        if let Some(parent) = comment.parent_id {
            if !tables.comments.contains_key(&parent) {
                return Err(StorageError::NotFound { entity: "Comment", id: parent });
            }
        }
        tables.comments.insert(comment.id, comment);
        Ok(())
    }

    async fn get_comment(&self, id: Uuid) -> StorageResult<Option<Comment>> {
        Ok(self.tables.read().await.comments.get(&id).cloned())
    }

    async fn list_comments(&self, justification_id: Uuid) -> StorageResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let rows = tables.comments.values().filter(|c| c.justification_id == justification_id).cloned().collect();
        Ok(sorted_by(rows, |c: &Comment| (c.created_at, c.id)))
    }

    async fn list_comments_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables.comments.values().filter(|c| c.author_id == author_id).cloned().collect())
    }

    async fn apply_vote(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        justification_id: Uuid,
        value: VoteValue,
        at: DateTime<Utc>,
    ) -> StorageResult<VoteOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.justifications.contains_key(&justification_id) {
            return Err(StorageError::NotFound { entity: "Justification", id: justification_id });
        }
        let existing = tables
            .votes
            .values()
            .find(|v| v.user_id == user_id && v.justification_id == justification_id)
            .cloned();

        match (resolve_vote(existing.as_ref().map(|v| v.value), value), existing) {
            (VoteAction::Create, _) => {
                let vote = Vote { id: vote_id, user_id, justification_id, value, created_at: at };
                tables.votes.insert(vote.id, vote.clone());
                Ok(VoteOutcome::Created(vote))
            }
            (VoteAction::Delete, Some(vote)) => {
                tables.votes.remove(&vote.id);
                Ok(VoteOutcome::Removed)
            }
            (VoteAction::Switch, Some(mut vote)) => {
                vote.value = value;
                tables.votes.insert(vote.id, vote.clone());
                Ok(VoteOutcome::Switched(vote))
            }
            (action, None) => Err(StorageError::Backend(anyhow::anyhow!("{action:?} without an existing vote"))),
        }
    }

    async fn list_votes(&self, justification_id: Uuid) -> StorageResult<Vec<Vote>> {
        let tables = self.tables.read().await;
        Ok(tables.votes.values().filter(|v| v.justification_id == justification_id).cloned().collect())
    }

    async fn list_votes_by_user(&self, user_id: Uuid) -> StorageResult<Vec<Vote>> {
        let tables = self.tables.read().await;
        Ok(tables.votes.values().filter(|v| v.user_id == user_id).cloned().collect())
    }
}
