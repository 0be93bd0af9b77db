//! # Participation Engine
//!
//! Who may join a debate, who may act in it, and how roles change over the
//! debate's lifecycle (open → closed → deleted).

use std::sync::Arc;

use chrono::Utc;
use domains::{
    Actor, Debate, DebateRepo, DomainError, Participant, Result, Role, Stance, StorageError, StorageResult,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::support::{non_empty, parse_id, storage_failure, StorageResultExt};

/// Input for opening a debate. `topic_id` arrives as raw text from the
/// request and is validated here.
#[derive(Debug, Clone, Default)]
pub struct NewDebate {
    pub topic_id: String,
    pub is_private: bool,
    pub stances: Vec<String>,
}

/// A debate together with the caller's participant row, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateAccess {
    pub debate: Debate,
    pub participant: Option<Participant>,
}

impl DebateAccess {
    pub fn role(&self) -> Option<Role> {
        self.participant.as_ref().map(|p| p.role)
    }

    pub fn require_participant(&self) -> Result<&Participant> {
        self.participant.as_ref().ok_or_else(|| {
            warn!(debate_id = %self.debate.id, "caller is not a participant");
            DomainError::Permission("you are not a participant of this debate".into())
        })
    }

    pub fn require_debate_permissions(&self) -> Result<&Participant> {
        let participant = self.require_participant()?;
        if !participant.role.has_debate_permissions() {
            warn!(debate_id = %self.debate.id, role = %participant.role, "debate permissions required");
            return Err(DomainError::Permission(format!("{} cannot argue or vote", participant.role)));
        }
        Ok(participant)
    }

    pub fn require_admin(&self) -> Result<&Participant> {
        let participant = self.require_participant()?;
        if !participant.role.has_admin_permissions() {
            warn!(debate_id = %self.debate.id, role = %participant.role, "admin permissions required");
            return Err(DomainError::Permission(format!("{} lacks admin permissions", participant.role)));
        }
        Ok(participant)
    }

    pub fn require_open(&self) -> Result<()> {
        if self.debate.is_closed {
            return Err(DomainError::DebateClosed(self.debate.id));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ParticipationService {
    debates: Arc<dyn DebateRepo>,
}

impl ParticipationService {
    pub fn new(debates: Arc<dyn DebateRepo>) -> Self {
        Self { debates }
    }

    /// Opens a debate and makes the caller its CREATOR in one atomic write.
    #[instrument(skip(self, new), fields(topic_id = %new.topic_id))]
    pub async fn create_debate(&self, actor: Actor, new: NewDebate) -> Result<Debate> {
        let user_id = actor.user_id()?;
        let topic_id = parse_id(&new.topic_id, "topic id")?;
        self.debates
            .get_topic(topic_id)
            .await
            .or_internal("load topic")?
            .ok_or_else(|| DomainError::not_found("Topic", topic_id))?;

        let debate = Debate {
            id: Uuid::now_v7(),
            topic_id,
            creator_id: user_id,
            is_private: new.is_private,
            is_closed: false,
            started_at: Utc::now(),
        };

        let mut labels: Vec<String> = Vec::with_capacity(new.stances.len());
        for raw in &new.stances {
            let label = non_empty(raw, "stance label")?;
            ensure_distinct(&labels, &label)?;
            labels.push(label);
        }
        let stances = labels
            .into_iter()
            .map(|label| Stance { id: Uuid::now_v7(), debate_id: debate.id, label })
            .collect();

        let creator = Participant {
            id: Uuid::now_v7(),
            user_id,
            debate_id: debate.id,
            role: Role::Creator,
            stance_id: None,
            joined_at: debate.started_at,
        };

        self.debates
            .create_debate(debate.clone(), stances, creator)
            .await
            .or_internal("create debate")?;
        info!(debate_id = %debate.id, %user_id, private = debate.is_private, "debate created");
        Ok(debate)
    }

    /// Joins a public debate as DEBATER. Private debates go through invites.
    #[instrument(skip(self))]
    pub async fn join_debate(&self, actor: Actor, debate_id: Uuid) -> Result<Participant> {
        let user_id = actor.user_id()?;
        let debate = self.load_debate(debate_id).await?;
        if debate.is_private {
            warn!(%debate_id, %user_id, "join attempted on private debate");
            return Err(DomainError::Permission("private debates require an invitation".into()));
        }
        if debate.is_closed {
            return Err(DomainError::DebateClosed(debate_id));
        }

        let participant = Participant {
            id: Uuid::now_v7(),
            user_id,
            debate_id,
            role: Role::Debater,
            stance_id: None,
            joined_at: Utc::now(),
        };
        // Uniqueness is enforced by the store; no check-then-insert here.
        match self.debates.insert_participant(participant.clone()).await {
            Ok(()) => {
                info!(%debate_id, %user_id, "joined debate");
                Ok(participant)
            }
            Err(StorageError::Conflict(_)) => Err(DomainError::AlreadyParticipant { user_id, debate_id }),
            Err(e) => Err(storage_failure("join debate", e)),
        }
    }

    /// Reassigns a participant's role. Only admins may do this, CREATOR can
    /// neither be granted nor taken away.
    #[instrument(skip(self))]
    pub async fn change_role(
        &self,
        actor: Actor,
        debate_id: Uuid,
        participant_id: Uuid,
        new_role: &str,
    ) -> Result<Participant> {
        actor.user_id()?;
        let role: Role = new_role.parse()?;
        if role == Role::Creator {
            return Err(DomainError::InvalidRole("CREATOR cannot be assigned".into()));
        }

        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_admin()?;

        let target = self
            .debates
            .get_participant(participant_id)
            .await
            .or_internal("load participant")?
            .filter(|p| p.debate_id == debate_id)
            .ok_or_else(|| DomainError::not_found("Participant", participant_id))?;
        if target.role == Role::Creator {
            return Err(DomainError::Permission("the creator's role is immutable".into()));
        }

        let updated = self
            .debates
            .update_participant_role(participant_id, role)
            .await
            .or_internal("update participant role")?;
        info!(%debate_id, %participant_id, from = %target.role, to = %role, "role changed");
        Ok(updated)
    }

    /// Gate for every debate-scoped read or write.
    ///
    /// Public debates are readable by any authenticated user; private ones
    /// require a participant row. Write gates are checked by each operation.
    pub async fn ensure_debate_access(&self, actor: Actor, debate_id: Uuid) -> Result<DebateAccess> {
        let user_id = actor.user_id()?;
        let debate = self.load_debate(debate_id).await?;
        let participant = self
            .debates
            .find_participant(user_id, debate_id)
            .await
            .or_internal("load participant")?;

        if debate.is_private && participant.is_none() {
            warn!(%debate_id, %user_id, "private debate access denied");
            return Err(DomainError::Permission("this debate is private".into()));
        }
        Ok(DebateAccess { debate, participant })
    }

    /// Closes the debate for joining, justifications and votes. There is no
    /// reopen.
    #[instrument(skip(self))]
    pub async fn close_debate(&self, actor: Actor, debate_id: Uuid) -> Result<Debate> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_admin()?;
        access.require_open()?;

        self.debates.close_debate(debate_id).await.or_internal("close debate")?;
        info!(%debate_id, "debate closed");
        Ok(Debate { is_closed: true, ..access.debate })
    }

    /// Deletes the debate and everything it owns. CREATOR only.
    #[instrument(skip(self))]
    pub async fn delete_debate(&self, actor: Actor, debate_id: Uuid) -> Result<()> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        if access.role() != Some(Role::Creator) {
            warn!(%debate_id, "delete attempted by non-creator");
            return Err(DomainError::Permission("only the creator can delete a debate".into()));
        }

        self.debates.delete_debate(debate_id).await.or_internal("delete debate")?;
        info!(%debate_id, "debate deleted");
        Ok(())
    }

    /// Commits the caller to one of the debate's stances.
    pub async fn choose_stance(&self, actor: Actor, debate_id: Uuid, stance_id: Uuid) -> Result<Participant> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        let participant = access.require_debate_permissions()?;
        self.load_stance(debate_id, stance_id).await?;

        self.debates
            .update_participant_stance(participant.id, Some(stance_id))
            .await
            .or_internal("update participant stance")
    }

    /// Removes the caller from the debate. The creator has to delete instead.
    pub async fn leave_debate(&self, actor: Actor, debate_id: Uuid) -> Result<()> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        let participant = access.require_participant()?;
        if participant.role == Role::Creator {
            return Err(DomainError::Permission("the creator cannot leave; delete the debate instead".into()));
        }

        self.debates.delete_participant(participant.id).await.or_internal("leave debate")?;
        info!(%debate_id, user_id = %participant.user_id, "left debate");
        Ok(())
    }

    pub async fn list_participants(&self, actor: Actor, debate_id: Uuid) -> Result<Vec<Participant>> {
        self.ensure_debate_access(actor, debate_id).await?;
        self.debates.list_participants(debate_id).await.or_internal("list participants")
    }

    pub async fn list_stances(&self, actor: Actor, debate_id: Uuid) -> Result<Vec<Stance>> {
        self.ensure_debate_access(actor, debate_id).await?;
        self.debates.list_stances(debate_id).await.or_internal("list stances")
    }

    pub async fn add_stance(&self, actor: Actor, debate_id: Uuid, label: &str) -> Result<Stance> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        access.require_admin()?;

        let label = non_empty(label, "stance label")?;
        let existing: Vec<String> = self
            .debates
            .list_stances(debate_id)
            .await
            .or_internal("list stances")?
            .into_iter()
            .map(|s| s.label)
            .collect();
        ensure_distinct(&existing, &label)?;

        let stance = Stance { id: Uuid::now_v7(), debate_id, label };
        label_write(self.debates.create_stance(stance.clone()).await, &stance.label, "create stance")?;
        Ok(stance)
    }

    pub async fn rename_stance(&self, actor: Actor, debate_id: Uuid, stance_id: Uuid, label: &str) -> Result<Stance> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        access.require_admin()?;

        let stance = self.load_stance(debate_id, stance_id).await?;
        let label = non_empty(label, "stance label")?;
        let others: Vec<String> = self
            .debates
            .list_stances(debate_id)
            .await
            .or_internal("list stances")?
            .into_iter()
            .filter(|s| s.id != stance_id)
            .map(|s| s.label)
            .collect();
        ensure_distinct(&others, &label)?;

        label_write(self.debates.rename_stance(stance_id, label.clone()).await, &label, "rename stance")?;
        Ok(Stance { label, ..stance })
    }

    /// Removes a stance that no justification argues for yet.
    pub async fn remove_stance(&self, actor: Actor, debate_id: Uuid, stance_id: Uuid) -> Result<()> {
        let access = self.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        access.require_admin()?;
        self.load_stance(debate_id, stance_id).await?;

        match self.debates.delete_stance(stance_id).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict(_)) => {
                Err(DomainError::Validation("stance still has justifications".into()))
            }
            Err(e) => Err(storage_failure("delete stance", e)),
        }
    }

    pub(crate) async fn load_debate(&self, debate_id: Uuid) -> Result<Debate> {
        self.debates
            .get_debate(debate_id)
            .await
            .or_internal("load debate")?
            .ok_or_else(|| DomainError::not_found("Debate", debate_id))
    }

    /// Loads a stance and checks it belongs to `debate_id`.
    pub(crate) async fn load_stance(&self, debate_id: Uuid, stance_id: Uuid) -> Result<Stance> {
        self.debates
            .get_stance(stance_id)
            .await
            .or_internal("load stance")?
            .filter(|s| s.debate_id == debate_id)
            .ok_or_else(|| DomainError::not_found("Stance", stance_id))
    }
}

fn duplicate_label(label: &str) -> DomainError {
    DomainError::Validation(format!("stance \"{label}\" already exists in this debate"))
}

fn ensure_distinct(existing: &[String], label: &str) -> Result<()> {
    if existing.iter().any(|l| l.eq_ignore_ascii_case(label)) {
        return Err(duplicate_label(label));
    }
    Ok(())
}

/// A concurrent writer can claim the label between the check and the write;
/// storage uniqueness decides.
fn label_write(result: StorageResult<()>, label: &str, context: &'static str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(StorageError::Conflict(_)) => Err(duplicate_label(label)),
        Err(e) => Err(storage_failure(context, e)),
    }
}
