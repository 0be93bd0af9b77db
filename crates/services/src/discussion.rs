//! # Discussion Engine
//!
//! Justifications under stances, threaded comments under justifications, and
//! the one-vote-per-user toggle.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    build_comment_tree, vote_sum, Actor, Comment, CommentNode, Debate, DebateRepo, DiscussionRepo,
    DomainError, Justification, Participant, Result, Stance, VoteOutcome, VoteValue,
};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::participation::ParticipationService;
use crate::support::{non_empty, StorageResultExt};

/// A justification with its recomputed vote sum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredJustification {
    pub justification: Justification,
    pub vote_sum: i64,
}

/// Result of `cast_vote`: what happened to the caller's vote, and the new sum.
#[derive(Debug, Clone, PartialEq)]
pub struct CastVote {
    pub outcome: VoteOutcome,
    pub vote_sum: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StanceOverview {
    pub stance: Stance,
    pub justifications: Vec<ScoredJustification>,
}

/// Everything the debate page shows in one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebateOverview {
    pub debate: Debate,
    pub viewer: Option<Participant>,
    pub stances: Vec<StanceOverview>,
}

#[derive(Clone)]
pub struct DiscussionService {
    debates: Arc<dyn DebateRepo>,
    discussion: Arc<dyn DiscussionRepo>,
    participation: ParticipationService,
}

impl DiscussionService {
    pub fn new(
        debates: Arc<dyn DebateRepo>,
        discussion: Arc<dyn DiscussionRepo>,
        participation: ParticipationService,
    ) -> Self {
        Self { debates, discussion, participation }
    }

    /// Argues for a stance. Needs an open debate and debate permissions.
    #[instrument(skip(self, content))]
    pub async fn create_justification(
        &self,
        actor: Actor,
        debate_id: Uuid,
        stance_id: Uuid,
        content: &str,
    ) -> Result<Justification> {
        let access = self.participation.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        let author = access.require_debate_permissions()?;
        self.participation.load_stance(debate_id, stance_id).await?;
        let content = non_empty(content, "justification content")?;

        let justification = Justification {
            id: Uuid::now_v7(),
            content,
            author_id: author.user_id,
            stance_id,
            created_at: Utc::now(),
        };
        self.discussion
            .create_justification(justification.clone())
            .await
            .or_internal("create justification")?;
        info!(justification_id = %justification.id, %debate_id, %stance_id, "justification created");
        Ok(justification)
    }

    /// Casts +1 or −1. Same direction twice retracts; opposite direction
    /// flips the existing row. The dispatch itself runs inside the store.
    #[instrument(skip(self))]
    pub async fn cast_vote(&self, actor: Actor, justification_id: Uuid, value: i8) -> Result<CastVote> {
        let user_id = actor.user_id()?;
        let value = VoteValue::try_from(value)?;
        let (_, debate_id) = self.locate(justification_id).await?;

        let access = self.participation.ensure_debate_access(actor, debate_id).await?;
        access.require_open()?;
        access.require_debate_permissions()?;

        let outcome = self
            .discussion
            .apply_vote(Uuid::now_v7(), user_id, justification_id, value, Utc::now())
            .await
            .or_internal("apply vote")?;
        let votes = self.discussion.list_votes(justification_id).await.or_internal("list votes")?;
        let sum = vote_sum(&votes);
        debug!(%justification_id, %user_id, ?outcome, vote_sum = sum, "vote applied");
        Ok(CastVote { outcome, vote_sum: sum })
    }

    /// Replies under a justification, optionally to another comment. Any
    /// participant may comment, and closing a debate does not stop comments.
    #[instrument(skip(self, content))]
    pub async fn post_comment(
        &self,
        actor: Actor,
        justification_id: Uuid,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> Result<Comment> {
        let (_, debate_id) = self.locate(justification_id).await?;
        let access = self.participation.ensure_debate_access(actor, debate_id).await?;
        let author = access.require_participant()?;
        let content = non_empty(content, "comment content")?;

        if let Some(parent_id) = parent_id {
            let parent = self.discussion.get_comment(parent_id).await.or_internal("load parent comment")?;
            match parent {
                Some(p) if p.justification_id == justification_id => {}
                _ => {
                    return Err(DomainError::Validation(format!(
                        "parent comment {parent_id} does not exist under this justification"
                    )))
                }
            }
        }

        let comment = Comment {
            id: Uuid::now_v7(),
            content,
            author_id: author.user_id,
            justification_id,
            parent_id,
            created_at: Utc::now(),
        };
        self.discussion.create_comment(comment.clone()).await.or_internal("create comment")?;
        info!(comment_id = %comment.id, %justification_id, "comment posted");
        Ok(comment)
    }

    /// The reply forest for one justification.
    pub async fn comment_tree(&self, actor: Actor, justification_id: Uuid) -> Result<Vec<CommentNode>> {
        let (_, debate_id) = self.locate(justification_id).await?;
        self.participation.ensure_debate_access(actor, debate_id).await?;
        let comments = self.discussion.list_comments(justification_id).await.or_internal("list comments")?;
        Ok(build_comment_tree(comments))
    }

    /// Justifications for a stance, best first.
    pub async fn ranked_justifications(
        &self,
        actor: Actor,
        debate_id: Uuid,
        stance_id: Uuid,
    ) -> Result<Vec<ScoredJustification>> {
        self.participation.ensure_debate_access(actor, debate_id).await?;
        self.participation.load_stance(debate_id, stance_id).await?;
        self.rank_stance(stance_id).await
    }

    pub async fn debate_overview(&self, actor: Actor, debate_id: Uuid) -> Result<DebateOverview> {
        let access = self.participation.ensure_debate_access(actor, debate_id).await?;
        let stances = self.debates.list_stances(debate_id).await.or_internal("list stances")?;

        let mut overview = Vec::with_capacity(stances.len());
        for stance in stances {
            let justifications = self.rank_stance(stance.id).await?;
            overview.push(StanceOverview { stance, justifications });
        }
        Ok(DebateOverview { debate: access.debate, viewer: access.participant, stances: overview })
    }

    async fn rank_stance(&self, stance_id: Uuid) -> Result<Vec<ScoredJustification>> {
        let justifications = self
            .discussion
            .list_justifications_for_stance(stance_id)
            .await
            .or_internal("list justifications")?;

        let mut scored = Vec::with_capacity(justifications.len());
        for justification in justifications {
            let votes = self.discussion.list_votes(justification.id).await.or_internal("list votes")?;
            scored.push(ScoredJustification { vote_sum: vote_sum(&votes), justification });
        }
        rank(&mut scored);
        Ok(scored)
    }

    /// Resolves a justification and the debate it belongs to.
    async fn locate(&self, justification_id: Uuid) -> Result<(Justification, Uuid)> {
        let justification = self
            .discussion
            .get_justification(justification_id)
            .await
            .or_internal("load justification")?
            .ok_or_else(|| DomainError::not_found("Justification", justification_id))?;
        let stance = self
            .debates
            .get_stance(justification.stance_id)
            .await
            .or_internal("load stance")?
            .ok_or_else(|| DomainError::not_found("Stance", justification.stance_id))?;
        Ok((justification, stance.debate_id))
    }
}

/// Highest vote sum first; older justifications win ties.
pub fn rank(scored: &mut [ScoredJustification]) {
    scored.sort_by(|a, b| {
        b.vote_sum
            .cmp(&a.vote_sum)
            .then(a.justification.created_at.cmp(&b.justification.created_at))
            .then(a.justification.id.cmp(&b.justification.id))
    });
}
