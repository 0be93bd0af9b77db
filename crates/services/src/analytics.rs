//! # Analytics Aggregator
//!
//! Read-only rollups over one user's activity. Nothing is cached or
//! maintained incrementally; every call re-reads the store.
//!
//! Ties are broken by lowest id. Ids are UUID v7, so that is also the
//! earliest-created entity.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use domains::{
    vote_sum, Actor, Comment, Debate, DebateRepo, DiscussionRepo, DomainError, Participant,
    ParticipantFilter, Result, Role, Topic, Vote,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::discussion::ScoredJustification;
use crate::support::StorageResultExt;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticipationCounts {
    pub total_debates: u64,
    /// Every role is present, zero-filled.
    pub by_role: BTreeMap<Role, u64>,
    /// Joined debates that are still open.
    pub active_debates: u64,
    pub private_debates: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicParticipation {
    pub topic: Topic,
    pub debates: u64,
}

/// One UTC calendar day with at least one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityBucket {
    pub date: NaiveDate,
    pub debates: u64,
    pub justifications: u64,
    pub comments: u64,
    pub votes: u64,
}

/// Everything known about one user's activity, fetched up front so the
/// rollup itself needs no store.
#[derive(Debug, Clone, Default)]
pub struct ActivityHistory {
    pub user_id: Uuid,
    pub counts: ParticipationCounts,
    pub participations: Vec<(Participant, Debate)>,
    /// Topics of the joined debates. Missing entries leave
    /// `most_participated_topic` empty.
    pub topics: Vec<Topic>,
    pub authored: Vec<ScoredJustification>,
    pub comments: Vec<Comment>,
    pub votes: Vec<Vote>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAnalytics {
    pub participation: ParticipationCounts,
    pub debates_created: u64,
    pub total_justifications: u64,
    pub total_comments: u64,
    pub total_votes_cast: u64,
    pub most_participated_topic: Option<TopicParticipation>,
    pub average_votes_per_justification: f64,
    /// Best of the user's own justifications, never someone else's.
    pub top_justification: Option<ScoredJustification>,
    pub activity: Vec<ActivityBucket>,
}

/// Topic the user joined the most debates on, with the count.
pub fn most_participated_topic(participations: &[(Participant, Debate)]) -> Option<(Uuid, u64)> {
    let mut counts: HashMap<Uuid, u64> = HashMap::new();
    for (_, debate) in participations {
        *counts.entry(debate.topic_id).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_id, a_count), (b_id, b_count)| a_count.cmp(b_count).then(b_id.cmp(a_id)))
}

/// Mean vote sum over the authored justifications, rounded to 2 decimals.
/// Zero when nothing was authored.
pub fn average_votes_per_justification(scored: &[ScoredJustification]) -> f64 {
    if scored.is_empty() {
        return 0.0;
    }
    let total: i64 = scored.iter().map(|s| s.vote_sum).sum();
    let mean = total as f64 / scored.len() as f64;
    (mean * 100.0).round() / 100.0
}

pub fn top_justification(scored: &[ScoredJustification]) -> Option<&ScoredJustification> {
    scored.iter().max_by(|a, b| {
        a.vote_sum
            .cmp(&b.vote_sum)
            .then(b.justification.id.cmp(&a.justification.id))
    })
}

/// Sparse per-day series, ascending by date.
pub fn activity_series(history: &ActivityHistory) -> Vec<ActivityBucket> {
    let mut buckets: BTreeMap<NaiveDate, ActivityBucket> = BTreeMap::new();
    let mut bump = |at: &DateTime<Utc>, counter: fn(&mut ActivityBucket) -> &mut u64| {
        let date = at.date_naive();
        let bucket = buckets.entry(date).or_insert_with(|| ActivityBucket {
            date,
            debates: 0,
            justifications: 0,
            comments: 0,
            votes: 0,
        });
        *counter(bucket) += 1;
    };

    for (_, debate) in created_by(history) {
        bump(&debate.started_at, |b| &mut b.debates);
    }
    for s in &history.authored {
        bump(&s.justification.created_at, |b| &mut b.justifications);
    }
    for c in &history.comments {
        bump(&c.created_at, |b| &mut b.comments);
    }
    for v in &history.votes {
        bump(&v.created_at, |b| &mut b.votes);
    }

    buckets.into_values().collect()
}

fn created_by(history: &ActivityHistory) -> impl Iterator<Item = &(Participant, Debate)> + '_ {
    history
        .participations
        .iter()
        .filter(move |(_, debate)| debate.creator_id == history.user_id)
}

/// Folds a fetched history into the analytics read model.
pub fn compute_user_analytics(history: &ActivityHistory) -> UserAnalytics {
    let most_participated_topic = most_participated_topic(&history.participations).and_then(|(topic_id, debates)| {
        history
            .topics
            .iter()
            .find(|t| t.id == topic_id)
            .map(|topic| TopicParticipation { topic: topic.clone(), debates })
    });

    UserAnalytics {
        participation: history.counts.clone(),
        debates_created: created_by(history).count() as u64,
        total_justifications: history.authored.len() as u64,
        total_comments: history.comments.len() as u64,
        total_votes_cast: history.votes.len() as u64,
        most_participated_topic,
        average_votes_per_justification: average_votes_per_justification(&history.authored),
        top_justification: top_justification(&history.authored).cloned(),
        activity: activity_series(history),
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    debates: Arc<dyn DebateRepo>,
    discussion: Arc<dyn DiscussionRepo>,
}

impl AnalyticsService {
    pub fn new(debates: Arc<dyn DebateRepo>, discussion: Arc<dyn DiscussionRepo>) -> Self {
        Self { debates, discussion }
    }

    /// Rollups for `user_id`. Users may only read their own analytics.
    #[instrument(skip(self))]
    pub async fn user_analytics(&self, actor: Actor, user_id: Uuid) -> Result<UserAnalytics> {
        if actor.user_id()? != user_id {
            return Err(DomainError::Permission("analytics are private to their owner".into()));
        }

        let history = self.history(user_id).await?;
        Ok(compute_user_analytics(&history))
    }

    async fn history(&self, user_id: Uuid) -> Result<ActivityHistory> {
        let counts = self.participation_counts(user_id).await?;
        let participations = self
            .debates
            .list_participations(user_id)
            .await
            .or_internal("list participations")?;

        let topic_ids: BTreeSet<Uuid> = participations.iter().map(|(_, d)| d.topic_id).collect();
        let mut topics = Vec::with_capacity(topic_ids.len());
        for topic_id in topic_ids {
            if let Some(topic) = self.debates.get_topic(topic_id).await.or_internal("load topic")? {
                topics.push(topic);
            }
        }

        let justifications = self
            .discussion
            .list_justifications_by_author(user_id)
            .await
            .or_internal("list authored justifications")?;
        let mut authored = Vec::with_capacity(justifications.len());
        for justification in justifications {
            let votes = self.discussion.list_votes(justification.id).await.or_internal("list votes")?;
            authored.push(ScoredJustification { vote_sum: vote_sum(&votes), justification });
        }

        let comments = self
            .discussion
            .list_comments_by_author(user_id)
            .await
            .or_internal("list authored comments")?;
        let votes = self.discussion.list_votes_by_user(user_id).await.or_internal("list votes cast")?;

        Ok(ActivityHistory { user_id, counts, participations, topics, authored, comments, votes })
    }

    async fn participation_counts(&self, user_id: Uuid) -> Result<ParticipationCounts> {
        let mine = ParticipantFilter::for_user(user_id);
        let total_debates = self.debates.count_participants(&mine).await.or_internal("count participants")?;

        let mut by_role: BTreeMap<Role, u64> = Role::ALL.into_iter().map(|r| (r, 0)).collect();
        for (role, count) in self
            .debates
            .count_participants_by_role(&mine)
            .await
            .or_internal("group participants by role")?
        {
            by_role.insert(role, count);
        }

        let open = ParticipantFilter { debate_closed: Some(false), ..mine.clone() };
        let active_debates = self.debates.count_participants(&open).await.or_internal("count participants")?;
        let private = ParticipantFilter { debate_private: Some(true), ..mine };
        let private_debates = self.debates.count_participants(&private).await.or_internal("count participants")?;

        Ok(ParticipationCounts { total_debates, by_role, active_debates, private_debates })
    }
}
