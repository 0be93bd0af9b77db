//! Topics and debate listings.

use std::sync::Arc;

use chrono::Utc;
use domains::{Actor, Debate, DebateFilter, DebateRepo, Result, Topic};
use tracing::info;
use uuid::Uuid;

use crate::support::{non_empty, StorageResultExt};

#[derive(Clone)]
pub struct CatalogueService {
    debates: Arc<dyn DebateRepo>,
}

impl CatalogueService {
    pub fn new(debates: Arc<dyn DebateRepo>) -> Self {
        Self { debates }
    }

    pub async fn create_topic(&self, actor: Actor, title: &str) -> Result<Topic> {
        actor.user_id()?;
        let topic = Topic { id: Uuid::now_v7(), title: non_empty(title, "topic title")?, created_at: Utc::now() };
        self.debates.create_topic(topic.clone()).await.or_internal("create topic")?;
        info!(topic_id = %topic.id, "topic created");
        Ok(topic)
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.debates.list_topics().await.or_internal("list topics")
    }

    /// Most recent first. Private debates only show up for their participants.
    pub async fn list_debates(&self, actor: Actor, filter: DebateFilter) -> Result<Vec<Debate>> {
        let user_id = actor.user_id()?;
        let limit = filter.limit;
        let candidates = self
            .debates
            .list_debates(&DebateFilter { limit: None, ..filter })
            .await
            .or_internal("list debates")?;

        let mut visible = Vec::with_capacity(candidates.len());
        for debate in candidates {
            if limit.is_some_and(|l| visible.len() >= l) {
                break;
            }
            if debate.is_private
                && self
                    .debates
                    .find_participant(user_id, debate.id)
                    .await
                    .or_internal("load participant")?
                    .is_none()
            {
                continue;
            }
            visible.push(debate);
        }
        Ok(visible)
    }
}
