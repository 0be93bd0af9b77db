#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use domains::{Actor, CredentialHasher, Debate, DebateRepo, DiscussionRepo, Result, Stance, Topic, UserRepo};
use services::{NewDebate, Services};
use storage_adapters::MemoryStore;
#[cfg(feature = "db-sqlite")]
use storage_adapters::SqliteStore;

/// Reversible stand-in for argon2 so fixtures stay fast.
pub struct PlainHasher;

#[async_trait]
impl CredentialHasher for PlainHasher {
    async fn hash_password(&self, password: &str) -> Result<String> {
        Ok(format!("plain:{password}"))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix("plain:") == Some(password)
    }
}

/// One fully wired set of engines over a single backend.
pub struct Harness {
    pub backend: &'static str,
    pub services: Services,
    pub debates: Arc<dyn DebateRepo>,
    pub discussion: Arc<dyn DiscussionRepo>,
}

impl Harness {
    fn over<S>(backend: &'static str, store: Arc<S>) -> Self
    where
        S: UserRepo + DebateRepo + DiscussionRepo + 'static,
    {
        Self {
            backend,
            services: Services::new(store.clone(), store.clone(), store.clone(), Arc::new(PlainHasher)),
            debates: store.clone(),
            discussion: store,
        }
    }

    /// Registers a user and returns them as an authenticated actor.
    pub async fn user(&self, name: &str) -> Actor {
        let user = self
            .services
            .users
            .register(name, &format!("{name}@example.com"), "password123")
            .await
            .unwrap_or_else(|e| panic!("[{}] register {name}: {e}", self.backend));
        Actor::User(user.id)
    }

    pub async fn topic(&self, actor: Actor, title: &str) -> Topic {
        self.services.catalogue.create_topic(actor, title).await.unwrap()
    }

    /// A debate on a fresh topic with the given stance labels.
    pub async fn debate(&self, creator: Actor, stances: &[&str], is_private: bool) -> (Debate, Vec<Stance>) {
        let topic = self.topic(creator, "General").await;
        self.debate_on(creator, &topic, stances, is_private).await
    }

    pub async fn debate_on(
        &self,
        creator: Actor,
        topic: &Topic,
        stances: &[&str],
        is_private: bool,
    ) -> (Debate, Vec<Stance>) {
        let debate = self
            .services
            .participation
            .create_debate(
                creator,
                NewDebate {
                    topic_id: topic.id.to_string(),
                    is_private,
                    stances: stances.iter().map(|s| s.to_string()).collect(),
                },
            )
            .await
            .unwrap();
        let stances = self.services.participation.list_stances(creator, debate.id).await.unwrap();
        (debate, stances)
    }
}

/// Every backend compiled into this test run, each freshly initialised.
pub async fn harnesses() -> Vec<Harness> {
    let mut all = vec![Harness::over("memory", Arc::new(MemoryStore::new()))];
    #[cfg(feature = "db-sqlite")]
    all.push(Harness::over(
        "sqlite",
        Arc::new(SqliteStore::connect("sqlite::memory:", 1).await.unwrap()),
    ));
    all
}
