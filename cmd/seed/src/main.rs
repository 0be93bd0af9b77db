//! Seeds a database with the configured topics and one demo debate.
//!
//! Safe to re-run: existing topics (matched by title) and an existing demo
//! debate are left alone.

use std::sync::Arc;

use anyhow::Context;
use auth_adapters::Argon2Hasher;
use configs::{LogSettings, Settings};
use domains::{Actor, DebateFilter, DomainError, User};
use secrecy::ExposeSecret;
use services::{NewDebate, Services};
use storage_adapters::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEMO_USERNAME: &str = "demo";
const DEMO_EMAIL: &str = "demo@agora.local";
const DEMO_PASSWORD: &str = "demo-password";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log)?;

    let store = Arc::new(
        SqliteStore::connect(settings.database.url.expose_secret(), settings.database.max_connections)
            .await
            .context("opening database")?,
    );
    let services = Services::new(store.clone(), store.clone(), store, Arc::new(Argon2Hasher::new()));

    let demo = demo_user(&services).await?;
    let actor = Actor::User(demo.id);

    let existing = services.catalogue.list_topics().await?;
    let mut created = 0;
    for title in &settings.seed.topics {
        if existing.iter().any(|t| t.title.eq_ignore_ascii_case(title.trim())) {
            continue;
        }
        services.catalogue.create_topic(actor, title).await?;
        created += 1;
    }
    info!(created, skipped = settings.seed.topics.len() - created, "topics seeded");

    seed_demo_debate(&services, actor).await?;
    Ok(())
}

fn init_tracing(log: &LogSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.level))?;
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().pretty()).try_init()?;
    }
    Ok(())
}

async fn demo_user(services: &Services) -> anyhow::Result<User> {
    match services.users.register(DEMO_USERNAME, DEMO_EMAIL, DEMO_PASSWORD).await {
        Ok(user) => Ok(user),
        Err(DomainError::Conflict(_)) => services
            .users
            .authenticate(DEMO_USERNAME, DEMO_PASSWORD)
            .await
            .context("demo user exists with a different password"),
        Err(e) => Err(e.into()),
    }
}

/// Opens one public debate on the first topic with a single argument, unless
/// the demo user already started one.
async fn seed_demo_debate(services: &Services, actor: Actor) -> anyhow::Result<()> {
    let Some(topic) = services.catalogue.list_topics().await?.into_iter().next() else {
        warn!("no topics configured; skipping demo debate");
        return Ok(());
    };

    let user_id = actor.user_id()?;
    let debates = services.catalogue.list_debates(actor, DebateFilter::default()).await?;
    if debates.iter().any(|d| d.creator_id == user_id) {
        info!("demo debate already present");
        return Ok(());
    }

    let debate = services
        .participation
        .create_debate(
            actor,
            NewDebate {
                topic_id: topic.id.to_string(),
                is_private: false,
                stances: vec!["For".into(), "Against".into()],
            },
        )
        .await?;
    let stances = services.participation.list_stances(actor, debate.id).await?;
    if let Some(stance) = stances.iter().find(|s| s.label == "For") {
        services
            .discussion
            .create_justification(actor, debate.id, stance.id, "Every debate needs an opening argument.")
            .await?;
    }
    info!(debate_id = %debate.id, topic = %topic.title, "demo debate seeded");
    Ok(())
}
