//! # services
//!
//! The debate engines. Every operation takes the caller's `Actor` explicitly,
//! validates role and debate state, and talks to storage only through the
//! `domains` ports.

pub mod analytics;
pub mod catalogue;
pub mod discussion;
pub mod participation;
pub mod users;

mod support;

use std::sync::Arc;

use domains::{CredentialHasher, DebateRepo, DiscussionRepo, UserRepo};

pub use analytics::{
    compute_user_analytics, ActivityBucket, ActivityHistory, AnalyticsService, ParticipationCounts, TopicParticipation,
    UserAnalytics,
};
pub use catalogue::CatalogueService;
pub use discussion::{CastVote, DebateOverview, DiscussionService, ScoredJustification, StanceOverview};
pub use participation::{DebateAccess, NewDebate, ParticipationService};
pub use users::{ProfileUpdate, UserService};

/// All engines wired against one set of adapters.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub catalogue: CatalogueService,
    pub participation: ParticipationService,
    pub discussion: DiscussionService,
    pub analytics: AnalyticsService,
}

impl Services {
    pub fn new(
        users: Arc<dyn UserRepo>,
        debates: Arc<dyn DebateRepo>,
        discussion: Arc<dyn DiscussionRepo>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        let participation = ParticipationService::new(debates.clone());
        Self {
            users: UserService::new(users, hasher),
            catalogue: CatalogueService::new(debates.clone()),
            discussion: DiscussionService::new(debates.clone(), discussion.clone(), participation.clone()),
            analytics: AnalyticsService::new(debates, discussion),
            participation,
        }
    }
}
