//! agora/crates/domains/src/lib.rs
//!
//! The central domain types and interface definitions for Agora.

pub mod comments;
pub mod error;
pub mod models;
pub mod ports;
pub mod role;
pub mod vote;

// Re-exporting for easier access in other crates
pub use comments::*;
pub use error::*;
pub use models::*;
pub use ports::*;
pub use role::*;
pub use vote::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_participant_creation_v7() {
        let id = Uuid::now_v7();
        let participant = Participant {
            id,
            user_id: Uuid::now_v7(),
            debate_id: Uuid::now_v7(),
            role: Role::Creator,
            stance_id: None,
            joined_at: Utc::now(),
        };
        assert_eq!(participant.id, id);
        assert!(participant.role.has_admin_permissions());
        assert_eq!(
            serde_json::to_value(&participant).unwrap()["role"],
            serde_json::json!("CREATOR")
        );
    }
}
