//! # Roles and Actors
//!
//! Permission ranks for debate participants, and the explicit identity every
//! core operation receives from the (external) session layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, Result};

/// Permission rank of a participant within one debate.
///
/// CREATOR and ADMIN share admin permissions; CREATOR, ADMIN and DEBATER share
/// debate permissions. OBSERVER may only read and comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Creator,
    Admin,
    Debater,
    Observer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Creator, Role::Admin, Role::Debater, Role::Observer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Creator => "CREATOR",
            Role::Admin => "ADMIN",
            Role::Debater => "DEBATER",
            Role::Observer => "OBSERVER",
        }
    }

    pub fn has_admin_permissions(self) -> bool {
        matches!(self, Role::Creator | Role::Admin)
    }

    pub fn has_debate_permissions(self) -> bool {
        matches!(self, Role::Creator | Role::Admin | Role::Debater)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATOR" => Ok(Role::Creator),
            "ADMIN" => Ok(Role::Admin),
            "DEBATER" => Ok(Role::Debater),
            "OBSERVER" => Ok(Role::Observer),
            _ => Err(DomainError::InvalidRole(s.to_string())),
        }
    }
}

/// The authenticated identity, resolved by the session layer and passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(Uuid),
}

impl Actor {
    /// Every core operation needs a user; anonymous callers fail the gate.
    pub fn user_id(&self) -> Result<Uuid> {
        match self {
            Actor::User(id) => Ok(*id),
            Actor::Anonymous => Err(DomainError::Permission("authentication required".into())),
        }
    }
}

impl From<Uuid> for Actor {
    fn from(id: Uuid) -> Self {
        Actor::User(id)
    }
}
