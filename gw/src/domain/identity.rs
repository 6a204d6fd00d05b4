//! Signed-in user and the role they act in

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Which side of the marketplace initiates a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Employer,
    Employee,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Employer => write!(f, "employer"),
            Self::Employee => write!(f, "employee"),
        }
    }
}

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Actor,
}

impl Identity {
    pub fn employee(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Actor::Employee,
        }
    }

    pub fn employer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Actor::Employer,
        }
    }
}

/// Shared handle to the currently signed-in user
///
/// Login itself happens elsewhere; this only records its result so every
/// component can check it.
#[derive(Debug, Clone)]
pub struct UserContext {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for UserContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UserContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, identity: Identity) {
        info!(user_id = %identity.user_id, role = %identity.role, "User signed in");
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            info!(user_id = %previous.user_id, "User signed out");
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// The signed-in user, or an authorization error
    pub fn require(&self) -> CoreResult<Identity> {
        self.current()
            .ok_or_else(|| CoreError::Authorization("no authenticated user".to_string()))
    }

    /// The signed-in user acting in the given role
    pub fn require_role(&self, role: Actor) -> CoreResult<Identity> {
        let identity = self.require()?;
        if identity.role != role {
            debug!(user_id = %identity.user_id, have = %identity.role, want = %role, "require_role: wrong role");
            return Err(CoreError::Authorization(format!(
                "user {} is signed in as {}, not {}",
                identity.user_id, identity.role, role
            )));
        }
        Ok(identity)
    }
}
