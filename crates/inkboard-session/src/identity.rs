//! Access/identity gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Authenticated user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is using this session
pub trait Identity {
    /// None when nobody is signed in
    fn current_user_id(&self) -> Option<UserId>;

    fn display_name(&self) -> Option<String> {
        None
    }
}

/// Identity fixed at start-up, e.g. from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<UserId>,
    display_name: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: Some(UserId::new(user_id)),
            display_name,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Identity for StaticIdentity {
    fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }
}
