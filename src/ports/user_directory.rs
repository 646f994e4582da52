//! User directory port, read only, used to enrich notifications.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserContact>, DomainError>;
}
