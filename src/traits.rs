use crate::model::{ChannelInfo, ConversationRef, EntityRef, Profile, RawMessage, RawUser};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Rate limited, retry after {seconds}s")]
    RateLimited { seconds: u64 },
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Request failed: {0}")]
    Request(String),
}

/// Capability set of an authenticated messaging-platform session.
///
/// Every call may fail with [`ClientError::RateLimited`]; callers decide
/// whether to wait and retry. Implementations must not sleep on their own.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Lists the dialogs of the signed-in account.
    async fn list_conversations(&self) -> Result<Vec<ConversationRef>, ClientError>;

    /// Resolves a conversation by id.
    async fn resolve_conversation(&self, id: i64) -> Result<ConversationRef, ClientError>;

    /// Returns every participant of a conversation.
    async fn list_participants(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<RawUser>, ClientError>;

    async fn fetch_profile(&self, user_id: i64) -> Result<Profile, ClientError>;

    async fn resolve_channel(&self, channel_id: i64) -> Result<ChannelInfo, ClientError>;

    async fn count_profile_photos(&self, user_id: i64) -> Result<usize, ClientError>;

    /// Fetches up to `limit` messages strictly older than `offset_id`,
    /// newest first. An `offset_id` of zero means "most recent".
    async fn fetch_history(
        &self,
        conversation: &ConversationRef,
        offset_id: i32,
        limit: usize,
    ) -> Result<Vec<RawMessage>, ClientError>;

    /// Resolves an arbitrary user or channel id.
    async fn resolve_entity(&self, id: i64) -> Result<EntityRef, ClientError>;

    /// Releases the session. Called once when the owning guard drops.
    fn release(&self) {}
}
