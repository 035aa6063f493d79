//! Record extraction: raw platform entities to flat, fixed-schema rows.
//!
//! Each side lookup (photo listing, extended profile, linked channel,
//! sender, forward origin) runs on its own and degrades to a sentinel on
//! failure, so a single failing lookup never drops the record.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::harvest::backoff::retry_rate_limited;
use crate::harvest::traits::{
    error_sentinel, Field, Record, NONE, NO_DESCRIPTION, NO_INFORMATION, UNKNOWN, UNKNOWN_SOURCE,
};
use crate::model::{ConversationRef, ForwardHeader, RawMessage, RawUser};
use crate::traits::PlatformClient;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deleted accounts come back with an empty display name.
fn title_field(conversation: &ConversationRef) -> Field {
    Field::text_or(
        Some(conversation.title.as_str()).filter(|title| !title.is_empty()),
        NO_INFORMATION,
    )
}

// ============================================================================
// Member Records
// ============================================================================

/// One conversation participant at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub conversation_id: Field,
    pub conversation_title: Field,
    pub user_id: Field,
    pub first_name: Field,
    pub last_name: Field,
    pub username: Field,
    pub phone: Field,
    pub is_bot: Field,
    pub is_verified: Field,
    pub is_deleted: Field,
    pub is_scam: Field,
    pub is_fake: Field,
    pub has_photo: Field,
    pub last_seen: Field,
    pub about: Field,
    pub personal_channel_title: Field,
    pub personal_channel_link: Field,
}

/// Result of the extended-profile and linked-channel lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub about: Field,
    pub channel_title: Field,
    pub channel_link: Field,
}

impl ProfileFields {
    /// Values used when the profile itself could not be fetched.
    pub fn unavailable() -> Self {
        Self {
            about: Field::text(NO_DESCRIPTION),
            channel_title: Field::text(NONE),
            channel_link: Field::text(NONE),
        }
    }
}

impl MemberRecord {
    /// Assembles a record from a user and already-resolved lookup results.
    pub fn from_parts(
        conversation: &ConversationRef,
        user: &RawUser,
        has_photo: bool,
        profile: ProfileFields,
    ) -> Self {
        Self {
            conversation_id: Field::Integer(conversation.id),
            conversation_title: title_field(conversation),
            user_id: Field::Integer(user.id),
            first_name: Field::text_or(user.first_name.as_deref(), NO_INFORMATION),
            last_name: Field::text_or(user.last_name.as_deref(), NO_INFORMATION),
            username: Field::text_or(user.username.as_deref(), NO_INFORMATION),
            phone: Field::text_or(user.phone.as_deref(), NO_INFORMATION),
            is_bot: Field::flag_or(user.bot, NO_INFORMATION),
            is_verified: Field::flag_or(user.verified, NO_INFORMATION),
            is_deleted: Field::flag_or(user.deleted, NO_INFORMATION),
            is_scam: Field::flag_or(user.scam, NO_INFORMATION),
            is_fake: Field::flag_or(user.fake, NO_INFORMATION),
            has_photo: Field::Flag(has_photo),
            last_seen: user
                .last_online
                .map(|at| Field::text(at.format(DATE_FORMAT).to_string()))
                .unwrap_or_else(|| Field::text(UNKNOWN)),
            about: profile.about,
            personal_channel_title: profile.channel_title,
            personal_channel_link: profile.channel_link,
        }
    }
}

impl Record for MemberRecord {
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id",
        "conversation_title",
        "user_id",
        "first_name",
        "last_name",
        "username",
        "phone",
        "is_bot",
        "is_verified",
        "is_deleted",
        "is_scam",
        "is_fake",
        "has_photo",
        "last_seen",
        "about",
        "personal_channel_title",
        "personal_channel_link",
    ];

    const KIND: &'static str = "contacts";

    fn row(&self) -> Vec<&Field> {
        vec![
            &self.conversation_id,
            &self.conversation_title,
            &self.user_id,
            &self.first_name,
            &self.last_name,
            &self.username,
            &self.phone,
            &self.is_bot,
            &self.is_verified,
            &self.is_deleted,
            &self.is_scam,
            &self.is_fake,
            &self.has_photo,
            &self.last_seen,
            &self.about,
            &self.personal_channel_title,
            &self.personal_channel_link,
        ]
    }
}

// ============================================================================
// Message Records
// ============================================================================

/// One historical text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub conversation_id: Field,
    pub conversation_title: Field,
    pub message_id: Field,
    pub sender_id: Field,
    pub sender_username: Field,
    pub sender_phone: Field,
    pub date: Field,
    pub text: Field,
    pub forwarded_from: Field,
    pub has_media: Field,
}

/// Sender identity columns of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderFields {
    pub id: Field,
    pub username: Field,
    pub phone: Field,
}

impl SenderFields {
    pub fn unknown() -> Self {
        Self {
            id: Field::text(UNKNOWN),
            username: Field::text(UNKNOWN),
            phone: Field::text(UNKNOWN),
        }
    }
}

impl MessageRecord {
    pub fn from_parts(
        conversation: &ConversationRef,
        message: &RawMessage,
        sender: SenderFields,
        forwarded_from: Field,
    ) -> Self {
        Self {
            conversation_id: Field::Integer(conversation.id),
            conversation_title: title_field(conversation),
            message_id: Field::Integer(i64::from(message.id)),
            sender_id: sender.id,
            sender_username: sender.username,
            sender_phone: sender.phone,
            date: Field::text(message.date.format(DATE_FORMAT).to_string()),
            text: Field::text(&message.text),
            forwarded_from,
            has_media: Field::Flag(message.has_media),
        }
    }
}

impl Record for MessageRecord {
    const COLUMNS: &'static [&'static str] = &[
        "conversation_id",
        "conversation_title",
        "message_id",
        "sender_id",
        "sender_username",
        "sender_phone",
        "date",
        "text",
        "forwarded_from",
        "has_media",
    ];

    const KIND: &'static str = "messages";

    fn row(&self) -> Vec<&Field> {
        vec![
            &self.conversation_id,
            &self.conversation_title,
            &self.message_id,
            &self.sender_id,
            &self.sender_username,
            &self.sender_phone,
            &self.date,
            &self.text,
            &self.forwarded_from,
            &self.has_media,
        ]
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Turns raw members and messages into records, running the side lookups
/// against the platform client.
///
/// Never fails: every lookup error becomes a sentinel at field level.
pub struct RecordExtractor<C> {
    client: Arc<C>,
}

impl<C: PlatformClient> RecordExtractor<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn member(&self, conversation: &ConversationRef, user: &RawUser) -> MemberRecord {
        let has_photo = self.has_photo(user.id).await;
        let profile = self.profile_fields(user.id).await;
        MemberRecord::from_parts(conversation, user, has_photo, profile)
    }

    pub async fn message(
        &self,
        conversation: &ConversationRef,
        message: &RawMessage,
    ) -> MessageRecord {
        let sender = self.sender_fields(message.sender_id).await;
        let forwarded_from = self.forward_source(message.forward.as_ref()).await;
        MessageRecord::from_parts(conversation, message, sender, forwarded_from)
    }

    /// Any failure listing photos counts as "no photo".
    async fn has_photo(&self, user_id: i64) -> bool {
        let client = &*self.client;
        match retry_rate_limited("count_profile_photos", move || {
            client.count_profile_photos(user_id)
        })
        .await
        {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(user_id, error = %e, "Photo lookup failed");
                false
            }
        }
    }

    async fn profile_fields(&self, user_id: i64) -> ProfileFields {
        let client = &*self.client;
        let profile =
            match retry_rate_limited("fetch_profile", move || client.fetch_profile(user_id)).await
            {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(user_id, error = %e, "Profile lookup failed");
                    return ProfileFields::unavailable();
                }
            };

        let about = Field::text_or(
            profile.about.as_deref().filter(|about| !about.is_empty()),
            NO_DESCRIPTION,
        );

        let Some(channel_id) = profile.personal_channel_id else {
            return ProfileFields {
                about,
                channel_title: Field::text(NONE),
                channel_link: Field::text(NONE),
            };
        };

        match retry_rate_limited("resolve_channel", move || client.resolve_channel(channel_id))
            .await
        {
            Ok(channel) => ProfileFields {
                about,
                channel_link: Field::text_or(channel.link().as_deref(), NONE),
                channel_title: Field::text(channel.title),
            },
            Err(e) => {
                warn!(user_id, channel_id, error = %e, "Personal channel lookup failed");
                ProfileFields {
                    about,
                    channel_title: error_sentinel(&e),
                    channel_link: error_sentinel(&e),
                }
            }
        }
    }

    async fn sender_fields(&self, sender_id: Option<i64>) -> SenderFields {
        let Some(sender_id) = sender_id else {
            return SenderFields::unknown();
        };

        let client = &*self.client;
        match retry_rate_limited("resolve_sender", move || client.resolve_entity(sender_id)).await
        {
            Ok(entity) => SenderFields {
                id: Field::Integer(entity.id),
                username: Field::text_or(entity.username.as_deref(), UNKNOWN),
                phone: Field::text_or(entity.phone.as_deref(), UNKNOWN),
            },
            Err(e) => {
                warn!(sender_id, error = %e, "Sender lookup failed");
                SenderFields::unknown()
            }
        }
    }

    async fn forward_source(&self, forward: Option<&ForwardHeader>) -> Field {
        let Some(forward) = forward else {
            return Field::text(NONE);
        };
        let Some(from_id) = forward.from_id else {
            return Field::text(UNKNOWN_SOURCE);
        };

        let client = &*self.client;
        match retry_rate_limited("resolve_forward", move || client.resolve_entity(from_id)).await {
            Ok(entity) => Field::text_or(entity.username.as_deref(), UNKNOWN_SOURCE),
            Err(e) => {
                warn!(from_id, error = %e, "Forward source lookup failed");
                Field::text(UNKNOWN_SOURCE)
            }
        }
    }
}
