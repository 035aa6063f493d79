use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// A group, channel or direct chat the operator can pick for harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub id: i64,
    pub title: String,
    pub kind: ConversationKind,
}

impl ConversationRef {
    pub fn new(id: i64, title: impl Into<String>, kind: ConversationKind) -> Self {
        Self {
            id,
            title: title.into(),
            kind,
        }
    }

    /// Whether the conversation has a participant list worth harvesting.
    pub fn has_members(&self) -> bool {
        matches!(self.kind, ConversationKind::Group | ConversationKind::Channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Group,
    Channel,
    Direct,
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Group => "group",
            Self::Channel => "channel",
            Self::Direct => "chat",
        };
        f.write_str(label)
    }
}

/// A conversation participant as the platform reports it.
///
/// Every attribute the platform may omit is optional here; the record
/// extractor decides what each absence turns into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUser {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub bot: Option<bool>,
    pub verified: Option<bool>,
    pub deleted: Option<bool>,
    pub scam: Option<bool>,
    pub fake: Option<bool>,
    /// Only set when the platform exposes a literal "was online" time.
    pub last_online: Option<DateTime<Utc>>,
}

/// One historical message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i32,
    pub date: DateTime<Utc>,
    /// Empty for pure media and service messages.
    pub text: String,
    pub sender_id: Option<i64>,
    pub forward: Option<ForwardHeader>,
    pub has_media: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardHeader {
    /// Peer the message was forwarded from, when the platform discloses it.
    pub from_id: Option<i64>,
}

/// Extended profile of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub about: Option<String>,
    pub personal_channel_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub title: String,
    pub username: Option<String>,
}

impl ChannelInfo {
    /// Canonical public link, available only for channels with a username.
    pub fn link(&self) -> Option<String> {
        self.username
            .as_deref()
            .map(|username| format!("https://t.me/{username}"))
    }
}

/// Any user or channel resolved by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    pub username: Option<String>,
    pub phone: Option<String>,
}

// ============================================================================
// Run parameters
// ============================================================================

/// (year, month) threshold; messages from an earlier month stop the harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StopBoundary {
    pub year: i32,
    pub month: u32,
}

impl StopBoundary {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Returns `true` when `date` falls in a month strictly before the boundary.
    pub fn excludes(&self, date: DateTime<Utc>) -> bool {
        (date.year(), date.month()) < (self.year, self.month)
    }
}

/// Upper bound on the number of message records per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLimit {
    Unbounded,
    AtMost(usize),
}

impl MessageLimit {
    pub fn is_reached(&self, collected: usize) -> bool {
        match self {
            Self::Unbounded => false,
            Self::AtMost(max) => collected >= *max,
        }
    }
}

impl std::fmt::Display for MessageLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::AtMost(max) => write!(f, "{max}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    pub boundary: StopBoundary,
    pub limit: MessageLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    Contacts,
    Messages,
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_boundary_excludes_only_earlier_months() {
        let boundary = StopBoundary::new(2023, 1);

        let nov_2022 = Utc.with_ymd_and_hms(2022, 11, 30, 23, 59, 0).unwrap();
        let jan_2023 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let dec_2023 = Utc.with_ymd_and_hms(2023, 12, 5, 8, 0, 0).unwrap();

        assert!(boundary.excludes(nov_2022));
        assert!(!boundary.excludes(jan_2023));
        assert!(!boundary.excludes(dec_2023));
    }

    #[test]
    fn test_message_limit() {
        assert!(!MessageLimit::Unbounded.is_reached(usize::MAX));
        assert!(!MessageLimit::AtMost(3).is_reached(2));
        assert!(MessageLimit::AtMost(3).is_reached(3));
        assert!(MessageLimit::AtMost(0).is_reached(0));
    }

    #[test]
    fn test_channel_link() {
        let public = ChannelInfo {
            title: "News".to_string(),
            username: Some("news_daily".to_string()),
        };
        let private = ChannelInfo {
            title: "Private".to_string(),
            username: None,
        };

        assert_eq!(public.link().as_deref(), Some("https://t.me/news_daily"));
        assert_eq!(private.link(), None);
    }
}
