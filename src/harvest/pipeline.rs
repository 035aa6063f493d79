//! Harvest pipeline executor.
//!
//! This module provides the [`HarvestPipeline`] coordinator that harvests a
//! single conversation in one of two modes:
//! - **Messages**: pages backward through history with a stop boundary,
//!   an optional quota and rate-limit backoff
//! - **Contacts**: enumerates every participant
//!
//! A failure that is not a rate-limit never escapes as an error. The harvest
//! ends with [`Termination::Aborted`] and keeps whatever it had collected.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::harvest::backoff::retry_rate_limited;
use crate::harvest::extract::{MemberRecord, MessageRecord, RecordExtractor};
use crate::harvest::traits::Termination;
use crate::model::{ConversationRef, MessageQuery};
use crate::traits::PlatformClient;

/// Largest history page the platform serves per request.
pub const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// Pipeline Types
// ============================================================================

/// Outcome of harvesting one conversation.
#[derive(Debug)]
pub struct HarvestResult<R> {
    /// Requested conversation id
    pub conversation_id: i64,

    /// Resolved conversation, `None` if resolution itself failed
    pub conversation: Option<ConversationRef>,

    /// Records in platform delivery order
    pub records: Vec<R>,

    /// Why the harvest stopped
    pub termination: Termination,

    /// Processing statistics
    pub stats: HarvestStats,
}

impl<R> HarvestResult<R> {
    /// Display name for logs and summaries.
    pub fn title(&self) -> String {
        self.conversation
            .as_ref()
            .map(|c| c.title.clone())
            .unwrap_or_else(|| self.conversation_id.to_string())
    }
}

/// Statistics about one harvest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    /// Total time spent (milliseconds)
    pub total_duration_ms: u64,

    /// History pages requested successfully
    pub pages_fetched: usize,

    /// Times the pagination cursor moved to an older page
    pub cursor_advances: usize,

    /// Messages dropped because they had no text
    pub skipped_empty: usize,
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Single-conversation harvester over a [`PlatformClient`].
///
/// Issues exactly one platform request at a time.
///
/// # Example
///
/// ```ignore
/// let pipeline = HarvestPipeline::new(Arc::new(client))
///     .with_page_size(100)
///     .with_progress_interval(500);
///
/// let query = MessageQuery {
///     boundary: StopBoundary::new(2023, 1),
///     limit: MessageLimit::AtMost(1_000),
/// };
/// let result = pipeline.harvest_messages(chat_id, &query).await;
/// println!("{} messages ({})", result.records.len(), result.termination);
/// ```
pub struct HarvestPipeline<C> {
    client: Arc<C>,

    extractor: RecordExtractor<C>,

    /// Messages requested per history page (default: 100)
    page_size: usize,

    /// Log progress every N collected messages (default: 500)
    progress_interval: usize,
}

impl<C: PlatformClient> HarvestPipeline<C> {
    /// Creates a pipeline with a page size of 100 and progress every 500.
    pub fn new(client: Arc<C>) -> Self {
        Self {
            extractor: RecordExtractor::new(Arc::clone(&client)),
            client,
            page_size: MAX_PAGE_SIZE,
            progress_interval: 500,
        }
    }

    /// Clamped to `1..=MAX_PAGE_SIZE`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Harvests message history of a conversation, newest first.
    ///
    /// Stops at the first of: an empty page, a message dated before the
    /// stop boundary (checked before the empty-text filter), the quota, or
    /// a failed page request. Rate-limited page requests are retried with
    /// the same cursor.
    pub async fn harvest_messages(
        &self,
        conversation_id: i64,
        query: &MessageQuery,
    ) -> HarvestResult<MessageRecord> {
        let start = Instant::now();
        let mut stats = HarvestStats::default();

        let conversation = match self.resolve(conversation_id).await {
            Ok(conversation) => conversation,
            Err(termination) => {
                return finish(conversation_id, None, Vec::new(), termination, stats, start)
            }
        };

        info!(
            conversation_id,
            title = %conversation.title,
            boundary_year = query.boundary.year,
            boundary_month = query.boundary.month,
            limit = %query.limit,
            "Starting message harvest"
        );

        let mut records = Vec::new();
        if query.limit.is_reached(0) {
            return finish(
                conversation_id,
                Some(conversation),
                records,
                Termination::QuotaReached,
                stats,
                start,
            );
        }

        let client = &*self.client;
        let page_size = self.page_size;
        let target = &conversation;
        let mut cursor = 0i32;

        let termination = 'pages: loop {
            let page = match retry_rate_limited("fetch_history", move || {
                client.fetch_history(target, cursor, page_size)
            })
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(conversation_id, cursor, error = %e, "History request failed");
                    break Termination::Aborted {
                        reason: e.to_string(),
                    };
                }
            };
            stats.pages_fetched += 1;

            let Some(oldest) = page.last().map(|m| m.id) else {
                break Termination::Exhausted;
            };
            debug!(conversation_id, cursor, size = page.len(), "Fetched page");

            for message in &page {
                if query.boundary.excludes(message.date) {
                    break 'pages Termination::BoundaryReached;
                }
                if message.text.is_empty() {
                    stats.skipped_empty += 1;
                    continue;
                }

                records.push(self.extractor.message(target, message).await);

                if records.len() % self.progress_interval == 0 {
                    info!(conversation_id, collected = records.len(), "Harvest progress");
                }
                if query.limit.is_reached(records.len()) {
                    break 'pages Termination::QuotaReached;
                }
            }

            cursor = oldest;
            stats.cursor_advances += 1;
        };

        finish(
            conversation_id,
            Some(conversation),
            records,
            termination,
            stats,
            start,
        )
    }

    /// Harvests every participant of a conversation.
    pub async fn harvest_members(&self, conversation_id: i64) -> HarvestResult<MemberRecord> {
        let start = Instant::now();
        let stats = HarvestStats::default();

        let conversation = match self.resolve(conversation_id).await {
            Ok(conversation) => conversation,
            Err(termination) => {
                return finish(conversation_id, None, Vec::new(), termination, stats, start)
            }
        };

        info!(conversation_id, title = %conversation.title, "Starting member harvest");

        let client = &*self.client;
        let target = &conversation;
        let participants =
            match retry_rate_limited("list_participants", move || client.list_participants(target))
                .await
            {
                Ok(participants) => participants,
                Err(e) => {
                    warn!(conversation_id, error = %e, "Participant listing failed");
                    let termination = Termination::Aborted {
                        reason: e.to_string(),
                    };
                    return finish(
                        conversation_id,
                        Some(conversation),
                        Vec::new(),
                        termination,
                        stats,
                        start,
                    );
                }
            };

        let mut records = Vec::with_capacity(participants.len());
        for user in &participants {
            records.push(self.extractor.member(target, user).await);
        }

        finish(
            conversation_id,
            Some(conversation),
            records,
            Termination::Exhausted,
            stats,
            start,
        )
    }

    async fn resolve(&self, conversation_id: i64) -> Result<ConversationRef, Termination> {
        let client = &*self.client;
        retry_rate_limited("resolve_conversation", move || {
            client.resolve_conversation(conversation_id)
        })
        .await
        .map_err(|e| {
            warn!(conversation_id, error = %e, "Conversation resolution failed");
            Termination::Aborted {
                reason: e.to_string(),
            }
        })
    }
}

fn finish<R>(
    conversation_id: i64,
    conversation: Option<ConversationRef>,
    records: Vec<R>,
    termination: Termination,
    mut stats: HarvestStats,
    start: Instant,
) -> HarvestResult<R> {
    stats.total_duration_ms = duration_ms(start.elapsed());
    info!(
        conversation_id,
        records = records.len(),
        termination = %termination,
        duration_ms = stats.total_duration_ms,
        "Harvest finished"
    );
    HarvestResult {
        conversation_id,
        conversation,
        records,
        termination,
        stats,
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
