use crate::export::{ExportError, RecordSink};
use crate::harvest::{HarvestPipeline, HarvestResult, Record, Termination};
use crate::model::{ConversationRef, MessageQuery};
use crate::traits::PlatformClient;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Outcome of one conversation within a run.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation_id: i64,
    pub title: String,
    pub records: usize,
    pub termination: Termination,
    /// File written for this conversation, if it yielded records
    pub output: Option<PathBuf>,
    pub export_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub conversations: Vec<ConversationSummary>,
    pub total_records: usize,
    pub aggregate_output: Option<PathBuf>,
}

/// Harvests the selected conversations one after another and exports each
/// one plus an aggregate of all of them.
pub struct HarvestExecutor<C, S> {
    pipeline: HarvestPipeline<C>,
    sink: S,
    pause: Duration,
}

impl<C, S> HarvestExecutor<C, S>
where
    C: PlatformClient,
    S: RecordSink,
{
    pub fn new(pipeline: HarvestPipeline<C>, sink: S, pause: Duration) -> Self {
        Self {
            pipeline,
            sink,
            pause,
        }
    }

    pub fn pipeline(&self) -> &HarvestPipeline<C> {
        &self.pipeline
    }

    /// Member mode: writes `<id>_contacts` per conversation and
    /// `all_telegram_contacts` for the run.
    #[instrument(skip(self, targets), fields(conversations = targets.len()))]
    pub async fn run_contacts(
        &self,
        targets: &[ConversationRef],
    ) -> Result<RunSummary, ExportError> {
        let mut summary = RunSummary::default();
        let mut aggregate = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            self.pause_before(index).await;
            let result = self.pipeline.harvest_members(target.id).await;
            summary
                .conversations
                .push(self.export_conversation(result, &mut aggregate));
        }

        self.finish(summary, &aggregate)
    }

    /// Message mode: writes `<id>_messages` per conversation and
    /// `all_telegram_messages` for the run.
    #[instrument(skip(self, targets, query), fields(conversations = targets.len()))]
    pub async fn run_messages(
        &self,
        targets: &[ConversationRef],
        query: &MessageQuery,
    ) -> Result<RunSummary, ExportError> {
        let mut summary = RunSummary::default();
        let mut aggregate = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            self.pause_before(index).await;
            let result = self.pipeline.harvest_messages(target.id, query).await;
            summary
                .conversations
                .push(self.export_conversation(result, &mut aggregate));
        }

        self.finish(summary, &aggregate)
    }

    async fn pause_before(&self, index: usize) {
        if index > 0 && !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }

    /// Writes one conversation's records and moves them into the aggregate.
    /// Export failures are recorded, not propagated.
    fn export_conversation<R: Record>(
        &self,
        result: HarvestResult<R>,
        aggregate: &mut Vec<R>,
    ) -> ConversationSummary {
        let mut summary = ConversationSummary {
            conversation_id: result.conversation_id,
            title: result.title(),
            records: result.records.len(),
            termination: result.termination.clone(),
            output: None,
            export_error: None,
        };

        if let Termination::Aborted { reason } = &result.termination {
            error!(
                conversation_id = result.conversation_id,
                reason = %reason,
                kept = summary.records,
                "Conversation harvest aborted"
            );
        }

        if result.records.is_empty() {
            return summary;
        }

        let stem = format!("{}_{}", result.conversation_id, R::KIND);
        match self.sink.write(&result.records, &stem) {
            Ok(path) => {
                info!(
                    conversation_id = result.conversation_id,
                    records = summary.records,
                    path = %path.display(),
                    "Saved conversation"
                );
                summary.output = Some(path);
            }
            Err(e) => {
                error!(conversation_id = result.conversation_id, error = %e, "Export failed");
                summary.export_error = Some(e.to_string());
            }
        }

        aggregate.extend(result.records);
        summary
    }

    fn finish<R: Record>(
        &self,
        mut summary: RunSummary,
        aggregate: &[R],
    ) -> Result<RunSummary, ExportError> {
        summary.total_records = aggregate.len();
        if !aggregate.is_empty() {
            let path = self
                .sink
                .write(aggregate, &format!("all_telegram_{}", R::KIND))?;
            info!(records = aggregate.len(), path = %path.display(), "Saved aggregate");
            summary.aggregate_output = Some(path);
        }
        Ok(summary)
    }
}
