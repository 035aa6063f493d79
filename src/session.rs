//! Operator-facing session control.
//!
//! - [`Console`] asks questions and re-asks until the answer validates
//! - Pure parsers for every answer (`parse_*`)
//! - [`SessionGuard`] releases the platform session on every exit path
//! - [`run_interactive`] drives the mode menu against a [`HarvestExecutor`]

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::executor::{HarvestExecutor, RunSummary};
use crate::export::RecordSink;
use crate::harvest::backoff::retry_rate_limited;
use crate::model::{ConversationRef, HarvestMode, MessageLimit, MessageQuery, StopBoundary};
use crate::traits::PlatformClient;

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// An answer that failed validation. Always recovered by asking again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Please enter 1, 2 or 3")]
    UnknownMode,
    #[error("'{0}' is not a valid number")]
    NotANumber(String),
    #[error("Year must be between 2000 and 2100")]
    YearOutOfRange,
    #[error("Month must be between 1 and 12")]
    MonthOutOfRange,
    #[error("Index {index} is out of range (0-{max})")]
    IndexOutOfRange { index: usize, max: usize },
    #[error("Nothing selected")]
    EmptySelection,
    #[error("A value is required")]
    Empty,
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Input closed")]
    Closed,
    #[error("Console I/O error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Parsers
// ============================================================================

pub fn parse_mode(input: &str) -> Result<HarvestMode, InputError> {
    match input.trim() {
        "1" => Ok(HarvestMode::Contacts),
        "2" => Ok(HarvestMode::Messages),
        "3" => Ok(HarvestMode::Exit),
        _ => Err(InputError::UnknownMode),
    }
}

/// Parses `"all"` or comma-separated zero-based indices into `0..len`.
///
/// Duplicates are dropped; the first occurrence keeps its position.
pub fn parse_selection(input: &str, len: usize) -> Result<Vec<usize>, InputError> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return if len == 0 {
            Err(InputError::EmptySelection)
        } else {
            Ok((0..len).collect())
        };
    }

    let mut selected = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let index: usize = part
            .parse()
            .map_err(|_| InputError::NotANumber(part.to_string()))?;
        if index >= len {
            return Err(InputError::IndexOutOfRange {
                index,
                max: len.saturating_sub(1),
            });
        }
        if !selected.contains(&index) {
            selected.push(index);
        }
    }

    if selected.is_empty() {
        return Err(InputError::EmptySelection);
    }
    Ok(selected)
}

pub fn parse_year(input: &str) -> Result<i32, InputError> {
    let year = parse_number::<i32>(input)?;
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(year)
    } else {
        Err(InputError::YearOutOfRange)
    }
}

pub fn parse_month(input: &str) -> Result<u32, InputError> {
    let month = parse_number::<u32>(input)?;
    if (1..=12).contains(&month) {
        Ok(month)
    } else {
        Err(InputError::MonthOutOfRange)
    }
}

/// Blank means no limit.
pub fn parse_limit(input: &str) -> Result<MessageLimit, InputError> {
    if input.trim().is_empty() {
        return Ok(MessageLimit::Unbounded);
    }
    parse_number::<usize>(input).map(MessageLimit::AtMost)
}

/// Any non-blank answer.
pub fn parse_required(input: &str) -> Result<String, InputError> {
    let input = input.trim();
    if input.is_empty() {
        Err(InputError::Empty)
    } else {
        Ok(input.to_string())
    }
}

pub fn parse_api_id(input: &str) -> Result<i32, InputError> {
    parse_number(input)
}

fn parse_number<T: std::str::FromStr>(input: &str) -> Result<T, InputError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(InputError::Empty);
    }
    input
        .parse()
        .map_err(|_| InputError::NotANumber(input.to_string()))
}

// ============================================================================
// Console
// ============================================================================

/// Line-oriented prompt over any reader/writer pair.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn say(&mut self, line: impl Display) -> Result<(), PromptError> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    /// Prints `prompt` and returns the trimmed answer.
    pub fn ask(&mut self, prompt: &str) -> Result<String, PromptError> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(PromptError::Closed);
        }
        Ok(line.trim().to_string())
    }

    /// Asks until `parse` accepts the answer, printing each rejection.
    pub fn ask_until<T>(
        &mut self,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, InputError>,
    ) -> Result<T, PromptError> {
        loop {
            let answer = self.ask(prompt)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(e) => self.say(e)?,
            }
        }
    }

    pub fn choose_mode(&mut self) -> Result<HarvestMode, PromptError> {
        self.say("")?;
        self.say("Choose an action:")?;
        self.say("  1) Harvest group members")?;
        self.say("  2) Harvest message history")?;
        self.say("  3) Exit")?;
        self.ask_until("> ", parse_mode)
    }

    pub fn select_conversations(
        &mut self,
        candidates: &[ConversationRef],
    ) -> Result<Vec<ConversationRef>, PromptError> {
        for (index, conversation) in candidates.iter().enumerate() {
            self.say(format!(
                "  {index}: {} [{}]",
                conversation.title, conversation.kind
            ))?;
        }
        let len = candidates.len();
        let indices = self.ask_until("Conversations (comma-separated numbers or 'all'): ", |s| {
            parse_selection(s, len)
        })?;
        Ok(indices.into_iter().map(|i| candidates[i].clone()).collect())
    }

    pub fn message_query(&mut self) -> Result<MessageQuery, PromptError> {
        let year = self.ask_until(
            &format!("Start year ({MIN_YEAR}-{MAX_YEAR}): "),
            parse_year,
        )?;
        let month = self.ask_until("Stop month (1-12): ", parse_month)?;
        let limit = self.ask_until("Maximum messages (blank for no limit): ", parse_limit)?;
        Ok(MessageQuery {
            boundary: StopBoundary::new(year, month),
            limit,
        })
    }

    pub fn report(&mut self, summary: &RunSummary) -> Result<(), PromptError> {
        for conversation in &summary.conversations {
            let mut line = format!(
                "{} ({}): {} records, {}",
                conversation.title,
                conversation.conversation_id,
                conversation.records,
                conversation.termination
            );
            if let Some(path) = &conversation.output {
                line.push_str(&format!(" -> {}", path.display()));
            }
            if let Some(error) = &conversation.export_error {
                line.push_str(&format!(" (export failed: {error})"));
            }
            self.say(line)?;
        }
        match &summary.aggregate_output {
            Some(path) => self.say(format!(
                "Total: {} records -> {}",
                summary.total_records,
                path.display()
            )),
            None => self.say("Nothing was harvested."),
        }
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Owns the authenticated client for the duration of a run and releases it
/// when dropped, whether the run finished, failed or returned early.
pub struct SessionGuard<C: PlatformClient> {
    client: Arc<C>,
}

impl<C: PlatformClient> SessionGuard<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

impl<C: PlatformClient> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        self.client.release();
        info!("Session released");
    }
}

// ============================================================================
// Menu loop
// ============================================================================

/// Runs the mode menu until the operator exits or input closes.
///
/// Input closing at any prompt ends the session cleanly.
pub async fn run_interactive<C, S, R, W>(
    console: &mut Console<R, W>,
    executor: &HarvestExecutor<C, S>,
) -> Result<(), PromptError>
where
    C: PlatformClient,
    S: RecordSink,
    R: BufRead,
    W: Write,
{
    loop {
        let outcome = match console.choose_mode() {
            Ok(HarvestMode::Exit) => return Ok(()),
            Ok(mode) => run_mode(console, executor, mode).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {}
            Err(PromptError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

async fn run_mode<C, S, R, W>(
    console: &mut Console<R, W>,
    executor: &HarvestExecutor<C, S>,
    mode: HarvestMode,
) -> Result<(), PromptError>
where
    C: PlatformClient,
    S: RecordSink,
    R: BufRead,
    W: Write,
{
    let client = &**executor.pipeline().client();
    let conversations =
        match retry_rate_limited("list_conversations", move || client.list_conversations()).await
        {
            Ok(conversations) => conversations,
            Err(e) => {
                warn!(error = %e, "Listing conversations failed");
                return console.say(format!("Could not list conversations: {e}"));
            }
        };

    let candidates: Vec<ConversationRef> = conversations
        .into_iter()
        .filter(|c| mode != HarvestMode::Contacts || c.has_members())
        .collect();
    if candidates.is_empty() {
        return console.say("No conversations available.");
    }

    let targets = console.select_conversations(&candidates)?;
    let outcome = match mode {
        HarvestMode::Contacts => executor.run_contacts(&targets).await,
        _ => {
            let query = console.message_query()?;
            executor.run_messages(&targets, &query).await
        }
    };

    match outcome {
        Ok(summary) => console.report(&summary),
        Err(e) => console.say(format!("Saving the combined file failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::testing::MockClient;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(" 1 "), Ok(HarvestMode::Contacts));
        assert_eq!(parse_mode("2"), Ok(HarvestMode::Messages));
        assert_eq!(parse_mode("3"), Ok(HarvestMode::Exit));
        assert_eq!(parse_mode("4"), Err(InputError::UnknownMode));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("all", 3), Ok(vec![0, 1, 2]));
        assert_eq!(parse_selection("ALL", 2), Ok(vec![0, 1]));
        assert_eq!(parse_selection("2, 0,2", 3), Ok(vec![2, 0]));
        assert_eq!(
            parse_selection("3", 3),
            Err(InputError::IndexOutOfRange { index: 3, max: 2 })
        );
        assert_eq!(
            parse_selection("1,x", 3),
            Err(InputError::NotANumber("x".to_string()))
        );
        assert_eq!(parse_selection(" , ", 3), Err(InputError::EmptySelection));
        assert_eq!(parse_selection("all", 0), Err(InputError::EmptySelection));
    }

    #[test]
    fn test_parse_year_and_month_bounds() {
        assert_eq!(parse_year("2000"), Ok(2000));
        assert_eq!(parse_year("2100"), Ok(2100));
        assert_eq!(parse_year("1999"), Err(InputError::YearOutOfRange));
        assert_eq!(parse_year(""), Err(InputError::Empty));
        assert_eq!(parse_month("12"), Ok(12));
        assert_eq!(parse_month("0"), Err(InputError::MonthOutOfRange));
        assert_eq!(
            parse_month("may"),
            Err(InputError::NotANumber("may".to_string()))
        );
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(""), Ok(MessageLimit::Unbounded));
        assert_eq!(parse_limit("  "), Ok(MessageLimit::Unbounded));
        assert_eq!(parse_limit("0"), Ok(MessageLimit::AtMost(0)));
        assert_eq!(parse_limit("250"), Ok(MessageLimit::AtMost(250)));
        assert_eq!(
            parse_limit("-5"),
            Err(InputError::NotANumber("-5".to_string()))
        );
    }

    #[test]
    fn test_parse_required_and_api_id() {
        assert_eq!(parse_required("  +15550001 "), Ok("+15550001".to_string()));
        assert_eq!(parse_required("   "), Err(InputError::Empty));
        assert_eq!(parse_api_id("611335"), Ok(611335));
        assert!(parse_api_id("hash").is_err());
    }

    #[test]
    fn test_message_query_reprompts_until_valid() {
        let mut console = console("1999\nabc\n2023\n13\n1\nlots\n\n");

        let query = console.message_query().unwrap();

        assert_eq!(query.boundary, StopBoundary::new(2023, 1));
        assert_eq!(query.limit, MessageLimit::Unbounded);
        let output = String::from_utf8(console.into_output()).unwrap();
        assert!(output.contains("Year must be between 2000 and 2100"));
        assert!(output.contains("'abc' is not a valid number"));
        assert!(output.contains("Month must be between 1 and 12"));
        assert!(output.contains("'lots' is not a valid number"));
    }

    #[test]
    fn test_closed_input_is_reported() {
        let mut console = console("");
        assert!(matches!(console.choose_mode(), Err(PromptError::Closed)));
    }

    #[test]
    fn test_session_guard_releases_on_drop() {
        let client = Arc::new(MockClient::new());
        {
            let guard = SessionGuard::new(Arc::clone(&client));
            assert!(!guard.client().released());
        }
        assert!(client.released());
    }

    #[cfg(feature = "csv-output")]
    mod interactive {
        use super::*;
        use crate::export::CsvSink;
        use crate::harvest::testing::{conversation, history, user};
        use crate::harvest::HarvestPipeline;
        use crate::model::{ConversationKind, ConversationRef};
        use std::time::Duration;

        fn executor(dir: &std::path::Path) -> HarvestExecutor<MockClient, CsvSink> {
            let client = MockClient::new();
            client.add_conversation(conversation(1));
            client.add_conversation(ConversationRef::new(
                7,
                "Alice",
                ConversationKind::Direct,
            ));
            client.set_participants(1, Ok(vec![user(10)]));
            client.set_history(1, history(3, 2024, 4));
            client.set_history(7, history(2, 2024, 4));
            HarvestExecutor::new(
                HarvestPipeline::new(Arc::new(client)),
                CsvSink::new(dir),
                Duration::ZERO,
            )
        }

        #[tokio::test]
        async fn test_contacts_then_exit() {
            let dir = tempfile::tempdir().unwrap();
            let executor = executor(dir.path());
            let mut console = console("1\n5\n0\n3\n");

            run_interactive(&mut console, &executor).await.unwrap();

            assert!(dir.path().join("1_contacts.csv").exists());
            assert!(dir.path().join("all_telegram_contacts.csv").exists());
            let output = String::from_utf8(console.into_output()).unwrap();
            // Direct chats are not offered for member harvesting
            assert!(!output.contains("Alice"));
            assert!(output.contains("Index 5 is out of range (0-0)"));
            assert!(output.contains("Total: 1 records"));
        }

        #[tokio::test]
        async fn test_input_closed_mid_prompt_ends_cleanly() {
            let dir = tempfile::tempdir().unwrap();

            // Closed at the selection prompt
            let executor = executor(dir.path());
            let mut at_selection = console("1\n");
            assert!(run_interactive(&mut at_selection, &executor).await.is_ok());

            // Closed at the message query prompts
            let mut at_query = console("2\n0\n2024\n");
            assert!(run_interactive(&mut at_query, &executor).await.is_ok());
            assert!(!dir.path().join("1_messages.csv").exists());
        }

        #[tokio::test]
        async fn test_messages_from_all_conversations() {
            let dir = tempfile::tempdir().unwrap();
            let executor = executor(dir.path());
            let mut console = console("2\nall\n2024\n1\n\n");

            // Input ends after one run; closing stdin ends the loop
            run_interactive(&mut console, &executor).await.unwrap();

            assert!(dir.path().join("1_messages.csv").exists());
            assert!(dir.path().join("7_messages.csv").exists());
            let aggregate =
                std::fs::read_to_string(dir.path().join("all_telegram_messages.csv")).unwrap();
            assert_eq!(aggregate.lines().count(), 6);
        }
    }
}
