//! telegram-harvester: interactive member / message history export to spreadsheets.
//! Credentials from env (TG_API_ID, TG_API_HASH, TG_PHONE) or prompts;
//! tunables from CLI flags or a JSON file.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telegram_harvester::config::{Credentials, ExportFormat, HarvestConfig};
use telegram_harvester::export::FileSink;
use telegram_harvester::harvest::HarvestPipeline;
use telegram_harvester::session::{parse_required, run_interactive, Console, SessionGuard};
use telegram_harvester::telegram::TelegramClient;
use telegram_harvester::HarvestExecutor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "telegram-harvester")]
#[command(about = "Harvest Telegram members or message history into spreadsheets")]
#[command(long_about = None)]
#[command(version)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session name, stored as <name>.session (asked for when omitted).
    #[arg(short, long)]
    session: Option<String>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// xlsx or csv
    #[arg(short, long)]
    format: Option<ExportFormat>,

    #[arg(long)]
    page_size: Option<usize>,

    /// Pause between two conversations, in seconds.
    #[arg(long)]
    pause_secs: Option<u64>,
}

impl Cli {
    fn harvest_config(&self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_json_file(path)?,
            None => HarvestConfig::default(),
        };
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(format) = self.format {
            config = config.with_format(format);
        }
        if let Some(page_size) = self.page_size {
            config = config.with_page_size(page_size);
        }
        if let Some(secs) = self.pause_secs {
            config = config.with_conversation_pause(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.harvest_config().context("Load harvest config")?;
    let sink = FileSink::from_config(&config)?;
    let credentials = Credentials::from_env().context("Read credentials from environment")?;

    let mut console = Console::stdio();
    let session_name = match &cli.session {
        Some(name) => name.clone(),
        None => console.ask_until("Session name: ", parse_required)?,
    };
    let session_file = PathBuf::from(format!("{session_name}.session"));

    let client = TelegramClient::connect(credentials, session_file, &mut console)
        .await
        .context("Sign in to Telegram")?;

    // Released when `session` drops, on every return path below
    let session = SessionGuard::new(Arc::new(client));

    let pipeline = HarvestPipeline::new(Arc::clone(session.client()))
        .with_page_size(config.page_size)
        .with_progress_interval(config.progress_interval);
    let executor = HarvestExecutor::new(pipeline, sink, config.conversation_pause);

    run_interactive(&mut console, &executor).await?;
    Ok(())
}
