use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing_subscriber::EnvFilter;

use vocabot::collab::{InboundEvent, messages};
use vocabot::config::Config;
use vocabot::engine::difficulty;
use vocabot::engine::orchestrator::{ReplyOutcome, TickOutcome};
use vocabot::engine::state::Phase;
use vocabot::engine::word_store::{PriorKnowledge, WordStore};
use vocabot::engine::{Collaborators, Orchestrator, OrchestratorSettings};
use vocabot::service::{Service, ServiceOptions};
use vocabot::store::json_store::JsonStore;
use vocabot::store::schema::ExportData;

#[derive(Parser)]
#[command(
    name = "vocabot",
    version,
    about = "Chat-thread vocabulary tutor with adaptive word selection"
)]
struct Cli {
    #[arg(short, long, help = "Theme for newly generated words")]
    theme: Option<String>,

    #[arg(short, long, help = "Directory holding words.json")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily scheduler and the reply listener
    Run,
    /// Post a new word now unless one is still awaiting a reply
    Tick,
    /// Deliver one inbound message as if it came from the chat
    Reply {
        #[arg(long)]
        thread: String,
        #[arg(long, default_value = "cli")]
        user: String,
        #[arg(long)]
        text: String,
    },
    /// Show the learning loop's current state
    Status,
    /// Ask quiz questions on stdin and record the results
    Quiz {
        #[arg(short, long, default_value_t = 5)]
        count: usize,
    },
    /// Write history and config to a JSON file
    Export { path: PathBuf },
    /// Replace history with the contents of an export file
    Import { path: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vocabot=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading config")?;
    if let Some(theme) = cli.theme {
        config.theme = Some(theme);
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir.to_string_lossy().to_string();
    }
    config.validate();

    match cli.command {
        Command::Status => status(&config),
        Command::Export { path } => {
            let store = JsonStore::new(config.data_path())?;
            let export = store.export_all(&config)?;
            fs::write(&path, serde_json::to_string_pretty(&export)?)?;
            println!("Exported {} words to {}", export.history.words.len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let content = fs::read_to_string(&path)?;
            let export: ExportData = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            JsonStore::new(config.data_path())?.import_all(&export)?;
            println!("Imported {} words", export.history.words.len());
            Ok(())
        }
        Command::Run => {
            let (orchestrator, collab) = open_orchestrator(&config)?;
            let service = Service::new(
                Arc::new(orchestrator),
                collab.chat,
                ServiceOptions {
                    daily_time: config.daily_time(),
                    poll_interval: Duration::from_secs(config.poll_interval_secs),
                    watched_threads: config.watched_threads,
                },
            );
            service.run()
        }
        Command::Tick => {
            let (orchestrator, _) = open_orchestrator(&config)?;
            match orchestrator.tick() {
                TickOutcome::Posted { word, thread_id } => {
                    println!("Posted '{word}' in thread {thread_id}")
                }
                TickOutcome::Dormant { word } => {
                    println!("Waiting for a reply to '{word}'; nothing posted")
                }
                TickOutcome::InFlight => println!("A word is already being generated"),
                TickOutcome::Failed(e) => anyhow::bail!("word cycle failed: {e}"),
            }
            Ok(())
        }
        Command::Reply { thread, user, text } => {
            let (orchestrator, _) = open_orchestrator(&config)?;
            let event = InboundEvent {
                ts: chrono::Utc::now().timestamp_micros().to_string(),
                thread_id: thread,
                user_id: user,
                text,
                is_bot: false,
                event_id: None,
            };
            match orchestrator.handle_event(&event)? {
                ReplyOutcome::Discarded(reason) => println!("Ignored: {reason:?}"),
                ReplyOutcome::Known { word, next } => {
                    println!("Marked '{word}' as known; next word: {next:?}")
                }
                ReplyOutcome::Tutored { word, .. } => println!("Tutor replied about '{word}'"),
                ReplyOutcome::WordRequested { next, .. } => {
                    println!("New word requested; outcome: {next:?}")
                }
            }
            Ok(())
        }
        Command::Quiz { count } => quiz(&config, count),
    }
}

fn status(config: &Config) -> Result<()> {
    let history = JsonStore::new(config.data_path())?.load_history()?;
    let store = WordStore::from_entries(history.words);
    let known = store.with_knowledge(PriorKnowledge::KnownBefore).count();
    let learned = store.with_knowledge(PriorKnowledge::LearnedNew).count();

    println!("Words introduced: {}", store.len());
    println!("Known before:     {known}");
    println!("Learned new:      {learned}");
    println!(
        "Known ratio:      {:.2}",
        difficulty::known_ratio(known, learned)
    );
    match Phase::derive(&store, false) {
        Phase::AwaitingResponse { word } => println!("Waiting for a reply to '{word}'"),
        _ => println!("Ready for a new word"),
    }
    if let Some(theme) = &config.theme {
        println!("Theme:            {theme}");
    }
    Ok(())
}

fn quiz(config: &Config, count: usize) -> Result<()> {
    let (orchestrator, _) = open_orchestrator(config)?;
    let mut rng = SmallRng::from_entropy();
    let items = orchestrator.plan_quiz(count, &mut rng);
    if items.is_empty() {
        println!("No answered words to quiz yet.");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    for item in &items {
        println!("\n{}", messages::quiz_question(&item.word, item.category));
        print!("> ");
        io::stdout().flush()?;
        let Some(answer) = lines.next().transpose()? else {
            break;
        };
        let grade = orchestrator.grade_answer(item, &answer)?;
        let mark = if grade.verdict.correct { "✓" } else { "✗" };
        println!(
            "{mark} {} (score now {:.0})",
            grade.verdict.feedback, grade.stat.weighted_score
        );
    }
    Ok(())
}

#[cfg(feature = "network")]
fn open_orchestrator(config: &Config) -> Result<(Orchestrator, Collaborators)> {
    use vocabot::collab::openai::OpenAiClient;
    use vocabot::collab::slack::SlackClient;
    use vocabot::config::{OPENAI_KEY_ENV, SLACK_TOKEN_ENV};
    use vocabot::engine::state;

    let slack = SlackClient::connect(
        &config.slack,
        std::env::var(SLACK_TOKEN_ENV).unwrap_or_default(),
    )?;
    let openai = Arc::new(OpenAiClient::new(
        config.openai.clone(),
        std::env::var(OPENAI_KEY_ENV).unwrap_or_default(),
        state::primary_affirmation(&config.affirmation_tokens),
    )?);
    let collab = Collaborators {
        chat: Arc::new(slack),
        generator: openai.clone(),
        tutor: openai.clone(),
        judge: openai,
    };
    let orchestrator = Orchestrator::open(
        collab.clone(),
        OrchestratorSettings::from_config(config),
        JsonStore::new(config.data_path())?,
    )?;
    Ok((orchestrator, collab))
}

#[cfg(not(feature = "network"))]
fn open_orchestrator(_config: &Config) -> Result<(Orchestrator, Collaborators)> {
    anyhow::bail!("this build has no chat or model backends; rebuild with the `network` feature")
}
