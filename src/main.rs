//! gotta-speak: speak, prefetch and manage lesson audio from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gotta_speak::config::Config;
use gotta_speak::progress::ProgressStore;
use gotta_speak::speech::usage::UsageLog;
use gotta_speak::speech::{
    AudioOutput, FileAudioStore, GeminiTtsClient, PlaybackController, RodioOutput, SpeakOutcome,
    SpeechSession,
};

#[derive(Parser, Debug)]
#[command(name = "gotta-speak", about = "Lesson audio via Gemini TTS with a local cache")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Speak each utterance in turn
    Speak {
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Fill the audio cache without playing anything
    Prefetch {
        /// File with one utterance per line
        #[arg(short, long)]
        file: Option<PathBuf>,
        texts: Vec<String>,
    },
    /// Inspect or clear the on-disk audio cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show the synthesis usage report
    Usage {
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// List the dates that have records instead
        #[arg(short, long)]
        list: bool,
    },
    /// Read or update a learner's progress
    Progress {
        #[arg(short, long)]
        user: String,
        #[command(subcommand)]
        action: ProgressAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Clear,
}

#[derive(Subcommand, Debug)]
enum ProgressAction {
    Show,
    /// Mark a dialogue as completed
    Complete { lesson: u32 },
    /// Record a formality quiz score
    Score { correct: u32, total: u32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP/audio internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,rodio=warn,cpal=warn")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn,rodio=warn,cpal=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(args.config.as_deref());

    match args.command {
        Command::Speak { texts } => {
            let session = build_session(&config, true)?;
            for text in &texts {
                match session.speak_and_wait(text).await {
                    SpeakOutcome::Started(source) => info!("Spoke {text:?} ({source:?})"),
                    SpeakOutcome::Silent => warn!("No audio available for {text:?}"),
                    SpeakOutcome::NoOutput => warn!("No audio output, skipped {text:?}"),
                    SpeakOutcome::Superseded => {}
                }
            }
            session.shutdown().await;
        }
        Command::Prefetch { file, mut texts } => {
            if let Some(path) = file {
                let contents = std::fs::read_to_string(&path)?;
                texts.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                );
            }

            let session = build_session(&config, false)?;
            let mut missing = 0;
            for text in &texts {
                match session.prefetch(text).await {
                    Some(source) => info!("{text:?}: {source:?}"),
                    None => {
                        missing += 1;
                        warn!("{text:?}: no audio");
                    }
                }
            }
            session.shutdown().await;
            println!("Prefetched {} of {} utterances", texts.len() - missing, texts.len());
        }
        Command::Cache { action } => {
            let store = FileAudioStore::open(config.cache.dir())?;
            match action {
                CacheAction::Stats => println!(
                    "{} cached utterances in {}",
                    store.entry_count()?,
                    store.dir().display()
                ),
                CacheAction::Clear => println!("Removed {} cached utterances", store.clear()?),
            }
        }
        Command::Usage { date, list } => {
            let usage = UsageLog::new(config.usage.dir());
            if list {
                for date in usage.list_dates() {
                    println!("{date}");
                }
            } else {
                let date =
                    date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
                println!("{}", usage.report(&date));
            }
        }
        Command::Progress { user, action } => {
            let store = ProgressStore::new(config.progress.dir());
            let progress = match action {
                ProgressAction::Show => store.load(&user)?,
                ProgressAction::Complete { lesson } => store.mark_completed(&user, lesson)?,
                ProgressAction::Score { correct, total } => {
                    store.record_formality_score(&user, correct, total)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
    }

    Ok(())
}

/// Wire up a session from config. Audio output is optional: without it the
/// session still resolves and caches audio.
fn build_session(config: &Config, with_output: bool) -> Result<SpeechSession, Box<dyn std::error::Error>> {
    let store = Arc::new(FileAudioStore::open(config.cache.dir())?);

    let mut client = GeminiTtsClient::new(&config.gemini)?;
    if config.usage.enabled {
        client = client.with_usage_log(UsageLog::new(config.usage.dir()));
    }

    let playback = if with_output && config.audio.enabled {
        match RodioOutput::open() {
            Ok(output) => {
                let output: Arc<dyn AudioOutput> = Arc::new(output);
                Some(PlaybackController::new(output, config.audio.poll_interval()))
            }
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    } else {
        None
    };

    Ok(SpeechSession::new(
        store,
        Arc::new(client),
        playback,
        config.audio.pcm_format(),
    ))
}
