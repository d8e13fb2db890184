use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Command;

use eyre::Result;
use log::{debug, info, warn};

mod cli;

use cli::Cli;
use ytresume::acquire::{AcquireEvent, Acquirer};
use ytresume::chat::{ChatClient, ChatConfig, ChatSession, Conversation, is_exit_command, load_instructions};
use ytresume::config::Config;
use ytresume::{VideoRef, output, source, split_urls};

const RULE_WIDTH: usize = 60;

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytresume.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytresume")
        .join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Command::new(name)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help() -> String {
    let yt_dlp = tool_version("yt-dlp");

    let yt_dlp_line = match &yt_dlp {
        Some(v) => format!("  \x1b[32m✅\x1b[0m yt-dlp     {v}"),
        None => "  \x1b[31m❌\x1b[0m yt-dlp     (not found, the InnerTube source will be used alone)".to_string(),
    };

    let log_path = log_dir().join("ytresume.log");

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n\nENVIRONMENT (also read from ./.env):\n  OPENAI_API_KEY   chat API credential (required for the summary)\n  MODEL            chat model\n  OPENAI_BASE_URL  chat API root\n\nConfig: {}\nLogs are written to: {}",
        ytresume::config::config_path().display(),
        log_path.display()
    )
}

/// Print a prompt and read one trimmed line; `None` on end of input
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_delta(delta: &str) {
    print!("{delta}");
    let _ = io::stdout().flush();
}

fn report(event: AcquireEvent<'_>, verbose: bool) {
    match event {
        AcquireEvent::VideoStarted { index, total, video } => {
            if total > 1 {
                println!("\n--- Video {}/{total} ---", index + 1);
            }
            println!("🎥 Processing {video}");
        }
        AcquireEvent::SourceStarted { source } => {
            if verbose {
                eprintln!("   trying caption source: {source}");
            }
        }
        AcquireEvent::SourceFailed { source, error } => {
            println!("⚠️  {source}: {error}");
        }
        AcquireEvent::Succeeded { transcript } => {
            println!("📹 Video: {}", transcript.title);
            println!(
                "✅ Captions extracted via {} ({}, {}, {} characters)",
                transcript.source,
                transcript.language,
                transcript.kind,
                transcript.char_count()
            );
            if verbose {
                eprintln!("{}", output::describe(transcript));
                eprintln!("{}", output::preview(&transcript.text, output::PREVIEW_CHARS));
            }
        }
        AcquireEvent::VideoFailed { index, total, error } => {
            println!("❌ {error}");
            if index + 1 < total {
                println!("⚠️  Trying next video...");
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_logging()?;

    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => {
            warn!("Failed to load .env: {e}");
            eprintln!("⚠️  Failed to load .env: {e}");
        }
    }

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // Load config file (non-fatal if missing/invalid)
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .unwrap_or_else(|e| {
        warn!("Ignoring config file: {e}");
        eprintln!("⚠️  Ignoring config file: {e}");
        Config::default()
    });

    println!("\n{}", output::rule(RULE_WIDTH));
    println!("  🎬 ytresume - video summarizer");
    println!("{}\n", output::rule(RULE_WIDTH));

    // Collect URLs: from args or an interactive prompt
    let inputs = if cli.urls.is_empty() {
        prompt("📎 Paste the video URL (or several, separated by commas): ")?
            .map(|line| split_urls(&line))
            .unwrap_or_default()
    } else {
        cli.urls.iter().flat_map(|u| split_urls(u)).collect()
    };

    if inputs.is_empty() {
        eprintln!("❌ No URL provided!");
        std::process::exit(1);
    }

    let client = reqwest::Client::new();
    let languages = config.languages();

    let sources = config
        .sources()
        .iter()
        .filter_map(|name| {
            let built = source::by_name(name, &client, &languages);
            if built.is_none() {
                warn!("Unknown caption source in config: {name}");
                eprintln!("⚠️  Unknown caption source in config: {name}");
            }
            built
        })
        .collect();
    let acquirer = Acquirer::new(sources, config.min_chars());
    info!("Caption sources: {}", acquirer.source_names().join(" -> "));

    let videos: Vec<VideoRef> = inputs.iter().map(|u| VideoRef::new(u)).collect();
    println!("🔍 Processing {} video(s)...", videos.len());

    let verbose = cli.verbose;
    let Some(transcript) = acquirer.acquire_first(&videos, |event| report(event, verbose)).await else {
        eprintln!("\n❌ Could not get captions from any of the videos.");
        eprintln!("💡 Tip: check that the video has captions available on YouTube.");
        return Ok(());
    };

    let transcript_path = config.transcript_file();
    output::write_transcript(&transcript_path, &transcript)?;
    println!("💾 Transcript saved to {}\n", transcript_path.display());

    let Some(mut session) = start_session(&config, client, &transcript.text).await else {
        eprintln!("❌ Could not start the chat.");
        return Ok(());
    };

    println!("\n{}\n", output::rule(50));
    println!("💬 Ask anything about the video (/exit or Ctrl-D to quit).\n");

    loop {
        let Some(question) = prompt("You: ")? else {
            println!();
            break;
        };
        if question.is_empty() {
            continue;
        }
        if is_exit_command(&question) {
            break;
        }

        println!();
        match session.ask(&question, &mut print_delta).await {
            Ok(_) => println!("\n"),
            Err(e) => {
                warn!("Chat turn failed: {e:#}");
                eprintln!("\n❌ Error: {e:#}\n");
            }
        }
    }

    info!("Session ended after {} messages", session.conversation().len());
    Ok(())
}

/// Resolve credentials, seed the conversation and stream the summary; failures are reported, not fatal
async fn start_session(config: &Config, client: reqwest::Client, transcript: &str) -> Option<ChatSession<ChatClient>> {
    let chat_config = match ChatConfig::resolve(config, |key| std::env::var(key).ok()) {
        Ok(c) => c,
        Err(e) => {
            warn!("Chat configuration incomplete: {e}");
            eprintln!("❌ {e}");
            eprintln!("💡 Tip: set it in the environment or in a .env file in the current directory.");
            return None;
        }
    };

    let instructions = match load_instructions(&config.prompt_file()) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return None;
        }
    };

    let chat = ChatClient::new(client, chat_config);
    println!("🤖 Generating summary with {}...", chat.model());
    let mut session = ChatSession::new(chat, Conversation::seeded(&instructions, transcript));

    println!("\n📝 Summary:\n{}", output::rule(50));
    if let Err(e) = session.respond(&mut print_delta).await {
        warn!("Summary failed: {e:#}");
        eprintln!("\n❌ Failed to generate summary: {e:#}");
        return None;
    }
    Some(session)
}
