use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ytresume",
    about = "Summarize a YouTube video from its captions, then chat about it",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Video URLs or IDs, tried in order until one has usable captions (prompts if omitted)
    pub urls: Vec<String>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Show caption sources, languages and a transcript preview
    #[arg(short, long)]
    pub verbose: bool,
}
