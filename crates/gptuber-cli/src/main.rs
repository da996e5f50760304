mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gptuber",
    about = "A simulated live streamer: generated talk, spoken aloud, captioned on a display",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(
        long,
        global = true,
        env = "GPTUBER_CONFIG",
        default_value = gptuber_core::config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start streaming: scheduler loops plus the display server
    Serve {
        /// Port for the display server (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
        /// Canned utterances and TV script instead of the generation commands
        #[arg(long)]
        no_llm: bool,
        /// Speak the streamer with the classic voice
        #[arg(long)]
        no_neural_tts: bool,
        /// Answer Google Home queries with the mock agent
        #[arg(long)]
        no_smart_agent: bool,
        /// YouTube live stream whose chat is read alongside local chat
        #[arg(long)]
        youtube_url: Option<String>,
    },

    /// Print the subtitle message for an utterance
    Timeline {
        /// Utterance text
        text: String,
        /// One caption for the whole utterance
        #[arg(long)]
        no_split: bool,
        /// Prepended to every caption
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Inspect and create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve {
            port,
            no_llm,
            no_neural_tts,
            no_smart_agent,
            youtube_url,
        } => cmd::serve::run(
            &cli.config,
            gptuber_server::StreamFlags {
                no_llm,
                no_neural_tts,
                no_smart_agent,
                port,
                youtube_url,
            },
        ),
        Commands::Timeline {
            text,
            no_split,
            prefix,
        } => cmd::timeline::run(&cli.config, &text, !no_split, &prefix, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
