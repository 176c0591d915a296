use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "radar")]
#[command(about = "Message store change radar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hash and canonical JSON of the merged config layers
    ConfigHash {
        /// YAML layers, later ones override earlier ones
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspect or clear the persisted dedup cursor
    Cursor {
        #[command(subcommand)]
        cmd: CursorCmd,
    },

    /// Drive the full pipeline over an in-memory store from a JSON-lines script
    Replay {
        /// Script file, one step per line
        #[arg(long)]
        fixture: String,

        /// Layered config paths in merge order (defaults apply when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Initial clock reading (epoch ms) before the first `clock` step
        #[arg(long, default_value_t = 0)]
        start_ms: i64,
    },
}

#[derive(Subcommand)]
enum CursorCmd {
    /// Print the persisted cursor
    Show {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Forget every delivery. The watcher must not be running.
    Reset {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Acknowledge that already-delivered records may be delivered again.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

impl Commands {
    fn config_paths(&self) -> &[String] {
        match self {
            Commands::ConfigHash { .. } => &[],
            Commands::Cursor { cmd } => match cmd {
                CursorCmd::Show { config_paths } | CursorCmd::Reset { config_paths, .. } => {
                    config_paths
                }
            },
            Commands::Replay { config_paths, .. } => config_paths,
        }
    }
}

fn init_tracing(fallback: &str) {
    // RUST_LOG wins; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(fallback))
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    let settings = commands::load_settings(cli.cmd.config_paths())?;
    init_tracing(&settings.config.logging.filter);
    settings.log_summary();
    let cfg = settings.config;

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let layers: Vec<&str> = paths.iter().map(String::as_str).collect();
            let loaded = radar_config::load_layered_yaml(&layers)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Cursor { cmd } => match cmd {
            CursorCmd::Show { .. } => commands::cursor::show(&cfg)?,
            CursorCmd::Reset { yes, .. } => commands::cursor::reset(&cfg, yes)?,
        },

        Commands::Replay {
            fixture, start_ms, ..
        } => {
            let steps = commands::replay::load_script(&fixture)?;
            let report = commands::replay::run(&steps, &cfg, start_ms)?;
            for line in &report.lines {
                println!("{line}");
            }
            eprintln!("stats={}", serde_json::to_string(&report.stats)?);
            eprintln!("cursor={}", report.cursor);
        }
    }

    Ok(())
}
