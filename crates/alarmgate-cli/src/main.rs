use alarmgate_core::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "alarmgate", version, about = "Alarmgate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alarm management
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Drive the ringing alarm
    Ring {
        #[command(subcommand)]
        action: commands::ring::RingAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the wake loop in the foreground
    Run {
        /// Deliver due triggers once and exit
        #[arg(long)]
        once: bool,
        /// Seconds between trigger checks
        #[arg(long, default_value = "1")]
        poll_secs: u64,
    },
}

/// Logs go to stderr so stdout stays machine-readable.
/// `RUST_LOG` wins over the configured level.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = Config::load()
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging();

    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action),
        Commands::Ring { action } => commands::ring::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run { once, poll_secs } => commands::run::run(once, poll_secs),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
