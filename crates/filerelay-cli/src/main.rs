mod cmd;
mod logging;
mod output;
mod root;
mod settings;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use settings::ConfigArgs;

#[derive(Parser)]
#[command(
    name = "filerelay",
    about = "Deliver files dropped into a directory to an HTTP endpoint, in filename order, at least once",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log level (trace, debug, info, warn, error); RUST_LOG directives still apply
    #[arg(long, global = true, env = "FILERELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver pending files every schedule interval until interrupted
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Stop after this many cycles
        #[arg(long, conflicts_with = "once")]
        max_cycles: Option<u64>,
    },

    /// List files awaiting delivery, in delivery order
    Scan,

    /// Show files already finalized
    Status {
        /// Show only the most recent N entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Record a file as processed without delivering it
    Mark {
        filename: String,

        /// Status to record: success or error
        #[arg(long, default_value = "error")]
        status: String,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match settings::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    let level = match cli.log_level.as_deref().or(config.log_level.as_deref()) {
        Some(s) => match s.parse::<tracing::Level>() {
            Ok(level) => level,
            Err(_) => {
                eprintln!("error: invalid log level '{s}'");
                std::process::exit(1);
            }
        },
        None => default_level,
    };

    let log_guard = match logging::init(level, config.log_file_path.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { once, max_cycles } => cmd::run::run(&config, once, max_cycles, cli.json),
        Commands::Scan => cmd::scan::run(&config, cli.json),
        Commands::Status { limit } => cmd::status::run(&config, limit, cli.json),
        Commands::Mark { filename, status } => cmd::mark::run(&config, &filename, &status, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Flush the log file before exit() skips destructors.
        drop(log_guard);
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
