use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "slotwatch")]
#[command(author, version)]
#[command(
    about = "Monitors appointment-booking portals for open slots",
    long_about = "Slotwatch periodically checks configured appointment portals on behalf of \
                  tracked applications, alerts when slots open up, and can auto-submit a booking."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor all configured sites until interrupted
    Run {
        /// Path to the site registry JSON file
        #[arg(long, value_name = "FILE")]
        sites: PathBuf,

        /// Path to the applications JSON file
        #[arg(long, value_name = "FILE")]
        apps: PathBuf,

        /// Optional engine config overrides (JSON)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Interactive profile: operator alerts, challenge waits, fast ticks
        #[arg(long)]
        interactive: bool,
    },

    /// Validate and list the configured sites
    Sites {
        /// Path to the site registry JSON file
        #[arg(long, value_name = "FILE")]
        sites: PathBuf,
    },

    /// Run a single one-shot check pass for one site
    Check {
        /// Path to the site registry JSON file
        #[arg(long, value_name = "FILE")]
        sites: PathBuf,

        /// Path to the applications JSON file
        #[arg(long, value_name = "FILE")]
        apps: PathBuf,

        /// Site key to check
        #[arg(long)]
        site: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            sites,
            apps,
            config,
            interactive,
        } => commands::run::execute(&sites, &apps, config.as_deref(), interactive).await,
        Commands::Sites { sites } => commands::sites::execute(&sites),
        Commands::Check { sites, apps, site } => {
            commands::check::execute(&sites, &apps, &site).await
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("slotwatch=debug,slotwatch_core=debug,slotwatch_browser=debug,slotwatch_engine=debug")
    } else {
        EnvFilter::new("slotwatch=info,slotwatch_engine=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
