use aurpull::api::AurClient;
use aurpull::commands;
use aurpull::config::Config;
use aurpull::database::Classifier;
use aurpull::output;
use aurpull::resolver::Resolver;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "aurp")]
#[command(author, version, about = "Fetch AUR packages and their dependencies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print package names only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Overwrite existing package directories
    #[arg(short, long, global = true)]
    force: bool,

    /// Maximum concurrent downloads and extractions
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Directory to extract packages into
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the AUR
    Search {
        /// Query string
        query: String,
    },

    /// Show information about an AUR package
    Info {
        /// Package name
        package: String,
    },

    /// Show direct dependencies and where they come from
    Deps {
        /// Package name
        package: String,
    },

    /// Download a package and its AUR dependencies
    #[command(visible_alias = "d")]
    Download {
        /// Package name
        package: String,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only changes the fallback
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    output::init_colors();

    let mut config = Config::from_env();
    config.quiet = cli.quiet;
    config.force = cli.force;
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs.max(1);
    }
    if let Some(dir) = cli.output {
        config.output_dir = dir;
    }
    let config = Arc::new(config);

    match cli.command {
        Commands::Search { query } => {
            let client = AurClient::new(&config)?;
            commands::search(&client, &query, config.quiet).await?;
        }
        Commands::Info { package } => {
            let client = AurClient::new(&config)?;
            commands::info(&client, &package).await?;
        }
        Commands::Deps { package } => {
            let resolver = resolver(Arc::clone(&config)).await?;
            commands::deps(&resolver, &package).await?;
        }
        Commands::Download { package } => {
            let resolver = resolver(Arc::clone(&config)).await?;
            commands::download(&resolver, &package).await?;
        }
        Commands::Completions { shell } => {
            commands::completions(&mut Cli::command(), shell, &mut std::io::stdout())?;
        }
    }

    Ok(())
}

/// Load the local databases off the runtime and build a resolver.
async fn resolver(config: Arc<Config>) -> anyhow::Result<Resolver<AurClient>> {
    let client = AurClient::new(&config)?;

    let (local_db, sync_db) = (config.local_db.clone(), config.sync_db.clone());
    let classifier =
        tokio::task::spawn_blocking(move || Classifier::load(&local_db, &sync_db)).await??;
    tracing::debug!("classifier loaded with {} packages", classifier.len());

    Ok(Resolver::new(Arc::new(client), Arc::new(classifier), config))
}
