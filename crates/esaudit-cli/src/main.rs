use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "esaudit", version, about = "Manage Elasticsearch audit indices")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, env = "ESAUDIT_CONFIG", default_value = "esaudit.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the index mapping derived from the configuration.
    Mapping,

    /// Audit index management (create/delete/exists)
    Index {
        #[command(subcommand)]
        cmd: IndexCommand,
    },

    /// Search audit documents. Filters are combined with AND.
    Search {
        /// Filter on auditable_type
        #[arg(long = "type")]
        auditable_type: Option<String>,

        /// Filter on auditable_id
        #[arg(long = "id")]
        auditable_id: Option<String>,

        /// Extra exact-match filter, e.g. --term event=updated
        #[arg(long = "term", value_name = "FIELD=VALUE")]
        terms: Vec<String>,

        /// Lower bound on created_at (configured date format or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Upper bound on created_at (configured date format or RFC 3339)
        #[arg(long)]
        to: Option<String>,

        /// Maximum number of hits to print
        #[arg(long)]
        size: Option<usize>,
    },

    /// Delete every audit document of an auditable id.
    Delete {
        auditable_id: String,

        /// Make the deletion visible to the next search
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },

    /// Remove an entity's audit documents older than the retention threshold.
    Prune {
        #[arg(long = "type")]
        auditable_type: String,

        #[arg(long = "id")]
        auditable_id: String,

        /// Only report how many documents would be removed
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    /// Create the audit index with the audit mapping (idempotent)
    Create,

    /// Delete the audit index and all of its documents (idempotent)
    Delete,

    /// Check whether the audit index exists
    Exists,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.config)?;

    match cli.cmd {
        Command::Mapping => commands::index::mapping(&config)?,

        Command::Index { cmd } => match cmd {
            IndexCommand::Create => commands::index::create(&config).await?,
            IndexCommand::Delete => commands::index::delete(&config).await?,
            IndexCommand::Exists => commands::index::exists(&config).await?,
        },

        Command::Search {
            auditable_type,
            auditable_id,
            terms,
            from,
            to,
            size,
        } => {
            let filters = commands::search::SearchArgs {
                auditable_type,
                auditable_id,
                terms,
                from,
                to,
                size,
            };
            commands::search::run(&config, filters).await?
        }

        Command::Delete {
            auditable_id,
            refresh,
        } => commands::retention::delete(&config, &auditable_id, refresh).await?,

        Command::Prune {
            auditable_type,
            auditable_id,
            dry_run,
        } => commands::retention::prune(&config, &auditable_type, &auditable_id, dry_run).await?,
    }

    Ok(())
}
