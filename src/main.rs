use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s3sync::{cli, config, core};

#[derive(Parser)]
#[command(name = "s3sync")]
#[command(version, about = "S3 client with pre-signed URLs and local/remote reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true, env = "S3SYNC_CONFIG")]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Disable SSL certificate verification
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresignVerb {
    Get,
    Put,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a time-limited pre-signed URL
    Presign {
        /// Operation the URL grants
        #[arg(value_enum)]
        verb: PresignVerb,

        /// S3 path (s3://bucket/key)
        path: String,

        /// Validity in seconds
        #[arg(long, default_value = "3600")]
        expires_in: u64,

        /// Content type bound to a PUT URL
        #[arg(long)]
        content_type: Option<String>,

        /// Custom header bound to a PUT URL (Name:Value, repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Compare a local directory with a remote prefix
    Diff {
        /// Local directory
        local: String,

        /// S3 path (s3://bucket/prefix)
        remote: String,

        /// Prefix prepended to local keys
        #[arg(long, default_value = "")]
        local_prefix: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Show object info
    Stat {
        /// S3 path
        path: String,
    },

    /// List objects
    Ls {
        /// S3 path (s3://bucket/prefix)
        path: String,
    },

    /// Upload a file with hash and file-date metadata
    Put {
        /// Local file
        source: String,

        /// S3 path (s3://bucket/key, or s3://bucket/dir/)
        destination: String,
    },

    /// Download an object
    Get {
        /// S3 path
        source: String,

        /// Local file
        destination: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Set insecure TLS if flag is set (before the client is built)
    if cli.insecure {
        std::env::set_var("S3SYNC_INSECURE_TLS", "true");
    }

    // Metadata fetches run on a worker pool, so use the multi-threaded runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Load configuration
    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;

    // Initialize core
    let core = core::Core::new(config)?;

    match cli.command {
        Commands::Presign {
            verb,
            path,
            expires_in,
            content_type,
            headers,
        } => {
            let verb = match verb {
                PresignVerb::Get => "get",
                PresignVerb::Put => "put",
            };
            cli::commands::cmd_presign(
                &core,
                verb,
                &path,
                expires_in,
                content_type.as_deref(),
                &headers,
            )
            .await?;
        }
        Commands::Diff {
            local,
            remote,
            local_prefix,
            json,
            quiet,
        } => {
            cli::commands::cmd_diff(&core, &local, &remote, &local_prefix, json, !quiet).await?;
        }
        Commands::Stat { path } => {
            cli::commands::cmd_stat(&core, &path).await?;
        }
        Commands::Ls { path } => {
            cli::commands::cmd_ls(&core, &path).await?;
        }
        Commands::Put {
            source,
            destination,
        } => {
            cli::commands::cmd_put(&core, &source, &destination).await?;
        }
        Commands::Get {
            source,
            destination,
        } => {
            cli::commands::cmd_get(&core, &source, &destination).await?;
        }
    }

    Ok(())
}
