use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

use tsvault_core::config::{DEFAULT_BACKUPS_ROOT, DEFAULT_PORT, DEFAULT_TOOL};
use tsvault_core::{
    BackupError, BackupProvider, ExecContext, InfluxProvider, ProviderBuilder, ProviderConfig,
    SelectionOptions,
};

#[derive(Parser, Debug)]
#[command(name = "tsvault")]
#[command(about = "InfluxDB backup lifecycle manager", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Directory holding committed backups and error markers
    #[arg(long, global = true, env = "TSVAULT_BACKUP_DIR", default_value = DEFAULT_BACKUPS_ROOT)]
    backup_dir: PathBuf,

    /// Parent directory for per-attempt staging directories
    #[arg(long, global = true, env = "TSVAULT_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// InfluxDB host (IP address or domain name)
    #[arg(long, global = true, env = "TSVAULT_HOST", default_value = "")]
    host: String,

    /// InfluxDB RPC port used by the backup tool
    #[arg(long, global = true, env = "TSVAULT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Database to back up
    #[arg(long, global = true, env = "TSVAULT_DATABASE", default_value = "")]
    database: String,

    /// Retention policy (all policies when omitted)
    #[arg(long, global = true, env = "TSVAULT_RETENTION")]
    retention: Option<String>,

    /// Shard ID
    #[arg(long, global = true, env = "TSVAULT_SHARD")]
    shard: Option<String>,

    /// Include points at or after this RFC3339 time
    #[arg(long, global = true, env = "TSVAULT_START")]
    start: Option<String>,

    /// Exclude points after this RFC3339 time
    #[arg(long, global = true, env = "TSVAULT_END")]
    end: Option<String>,

    /// Incremental backup since this RFC3339 time
    #[arg(long, global = true, env = "TSVAULT_SINCE")]
    since: Option<String>,

    /// Backup tool executable
    #[arg(long, global = true, env = "TSVAULT_TOOL", default_value = DEFAULT_TOOL)]
    tool: String,

    /// Skip the `<tool> version` check at startup
    #[arg(long, global = true, default_value = "false")]
    no_probe: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the backup tool and commit a new backup
    Create {
        /// External ID assigned by the caller
        id: String,

        /// Seconds to wait for the backup tool
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Extra environment for the backup tool (KEY=VALUE)
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },

    /// List every committed backup
    List,

    /// Show the committed backup for an external ID
    Get {
        id: String,
    },

    /// Delete every backup and error marker for an external ID
    Delete {
        id: String,
    },
}

impl TargetArgs {
    fn into_config(self) -> ProviderConfig {
        let selection = SelectionOptions {
            retention: self.retention,
            shard: self.shard,
            start: self.start,
            end: self.end,
            since: self.since,
        };
        let mut config = ProviderConfig::new(self.backup_dir, self.host, self.port, self.database)
            .with_selection(selection)
            .with_tool(self.tool)
            .with_probe_tool(!self.no_probe);
        if let Some(staging_dir) = self.staging_dir {
            config = config.with_staging_root(staging_dir);
        }
        config
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    let provider = match ProviderBuilder::new(cli.target.into_config()).build() {
        Ok(provider) => provider,
        Err(e) => exit_with(e),
    };
    if let Err(e) = provider.initialize().await {
        exit_with(e);
    }

    if let Err(e) = run(&provider, cli.command).await {
        exit_with(e);
    }
}

async fn run(provider: &InfluxProvider, command: Commands) -> Result<(), BackupError> {
    match command {
        Commands::Create { id, timeout, env } => {
            let context = env
                .into_iter()
                .fold(ExecContext::default(), |ctx, (k, v)| ctx.with_env(k, v));
            let status = provider
                .create_backup(&id, Duration::from_secs(timeout), &context)
                .await?;
            print_json(&status);
        }
        Commands::List => {
            let all = provider.list_backups().await?;
            print_json(&all);
        }
        Commands::Get { id } => {
            let status = provider.get_backup(&id).await?;
            print_json(&status);
        }
        Commands::Delete { id } => {
            provider.delete_backup(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "cannot render output"),
    }
}

fn exit_with(e: BackupError) -> ! {
    error!(kind = ?e.kind(), error = %e, "tsvault failed");
    std::process::exit(1);
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
