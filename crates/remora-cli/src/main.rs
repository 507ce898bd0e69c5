//! remora - Keep a local directory tree and a remote SFTP/FTP tree consistent
//!
//! Push, pull, or bidirectionally synchronize a configured local root against
//! a remote root, with metadata-based conflict detection on single-file
//! uploads and per-side deletion reconciliation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use remora_client::util::{join_remote, rel_to_remote};
use remora_client::{FtpClient, SftpClient, TransferClient};
use remora_config::{ConfigLoader, SiteConfig};
use remora_meta::MetadataStore;
use remora_sync::{PutOutcome, SyncEngine, SyncRequest};
use remora_types::{DeletePolicy, ProgressFn, Protocol, SyncDirection, SyncOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// remora - bidirectional SFTP/FTP directory synchronization
#[derive(Parser)]
#[command(
    name = "remora",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a local directory tree and a remote SFTP/FTP tree consistent",
    long_about = "remora mirrors a local root against a remote root over SFTP or FTP.\n\
                  Bulk passes push and pull whole trees with per-file failure\n\
                  isolation; single-file uploads detect remote divergence against\n\
                  the last-synced metadata before overwriting anything."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every local file to the remote tree
    Push {
        /// Also delete remote paths absent locally
        #[arg(long)]
        delete: bool,
    },
    /// Download remote files that are absent or newer than the local copy
    Pull {
        /// Also delete local files absent remotely
        #[arg(long)]
        delete: bool,
    },
    /// Push then pull in one pass
    Sync {
        /// Deletion reconciliation policy
        #[arg(long, value_enum, default_value = "off")]
        prune: PruneArg,
    },
    /// Upload a single file, blocking on remote divergence
    Put {
        /// Local file inside the configured local root
        file: PathBuf,
        /// Overwrite the remote file even if it changed since the last sync
        #[arg(short, long)]
        force: bool,
    },
    /// List a remote directory
    Ls {
        /// Path relative to the remote root
        path: Option<String>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum PruneArg {
    Off,
    Remote,
    Local,
    Both,
}

impl From<PruneArg> for DeletePolicy {
    fn from(arg: PruneArg) -> Self {
        match arg {
            PruneArg::Off => DeletePolicy::Off,
            PruneArg::Remote => DeletePolicy::PruneRemote,
            PruneArg::Local => DeletePolicy::PruneLocal,
            PruneArg::Both => DeletePolicy::PruneBoth,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.quiet, cli.verbose)?;

    info!("remora v{} starting", env!("CARGO_PKG_VERSION"));

    let site = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("failed to load '{}'", path.display()))?,
        None => ConfigLoader::load_default().context("failed to load configuration")?,
    };

    let store = Arc::new(metadata_store(&site));
    let client = build_client(&site, Arc::clone(&store));
    client.connect().await?;

    let result = match cli.command {
        Commands::Push { delete } => {
            let delete = if delete {
                DeletePolicy::PruneRemote
            } else {
                DeletePolicy::Off
            };
            run_sync(
                &site,
                Arc::clone(&client),
                store,
                SyncDirection::LocalToRemote,
                delete,
                cli.quiet,
            )
            .await
        }
        Commands::Pull { delete } => {
            let delete = if delete {
                DeletePolicy::PruneLocal
            } else {
                DeletePolicy::Off
            };
            run_sync(
                &site,
                Arc::clone(&client),
                store,
                SyncDirection::RemoteToLocal,
                delete,
                cli.quiet,
            )
            .await
        }
        Commands::Sync { prune } => {
            run_sync(
                &site,
                Arc::clone(&client),
                store,
                SyncDirection::Bidirectional,
                prune.into(),
                cli.quiet,
            )
            .await
        }
        Commands::Put { file, force } => {
            put_command(&site, Arc::clone(&client), store, file, force, cli.quiet).await
        }
        Commands::Ls { path } => ls_command(&site, Arc::clone(&client), path).await,
    };

    // A failed disconnect must not mask the command result
    let _ = client.disconnect().await;
    result
}

fn init_logging(debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// One metadata directory per workspace root
fn metadata_store(site: &SiteConfig) -> MetadataStore {
    let store = MetadataStore::new(site.local_root.join(".remora/meta"));
    match &site.name {
        Some(name) => store.with_config_name(name.clone()),
        None => store,
    }
}

fn build_client(site: &SiteConfig, store: Arc<MetadataStore>) -> Arc<dyn TransferClient> {
    match site.protocol {
        Protocol::Sftp => Arc::new(SftpClient::new(site.clone(), store)),
        Protocol::Ftp => Arc::new(FtpClient::new(site.clone(), store)),
    }
}

async fn run_sync(
    site: &SiteConfig,
    client: Arc<dyn TransferClient>,
    store: Arc<MetadataStore>,
    direction: SyncDirection,
    delete: DeletePolicy,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        let arrow = match direction {
            SyncDirection::LocalToRemote => "→",
            SyncDirection::RemoteToLocal => "←",
            SyncDirection::Bidirectional => "⟲",
        };
        println!(
            "{} {} {} {}",
            style(arrow).green().bold(),
            style(site.local_root.display()).cyan(),
            style(format!("{}://{}", site.protocol, site.host)).dim(),
            style(&site.remote_root).cyan()
        );
    }

    let progress = if quiet { None } else { Some(progress_bar()) };

    let engine = SyncEngine::new(client, store);
    let request = SyncRequest::from_site(site)
        .with_direction(direction)
        .with_delete(delete);
    let outcome = engine
        .sync_with_progress(&request, progress.clone().map(progress_callback))
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    if !quiet {
        print_outcome(&outcome);
    }
    if !outcome.is_clean() {
        bail!("{} transfers failed", outcome.failed.len());
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:36.green} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn progress_callback(pb: ProgressBar) -> ProgressFn {
    Arc::new(move |current, total, name| {
        if total > 0 {
            pb.set_length(total);
        }
        pb.set_position(current);
        pb.set_message(name.to_string());
    })
}

async fn put_command(
    site: &SiteConfig,
    client: Arc<dyn TransferClient>,
    store: Arc<MetadataStore>,
    file: PathBuf,
    force: bool,
    quiet: bool,
) -> Result<()> {
    let absolute = file
        .canonicalize()
        .with_context(|| format!("no such file '{}'", file.display()))?;
    let root = site
        .local_root
        .canonicalize()
        .with_context(|| format!("no such local root '{}'", site.local_root.display()))?;
    let rel = absolute
        .strip_prefix(&root)
        .map(rel_to_remote)
        .map_err(|_| {
            anyhow::anyhow!(
                "'{}' is outside the local root '{}'",
                file.display(),
                root.display()
            )
        })?;
    let remote = join_remote(&site.remote_root, &rel);

    let engine = SyncEngine::new(client, store);
    match engine.put_file(&absolute, &remote, force).await? {
        PutOutcome::Uploaded(entry) => {
            if !quiet {
                println!(
                    "{} Uploaded {} ({} bytes)",
                    style("✓").green().bold(),
                    style(&entry.path).cyan(),
                    entry.size.unwrap_or(0)
                );
            }
            Ok(())
        }
        PutOutcome::Conflict { stored, fresh } => {
            println!(
                "{} Remote file changed since the last sync",
                style("!").red().bold()
            );
            println!(
                "  last synced: {} bytes, modified {}",
                stored.remote_file_size,
                format_ms(stored.remote_modify_time)
            );
            println!(
                "  now remote:  {} bytes, modified {}",
                fresh.size.unwrap_or(0),
                format_ms(fresh.modified_ms)
            );

            let overwrite = !quiet
                && dialoguer::Select::new()
                    .with_prompt("Resolve conflict")
                    .items(&["Overwrite remote file", "Keep remote file"])
                    .default(1)
                    .interact()?
                    == 0;
            if !overwrite {
                bail!("upload blocked by remote conflict (re-run with --force to overwrite)");
            }

            match engine.put_file(&absolute, &remote, true).await? {
                PutOutcome::Uploaded(entry) => {
                    println!(
                        "{} Overwrote {}",
                        style("✓").green().bold(),
                        style(&entry.path).cyan()
                    );
                    Ok(())
                }
                PutOutcome::Conflict { .. } => bail!("forced upload still reported a conflict"),
            }
        }
    }
}

async fn ls_command(
    site: &SiteConfig,
    client: Arc<dyn TransferClient>,
    path: Option<String>,
) -> Result<()> {
    let remote = match path {
        Some(rel) => join_remote(&site.remote_root, &rel),
        None => site.remote_root.clone(),
    };

    // The swallowing listing reads failure as emptiness, so check existence
    // explicitly before printing a misleading "(empty)"
    if client.stat(&remote).await?.is_none() {
        bail!("remote path '{}' does not exist", remote);
    }

    let mut entries = client.try_list_dir(&remote).await?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    if entries.is_empty() {
        println!("{}", style("(empty)").dim());
        return Ok(());
    }
    for entry in entries {
        let marker = if entry.is_dir { "d" } else { "-" };
        let size = entry
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:>10}  {}  {}",
            marker,
            size,
            format_ms(entry.modified_ms),
            if entry.is_dir {
                style(&entry.name).blue().bold()
            } else {
                style(&entry.name).white()
            }
        );
    }
    Ok(())
}

fn format_ms(ms: i64) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_outcome(outcome: &SyncOutcome) {
    println!();
    println!("{}", style("Sync Result:").bold().underlined());
    println!("  Uploaded:   {}", style(outcome.uploaded).green());
    println!("  Downloaded: {}", style(outcome.downloaded).green());
    println!("  Deleted:    {}", style(outcome.deleted).yellow());
    if outcome.failed.is_empty() {
        println!("  Failed:     {}", style(0).green());
    } else {
        println!("  Failed:     {}", style(outcome.failed.len()).red());
        for failure in &outcome.failed {
            println!(
                "    {} {} ({})",
                style("✗").red(),
                failure.path,
                failure.op
            );
        }
    }
}
