use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

use multisearch::config::SearchConfiguration;
use multisearch::enrichment::MetadataProvider;
use multisearch::errors::EnrichmentError;
use multisearch::hit::ProteinMetadata;
use multisearch::io::fasta::FastaSequenceLookup;
use multisearch::pipeline::session::SearchSession;
use multisearch::store::SessionStore;

#[derive(Debug, Parser)]
#[command(name = "multisearch")]
#[command(about = "Multi-engine peptide search orchestration")]
struct Cli {
    /// Verbosity, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for rolling log files, logs to stderr only when unset
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prints a fresh default configuration in TOML format
    NewConfig {
        /// Write to this file instead of stdout
        path: Option<PathBuf>,
    },
    /// Runs a search session over the given spectrum files
    Search {
        /// Path to the session configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Glob matching the spectrum files to search
        spectra: String,

        /// Target protein database in FASTA format
        #[arg(short, long)]
        database: PathBuf,

        /// Optional decoy database for engines without built-in decoys
        #[arg(long)]
        decoy_database: Option<PathBuf>,

        /// Directory for the merged hit report
        #[arg(short, long, default_value = "./out")]
        output_dir: PathBuf,

        /// Directory for per-session working files
        #[arg(short, long, default_value = "./work")]
        work_dir: PathBuf,
    },
}

/// Placeholder for sessions without a metadata service. Never invoked, the
/// session skips enrichment entirely when no provider is configured.
///
struct OfflineProvider;

impl MetadataProvider for OfflineProvider {
    async fn fetch(&self, _accession: &str) -> Result<ProteinMetadata, EnrichmentError> {
        Err(EnrichmentError::ServiceUnavailable(
            "no metadata service configured".to_string(),
        ))
    }
}

fn initialize_logging(
    verbose: u8,
    log_dir: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("multisearch={}", level)));

    match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let appender = tracing_appender::rolling::daily(log_dir, "multisearch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = initialize_logging(args.verbose, args.log_dir.as_ref())?;

    match args.command {
        Commands::NewConfig { path } => {
            let serialized = toml::to_string_pretty(&SearchConfiguration::new())
                .context("Unable to serialize the default configuration")?;
            match path {
                Some(path) => std::fs::write(&path, serialized)
                    .with_context(|| format!("Unable to write `{}`", path.display()))?,
                None => println!("{}", serialized),
            }
        }
        Commands::Search {
            config,
            spectra,
            database,
            decoy_database,
            output_dir,
            work_dir,
        } => {
            let config: SearchConfiguration = toml::from_str(
                &std::fs::read_to_string(&config)
                    .with_context(|| format!("Unable to read `{}`", config.display()))?,
            )
            .context("Unable to parse the session configuration")?;

            let spectrum_files: Vec<PathBuf> = glob::glob(&spectra)
                .context("Invalid spectrum glob")?
                .collect::<std::result::Result<_, _>>()
                .context("Unable to resolve the spectrum glob")?;
            if spectrum_files.is_empty() {
                bail!("No spectrum files match `{}`", spectra);
            }

            let lookup = FastaSequenceLookup::from_file(&database)
                .with_context(|| format!("Unable to read `{}`", database.display()))?;
            info!(
                "Loaded {} proteins from `{}`",
                lookup.len(),
                database.display()
            );

            let store = Arc::new(SessionStore::new());
            let session = SearchSession::new(
                config,
                store,
                Arc::new(lookup),
                None::<Arc<OfflineProvider>>,
            );

            signal_hook::flag::register(
                signal_hook::consts::SIGINT,
                session.cancel_flag(),
            )
            .context("Unable to register the interrupt handler")?;

            let summary = session
                .run(&spectrum_files, database, decoy_database, &work_dir)
                .await?;

            std::fs::create_dir_all(&output_dir)?;
            let report = output_dir.join(format!("{}_hits.tsv", summary.session_id));
            session.write_report(&report)?;

            if summary.canceled {
                info!(
                    "Session {} canceled, {} hits merged so far, report at `{}`",
                    summary.session_id,
                    summary.accepted_hits,
                    report.display()
                );
            } else {
                info!(
                    "Session {} finished: {} tasks, {} accepted hits, report at `{}`",
                    summary.session_id,
                    summary.submitted_tasks,
                    summary.accepted_hits,
                    report.display()
                );
            }
        }
    }
    Ok(())
}
