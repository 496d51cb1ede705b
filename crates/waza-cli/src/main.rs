use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use waza_adapters::{FixtureJudoApi, JudoApi};
use waza_storage::{CacheConfig, Database, ResultCache};
use waza_sync::{latest_report_dir, CrawlPipeline, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "waza-cli")]
#[command(about = "Judo technique crawler and statistics server")]
struct Cli {
    /// Overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Serve recorded payloads from this directory instead of the live API.
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl competitions and store their techniques.
    Crawl {
        #[arg(long)]
        min_year: Option<i32>,
        #[arg(long)]
        skip_crawled: bool,
        #[arg(long)]
        workers: Option<usize>,
        /// Restrict the crawl to these competition ids.
        #[arg(long = "competition")]
        competitions: Vec<i64>,
    },
    /// Fetch profiles for every athlete seen in stored techniques.
    Profiles {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Look up a single athlete profile.
    Lookup {
        id: String,
        #[arg(long)]
        force: bool,
    },
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    Migrate,
    /// Print the most recent run report.
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = SyncConfig::from_env();
    if let Some(url) = cli.database_url.clone() {
        config.database_url = url;
    }

    match cli
        .command
        .unwrap_or(Commands::Crawl {
            min_year: None,
            skip_crawled: false,
            workers: None,
            competitions: Vec::new(),
        }) {
        Commands::Crawl {
            min_year,
            skip_crawled,
            workers,
            competitions,
        } => {
            let pipeline = pipeline(&config, cli.fixtures.as_ref()).await?;
            let mut options = config.crawl_options();
            options.min_year = min_year;
            options.skip_crawled = skip_crawled;
            if let Some(workers) = workers {
                options.workers = workers;
            }
            if !competitions.is_empty() {
                options.competition_ids = Some(competitions.into_iter().collect::<BTreeSet<_>>());
            }
            let summary = pipeline.run_crawl(&options).await?;
            println!(
                "crawl complete: run_id={} persisted={} empty={} failed={} techniques={} report={}",
                summary.run_id,
                summary.persisted,
                summary.done_empty,
                summary.failed,
                summary.techniques_written,
                summary.report_path.as_deref().unwrap_or("-")
            );
        }
        Commands::Profiles { force, workers } => {
            let pipeline = pipeline(&config, cli.fixtures.as_ref()).await?;
            let mut options = config.profile_options();
            options.force = force;
            if let Some(workers) = workers {
                options.workers = workers;
            }
            let summary = pipeline.fetch_profiles(&options).await?;
            println!(
                "profiles complete: run_id={} athletes={} fetched={} stored={} missing={} failed={}",
                summary.run_id,
                summary.athletes,
                summary.fetched,
                summary.already_stored,
                summary.missing,
                summary.failed
            );
        }
        Commands::Lookup { id, force } => {
            let pipeline = pipeline(&config, cli.fixtures.as_ref()).await?;
            match pipeline.lookup_profile(&id, force).await? {
                Some(profile) => println!("{}", describe_profile(&profile)),
                None => eprintln!("no profile for {id}"),
            }
        }
        Commands::Serve { port } => {
            let cache = Arc::new(ResultCache::new(CacheConfig::from_env()));
            let pipeline = pipeline(&config, cli.fixtures.as_ref())
                .await?
                .with_cache(cache.clone());
            let state = waza_web::AppState::new(Arc::new(pipeline), cache);
            waza_web::serve(state, port.unwrap_or_else(waza_web::port_from_env)).await?;
        }
        Commands::Migrate => {
            let db = Database::connect(&config.database_url).await?;
            db.migrate().await?;
            println!("migrations applied: {}", config.database_url);
        }
        Commands::Report => {
            let root = config
                .reports_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./reports"));
            match latest_report_dir(&root)? {
                Some(dir) => {
                    for name in ["crawl_summary.json", "profile_summary.json"] {
                        let path = dir.join(name);
                        if path.exists() {
                            let text = std::fs::read_to_string(&path)
                                .with_context(|| format!("reading {}", path.display()))?;
                            println!("{}\n{text}", path.display());
                        }
                    }
                }
                None => eprintln!("no reports under {}", root.display()),
            }
        }
    }

    Ok(())
}

async fn pipeline(config: &SyncConfig, fixtures: Option<&PathBuf>) -> Result<CrawlPipeline> {
    let Some(dir) = fixtures else {
        return CrawlPipeline::from_config(config).await;
    };
    let db = Database::connect(&config.database_url).await?;
    let api: Arc<dyn JudoApi> = Arc::new(FixtureJudoApi::from_dir(dir.clone()));
    Ok(CrawlPipeline::new(api, db).with_reports_dir(config.reports_dir.clone()))
}

fn describe_profile(profile: &waza_core::JudokaProfile) -> String {
    format!(
        "id={} name={} height={} age={} country={} updated={}",
        profile.id,
        profile.name,
        profile.height.map_or_else(|| "-".to_string(), |h| h.to_string()),
        profile.age.map_or_else(|| "-".to_string(), |a| a.to_string()),
        profile.country,
        profile.last_updated.to_rfc3339()
    )
}

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("WAZA_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
