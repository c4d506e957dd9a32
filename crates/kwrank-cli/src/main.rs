mod discover;
mod keywords;
mod queue;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kwrank_core::{AppConfig, Platform};
use kwrank_serp::{SerpClient, SurfaceLimiters};
use kwrank_tracker::{PgStore, RefreshScheduler};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kwrank-cli")]
#[command(about = "Keyword rank tracking command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Start tracking a keyword (re-enables an untracked one)
    Track {
        /// Storefront app id (iOS numeric id or Android package name)
        #[arg(long)]
        app: String,
        #[arg(long)]
        keyword: String,
        #[arg(long, value_parser = parse_platform, default_value = "ios")]
        platform: Platform,
        /// Two-letter storefront region
        #[arg(long, default_value = "us")]
        region: String,
    },
    /// Stop tracking a keyword; history is kept
    Untrack { id: i64 },
    /// List tracked keywords
    Keywords {
        /// Include keywords that are no longer tracked
        #[arg(long)]
        all: bool,
    },
    /// Enqueue one refresh cycle for every tracked keyword
    Enqueue,
    /// Queue an immediate refresh of specific keywords
    Refresh {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Run refresh workers
    Work {
        /// Exit once no job is due instead of polling
        #[arg(long)]
        drain: bool,
    },
    /// Find keywords an app already ranks for
    Discover {
        #[arg(long)]
        app: String,
        #[arg(long, value_parser = parse_platform, default_value = "ios")]
        platform: Platform,
        #[arg(long, default_value = "us")]
        region: String,
        /// Listing name; when omitted the listing is looked up in the storefront
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        max_candidates: Option<usize>,
        /// Start tracking every keyword found
        #[arg(long)]
        track: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the ranking history of a tracked keyword
    History {
        id: i64,
        #[arg(long, default_value = "30")]
        days: u32,
    },
}

fn parse_platform(raw: &str) -> Result<Platform, String> {
    raw.parse::<Platform>().map_err(|e| e.to_string())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = kwrank_db::PoolConfig::from_app_config(config);
    let pool = kwrank_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

fn serp_client(config: &AppConfig) -> anyhow::Result<Arc<SerpClient>> {
    let client = SerpClient::from_config(config, SurfaceLimiters::from_config(config))?;
    Ok(Arc::new(client))
}

fn refresh_scheduler(
    config: &AppConfig,
    pool: &sqlx::PgPool,
) -> anyhow::Result<RefreshScheduler> {
    Ok(RefreshScheduler::from_app_config(
        config,
        Arc::new(PgStore::new(pool.clone())),
        serp_client(config)?,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = kwrank_core::load_app_config()?;
    init_tracing(&config)?;

    let pool = connect(&config).await?;

    match cli.command {
        Commands::Migrate => {
            let applied = kwrank_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Track {
            app,
            keyword,
            platform,
            region,
        } => keywords::run_track(&pool, &app, &keyword, platform, &region).await?,
        Commands::Untrack { id } => keywords::run_untrack(&pool, id).await?,
        Commands::Keywords { all } => keywords::run_list(&pool, !all).await?,
        Commands::Enqueue => queue::run_enqueue(&refresh_scheduler(&config, &pool)?).await?,
        Commands::Refresh { ids } => {
            queue::run_refresh(&refresh_scheduler(&config, &pool)?, &ids).await?;
        }
        Commands::Work { drain } => {
            queue::run_work(&refresh_scheduler(&config, &pool)?, drain).await?;
        }
        Commands::Discover {
            app,
            platform,
            region,
            name,
            subtitle,
            description,
            category,
            max_candidates,
            track,
            json,
        } => {
            let request = discover::DiscoverArgs {
                app_id: app,
                platform,
                region,
                name,
                subtitle,
                description,
                category,
                max_candidates,
                track,
                json,
            };
            discover::run_discover(&config, &pool, serp_client(&config)?.as_ref(), request)
                .await?;
        }
        Commands::History { id, days } => keywords::run_history(&pool, id, days).await?,
    }

    Ok(())
}
