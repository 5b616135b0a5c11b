//! querydeck - Request performance layer for document store APIs

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use querydeck_core::cache::generate_key;
use querydeck_core::store::seed_demo;
use querydeck_core::{
    analyze, build_plan, provision_required, DeckConfig, IndexCatalog, MemoryStore,
    MetricRegistry, QueryService, RawQuery, TtlCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "querydeck=info,querydeck_core=info,querydeck_web=info";

#[derive(Parser)]
#[command(
    name = "querydeck",
    version,
    about = "Request performance layer for document store APIs",
    long_about = "Query planning, TTL result caching, latency metrics, index provisioning\n\
                  and response shaping for a list API over a document store.\n\
                  \n\
                  Examples:\n\
                    querydeck plan --student-id abc123 --page 2 --limit 15 --sort-by title --sort-order asc\n\
                    querydeck indexes --collection users\n\
                    querydeck provision --activities 500\n\
                    querydeck serve --port 8080\n\
                    querydeck bench-cache --keys 5000\n\
                  \n\
                  Environment Variables:\n\
                    QUERYDECK_CONFIG                 # Configuration file (JSON)\n\
                    QUERYDECK_PORT                   # Web server port\n\
                    RUST_LOG                         # Log filter (default: querydeck=info)"
)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Configuration file (default: <config dir>/querydeck/config.json)
    #[arg(long, env = "QUERYDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "QUERYDECK_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Print the plan and cache key built from query parameters
    Plan {
        #[arg(long, default_value = "activities")]
        collection: String,
        #[arg(long)]
        student_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// RFC 3339 or YYYY-MM-DD
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        page: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        sort_order: Option<String>,
    },
    /// List the required index catalog
    Indexes {
        /// Only this collection
        #[arg(long)]
        collection: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Seed an in-memory store, provision indexes and print storage figures
    Provision {
        #[arg(long, default_value = "50")]
        students: usize,
        #[arg(long, default_value = "1000")]
        activities: usize,
    },
    /// Run the HTTP API over a seeded in-memory store
    Serve {
        /// Port for web server
        #[arg(long, env = "QUERYDECK_PORT", default_value = "3333")]
        port: u16,
        #[arg(long, default_value = "50")]
        students: usize,
        #[arg(long, default_value = "1000")]
        activities: usize,
    },
    /// Time cache writes and reads with the configured policy
    BenchCache {
        /// Distinct keys to write
        #[arg(long, default_value = "2000")]
        keys: usize,
        /// Read passes over the key space
        #[arg(long, default_value = "5")]
        rounds: usize,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .or_else(|| dirs::config_dir().map(|d| d.join("querydeck").join("config.json")));
    let config = match &config_path {
        Some(path) if path.exists() => DeckConfig::load(path),
        _ => DeckConfig::default(),
    };
    let no_color = cli.no_color;

    match cli.mode {
        Mode::Plan {
            collection,
            student_id,
            status,
            category,
            start_date,
            end_date,
            search,
            page,
            limit,
            sort_by,
            sort_order,
        } => {
            let raw = RawQuery {
                student_id,
                status,
                category,
                start_date,
                end_date,
                search,
                page,
                limit,
                sort_by,
                sort_order,
            };
            let plan = build_plan(&raw);
            let key = generate_key(&collection, plan.cache_params());
            println!("{}", cli::format_plan(&plan, &key));
        }
        Mode::Indexes { collection, json } => {
            let indexes = match collection {
                Some(c) => IndexCatalog::for_collection(&c),
                None => IndexCatalog::required_indexes(),
            };
            println!("{}", cli::format_indexes(&indexes, json, no_color));
        }
        Mode::Provision {
            students,
            activities,
        } => {
            let store = seeded_store(&config, students, activities)?;
            let report = provision_required(&store);
            println!("{}", cli::format_provision(&report, no_color));

            let storage = analyze(&store, &IndexCatalog::collections())
                .context("Storage analysis failed")?;
            println!("{}", cli::format_storage(&storage, no_color));
        }
        Mode::Serve {
            port,
            students,
            activities,
        } => {
            let store = Arc::new(seeded_store(&config, students, activities)?);
            let report = provision_required(store.as_ref());
            if !report.is_complete() {
                eprintln!("{}", cli::format_provision(&report, no_color));
            }

            let service = Arc::new(QueryService::from_config(store, &config));
            querydeck_web::run(service, port).await?;
        }
        Mode::BenchCache { keys, rounds } => {
            run_bench_cache(&config, keys, rounds, no_color);
        }
        Mode::Config { write } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?
            );
            if write {
                let path = config_path.context("Could not determine configuration directory")?;
                config.save(&path)?;
                println!("Configuration written to {}", path.display());
            }
        }
    }

    Ok(())
}

fn seeded_store(config: &DeckConfig, students: usize, activities: usize) -> Result<MemoryStore> {
    let store = MemoryStore::connect(config.pool.clone()).context("Invalid pool configuration")?;
    let summary = seed_demo(&store, students, activities);
    info!(
        users = summary.users,
        activities = summary.activities,
        approvals = summary.approvals,
        portfolios = summary.portfolios,
        "Demo data seeded"
    );
    Ok(store)
}

fn run_bench_cache(config: &DeckConfig, keys: usize, rounds: usize, no_color: bool) {
    let cache: TtlCache<u64> = TtlCache::from_config(&config.cache);
    let metrics = MetricRegistry::new();

    for i in 0..keys {
        let token = metrics.start_scoped("cache.set");
        cache.set(generate_key("bench", [("i", i)]), i as u64);
        cache.maintain();
        metrics.end_scoped(&token);
    }

    for _ in 0..rounds {
        for i in 0..keys {
            let token = metrics.start_scoped("cache.get");
            let _ = cache.get(&generate_key("bench", [("i", i)]));
            metrics.end_scoped(&token);
        }
    }

    let snapshot = metrics.snapshot();
    let total_ms: f64 = snapshot.values().map(|s| s.total).sum();
    println!("{}", cli::format_metrics(&snapshot, &cache.stats(), no_color));
    println!(
        "Elapsed in cache calls: {:?}",
        Duration::from_secs_f64(total_ms / 1000.0)
    );
}
