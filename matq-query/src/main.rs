use std::path::Path;

use clap::Parser;
use matq_core::config::SeedFact;
use matq_core::MatqConfig;
use tracing_subscriber::{fmt, EnvFilter};

use matq_query::pipeline;

const DEFAULT_CONFIG: &str = "matq.toml";

/// Exit code for failures worth retrying later (EX_TEMPFAIL).
const EXIT_TRANSIENT: i32 = 75;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// PDF to extract tables from (overrides `document.path`)
    #[arg(short, long)]
    document: Option<String>,

    /// Question to answer (overrides `query.text`)
    #[arg(short, long)]
    query: Option<String>,

    /// Extra fact for the fact store, as NAME=VALUE
    #[arg(long = "fact", value_parser = parse_fact)]
    facts: Vec<SeedFact>,

    /// Print the full resolution as JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    health: bool,
}

fn parse_fact(raw: &str) -> Result<SeedFact, String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("fact name is empty in '{raw}'"));
    }
    Ok(SeedFact {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

fn exit_code(transient: bool) -> i32 {
    if transient {
        EXIT_TRANSIENT
    } else {
        1
    }
}

fn load_config(path: &str) -> Result<MatqConfig, config::ConfigError> {
    // The default config file is optional; an explicit one is not.
    if path == DEFAULT_CONFIG && !Path::new(path).exists() {
        return Ok(MatqConfig::default());
    }
    MatqConfig::load(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Some(document) = args.document {
        config.document.path = document;
    }
    if let Some(query) = args.query {
        config.query.text = query;
    }
    config.facts.seed.extend(args.facts);

    if args.health {
        return health(&config).await;
    }

    let resolver = match pipeline::bootstrap(&config).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(transient = e.is_transient(), "Startup failed: {}", e);
            eprintln!("Startup failed: {}", e);
            std::process::exit(exit_code(e.is_transient()));
        }
    };

    match resolver.resolve(&config.query.text).await {
        Ok(resolution) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                println!("{}", resolution.text);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(transient = e.is_transient(), "Query failed: {}", e);
            eprintln!("Query failed: {}", e);
            std::process::exit(exit_code(e.is_transient()));
        }
    }
}

async fn health(config: &MatqConfig) -> anyhow::Result<()> {
    let tabular = matq_core::db::create_tabular_pool(&config.tabular.url).await;
    match tabular {
        Ok(pool) => match matq_core::db::tabular_version(&pool).await {
            Ok(v) => println!("✅ SQLite tabular store: {}", v),
            Err(e) => {
                println!("❌ SQLite check failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            println!("❌ SQLite connection failed: {}", e);
            std::process::exit(1);
        }
    }

    if config.facts.backend == "postgres" {
        let pool = match matq_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        };
        match matq_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL check failed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("✅ Fact store: {} (in-process)", config.facts.backend);
    }

    println!("✅ matq health check passed");
    Ok(())
}
