use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

use kbase::config::{Config, ROOT_PASSWORD_ENV};
use kbase::storage::{Database, DatabaseError};

/// Used only when neither the environment nor the config file sets one.
const FALLBACK_ROOT_PASSWORD: &str = "ChangeMe-kbase-root!";

/// Get the config directory path (~/.config/kbase/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("kbase"))
}

#[derive(Parser, Debug)]
#[command(name = "kbase", about = "Knowledge-base database maintenance")]
struct Args {
    /// Config file (default: ~/.config/kbase/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Create the schema and seed default taxonomy and the root user
    #[arg(long)]
    init: bool,

    /// Delete expired recently-viewed entries once
    #[arg(long)]
    cleanup: bool,

    /// Keep deleting expired recently-viewed entries until Ctrl-C
    #[arg(long)]
    sweep: bool,

    /// Print article statistics as JSON
    #[arg(long)]
    stats: bool,

    /// Search articles and print matches as JSON
    #[arg(long, value_name = "TERM")]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access: the database holds password hashes
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(?config, "Effective configuration");

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path(&config_dir));

    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database is locked by another process. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    if args.init {
        init(&db, &config).await?;
    }

    if args.cleanup {
        let deleted = db
            .cleanup_expired_views()
            .await
            .context("Failed to clean up recently viewed entries")?;
        println!("Removed {} expired recently-viewed entries", deleted);
    }

    if args.stats {
        let stats = db.stats().await.context("Failed to compute statistics")?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if let Some(term) = &args.search {
        let results = db.search_articles(term).await.context("Search failed")?;
        let summary: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.article.id,
                    "title": r.article.title,
                    "matchField": r.match_field,
                    "snippet": r.snippet,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if args.sweep {
        run_sweep(&db, config.retention_sweep_minutes).await?;
    }

    db.close().await;
    Ok(())
}

/// Create the schema, seed default taxonomy and ensure the root account.
async fn init(db: &Database, config: &Config) -> Result<()> {
    db.ensure_schema().await.context("Failed to apply schema")?;

    let report = db
        .seed_default_data()
        .await
        .context("Failed to seed default data")?;
    println!(
        "Seeded {} categories, {} departments, {} priorities",
        report.categories, report.departments, report.priorities
    );

    let password = config.root_initial_password().unwrap_or_else(|| {
        tracing::warn!(
            env = ROOT_PASSWORD_ENV,
            "No initial root password configured, using the built-in default"
        );
        SecretString::from(FALLBACK_ROOT_PASSWORD.to_string())
    });

    let created = db
        .seed_root_user(&config.root_email, &password)
        .await
        .context("Failed to seed root user")?;
    if created {
        println!("Root user created: {}", config.root_email);
        println!("IMPORTANT: Change the initial password after first login.");
    } else {
        println!("Root user privileges confirmed: {}", config.root_email);
    }
    Ok(())
}

/// Run the global expiry sweep every `minutes` until Ctrl-C.
async fn run_sweep(db: &Database, minutes: u64) -> Result<()> {
    if minutes == 0 {
        anyhow::bail!("retention_sweep_minutes is 0; the periodic sweep is disabled");
    }

    let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!(minutes, "Recently viewed sweep started");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = db.cleanup_expired_views().await {
                    tracing::warn!(error = %e, "Recently viewed sweep failed");
                }
            }
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Recently viewed sweep stopped");
                return Ok(());
            }
        }
    }
}
