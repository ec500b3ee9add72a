use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use subsync_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets_from_env, ConfigConsumer, SyncConfig,
    UnusedKeyPolicy,
};
use subsync_errors::{DomainError, ErrorContext, ErrorResponse, DEFAULT_LOCALE};
use subsync_runtime::{ServiceSettings, SubscriptionService};
use subsync_vendor::{HttpVendorGateway, VendorGateway};

#[derive(Parser)]
#[command(name = "subsync")]
#[command(about = "Subscription sync operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Validate a layered config and list keys the consumer never reads
    ConfigCheck {
        #[arg(required = true)]
        paths: Vec<String>,

        #[arg(long, value_enum, default_value_t = Consumer::Daemon)]
        consumer: Consumer,

        /// Exit non-zero when unused keys are present
        #[arg(long, default_value_t = false)]
        fail_unused: bool,
    },

    /// One-shot full sync for an owner against the Postgres store
    Sync {
        #[arg(long)]
        owner: String,

        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Fetch the vendor view for an owner; no store access
    Fetch {
        #[arg(long)]
        owner: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Clone, Copy, ValueEnum)]
enum Consumer {
    Daemon,
    Cli,
}

impl From<Consumer> for ConfigConsumer {
    fn from(c: Consumer) -> Self {
        match c {
            Consumer::Daemon => ConfigConsumer::Daemon,
            Consumer::Cli => ConfigConsumer::Cli,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = subsync_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = subsync_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_subscriptions_table={}",
                        s.ok, s.has_subscriptions_table
                    );
                }
                DbCmd::Migrate => {
                    subsync_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck {
            paths,
            consumer,
            fail_unused,
        } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            loaded.sync_config()?;
            let policy = if fail_unused {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(consumer.into(), &loaded.config_json, policy)?;
            println!("config_hash={}", loaded.config_hash);
            println!("unused_keys={}", report.unused_leaf_pointers.len());
            for p in &report.unused_leaf_pointers {
                println!("unused={p}");
            }
        }

        Commands::Sync {
            owner,
            config_paths,
        } => {
            let cfg = load_config(&config_paths)?;
            let pool = subsync_db::connect_from_env().await?;
            subsync_db::migrate(&pool).await?;
            let svc = SubscriptionService::new(
                Arc::new(subsync_db::PgStore::new(pool)),
                vendor_gateway(&cfg),
                Arc::new(cfg.classifier()?),
                ServiceSettings::from(&cfg),
            );
            match svc.full_sync(&owner).await {
                Ok(res) => {
                    println!("{}", serde_json::to_string_pretty(&res.report)?);
                    println!("subscriptions={}", res.subscriptions.len());
                }
                Err(e) => return Err(client_error(&cfg, &e)),
            }
        }

        Commands::Fetch {
            owner,
            config_paths,
        } => {
            let cfg = load_config(&config_paths)?;
            let vendor = vendor_gateway(&cfg);
            match vendor.fetch(&owner, &[]).await {
                Ok(batch) => {
                    println!("source={} records={}", vendor.source_name(), batch.records.len());
                    for r in &batch.records {
                        println!(
                            "public_id={} vendor_status={} vendor_balance_micros={}",
                            r.public_id,
                            r.vendor_status.as_deref().unwrap_or("-"),
                            r.vendor_balance_micros
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "-".to_string())
                        );
                    }
                    for issue in &batch.issues {
                        println!("issue={issue}");
                    }
                }
                Err(failure) => {
                    let err = cfg
                        .classifier()?
                        .classify(&failure, &ErrorContext::for_customer(owner.as_str()));
                    return Err(client_error(&cfg, &err));
                }
            }
        }
    }

    Ok(())
}

fn load_config(paths: &[String]) -> Result<SyncConfig> {
    let mut cfg = if paths.is_empty() {
        SyncConfig::default()
    } else {
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        let loaded = load_layered_yaml(&path_refs)?;
        let report = report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
        for p in &report.unused_leaf_pointers {
            tracing::warn!(pointer = %p, "config key not used by cli");
        }
        loaded.sync_config()?
    };
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    cfg.validate().context("config invalid after env overrides")?;
    Ok(cfg)
}

/// `ERROR_CODE: rendered message`, as a client of the daemon would see it.
fn client_error(cfg: &SyncConfig, err: &DomainError) -> anyhow::Error {
    let catalog = cfg.catalog().unwrap_or_default();
    let body = ErrorResponse::from_domain(err, &catalog);
    let message = body.messages.get(DEFAULT_LOCALE).cloned().unwrap_or_default();
    anyhow!("{}: {}", body.error_code, message)
}

fn vendor_gateway(cfg: &SyncConfig) -> Arc<dyn VendorGateway> {
    let secrets = resolve_secrets_from_env(cfg);
    Arc::new(HttpVendorGateway::new(
        cfg.vendor.base_url.clone(),
        Duration::from_millis(cfg.vendor.sync_timeout_ms),
        secrets.vendor_api_key,
    ))
}
