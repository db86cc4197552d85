//! appcfg CLI
//!
//! Entry point for the `appcfg` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use appcfg::config::DEFAULT_SETTINGS_FILE;
use appcfg::runtime::GeneratedRuntime;
use appcfg::{AppConfigService, LoadOptions, Operation, ResolutionContext, Settings};
use appcfg_store::FileStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appcfg")]
#[command(about = "Multi-tenant app configuration engine", version)]
struct Cli {
    /// Path to settings file (default: appcfg.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Store root directory (overrides settings)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Actor id recorded on store access
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the runtime of an app
    Load {
        app_id: String,

        /// Organization whose override applies
        #[arg(long, short = 'o')]
        org: Option<String>,

        /// Ignore the organization override
        #[arg(long)]
        platform_only: bool,

        /// Omit route permissions
        #[arg(long)]
        no_permissions: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List apps with a platform definition
    Apps {
        #[arg(long, short = 'o')]
        org: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Save an app definition or organization override from a JSON file
    Save {
        app_id: String,

        /// JSON document to store
        file: PathBuf,

        /// Store as this organization's override instead of the platform definition
        #[arg(long, short = 'o')]
        org: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Resolve the component for an operation
    Resolve {
        app_id: String,

        #[arg(long, short = 'o')]
        org: String,

        /// Operation: create, read, update, list
        #[arg(long, default_value = "read")]
        operation: Operation,

        #[arg(long)]
        entity: Option<String>,

        #[arg(long)]
        transaction: Option<String>,

        #[arg(long)]
        screen: Option<String>,

        /// Permissions held by the caller (comma-separated)
        #[arg(long, value_delimiter = ',')]
        permissions: Vec<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Reload and print the runtime whenever its documents change
    Watch {
        app_id: String,

        #[arg(long, short = 'o')]
        org: Option<String>,

        /// Seconds between store scans
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref(), cli.store.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings.log_level);

    let store = Arc::new(FileStore::with_capacity(
        settings.store_root.clone(),
        settings.change_channel_capacity,
    ));
    let service = AppConfigService::from_settings(store.clone(), &settings);

    match cli.command {
        Commands::Load {
            app_id,
            org,
            platform_only,
            no_permissions,
            json,
        } => {
            let mut options = LoadOptions {
                organization_id: org,
                ..Default::default()
            };
            options.resolve_inheritance = !platform_only;
            options.include_permissions = !no_permissions;
            run_load(&service, &app_id, &cli.actor, options, json).await;
        }
        Commands::Apps { org, json } => {
            run_apps(&service, &cli.actor, org.as_deref(), json).await;
        }
        Commands::Save {
            app_id,
            file,
            org,
            json,
        } => {
            run_save(&service, &app_id, &file, &cli.actor, org.as_deref(), json).await;
        }
        Commands::Resolve {
            app_id,
            org,
            operation,
            entity,
            transaction,
            screen,
            permissions,
            json,
        } => {
            let mut ctx = ResolutionContext::new(app_id, org, operation).with_permissions(permissions);
            ctx.entity_type = entity;
            ctx.transaction_type = transaction;
            ctx.screen_type = screen;
            run_resolve(&service, &ctx, json).await;
        }
        Commands::Watch {
            app_id,
            org,
            interval,
            json,
        } => {
            run_watch(&service, &store, &app_id, org.as_deref(), interval, &cli.actor, json).await;
        }
    }
}

fn load_settings(config_path: Option<&Path>, store: Option<&PathBuf>) -> Result<Settings, String> {
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_SETTINGS_FILE));
    let cli_overrides = store.map(|root| serde_json::json!({ "store_root": root }));
    Settings::build(Some(path), cli_overrides).map_err(|e| e.to_string())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn print_runtime(runtime: &GeneratedRuntime) {
    println!("{} {} ({})", runtime.name, runtime.version, runtime.cache_key);
    let chain: Vec<String> = runtime
        .inheritance_chain
        .iter()
        .map(|origin| format!("{:?}", origin).to_lowercase())
        .collect();
    println!("  Layers: {}", chain.join(" -> "));
    println!("  Digest: {}", runtime.config_digest);
    println!();
    println!("  Routes ({}):", runtime.routes.len());
    for route in &runtime.routes {
        let permissions = if route.permissions.is_empty() {
            String::new()
        } else {
            format!(" [{}]", route.permissions.join(", "))
        };
        println!("    {:<40} {}{}", route.path, route.component, permissions);
    }
    if !runtime.entity_configs.is_empty() {
        println!();
        println!("  Entities:");
        for (key, entity) in &runtime.entity_configs {
            println!("    {} ({} fields)", key, entity.fields.len());
        }
    }
    if !runtime.transaction_configs.is_empty() {
        println!();
        println!("  Transactions:");
        for (key, transaction) in &runtime.transaction_configs {
            println!("    {} ({} header fields)", key, transaction.header_fields.len());
        }
    }
}

async fn run_load(service: &AppConfigService, app_id: &str, actor: &str, options: LoadOptions, json: bool) {
    match service.load_app_config(app_id, actor, options).await {
        Ok(runtime) if json => print_json(runtime.as_ref()),
        Ok(runtime) => print_runtime(&runtime),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn run_apps(service: &AppConfigService, actor: &str, org: Option<&str>, json: bool) {
    let apps = service.list_available_apps(actor, org).await;
    if json {
        print_json(&apps);
    } else if apps.is_empty() {
        println!("No apps configured.");
    } else {
        for app in apps {
            println!("{}", app);
        }
    }
}

async fn run_save(
    service: &AppConfigService,
    app_id: &str,
    file: &Path,
    actor: &str,
    org: Option<&str>,
    json: bool,
) {
    let document = match std::fs::read_to_string(file)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).map_err(|e| e.to_string()))
    {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    };

    let outcome = service.save_app_config(app_id, document, actor, org).await;
    if json {
        print_json(&outcome);
    } else if outcome.success {
        let target = org.unwrap_or("platform");
        println!("Saved {} ({})", app_id, target);
    } else {
        eprintln!("Save failed: {}", outcome.error.as_deref().unwrap_or("unknown error"));
    }
    if !outcome.success {
        process::exit(1);
    }
}

async fn run_resolve(service: &AppConfigService, ctx: &ResolutionContext, json: bool) {
    let resolved = service.resolve_component(ctx).await;
    if json {
        print_json(&resolved.report());
        return;
    }
    println!("Component: {}", resolved.component.name());
    println!("  Resolved as: {}", resolved.name);
    println!("  Fallback used: {}", resolved.fallback_used);
    println!("  Path: {}", resolved.path_names().join(" -> "));
}

async fn run_watch(
    service: &AppConfigService,
    store: &FileStore,
    app_id: &str,
    org: Option<&str>,
    interval_secs: u64,
    actor: &str,
    json: bool,
) {
    match service
        .load_app_config(
            app_id,
            actor,
            LoadOptions {
                organization_id: org.map(str::to_string),
                ..Default::default()
            },
        )
        .await
    {
        Ok(runtime) if json => print_json(runtime.as_ref()),
        Ok(runtime) => print_runtime(&runtime),
        Err(e) => eprintln!("Initial load failed: {}", e),
    }

    let subscription = service.subscribe(
        app_id,
        org,
        Arc::new(move |runtime: Arc<GeneratedRuntime>| {
            if json {
                print_json(runtime.as_ref());
            } else {
                println!();
                println!("Configuration changed at {}", runtime.loaded_at.to_rfc3339());
                print_runtime(&runtime);
            }
        }),
    );

    if let Err(e) = store.scan_changes() {
        eprintln!("Error scanning store: {}", e);
        process::exit(1);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if let Err(e) = store.scan_changes() {
                    tracing::warn!(error = %e, "Store scan failed");
                }
            }
        }
    }

    subscription.close();
}
