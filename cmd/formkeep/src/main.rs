//! # formkeep
//!
//! Assembles the services over the configured store and exposes them as a
//! small command line tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use configs::{LogFormat, LogSettings, Settings, StorageBackend};
use domains::{
    FieldDefinition, FormId, FormRepository, ProposedField, ResponseId, ResponseRepository, UserId,
};
use prometheus_client::registry::Registry;
use serde::Serialize;
use services::{
    find_version_break, BatchFieldEditor, EditorMetrics, FieldLimits, FormService, ResponseBinder,
    ResponseService, VersionHistoryService,
};
use storage_adapters::InMemoryFormStore;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod demo;

#[derive(Parser)]
#[command(name = "formkeep")]
#[command(version)]
#[command(about = "Versioned form schemas with response binding", long_about = None)]
struct Cli {
    /// TOML configuration file; a missing file is ignored
    #[arg(long, short, env = "FORMKEEP_CONFIG", default_value = configs::DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether replacing EXISTING with INCOMING opens a new form version
    Check {
        /// JSON array of live field definitions
        existing: PathBuf,
        /// JSON array of proposed fields
        incoming: PathBuf,
    },
    /// Replace a form's fields with the proposed list in FILE
    Apply {
        #[arg(long)]
        form: Uuid,
        #[arg(long)]
        actor: Uuid,
        file: PathBuf,
    },
    /// Show the superseded versions of a form
    History {
        #[arg(long)]
        form: Uuid,
        #[arg(long)]
        actor: Uuid,
    },
    /// Print a response bound to the fields of the version it was collected under
    View {
        #[arg(long)]
        response: Uuid,
        #[arg(long)]
        actor: Uuid,
    },
    /// Walk a form through creation, answers and a breaking edit
    Demo,
}

/// Services wired over one store.
pub(crate) struct App {
    pub forms: FormService,
    pub editor: BatchFieldEditor,
    pub responses: ResponseService,
    pub history: VersionHistoryService,
    pub registry: Registry,
    pub retry_attempts: u32,
}

impl App {
    fn new(
        forms: Arc<dyn FormRepository>,
        responses: Arc<dyn ResponseRepository>,
        settings: &Settings,
    ) -> Self {
        let mut registry = Registry::default();
        let metrics = EditorMetrics::register(&mut registry);
        let limits = FieldLimits {
            max_fields_per_form: settings.limits.max_fields_per_form,
            max_options_per_field: settings.limits.max_options_per_field,
            max_label_len: settings.limits.max_label_len,
        };
        let binder = Arc::new(ResponseBinder::new(forms.clone(), metrics.clone()));
        Self {
            editor: BatchFieldEditor::new(forms.clone(), limits, metrics),
            responses: ResponseService::new(forms.clone(), responses, binder),
            history: VersionHistoryService::new(forms.clone()),
            forms: FormService::new(forms),
            registry,
            retry_attempts: settings.limits.edit_retry_attempts,
        }
    }
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn open_app(settings: &Settings) -> Result<App> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory store");
            let store = Arc::new(InMemoryFormStore::new());
            Ok(App::new(store.clone(), store, settings))
        }
        #[cfg(feature = "db-postgres")]
        StorageBackend::Postgres => {
            use secrecy::ExposeSecret;

            let url = settings
                .storage
                .database_url
                .as_ref()
                .context("storage.database_url is not set")?;
            let store = storage_adapters::PgFormStore::connect(
                url.expose_secret(),
                settings.storage.max_connections,
            )
            .await?;
            store.migrate().await?;
            info!(max_connections = settings.storage.max_connections, "using postgres store");
            let store = Arc::new(store);
            Ok(App::new(store.clone(), store, settings))
        }
        #[cfg(not(feature = "db-postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("this build does not include the db-postgres feature")
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)?;
    init_tracing(&settings.log);

    match cli.command {
        Command::Check { existing, incoming } => {
            let existing: Vec<FieldDefinition> = read_json(&existing)?;
            let incoming: Vec<ProposedField> = read_json(&incoming)?;
            match find_version_break(&existing, &incoming) {
                Some(reason) => println!("new version required: {reason}"),
                None => println!("compatible: version unchanged"),
            }
        }
        Command::Apply { form, actor, file } => {
            let app = open_app(&settings).await?;
            let proposed: Vec<ProposedField> = read_json(&file)?;
            let outcome = app
                .editor
                .save_with_retry(UserId(actor), FormId(form), proposed, None, app.retry_attempts)
                .await?;
            print_json(&outcome)?;
        }
        Command::History { form, actor } => {
            let app = open_app(&settings).await?;
            let history = app.history.history(FormId(form), UserId(actor)).await?;
            print_json(&history)?;
        }
        Command::View { response, actor } => {
            let app = open_app(&settings).await?;
            let view = app
                .responses
                .view(ResponseId(response), UserId(actor))
                .await?;
            print_json(&view)?;
        }
        Command::Demo => {
            let app = open_app(&settings).await?;
            demo::run(&app).await?;
        }
    }
    Ok(())
}
