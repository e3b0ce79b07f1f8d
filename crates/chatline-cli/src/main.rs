//! Chatline CLI - line-oriented streaming chat.
//!
//! This is the entry point for the `chatline` binary.

mod app;
mod command;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chatline_client::{ChatClient, ClientConfig};
use chatline_core::models::find_model;
use chatline_core::settings::SettingsUpdate;
use chatline_store::{
    ChatStore, FileKv, KeyValueStore, MemoryKv, Persistence, SettingsStore, DEFAULT_QUOTA_BYTES,
};
use clap::{Parser, ValueEnum};
use tokio::io::BufReader;

use app::{App, Services, DEFAULT_SPEECH_FILE};

/// Where sessions and settings are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// One JSON file per record under the data directory.
    File,
    /// Nothing survives the process.
    Memory,
    /// A RocksDB database under the data directory.
    #[cfg(feature = "rocksdb")]
    Rocks,
}

/// Chatline - streaming chat in the terminal.
#[derive(Parser, Debug)]
#[command(name = "chatline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat endpoint base URL. Saved as the endpoint setting when given.
    #[arg(long, env = "CHATLINE_ENDPOINT")]
    endpoint: Option<String>,

    /// Directory holding sessions and settings.
    #[arg(long, env = "CHATLINE_DATA_DIR", default_value = "./.chatline")]
    data_dir: PathBuf,

    /// Storage backend.
    #[arg(long, value_enum, env = "CHATLINE_BACKEND", default_value_t = Backend::File)]
    backend: Backend,

    /// Model to select on startup.
    #[arg(long, env = "CHATLINE_MODEL")]
    model: Option<String>,

    /// Storage quota in bytes.
    #[arg(long, default_value_t = DEFAULT_QUOTA_BYTES)]
    quota_bytes: usize,

    /// File that `/tts` and autoplay write speech to.
    #[arg(long, default_value = DEFAULT_SPEECH_FILE)]
    speech_out: PathBuf,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

fn open_backend(args: &Args) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let quota = Some(args.quota_bytes);
    let kv: Arc<dyn KeyValueStore> = match args.backend {
        Backend::File => Arc::new(
            FileKv::with_quota(&args.data_dir, quota)
                .with_context(|| format!("failed to open {}", args.data_dir.display()))?,
        ),
        Backend::Memory => Arc::new(MemoryKv::with_quota(args.quota_bytes)),
        #[cfg(feature = "rocksdb")]
        Backend::Rocks => {
            let path = args.data_dir.join("db");
            Arc::new(
                chatline_store::RocksKv::open(&path, quota)
                    .with_context(|| format!("failed to open {}", path.display()))?,
            )
        }
    };
    Ok(kv)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    "chatline=debug,chatline_client=debug,chatline_store=debug,warn".into()
                }),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    // Storage
    let persistence = Persistence::new(open_backend(&args)?);
    match persistence.cleanup_corrupted() {
        Ok(removed) if !removed.is_empty() => {
            tracing::warn!(?removed, "Removed corrupted records");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to check stored records"),
    }

    let mut settings = SettingsStore::with_persistence(persistence.clone());
    let mut store = ChatStore::with_persistence(persistence.clone());
    if !settings.is_persisted() || !store.is_persisted() {
        eprintln!("warning: stored data could not be read; changes this run will not be saved");
    }

    if let Some(model) = &args.model {
        if find_model(store.models(), model).is_none() {
            anyhow::bail!("unknown model: {model}");
        }
        store.set_current_model(model);
    }

    // Client
    if let Some(endpoint) = &args.endpoint {
        settings.update(SettingsUpdate {
            api_endpoint: Some(endpoint.trim_end_matches('/').to_string()),
            ..Default::default()
        });
    }
    let endpoint = settings.settings().api_endpoint.clone();
    tracing::info!(
        endpoint = %endpoint,
        backend = ?args.backend,
        data_dir = %args.data_dir.display(),
        "Starting chatline"
    );
    let client = Arc::new(ChatClient::new(ClientConfig::with_endpoint(endpoint))?);
    let services = Services {
        transport: client.clone(),
        speech: client,
    };

    let mut app = App::new(store, settings, Some(persistence), services)
        .with_speech_file(args.speech_out.clone());
    let mut stdout = std::io::stdout();
    app.run(BufReader::new(tokio::io::stdin()), &mut stdout).await?;

    tracing::debug!(sessions = app.store().sessions().len(), "Exiting");
    Ok(())
}
