//! Pulsewire CLI - runs the push-notification client in a terminal.
//!
//! This is the main binary entry point. See the `pulsewire` library for
//! the core functionality: the binary wires a [`NotificationStore`] to a
//! minimal terminal presenter, starts the [`PushClient`], and tears both
//! down on ctrl-c.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use pulsewire::{Config, NotificationStore, PushClient};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "pulsewire", version, about = "Resilient push-notification client")]
struct Args {
    /// Push endpoint URL (overrides config file and PULSEWIRE_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Bearer token appended to the channel URL (overrides PULSEWIRE_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Disable automatic reconnection after a lost connection
    #[arg(long)]
    no_reconnect: bool,

    /// Suppress per-notification output (lifecycle logs still emitted)
    #[arg(long)]
    quiet: bool,
}

/// Prints notifications as they first appear in the store.
///
/// The store hands every observer a full snapshot; the presenter tracks
/// which ids it has already printed so each notification is announced
/// once, and forgets ids once their items leave the store.
fn attach_presenter(store: &NotificationStore) {
    let seen = Mutex::new(HashSet::<String>::new());
    store.subscribe(move |items| {
        let mut seen = seen.lock().expect("presenter state mutex poisoned");
        for item in items {
            if seen.insert(item.id.clone()) {
                match (&item.title, item.link()) {
                    (Some(title), Some(link)) => {
                        println!("[{}] {}: {} ({})", item.kind, title, item.message, link);
                    }
                    (Some(title), None) => {
                        println!("[{}] {}: {}", item.kind, title, item.message);
                    }
                    (None, Some(link)) => {
                        println!("[{}] {} ({})", item.kind, item.message, link);
                    }
                    (None, None) => {
                        println!("[{}] {}", item.kind, item.message);
                    }
                }
            }
        }
        seen.retain(|id| items.iter().any(|item| item.id == *id));
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
    }
    if let Some(token) = args.token {
        config.token = token;
    }
    if args.no_reconnect {
        config.auto_reconnect = false;
    }

    let store = NotificationStore::new();
    if !args.quiet {
        attach_presenter(&store);
    }

    let client = PushClient::new(&config, store.clone());
    client.connect();
    log::info!(
        "Pulsewire v{} started ({})",
        env!("CARGO_PKG_VERSION"),
        if config.has_token() {
            "token configured"
        } else {
            "anonymous"
        }
    );

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down...");
    client.disconnect().await;
    store.clear();

    Ok(())
}
