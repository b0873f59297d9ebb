//! Terminal chat against a Treehole backend
//!
//! Resolves the signed-in user's profile, restores the conversation with the
//! selected character and hands the terminal over to the chat loop.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use treehole_adaptor_terminal::{TerminalAdaptor, TerminalConfig};
use treehole_core::utils::logger::{init_logging, HttpLogSink, LogRelay};
use treehole_core::voice::TtsOptions;
use treehole_core::{
    load_env, load_env_from_path, load_history, start_session, ApiClient, ChatSession,
    ClientConfig, FavorabilityStore,
};

#[derive(Parser, Debug)]
#[command(name = "treehole-chat", about = "Chat with a Treehole character in the terminal")]
struct Cli {
    /// Load variables from this file instead of the nearest .env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Backend origin, e.g. http://127.0.0.1:8000
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token for the signed-in user
    #[arg(long, env = "TREEHOLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Character to talk to
    #[arg(long)]
    character: Option<String>,

    #[arg(long)]
    log_level: Option<String>,

    /// Forward log records to the backend's client log
    #[arg(long)]
    log_relay: bool,

    /// Show the analyzed mood after each reply
    #[arg(long)]
    emotion: bool,

    /// File holding favorability per user and character
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Directory for audio written by /speak
    #[arg(long, default_value = ".")]
    audio_dir: PathBuf,
}

#[tokio::main]
async fn main() -> treehole_core::Result<()> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => load_env_from_path(path)?,
        None => load_env()?,
    }

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url)?;
    }
    if cli.token.is_some() {
        config.token = cli.token.clone();
    }
    if cli.character.is_some() {
        config.character_id = cli.character.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.log_relay |= cli.log_relay;
    if cli.state_file.is_some() {
        config.state_file = cli.state_file.clone();
    }

    let relay_queue = init_logging(&config.log_level, config.log_relay);
    let api = ApiClient::new(&config)?;

    let shutdown = CancellationToken::new();
    let relay = relay_queue.map(|queue| {
        let relay = LogRelay::new(queue, Arc::new(HttpLogSink::new(api.clone())), "terminal");
        let context = relay.context();
        let handle = tokio::spawn(relay.run(shutdown.clone()));
        (context, handle)
    });

    let mut ctx = start_session(&api, config.character_id.clone()).await?;
    if let Some(path) = &config.state_file {
        match FavorabilityStore::open(path) {
            Ok(store) => {
                ctx.favorability = store.get(&ctx.user_id, ctx.character_id.as_deref());
            }
            Err(e) => warn!("Ignoring favorability in {}: {}", path.display(), e),
        }
    }
    if let Some((context, _)) = &relay {
        if let Ok(mut fields) = context.write() {
            fields.user_id = Some(ctx.user_id.clone());
            fields.character_id = ctx.character_id.clone();
        }
    }

    let mut chat = ChatSession::new(Arc::new(api.clone()));
    match load_history(&api, &ctx).await {
        Ok(turns) => {
            let restored = chat.restore_history(turns);
            info!(restored, "Conversation restored");
        }
        Err(e) => warn!("Starting without history: {}", e),
    }

    let terminal = TerminalConfig {
        analyze_emotion: cli.emotion,
        audio_dir: cli.audio_dir.clone(),
        ..TerminalConfig::default()
    };
    let mut adaptor = TerminalAdaptor::new(terminal, api, ctx, chat)
        .with_tts_options(TtsOptions::from_config(&config));
    let result = adaptor.start().await;

    shutdown.cancel();
    if let Some((_, handle)) = relay {
        let _ = handle.await;
    }

    // A pending blocking stdin read keeps the runtime from shutting down
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1)
        }
    }
}
