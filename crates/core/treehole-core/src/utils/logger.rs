//! Logging utilities
//!
//! `init_logging` installs the stderr subscriber. With relaying enabled it also
//! installs a layer that queues sanitized `INFO`+ events; a [`LogRelay`] drains
//! that queue to the backend's client log endpoint.

use crate::api::{ApiClient, ClientLogRecord};
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Path of the client log endpoint
pub const CLIENT_LOG_PATH: &str = "/api/client_log";

/// Replacement for messages that mention conversation content
pub const REDACTED: &str = "[redacted-sensitive-log]";

/// Relayed messages are cut to this many characters
pub const MAX_MESSAGE_CHARS: usize = 600;

/// Pause between relay flushes
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

const BLOCKED_KEYWORDS: &[&str] = &["zybtrackerstatisticsaction", "chrome.devtools", "favicon"];
const SENSITIVE_KEYWORDS: &[&str] = &["prompt", "system prompt", "chat_history", "messages", "content"];

// The relay's own HTTP traffic must not feed back into the relay.
const SILENT_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls", "treehole_core::api", "treehole_core::utils::logger"];

static RELAY_TX: OnceCell<mpsc::UnboundedSender<RelayedEvent>> = OnceCell::new();

/// Event captured by the relay layer, before session context is attached
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedEvent {
    /// Lowercase level name
    pub level: String,
    /// Sanitized message
    pub message: String,
    /// Capture time, event target, source file and line
    pub extra: HashMap<String, Value>,
}

/// Receiving end of the relay queue
pub type RelayQueue = mpsc::UnboundedReceiver<RelayedEvent>;

/// Apply the relay's content rules
///
/// Returns `None` for messages that must not leave the process at all.
pub fn sanitize_message(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    if message.is_empty() || BLOCKED_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }
    if SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Some(REDACTED.to_string());
    }
    Some(message.chars().take(MAX_MESSAGE_CHARS).collect())
}

struct RelayLayer {
    tx: mpsc::UnboundedSender<RelayedEvent>,
}

impl<S> Layer<S> for RelayLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        use tracing::field::{Field, Visit};
        struct MsgVisitor {
            msg: String,
        }
        impl Visit for MsgVisitor {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.msg = format!("{:?}", value);
                }
            }
            fn record_str(&mut self, field: &Field, value: &str) {
                if field.name() == "message" {
                    self.msg = value.to_string();
                }
            }
        }

        let meta = event.metadata();
        if *meta.level() > Level::INFO
            || SILENT_TARGETS.iter().any(|t| meta.target().starts_with(t))
        {
            return;
        }

        let mut visitor = MsgVisitor { msg: String::new() };
        event.record(&mut visitor);
        let Some(message) = sanitize_message(&visitor.msg) else {
            return;
        };

        let mut extra = HashMap::new();
        extra.insert("time".to_string(), Value::from(chrono::Utc::now().to_rfc3339()));
        extra.insert("target".to_string(), Value::from(meta.target()));
        if let Some(file) = meta.file() {
            extra.insert("file".to_string(), Value::from(file));
        }
        if let Some(line) = meta.line() {
            extra.insert("line".to_string(), Value::from(line));
        }

        let _ = self.tx.send(RelayedEvent {
            level: meta.level().as_str().to_ascii_lowercase(),
            message,
            extra,
        });
    }
}

/// Initialize the global logging system
///
/// `RUST_LOG` wins over `level`. Returns the relay queue when `relay` is set
/// and this call installed the relay layer.
pub fn init_logging(level: &str, relay: bool) -> Option<RelayQueue> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (relay_layer, queue) = if relay && RELAY_TX.get().is_none() {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = RELAY_TX.set(tx.clone());
        (Some(RelayLayer { tx }), Some(rx))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(relay_layer)
        .try_init()
        .is_ok();

    if installed {
        queue
    } else {
        None
    }
}

/// Destination for relayed log records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one record
    async fn send(&self, record: ClientLogRecord) -> Result<()>;
}

/// Sink posting to the backend's client log endpoint
pub struct HttpLogSink {
    api: ApiClient,
}

impl HttpLogSink {
    /// Create a sink on top of an API client
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn send(&self, record: ClientLogRecord) -> Result<()> {
        let _: Value = self.api.post_json(CLIENT_LOG_PATH, &record).await?;
        Ok(())
    }
}

/// Session fields attached to each relayed record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayContext {
    /// Where the records come from
    pub page: String,
    /// Current identity
    pub user_id: Option<String>,
    /// Current character
    pub character_id: Option<String>,
}

/// Drains the relay queue to a [`LogSink`]
pub struct LogRelay {
    queue: RelayQueue,
    sink: Arc<dyn LogSink>,
    context: Arc<RwLock<RelayContext>>,
    interval: Duration,
}

impl LogRelay {
    /// Create a relay flushing every [`FLUSH_INTERVAL`]
    pub fn new(queue: RelayQueue, sink: Arc<dyn LogSink>, page: impl Into<String>) -> Self {
        Self {
            queue,
            sink,
            context: Arc::new(RwLock::new(RelayContext {
                page: page.into(),
                ..RelayContext::default()
            })),
            interval: FLUSH_INTERVAL,
        }
    }

    /// Override the flush interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Shared handle for updating the session fields after startup
    pub fn context(&self) -> Arc<RwLock<RelayContext>> {
        self.context.clone()
    }

    /// Send everything queued so far; returns how many records were delivered
    pub async fn flush(&mut self) -> usize {
        let mut batch = Vec::new();
        while let Ok(event) = self.queue.try_recv() {
            batch.push(event);
        }
        if batch.is_empty() {
            return 0;
        }

        let context = match self.context.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut delivered = 0;
        for event in batch {
            let record = ClientLogRecord {
                level: event.level,
                message: event.message,
                page: context.page.clone(),
                user_id: context.user_id.clone(),
                character_id: context.character_id.clone(),
                extra: event.extra,
            };
            match self.sink.send(record).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(error = %e, "Dropping client log record"),
            }
        }
        delivered
    }

    /// Flush on every tick until `shutdown`, then flush once more
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
        self.flush().await;
    }
}

/// Logger wrapper for namespaced logging
#[derive(Clone)]
pub struct Logger {
    namespace: String,
}

impl Logger {
    /// Create a new logger with a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Log an info message
    pub fn info(&self, message: &str) {
        info!("[{}] {}", self.namespace, message);
    }

    /// Log a debug message
    pub fn debug(&self, message: &str) {
        debug!("[{}] {}", self.namespace, message);
    }

    /// Log a warning message
    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.namespace, message);
    }

    /// Log an error message
    pub fn error(&self, message: &str) {
        error!("[{}] {}", self.namespace, message);
    }
}
