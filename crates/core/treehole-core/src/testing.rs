//! Testing utilities
//!
//! [`ScriptedTransport`] replays canned chat responses fragment by fragment so
//! streaming behavior can be exercised without a server.

use crate::api::{ChatStreamRequest, ChatTransport, StreamResponse};
use crate::streaming::FragmentStream;
use crate::{Result, TreeholeError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One canned response
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Response with a body delivered as separate fragments
    Stream {
        /// HTTP status
        status: u16,
        /// Declared content type
        content_type: String,
        /// Body fragments in order
        fragments: Vec<Vec<u8>>,
        /// Fail with this message after the last fragment
        fail_with: Option<String>,
        /// Never finish after the last fragment
        hang: bool,
    },
    /// Response without a body
    NoBody {
        /// HTTP status
        status: u16,
        /// Declared content type
        content_type: String,
    },
    /// The request never produced a response
    ConnectError(String),
}

impl ScriptedReply {
    /// Successful `text/plain` stream of UTF-8 fragments
    pub fn text<'a, I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::bytes(fragments.into_iter().map(|f| f.as_bytes().to_vec()).collect())
    }

    /// Successful `text/plain` stream of raw fragments
    pub fn bytes(fragments: Vec<Vec<u8>>) -> Self {
        ScriptedReply::Stream {
            status: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            fragments,
            fail_with: None,
            hang: false,
        }
    }

    /// Single-fragment response with the given status and content type
    pub fn status(status: u16, content_type: &str, body: &str) -> Self {
        ScriptedReply::Stream {
            status,
            content_type: content_type.to_string(),
            fragments: vec![body.as_bytes().to_vec()],
            fail_with: None,
            hang: false,
        }
    }

    /// Stream that breaks after delivering `fragments`
    pub fn interrupted<'a, I>(fragments: I, error: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        match Self::text(fragments) {
            ScriptedReply::Stream {
                status,
                content_type,
                fragments,
                hang,
                ..
            } => ScriptedReply::Stream {
                status,
                content_type,
                fragments,
                fail_with: Some(error.to_string()),
                hang,
            },
            other => other,
        }
    }

    /// Stream that stalls forever after delivering `fragments`
    pub fn hanging<'a, I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        match Self::text(fragments) {
            ScriptedReply::Stream {
                status,
                content_type,
                fragments,
                fail_with,
                ..
            } => ScriptedReply::Stream {
                status,
                content_type,
                fragments,
                fail_with,
                hang: true,
            },
            other => other,
        }
    }

    fn into_response(self) -> Result<StreamResponse> {
        match self {
            ScriptedReply::Stream {
                status,
                content_type,
                fragments,
                fail_with,
                hang,
            } => {
                let mut items: Vec<Result<Bytes>> =
                    fragments.into_iter().map(|f| Ok(Bytes::from(f))).collect();
                if let Some(msg) = fail_with {
                    items.push(Err(TreeholeError::other(msg)));
                }
                let body: FragmentStream = if hang {
                    stream::iter(items).chain(stream::pending()).boxed()
                } else {
                    stream::iter(items).boxed()
                };
                Ok(StreamResponse {
                    status,
                    content_type,
                    body: Some(body),
                })
            }
            ScriptedReply::NoBody {
                status,
                content_type,
            } => Ok(StreamResponse {
                status,
                content_type,
                body: None,
            }),
            ScriptedReply::ConnectError(msg) => Err(TreeholeError::other(msg)),
        }
    }
}

/// In-memory [`ChatTransport`] that replays replies in order
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatStreamRequest>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTransport {
    /// Transport that answers successive requests with `replies`
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Hold every response until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of requests opened
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatStreamRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_chat_stream(&self, request: &ChatStreamRequest) -> Result<StreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| TreeholeError::other("No scripted reply left"))?;
        reply.into_response()
    }
}
