use crate::domain::errors::TransportError;
use crate::domain::ports::{PushRequest, Transport, TransportResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the scripted transport does for one call
#[derive(Debug, Clone)]
pub enum MockReply {
    Status(u16),
    Fail(TransportError),
    /// Never answers; only the caller's timeout ends the attempt
    Hang,
}

/// In-memory `Transport` that replays a script and records every request.
///
/// Once the script runs out, `fallback` is used for every further call.
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: MockReply,
    requests: Arc<Mutex<Vec<PushRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<MockReply>, fallback: MockReply) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accepts every push with `200 OK`
    pub fn accepting() -> Self {
        Self::new(Vec::new(), MockReply::Status(200))
    }

    /// Fails transiently `n` times with connection refused, then accepts
    pub fn failing_then_ok(n: usize) -> Self {
        let script = (0..n)
            .map(|_| MockReply::Fail(TransportError::Connect("connection refused".to_string())))
            .collect();
        Self::new(script, MockReply::Status(200))
    }

    pub fn always(reply: MockReply) -> Self {
        Self::new(Vec::new(), reply)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PushRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.body).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &PushRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            MockReply::Status(status) => Ok(TransportResponse::new(status)),
            MockReply::Fail(e) => Err(e),
            MockReply::Hang => std::future::pending().await,
        }
    }
}
