//! Tokio-backed content loader.
//!
//! Each submitted request is spawned as its own task on the runtime. The
//! task races the content source's future against the request's
//! cancellation token and pushes the result onto an unbounded channel that
//! [`TokioLoader::poll`] drains synchronously — the orchestrator tick
//! never waits on the runtime.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ContentLoader, ContentSource, LoadCompletion, LoadOutcome, LoadRequest, RequestId};

/// Production [`ContentLoader`] running loads on a tokio runtime.
pub struct TokioLoader {
    source: Arc<dyn ContentSource>,
    runtime: tokio::runtime::Handle,
    completion_tx: mpsc::UnboundedSender<LoadCompletion>,
    completion_rx: mpsc::UnboundedReceiver<LoadCompletion>,
    /// Cancellation tokens of in-flight requests. Shared with the spawned
    /// tasks, which remove their own entry on completion.
    tokens: Arc<DashMap<RequestId, CancellationToken>>,
}

impl TokioLoader {
    /// Creates a loader that spawns onto `runtime`.
    pub fn new(source: Arc<dyn ContentSource>, runtime: tokio::runtime::Handle) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            source,
            runtime,
            completion_tx,
            completion_rx,
            tokens: Arc::new(DashMap::new()),
        }
    }

    /// Creates a loader on the current runtime. Panics outside a runtime
    /// context, like [`tokio::runtime::Handle::current`].
    pub fn on_current_runtime(source: Arc<dyn ContentSource>) -> Self {
        Self::new(source, tokio::runtime::Handle::current())
    }
}

impl ContentLoader for TokioLoader {
    fn submit(&mut self, request: LoadRequest) {
        let token = CancellationToken::new();
        self.tokens.insert(request.id, token.clone());

        let source = Arc::clone(&self.source);
        let tokens = Arc::clone(&self.tokens);
        let tx = self.completion_tx.clone();

        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => LoadOutcome::Cancelled,
                outcome = source.load(request, token.clone()) => outcome,
            };
            tokens.remove(&request.id);
            // The receiver only closes when the loader is dropped; a send
            // failure then just discards a completion nobody wants.
            let _ = tx.send(LoadCompletion { request, outcome });
        });
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some(entry) = self.tokens.get(&id) {
            debug!(request = %id, "cancelling in-flight load");
            entry.value().cancel();
        }
    }

    fn poll(&mut self) -> Vec<LoadCompletion> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            completions.push(completion);
        }
        completions
    }

    fn in_flight(&self) -> usize {
        self.tokens.len()
    }
}
