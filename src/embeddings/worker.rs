//! Embedding worker thread pool.
//!
//! Runs model inference in dedicated threads to avoid blocking the async runtime.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::{Embedder, Modality};
use crate::error::EmbeddingError;
use crate::Result;

/// Input for a single embedding job.
enum Job {
    Image(Vec<u8>),
    Text(String),
}

impl Job {
    const fn modality(&self) -> Modality {
        match self {
            Self::Image(_) => Modality::Image,
            Self::Text(_) => Modality::Text,
        }
    }
}

/// Request to generate one embedding.
struct EmbeddingRequest {
    job: Job,
    /// Channel to send the result.
    response_tx: tokio::sync::oneshot::Sender<Result<Vec<f32>>>,
}

/// Worker pool for embedding generation.
pub struct EmbeddingWorker {
    request_tx: Sender<EmbeddingRequest>,
    capacity: usize,
    num_workers: usize,
    _workers: Vec<std::thread::JoinHandle<()>>,
}

impl EmbeddingWorker {
    /// Create a new embedding worker pool.
    ///
    /// # Arguments
    ///
    /// * `embedder` - Model shared by all workers
    /// * `num_workers` - Number of worker threads
    /// * `capacity` - Maximum number of queued requests
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(embedder: Arc<dyn Embedder>, num_workers: usize, capacity: usize) -> Result<Self> {
        let (request_tx, request_rx) = bounded(capacity);
        let mut workers = Vec::with_capacity(num_workers);

        for i in 0..num_workers {
            let embedder = Arc::clone(&embedder);
            let rx = request_rx.clone();

            let handle = std::thread::Builder::new()
                .name(format!("embedding-worker-{i}"))
                .spawn(move || worker_loop(embedder.as_ref(), &rx))
                .map_err(|e| EmbeddingError::WorkerPool(format!("failed to spawn worker: {e}")))?;

            workers.push(handle);
        }

        tracing::info!(num_workers, capacity, "Embedding worker pool started");

        Ok(Self {
            request_tx,
            capacity,
            num_workers,
            _workers: workers,
        })
    }

    /// Embed an image payload on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or embedding fails.
    pub async fn embed_image(&self, payload: Vec<u8>) -> Result<Vec<f32>> {
        self.submit(Job::Image(payload)).await
    }

    /// Embed a text on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or embedding fails.
    pub async fn embed_text(&self, text: String) -> Result<Vec<f32>> {
        self.submit(Job::Text(text)).await
    }

    /// Number of requests waiting for a worker.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.request_tx.len()
    }

    /// Maximum number of queued requests.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    async fn submit(&self, job: Job) -> Result<Vec<f32>> {
        let (response_tx, response_rx) = tokio::sync::oneshot::channel();
        let request = EmbeddingRequest { job, response_tx };

        // try_send keeps the async runtime from blocking on a full queue.
        self.request_tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => EmbeddingError::Busy {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => {
                EmbeddingError::WorkerPool("worker pool closed".to_string())
            }
        })?;

        response_rx
            .await
            .map_err(|_| EmbeddingError::WorkerPool("worker dropped response".to_string()))?
    }
}

impl std::fmt::Debug for EmbeddingWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingWorker")
            .field("num_workers", &self.num_workers)
            .field("capacity", &self.capacity)
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

/// Worker loop that processes embedding requests until the pool is dropped.
fn worker_loop(embedder: &dyn Embedder, request_rx: &Receiver<EmbeddingRequest>) {
    while let Ok(request) = request_rx.recv() {
        let modality = request.job.modality();
        let span = tracing::debug_span!("embed", %modality);
        let _guard = span.enter();

        // A panicking job fails alone; the thread keeps serving.
        let result = catch_unwind(AssertUnwindSafe(|| match &request.job {
            Job::Image(payload) => embedder.embed_image(payload),
            Job::Text(text) => embedder.embed_text(text),
        }))
        .unwrap_or_else(|_| {
            tracing::error!(%modality, "Embedding panicked");
            Err(EmbeddingError::Runtime("inference panicked".to_string()).into())
        });

        if let Err(e) = &result {
            tracing::debug!(error = %e, "Embedding failed");
        }

        // Receiver may have gone away if the client disconnected.
        let _ = request.response_tx.send(result);
    }

    tracing::debug!("Embedding worker shutting down");
}
