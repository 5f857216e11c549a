//! Sources of task progress: the push stream and the status endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ensure_success, ClientError};
use crate::snapshot::TaskSnapshot;
use crate::sse::{SseMessage, SseParser};

/// Name of the heartbeat event on the progress stream.
pub const PING_EVENT: &str = "ping";

/// One message from the push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Heartbeat,
    Update(TaskSnapshot),
}

pub type PushStream = BoxStream<'static, Result<PushEvent, ClientError>>;

/// Where a [`crate::TaskWatcher`] gets its progress from.
#[async_trait]
pub trait TaskFeed: Send + Sync {
    /// Open the push stream for a task.
    async fn open(&self, task_id: &str) -> Result<PushStream, ClientError>;

    /// Fetch the current record. `Ok(None)` means the task does not exist.
    async fn fetch(&self, task_id: &str) -> Result<Option<TaskSnapshot>, ClientError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// [`TaskFeed`] over the server's `/api/v1/tasks` routes.
pub struct HttpTaskFeed {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTaskFeed {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing `reqwest::Client` (connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Timeout for status requests. The stream itself has none.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/api/v1/tasks/{task_id}", self.base_url)
    }
}

#[async_trait]
impl TaskFeed for HttpTaskFeed {
    async fn open(&self, task_id: &str) -> Result<PushStream, ClientError> {
        let response = self
            .client
            .get(format!("{}/stream", self.task_url(task_id)))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let task_id = task_id.to_string();
        let mut parser = SseParser::default();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => parser
                    .feed(&bytes)
                    .into_iter()
                    .filter_map(|message| push_event(&task_id, message))
                    .map(Ok)
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(ClientError::Request(e))],
            })
            .flat_map(stream::iter);
        Ok(events.boxed())
    }

    async fn fetch(&self, task_id: &str) -> Result<Option<TaskSnapshot>, ClientError> {
        let response = self
            .client
            .get(self.task_url(task_id))
            .timeout(self.request_timeout)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: DataEnvelope<TaskSnapshot> = ensure_success(response).await?.json().await?;
        Ok(Some(envelope.data))
    }
}

/// Map one SSE message to a push event. Undecodable records are skipped.
fn push_event(task_id: &str, message: SseMessage) -> Option<PushEvent> {
    if message.event.as_deref() == Some(PING_EVENT) {
        return Some(PushEvent::Heartbeat);
    }
    match serde_json::from_str::<TaskSnapshot>(&message.data) {
        Ok(snapshot) => Some(PushEvent::Update(snapshot)),
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "Skipping undecodable progress event");
            None
        }
    }
}
