//! One streaming HTTP request as a message-passing worker.
//!
//! [`open`] returns a handle immediately; the response headers, every body
//! chunk, the end of the body, and any failure arrive later as
//! [`TransportEvent`]s tagged with the request id. Chunks are read only in
//! response to a pull permit, so the session controls the pace.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::stream::url::TransportOption;

/// Identity of one streaming request. Messages from a superseded request
/// are recognized by a non-matching id and dropped by the session.
pub(crate) type RequestId = u64;

/// Basic-auth credentials for the streaming endpoint.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub user: String,
    pub password: SecretString,
}

/// Messages a transport worker emits into the session mailbox.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    /// Response headers arrived.
    Headers {
        id: RequestId,
        status: StatusCode,
        headers: HeaderMap,
    },
    /// One body chunk, sent in response to a pull permit.
    Chunk { id: RequestId, bytes: Bytes },
    /// The response body ended.
    End { id: RequestId },
    /// The request failed to open or errored mid-stream.
    Failed { id: RequestId, error: reqwest::Error },
}

/// Handle to an in-flight streaming request.
#[derive(Debug)]
pub(crate) struct ActiveRequest {
    pub id: RequestId,
    pull: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl ActiveRequest {
    /// Asks the worker for the next body chunk.
    pub fn request_chunk(&self) {
        let _ = self.pull.send(());
    }

    /// Stops the worker. Events it already sent stay in the mailbox and are
    /// dropped there by id.
    pub fn close(self) {
        drop(self.pull);
        self.task.abort();
    }
}

/// Opens a streaming GET and returns its handle without waiting for the
/// response.
pub(crate) fn open<M>(
    http: &Client,
    id: RequestId,
    url: String,
    credentials: &Credentials,
    options: Vec<TransportOption>,
    events: mpsc::UnboundedSender<M>,
) -> ActiveRequest
where
    M: From<TransportEvent> + Send + 'static,
{
    let (pull_tx, pull_rx) = mpsc::unbounded_channel();
    let mut builder = http
        .get(url)
        .basic_auth(&credentials.user, Some(credentials.password.expose_secret()));
    for option in options {
        builder = match option {
            TransportOption::Header(name, value) => builder.header(name, value),
            TransportOption::Timeout(timeout) => builder.timeout(timeout),
        };
    }
    let task = tokio::spawn(run(id, builder, pull_rx, events));
    ActiveRequest {
        id,
        pull: pull_tx,
        task,
    }
}

async fn run<M>(
    id: RequestId,
    builder: reqwest::RequestBuilder,
    mut pull: mpsc::UnboundedReceiver<()>,
    events: mpsc::UnboundedSender<M>,
) where
    M: From<TransportEvent> + Send + 'static,
{
    let mut response = match builder.send().await {
        Ok(response) => response,
        Err(error) => {
            let _ = events.send(TransportEvent::Failed { id, error }.into());
            return;
        }
    };
    let _ = events.send(
        TransportEvent::Headers {
            id,
            status: response.status(),
            headers: response.headers().clone(),
        }
        .into(),
    );
    loop {
        if pull.recv().await.is_none() {
            debug!(event = "stream_request_closed", request = id);
            return;
        }
        match response.chunk().await {
            Ok(Some(bytes)) => {
                if events.send(TransportEvent::Chunk { id, bytes }.into()).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = events.send(TransportEvent::End { id }.into());
                return;
            }
            Err(error) => {
                let _ = events.send(TransportEvent::Failed { id, error }.into());
                return;
            }
        }
    }
}
