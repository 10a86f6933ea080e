//! Session startup and control surface.
//!
//! [`TweetStream::start`] validates the start options, spawns the session
//! actor, and reports the handler's `init` outcome before handing back the
//! control handle. The per-method helpers are one-line wrappers around the
//! switch control message.

use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::handler::{StopReason, StreamHandler};
use crate::stream::session::{self, InitOutcome, Msg, SessionConfig};
use crate::stream::transport::Credentials;
use crate::stream::url::{MethodOption, StreamMethod};

/// Production streaming endpoint; per-method paths are appended.
pub const STREAM_ENDPOINT: &str = "https://stream.twitter.com/1/statuses";

/// Options accepted by [`TweetStream::start`].
#[derive(Clone, Debug, Default)]
pub struct StartOptions {
    user: Option<String>,
    password: Option<SecretString>,
    timeout: Option<Duration>,
    debug: bool,
    endpoint: Option<String>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Basic-auth account name. Required.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Basic-auth password. Required.
    pub fn password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    /// Bounds the wait for the handler's `init` during startup.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Logs every session message at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overrides [`STREAM_ENDPOINT`], e.g. for a proxy or a test server.
    pub fn endpoint(mut self, base: impl Into<String>) -> Self {
        self.endpoint = Some(base.into());
        self
    }
}

/// Errors surfaced by [`TweetStream::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("handler declined the session")]
    Ignored,

    #[error("handler stopped during init: {0:?}")]
    InitStop(StopReason),

    #[error("handler panicked during init: {0}")]
    InitPanic(String),

    #[error("timed out waiting for handler init")]
    Timeout,
}

/// Errors surfaced by the control operations of a running session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has terminated")]
    Closed,

    #[error("call timed out")]
    Timeout,
}

/// Handle to a running streaming session.
///
/// Dropping the handle asks the session to terminate with reason `Normal`.
#[derive(Debug)]
pub struct TweetStream {
    commands: mpsc::UnboundedSender<Msg>,
    done: Option<oneshot::Receiver<StopReason>>,
}

impl TweetStream {
    /// Validates `options`, runs `handler.init`, and returns the control
    /// handle once the handler accepted the session. No request is opened
    /// until the first method switch.
    pub async fn start<H: StreamHandler>(
        handler: H,
        options: StartOptions,
    ) -> Result<Self, StartError> {
        let user = options.user.ok_or(StartError::MissingOption("user"))?;
        let password = options.password.ok_or(StartError::MissingOption("password"))?;
        let http = Client::builder().build()?;

        let (commands, mailbox) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        session::spawn(
            handler,
            SessionConfig {
                http,
                credentials: Credentials { user, password },
                endpoint: options
                    .endpoint
                    .unwrap_or_else(|| STREAM_ENDPOINT.to_string()),
                debug: options.debug,
            },
            commands.clone(),
            mailbox,
            ready_tx,
            done_tx,
        );

        let outcome = match options.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, ready_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    // Init is still running; make sure the session winds
                    // down once it finishes.
                    let _ = commands.send(Msg::Stop {
                        reason: StopReason::Normal,
                    });
                    return Err(StartError::Timeout);
                }
            },
            None => ready_rx.await,
        };
        match outcome {
            Ok(Ok(())) => Ok(Self {
                commands,
                done: Some(done_rx),
            }),
            Ok(Err(InitOutcome::Ignored)) => Err(StartError::Ignored),
            Ok(Err(InitOutcome::Stopped(reason))) => Err(StartError::InitStop(reason)),
            Ok(Err(InitOutcome::Panicked(detail))) => Err(StartError::InitPanic(detail)),
            Err(_) => Err(StartError::InitPanic(
                "session task stopped before reporting init".to_string(),
            )),
        }
    }

    /// Switches the stream to the `filter` method.
    pub fn filter(&self, options: Vec<MethodOption>) -> Result<(), SessionError> {
        self.switch(StreamMethod::Filter, options)
    }

    /// Switches the stream to the `firehose` method.
    pub fn firehose(&self, options: Vec<MethodOption>) -> Result<(), SessionError> {
        self.switch(StreamMethod::Firehose, options)
    }

    /// Switches the stream to the `links` method.
    pub fn links(&self, options: Vec<MethodOption>) -> Result<(), SessionError> {
        self.switch(StreamMethod::Links, options)
    }

    /// Switches the stream to the `retweet` method.
    pub fn retweet(&self, options: Vec<MethodOption>) -> Result<(), SessionError> {
        self.switch(StreamMethod::Retweet, options)
    }

    /// Switches the stream to the `sample` method.
    pub fn sample(&self, options: Vec<MethodOption>) -> Result<(), SessionError> {
        self.switch(StreamMethod::Sample, options)
    }

    /// Switches to `method`. The new request is opened before the previous
    /// one is closed, so no delivery gap forms; records already extracted
    /// from the old request are dispatched first.
    pub fn switch(
        &self,
        method: StreamMethod,
        options: Vec<MethodOption>,
    ) -> Result<(), SessionError> {
        self.send(Msg::Switch { method, options })
    }

    /// Returns the most recently requested method and its options.
    pub async fn current_method(
        &self,
    ) -> Result<Option<(StreamMethod, Vec<MethodOption>)>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Msg::CurrentMethod { reply: reply_tx })?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Synchronous request answered by the handler's `on_call`.
    pub async fn call(&self, payload: Value) -> Result<Value, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Msg::Call {
            payload,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Like [`call`](Self::call) with an upper bound on the wait.
    pub async fn call_timeout(
        &self,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        tokio::time::timeout(timeout, self.call(payload))
            .await
            .map_err(|_| SessionError::Timeout)?
    }

    /// Forwards an out-of-band message to the handler's `on_info`.
    pub fn info(&self, message: Value) -> Result<(), SessionError> {
        self.send(Msg::Info { message })
    }

    /// Asks the session to terminate with reason `Normal`.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(Msg::Stop {
            reason: StopReason::Normal,
        })
    }

    /// Waits for termination and returns the final reason, the same value
    /// the handler's `terminate` received.
    pub async fn join(mut self) -> StopReason {
        let Some(done) = self.done.take() else {
            return StopReason::Normal;
        };
        done.await.unwrap_or(StopReason::Normal)
    }

    fn send(&self, msg: Msg) -> Result<(), SessionError> {
        self.commands.send(msg).map_err(|_| SessionError::Closed)
    }
}

impl Drop for TweetStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Msg::Stop {
            reason: StopReason::Normal,
        });
    }
}
