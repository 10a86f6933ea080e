//! Callback contract between a streaming session and its consumer.
//!
//! A session owns its handler exclusively and invokes the callbacks one at
//! a time, in mailbox order; handler state therefore needs no
//! synchronization. Every callback signals its outcome by return value;
//! the session treats an unwind out of a callback as a contract violation,
//! not as a control-flow channel.

use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;

/// Final reason a session terminated with.
///
/// The same value is passed to [`StreamHandler::terminate`] and returned by
/// the facade's `join`.
#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    /// Clean end of stream or an explicit external stop.
    Normal,
    /// Orderly handler-requested shutdown.
    Shutdown,
    /// Transport failure or handler contract violation.
    Error(String),
    /// Application-defined reason supplied by the handler.
    App(Value),
}

/// The non-200 response a stream ended with.
#[derive(Clone, Debug)]
pub struct StreamHttpError {
    /// Response status code.
    pub code: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The accumulated response body.
    pub body: Bytes,
}

/// Events dispatched to [`StreamHandler::on_event`].
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// Response headers of a new streaming request arrived.
    StreamStart,
    /// The active request ended normally.
    StreamEnd,
    /// The active request ended with a non-200 status.
    StreamError(StreamHttpError),
    /// Control event sent by the service as a single-key JSON object,
    /// passed through under its wire name (`delete`, `limit`, ...).
    Server {
        /// Wire name of the event.
        name: String,
        /// Payload under that key.
        data: Value,
    },
}

/// Outcome of [`StreamHandler::init`].
#[derive(Debug)]
pub enum Init {
    /// Accept the session.
    Continue,
    /// Decline the session; startup fails without opening a request and
    /// without a `terminate` callback.
    Ignore,
    /// Abort startup with a reason; no request is opened and `terminate`
    /// is not called.
    Stop(StopReason),
}

/// Outcome of the streaming callbacks.
#[derive(Debug)]
pub enum Flow {
    /// Keep consuming the stream.
    Continue,
    /// Terminate the session with the given reason.
    Stop(StopReason),
}

/// Outcome of [`StreamHandler::on_call`].
#[derive(Debug)]
pub enum CallOutcome {
    /// Answer the caller and keep going.
    Reply(Value),
    /// Answer the caller, then terminate the session.
    ReplyAndStop(Value, StopReason),
}

/// Consumer of a streaming session.
pub trait StreamHandler: Send + 'static {
    /// Invoked once before any request can be opened.
    fn init(&mut self) -> Init {
        Init::Continue
    }

    /// A status record arrived on the active request.
    fn on_status(&mut self, record: Value) -> Flow;

    /// A stream lifecycle event or a server control event arrived.
    fn on_event(&mut self, event: StreamEvent) -> Flow {
        let _ = event;
        Flow::Continue
    }

    /// A synchronous request issued through the facade. The reply always
    /// reaches the caller, even when the handler stops the session with it.
    fn on_call(&mut self, request: Value) -> CallOutcome {
        let _ = request;
        CallOutcome::Reply(Value::Null)
    }

    /// An out-of-band message the session itself does not recognize.
    fn on_info(&mut self, message: Value) -> Flow {
        let _ = message;
        Flow::Continue
    }

    /// Invoked exactly once, as the last callback, with the final reason.
    /// Not called when `init` declined the session.
    fn terminate(&mut self, reason: &StopReason) {
        let _ = reason;
    }
}

/// Runs one callback inside a panic boundary and normalizes an unwind into
/// the panic message.
pub(crate) fn isolate<R>(callback: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(|payload| {
        if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        }
    })
}
