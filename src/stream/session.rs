//! Single-consumer session actor.
//!
//! The session owns at most one active streaming request. Control messages
//! from the facade, synchronous queries, injected info messages, and
//! transport events all flow through one mailbox and are processed in
//! arrival order, so no handler callback ever overlaps another and records
//! reach the handler in wire order. The actor itself never blocks on I/O:
//! requests are opened by spawning a transport worker, and each chunk is
//! read only after the session asks for it.

use bytes::BytesMut;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::handler::{
    isolate, CallOutcome, Flow, Init, StopReason, StreamEvent, StreamHandler, StreamHttpError,
};
use crate::stream::frame::FrameExtractor;
use crate::stream::transport::{self, ActiveRequest, Credentials, RequestId, TransportEvent};
use crate::stream::url::{self, MethodOption, StreamMethod};

/// Control events the service sends as single-key JSON objects. A record
/// that is an object with exactly one of these keys is dispatched through
/// `on_event`; every other record is a status.
const SERVER_EVENTS: &[&str] = &[
    "delete",
    "scrub_geo",
    "limit",
    "status_withheld",
    "user_withheld",
    "warning",
    "disconnect",
    "friends",
    "event",
];

/// Everything the session mailbox carries.
#[derive(Debug)]
pub(crate) enum Msg {
    Switch {
        method: StreamMethod,
        options: Vec<MethodOption>,
    },
    CurrentMethod {
        reply: oneshot::Sender<Option<(StreamMethod, Vec<MethodOption>)>>,
    },
    Call {
        payload: Value,
        reply: oneshot::Sender<Value>,
    },
    Info {
        message: Value,
    },
    Stop {
        reason: StopReason,
    },
    Transport(TransportEvent),
}

impl From<TransportEvent> for Msg {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

/// Why `init` did not accept the session.
#[derive(Debug)]
pub(crate) enum InitOutcome {
    Ignored,
    Stopped(StopReason),
    Panicked(String),
}

pub(crate) struct SessionConfig {
    pub http: Client,
    pub credentials: Credentials,
    pub endpoint: String,
    pub debug: bool,
}

/// Spawns the session task. The init outcome is reported through `ready`;
/// the final stop reason through `done`.
pub(crate) fn spawn<H: StreamHandler>(
    handler: H,
    config: SessionConfig,
    mailbox_tx: mpsc::UnboundedSender<Msg>,
    mailbox: mpsc::UnboundedReceiver<Msg>,
    ready: oneshot::Sender<Result<(), InitOutcome>>,
    done: oneshot::Sender<StopReason>,
) {
    let mut session = Session {
        handler,
        http: config.http,
        credentials: config.credentials,
        endpoint: config.endpoint,
        debug: config.debug,
        mailbox,
        mailbox_tx,
        active: None,
        extractor: FrameExtractor::new(),
        status: None,
        headers: HeaderMap::new(),
        error_body: BytesMut::new(),
        current_method: None,
        next_request: 0,
    };
    tokio::spawn(async move {
        match isolate(|| session.handler.init()) {
            Ok(Init::Continue) => {
                let _ = ready.send(Ok(()));
            }
            Ok(Init::Ignore) => {
                let _ = ready.send(Err(InitOutcome::Ignored));
                return;
            }
            Ok(Init::Stop(reason)) => {
                let _ = ready.send(Err(InitOutcome::Stopped(reason)));
                return;
            }
            Err(panic) => {
                let _ = ready.send(Err(InitOutcome::Panicked(panic)));
                return;
            }
        }
        let reason = session.run().await;
        let _ = done.send(reason);
    });
}

struct Session<H> {
    handler: H,
    http: Client,
    credentials: Credentials,
    endpoint: String,
    debug: bool,
    mailbox: mpsc::UnboundedReceiver<Msg>,
    mailbox_tx: mpsc::UnboundedSender<Msg>,
    active: Option<ActiveRequest>,
    extractor: FrameExtractor,
    status: Option<StatusCode>,
    headers: HeaderMap,
    error_body: BytesMut,
    current_method: Option<(StreamMethod, Vec<MethodOption>)>,
    next_request: RequestId,
}

impl<H: StreamHandler> Session<H> {
    async fn run(&mut self) -> StopReason {
        let reason = loop {
            let Some(msg) = self.mailbox.recv().await else {
                break StopReason::Normal;
            };
            if self.debug {
                debug!(event = "session_message", message = ?msg);
            }
            if let Some(reason) = self.handle(msg) {
                break reason;
            }
        };
        self.shutdown(&reason);
        reason
    }

    /// Closes the active request, then lets the handler observe the final
    /// reason. `terminate` runs inside the panic boundary too; the session
    /// is past saving at this point.
    fn shutdown(&mut self, reason: &StopReason) {
        if let Some(active) = self.active.take() {
            active.close();
        }
        if isolate(|| self.handler.terminate(reason)).is_err() {
            warn!(event = "terminate_panicked");
        }
    }

    fn handle(&mut self, msg: Msg) -> Option<StopReason> {
        match msg {
            Msg::Switch { method, options } => self.switch(method, options),
            Msg::CurrentMethod { reply } => {
                let _ = reply.send(self.current_method.clone());
                None
            }
            Msg::Call { payload, reply } => self.user_call(payload, reply),
            Msg::Info { message } => self.dispatch(|handler| handler.on_info(message)),
            Msg::Stop { reason } => Some(reason),
            Msg::Transport(event) => self.transport_event(event),
        }
    }

    /// Opens the new request first and closes the previous one afterwards,
    /// so a switch never leaves a moment with no request in flight. Events
    /// still arriving from the superseded request carry a stale id.
    fn switch(&mut self, method: StreamMethod, options: Vec<MethodOption>) -> Option<StopReason> {
        let (request_url, residual) = url::build(&url::method_url(&self.endpoint, method), &options);
        let id = self.next_request;
        self.next_request += 1;
        let opened = transport::open(
            &self.http,
            id,
            request_url,
            &self.credentials,
            residual,
            self.mailbox_tx.clone(),
        );
        if let Some(previous) = self.active.replace(opened) {
            debug!(event = "request_superseded", old = previous.id, new = id);
            previous.close();
        }
        // Status belongs to the superseded request until the new headers
        // arrive.
        self.status = None;
        self.current_method = Some((method, options));
        None
    }

    fn user_call(&mut self, payload: Value, reply: oneshot::Sender<Value>) -> Option<StopReason> {
        match isolate(|| self.handler.on_call(payload)) {
            Ok(CallOutcome::Reply(value)) => {
                let _ = reply.send(value);
                None
            }
            Ok(CallOutcome::ReplyAndStop(value, reason)) => {
                let _ = reply.send(value);
                Some(reason)
            }
            Err(panic) => Some(contract_violation(panic)),
        }
    }

    fn transport_event(&mut self, event: TransportEvent) -> Option<StopReason> {
        match event {
            TransportEvent::Headers { id, status, headers } => {
                if !self.is_active(id) {
                    return None;
                }
                self.status = Some(status);
                self.headers = headers;
                self.extractor.reset();
                self.error_body.clear();
                let flow = self.dispatch(|handler| handler.on_event(StreamEvent::StreamStart));
                if flow.is_some() {
                    return flow;
                }
                self.request_chunk();
                None
            }
            TransportEvent::Chunk { id, bytes } => {
                if !self.is_active(id) {
                    return None;
                }
                if bytes.is_empty() || bytes.as_ref() == b"\n" {
                    self.request_chunk();
                    return None;
                }
                if self.status == Some(StatusCode::OK) {
                    let extracted = self.extractor.consume(&bytes);
                    for invalid in &extracted.invalid {
                        warn!(
                            event = "invalid_json",
                            error = %invalid.error,
                            segment_len = invalid.segment.len(),
                        );
                    }
                    for record in extracted.records {
                        let flow = self.dispatch_record(record);
                        if flow.is_some() {
                            return flow;
                        }
                    }
                } else {
                    // Non-200 bodies are short error documents; collect the
                    // whole body and surface it at end-of-response.
                    self.error_body.extend_from_slice(&bytes);
                }
                self.request_chunk();
                None
            }
            TransportEvent::End { id } => {
                if !self.is_active(id) {
                    return None;
                }
                if self.status == Some(StatusCode::OK) {
                    let flow = self.dispatch(|handler| handler.on_event(StreamEvent::StreamEnd));
                    Some(flow.unwrap_or(StopReason::Normal))
                } else {
                    let error = StreamHttpError {
                        code: self.status.unwrap_or(StatusCode::OK),
                        headers: self.headers.clone(),
                        body: self.error_body.split().freeze(),
                    };
                    let flow = self
                        .dispatch(|handler| handler.on_event(StreamEvent::StreamError(error)));
                    if flow.is_some() {
                        return flow;
                    }
                    // The request is over; stay alive for the next switch.
                    if let Some(active) = self.active.take() {
                        active.close();
                    }
                    None
                }
            }
            TransportEvent::Failed { id, error } => {
                if !self.is_active(id) {
                    return None;
                }
                // No headers yet means the request failed to open; timeouts
                // get no special treatment there.
                if self.status.is_some() && error.is_timeout() {
                    // A stream that stops producing simply ends.
                    Some(StopReason::Normal)
                } else {
                    Some(StopReason::Error(error.to_string()))
                }
            }
        }
    }

    fn dispatch_record(&mut self, record: Value) -> Option<StopReason> {
        match into_server_event(record) {
            Ok((name, data)) => {
                self.dispatch(|handler| handler.on_event(StreamEvent::Server { name, data }))
            }
            Err(record) => self.dispatch(|handler| handler.on_status(record)),
        }
    }

    fn dispatch(&mut self, callback: impl FnOnce(&mut H) -> Flow) -> Option<StopReason> {
        match isolate(|| callback(&mut self.handler)) {
            Ok(Flow::Continue) => None,
            Ok(Flow::Stop(reason)) => Some(reason),
            Err(panic) => Some(contract_violation(panic)),
        }
    }

    fn is_active(&self, id: RequestId) -> bool {
        match &self.active {
            Some(active) if active.id == id => true,
            _ => {
                debug!(event = "stale_request_message", request = id);
                false
            }
        }
    }

    fn request_chunk(&self) {
        if let Some(active) = &self.active {
            active.request_chunk();
        }
    }
}

fn contract_violation(panic: String) -> StopReason {
    warn!(event = "handler_panicked", detail = %panic);
    StopReason::Error(format!("handler panicked: {panic}"))
}

/// Splits a record into `(event_name, data)` when it is a single-key object
/// naming a known server event; returns the record unchanged otherwise.
fn into_server_event(record: Value) -> Result<(String, Value), Value> {
    match record {
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((name, data)) if SERVER_EVENTS.contains(&name.as_str()) => Ok((name, data)),
            Some((name, data)) => Err(Value::from_iter([(name, data)])),
            None => Err(Value::Object(Default::default())),
        },
        other => Err(other),
    }
}
