//! Streaming client modules.
//!
//! - `client`: session startup, control surface, and lifecycle errors.
//! - `frame`: record reassembly across transport chunk boundaries.
//! - `session`: the single-consumer actor owning the active request.
//! - `transport`: one streaming HTTP request as a message-passing worker.
//! - `url`: method URLs and request option rendering.

/// Session startup and control surface.
pub mod client;
/// Record reassembly.
pub mod frame;
pub(crate) mod session;
pub(crate) mod transport;
/// Method URLs and option rendering.
pub mod url;
