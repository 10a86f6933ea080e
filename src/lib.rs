//! Streaming client for the Twitter Streaming API.
//!
//! The crate turns the chunked HTTP response of a streaming method into an
//! ordered sequence of typed callbacks on a user-supplied handler, while a
//! single-consumer session actor multiplexes method switches, synchronous
//! calls, and termination with the incoming stream.
//!
//! The crate is organized by module:
//! - `handler`: the callback contract and its directive types.
//! - `stream`: the session actor, transport worker, record reassembly, and
//!   the public control surface.

/// Callback contract between a session and its consumer.
pub mod handler;
/// Session actor, transport, and control surface.
pub mod stream;
