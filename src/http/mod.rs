//! HTTP protocol layer.
//!
//! # Data Flow
//! ```text
//! First chunk from an unstarted initiator
//!     → request.rs (classify: discovery / preflight / forward / unsupported)
//!     → forward: request line rewritten to `METHOD /<path>`, host extracted
//!     → discovery / preflight: response.rs builds the synthesized reply
//!
//! First chunks from a responder (origin)
//!     → response.rs (ResponseRewriter injects Access-Control-Allow-Origin)
//!     → relayed to the initiator
//! ```
//!
//! # Design Decisions
//! - Byte-level framing only; no HTTP library sits on the relay path
//! - Keep-alive and chunked encoding are relayed opaquely

pub mod request;
pub mod response;

pub use request::{classify, ForwardRequest, ProtocolError, RequestKind};
pub use response::ResponseRewriter;
