//! Request classification and request-line rewriting.
//!
//! # Responsibilities
//! - Classify the first chunk read from an unstarted initiator
//! - Extract the forwarding destination from `METHOD /<host>/<path>`
//! - Rebuild the chunk with an origin-relative request line
//!
//! # Design Decisions
//! - Parse-then-rebuild into a new buffer; the input is never mutated
//! - Only the request target changes; every other byte of the chunk
//!   (version, headers, any body bytes already read) is copied verbatim

use thiserror::Error;

/// Errors raised while interpreting client or origin framing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("request target does not start with '/'")]
    MalformedRequestLine,
    #[error("request target names no host")]
    MissingHost,
    #[error("invalid destination {0:?}")]
    InvalidAuthority(String),
    #[error("response header block exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },
}

/// What the first chunk of an initiator asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// `GET /mdns...`: serve the discovery snapshot and close.
    Discovery,
    /// `OPTIONS ...`: answer the CORS preflight and keep the connection.
    Preflight,
    /// `GET`/`POST` to be relayed to another host.
    Forward(ForwardRequest),
    /// Any other method; the connection is dropped.
    Unsupported,
}

impl RequestKind {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Discovery => "discovery",
            RequestKind::Preflight => "preflight",
            RequestKind::Forward(_) => "forward",
            RequestKind::Unsupported => "unsupported",
        }
    }
}

/// A request bound for `host:port`, with its request line already rewritten.
#[derive(Debug, PartialEq, Eq)]
pub struct ForwardRequest {
    pub host: String,
    pub port: u16,
    /// The full chunk to send to the origin as its first bytes.
    pub rewritten: Vec<u8>,
}

impl ForwardRequest {
    pub fn destination(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

const DISCOVERY_PREFIX: &[u8] = b"GET /mdns";
const PREFLIGHT_PREFIX: &[u8] = b"OPTIONS ";
const FORWARD_PREFIXES: [&[u8]; 2] = [b"GET ", b"POST "];

/// Classify the first chunk of a request.
pub fn classify(buf: &[u8], default_port: u16) -> Result<RequestKind, ProtocolError> {
    if buf.starts_with(DISCOVERY_PREFIX) {
        return Ok(RequestKind::Discovery);
    }
    if buf.starts_with(PREFLIGHT_PREFIX) {
        return Ok(RequestKind::Preflight);
    }
    if FORWARD_PREFIXES.iter().any(|p| buf.starts_with(p)) {
        return rewrite_request_line(buf, default_port).map(RequestKind::Forward);
    }
    Ok(RequestKind::Unsupported)
}

/// Turn `METHOD /<host>/<path> ...` into `METHOD /<path> ...` aimed at `<host>`.
pub fn rewrite_request_line(
    buf: &[u8],
    default_port: u16,
) -> Result<ForwardRequest, ProtocolError> {
    let method_end = buf
        .iter()
        .position(|&b| b == b' ')
        .ok_or(ProtocolError::MalformedRequestLine)?;
    let target_start = method_end + 1;
    if buf.get(target_start) != Some(&b'/') {
        return Err(ProtocolError::MalformedRequestLine);
    }

    let target_end = buf[target_start..]
        .iter()
        .position(|&b| matches!(b, b' ' | b'\r' | b'\n'))
        .map_or(buf.len(), |i| target_start + i);

    // Skip the leading '/', the authority runs to the next '/'.
    let target = &buf[target_start + 1..target_end];
    let authority_len = target.iter().position(|&b| b == b'/').unwrap_or(target.len());
    let authority = &target[..authority_len];
    if authority.is_empty() {
        return Err(ProtocolError::MissingHost);
    }
    let path: &[u8] = if authority_len < target.len() {
        &target[authority_len..]
    } else {
        b"/"
    };

    let (host, port) = parse_authority(authority, default_port)?;

    let mut rewritten = Vec::with_capacity(buf.len());
    rewritten.extend_from_slice(&buf[..target_start]);
    rewritten.extend_from_slice(path);
    rewritten.extend_from_slice(&buf[target_end..]);

    Ok(ForwardRequest {
        host,
        port,
        rewritten,
    })
}

fn parse_authority(raw: &[u8], default_port: u16) -> Result<(String, u16), ProtocolError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProtocolError::InvalidAuthority(String::from_utf8_lossy(raw).into_owned()))?;
    let invalid = || ProtocolError::InvalidAuthority(text.to_string());

    let (host, port) = match text.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (text, default_port),
    };
    if host.is_empty() || port == 0 {
        return Err(invalid());
    }
    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
    {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}
