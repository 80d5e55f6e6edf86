//! Synthesized responses and CORS injection into relayed responses.
//!
//! # Responsibilities
//! - Build the discovery snapshot response (JSON object, closes connection)
//! - Provide the fixed CORS preflight response
//! - Insert `Access-Control-Allow-Origin: *` into the first origin response
//!
//! # Design Decisions
//! - The injected line is placed as the last header line, in front of the
//!   blank-line separator, so header bytes and body bytes stay verbatim
//! - Origin header blocks are buffered across reads up to a fixed limit;
//!   exceeding it is a protocol error that tears the pair down

use std::borrow::Cow;

use crate::http::request::ProtocolError;

/// Header line added to every relayed response.
pub const CORS_ALLOW_ORIGIN: &[u8] = b"Access-Control-Allow-Origin: *";

/// Fixed reply to any `OPTIONS` request.
pub const PREFLIGHT_RESPONSE: &[u8] = b"HTTP/1.1 204 No Content\r\n\
Connection: keep-alive\r\n\
Access-Control-Allow-Origin: *\r\n\
Access-Control-Allow-Methods: POST, GET, OPTIONS\r\n\
Access-Control-Allow-Headers: Content-Type, Access-Control-Allow-Headers, Authorization, X-Requested-With, X-FileSize\r\n\
Access-Control-Max-Age: 86400\r\n\r\n";

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Serialize discovery entries as a flat JSON object.
///
/// Names are JSON-escaped; payloads are inserted verbatim and must already be
/// JSON values.
pub fn discovery_body<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut body = String::from("{");
    for (i, (name, payload)) in entries.into_iter().enumerate() {
        if i > 0 {
            body.push(',');
        }
        body.push_str(&serde_json::Value::String(name.to_owned()).to_string());
        body.push(':');
        body.push_str(payload);
    }
    body.push('}');
    body
}

/// Full `200 OK` discovery response around `body`.
pub fn discovery_response(body: &str) -> Vec<u8> {
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Accept-Ranges: none\r\n\
         Access-Control-Allow-Origin: *\r\n\r\n",
        body.len()
    );
    let mut out = head.into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

/// One-shot CORS rewrite of an origin response stream.
#[derive(Debug)]
pub struct ResponseRewriter {
    pending: Vec<u8>,
    injected: bool,
    max_header_bytes: usize,
}

impl ResponseRewriter {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            injected: false,
            max_header_bytes,
        }
    }

    /// Whether the header has already been injected.
    pub fn is_streaming(&self) -> bool {
        self.injected
    }

    /// Feed the next chunk from the origin and get back the bytes to send on.
    ///
    /// Returns an empty slice while the header block is still incomplete.
    pub fn rewrite<'a>(&mut self, chunk: &'a [u8]) -> Result<Cow<'a, [u8]>, ProtocolError> {
        if self.injected {
            return Ok(Cow::Borrowed(chunk));
        }

        // The terminator may straddle the previous chunk boundary.
        let search_from = self.pending.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
        self.pending.extend_from_slice(chunk);

        let Some(offset) = find(&self.pending[search_from..], HEADER_TERMINATOR) else {
            if self.pending.len() > self.max_header_bytes {
                return Err(ProtocolError::HeaderTooLarge {
                    limit: self.max_header_bytes,
                });
            }
            return Ok(Cow::Borrowed(&[]));
        };
        let end = search_from + offset;

        let buffered = std::mem::take(&mut self.pending);
        let mut out = Vec::with_capacity(buffered.len() + CORS_ALLOW_ORIGIN.len() + 2);
        out.extend_from_slice(&buffered[..end]);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(CORS_ALLOW_ORIGIN);
        out.extend_from_slice(&buffered[end..]);
        self.injected = true;
        Ok(Cow::Owned(out))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
