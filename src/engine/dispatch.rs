//! Per-handle dispatch: protocol layer and relay on top of the registry.

use std::borrow::Cow;

use tokio::net::TcpStream;
use tracing::{debug, info};

use super::event_loop::{Engine, Flow};
use super::ConnectionError;
use crate::discovery::DiscoverySource;
use crate::http::response::{discovery_body, discovery_response, PREFLIGHT_RESPONSE};
use crate::http::{classify, ForwardRequest, RequestKind, ResponseRewriter};
use crate::net::registry::RegistryError;
use crate::net::{relay, Acceptor, Handle, Role};
use crate::observability::metrics;

impl<D: DiscoverySource + Send, A: Acceptor> Engine<D, A> {
    /// Handle one chunk read from `handle`.
    pub(super) async fn dispatch(
        &mut self,
        handle: Handle,
        chunk: &[u8],
    ) -> Result<Flow, ConnectionError> {
        let record = self
            .registry
            .lookup(handle)
            .cloned()
            .ok_or(RegistryError::Unknown(handle))?;

        if record.is_unstarted() {
            return self.serve_request(handle, chunk).await;
        }

        match (record.role, record.peer) {
            (Role::Initiator, Some(peer)) => {
                self.relay(peer, chunk).await?;
                Ok(Flow::Keep)
            }
            (Role::Responder, Some(peer)) => self.relay_response(handle, peer, chunk).await,
            (_, None) => Err(ConnectionError::NoPeer(handle)),
        }
    }

    async fn relay(&mut self, to: Handle, bytes: &[u8]) -> Result<usize, ConnectionError> {
        let socket = self
            .sockets
            .get_mut(&to)
            .ok_or(ConnectionError::NoPeer(to))?;
        Ok(relay::forward(&mut socket.writer, bytes).await?)
    }

    /// First chunk of an unstarted initiator.
    async fn serve_request(&mut self, handle: Handle, chunk: &[u8]) -> Result<Flow, ConnectionError> {
        let kind = classify(chunk, self.config.upstream.default_port)?;
        metrics::record_request(kind.label());

        match kind {
            RequestKind::Discovery => {
                let body = discovery_body(self.cache.snapshot());
                debug!(handle = %handle, entries = self.cache.len(), "Serving discovery snapshot");
                self.relay(handle, &discovery_response(&body)).await?;
                Ok(Flow::Close)
            }
            RequestKind::Preflight => {
                debug!(handle = %handle, "Answering CORS preflight");
                self.relay(handle, PREFLIGHT_RESPONSE).await?;
                Ok(Flow::Keep)
            }
            RequestKind::Forward(request) => {
                let outbound = self.open_upstream(handle, &request).await?;
                self.relay(outbound, &request.rewritten).await?;
                Ok(Flow::Keep)
            }
            RequestKind::Unsupported => {
                debug!(handle = %handle, "Unsupported request, dropping");
                Ok(Flow::Close)
            }
        }
    }

    /// Connect to the request's destination and pair it with `handle`.
    async fn open_upstream(
        &mut self,
        handle: Handle,
        request: &ForwardRequest,
    ) -> Result<Handle, ConnectionError> {
        if !self.listener.has_capacity(self.registry.len()) {
            metrics::record_rejected();
            return Err(ConnectionError::Capacity(self.listener.max_connections()));
        }

        let destination = request.destination();
        debug!(handle = %handle, destination = %destination, "Forwarding");

        let timeout = self.config.upstream.connect_timeout();
        let connect = TcpStream::connect((request.host.as_str(), request.port));
        let stream = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                metrics::record_connect_failure();
                return Err(ConnectionError::Connect {
                    destination,
                    source,
                });
            }
            Err(_) => {
                metrics::record_connect_failure();
                return Err(ConnectionError::ConnectTimeout { destination });
            }
        };

        let outbound = self.registry.allocate();
        self.registry.register(outbound, Role::Responder);
        if let Err(e) = self.registry.pair(handle, outbound) {
            self.registry.release(outbound);
            return Err(e.into());
        }

        let rewriter = ResponseRewriter::new(self.config.protocol.max_header_bytes);
        self.attach(outbound, stream, Some(rewriter));
        metrics::record_active_handles(self.registry.len());
        info!(handle = %handle, peer = %outbound, destination = %destination, "Connected upstream");
        Ok(outbound)
    }

    /// Origin data: inject the CORS header once, then relay opaquely.
    async fn relay_response(
        &mut self,
        handle: Handle,
        peer: Handle,
        chunk: &[u8],
    ) -> Result<Flow, ConnectionError> {
        let socket = self
            .sockets
            .get_mut(&handle)
            .ok_or(ConnectionError::NoPeer(handle))?;

        let out = match socket.rewriter.as_mut() {
            Some(rewriter) => {
                let out = rewriter.rewrite(chunk)?;
                if rewriter.is_streaming() {
                    socket.rewriter = None;
                }
                out
            }
            None => Cow::Borrowed(chunk),
        };

        if !out.is_empty() {
            self.relay(peer, &out).await?;
        }
        Ok(Flow::Keep)
    }
}
