//! The engine: owns the registry, discovery cache and readiness set.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::future::{AbortHandle, Abortable, BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::discovery::{DiscoveryCache, DiscoverySource, DiscoveryUpdate};
use crate::error::ProxyError;
use crate::http::ResponseRewriter;
use crate::lifecycle::ShutdownSignal;
use crate::net::{AcceptBackoff, Acceptor, Handle, Listener, Registry, Role};
use crate::observability::metrics;

/// Outcome of one pending read.
pub(super) struct ReadEvent {
    handle: Handle,
    reader: OwnedReadHalf,
    buf: Vec<u8>,
    result: std::io::Result<usize>,
}

type ReadFuture = Abortable<BoxFuture<'static, ReadEvent>>;

/// Socket halves and per-handle framing state.
pub(super) struct Socket {
    pub(super) writer: OwnedWriteHalf,
    pending_read: AbortHandle,
    /// Present on responders until the CORS header has been injected.
    pub(super) rewriter: Option<ResponseRewriter>,
}

/// Whether a handle stays open after its chunk was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Flow {
    Keep,
    Close,
}

/// Single-threaded connection-multiplexing engine.
pub struct Engine<D, A = TcpListener> {
    pub(super) config: ProxyConfig,
    pub(super) listener: Listener<A>,
    accept_backoff: AcceptBackoff,
    pub(super) registry: Registry,
    pub(super) cache: DiscoveryCache,
    discovery: D,
    pub(super) sockets: HashMap<Handle, Socket>,
    readiness: FuturesUnordered<ReadFuture>,
}

impl<D: DiscoverySource + Send> Engine<D> {
    /// Bind the configured listening address.
    pub async fn bind(config: ProxyConfig, discovery: D) -> Result<Self, ProxyError> {
        let listener = Listener::bind(&config.listener).await?;
        Ok(Self::new(config, listener, discovery))
    }
}

impl<D: DiscoverySource + Send, A: Acceptor> Engine<D, A> {
    pub fn new(config: ProxyConfig, listener: Listener<A>, discovery: D) -> Self {
        Self {
            config,
            listener,
            accept_backoff: AcceptBackoff::default(),
            registry: Registry::new(),
            cache: DiscoveryCache::new(),
            discovery,
            sockets: HashMap::new(),
            readiness: FuturesUnordered::new(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Run until `shutdown` fires, then close every open handle.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<(), ProxyError> {
        let mut refresh = tokio::time::interval(self.config.discovery.refresh_interval());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let local_addr = self.listener.local_addr()?;
        info!(
            address = %local_addr,
            refresh_secs = self.config.discovery.refresh_interval_secs,
            "Engine running"
        );

        // Set while accepting is parked after an accept error.
        let mut accept_resume: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Shutdown requested");
                    break;
                }

                // The first tick completes immediately and primes the cache.
                _ = refresh.tick() => {
                    metrics::record_discovery_refresh();
                    if let Err(e) = self.discovery.issue_query() {
                        warn!(error = %e, "Discovery query failed");
                    }
                }

                update = self.discovery.next_update() => self.on_discovery(update),

                Some(event) = self.readiness.next(), if !self.readiness.is_empty() => {
                    // Aborted reads belong to handles that are already closed.
                    if let Ok(event) = event {
                        self.on_readable(event).await;
                    }
                }

                _ = tokio::time::sleep_until(accept_resume.unwrap_or_else(Instant::now)),
                    if accept_resume.is_some() =>
                {
                    accept_resume = None;
                }

                accepted = self.listener.accept(), if accept_resume.is_none() => match accepted {
                    Ok((stream, addr)) => {
                        self.accept_backoff.reset();
                        self.admit(stream, addr);
                    }
                    Err(e) => {
                        let pause = self.accept_backoff.on_error();
                        metrics::record_accept_error();
                        warn!(
                            error = %e,
                            failures = self.accept_backoff.failures(),
                            pause_ms = pause.as_millis() as u64,
                            "Accept failed, pausing accepts"
                        );
                        accept_resume = Some(Instant::now() + pause);
                    }
                },
            }
        }

        self.close_all();
        self.discovery.shutdown();
        info!("Engine stopped");
        Ok(())
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if !self.listener.has_capacity(self.registry.len()) {
            warn!(
                peer_addr = %addr,
                max_connections = self.listener.max_connections(),
                "Handle limit reached, rejecting connection"
            );
            metrics::record_rejected();
            return;
        }

        let handle = self.registry.allocate();
        self.registry.register(handle, Role::Initiator);
        self.attach(handle, stream, None);
        metrics::record_accepted();
        metrics::record_active_handles(self.registry.len());
        debug!(handle = %handle, peer_addr = %addr, "Connection accepted");
    }

    /// Split `stream`, store its write half and put its read half in the readiness set.
    pub(super) fn attach(
        &mut self,
        handle: Handle,
        stream: TcpStream,
        rewriter: Option<ResponseRewriter>,
    ) {
        let (reader, writer) = stream.into_split();
        let buf = vec![0; self.config.protocol.read_buffer_bytes];
        let pending_read = self.arm(handle, reader, buf);
        self.sockets.insert(
            handle,
            Socket {
                writer,
                pending_read,
                rewriter,
            },
        );
    }

    fn arm(&mut self, handle: Handle, mut reader: OwnedReadHalf, mut buf: Vec<u8>) -> AbortHandle {
        let (abort, registration) = AbortHandle::new_pair();
        let read = async move {
            let result = reader.read(&mut buf).await;
            ReadEvent {
                handle,
                reader,
                buf,
                result,
            }
        }
        .boxed();
        self.readiness.push(Abortable::new(read, registration));
        abort
    }

    async fn on_readable(&mut self, event: ReadEvent) {
        let ReadEvent {
            handle,
            reader,
            buf,
            result,
        } = event;

        if !self.registry.contains(handle) {
            return;
        }

        let n = match result {
            Ok(0) => {
                debug!(handle = %handle, "EOF");
                self.close(handle);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Read failed");
                self.close(handle);
                return;
            }
        };

        let outcome = self.dispatch(handle, &buf[..n]).await;
        match outcome {
            Ok(Flow::Keep) if self.registry.contains(handle) => {
                let pending_read = self.arm(handle, reader, buf);
                if let Some(socket) = self.sockets.get_mut(&handle) {
                    socket.pending_read = pending_read;
                }
            }
            Ok(_) => self.close(handle),
            Err(e) => {
                warn!(handle = %handle, error = %e, "Closing connection");
                self.close(handle);
            }
        }
    }

    fn on_discovery(&mut self, update: DiscoveryUpdate) {
        match update {
            DiscoveryUpdate::Resolved { name, payload } => {
                if self.cache.put(name.clone(), payload) {
                    info!(name = %name, "Service discovered");
                }
            }
            DiscoveryUpdate::Removed { name } => {
                if self.cache.remove(&name).is_some() {
                    info!(name = %name, "Service removed");
                }
            }
        }
        metrics::record_discovery_entries(self.cache.len());
    }

    /// Close `handle` and its peer, if any.
    pub(super) fn close(&mut self, handle: Handle) {
        let Some(record) = self.registry.release(handle) else {
            return;
        };
        self.drop_socket(handle);
        if let Some(peer) = record.peer {
            if self.registry.release(peer).is_some() {
                self.drop_socket(peer);
                debug!(handle = %handle, peer = %peer, "Closed pair");
            }
        } else {
            debug!(handle = %handle, "Closed");
        }
        metrics::record_active_handles(self.registry.len());
    }

    fn drop_socket(&mut self, handle: Handle) {
        if let Some(socket) = self.sockets.remove(&handle) {
            socket.pending_read.abort();
        }
    }

    fn close_all(&mut self) {
        for handle in self.registry.handles() {
            debug!(handle = %handle, "Closing at shutdown");
            self.close(handle);
        }
        self.readiness.clear();
    }
}
