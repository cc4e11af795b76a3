//! Accept loop: TLS, origin-checked WebSocket upgrade, one task per session.

use crate::error::{RelayError, Result};
use crate::origin::OriginPolicy;
use crate::session::{Session, SessionContext};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

pub struct RelayServer {
    listener: TcpListener,
    tls: Option<TlsAcceptor>, // None only for local tooling and tests
    origins: Arc<OriginPolicy>,
    ws_config: WebSocketConfig,
    ctx: Arc<SessionContext>,
}

impl RelayServer {
    pub async fn bind(
        addr: SocketAddr,
        tls: Option<TlsAcceptor>,
        origins: OriginPolicy,
        ws_config: WebSocketConfig,
        ctx: Arc<SessionContext>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::from_listener(listener, tls, origins, ws_config, ctx))
    }

    pub fn from_listener(
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
        origins: OriginPolicy,
        ws_config: WebSocketConfig,
        ctx: Arc<SessionContext>,
    ) -> Self {
        Self {
            listener,
            tls,
            origins: Arc::new(origins),
            ws_config,
            ctx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn url(&self) -> Result<String> {
        let scheme = if self.tls.is_some() { "wss" } else { "ws" };
        Ok(format!("{}://{}", scheme, self.local_addr()?))
    }

    /// Accepts until `shutdown` flips, then waits for live sessions to close.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("WebSocket server started on {}", self.url()?);
        for origin in self.origins.origins() {
            info!("Allowed origin: {}", origin);
        }

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Connection from {}", peer);
                        sessions.spawn(handle_connection(
                            stream,
                            peer,
                            self.tls.clone(),
                            self.origins.clone(),
                            self.ws_config,
                            self.ctx.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(done) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = done {
                        error!("Session task failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Waiting for {} sessions to close", sessions.len());
        while let Some(done) = sessions.join_next().await {
            if let Err(e) = done {
                error!("Session task failed: {}", e);
            }
        }
        info!("Server stopped");
        Ok(())
    }
}

/// Either a TLS or a plain TCP stream, after the transport handshake.
trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type Upgraded = WebSocketStream<Box<dyn Transport>>;

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    origins: Arc<OriginPolicy>,
    ws_config: WebSocketConfig,
    ctx: Arc<SessionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    // a peer that never finishes the handshake must not hold up shutdown
    let handshake_timeout = ctx.ping_timeout;
    let handshake = tokio::time::timeout(
        handshake_timeout,
        establish(stream, tls, &origins, ws_config),
    );
    let ws_stream = tokio::select! {
        done = handshake => match done {
            Ok(Ok(ws_stream)) => ws_stream,
            Ok(Err(e)) => {
                warn!("Connection error from {}: {}", peer, e);
                return;
            }
            Err(_) => {
                warn!("Handshake from {} not finished within {:?}", peer, handshake_timeout);
                return;
            }
        },
        _ = shutdown.changed() => {
            debug!("Dropping handshake from {} on shutdown", peer);
            return;
        }
    };

    if let Err(e) = Session::new(ctx).run(ws_stream, shutdown).await {
        warn!("Connection error from {}: {}", peer, e);
    }
}

async fn establish(
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    origins: &OriginPolicy,
    ws_config: WebSocketConfig,
) -> Result<Upgraded> {
    let stream: Box<dyn Transport> = match tls {
        Some(acceptor) => Box::new(acceptor.accept(stream).await?),
        None => Box::new(stream),
    };
    let check = |req: &Request, resp: Response| check_origin(origins, req, resp);
    Ok(tokio_tungstenite::accept_hdr_async_with_config(stream, check, Some(ws_config)).await?)
}

fn check_origin(
    policy: &OriginPolicy,
    req: &Request,
    resp: Response,
) -> std::result::Result<Response, ErrorResponse> {
    let origin = req.headers().get(ORIGIN);
    let admitted = match origin {
        None => policy.admits(None),
        Some(value) => value.to_str().is_ok_and(|o| policy.admits(Some(o))),
    };
    if admitted {
        return Ok(resp);
    }
    warn!("Rejected connection from origin {:?}", origin);
    let mut rejection = ErrorResponse::new(Some("origin not allowed".to_string()));
    *rejection.status_mut() = StatusCode::FORBIDDEN;
    Err(rejection)
}
