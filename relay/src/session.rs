use crate::catalog::LanguagePairCatalog;
use crate::error::{RelayError, Result};
use crate::pipeline::Pipeline;
use futures_util::{Sink, SinkExt, StreamExt};
use shared_protocol::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Everything a session reads but never owns. Built once, shared by all.
pub struct SessionContext {
    pub pipeline: Pipeline,
    pub catalog: Arc<LanguagePairCatalog>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

pub struct Session {
    id: Uuid, // log correlation only
    state: SessionState,
    ctx: Arc<SessionContext>,
}

async fn send<S>(ws_sender: &mut S, msg: &ServerMessage) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    ws_sender.send(Message::Text(msg.to_json()?)).await?;
    Ok(())
}

fn is_disconnect(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
            )
    )
}

impl Session {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            ctx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Serves one upgraded connection until either side closes it, the
    /// peer stops answering pings, or `shutdown` flips.
    pub async fn run<S>(
        mut self,
        ws_stream: WebSocketStream<S>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let span = info_span!("session", id = %self.id);
        async move {
            self.transition(SessionState::Active);
            info!("New client connected");
            let result = self.serve(ws_stream, shutdown).await;
            self.transition(SessionState::Closing);
            let result = match result {
                Err(RelayError::WebSocket(e)) if is_disconnect(&e) => {
                    info!("Client disconnected");
                    Ok(())
                }
                other => other,
            };
            self.transition(SessionState::Closed);
            result
        }
        .instrument(span)
        .await
    }

    async fn serve<S>(
        &mut self,
        ws_stream: WebSocketStream<S>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let pairs = ServerMessage::LanguagePairs {
            data: (*self.ctx.catalog.snapshot()).clone(),
        };
        send(&mut ws_sender, &pairs).await?;
        info!("Sent language pairs to client");

        let ping_interval = self.ctx.ping_interval;
        let ping_timeout = self.ctx.ping_timeout;
        let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_pong: Option<Instant> = None;

        loop {
            let pong_deadline = awaiting_pong.unwrap_or_else(Instant::now) + ping_timeout;
            tokio::select! {
                biased;
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Binary(frame))) => {
                        let reply = self.ctx.pipeline.process(&frame).await;
                        if let ServerMessage::Error { message } = &reply {
                            error!("Error for client: {}", message);
                        }
                        send(&mut ws_sender, &reply).await?;
                    }
                    Some(Ok(Message::Text(text))) => {
                        warn!("Received non-binary message from client: {}", text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = None,
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("Client disconnected");
                        // writes the queued close reply
                        let _ = ws_sender.flush().await;
                        return Ok(());
                    }
                    None => {
                        info!("Client disconnected");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        if !is_disconnect(&e) {
                            let reply = ServerMessage::error(format!("Connection error: {e}"));
                            let _ = send(&mut ws_sender, &reply).await;
                            let _ = ws_sender.send(Message::Close(None)).await;
                        }
                        return Err(e.into());
                    }
                },
                _ = tokio::time::sleep_until(pong_deadline), if awaiting_pong.is_some() => {
                    warn!("No pong within {:?}, closing", ping_timeout);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick(), if awaiting_pong.is_none() => {
                    ws_sender.send(Message::Ping(Vec::new())).await?;
                    awaiting_pong = Some(Instant::now());
                }
                _ = shutdown.changed() => {
                    info!("Server shutting down, closing session");
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}
