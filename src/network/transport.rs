use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::frame::{self, Command, Frame};
use crate::error::{FrameError, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Heart-beat intervals agreed with the broker. `None` means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub outgoing: Option<Duration>,
    pub incoming: Option<Duration>,
}

impl Heartbeat {
    /// Combine what we offered (`offered_ms` both ways) with the broker's
    /// `heart-beat` header.
    pub fn negotiate(offered_ms: u64, server: Option<&str>) -> Self {
        let (server_send, server_receive) = server
            .and_then(|raw| raw.split_once(','))
            .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
            .unwrap_or((0, 0));

        let pick = |ours: u64, theirs: u64| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        Self {
            outgoing: pick(offered_ms, server_receive),
            incoming: pick(offered_ms, server_send),
        }
    }

    /// How often the session needs to wake up to service heart-beats.
    pub fn tick(&self) -> Option<Duration> {
        match (self.outgoing, self.incoming) {
            (Some(out), Some(inc)) => Some(out.min(inc)),
            (out, inc) => out.or(inc),
        }
    }
}

/// A STOMP session over one WebSocket connection.
pub struct StompLink {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    buffered: VecDeque<Result<Frame, FrameError>>,
    heartbeat: Heartbeat,
    last_inbound: Instant,
}

/// Open the WebSocket and complete the CONNECT/CONNECTED exchange.
pub async fn build_transport(url: &Url, heartbeat_ms: u64) -> Result<StompLink, TransportError> {
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (sink, stream) = ws.split();
    let mut link = StompLink {
        sink,
        stream,
        buffered: VecDeque::new(),
        heartbeat: Heartbeat::default(),
        last_inbound: Instant::now(),
    };

    let host = url.host_str().unwrap_or("localhost");
    link.send(
        &Frame::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1")
            .with_header("host", host)
            .with_header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}")),
    )
    .await?;

    match link.next_frame().await {
        Some(Ok(reply)) if reply.command == Command::Connected => {
            link.heartbeat = Heartbeat::negotiate(heartbeat_ms, reply.header("heart-beat"));
            log::info!(
                "STOMP session established with {url} (version {}, heart-beat {:?})",
                reply.header("version").unwrap_or("1.0"),
                link.heartbeat
            );
            Ok(link)
        }
        Some(Ok(reply)) if reply.command == Command::Error => {
            let reason = reply
                .header("message")
                .map(str::to_string)
                .unwrap_or_else(|| reply.body.clone());
            Err(TransportError::Rejected(reason))
        }
        Some(Ok(reply)) => Err(TransportError::UnexpectedFrame(reply.command.to_string())),
        Some(Err(err)) => Err(err),
        None => Err(TransportError::Closed),
    }
}

impl StompLink {
    pub fn heartbeat(&self) -> Heartbeat {
        self.heartbeat
    }

    /// Time since the broker last sent anything, heart-beats included.
    pub fn idle_for(&self) -> Duration {
        self.last_inbound.elapsed()
    }

    /// Write one frame and flush it to the socket.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.sink.send(Message::Text(frame.encode())).await?;
        Ok(())
    }

    pub async fn send_heartbeat(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(frame::HEARTBEAT.to_string()))
            .await?;
        Ok(())
    }

    /// Next inbound frame; `None` once the peer has closed the connection.
    ///
    /// Cancel-safe: the only suspension point is the socket read, and frames
    /// decoded from one WebSocket message are buffered before returning. A
    /// malformed frame surfaces as `TransportError::Frame` in its place in
    /// the sequence; its neighbours are still delivered.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            if let Some(decoded) = self.buffered.pop_front() {
                return Some(decoded.map_err(TransportError::from));
            }

            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(err.into())),
            };
            self.last_inbound = Instant::now();

            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Message::Close(_) => return None,
                // Ping/pong are answered by tungstenite itself.
                _ => continue,
            };

            self.buffered.extend(frame::decode_frames(&text));
        }
    }

    /// Send a WebSocket close and flush it.
    pub async fn close(mut self) {
        if let Err(err) = self.sink.close().await {
            log::debug!("WebSocket close did not complete cleanly: {err}");
        }
    }
}
