//! Transport abstraction: opening a STOMP session.
//!
//! The connection manager only talks to [`Transport`], which hands back an
//! established [`Session`] (the STOMP handshake is already done). The
//! production implementation is [`WsTransport`]; tests substitute scripted
//! in-memory transports.

use std::{fmt, pin::Pin};

use async_trait::async_trait;
use futures_util::{
    SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message},
};
use tracing::{debug, warn};

use crate::{
    channel::ChannelConfig,
    error::{ChannelError, ChannelResult},
    stomp::{Command, Decoded, Frame, FrameDecoder, Heartbeat},
};

/// Inbound traffic of an open session.
pub type FrameStream = Pin<Box<dyn Stream<Item = ChannelResult<Decoded>> + Send>>;

/// Outbound half of an open session.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame.
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()>;

    /// Send an EOL heartbeat.
    async fn send_heartbeat(&mut self) -> ChannelResult<()>;

    /// Close the underlying transport.
    async fn close(&mut self) -> ChannelResult<()>;
}

/// An established STOMP session.
pub struct Session {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
    /// Negotiated heartbeat intervals.
    pub heartbeat: Heartbeat,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

/// Opens STOMP sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the transport and complete the STOMP handshake.
    ///
    /// A STOMP `ERROR` reply maps to [`ChannelError::Protocol`].
    async fn open(&self, config: &ChannelConfig) -> ChannelResult<Session>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP over a WebSocket, compatible with SockJS endpoints through their raw
/// WebSocket path.
#[derive(Clone, Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, config: &ChannelConfig) -> ChannelResult<Session> {
        let url = config.websocket_url();
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::config(format!("Invalid URL {url}: {e}")))?;

        let (ws, _response) = tokio::time::timeout(config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| ChannelError::timeout(config.connect_timeout))??;
        debug!(%url, "WebSocket upgraded");

        let (write, read) = ws.split();
        let mut sink = WsFrameSink { write };
        let mut stream = decode_stream(read, config.max_frame_size);

        let offered = Heartbeat::header_value(config.heartbeat_interval);
        let connect = Frame::connect(
            config.host(),
            &offered,
            config
                .connect_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        sink.send_frame(connect).await?;

        let connected = tokio::time::timeout(config.connect_timeout, await_connected(&mut stream))
            .await
            .map_err(|_| ChannelError::timeout(config.connect_timeout))??;

        let client_hb = Heartbeat::parse_header(&offered)?;
        let server_hb = match connected.get("heart-beat") {
            Some(value) => Heartbeat::parse_header(value)?,
            None => (0, 0),
        };
        let heartbeat = Heartbeat::negotiate(client_hb, server_hb);
        debug!(
            version = connected.get("version").unwrap_or("1.0"),
            outgoing_ms = heartbeat.outgoing.as_millis() as u64,
            incoming_ms = heartbeat.incoming.as_millis() as u64,
            "STOMP session established"
        );

        Ok(Session {
            sink: Box::new(sink),
            stream,
            heartbeat,
        })
    }
}

/// Wait for `CONNECTED`, skipping heartbeats.
async fn await_connected(stream: &mut FrameStream) -> ChannelResult<Frame> {
    loop {
        match stream.next().await {
            Some(Ok(Decoded::Heartbeat)) => continue,
            Some(Ok(Decoded::Frame(frame))) => {
                return match frame.command {
                    Command::Connected => Ok(frame),
                    Command::Error => Err(ChannelError::protocol(
                        frame.error_message().unwrap_or("CONNECT rejected"),
                    )),
                    other => Err(ChannelError::protocol(format!(
                        "expected CONNECTED, got {other}"
                    ))),
                };
            }
            Some(Err(err)) => return Err(err),
            None => {
                return Err(ChannelError::connection_closed(Some(
                    "closed during STOMP handshake".to_string(),
                )));
            }
        }
    }
}

/// Turn WebSocket messages into decoded STOMP units.
fn decode_stream(read: SplitStream<WsStream>, max_frame_size: usize) -> FrameStream {
    let state = (read, FrameDecoder::new(max_frame_size), false);
    Box::pin(futures_util::stream::unfold(
        state,
        |(mut read, mut decoder, mut done)| async move {
            loop {
                if done {
                    return None;
                }
                match decoder.decode() {
                    Ok(Some(unit)) => return Some((Ok(unit), (read, decoder, done))),
                    Ok(None) => {}
                    Err(err) => {
                        done = true;
                        return Some((Err(err), (read, decoder, done)));
                    }
                }

                match read.next().await {
                    Some(Ok(Message::Text(text))) => decoder.feed(text.as_bytes()),
                    Some(Ok(Message::Binary(data))) => decoder.feed(&data),
                    Some(Ok(Message::Close(frame))) => {
                        done = true;
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()));
                        return Some((
                            Err(ChannelError::connection_closed(reason)),
                            (read, decoder, done),
                        ));
                    }
                    // Pings are answered by tungstenite on the next write.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        done = true;
                        return Some((Err(err.into()), (read, decoder, done)));
                    }
                    None => return None,
                }
            }
        },
    ))
}

struct WsFrameSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, frame: Frame) -> ChannelResult<()> {
        let text = frame.to_text()?;
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> ChannelResult<()> {
        self.write.send(Message::Text("\n".into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> ChannelResult<()> {
        if let Err(err) = self.write.close().await {
            warn!(error = %err, "Error closing WebSocket");
        }
        Ok(())
    }
}
