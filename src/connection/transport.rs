//! Link transports: WebSocket for production, in-memory for tests.
//!
//! A [`Link`] is split into an outbound sink of frame payloads and an inbound
//! stream of text messages so both directions can be driven from one loop.

use crate::error::{Result, VisionError};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

/// Outbound half of a link.
pub type LinkSink = Pin<Box<dyn Sink<String, Error = VisionError> + Send>>;

/// Inbound half of a link. The stream ends when the service closes the link.
pub type LinkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open bidirectional link to the detection service.
pub struct Link {
    pub outbound: LinkSink,
    pub inbound: LinkStream,
}

/// Opens links to the detection service.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new link to `endpoint`.
    ///
    /// # Errors
    /// Returns `VisionError::Transport` if the link cannot be established.
    async fn connect(&self, endpoint: &str) -> Result<Link>;
}

/// Production connector speaking WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link> {
        let (socket, _response) =
            connect_async(endpoint)
                .await
                .map_err(|e| VisionError::Transport {
                    message: format!("Failed to connect to {}: {}", endpoint, e),
                })?;

        let (write, read) = socket.split();

        let outbound = write
            .with(|frame: String| future::ready(Ok::<_, WsError>(Message::Text(frame))))
            .sink_map_err(|e| VisionError::Transport {
                message: format!("Failed to send frame: {}", e),
            });
        let inbound = read.filter_map(|message| future::ready(decode_message(message)));

        Ok(Link {
            outbound: Box::pin(outbound),
            inbound: Box::pin(inbound),
        })
    }
}

/// Map a WebSocket message to an inbound payload.
///
/// Control frames yield nothing; the stream itself ends after a close frame.
fn decode_message(message: std::result::Result<Message, WsError>) -> Option<Result<String>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(String::from_utf8(bytes).map_err(|e| {
            VisionError::MalformedMessage {
                message: format!("binary message is not UTF-8: {}", e),
            }
        })),
        Ok(Message::Close(frame)) => {
            debug!(?frame, "detection service sent close frame");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(VisionError::Transport {
            message: format!("Link read failed: {}", e),
        })),
    }
}

/// In-memory links and a scripted connector for driving the link task in tests.
#[cfg(test)]
pub(crate) mod mock {
    use super::{Connector, Link};
    use crate::error::{Result, VisionError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Service side of an in-memory link.
    ///
    /// Dropping the peer closes the link from the service side.
    pub struct LinkPeer {
        frames: mpsc::UnboundedReceiver<String>,
        messages: mpsc::UnboundedSender<Result<String>>,
    }

    impl LinkPeer {
        /// Deliver a text message to the client. Returns false once the client is gone.
        pub fn send_text(&self, text: impl Into<String>) -> bool {
            self.messages.send(Ok(text.into())).is_ok()
        }

        /// Deliver a transport-level error to the client.
        pub fn fail(&self, message: impl Into<String>) -> bool {
            self.messages
                .send(Err(VisionError::Transport {
                    message: message.into(),
                }))
                .is_ok()
        }

        /// Next frame payload sent by the client, or `None` once the client released the link.
        pub async fn next_frame(&mut self) -> Option<String> {
            self.frames.recv().await
        }
    }

    /// Create a connected in-memory link and its service-side peer.
    pub fn memory_link() -> (Link, LinkPeer) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<String>();
        let (message_tx, message_rx) = mpsc::unbounded_channel::<Result<String>>();

        let outbound = futures_util::sink::unfold(frame_tx, |tx, frame: String| async move {
            tx.send(frame).map_err(|_| VisionError::Transport {
                message: "peer dropped the link".to_string(),
            })?;
            Ok::<_, VisionError>(tx)
        });
        let inbound = futures_util::stream::unfold(message_rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });

        (
            Link {
                outbound: Box::pin(outbound),
                inbound: Box::pin(inbound),
            },
            LinkPeer {
                frames: frame_rx,
                messages: message_tx,
            },
        )
    }

    /// One scripted outcome of [`ScriptedConnector::connect`].
    pub enum ScriptedAttempt {
        /// The attempt fails with a transport error.
        Fail(String),
        /// The attempt succeeds with the given link.
        Open(Link),
        /// The attempt never completes.
        Hang,
    }

    /// Connector replaying a fixed script of outcomes, recording when each attempt happened.
    ///
    /// Attempts beyond the end of the script fail.
    #[derive(Default)]
    pub struct ScriptedConnector {
        script: Mutex<VecDeque<ScriptedAttempt>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedConnector {
        pub fn new(script: impl IntoIterator<Item = ScriptedAttempt>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                attempts: Mutex::new(Vec::new()),
            }
        }

        /// Instants at which `connect` was called, in order.
        pub fn attempts(&self) -> Vec<Instant> {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, endpoint: &str) -> Result<Link> {
            self.attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Instant::now());

            let next = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();

            match next {
                Some(ScriptedAttempt::Open(link)) => Ok(link),
                Some(ScriptedAttempt::Fail(message)) => Err(VisionError::Transport { message }),
                Some(ScriptedAttempt::Hang) => std::future::pending().await,
                None => Err(VisionError::Transport {
                    message: format!("no scripted link for {}", endpoint),
                }),
            }
        }
    }
}
