// src/lsp/transport.rs - Request/response correlation over a framed byte stream

use super::codec::{FrameError, FrameReader, FrameWriter};
use super::events::{DefaultRequestHandler, RequestHandler, ServerEvent, ServerRequest};
use log::{debug, warn};
use lsp_server::{Message, RequestId, Response};
use serde_json::Value;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Server error {code}: {message}")]
    ServerError { code: i32, message: String },
    #[error("Connection closed")]
    ConnectionClosed,
}

/// One side of a JSON-RPC conversation.
///
/// A background task decodes incoming frames into a channel; `request` waits on that
/// channel until the response carrying its id shows up. Everything that arrives in
/// between is answered (server requests) or buffered (notifications) in arrival order.
/// Requests are not pipelined: `request` takes `&mut self`, so at most one is pending.
pub struct Transport {
    writer: FrameWriter<BoxedWriter>,
    incoming: mpsc::UnboundedReceiver<Message>,
    handler: Box<dyn RequestHandler>,
    buffered: VecDeque<ServerEvent>,
    next_id: i32,
    closed: bool,
    reader_handle: JoinHandle<()>,
}

impl Transport {
    /// Wrap a pair of streams, e.g. a child's stdout and stdin.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sender, incoming) = mpsc::unbounded_channel();
        let reader_handle = tokio::spawn(read_loop(FrameReader::new(reader), sender));

        Self {
            writer: FrameWriter::new(Box::new(writer) as BoxedWriter),
            incoming,
            handler: Box::new(DefaultRequestHandler),
            buffered: VecDeque::new(),
            next_id: 0,
            closed: false,
            reader_handle,
        }
    }

    pub fn with_handler(mut self, handler: Box<dyn RequestHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Send a request and wait for its result.
    ///
    /// A `null` result comes back as `None`. An error object from the server becomes
    /// `TransportError::ServerError`. If the peer goes away first the call fails with
    /// `ConnectionClosed` instead of waiting forever.
    pub async fn request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Option<Value>, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let id = RequestId::from(self.next_id);
        self.next_id += 1;
        debug!("-> request {} {}", id, method);
        let request = lsp_server::Request::new(id.clone(), method.to_string(), params);
        self.send(Message::Request(request)).await?;

        loop {
            let message = match self.incoming.recv().await {
                Some(message) => message,
                None => {
                    self.closed = true;
                    return Err(TransportError::ConnectionClosed);
                }
            };

            match message {
                Message::Response(response) if response.id == id => {
                    debug!("<- response {}", id);
                    if let Some(error) = response.error {
                        return Err(TransportError::ServerError {
                            code: error.code,
                            message: error.message,
                        });
                    }
                    return Ok(response.result.filter(|value| !value.is_null()));
                }
                other => self.accept_unsolicited(other).await?,
            }
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        debug!("-> notification {}", method);
        let notification = lsp_server::Notification::new(method.to_string(), params);
        self.send(Message::Notification(notification)).await
    }

    /// Answer a server-initiated request.
    pub async fn respond(&mut self, id: RequestId, result: Value) -> Result<(), TransportError> {
        self.send(Message::Response(Response::new_ok(id, result)))
            .await
    }

    /// Move every frame that has already arrived into the buffer without waiting.
    ///
    /// Returns how many messages were taken off the wire.
    pub async fn poll(&mut self) -> Result<usize, TransportError> {
        let mut count = 0;
        loop {
            match self.incoming.try_recv() {
                Ok(message) => {
                    count += 1;
                    self.accept_unsolicited(message).await?;
                }
                Err(TryRecvError::Empty) => return Ok(count),
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    return Ok(count);
                }
            }
        }
    }

    /// Take the buffered messages, oldest first.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        self.buffered.drain(..).collect()
    }

    pub fn has_buffered_events(&self) -> bool {
        !self.buffered.is_empty()
    }

    /// True once the reader has seen end-of-stream or a fatal framing error.
    pub fn is_closed(&self) -> bool {
        self.closed || self.incoming.is_closed() && self.incoming.is_empty()
    }

    async fn accept_unsolicited(&mut self, message: Message) -> Result<(), TransportError> {
        match message {
            Message::Notification(notification) => {
                debug!("<- notification {}", notification.method);
                self.buffered
                    .push_back(ServerEvent::from_notification(notification));
            }
            Message::Request(request) => {
                debug!("<- server request {} {}", request.id, request.method);
                let parsed = ServerRequest::parse(&request);
                let response = self.handler.handle(request.id.clone(), parsed);
                self.send(Message::Response(response)).await?;
                self.buffered.push_back(ServerEvent::Request {
                    id: request.id,
                    method: request.method,
                });
            }
            Message::Response(response) => {
                warn!("Discarding response {} with no pending request", response.id);
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        let value = encode_message(message)?;
        self.writer.write_json(&value).await.map_err(|e| {
            self.closed = true;
            match e {
                FrameError::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => {
                    TransportError::ConnectionClosed
                }
                other => TransportError::Frame(other),
            }
        })
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Serialize a message with the `jsonrpc` member `lsp_server::Message` leaves out.
pub fn encode_message(message: Message) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(message)?;
    if let Value::Object(map) = &mut value {
        map.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    }
    Ok(value)
}

/// Decode a payload into a message. Anything that isn't a JSON-RPC message is an error.
pub fn decode_message(payload: &[u8]) -> Result<Message, serde_json::Error> {
    serde_json::from_slice(payload)
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    sender: mpsc::UnboundedSender<Message>,
) {
    loop {
        match reader.read_frame().await {
            Ok(Some(payload)) => match decode_message(&payload) {
                Ok(message) => {
                    if sender.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // Stay on the stream; the next header re-synchronizes us.
                    warn!(
                        "Skipping undecodable message ({}): {}",
                        e,
                        String::from_utf8_lossy(&payload)
                    );
                }
            },
            Ok(None) => {
                debug!("Server closed its output stream");
                break;
            }
            Err(e) => {
                warn!("Server stream ended: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    struct Peer {
        reader: FrameReader<DuplexStream>,
        writer: FrameWriter<DuplexStream>,
    }

    impl Peer {
        async fn next(&mut self) -> Value {
            let payload = self.reader.read_frame().await.unwrap().unwrap();
            serde_json::from_slice(&payload).unwrap()
        }

        async fn send(&mut self, value: Value) {
            self.writer.write_json(&value).await.unwrap();
        }
    }

    fn pair() -> (Transport, Peer) {
        let (client_out, peer_in) = duplex(64 * 1024);
        let (peer_out, client_in) = duplex(64 * 1024);
        let transport = Transport::new(client_in, client_out);
        let peer = Peer {
            reader: FrameReader::new(peer_in),
            writer: FrameWriter::new(peer_out),
        };
        (transport, peer)
    }

    #[tokio::test]
    async fn test_request_returns_matching_result() {
        let (mut transport, mut peer) = pair();
        let server = tokio::spawn(async move {
            let request = peer.next().await;
            assert_eq!(request["method"], "textDocument/hover");
            assert_eq!(request["jsonrpc"], "2.0");
            peer.send(serde_json::json!({
                "jsonrpc": "2.0", "id": request["id"], "result": { "contents": "doc" }
            }))
            .await;
            peer
        });

        let result = transport
            .request("textDocument/hover", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result.unwrap()["contents"], "doc");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_null_result_is_absent() {
        let (mut transport, mut peer) = pair();
        let server = tokio::spawn(async move {
            let request = peer.next().await;
            peer.send(serde_json::json!({ "jsonrpc": "2.0", "id": request["id"], "result": null }))
                .await;
            peer
        });
        let result = transport.request("shutdown", Value::Null).await.unwrap();
        assert!(result.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_object_escalates() {
        let (mut transport, mut peer) = pair();
        let server = tokio::spawn(async move {
            let request = peer.next().await;
            peer.send(serde_json::json!({
                "jsonrpc": "2.0", "id": request["id"],
                "error": { "code": -32601, "message": "nope" }
            }))
            .await;
            peer
        });
        match transport.request("x", Value::Null).await {
            Err(TransportError::ServerError { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_exit_fails_pending_request() {
        let (mut transport, mut peer) = pair();
        let server = tokio::spawn(async move {
            let _ = peer.next().await;
            drop(peer);
        });
        assert!(matches!(
            transport.request("x", Value::Null).await,
            Err(TransportError::ConnectionClosed)
        ));
        server.await.unwrap();
        assert!(transport.is_closed());
    }
}
