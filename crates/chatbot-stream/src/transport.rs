//! Cancellable transport for the chat endpoint.
//!
//! `POST {base_url}/chat` with the `ChatRequest` as JSON; the response body
//! is handed back as a raw byte stream for the frame decoder.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use chatbot_core::ChatRequest;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opens a streamed chat response.
///
/// This trait abstracts the HTTP call so the pipeline can be driven by a
/// scripted transport in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `request` and return the response body.
    ///
    /// Cancelling `cancel` must abandon the connection promptly, both while
    /// connecting and while the returned stream is being read.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Transport` if the connection cannot be
    /// established or the server answers without a readable body, and
    /// `StreamError::CancelledByUser` if `cancel` fires first.
    async fn send(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the backend at `base_url`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: &StreamConfig) -> Self {
        // No total timeout: a long reply may stream for as long as it keeps
        // sending.
        let client = reqwest::Client::builder()
            .read_timeout(config.read_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, base_url)
    }

    /// Create a transport with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream> {
        let url = self.chat_url();
        tracing::debug!(
            url = %url,
            conversation_id = %request.conversation_id(),
            model = %request.model_name(),
            "Opening chat stream"
        );

        let pending = self.client.post(&url).json(request).send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::CancelledByUser),
            result = pending => result
                .map_err(|e| StreamError::Transport(format!("request failed: {e}")))?,
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Err(StreamError::Transport("response has no body".to_string()));
        }
        if !status.is_success() {
            return Err(StreamError::Transport(format!("HTTP {status}")));
        }

        // Dropping the body stream closes the connection, so ending the
        // stream on cancellation is enough to abort the read.
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Transport(format!("read failed: {e}"))))
            .take_until(cancel.cancelled_owned());

        Ok(body.boxed())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptedTransport, ScriptedWriter};

#[cfg(any(test, feature = "test-utils"))]
mod scripted {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::{stream, StreamExt};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use chatbot_core::ChatRequest;

    use super::{ByteStream, Transport};
    use crate::error::{Result, StreamError};

    /// Feeds body chunks into a `ScriptedTransport` stream.
    #[derive(Debug, Clone)]
    pub struct ScriptedWriter {
        tx: mpsc::UnboundedSender<Result<Bytes>>,
    }

    impl ScriptedWriter {
        /// Push a body chunk. Returns `false` once the reader has gone away.
        pub fn chunk(&self, data: impl Into<Bytes>) -> bool {
            self.tx.send(Ok(data.into())).is_ok()
        }

        /// Push a read error.
        pub fn fail(&self, message: &str) -> bool {
            self.tx
                .send(Err(StreamError::Transport(message.to_string())))
                .is_ok()
        }
    }

    enum Script {
        Stream(mpsc::UnboundedReceiver<Result<Bytes>>),
        ConnectError(String),
    }

    /// Transport that replays scripted responses, one per `send`.
    ///
    /// Every request it receives is recorded for inspection.
    #[derive(Default)]
    pub struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        /// Create a transport with no scripted responses.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a streamed response; chunks are pushed through the writer.
        ///
        /// Dropping the writer ends the response body.
        pub fn push_stream(&self) -> ScriptedWriter {
            let (tx, rx) = mpsc::unbounded_channel();
            self.scripts.lock().push_back(Script::Stream(rx));
            ScriptedWriter { tx }
        }

        /// Queue a complete response body.
        pub fn push_body(&self, body: &str) {
            let writer = self.push_stream();
            writer.chunk(body.to_string());
        }

        /// Queue a connection failure.
        pub fn push_connect_error(&self, message: &str) {
            self.scripts
                .lock()
                .push_back(Script::ConnectError(message.to_string()));
        }

        /// Requests received so far.
        #[must_use]
        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: &ChatRequest,
            cancel: CancellationToken,
        ) -> Result<ByteStream> {
            self.requests.lock().push(request.clone());
            let script = self.scripts.lock().pop_front();
            match script {
                Some(Script::Stream(rx)) => {
                    let body = stream::unfold(rx, |mut rx| async move {
                        rx.recv().await.map(|item| (item, rx))
                    })
                    .take_until(cancel.cancelled_owned());
                    Ok(body.boxed())
                }
                Some(Script::ConnectError(message)) => Err(StreamError::Transport(message)),
                None => Err(StreamError::Transport("no scripted response".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_core::{AiModel, ConversationId, User};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        let user = User::new("u-1", "alice", "user").unwrap();
        let model = AiModel {
            model: "ollama".to_string(),
            model_name: "mistral".to_string(),
            display_name: "Ollama - Mistral".to_string(),
            description: String::new(),
        };
        ChatRequest::new(
            &user,
            ConversationId::new("c-1").unwrap(),
            &model,
            "Hello",
            Vec::new(),
        )
    }

    async fn read_body(stream: ByteStream) -> String {
        let chunks: Vec<Result<Bytes>> = stream.collect().await;
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(body).unwrap()
    }

    #[test]
    fn base_url_is_normalized() {
        let transport = HttpTransport::new("http://localhost:8000/", &StreamConfig::default());
        assert_eq!(transport.base_url(), "http://localhost:8000");
        assert_eq!(transport.chat_url(), "http://localhost:8000/chat");
    }

    #[tokio::test]
    async fn posts_request_and_streams_body() {
        let server = MockServer::start().await;
        let body = "data: {\"content\":\"Hi\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(serde_json::to_value(request()).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), &StreamConfig::default());
        let stream = transport
            .send(&request(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(read_body(stream).await, body);
    }

    #[tokio::test]
    async fn error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), &StreamConfig::default());
        let result = transport.send(&request(), CancellationToken::new()).await;
        assert!(matches!(result, Err(StreamError::Transport(_))));
    }

    #[tokio::test]
    async fn no_content_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), &StreamConfig::default());
        let result = transport.send(&request(), CancellationToken::new()).await;
        assert!(matches!(result, Err(StreamError::Transport(_))));
    }

    #[tokio::test]
    async fn cancelled_before_connect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), &StreamConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = transport.send(&request(), cancel).await;
        assert!(matches!(result, Err(StreamError::CancelledByUser)));
    }

    #[tokio::test]
    async fn cancel_after_headers_ends_body() {
        let server = MockServer::start().await;
        let body = "data: {\"content\":\"Hi\"}\n\n".repeat(256);
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), &StreamConfig::default());
        let cancel = CancellationToken::new();
        let mut stream = transport.send(&request(), cancel.clone()).await.unwrap();

        cancel.cancel();
        assert!(stream.next().await.is_none());
        // Stays ended.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Port 9 (discard) is not listening on test hosts.
        let transport = HttpTransport::new("http://127.0.0.1:9", &StreamConfig::default());
        let result = transport.send(&request(), CancellationToken::new()).await;
        assert!(matches!(result, Err(StreamError::Transport(_))));
    }

    #[tokio::test]
    async fn scripted_transport_records_requests() {
        let transport = ScriptedTransport::new();
        transport.push_body("data: {\"content\":\"x\"}\n\n");
        transport.push_connect_error("refused");

        let stream = transport
            .send(&request(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(read_body(stream).await, "data: {\"content\":\"x\"}\n\n");

        let second = transport.send(&request(), CancellationToken::new()).await;
        assert!(matches!(second, Err(StreamError::Transport(_))));
        assert_eq!(transport.requests().len(), 2);
    }
}
