//! A scripted JSON-RPC node served on a local socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

/// The scripted answer to one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    /// A raw HTTP response, for transport-level failures.
    Http { status: u16, body: String },
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub(crate) fn result(value: impl Into<Value>) -> Self {
        Self::Result(value.into())
    }

    pub(crate) fn error(code: i64, message: &str) -> Self {
        Self::Error {
            code,
            message: message.to_string(),
        }
    }

    pub(crate) fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }

    fn into_http(self, id: &Value) -> (Duration, u16, String) {
        match self {
            Self::Result(result) => (
                Duration::ZERO,
                200,
                json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string(),
            ),
            Self::Error { code, message } => (
                Duration::ZERO,
                200,
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message },
                })
                .to_string(),
            ),
            Self::Http { status, body } => (Duration::ZERO, status, body),
            Self::Delayed(delay, inner) => {
                let (more, status, body) = inner.into_http(id);
                (delay + more, status, body)
            }
        }
    }
}

type Handler = dyn Fn(&str, &Value) -> Reply + Send + Sync;
type Calls = Arc<Mutex<Vec<(String, Value)>>>;

/// Answers every JSON-RPC request through `handler` and records the calls it saw.
pub(crate) struct StubNode {
    url: Url,
    calls: Calls,
    task: JoinHandle<()>,
}

impl StubNode {
    pub(crate) async fn start(
        handler: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let calls: Calls = Arc::default();
        let handler: Arc<Handler> = Arc::new(handler);

        let task = tokio::spawn({
            let calls = calls.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, handler.clone(), calls.clone()));
                }
            }
        });

        Self { url, calls, task }
    }

    pub(crate) fn url(&self) -> Url {
        self.url.clone()
    }

    /// Methods in the order they were received.
    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// Params of the first call to `method`.
    pub(crate) fn params(&self, method: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }
}

impl Drop for StubNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, handler: Arc<Handler>, calls: Calls) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();
    calls.lock().unwrap().push((method.clone(), params.clone()));

    let (delay, status, body) = handler(&method, &params).into_http(&request["id"]);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let response = format!(
        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Reads one HTTP request and decodes its JSON body.
async fn read_request(stream: &mut TcpStream) -> Option<Value> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    serde_json::from_slice(&buf[body_start..body_start + content_length]).ok()
}
