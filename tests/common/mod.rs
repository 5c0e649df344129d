//! In-process mock of the signing middleware.
//!
//! Accepts any number of sequential connections on a random local port,
//! records every request and answers through a responder closure. Tests
//! can inject raw frames and drop the live connection.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use xtx_client::{Action, ClientBuilder, Event};

/// Bound on every wait in the integration tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Computes the `retVal` for a request, or `None` to leave it unanswered.
pub type Responder = Arc<dyn Fn(&str, &Value) -> Option<String> + Send + Sync>;

/// Answers `SOF_GetVersion` only.
pub fn version_only() -> Responder {
    Arc::new(|method: &str, _: &Value| (method == "SOF_GetVersion").then(|| "2.14".to_string()))
}

enum Control {
    Send(String),
    DropConnection,
}

/// Running mock middleware.
pub struct MockMiddleware {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    requests_tx: broadcast::Sender<Value>,
    connections: Arc<AtomicUsize>,
    control_tx: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl MockMiddleware {
    /// Starts a mock that answers through `responder`.
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (requests_tx, _) = broadcast::channel(1024);
        let connections = Arc::new(AtomicUsize::new(0));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(serve(
            listener,
            responder,
            Arc::clone(&requests),
            requests_tx.clone(),
            Arc::clone(&connections),
            control_rx,
        ));

        Self {
            port,
            requests,
            requests_tx,
            connections,
            control_tx,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client builder aimed at this mock with fast reconnection and a
    /// keep-alive that stays out of the way.
    pub fn client_builder(&self) -> ClientBuilder {
        xtx_client::Client::builder()
            .port(self.port)
            .reconnect_interval(Duration::from_millis(50))
            .reconnect_attempts(5)
            .keep_alive_interval(Duration::from_secs(3600))
    }

    /// Subscribes to requests received from now on.
    pub fn watch_requests(&self) -> broadcast::Receiver<Value> {
        self.requests_tx.subscribe()
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    /// Number of received requests calling `method`.
    pub fn count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r["xtx_func_name"] == method)
            .count()
    }

    /// Number of accepted connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sends a reply frame on the live connection.
    pub fn reply(&self, call_cmd_id: &str, ret_val: &str) {
        self.send_raw(json!({ "call_cmd_id": call_cmd_id, "retVal": ret_val }).to_string());
    }

    /// Sends a push frame on the live connection.
    pub fn push(&self, event: &str, ret_val: &str) {
        self.reply(event, ret_val);
    }

    /// Sends arbitrary text on the live connection.
    pub fn send_raw(&self, text: impl Into<String>) {
        self.control_tx
            .send(Control::Send(text.into()))
            .expect("mock running");
    }

    /// Closes the live connection; new connections are still accepted.
    pub fn drop_connection(&self) {
        self.control_tx
            .send(Control::DropConnection)
            .expect("mock running");
    }
}

impl Drop for MockMiddleware {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    responder: Responder,
    requests: Arc<Mutex<Vec<Value>>>,
    requests_tx: broadcast::Sender<Value>,
    connections: Arc<AtomicUsize>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            continue;
        };
        connections.fetch_add(1, Ordering::SeqCst);

        loop {
            tokio::select! {
                message = ws.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(_)) => continue,
                        _ => break,
                    };
                    let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };

                    let method = request["xtx_func_name"].as_str().unwrap_or_default().to_string();
                    let call_cmd_id = request["call_cmd_id"].as_str().unwrap_or_default().to_string();
                    requests.lock().push(request.clone());
                    let answer = responder(&method, &request);
                    let _ = requests_tx.send(request);

                    if let Some(ret_val) = answer {
                        let frame = json!({ "call_cmd_id": call_cmd_id, "retVal": ret_val });
                        if ws.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                }
                control = control_rx.recv() => {
                    match control {
                        Some(Control::Send(text)) => {
                            if ws.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Control::DropConnection) => {
                            let _ = ws.close(None).await;
                            break;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

/// Waits for the next request calling `method`, skipping others.
pub async fn next_request(requests: &mut broadcast::Receiver<Value>, method: &str) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let request = requests.recv().await.expect("request stream");
            if request["xtx_func_name"] == method {
                return request;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {method} request within {WAIT:?}"))
}

/// Waits for the next event with `action`, skipping others.
pub async fn wait_for(events: &mut broadcast::Receiver<Event>, action: Action) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if event.action == action => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {action} event within {WAIT:?}"))
}

/// Returns the `call_cmd_id` of a recorded request.
pub fn call_cmd_id(request: &Value) -> String {
    request["call_cmd_id"]
        .as_str()
        .expect("call_cmd_id is a string")
        .to_string()
}
