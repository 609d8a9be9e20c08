//! In-process gateway double: the HTTP routes and the `/ws` socket.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex, Notify},
};

pub(crate) const TOKEN: &str = "T1";
pub(crate) const ME: i64 = 7;
/// Pushing this asks the socket task to close the connection.
pub(crate) const CLOSE_SOCKET: &str = "__close__";

#[derive(Default)]
pub(crate) struct GatewayData {
    pub friends: Vec<(i64, String)>,
    pub requests: Vec<(i64, String)>,
    /// peer id -> (from, content, timestamp millis)
    pub history: HashMap<i64, Vec<(i64, String, i64)>>,
    pub history_gates: HashMap<i64, Arc<Notify>>,
    pub history_failure: Option<String>,
    pub sessions: Vec<(i64, String, i64)>,
    pub sessions_failure: Option<String>,
    pub handle_failure: Option<String>,
    pub received_frames: Vec<String>,
    pub history_calls: Vec<i64>,
}

#[derive(Clone)]
pub(crate) struct MockGateway {
    pub url: String,
    pub data: Arc<Mutex<GatewayData>>,
    push: broadcast::Sender<String>,
    frame_received: Arc<Notify>,
    socket_connected: Arc<Notify>,
}

impl MockGateway {
    pub async fn spawn(data: GatewayData) -> Self {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (push, _) = broadcast::channel(64);
        let gateway = Self {
            url: format!("http://{addr}"),
            data: Arc::new(Mutex::new(data)),
            push,
            frame_received: Arc::new(Notify::new()),
            socket_connected: Arc::new(Notify::new()),
        };
        let app = Router::new()
            .route("/api/login", post(login))
            .route("/api/register", post(register))
            .route("/api/friend/list", get(friend_list))
            .route("/api/friend/requests", get(friend_requests))
            .route("/api/friend/add", post(friend_add))
            .route("/api/friend/request/handle", post(handle_request))
            .route("/api/history", get(history))
            .route("/api/sessions", get(sessions))
            .route("/ws", get(ws_upgrade))
            .with_state(gateway.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        gateway
    }

    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.push.send(frame.into());
    }

    pub async fn wait_socket_connected(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.socket_connected.notified())
            .await
            .expect("socket connected");
    }

    pub async fn next_received_frame(&self) -> String {
        loop {
            {
                let mut data = self.data.lock().await;
                if !data.received_frames.is_empty() {
                    return data.received_frames.remove(0);
                }
            }
            tokio::time::timeout(Duration::from_secs(5), self.frame_received.notified())
                .await
                .expect("frame received");
        }
    }

    pub async fn release_history(&self, peer_id: i64) {
        let gate = self.data.lock().await.history_gates.get(&peer_id).cloned();
        if let Some(gate) = gate {
            gate.notify_one();
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: String,
    #[serde(default)]
    peer_id: Option<i64>,
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "Invalid token"})),
    )
        .into_response()
}

fn failure(message: &str) -> Response {
    Json(json!({"success": false, "message": message})).into_response()
}

fn form_value<'a>(form: &'a HashMap<String, String>, key: &str) -> &'a str {
    form.get(key).map(String::as_str).unwrap_or_default()
}

async fn login(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    if form_value(&form, "username") == "alice" && form_value(&form, "password") == "pw" {
        Json(json!({
            "success": true,
            "message": "Login successful",
            "token": TOKEN,
            "user_id": ME,
        }))
    } else {
        Json(json!({"success": false, "message": "Login failed"}))
    }
}

async fn register(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    if form_value(&form, "username") == "alice" {
        Json(json!({"success": false, "message": "Register failed"}))
    } else {
        Json(json!({"success": true, "message": "Register successful", "user_id": 11}))
    }
}

async fn friend_list(State(gw): State<MockGateway>, Query(q): Query<TokenQuery>) -> Response {
    if q.token != TOKEN {
        return invalid_token();
    }
    let data = gw.data.lock().await;
    let friends: Vec<Value> = data
        .friends
        .iter()
        .map(|(id, name)| json!({"user_id": id, "username": name, "status": 1}))
        .collect();
    Json(json!({"success": true, "friends": friends})).into_response()
}

async fn friend_requests(State(gw): State<MockGateway>, Query(q): Query<TokenQuery>) -> Response {
    if q.token != TOKEN {
        return invalid_token();
    }
    let data = gw.data.lock().await;
    let requests: Vec<Value> = data
        .requests
        .iter()
        .enumerate()
        .map(|(idx, (id, name))| {
            json!({"request_id": idx + 1, "sender_id": id, "sender_username": name})
        })
        .collect();
    Json(json!({"success": true, "requests": requests})).into_response()
}

async fn friend_add(Form(form): Form<HashMap<String, String>>) -> Response {
    if form_value(&form, "token") != TOKEN {
        return invalid_token();
    }
    if form_value(&form, "friend_id") == ME.to_string() {
        return failure("Cannot add yourself");
    }
    Json(json!({"success": true, "message": "Friend request sent"})).into_response()
}

/// Accepting appends the sender without checking for an existing row, like a
/// write-through cache that does not dedupe.
async fn handle_request(
    State(gw): State<MockGateway>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if form_value(&form, "token") != TOKEN {
        return invalid_token();
    }
    let mut data = gw.data.lock().await;
    if let Some(message) = data.handle_failure.clone() {
        return failure(&message);
    }
    let Ok(sender_id) = form_value(&form, "request_id").parse::<i64>() else {
        return failure("Invalid request id");
    };
    let accept = form_value(&form, "accept") == "true";
    let username = data
        .requests
        .iter()
        .find(|(id, _)| *id == sender_id)
        .map(|(_, name)| name.clone())
        .unwrap_or_else(|| format!("user{sender_id}"));
    data.requests.retain(|(id, _)| *id != sender_id);
    if accept {
        data.friends.push((sender_id, username));
    }
    Json(json!({"success": true, "message": "Request handled"})).into_response()
}

async fn history(State(gw): State<MockGateway>, Query(q): Query<TokenQuery>) -> Response {
    if q.token != TOKEN {
        return invalid_token();
    }
    let peer_id = q.peer_id.unwrap_or_default();
    let gate = {
        let mut data = gw.data.lock().await;
        data.history_calls.push(peer_id);
        data.history_gates.get(&peer_id).cloned()
    };
    if let Some(gate) = gate {
        gate.notified().await;
    }
    let data = gw.data.lock().await;
    if let Some(message) = data.history_failure.clone() {
        return failure(&message);
    }
    let messages: Vec<Value> = data
        .history
        .get(&peer_id)
        .map(|rows| {
            rows.iter()
                .enumerate()
                .map(|(idx, (from, content, ts))| {
                    let to = if *from == ME { peer_id } else { ME };
                    json!({
                        "msg_id": idx + 1,
                        "from": from,
                        "to": to,
                        "content": content,
                        "timestamp": ts,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Json(json!({"success": true, "messages": messages})).into_response()
}

async fn sessions(State(gw): State<MockGateway>, Query(q): Query<TokenQuery>) -> Response {
    if q.token != TOKEN {
        return invalid_token();
    }
    let data = gw.data.lock().await;
    if let Some(message) = data.sessions_failure.clone() {
        return failure(&message);
    }
    let sessions: Vec<Value> = data
        .sessions
        .iter()
        .map(|(peer, last, ts)| {
            json!({"peer_id": peer, "last_msg": last, "timestamp": ts, "unread": 0})
        })
        .collect();
    Json(json!({"success": true, "sessions": sessions})).into_response()
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(gw): State<MockGateway>,
    Query(q): Query<TokenQuery>,
) -> Response {
    if q.token != TOKEN {
        return invalid_token();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, gw))
}

async fn serve_socket(mut socket: WebSocket, gw: MockGateway) {
    let mut push = gw.push.subscribe();
    gw.socket_connected.notify_one();
    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    gw.data.lock().await.received_frames.push(text);
                    gw.frame_received.notify_one();
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            outbound = push.recv() => match outbound {
                Ok(text) if text == CLOSE_SOCKET => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
}
