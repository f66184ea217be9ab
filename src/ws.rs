use std::{
    net::TcpListener,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use serde_json::Value;
use tungstenite::{Error as WsError, Message, accept};

use crate::{
    pipeline::Director,
    protocol::{
        ErrorPayload, MemoryResultsPayload, MemorySearchPayload, SceneRequestPayload, WSMessage,
    },
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// One queued scene request and the outbound channel of the client that sent it.
#[derive(Debug, Clone)]
pub struct SceneJob {
    pub request_id: Option<String>,
    pub payload: SceneRequestPayload,
    pub reply: Sender<String>,
}

fn spawn_server_ping_loop(hub: WsHub) {
    thread::spawn(move || {
        loop {
            let ping = WSMessage::<Value>::new("ping", None, None);
            if let Ok(text) = serde_json::to_string(&ping) {
                hub.broadcast(text);
            }
            thread::sleep(HEARTBEAT_INTERVAL);
        }
    });
}

#[derive(Clone, Default)]
pub struct WsHub {
    clients: Arc<Mutex<Vec<Sender<String>>>>,
}

impl WsHub {
    pub fn broadcast(&self, text: String) {
        let Ok(mut clients) = self.clients.lock() else {
            return;
        };
        clients.retain(|tx| tx.send(text.clone()).is_ok());
    }

    fn register_client(&self, tx: Sender<String>) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(tx);
        }
    }
}

/// Start `workers` threads that run queued scene requests to completion.
/// Each job is an independent pipeline run; results go back on the job's
/// reply channel.
pub fn spawn_workers(director: &Director, jobs: Receiver<SceneJob>, workers: usize) -> Vec<thread::JoinHandle<()>> {
    (0..workers.max(1))
        .map(|n| {
            let director = director.clone();
            let jobs = jobs.clone();
            thread::spawn(move || {
                for job in jobs.iter() {
                    debug!("[ws] worker {n} picked up request {:?}", job.request_id);
                    let response = director.process(&job.payload);
                    let msg = WSMessage::new("scene_result", job.request_id, Some(response));
                    match serde_json::to_string(&msg) {
                        Ok(text) => {
                            // The client may have disconnected while we worked.
                            let _ = job.reply.send(text);
                        }
                        Err(e) => warn!("[ws] failed to encode scene result: {e}"),
                    }
                }
            })
        })
        .collect()
}

pub fn spawn_ws_server(addr: &str, director: Director) -> Result<thread::JoinHandle<()>> {
    let addr_str = addr.to_string();
    let server =
        TcpListener::bind(addr).with_context(|| format!("failed to bind ws server at {addr}"))?;

    let server_settings = &director.settings().server;
    let (job_tx, job_rx) = crossbeam_channel::bounded::<SceneJob>(server_settings.queue_capacity.max(1));
    spawn_workers(&director, job_rx, server_settings.workers);

    let hub = WsHub::default();
    spawn_server_ping_loop(hub.clone());

    Ok(thread::spawn(move || {
        if let Err(e) = run_ws_server(server, &addr_str, director, job_tx, hub) {
            warn!("[ws] server failed: {e:?}");
        }
    }))
}

fn run_ws_server(
    server: TcpListener,
    addr: &str,
    director: Director,
    jobs: Sender<SceneJob>,
    hub: WsHub,
) -> Result<()> {
    info!("[ws] listening on ws://{addr}");

    for stream in server.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("[ws] accept tcp failed: {e}");
                continue;
            }
        };

        let director = director.clone();
        let jobs = jobs.clone();
        let hub = hub.clone();

        thread::spawn(move || {
            if let Err(e) = handle_client(stream, &director, &jobs, &hub) {
                debug!("[ws] client ended: {e:?}");
            }
        });
    }

    Ok(())
}

fn handle_client(
    stream: std::net::TcpStream,
    director: &Director,
    jobs: &Sender<SceneJob>,
    hub: &WsHub,
) -> Result<()> {
    // Handshake is easier with a blocking socket, switch to non-blocking afterwards.
    let mut ws = accept(stream).context("websocket handshake failed")?;
    ws.get_mut()
        .set_nonblocking(true)
        .context("failed to set tcp non-blocking")?;

    let (client_tx, client_rx) = crossbeam_channel::unbounded::<String>();
    hub.register_client(client_tx.clone());

    loop {
        // 1) flush outbound (results from workers, heartbeats)
        while let Ok(text) = client_rx.try_recv() {
            let _ = ws.send(Message::Text(text));
        }

        // 2) read inbound
        match ws.read() {
            Ok(Message::Text(text)) => handle_text_message(&text, director, jobs, &client_tx),
            Ok(Message::Binary(_)) => {}
            Ok(Message::Ping(payload)) => {
                let _ = ws.send(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(WsError::Io(ref io)) if io.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(WsError::AlreadyClosed) | Err(WsError::ConnectionClosed) => break,
            Err(e) => return Err(e).context("websocket read failed"),
        }

        thread::sleep(Duration::from_millis(5));
    }

    Ok(())
}

/// Handle one inbound text frame. Every reply, immediate or from a worker,
/// goes through `reply`.
pub fn handle_text_message(text: &str, director: &Director, jobs: &Sender<SceneJob>, reply: &Sender<String>) {
    let msg: WSMessage<Value> = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(reply, None, "PARSE_ERROR", &format!("invalid json: {e}"));
            return;
        }
    };

    match msg.msg_type.as_str() {
        "ping" => {
            send(reply, &WSMessage::<Value>::new("pong", msg.request_id, None));
        }
        "pong" => {
            // No-op: clients may auto-reply to server-initiated pings.
        }
        "scene_request" => {
            let payload: SceneRequestPayload = match parse_payload(msg.payload) {
                Ok(p) => p,
                Err(e) => {
                    send_error(reply, msg.request_id, "PARSE_ERROR", &format!("{e:#}"));
                    return;
                }
            };
            let job = SceneJob {
                request_id: msg.request_id,
                payload,
                reply: reply.clone(),
            };
            match jobs.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    send_error(reply, job.request_id, "BUSY", "scene queue is full, retry later");
                }
                Err(TrySendError::Disconnected(job)) => {
                    send_error(reply, job.request_id, "UNAVAILABLE", "no scene workers running");
                }
            }
        }
        "memory_search" => {
            let payload: MemorySearchPayload = match parse_payload(msg.payload) {
                Ok(p) => p,
                Err(e) => {
                    send_error(reply, msg.request_id, "PARSE_ERROR", &format!("{e:#}"));
                    return;
                }
            };
            let limits = &director.settings().memory;
            let results = director.memory().search(
                &payload.query,
                payload.limit.unwrap_or(limits.search_limit),
                payload.min_score.unwrap_or(limits.min_score),
            );
            match results {
                Ok(results) => send(
                    reply,
                    &WSMessage::new(
                        "memory_results",
                        msg.request_id,
                        Some(MemoryResultsPayload { results }),
                    ),
                ),
                Err(e) => send_error(reply, msg.request_id, "MEMORY_ERROR", &format!("{e:#}")),
            }
        }
        other => {
            send_error(
                reply,
                msg.request_id,
                "PARSE_ERROR",
                &format!("unknown message type: {other}"),
            );
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> Result<T> {
    let payload = payload.ok_or_else(|| anyhow!("missing payload"))?;
    serde_json::from_value(payload).context("invalid payload")
}

fn send<T: serde::Serialize>(reply: &Sender<String>, msg: &WSMessage<T>) {
    if let Ok(text) = serde_json::to_string(msg) {
        let _ = reply.send(text);
    }
}

fn send_error(reply: &Sender<String>, request_id: Option<String>, code: &str, message: &str) {
    let err = WSMessage::new(
        "error",
        request_id,
        Some(ErrorPayload {
            code: code.to_string(),
            message: message.to_string(),
        }),
    );
    send(reply, &err);
}
