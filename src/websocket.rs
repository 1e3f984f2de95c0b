/// WebSocket transport for the data explorer service
use actix::prelude::*;
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::keycodec::AccessKey;
use crate::messages::{RpcRequest, RpcResponse, ServerEvent};
use crate::service::{DataExplorerService, VariableUpdate};
use crate::table::{frame_from_json, series_from_json};

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// How often queued events are flushed to the client
const EVENT_FLUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Shared state for all WebSocket connections
pub struct AppState {
    pub service: Arc<Mutex<DataExplorerService>>,
}

impl AppState {
    pub fn new(num_workers: usize) -> Self {
        Self {
            service: Arc::new(Mutex::new(DataExplorerService::new(num_workers))),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsClientMessage {
    /// Register a table from inline JSON data and open a view over it
    OpenTable {
        display_name: String,
        data: JsonValue,
        #[serde(default)]
        as_series: bool,
        #[serde(default)]
        path: Option<Vec<String>>,
    },

    /// Close a view
    CloseTable { comm_id: String },

    /// Report that a bound variable was reassigned or possibly mutated
    UpdateVariable {
        path: Vec<String>,
        #[serde(default)]
        new_data: Option<JsonValue>,
    },

    /// A table-view RPC addressed by comm id
    Rpc(RpcRequest),
}

/// Messages sent from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsServerMessage {
    Opened {
        comm_id: String,
    },
    Closed {
        comm_id: String,
    },
    RpcReply {
        comm_id: String,
        #[serde(flatten)]
        response: RpcResponse,
    },
    Event {
        comm_id: String,
        #[serde(flatten)]
        event: ServerEvent,
    },
    Error {
        message: String,
    },
}

/// WebSocket connection actor
pub struct ExplorerWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
}

impl ExplorerWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::info!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Periodically drain the service's outbound queue so asynchronous
    /// profile results and update notifications reach the client.
    fn flush_events(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(EVENT_FLUSH_INTERVAL, |act, ctx| {
            let events = match act.state.service.lock() {
                Ok(service) => service.take_events(),
                Err(_) => return,
            };
            for (comm_id, event) in events {
                send(ctx, &WsServerMessage::Event { comm_id, event });
            }
        });
    }

    fn handle_client_message(
        &mut self,
        msg: WsClientMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let mut service = match self.state.service.lock() {
            Ok(s) => s,
            Err(_) => {
                send(
                    ctx,
                    &WsServerMessage::Error {
                        message: "service unavailable".to_string(),
                    },
                );
                return;
            }
        };

        match msg {
            WsClientMessage::OpenTable {
                display_name,
                data,
                as_series,
                path,
            } => {
                let backing = if as_series {
                    series_from_json(&display_name, &data)
                } else {
                    frame_from_json(&display_name, &data)
                };
                match backing {
                    Ok(backing) => {
                        let keys: Option<Vec<AccessKey>> = path.map(|segments| {
                            segments.into_iter().map(AccessKey::Str).collect()
                        });
                        let comm_id = service.register_table(
                            display_name,
                            Arc::new(backing),
                            keys.as_deref(),
                        );
                        send(ctx, &WsServerMessage::Opened { comm_id });
                    }
                    Err(message) => send(ctx, &WsServerMessage::Error { message }),
                }
            }

            WsClientMessage::CloseTable { comm_id } => {
                if service.close_table(&comm_id) {
                    send(ctx, &WsServerMessage::Closed { comm_id });
                } else {
                    send(
                        ctx,
                        &WsServerMessage::Error {
                            message: format!("unknown comm id '{}'", comm_id),
                        },
                    );
                }
            }

            WsClientMessage::UpdateVariable { path, new_data } => {
                let keys: Vec<AccessKey> = path.into_iter().map(AccessKey::Str).collect();
                let update = match new_data {
                    Some(data) => match frame_from_json("updated", &data) {
                        Ok(backing) => VariableUpdate::Reassigned(Arc::new(backing)),
                        Err(message) => {
                            send(ctx, &WsServerMessage::Error { message });
                            return;
                        }
                    },
                    None => VariableUpdate::MaybeMutated,
                };
                service.handle_variable_update(&keys, update);
                // Update events go out immediately rather than on the timer
                for (comm_id, event) in service.take_events() {
                    send(ctx, &WsServerMessage::Event { comm_id, event });
                }
            }

            WsClientMessage::Rpc(request) => {
                let comm_id = request.comm_id.clone();
                let response = service.handle_request(request);
                send(ctx, &WsServerMessage::RpcReply { comm_id, response });
            }
        }
    }
}

fn send(ctx: &mut ws::WebsocketContext<ExplorerWebSocket>, msg: &WsServerMessage) {
    match serde_json::to_string(msg) {
        Ok(text) => ctx.text(text),
        Err(e) => log::error!("failed to serialize server message: {}", e),
    }
}

impl Actor for ExplorerWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.flush_events(ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ExplorerWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<WsClientMessage>(&text) {
                    Ok(client_msg) => {
                        self.handle_client_message(client_msg, ctx);
                    }
                    Err(e) => {
                        send(
                            ctx,
                            &WsServerMessage::Error {
                                message: format!("Invalid message format: {}", e),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                log::warn!("Unexpected binary message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}
