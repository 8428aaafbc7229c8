// src/ws.rs
//
// Realtime notifications: one hub actor keeps every open websocket session
// per user and fans events out to them.

use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, Recipient};
use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::auth::decode_token;
use crate::AppState;

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

pub const MESSAGE_NEW: &str = "message.new";
pub const MATCH_NEW: &str = "match.new";
pub const MATCH_STATUS: &str = "match.status";
pub const PRODUCT_FEATURED: &str = "product.featured";
pub const DISCOUNT_REDEEMED: &str = "discount.redeemed";
pub const SUBSCRIPTION_STATUS: &str = "subscription.status";
pub const AUCTION_BID: &str = "auction.bid";
pub const AUCTION_OUTBID: &str = "auction.outbid";
pub const AUCTION_WON: &str = "auction.won";
pub const TRADE_ACTIVATED: &str = "trade.activated";

#[derive(Message)]
#[rtype(result = "()")]
struct WsMessage(pub String);

#[derive(Message)]
#[rtype(result = "()")]
struct Connect {
    user_id: i32,
    session_id: usize,
    addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Disconnect {
    user_id: i32,
    session_id: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub event: &'static str,
    pub data: serde_json::Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Notify {
    pub user_id: i32,
    pub notification: Notification,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub notification: Notification,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct ConnectedUsers;

#[derive(Default)]
pub struct NotificationHub {
    sessions: HashMap<i32, HashMap<usize, Recipient<WsMessage>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for NotificationHub {
    type Context = actix::Context<Self>;
}

impl Handler<Connect> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) -> Self::Result {
        self.sessions
            .entry(msg.user_id)
            .or_default()
            .insert(msg.session_id, msg.addr);
    }
}

impl Handler<Disconnect> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) -> Self::Result {
        if let Some(user_sessions) = self.sessions.get_mut(&msg.user_id) {
            user_sessions.remove(&msg.session_id);
            if user_sessions.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<Notify> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Notify, _: &mut Self::Context) -> Self::Result {
        if let Some(user_sessions) = self.sessions.get(&msg.user_id) {
            if let Ok(payload) = serde_json::to_string(&msg.notification) {
                for addr in user_sessions.values() {
                    addr.do_send(WsMessage(payload.clone()));
                }
            }
        }
    }
}

impl Handler<Broadcast> for NotificationHub {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _: &mut Self::Context) -> Self::Result {
        let Ok(payload) = serde_json::to_string(&msg.notification) else {
            return;
        };
        for addr in self.sessions.values().flat_map(|s| s.values()) {
            addr.do_send(WsMessage(payload.clone()));
        }
    }
}

impl Handler<ConnectedUsers> for NotificationHub {
    type Result = usize;

    fn handle(&mut self, _: ConnectedUsers, _: &mut Self::Context) -> Self::Result {
        self.sessions.len()
    }
}

/// Fire-and-forget delivery to every session of `user_id`.
pub fn notify(hub: &Addr<NotificationHub>, user_id: i32, event: &'static str, data: serde_json::Value) {
    hub.do_send(Notify {
        user_id,
        notification: Notification { event, data },
    });
}

pub fn broadcast(hub: &Addr<NotificationHub>, event: &'static str, data: serde_json::Value) {
    hub.do_send(Broadcast {
        notification: Notification { event, data },
    });
}

struct WsSession {
    user_id: i32,
    session_id: usize,
    hub: Addr<NotificationHub>,
}

impl WsSession {
    fn new(user_id: i32, hub: Addr<NotificationHub>) -> Self {
        Self {
            user_id,
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            hub,
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Connect {
            user_id: self.user_id,
            session_id: self.session_id,
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            user_id: self.user_id,
            session_id: self.session_id,
        });
    }
}

impl Handler<WsMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.0);
    }
}

impl actix::StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(_) => ctx.stop(),
        }
    }
}

#[derive(Deserialize)]
struct WsQuery {
    token: String,
}

pub async fn notifications_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = serde_urlencoded::from_str::<WsQuery>(req.query_string())
        .ok()
        .map(|q| q.token)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return Err(actix_web::error::ErrorUnauthorized("Missing token"));
    };

    let user_id = decode_token(&state.config.jwt_secret, &token)
        .map_err(|_| actix_web::error::ErrorUnauthorized("Invalid token"))?;

    ws::start(WsSession::new(user_id, state.hub.clone()), &req, stream)
}
