//! WebSocket command dispatch: decodes a verb+body [`Envelope`] and
//! drives the Topic Registry, KV store, and Status Reporter.
//!
//! A plain `match` on the verb is the right shape for six fixed
//! commands -- the teacher's `service::router::OperationRouter` (a
//! `tower::Service`-keyed dispatcher built for an open-ended, pluggable
//! set of CRDT services) has no real counterpart here and is not reused.

use tracing::{debug, warn};

use crate::admission::AdmissionGate;
use crate::error::AdmissionError;
use crate::kv;
use crate::kv::KvStore;
use crate::network::connection::{ConnectionRegistry, OutboundMessage};
use crate::protocol::{
    Envelope, PublishMessage, PublishSendMessage, ResultMessage, StoreMessage, SubscribeMessage,
    UnsubscribeMessage,
};
use crate::status::build_status;
use crate::topic::TopicRegistry;

/// Shared references a connection's read loop needs to route a frame.
/// Borrowed, not owned: the caller (the WebSocket handler) already holds
/// `Arc`s to all of these via `AppState`.
pub struct RouterContext<'a> {
    pub topics: &'a TopicRegistry,
    pub connections: &'a ConnectionRegistry,
    pub admission: &'a AdmissionGate,
    pub kv: Option<&'a dyn KvStore>,
    pub mask_ips: bool,
}

/// Routes one decoded frame from `connection_id`, returning the text to
/// send back to that connection, if any.
///
/// `subscribe`/`unsubscribe`/`publish` never reply on success or on a
/// rejected-but-well-formed command (bad channel, failed safelist check) --
/// those outcomes are log-only on the WebSocket path, matching the original
/// broker (its own test harness never reads a reply after a bare subscribe
/// or publish). Malformed frames and unknown verbs are dropped the same
/// way. Only `ping`, `status`/`status_pp`, and `store` ever produce a reply.
pub async fn dispatch(ctx: &RouterContext<'_>, connection_id: &str, envelope: &Envelope) -> Option<String> {
    match envelope.verb.as_str() {
        "ping" => Some("pong".to_string()),
        "subscribe" => {
            handle_subscribe(ctx, connection_id, envelope);
            None
        }
        "unsubscribe" => {
            handle_unsubscribe(ctx, connection_id, envelope);
            None
        }
        "publish" => {
            handle_publish(ctx, envelope).await;
            None
        }
        "status" => handle_status(ctx, false),
        "status_pp" => handle_status(ctx, true),
        "store" => handle_store(ctx, envelope),
        other => {
            warn!(verb = other, "unknown command");
            None
        }
    }
}

fn handle_subscribe(ctx: &RouterContext<'_>, connection_id: &str, envelope: &Envelope) {
    let msg: SubscribeMessage = match serde_json::from_str(&envelope.body) {
        Ok(m) => m,
        Err(_) => {
            warn!(connection_id, "invalid subscribe payload");
            return;
        }
    };

    if msg.channel.is_empty() {
        warn!(connection_id, "subscribe channel is empty");
        return;
    }

    if let Err(e) = ctx.admission.check_safelist(&msg.channel) {
        warn!(connection_id, channel = msg.channel, error = %e, "whitelist does not contain subscribe channel");
        return;
    }

    if let Some(label) = msg.client_info {
        if let Some(handle) = ctx.connections.get(connection_id) {
            if let Ok(mut meta) = handle.metadata.try_write() {
                meta.label = Some(label);
            }
        }
    }

    ctx.topics.join(&msg.channel, connection_id);
}

fn handle_unsubscribe(ctx: &RouterContext<'_>, connection_id: &str, envelope: &Envelope) {
    let msg: UnsubscribeMessage = match serde_json::from_str(&envelope.body) {
        Ok(m) => m,
        Err(_) => {
            warn!(connection_id, "invalid unsubscribe payload");
            return;
        }
    };

    if msg.channel.is_empty() {
        warn!(connection_id, "unsubscribe channel is empty");
        return;
    }

    ctx.topics.leave(&msg.channel, connection_id);
    debug!(connection_id, channel = msg.channel, "unsubscribe");
}

async fn handle_publish(ctx: &RouterContext<'_>, envelope: &Envelope) {
    let msg: PublishMessage = match serde_json::from_str(&envelope.body) {
        Ok(m) => m,
        Err(_) => {
            warn!("invalid publish payload");
            return;
        }
    };

    if msg.channel.is_empty() {
        debug!("publish channel is empty");
        return;
    }

    // The channel safelist only gates `subscribe` -- the original broker's
    // `safeList` exists solely to restrict which channels a client may join.
    let payload = PublishSendMessage::new(msg.channel.clone(), msg.message, msg.tag, msg.extention);
    let text = serde_json::to_string(&payload).unwrap();

    let members = if let Some(group_prefix) = msg.channel.strip_suffix("/*") {
        ctx.topics.group_members(group_prefix)
    } else {
        ctx.topics.members(&msg.channel)
    };

    for member_id in members {
        if let Some(handle) = ctx.connections.get(&member_id) {
            let _ = handle.try_send(OutboundMessage::Text(text.clone()));
        }
    }
}

fn handle_status(ctx: &RouterContext<'_>, pretty: bool) -> Option<String> {
    let status = build_status(ctx.topics, ctx.connections, ctx.mask_ips);
    Some(if pretty {
        serde_json::to_string_pretty(&status).unwrap()
    } else {
        serde_json::to_string(&status).unwrap()
    })
}

fn handle_store(ctx: &RouterContext<'_>, envelope: &Envelope) -> Option<String> {
    let Some(store) = ctx.kv else {
        return Some(serde_json::to_string(&ResultMessage::fail(crate::error::KvError::Disabled.to_string())).unwrap());
    };

    let msg: StoreMessage = match serde_json::from_str(&envelope.body) {
        Ok(m) => m,
        Err(_) => return Some(serde_json::to_string(&ResultMessage::fail("invalid store payload")).unwrap()),
    };

    match kv::dispatch(store, &msg.command, &msg.key, msg.value.as_deref()) {
        Ok(kv::KvOutcome::Value(value)) => Some(serde_json::to_string(&serde_json::json!({ "result": value })).unwrap()),
        Ok(kv::KvOutcome::Missing) => Some(serde_json::to_string(&serde_json::json!({ "result": "" })).unwrap()),
        Ok(kv::KvOutcome::Done) => Some(serde_json::to_string(&ResultMessage::success()).unwrap()),
        Err(e) => Some(serde_json::to_string(&ResultMessage::fail(e.to_string())).unwrap()),
    }
}

impl From<AdmissionError> for ResultMessage {
    fn from(e: AdmissionError) -> Self {
        ResultMessage::fail(e.to_string())
    }
}
