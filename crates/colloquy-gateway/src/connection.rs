use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use colloquy_core::bus::Submitter;
use colloquy_types::events::{GatewayCommand, GatewayEvent};
use colloquy_types::models::IncomingEvent;

use crate::dispatcher::Dispatcher;

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct ConnectionContext {
    pub dispatcher: Dispatcher,
    pub submitter: Submitter,
    /// A ping goes out every interval; two missed pongs drop the connection.
    pub heartbeat: Duration,
}

/// Handle a pre-authenticated WebSocket connection.
/// The JWT was already validated at the HTTP upgrade layer, so we go straight
/// to Ready + event loop.
pub async fn handle_connection(socket: WebSocket, ctx: ConnectionContext, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        namespace: ctx.dispatcher.namespace().to_string(),
    };
    let Ok(text) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    let (conn_id, mut events_rx) = ctx.dispatcher.register(user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;
    let heartbeat_interval = ctx.heartbeat;

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, conn_id, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.disconnect(conn_id).await;
    info!(
        "{} disconnected from gateway, {} connections left",
        user_id,
        ctx.dispatcher.connection_count().await
    );
}

async fn handle_command(ctx: &ConnectionContext, conn_id: Uuid, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe { room } => {
            debug!("{} subscribing to {}", user_id, room);
            ctx.dispatcher.subscribe(conn_id, &room).await;
        }

        GatewayCommand::Unsubscribe { room } => {
            debug!("{} unsubscribing from {}", user_id, room);
            ctx.dispatcher.unsubscribe(conn_id, &room).await;
        }

        GatewayCommand::Message { room, message } => {
            if !ctx.dispatcher.is_subscribed(conn_id, &room).await {
                warn!("{} sent a message to {} without subscribing, dropped", user_id, room);
                return;
            }

            let event = IncomingEvent {
                room: Some(room),
                message: message.stamp(user_id, Utc::now()),
            };
            if let Err(e) = ctx.submitter.submit(event).await {
                warn!("Failed to submit message from {}: {}", user_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::bus::{ClusterBus, LocalQueue, LocalReceiver, MemoryBus};
    use colloquy_types::events::ClusterEvent;
    use colloquy_types::models::ClientMessage;
    use colloquy_types::topics;

    fn context() -> (ConnectionContext, LocalReceiver, Arc<MemoryBus>) {
        let bus = Arc::new(MemoryBus::new());
        let (local, rx) = LocalQueue::channel();
        let ctx = ConnectionContext {
            dispatcher: Dispatcher::new("/chat", bus.clone()),
            submitter: Submitter::new(local, bus.clone()),
            heartbeat: Duration::from_secs(15),
        };
        (ctx, rx, bus)
    }

    fn message_command(room: &str, channel: Uuid) -> GatewayCommand {
        let message: ClientMessage = serde_json::from_value(serde_json::json!({
            "type": "text",
            "channel": channel,
            "text": "hello",
        }))
        .unwrap();
        GatewayCommand::Message {
            room: room.into(),
            message,
        }
    }

    #[tokio::test]
    async fn message_to_unsubscribed_room_is_dropped() {
        let (ctx, mut local, _) = context();
        let user = Uuid::new_v4();
        let (conn, _rx) = ctx.dispatcher.register(user).await;

        handle_command(&ctx, conn, user, message_command("general", Uuid::new_v4())).await;

        assert!(local.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_is_stamped_and_submitted_twice() {
        let (ctx, mut local, bus) = context();
        let mut cluster = bus.subscribe(topics::MESSAGE_RECEIVED);
        let user = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let (conn, _rx) = ctx.dispatcher.register(user).await;

        handle_command(&ctx, conn, user, GatewayCommand::Subscribe { room: "general".into() }).await;
        handle_command(&ctx, conn, user, message_command("general", channel)).await;

        let queued = local.try_recv().unwrap();
        assert_eq!(queued.room.as_deref(), Some("general"));
        assert_eq!(queued.message.creator, user);
        assert_eq!(queued.message.channel, channel);

        match cluster.try_recv().unwrap() {
            ClusterEvent::Submitted(event) => assert_eq!(event.message.creator, user),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unsubscribe_stops_submissions_for_that_room() {
        let (ctx, mut local, _) = context();
        let user = Uuid::new_v4();
        let (conn, _rx) = ctx.dispatcher.register(user).await;

        handle_command(&ctx, conn, user, GatewayCommand::Subscribe { room: "general".into() }).await;
        handle_command(&ctx, conn, user, GatewayCommand::Unsubscribe { room: "general".into() }).await;
        handle_command(&ctx, conn, user, message_command("general", Uuid::new_v4())).await;

        assert!(local.try_recv().is_err());
    }
}
