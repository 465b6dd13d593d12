//! WebSocket Server
//!
//! Provides WebSocket endpoint for event subscriptions.

use crate::subscriptions::{EventNotification, SubscriptionId, SubscriptionManager};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_program::pubkey::Pubkey;
use staking_program::StakingEvent;
use std::{str::FromStr, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// WebSocket JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct WsJsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// WebSocket Server
pub struct WebSocketServer {
    subscription_manager: Arc<SubscriptionManager>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(subscription_manager: Arc<SubscriptionManager>) -> Self {
        Self {
            subscription_manager,
        }
    }

    /// Run the WebSocket server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("WebSocket server listening on {}", addr);

        let subscription_manager = self.subscription_manager;

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let sub_mgr = subscription_manager.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, sub_mgr).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    subscription_manager: Arc<SubscriptionManager>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Responses and notifications share one outbound queue
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        while let Some(value) = outbound_rx.recv().await {
            if ws_sender.send(Message::Text(value.to_string())).await.is_err() {
                break;
            }
        }
    });

    // Track subscriptions for this connection
    let mut active_subscriptions: Vec<SubscriptionId> = Vec::new();

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("WebSocket read error: {}", e);
                break;
            }
        };

        if let Message::Text(text) = msg {
            let request: WsJsonRpcRequest = match serde_json::from_str(&text) {
                Ok(req) => req,
                Err(_) => continue,
            };

            let response = handle_ws_method(
                &subscription_manager,
                &request,
                &mut active_subscriptions,
                &outbound,
            );

            if outbound.send(response).is_err() {
                break;
            }
        }
    }

    // Clean up subscriptions on disconnect
    for sub_id in active_subscriptions {
        subscription_manager.unsubscribe(sub_id);
    }
    drop(outbound);
    let _ = writer.await;

    Ok(())
}

/// Handle WebSocket JSON-RPC method
fn handle_ws_method(
    subscription_manager: &SubscriptionManager,
    request: &WsJsonRpcRequest,
    active_subscriptions: &mut Vec<SubscriptionId>,
    outbound: &mpsc::UnboundedSender<Value>,
) -> Value {
    match request.method.as_str() {
        "eventSubscribe" => {
            let params: Vec<Value> = serde_json::from_value(request.params.clone()).unwrap_or_default();

            let participant = match params.first().and_then(|v| v.as_str()) {
                Some(pk_str) => match Pubkey::from_str(pk_str) {
                    Ok(pubkey) => Some(pubkey),
                    Err(_) => return error_response(&request.id, -32602, "Invalid pubkey"),
                },
                None => None,
            };

            let (sub_id, receiver) = subscription_manager.subscribe_events(participant);
            active_subscriptions.push(sub_id);
            tokio::spawn(forward_notifications(receiver, outbound.clone()));

            json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": sub_id
            })
        }

        "eventUnsubscribe" => {
            let params: Vec<Value> = serde_json::from_value(request.params.clone()).unwrap_or_default();
            let sub_id = params.first().and_then(|v| v.as_u64());

            match sub_id {
                Some(id) if active_subscriptions.contains(&id) => {
                    let success = subscription_manager.unsubscribe(id);
                    active_subscriptions.retain(|&s| s != id);
                    json!({
                        "jsonrpc": "2.0",
                        "id": request.id,
                        "result": success
                    })
                }
                Some(_) => json!({
                    "jsonrpc": "2.0",
                    "id": request.id,
                    "result": false
                }),
                None => error_response(&request.id, -32602, "Missing subscription ID"),
            }
        }

        _ => error_response(&request.id, -32601, &format!("Method not found: {}", request.method)),
    }
}

/// Push notifications for one subscription until it is removed
async fn forward_notifications(
    mut receiver: broadcast::Receiver<EventNotification>,
    outbound: mpsc::UnboundedSender<Value>,
) {
    loop {
        match receiver.recv().await {
            Ok(notification) => {
                if outbound.send(format_event_notification(&notification)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Subscriber lagged, dropped {} notifications", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Create error response
fn error_response(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// JSON view of a staking event
pub fn event_to_json(event: &StakingEvent) -> Value {
    let fields = match event {
        StakingEvent::Staked {
            participant,
            amount,
            settled_reward,
            tick,
        } => json!({
            "participant": participant.to_string(),
            "amount": amount.to_string(),
            "settledReward": settled_reward.to_string(),
            "tick": tick,
        }),
        StakingEvent::Withdrawn {
            participant,
            principal,
            reward,
            payout,
            tick,
        } => json!({
            "participant": participant.to_string(),
            "principal": principal.to_string(),
            "reward": reward.to_string(),
            "payout": payout.to_string(),
            "tick": tick,
        }),
        StakingEvent::Confirmed {
            manager,
            confirmations,
            required,
        } => json!({
            "manager": manager.to_string(),
            "confirmations": confirmations,
            "required": required,
        }),
        StakingEvent::RewardRateChanged {
            manager,
            previous_rate,
            new_rate,
        } => json!({
            "manager": manager.to_string(),
            "previousRate": previous_rate.to_string(),
            "newRate": new_rate.to_string(),
        }),
        StakingEvent::Transferred { from, to, amount } => json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "amount": amount.to_string(),
        }),
        StakingEvent::Approved {
            owner,
            spender,
            amount,
        } => json!({
            "owner": owner.to_string(),
            "spender": spender.to_string(),
            "amount": amount.to_string(),
        }),
    };

    json!({
        "type": event.name(),
        "data": fields,
    })
}

/// Format event notification for WebSocket
pub fn format_event_notification(notification: &EventNotification) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "eventNotification",
        "params": {
            "result": {
                "context": {
                    "tick": notification.tick
                },
                "value": event_to_json(&notification.event)
            },
            "subscription": notification.subscription_id
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, params: Value) -> WsJsonRpcRequest {
        WsJsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: json!(7),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_subscribe_forwards_notifications() {
        let manager = SubscriptionManager::new();
        let (outbound, mut rx) = mpsc::unbounded_channel();
        let mut active = Vec::new();
        let participant = Pubkey::new_unique();

        let response = handle_ws_method(
            &manager,
            &request("eventSubscribe", json!([participant.to_string()])),
            &mut active,
            &outbound,
        );
        assert_eq!(response["result"], json!(1));
        assert_eq!(active, vec![1]);

        manager.notify_events(
            4,
            &[StakingEvent::Withdrawn {
                participant,
                principal: 50,
                reward: 6,
                payout: 56,
                tick: 4,
            }],
        );

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification["method"], json!("eventNotification"));
        assert_eq!(notification["params"]["subscription"], json!(1));
        let value = &notification["params"]["result"]["value"];
        assert_eq!(value["type"], json!("withdrawn"));
        assert_eq!(value["data"]["payout"], json!("56"));
    }

    #[test]
    fn test_approval_event_json() {
        let (owner, spender) = (Pubkey::new_unique(), Pubkey::new_unique());
        let value = event_to_json(&StakingEvent::Approved {
            owner,
            spender,
            amount: u128::MAX,
        });

        assert_eq!(value["type"], json!("approval"));
        assert_eq!(value["data"]["spender"], json!(spender.to_string()));
        assert_eq!(value["data"]["amount"], json!(u128::MAX.to_string()));
    }

    #[tokio::test]
    async fn test_unsubscribe_only_own_subscriptions() {
        let manager = SubscriptionManager::new();
        let (outbound, _rx) = mpsc::unbounded_channel();
        let mut active = Vec::new();

        let (foreign, _) = manager.subscribe_events(None);
        handle_ws_method(&manager, &request("eventSubscribe", json!([])), &mut active, &outbound);

        let response = handle_ws_method(&manager, &request("eventUnsubscribe", json!([foreign])), &mut active, &outbound);
        assert_eq!(response["result"], json!(false));
        assert!(manager.has_subscription(foreign));

        let own = active[0];
        let response = handle_ws_method(&manager, &request("eventUnsubscribe", json!([own])), &mut active, &outbound);
        assert_eq!(response["result"], json!(true));
        assert!(active.is_empty());

        let response = handle_ws_method(&manager, &request("eventSubscribe", json!(["bad"])), &mut active, &outbound);
        assert_eq!(response["error"]["code"], json!(-32602));
    }
}
