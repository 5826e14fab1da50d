//! # Message Bus
//!
//! In-process publish/subscribe and request/response layer connecting the
//! specialist agents. Delivery is strict FIFO, one message at a time: all
//! matching subscriptions settle (failures isolated and logged) before the
//! next message is dequeued. A handler may send more messages while one is
//! being delivered; they are queued behind the message in flight rather
//! than delivered reentrantly.
//!
//! Only [`MessageBus::request`] can fail visibly to its caller (timeout);
//! every other delivery failure is isolated per subscription.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Default `request()` timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Generate a short unique id (timestamp + hasher salt)
pub fn unique_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let salt = RandomState::new().build_hasher().finish() as u32;
    format!("{:x}-{:x}", nanos, salt)
}

/// Kind of in-process message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Proposal,
    Request,
    Response,
    Broadcast,
    Notification,
}

/// One in-process message
///
/// Not to be confused with the partner envelope in [`crate::wire`], which
/// belongs to the third-party integration surface and never crosses this
/// bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub from: String,
    /// `None` or `"*"` means every subscriber
    pub to: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub requires_response: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(message_type: MessageType, from: &str) -> Self {
        Self {
            id: unique_id(),
            message_type,
            from: from.to_string(),
            to: None,
            payload: Value::Null,
            correlation_id: None,
            requires_response: false,
            timestamp: Utc::now(),
        }
    }

    pub fn to(mut self, destination: &str) -> Self {
        self.to = Some(destination.to_string());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn correlation(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn needs_response(mut self) -> Self {
        self.requires_response = true;
        self
    }
}

/// Subscription-side handler for delivered messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// A registered agent able to answer requests directly
///
/// When a message demanding a response targets a registered endpoint, the
/// bus synthesizes the reply by calling it here, bypassing the queue.
#[async_trait]
pub trait BusEndpoint: Send + Sync {
    fn name(&self) -> &str;
    async fn on_request(&self, message: &Message) -> anyhow::Result<Value>;
}

pub type MessageFilter = Box<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("request to '{to}' timed out after {timeout_ms}ms")]
    Timeout { to: String, timeout_ms: u64 },
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("response channel closed before a reply arrived")]
    ChannelClosed,
}

struct Subscription {
    id: u64,
    agent: String,
    types: Vec<MessageType>,
    handler: Arc<dyn MessageHandler>,
    filter: Option<MessageFilter>,
}

impl Subscription {
    fn matches(&self, message: &Message) -> bool {
        if !self.types.contains(&message.message_type) {
            return false;
        }
        let destination_ok = match message.to.as_deref() {
            None | Some("*") => true,
            Some(destination) => destination == self.agent,
        };
        if !destination_ok {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(message),
            None => true,
        }
    }
}

struct BusInner {
    queue: VecDeque<Message>,
    subscriptions: Vec<Subscription>,
    endpoints: HashMap<String, Arc<dyn BusEndpoint>>,
    next_subscription_id: u64,
    draining: bool,
}

/// The in-process bus; cheap to clone, one logical instance per session
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<Mutex<BusInner>>,
    request_timeout: Duration,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl MessageBus {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                queue: VecDeque::new(),
                subscriptions: Vec::new(),
                endpoints: HashMap::new(),
                next_subscription_id: 1,
                draining: false,
            })),
            request_timeout,
        }
    }

    fn guard(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an agent as a direct request endpoint
    pub fn register_agent(&self, endpoint: Arc<dyn BusEndpoint>) {
        let name = endpoint.name().to_string();
        self.guard().endpoints.insert(name, endpoint);
    }

    pub fn registered_agent_count(&self) -> usize {
        self.guard().endpoints.len()
    }

    pub fn subscribe(
        &self,
        agent: &str,
        types: &[MessageType],
        handler: Arc<dyn MessageHandler>,
        filter: Option<MessageFilter>,
    ) -> u64 {
        let mut inner = self.guard();
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            agent: agent.to_string(),
            types: types.to_vec(),
            handler,
            filter,
        });
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut inner = self.guard();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.guard().subscriptions.len()
    }

    /// Enqueue a message and drain the queue if no drain is in flight
    pub async fn send(&self, message: Message) {
        // Direct synthesis path: a response-demanding message for a
        // registered endpoint never enters the queue, so a reply cannot
        // grow the queue reentrantly.
        if message.requires_response {
            if let Some(destination) = message.to.as_deref() {
                let endpoint = self.guard().endpoints.get(destination).cloned();
                if let Some(endpoint) = endpoint {
                    self.synthesize_response(&message, endpoint).await;
                    return;
                }
            }
        }

        let should_drain = {
            let mut inner = self.guard();
            inner.queue.push_back(message);
            if inner.draining {
                false
            } else {
                inner.draining = true;
                true
            }
        };
        if should_drain {
            self.drain().await;
        }
    }

    /// Convenience wrapper: deliver to every matching subscriber
    pub async fn broadcast(&self, message_type: MessageType, from: &str, payload: Value) {
        let message = Message::new(message_type, from).to("*").payload(payload);
        self.send(message).await;
    }

    /// Round-trip to `to`, racing a timeout that tears down the
    /// correlation subscription on expiry. This is the only bus operation
    /// whose failure is visible to the caller.
    pub async fn request(
        &self,
        from: &str,
        to: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, BusError> {
        let timeout = timeout.unwrap_or(self.request_timeout);
        let correlation = unique_id();
        let request = Message::new(MessageType::Request, from)
            .to(to)
            .payload(payload)
            .correlation(&correlation)
            .needs_response();

        // Registered target: synthesize the reply directly.
        let endpoint = self.guard().endpoints.get(to).cloned();
        if let Some(endpoint) = endpoint {
            return match tokio::time::timeout(timeout, endpoint.on_request(&request)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(BusError::Delivery(error.to_string())),
                Err(_) => Err(BusError::Timeout {
                    to: to.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };
        }

        // Otherwise wait for a correlated response message.
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(CorrelationWaiter {
            tx: Mutex::new(Some(tx)),
        });
        let correlation_match = correlation.clone();
        let subscription = self.subscribe(
            from,
            &[MessageType::Response],
            waiter,
            Some(Box::new(move |message: &Message| {
                message.correlation_id.as_deref() == Some(correlation_match.as_str())
            })),
        );

        self.send(request).await;

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.unsubscribe(subscription);

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(BusError::ChannelClosed),
            Err(_) => Err(BusError::Timeout {
                to: to.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn synthesize_response(&self, request: &Message, endpoint: Arc<dyn BusEndpoint>) {
        match endpoint.on_request(request).await {
            Ok(value) => {
                let mut response =
                    Message::new(MessageType::Response, endpoint.name()).payload(value);
                response.to = Some(request.from.clone());
                response.correlation_id = request.correlation_id.clone();
                // Deliver straight to matching subscriptions, off-queue.
                self.dispatch(&response).await;
            }
            Err(error) => {
                tracing::warn!(
                    endpoint = %endpoint.name(),
                    %error,
                    "endpoint failed to synthesize response"
                );
            }
        }
    }

    /// FIFO drain: message N+1 never starts before message N's handlers
    /// have all settled.
    async fn drain(&self) {
        loop {
            let next = {
                let mut inner = self.guard();
                match inner.queue.pop_front() {
                    Some(message) => message,
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            self.dispatch(&next).await;
        }
    }

    /// Invoke every matching subscription for one message, isolating and
    /// logging per-subscription failures.
    async fn dispatch(&self, message: &Message) {
        let matching: Vec<(u64, String, Arc<dyn MessageHandler>)> = {
            let inner = self.guard();
            inner
                .subscriptions
                .iter()
                .filter(|s| s.matches(message))
                .map(|s| (s.id, s.agent.clone(), Arc::clone(&s.handler)))
                .collect()
        };

        for (id, agent, handler) in matching {
            if let Err(error) = handler.handle(message).await {
                tracing::warn!(
                    subscription = id,
                    agent = %agent,
                    message_id = %message.id,
                    %error,
                    "message handler failed; delivery continues"
                );
            }
        }
    }
}

/// One-shot handler resolving a pending `request()`
struct CorrelationWaiter {
    tx: Mutex<Option<oneshot::Sender<Value>>>,
}

#[async_trait]
impl MessageHandler for CorrelationWaiter {
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(message.payload.clone());
        }
        Ok(())
    }
}
