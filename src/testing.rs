//! In-memory host doubles for tests and embedders
//!
//! `MockHomeAssistant` answers WebSocket requests from scripted handlers, serves
//! the entity registry commands from a list of entities, and keeps track of
//! subscriptions so tests can push payloads into them.

use crate::camera_manager::camera::{Camera, CameraBase};
use crate::camera_manager::types::Engine;
use crate::capabilities::{CapabilitiesRaw, CapabilityKey};
use crate::error::{HassError, Result};
use crate::hass::{
    ActionExecutor, Entity, HassEntityState, HomeAssistant, MessageCallback, Unsubscribe,
};
use crate::models::CameraConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&Value) -> std::result::Result<Value, HassError> + Send + Sync>;

struct Subscription {
    id: u64,
    message: Value,
    callback: MessageCallback,
}

#[derive(Default)]
struct MockState {
    states: HashMap<String, HassEntityState>,
    entities: Vec<Entity>,
    handlers: HashMap<String, Handler>,
    sent: Vec<Value>,
    subscriptions: Vec<Subscription>,
    unsubscribed: usize,
}

#[derive(Clone, Default)]
pub struct MockHomeAssistant {
    inner: Arc<Mutex<MockState>>,
    next_subscription: Arc<AtomicU64>,
}

impl MockHomeAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, state: HassEntityState) -> Self {
        self.set_state(state);
        self
    }

    pub fn with_entity(self, entity: Entity) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entities.push(entity);
        }
        self
    }

    /// Answer every request of `message_type` with a fixed response.
    pub fn with_response(self, message_type: &str, response: Value) -> Self {
        self.respond_with(message_type, move |_| Ok(response.clone()));
        self
    }

    pub fn set_state(&self, state: HassEntityState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.states.insert(state.entity_id.clone(), state);
        }
    }

    pub fn respond_with(
        &self,
        message_type: &str,
        handler: impl Fn(&Value) -> std::result::Result<Value, HassError> + Send + Sync + 'static,
    ) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .handlers
                .insert(message_type.to_string(), Arc::new(handler));
        }
    }

    pub fn sent_messages(&self) -> Vec<Value> {
        self.inner
            .lock()
            .map(|inner| inner.sent.clone())
            .unwrap_or_default()
    }

    pub fn sent_messages_of_type(&self, message_type: &str) -> Vec<Value> {
        self.sent_messages()
            .into_iter()
            .filter(|m| m["type"] == message_type)
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscriptions.len())
            .unwrap_or_default()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.unsubscribed)
            .unwrap_or_default()
    }

    /// Deliver a payload to every subscription whose request had `message_type`.
    pub fn push(&self, message_type: &str, payload: Value) {
        let callbacks: Vec<MessageCallback> = self
            .inner
            .lock()
            .map(|inner| {
                inner
                    .subscriptions
                    .iter()
                    .filter(|s| s.message["type"] == message_type)
                    .map(|s| s.callback.clone())
                    .collect()
            })
            .unwrap_or_default();

        for callback in callbacks {
            callback(payload.clone());
        }
    }

    fn registry_response(&self, message: &Value) -> Option<std::result::Result<Value, HassError>> {
        let inner = self.inner.lock().ok()?;
        match message["type"].as_str()? {
            "config/entity_registry/get" => {
                let entity_id = message["entity_id"].as_str()?;
                Some(
                    inner
                        .entities
                        .iter()
                        .find(|e| e.entity_id == entity_id)
                        .map(|e| json!(e))
                        .ok_or_else(|| HassError::Request {
                            code: "not_found".to_string(),
                            message: "Entity not found".to_string(),
                        }),
                )
            }
            "config/entity_registry/list" => Some(Ok(json!(inner.entities))),
            _ => None,
        }
    }
}

#[async_trait]
impl HomeAssistant for MockHomeAssistant {
    fn state(&self, entity_id: &str) -> Option<HassEntityState> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.states.get(entity_id).cloned())
    }

    async fn send_message(&self, message: Value) -> std::result::Result<Value, HassError> {
        let handler = {
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| HassError::Connection("mock poisoned".to_string()))?;
            inner.sent.push(message.clone());
            message["type"]
                .as_str()
                .and_then(|t| inner.handlers.get(t).cloned())
        };

        if let Some(handler) = handler {
            return handler(&message);
        }
        if let Some(response) = self.registry_response(&message) {
            return response;
        }
        Err(HassError::Request {
            code: "unknown_command".to_string(),
            message: format!("No response scripted for {}", message["type"]),
        })
    }

    async fn subscribe_message(
        &self,
        message: Value,
        callback: MessageCallback,
    ) -> std::result::Result<Unsubscribe, HassError> {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inner) = self.inner.lock() {
            inner.sent.push(message.clone());
            inner.subscriptions.push(Subscription {
                id,
                message,
                callback,
            });
        }

        let state = self.inner.clone();
        Ok(Unsubscribe::new(move || {
            if let Ok(mut inner) = state.lock() {
                inner.subscriptions.retain(|s| s.id != id);
                inner.unsubscribed += 1;
            }
        }))
    }

    fn hass_url(&self, path: &str) -> String {
        format!("http://hass.local:8123{}", path)
    }
}

/// A camera with fixed capabilities and nothing to initialize
pub struct StaticCamera {
    base: CameraBase,
}

impl StaticCamera {
    pub fn new(id: &str, capabilities: &[CapabilityKey]) -> Result<Arc<dyn Camera>> {
        Self::from_config(
            CameraConfig {
                id: Some(id.to_string()),
                ..Default::default()
            },
            capabilities,
        )
    }

    pub fn from_config(config: CameraConfig, capabilities: &[CapabilityKey]) -> Result<Arc<dyn Camera>> {
        let base = CameraBase::new(config, Engine::Generic)?;
        base.set_capabilities(CapabilitiesRaw::new().with_all(capabilities));
        Ok(Arc::new(StaticCamera { base }))
    }
}

#[async_trait]
impl Camera for StaticCamera {
    fn base(&self) -> &CameraBase {
        &self.base
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn initialize(&self, _hass: &dyn HomeAssistant) -> Result<()> {
        Ok(())
    }
}

/// Captures every action batch instead of executing it.
#[derive(Default)]
pub struct RecordingActionExecutor {
    actions: Mutex<Vec<Value>>,
}

impl RecordingActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Value> {
        self.actions
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.actions.lock().map(|a| a.len()).unwrap_or_default()
    }

    /// Entity IDs targeted by the captured actions, in order.
    pub fn targets(&self) -> Vec<String> {
        self.actions()
            .iter()
            .filter_map(|a| a["target"]["entity_id"].as_str().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.clear();
        }
    }
}

#[async_trait]
impl ActionExecutor for RecordingActionExecutor {
    async fn execute_actions(&self, actions: Vec<Value>) -> Result<()> {
        if let Ok(mut captured) = self.actions.lock() {
            captured.extend(actions);
        }
        Ok(())
    }
}
