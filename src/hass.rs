//! Narrow interfaces onto the Home Assistant host
//!
//! The card core never talks to a socket itself. Everything it needs from the
//! host (live entity states, WebSocket request/response, event subscriptions,
//! the entity registry and action execution) goes through the traits below.

use crate::error::{HassError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Callback for subscription payloads
pub type MessageCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Releases a subscription when called. Calling consumes it, so it can only run once.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Unsubscribe(Box::new(f))
    }

    pub fn noop() -> Self {
        Unsubscribe::new(|| {})
    }

    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Live state of an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HassEntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl HassEntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        HassEntityState {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    pub fn icon(&self) -> Option<&str> {
        self.attributes.get("icon").and_then(Value::as_str)
    }

    /// Option list of a `select` entity
    pub fn options(&self) -> Vec<String> {
        self.attributes
            .get("options")
            .and_then(Value::as_array)
            .map(|options| {
                options
                    .iter()
                    .filter_map(|o| o.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Connection to the Home Assistant host
#[async_trait]
pub trait HomeAssistant: Send + Sync {
    /// Current state of an entity on the live state bus
    fn state(&self, entity_id: &str) -> Option<HassEntityState>;

    /// WebSocket request/response
    async fn send_message(&self, message: Value) -> std::result::Result<Value, HassError>;

    /// Subscribe to a push channel. The callback receives raw payloads.
    async fn subscribe_message(
        &self,
        message: Value,
        callback: MessageCallback,
    ) -> std::result::Result<Unsubscribe, HassError>;

    /// Absolute URL for a path on the Home Assistant server
    fn hass_url(&self, path: &str) -> String;
}

/// Entity registry entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub config_entry_id: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
}

impl Entity {
    pub fn new(entity_id: impl Into<String>, platform: impl Into<String>) -> Self {
        Entity {
            entity_id: entity_id.into(),
            platform: platform.into(),
            ..Default::default()
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_config_entry_id(mut self, config_entry_id: impl Into<String>) -> Self {
        self.config_entry_id = Some(config_entry_id.into());
        self
    }

    /// The domain part of the entity ID (`button` for `button.office_ptz_left`)
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or_default()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

pub type EntityPredicate<'a> = &'a (dyn Fn(&Entity) -> bool + Send + Sync);

#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Registry entry for an entity, or `None` if the registry does not know it.
    async fn get_entity(&self, hass: &dyn HomeAssistant, entity_id: &str) -> Result<Option<Entity>>;

    async fn get_matching_entities(
        &self,
        hass: &dyn HomeAssistant,
        predicate: EntityPredicate<'_>,
    ) -> Result<Vec<Entity>>;
}

#[derive(Default)]
struct RegistryCache {
    entities: HashMap<String, Entity>,
    fully_loaded: bool,
}

/// Entity registry backed by the `config/entity_registry/*` WebSocket commands,
/// with an in-memory cache.
#[derive(Default)]
pub struct EntityRegistryManager {
    cache: Mutex<RegistryCache>,
}

impl EntityRegistryManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, entity_id: &str) -> Option<Entity> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.entities.get(entity_id).cloned())
    }

    async fn load_all(&self, hass: &dyn HomeAssistant) -> Result<()> {
        if self.cache.lock().map(|c| c.fully_loaded).unwrap_or(false) {
            return Ok(());
        }

        debug!("[EntityRegistryManager] Fetching full entity registry");
        let response = hass
            .send_message(json!({ "type": "config/entity_registry/list" }))
            .await?;
        let entities: Vec<Entity> = serde_json::from_value(response)
            .map_err(|e| HassError::Decode(format!("entity registry list: {}", e)))?;

        if let Ok(mut cache) = self.cache.lock() {
            for entity in entities {
                cache.entities.insert(entity.entity_id.clone(), entity);
            }
            cache.fully_loaded = true;
        }
        Ok(())
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = RegistryCache::default();
        }
    }
}

#[async_trait]
impl EntityRegistry for EntityRegistryManager {
    async fn get_entity(&self, hass: &dyn HomeAssistant, entity_id: &str) -> Result<Option<Entity>> {
        if let Some(entity) = self.cached(entity_id) {
            return Ok(Some(entity));
        }

        let response = hass
            .send_message(json!({
                "type": "config/entity_registry/get",
                "entity_id": entity_id,
            }))
            .await;

        let entity: Entity = match response {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| HassError::Decode(format!("entity {}: {}", entity_id, e)))?,
            Err(HassError::Request { code, .. }) if code == "not_found" => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.entities.insert(entity.entity_id.clone(), entity.clone());
        }
        Ok(Some(entity))
    }

    async fn get_matching_entities(
        &self,
        hass: &dyn HomeAssistant,
        predicate: EntityPredicate<'_>,
    ) -> Result<Vec<Entity>> {
        self.load_all(hass).await?;

        let mut matches: Vec<Entity> = self
            .cache
            .lock()
            .map(|cache| {
                cache
                    .entities
                    .values()
                    .filter(|entity| predicate(entity))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(matches)
    }
}

/// Executes card actions (service calls, navigation, ...) in the host
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute_actions(&self, actions: Vec<Value>) -> Result<()>;
}

/// A `perform-action` card action calling a Home Assistant service on one entity.
pub fn perform_action(service: &str, entity_id: &str, data: Option<Value>) -> Value {
    let mut action = json!({
        "action": "perform-action",
        "perform_action": service,
        "target": { "entity_id": entity_id },
    });
    if let Some(data) = data {
        action["data"] = data;
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHomeAssistant;

    #[test]
    fn test_entity_domain() {
        assert_eq!(Entity::new("button.office_ptz_left", "reolink").domain(), "button");
        assert_eq!(Entity::new("invalid", "reolink").domain(), "");
    }

    #[test]
    fn test_state_options() {
        let state = HassEntityState::new("select.office_ptz_preset", "door")
            .with_attribute("options", json!(["door", "garden", 3]));
        assert_eq!(state.options(), vec!["door", "garden"]);
    }

    #[tokio::test]
    async fn test_registry_caches_entities() {
        let hass = MockHomeAssistant::new()
            .with_entity(Entity::new("camera.office", "frigate").with_unique_id("abc:camera:office"));
        let registry = EntityRegistryManager::new();

        let first = registry.get_entity(&hass, "camera.office").await.unwrap();
        let second = registry.get_entity(&hass, "camera.office").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().platform, "frigate");
        assert_eq!(hass.sent_messages_of_type("config/entity_registry/get").len(), 1);
    }

    #[tokio::test]
    async fn test_registry_missing_entity_is_none() {
        let hass = MockHomeAssistant::new();
        let registry = EntityRegistryManager::new();

        assert_eq!(registry.get_entity(&hass, "camera.missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_matching_entities_loads_registry_once() {
        let hass = MockHomeAssistant::new()
            .with_entity(Entity::new("button.a_ptz_left", "reolink"))
            .with_entity(Entity::new("sensor.other", "mqtt"));
        let registry = EntityRegistryManager::new();

        let predicate = |e: &Entity| e.platform == "reolink";
        let matches = registry.get_matching_entities(&hass, &predicate).await.unwrap();
        registry.get_matching_entities(&hass, &predicate).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(hass.sent_messages_of_type("config/entity_registry/list").len(), 1);
    }

    #[test]
    fn test_perform_action_shape() {
        let action = perform_action("select.select_option", "select.ptz", Some(json!({"option": "door"})));
        assert_eq!(action["perform_action"], "select.select_option");
        assert_eq!(action["target"]["entity_id"], "select.ptz");
        assert_eq!(action["data"]["option"], "door");
    }
}
