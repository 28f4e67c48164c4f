use super::types::{decode_json_payload, FrigateEventChange, FrigateEventChangeType};
use crate::camera_manager::types::{CameraEvent, CameraEventCallback, CameraEventType};
use crate::error::Result;
use crate::hass::{HomeAssistant, MessageCallback, Unsubscribe};
use crate::models::TriggerEventType;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// What one camera wants to hear about
#[derive(Clone)]
pub struct FrigateEventWatcherRequest {
    pub camera_id: String,
    pub camera_name: String,
    pub zones: Vec<String>,
    pub labels: Vec<String>,
    pub events: Vec<TriggerEventType>,
    pub callback: CameraEventCallback,
}

impl FrigateEventWatcherRequest {
    fn matches(&self, change: &FrigateEventChange) -> bool {
        let after = &change.after;
        after.camera == self.camera_name
            && (self.zones.is_empty() || self.zones.iter().any(|z| after.current_zones.contains(z)))
            && (self.labels.is_empty() || self.labels.contains(&after.label))
    }

    fn wants(&self, change: &FrigateEventChange) -> bool {
        self.events.contains(&TriggerEventType::Events)
            || (self.events.contains(&TriggerEventType::Clips) && change.after.has_clip)
            || (self.events.contains(&TriggerEventType::Snapshots) && change.after.has_snapshot)
    }
}

#[derive(Default)]
struct InstanceState {
    subscribers: Vec<(u64, FrigateEventWatcherRequest)>,
    channel: Option<Unsubscribe>,
}

type Instances = Arc<Mutex<HashMap<String, InstanceState>>>;

/// Shares one `frigate/events/subscribe` channel per Frigate instance between
/// all the cameras of that instance. The channel opens with the first
/// subscriber and closes with the last.
#[derive(Default)]
pub struct FrigateEventWatcher {
    instances: Instances,
    opening: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl FrigateEventWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, instance_id: &str) -> usize {
        self.instances
            .lock()
            .map(|i| i.get(instance_id).map_or(0, |s| s.subscribers.len()))
            .unwrap_or_default()
    }

    pub async fn subscribe(
        &self,
        hass: &dyn HomeAssistant,
        instance_id: &str,
        request: FrigateEventWatcherRequest,
    ) -> Result<Unsubscribe> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Serialize channel opening so two first subscribers share one channel
        let _opening = self.opening.lock().await;

        let needs_channel = {
            let mut instances = self.instances.lock().map_err(|_| poisoned())?;
            let state = instances.entry(instance_id.to_string()).or_default();
            state.subscribers.push((id, request));
            state.channel.is_none()
        };

        if needs_channel {
            debug!("[FrigateEventWatcher] Opening event channel for instance {}", instance_id);
            let result = hass
                .subscribe_message(
                    json!({ "type": "frigate/events/subscribe", "instance_id": instance_id }),
                    dispatcher(self.instances.clone(), instance_id.to_string()),
                )
                .await;

            match result {
                Ok(channel) => {
                    let mut instances = self.instances.lock().map_err(|_| poisoned())?;
                    match instances.get_mut(instance_id) {
                        Some(state) if !state.subscribers.is_empty() => state.channel = Some(channel),
                        _ => {
                            drop(instances);
                            channel.call();
                        }
                    }
                }
                Err(e) => {
                    remove_subscriber(&self.instances, instance_id, id);
                    return Err(e.into());
                }
            }
        }

        let instances = self.instances.clone();
        let instance_id = instance_id.to_string();
        Ok(Unsubscribe::new(move || {
            remove_subscriber(&instances, &instance_id, id);
        }))
    }
}

fn poisoned() -> crate::error::Error {
    crate::error::Error::Config("event watcher state poisoned".to_string())
}

fn remove_subscriber(instances: &Instances, instance_id: &str, id: u64) {
    let channel = {
        let Ok(mut instances) = instances.lock() else {
            return;
        };
        let Some(state) = instances.get_mut(instance_id) else {
            return;
        };
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
        if !state.subscribers.is_empty() {
            return;
        }
        instances.remove(instance_id).and_then(|s| s.channel)
    };

    if let Some(channel) = channel {
        debug!("[FrigateEventWatcher] Closing event channel for instance {}", instance_id);
        channel.call();
    }
}

fn dispatcher(instances: Instances, instance_id: String) -> MessageCallback {
    Arc::new(move |payload: Value| {
        let change: FrigateEventChange = match decode_json_payload(payload)
            .and_then(serde_json::from_value)
        {
            Ok(change) => change,
            Err(e) => {
                warn!(
                    "[FrigateEventWatcher] Dropping malformed event from instance {}: {}",
                    instance_id, e
                );
                return;
            }
        };

        let targets: Vec<FrigateEventWatcherRequest> = instances
            .lock()
            .map(|instances| {
                instances
                    .get(&instance_id)
                    .map(|state| {
                        state
                            .subscribers
                            .iter()
                            .map(|(_, request)| request)
                            .filter(|request| request.matches(&change) && request.wants(&change))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        let event_type = match change.change_type {
            FrigateEventChangeType::New => CameraEventType::New,
            FrigateEventChangeType::Update => CameraEventType::Update,
            FrigateEventChangeType::End => CameraEventType::End,
        };

        for request in targets {
            (request.callback)(CameraEvent {
                camera_id: request.camera_id.clone(),
                event_type,
                clip: change.after.has_clip,
                snapshot: change.after.has_snapshot,
            });
        }
    })
}
