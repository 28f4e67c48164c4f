use crate::camera_manager::types::Engine;
use crate::capabilities::CapabilityKey;
use crate::ptz::{PtzAction, PtzPhase};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Literal `"auto"` in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoKeyword {
    #[default]
    Auto,
}

/// A configuration value that may be left to auto-detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoOr<T> {
    Value(T),
    Keyword(AutoKeyword),
}

impl<T> Default for AutoOr<T> {
    fn default() -> Self {
        AutoOr::Keyword(AutoKeyword::Auto)
    }
}

impl<T: Clone> AutoOr<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, AutoOr::Keyword(_))
    }

    pub fn value(&self) -> Option<T> {
        match self {
            AutoOr::Value(value) => Some(value.clone()),
            AutoOr::Keyword(_) => None,
        }
    }

    pub fn resolve(&self, auto: T) -> T {
        self.value().unwrap_or(auto)
    }
}

/// Engine hint in camera config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSelection {
    #[default]
    Auto,
    Generic,
    Frigate,
    Motioneye,
    Reolink,
}

impl EngineSelection {
    /// The explicitly configured engine, if any.
    pub fn explicit(&self) -> Option<Engine> {
        match self {
            EngineSelection::Auto => None,
            EngineSelection::Generic => Some(Engine::Generic),
            EngineSelection::Frigate => Some(Engine::Frigate),
            EngineSelection::Motioneye => Some(Engine::MotionEye),
            EngineSelection::Reolink => Some(Engine::Reolink),
        }
    }
}

/// One action or a list of actions, passed verbatim to the action executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionsConfig {
    Many(Vec<Value>),
    One(Value),
}

impl ActionsConfig {
    pub fn to_vec(&self) -> Vec<Value> {
        match self {
            ActionsConfig::Many(actions) => actions.clone(),
            ActionsConfig::One(action) => vec![action.clone()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcCardConfig {
    pub entity: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Go2RtcConfig {
    pub url: Option<String>,
    pub stream: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrigateConfig {
    pub url: Option<String>,
    pub client_id: String,
    pub camera_name: Option<String>,
    pub labels: Vec<String>,
    pub zones: Vec<String>,
}

impl Default for FrigateConfig {
    fn default() -> Self {
        FrigateConfig {
            url: None,
            client_id: "frigate".to_string(),
            camera_name: None,
            labels: Vec::new(),
            zones: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionEyeMediaConfig {
    pub directory_pattern: String,
    pub file_pattern: String,
}

impl Default for MotionEyeMediaConfig {
    fn default() -> Self {
        MotionEyeMediaConfig {
            directory_pattern: "%Y-%m-%d".to_string(),
            file_pattern: "%H-%M-%S".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionEyeConfig {
    pub url: Option<String>,
    pub images: MotionEyeMediaConfig,
    pub movies: MotionEyeMediaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReolinkMediaResolution {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReolinkConfig {
    pub url: Option<String>,
    pub media_resolution: ReolinkMediaResolution,
}

/// Statically configured PTZ actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtzConfig {
    pub actions_left: Option<ActionsConfig>,
    pub actions_left_start: Option<ActionsConfig>,
    pub actions_left_stop: Option<ActionsConfig>,
    pub actions_right: Option<ActionsConfig>,
    pub actions_right_start: Option<ActionsConfig>,
    pub actions_right_stop: Option<ActionsConfig>,
    pub actions_up: Option<ActionsConfig>,
    pub actions_up_start: Option<ActionsConfig>,
    pub actions_up_stop: Option<ActionsConfig>,
    pub actions_down: Option<ActionsConfig>,
    pub actions_down_start: Option<ActionsConfig>,
    pub actions_down_stop: Option<ActionsConfig>,
    pub actions_zoom_in: Option<ActionsConfig>,
    pub actions_zoom_in_start: Option<ActionsConfig>,
    pub actions_zoom_in_stop: Option<ActionsConfig>,
    pub actions_zoom_out: Option<ActionsConfig>,
    pub actions_zoom_out_start: Option<ActionsConfig>,
    pub actions_zoom_out_stop: Option<ActionsConfig>,
    pub presets: BTreeMap<String, ActionsConfig>,

    /// Interval between repeated relative calls when emulating continuous motion
    pub r2c_delay_between_calls_seconds: Option<f64>,
    /// Time between start and stop when emulating relative motion
    pub c2r_delay_between_calls_seconds: Option<f64>,
}

impl PtzConfig {
    /// Configured actions for a movement and phase (`None` phase = relative).
    pub fn actions_for(&self, action: PtzAction, phase: Option<PtzPhase>) -> Option<&ActionsConfig> {
        use PtzPhase::{Start, Stop};

        let actions = match (action, phase) {
            (PtzAction::Left, None) => &self.actions_left,
            (PtzAction::Left, Some(Start)) => &self.actions_left_start,
            (PtzAction::Left, Some(Stop)) => &self.actions_left_stop,
            (PtzAction::Right, None) => &self.actions_right,
            (PtzAction::Right, Some(Start)) => &self.actions_right_start,
            (PtzAction::Right, Some(Stop)) => &self.actions_right_stop,
            (PtzAction::Up, None) => &self.actions_up,
            (PtzAction::Up, Some(Start)) => &self.actions_up_start,
            (PtzAction::Up, Some(Stop)) => &self.actions_up_stop,
            (PtzAction::Down, None) => &self.actions_down,
            (PtzAction::Down, Some(Start)) => &self.actions_down_start,
            (PtzAction::Down, Some(Stop)) => &self.actions_down_stop,
            (PtzAction::ZoomIn, None) => &self.actions_zoom_in,
            (PtzAction::ZoomIn, Some(Start)) => &self.actions_zoom_in_start,
            (PtzAction::ZoomIn, Some(Stop)) => &self.actions_zoom_in_stop,
            (PtzAction::ZoomOut, None) => &self.actions_zoom_out,
            (PtzAction::ZoomOut, Some(Start)) => &self.actions_zoom_out_start,
            (PtzAction::ZoomOut, Some(Stop)) => &self.actions_zoom_out_stop,
            (PtzAction::Preset, _) => return None,
        };
        actions.as_ref()
    }

    pub fn preset_actions(&self, preset: &str) -> Option<&ActionsConfig> {
        self.presets.get(preset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslCiphers {
    #[default]
    Default,
    Modern,
    Intermediate,
    Insecure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub live: AutoOr<bool>,
    pub media: AutoOr<bool>,
    pub ssl_verification: AutoOr<bool>,
    pub ssl_ciphers: AutoOr<SslCiphers>,
    pub dynamic: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            live: AutoOr::default(),
            media: AutoOr::default(),
            ssl_verification: AutoOr::default(),
            ssl_ciphers: AutoOr::default(),
            dynamic: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    pub disable: Vec<CapabilityKey>,
    pub disable_except: Option<Vec<CapabilityKey>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    pub cameras: Vec<String>,
    pub all_cameras: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEventType {
    Events,
    Clips,
    Snapshots,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersConfig {
    pub motion: bool,
    pub occupancy: bool,
    pub entities: Vec<String>,
    pub events: Vec<TriggerEventType>,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        TriggersConfig {
            motion: false,
            occupancy: false,
            entities: Vec::new(),
            events: vec![
                TriggerEventType::Events,
                TriggerEventType::Clips,
                TriggerEventType::Snapshots,
            ],
        }
    }
}

/// Static configuration for one camera
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub id: Option<String>,
    pub engine: EngineSelection,
    pub camera_entity: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub webrtc_card: WebRtcCardConfig,
    pub go2rtc: Option<Go2RtcConfig>,
    pub frigate: FrigateConfig,
    pub motioneye: MotionEyeConfig,
    pub reolink: ReolinkConfig,
    pub ptz: PtzConfig,
    pub proxy: ProxyConfig,
    pub capabilities: Option<CapabilitiesConfig>,
    pub dependencies: DependenciesConfig,
    pub triggers: TriggersConfig,
}

impl CameraConfig {
    /// The camera entity, falling back to the webrtc-card entity.
    pub fn camera_entity(&self) -> Option<&str> {
        self.camera_entity
            .as_deref()
            .or(self.webrtc_card.entity.as_deref())
    }

    /// The camera ID: explicit `id`, then entity, then the Frigate camera name.
    pub fn resolved_id(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.camera_entity().map(str::to_string))
            .or_else(|| {
                self.frigate
                    .camera_name
                    .as_ref()
                    .map(|name| format!("{}/{}", self.frigate.client_id, name))
            })
    }

    pub fn capabilities_disable(&self) -> &[CapabilityKey] {
        self.capabilities
            .as_ref()
            .map(|c| c.disable.as_slice())
            .unwrap_or_default()
    }

    pub fn capabilities_disable_except(&self) -> Option<&[CapabilityKey]> {
        self.capabilities
            .as_ref()
            .and_then(|c| c.disable_except.as_deref())
    }
}

/// Proxy settings with `auto` resolved for a particular camera
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraProxyConfig {
    pub live: bool,
    pub media: bool,
    pub ssl_verification: bool,
    pub ssl_ciphers: SslCiphers,
    pub dynamic: bool,
}
