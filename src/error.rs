//! Error handling for the camera card core

use crate::capabilities::CapabilitiesRaw;
use crate::models::CameraConfig;
use crate::view::ViewName;
use serde_json::{json, Value};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single camera could not be initialized
    #[error(transparent)]
    CameraInitialization(#[from] CameraInitializationError),

    /// A requested view cannot be shown for the requested camera
    #[error(transparent)]
    ViewIncompatible(#[from] ViewIncompatibleError),

    /// HTTP sign/fetch/parse/validate failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Home Assistant connection error
    #[error(transparent)]
    Hass(#[from] HassError),

    /// Action execution failed in the host
    #[error("Action error: {0}")]
    Action(String),

    /// A vendor response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Structured context suitable for rendering next to a user-visible message.
    pub fn context(&self) -> Option<Value> {
        match self {
            Error::CameraInitialization(e) => Some(e.context()),
            Error::ViewIncompatible(e) => Some(e.context()),
            Error::Fetch(e) => Some(json!({ "endpoint": e.endpoint, "kind": e.kind.to_string() })),
            _ => None,
        }
    }
}

/// Why a camera failed to initialize
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraInitializationReason {
    #[error("Could not find camera entity")]
    NoCameraEntity,

    #[error("Could not determine suitable engine for camera")]
    NoCameraEngine,

    #[error("Could not determine camera id")]
    NoCameraId,

    #[error("Duplicate camera id: {0}")]
    DuplicateCameraId(String),

    #[error("Could not determine Reolink channel from the camera entity unique id")]
    ReolinkUniqueId,

    #[error("Could not find MotionEye device for camera entity")]
    MotionEyeDevice,

    #[error("Entity registry lookup failed: {0}")]
    Registry(String),
}

/// Fatal per-camera initialization error. Always carries the offending config.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Camera initialization failed: {reason}")]
pub struct CameraInitializationError {
    pub reason: CameraInitializationReason,
    pub config: Box<CameraConfig>,
}

impl CameraInitializationError {
    pub fn new(reason: CameraInitializationReason, config: &CameraConfig) -> Self {
        Self {
            reason,
            config: Box::new(config.clone()),
        }
    }

    pub fn context(&self) -> Value {
        json!({
            "reason": self.reason.to_string(),
            "config": serde_json::to_value(self.config.as_ref()).unwrap_or(Value::Null),
        })
    }
}

/// The resolved view/camera combination is not supported.
#[derive(Debug, Clone, thiserror::Error)]
#[error("The selected camera does not support the '{view}' view")]
pub struct ViewIncompatibleError {
    pub view: ViewName,
    pub camera: Option<String>,
    pub default_view: Option<ViewName>,
    pub capabilities: Option<CapabilitiesRaw>,
}

impl ViewIncompatibleError {
    pub fn context(&self) -> Value {
        json!({
            "view": self.view,
            "camera": self.camera,
            "default_view": self.default_view,
            "capabilities": self.capabilities,
        })
    }
}

/// Stage at which an HTTP fetch failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchErrorKind {
    #[error("could not sign request")]
    Sign,
    #[error("network failure")]
    Network,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed JSON")]
    Json,
    #[error("response failed validation")]
    Validation,
}

/// Typed fetch failure carrying the endpoint and the underlying cause
#[derive(Debug, thiserror::Error)]
#[error("Failed to fetch {endpoint}: {kind}")]
pub struct FetchError {
    pub endpoint: String,
    pub kind: FetchErrorKind,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    pub fn new(endpoint: impl Into<String>, kind: FetchErrorKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Home Assistant connection errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HassError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request failed ({code}): {message}")]
    Request { code: String, message: String },

    #[error("Could not decode response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_initialization_error_carries_config() {
        let config = CameraConfig {
            camera_entity: Some("camera.office".to_string()),
            ..Default::default()
        };
        let error = CameraInitializationError::new(CameraInitializationReason::NoCameraEntity, &config);

        assert_eq!(
            error.to_string(),
            "Camera initialization failed: Could not find camera entity"
        );
        assert_eq!(
            error.context()["config"]["camera_entity"],
            json!("camera.office")
        );
    }

    #[test]
    fn test_fetch_error_preserves_source() {
        let cause = serde_json::from_str::<Value>("{").unwrap_err();
        let error = FetchError::new("/api/streams", FetchErrorKind::Json).with_source(cause);

        assert!(error.to_string().contains("/api/streams"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_view_incompatible_context() {
        let error: Error = ViewIncompatibleError {
            view: ViewName::Clips,
            camera: Some("office".to_string()),
            default_view: Some(ViewName::Live),
            capabilities: None,
        }
        .into();

        let context = error.context().unwrap();
        assert_eq!(context["view"], json!("clips"));
        assert_eq!(context["default_view"], json!("live"));
    }
}
