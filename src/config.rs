//! Card configuration
//!
//! Keys follow the card's YAML/JSON configuration. `cameras_global` holds
//! defaults that every entry in `cameras` inherits unless it sets the key
//! itself.

use crate::error::{Error, Result};
use crate::models::{AutoOr, CameraConfig};
use crate::view::{ViewDisplayMode, ViewName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: Option<ViewDisplayMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaViewerConfig {
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub default: AutoOr<ViewName>,
    /// Move to the next camera each time the default view is reapplied
    pub default_cycle_camera: bool,
}

/// A media-source tree exposed through the folder views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    pub id: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    /// Media-source content ID of the top of the tree
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    pub cameras: Vec<CameraConfig>,
    pub view: ViewConfig,
    pub live: LiveConfig,
    pub media_viewer: MediaViewerConfig,
    pub folders: Vec<FolderConfig>,
}

impl CardConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: Value) -> Result<Self> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::Config("card configuration must be an object".to_string()))?;

        if let Some(global) = object.remove("cameras_global") {
            if let Some(Value::Array(cameras)) = object.get_mut("cameras") {
                for camera in cameras.iter_mut() {
                    let mut merged = global.clone();
                    merge_json(&mut merged, camera.take());
                    *camera = merged;
                }
            }
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Display mode configured for a view, if any
    pub fn display_mode_for(&self, view: ViewName) -> Option<ViewDisplayMode> {
        if view == ViewName::Live {
            self.live.display.mode
        } else if view.is_viewer() {
            self.media_viewer.display.mode
        } else {
            None
        }
    }
}

/// Recursively overlay `overlay` onto `base`. Non-object values replace.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
