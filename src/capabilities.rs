//! Per-camera capability model
//!
//! A [`Capabilities`] value is computed once while a camera initializes and is
//! never mutated afterwards. It is built from a merge of vendor-detected and
//! statically configured raw capabilities, then filtered through the camera's
//! `disable` / `disable_except` lists.

use crate::ptz::PtzAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKey {
    #[serde(rename = "2-way-audio")]
    TwoWayAudio,
    Clips,
    FavoriteEvents,
    FavoriteRecordings,
    Live,
    Menu,
    Ptz,
    Recordings,
    RemoteControlEntity,
    Reviews,
    Seek,
    Snapshots,
    Substream,
    Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzMovementType {
    Relative,
    Continuous,
}

/// Supported motion types per PTZ direction. An empty list means "not supported".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtzCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_in: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_out: Option<Vec<PtzMovementType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<String>>,
}

impl PtzCapabilities {
    /// Every movement type applied to the four pan/tilt directions.
    pub fn pan_tilt(movement: &[PtzMovementType]) -> Self {
        let movement = Some(movement.to_vec());
        PtzCapabilities {
            left: movement.clone(),
            right: movement.clone(),
            up: movement.clone(),
            down: movement,
            ..Default::default()
        }
    }

    pub fn get(&self, action: PtzAction) -> Option<&[PtzMovementType]> {
        let movement = match action {
            PtzAction::Left => &self.left,
            PtzAction::Right => &self.right,
            PtzAction::Up => &self.up,
            PtzAction::Down => &self.down,
            PtzAction::ZoomIn => &self.zoom_in,
            PtzAction::ZoomOut => &self.zoom_out,
            PtzAction::Preset => return None,
        };
        movement.as_deref().filter(|m| !m.is_empty())
    }

    pub fn set(&mut self, action: PtzAction, movement: Vec<PtzMovementType>) {
        let slot = match action {
            PtzAction::Left => &mut self.left,
            PtzAction::Right => &mut self.right,
            PtzAction::Up => &mut self.up,
            PtzAction::Down => &mut self.down,
            PtzAction::ZoomIn => &mut self.zoom_in,
            PtzAction::ZoomOut => &mut self.zoom_out,
            PtzAction::Preset => return,
        };
        *slot = Some(movement);
    }

    pub fn supports(&self, action: PtzAction, movement: PtzMovementType) -> bool {
        self.get(action).is_some_and(|m| m.contains(&movement))
    }

    pub fn has_presets(&self) -> bool {
        self.presets.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// True if at least one direction or preset is actually supported.
    pub fn has_capability(&self) -> bool {
        PtzAction::MOVEMENTS.iter().any(|a| self.get(*a).is_some()) || self.has_presets()
    }

    /// Merge two sources where `configured` wins per direction (replace, never append).
    pub fn merge(detected: Option<&PtzCapabilities>, configured: Option<&PtzCapabilities>) -> Option<PtzCapabilities> {
        match (detected, configured) {
            (None, None) => None,
            (Some(detected), None) => Some(detected.clone()),
            (None, Some(configured)) => Some(configured.clone()),
            (Some(detected), Some(configured)) => {
                let mut merged = detected.clone();
                for action in PtzAction::MOVEMENTS {
                    if let Some(movement) = configured.get(action) {
                        merged.set(action, movement.to_vec());
                    }
                }
                if configured.presets.is_some() {
                    merged.presets = configured.presets.clone();
                }
                Some(merged)
            }
        }
    }
}

/// Unfiltered capabilities as produced by a vendor or by configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesRaw {
    #[serde(flatten)]
    pub flags: BTreeMap<CapabilityKey, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptz: Option<PtzCapabilities>,
}

impl CapabilitiesRaw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: CapabilityKey, value: bool) -> Self {
        self.flags.insert(key, value);
        self
    }

    pub fn with_all(mut self, keys: &[CapabilityKey]) -> Self {
        for key in keys {
            self.flags.insert(*key, true);
        }
        self
    }

    pub fn with_ptz(mut self, ptz: Option<PtzCapabilities>) -> Self {
        self.ptz = ptz;
        self
    }
}

/// Filtering applied on top of raw capabilities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitiesOptions {
    pub disable: Vec<CapabilityKey>,
    pub disable_except: Option<Vec<CapabilityKey>>,
}

impl CapabilitiesOptions {
    fn is_disabled(&self, key: CapabilityKey) -> bool {
        if let Some(except) = &self.disable_except {
            if !except.contains(&key) {
                return true;
            }
        }
        self.disable.contains(&key)
    }
}

/// Search criteria: all of `all` and at least one of `any` (when non-empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySearchOptions {
    pub all: Vec<CapabilityKey>,
    pub any: Vec<CapabilityKey>,
}

impl CapabilitySearchOptions {
    pub fn any_of(keys: &[CapabilityKey]) -> Self {
        CapabilitySearchOptions {
            all: Vec::new(),
            any: keys.to_vec(),
        }
    }
}

impl From<CapabilityKey> for CapabilitySearchOptions {
    fn from(key: CapabilityKey) -> Self {
        CapabilitySearchOptions {
            all: vec![key],
            any: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    raw: CapabilitiesRaw,
}

impl Capabilities {
    pub fn new(raw: CapabilitiesRaw, options: &CapabilitiesOptions) -> Self {
        let flags = raw
            .flags
            .into_iter()
            .filter(|(key, _)| !options.is_disabled(*key))
            .collect();
        let ptz = raw.ptz.filter(|_| !options.is_disabled(CapabilityKey::Ptz));

        Capabilities {
            raw: CapabilitiesRaw { flags, ptz },
        }
    }

    pub fn has(&self, key: CapabilityKey) -> bool {
        match key {
            CapabilityKey::Ptz => self.has_ptz_capability(),
            _ => self.raw.flags.get(&key).copied().unwrap_or(false),
        }
    }

    pub fn matches(&self, search: &CapabilitySearchOptions) -> bool {
        search.all.iter().all(|key| self.has(*key))
            && (search.any.is_empty() || search.any.iter().any(|key| self.has(*key)))
    }

    pub fn has_ptz_capability(&self) -> bool {
        self.raw.ptz.as_ref().is_some_and(PtzCapabilities::has_capability)
    }

    /// The PTZ structure, or `None` if nothing in it is actually supported.
    pub fn get_ptz_capabilities(&self) -> Option<&PtzCapabilities> {
        self.raw.ptz.as_ref().filter(|ptz| ptz.has_capability())
    }

    pub fn raw(&self) -> &CapabilitiesRaw {
        &self.raw
    }
}
