//! Frigate NVR integration
//!
//! Cameras are matched to Frigate cameras by name (auto-detected from the
//! camera entity), data comes from the `frigate/*` WebSocket commands and push
//! events arrive through one shared subscription per Frigate instance.

pub mod camera;
pub mod engine;
pub mod event_watcher;
pub mod types;

pub use camera::FrigateCamera;
pub use engine::{get_recording_id, FrigateCameraManagerEngine};
pub use event_watcher::FrigateEventWatcher;
