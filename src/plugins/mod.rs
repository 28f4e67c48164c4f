//! Vendor integrations
//!
//! Each vendor provides a [`Camera`](crate::camera_manager::camera::Camera)
//! implementation and a
//! [`CameraManagerEngine`](crate::camera_manager::engine::CameraManagerEngine).

pub mod browse_media;
pub mod frigate;
pub mod generic;
pub mod go2rtc;
pub mod motioneye;
pub mod reolink;

pub use frigate::{FrigateCamera, FrigateCameraManagerEngine};
pub use generic::{GenericCamera, GenericCameraManagerEngine};
pub use motioneye::{MotionEyeCamera, MotionEyeCameraManagerEngine};
pub use reolink::{ReolinkCamera, ReolinkCameraManagerEngine};
