use crate::camera_manager::camera::Camera;
use crate::capabilities::PtzMovementType;
use crate::error::Result;
use crate::hass::ActionExecutor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Interval between repeated relative moves when emulating continuous motion
pub const DEFAULT_R2C_DELAY: Duration = Duration::from_millis(500);
/// Time between start and stop when emulating a relative move
pub const DEFAULT_C2R_DELAY: Duration = Duration::from_millis(200);

/// PTZ action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtzAction {
    Left,
    Right,
    Up,
    Down,
    ZoomIn,
    ZoomOut,
    Preset,
}

impl PtzAction {
    pub const MOVEMENTS: [PtzAction; 6] = [
        PtzAction::Left,
        PtzAction::Right,
        PtzAction::Up,
        PtzAction::Down,
        PtzAction::ZoomIn,
        PtzAction::ZoomOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PtzAction::Left => "left",
            PtzAction::Right => "right",
            PtzAction::Up => "up",
            PtzAction::Down => "down",
            PtzAction::ZoomIn => "zoom_in",
            PtzAction::ZoomOut => "zoom_out",
            PtzAction::Preset => "preset",
        }
    }
}

impl fmt::Display for PtzAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Press-and-hold phase. No phase means a single relative move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzPhase {
    Start,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtzActionOptions {
    pub phase: Option<PtzPhase>,
    pub preset: Option<String>,
}

impl PtzActionOptions {
    pub fn phase(phase: PtzPhase) -> Self {
        PtzActionOptions {
            phase: Some(phase),
            preset: None,
        }
    }

    pub fn preset(preset: impl Into<String>) -> Self {
        PtzActionOptions {
            phase: None,
            preset: Some(preset.into()),
        }
    }
}

struct ActiveEmulation {
    action: PtzAction,
    generation: u64,
    stop: oneshot::Sender<()>,
}

/// Runs PTZ actions against a camera, emulating the motion type the hardware lacks.
///
/// Continuous (start/stop) requests on relative-only hardware repeat the relative
/// move every `r2c` interval until stopped. Relative requests on continuous-only
/// hardware become a start, a `c2r` pause, then a stop.
pub struct PtzController {
    camera: Arc<dyn Camera>,
    executor: Arc<dyn ActionExecutor>,
    active: Mutex<Option<ActiveEmulation>>,
    generation: AtomicU64,
}

impl PtzController {
    pub fn new(camera: Arc<dyn Camera>, executor: Arc<dyn ActionExecutor>) -> Self {
        PtzController {
            camera,
            executor,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn r2c_delay(&self) -> Duration {
        self.camera
            .config()
            .ptz
            .r2c_delay_between_calls_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(DEFAULT_R2C_DELAY)
    }

    fn c2r_delay(&self) -> Duration {
        self.camera
            .config()
            .ptz
            .c2r_delay_between_calls_seconds
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .unwrap_or(DEFAULT_C2R_DELAY)
    }

    fn supports(&self, action: PtzAction, movement: PtzMovementType) -> bool {
        self.camera
            .capabilities()
            .and_then(|c| c.get_ptz_capabilities().map(|p| p.supports(action, movement)))
            .unwrap_or(false)
    }

    pub fn is_emulating(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Execute an action. Returns false if the camera cannot perform it.
    pub async fn execute(&self, action: PtzAction, options: PtzActionOptions) -> Result<bool> {
        if action == PtzAction::Preset {
            return self
                .camera
                .execute_ptz_action(self.executor.as_ref(), action, &options)
                .await;
        }

        let relative = self.supports(action, PtzMovementType::Relative);
        let continuous = self.supports(action, PtzMovementType::Continuous);

        match options.phase {
            Some(phase) if !continuous && relative => self.emulate_continuous(action, phase).await,
            None if !relative && continuous => self.emulate_relative(action).await,
            _ => {
                self.camera
                    .execute_ptz_action(self.executor.as_ref(), action, &options)
                    .await
            }
        }
    }

    async fn emulate_continuous(&self, action: PtzAction, phase: PtzPhase) -> Result<bool> {
        // Any new request for this camera ends a running emulation
        let previous = self.active.lock().ok().and_then(|mut a| a.take());
        if let Some(previous) = previous {
            debug!(
                "[PtzController] Stopping emulated continuous {} for camera {}",
                previous.action,
                self.camera.id()
            );
            let _ = previous.stop.send(());
        }

        if phase == PtzPhase::Stop {
            return Ok(true);
        }

        // Registered before the first move so a stop arriving meanwhile is seen.
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut active) = self.active.lock() {
            *active = Some(ActiveEmulation {
                action,
                generation,
                stop: stop_tx,
            });
        }

        let handled = self
            .camera
            .execute_ptz_action(self.executor.as_ref(), action, &PtzActionOptions::default())
            .await;
        if !matches!(handled, Ok(true)) {
            self.clear_active(generation);
            return handled;
        }

        match stop_rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => {}
            _ => {
                debug!(
                    "[PtzController] Continuous {} for camera {} stopped during the first move",
                    action,
                    self.camera.id()
                );
                return Ok(true);
            }
        }

        let camera = self.camera.clone();
        let executor = self.executor.clone();
        let interval = self.r2c_delay();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match camera
                    .execute_ptz_action(executor.as_ref(), action, &PtzActionOptions::default())
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(
                            "[PtzController] Repeated {} failed for camera {}: {}",
                            action,
                            camera.id(),
                            e
                        );
                        break;
                    }
                }
            }
        });

        Ok(true)
    }

    async fn emulate_relative(&self, action: PtzAction) -> Result<bool> {
        let start = self
            .camera
            .execute_ptz_action(
                self.executor.as_ref(),
                action,
                &PtzActionOptions::phase(PtzPhase::Start),
            )
            .await?;
        if !start {
            return Ok(false);
        }

        tokio::time::sleep(self.c2r_delay()).await;

        self.camera
            .execute_ptz_action(
                self.executor.as_ref(),
                action,
                &PtzActionOptions::phase(PtzPhase::Stop),
            )
            .await
    }

    /// Forget the emulation started as `generation`, unless a newer one replaced it.
    fn clear_active(&self, generation: u64) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|a| a.generation == generation) {
                *active = None;
            }
        }
    }

    /// Stop any emulated continuous motion.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().ok().and_then(|mut a| a.take()) {
            let _ = active.stop.send(());
        }
    }
}

impl Drop for PtzController {
    fn drop(&mut self) {
        self.stop();
    }
}
