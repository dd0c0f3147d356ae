//! Timer-driven polling for the auth screen.
//!
//! A poller is a spawned task that runs a tick function on a fixed period
//! until the tick returns [`ControlFlow::Break`] or the task is aborted.
//! Ticks never overlap: the next tick waits for the previous network round
//! trip to finish.

use crate::core::auth::Tab;
use crate::service::protocol::{FaceBox, ValidationResult};
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const STATUS_POSITION_FACE: &str = "Position your face in frame";
pub const STATUS_VERIFYING: &str = "Verifying...";
pub const STATUS_RECOGNIZED: &str = "Recognized! Logging in...";
pub const STATUS_LOGIN_FAILED: &str = "Login failed. Try again.";
pub const STATUS_NOT_REGISTERED: &str = "Face not registered. Please register first.";
pub const STATUS_VERIFIED: &str = "verified";

pub fn already_registered_status(name: &str) -> String {
    format!("Already registered as {}. Use Login instead.", name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Optional early run before the regular cadence starts.
    pub first_run: Option<Duration>,
    pub period: Duration,
}

impl PollSchedule {
    pub fn every(period: Duration) -> Self {
        Self { first_run: None, period }
    }

    pub fn with_first_run(mut self, delay: Duration) -> Self {
        self.first_run = Some(delay);
        self
    }
}

/// Run `tick` on `schedule` in a new task.
pub fn spawn_poller<F, Fut>(schedule: PollSchedule, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let start = Instant::now();
        if let Some(delay) = schedule.first_run {
            tokio::time::sleep(delay).await;
            if tick().await.is_break() {
                return;
            }
        }

        let mut interval = tokio::time::interval_at(start + schedule.period, schedule.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tick().await.is_break() {
                break;
            }
        }
    })
}

/// What a validation response means for the current tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// No usable face yet. Keep polling and show the status text.
    Transient { status: String },
    /// Login tab, known face: stop polling and log in with this frame.
    Recognized { name: String },
    /// Register tab, known face: block until the user switches tabs.
    AlreadyRegistered { name: String },
    /// Login tab, unknown face: stop polling and block.
    NotRegistered,
    /// Register tab, new face: keep the frame for registration.
    Verified,
}

pub fn interpret(tab: Tab, result: &ValidationResult) -> ValidationOutcome {
    if !result.valid {
        let status = result
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| STATUS_VERIFYING.to_string());
        return ValidationOutcome::Transient { status };
    }

    let known_name = result
        .existing_name
        .as_ref()
        .filter(|_| result.already_registered)
        .cloned();

    match (tab, known_name) {
        (Tab::Login, Some(name)) => ValidationOutcome::Recognized { name },
        (Tab::Register, Some(name)) => ValidationOutcome::AlreadyRegistered { name },
        (Tab::Login, None) => ValidationOutcome::NotRegistered,
        (Tab::Register, None) => ValidationOutcome::Verified,
    }
}

/// Face bounding box as percentages of the frame, for overlay drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceRect {
    pub fn from_box(face: &FaceBox, frame_width: u32, frame_height: u32) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        Some(Self {
            left: face.x / fw * 100.0,
            top: face.y / fh * 100.0,
            width: face.width / fw * 100.0,
            height: face.height / fh * 100.0,
        })
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn result(valid: bool, registered: bool, name: Option<&str>) -> ValidationResult {
        ValidationResult {
            valid,
            already_registered: registered,
            existing_name: name.map(str::to_string),
            message: None,
        }
    }

    #[test]
    fn invalid_is_transient_with_backend_message() {
        let mut res = result(false, false, None);
        res.message = Some("Move closer. Face is too small.".into());
        assert_eq!(
            interpret(Tab::Login, &res),
            ValidationOutcome::Transient { status: "Move closer. Face is too small.".into() }
        );
        assert_eq!(
            interpret(Tab::Register, &result(false, false, None)),
            ValidationOutcome::Transient { status: STATUS_VERIFYING.into() }
        );
    }

    #[test]
    fn known_face_depends_on_tab() {
        let res = result(true, true, Some("Ada"));
        assert_eq!(interpret(Tab::Login, &res), ValidationOutcome::Recognized { name: "Ada".into() });
        assert_eq!(interpret(Tab::Register, &res), ValidationOutcome::AlreadyRegistered { name: "Ada".into() });
    }

    #[test]
    fn new_face_depends_on_tab() {
        let res = result(true, false, None);
        assert_eq!(interpret(Tab::Login, &res), ValidationOutcome::NotRegistered);
        assert_eq!(interpret(Tab::Register, &res), ValidationOutcome::Verified);
    }

    #[test]
    fn registered_without_name_counts_as_new() {
        let res = result(true, true, None);
        assert_eq!(interpret(Tab::Register, &res), ValidationOutcome::Verified);
    }

    #[test]
    fn face_rect_is_percent_of_frame() {
        let face = FaceBox { x: 160.0, y: 120.0, width: 320.0, height: 240.0 };
        let rect = FaceRect::from_box(&face, 640, 480).unwrap();
        assert_eq!(rect, FaceRect { left: 25.0, top: 25.0, width: 50.0, height: 50.0 });
        assert_eq!(rect.center(), (50.0, 50.0));
        assert!(FaceRect::from_box(&face, 0, 480).is_none());
    }

    #[tokio::test]
    async fn poller_stops_on_break() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let handle = spawn_poller(
            PollSchedule::every(Duration::from_millis(5)).with_first_run(Duration::from_millis(1)),
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
            },
        );
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }
}
