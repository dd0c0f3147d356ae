//! Face-authentication flow for the login and register tabs.
//!
//! The controller owns the camera, the validation poller (2000 ms) and the
//! face-tracking poller (400 ms). Every timer and in-flight request is tagged
//! with the session epoch at the time it started; stopping the camera or
//! switching tabs bumps the epoch, so late completions are discarded even if
//! they slipped past task cancellation.

use crate::camera::{CameraCapture, CapturedFrame, Zoom};
use crate::common::config::AuthConfig;
use crate::common::{JarvisError, Result};
use crate::core::poller::{
    already_registered_status, interpret, spawn_poller, FaceRect, PollSchedule, ValidationOutcome,
    STATUS_LOGIN_FAILED, STATUS_NOT_REGISTERED, STATUS_POSITION_FACE, STATUS_RECOGNIZED,
    STATUS_VERIFIED, STATUS_VERIFYING,
};
use crate::service::protocol::AuthenticatedUser;
use crate::service::FaceAuthApi;
use crate::storage::SessionManager;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const CAMERA_DENIED_MESSAGE: &str = "Camera access denied. Face is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Camera,
    NameEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    /// Login request in flight.
    Authenticating,
    /// Login failed; the camera must be restarted to try again.
    Failed,
    /// Login tab saw a face nobody registered.
    NotRegistered,
    /// Register tab saw a face that already has an account.
    AlreadyRegistered { name: String },
    /// Register tab holds a verified frame awaiting confirmation.
    Verified,
    /// Face registration request in flight.
    Registering,
    NameEntry,
    /// Registration completion request in flight.
    Completing,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub tab: Tab,
    pub step: Step,
    pub phase: Phase,
    pub zoom: Zoom,
    pub face_rect: Option<FaceRect>,
    pub validation_status: String,
    pub verified_image: Option<CapturedFrame>,
    pub error: Option<String>,
    pub has_feed: bool,
    pub validation_timers: usize,
    pub tracking_timers: usize,
}

impl AuthSnapshot {
    pub fn active_timers(&self) -> usize {
        self.validation_timers + self.tracking_timers
    }
}

struct AuthSession {
    tab: Tab,
    step: Step,
    phase: Phase,
    zoom: Zoom,
    face_rect: Option<FaceRect>,
    validation_status: String,
    verified_image: Option<CapturedFrame>,
    error: Option<String>,
    pending_user_id: Option<String>,
    // Face registration in progress; validation ticks stand down.
    submitting: bool,
    epoch: u64,
    validate_task: Option<JoinHandle<()>>,
    track_task: Option<JoinHandle<()>>,
}

impl AuthSession {
    fn new(zoom: Zoom) -> Self {
        Self {
            tab: Tab::Login,
            step: Step::Camera,
            phase: Phase::Idle,
            zoom,
            face_rect: None,
            validation_status: String::new(),
            verified_image: None,
            error: None,
            pending_user_id: None,
            submitting: false,
            epoch: 0,
            validate_task: None,
            track_task: None,
        }
    }

    /// Cancel both timers and invalidate everything started before now.
    fn halt(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.validate_task.take() {
            task.abort();
        }
        if let Some(task) = self.track_task.take() {
            task.abort();
        }
    }

    fn clear_transient(&mut self) {
        self.face_rect = None;
        self.validation_status.clear();
        self.verified_image = None;
        self.pending_user_id = None;
        self.submitting = false;
        self.step = Step::Camera;
    }
}

struct Shared {
    api: Arc<dyn FaceAuthApi>,
    camera: Mutex<CameraCapture>,
    session: Mutex<AuthSession>,
    sessions: Arc<SessionManager>,
    validate_schedule: PollSchedule,
    track_schedule: PollSchedule,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, AuthSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn camera(&self) -> MutexGuard<'_, CameraCapture> {
        self.camera.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn capture(&self, zoom: Zoom) -> Option<CapturedFrame> {
        match self.camera().capture_frame(zoom) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Frame capture failed: {}", e);
                None
            }
        }
    }
}

/// Drives the auth screen: tabs, camera, pollers and the final calls.
#[derive(Clone)]
pub struct AuthFlowController {
    shared: Arc<Shared>,
}

impl AuthFlowController {
    pub fn new(
        api: Arc<dyn FaceAuthApi>,
        camera: CameraCapture,
        sessions: Arc<SessionManager>,
        config: &AuthConfig,
    ) -> Result<Self> {
        let zoom = Zoom::new(config.default_zoom)?;
        let validate_schedule = PollSchedule::every(Duration::from_millis(config.validate_interval_ms))
            .with_first_run(Duration::from_millis(config.initial_validate_delay_ms));
        let track_schedule = PollSchedule::every(Duration::from_millis(config.track_interval_ms));

        Ok(Self {
            shared: Arc::new(Shared {
                api,
                camera: Mutex::new(camera),
                session: Mutex::new(AuthSession::new(zoom)),
                sessions,
                validate_schedule,
                track_schedule,
            }),
        })
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let has_feed = self.shared.camera().has_active_feed();
        let s = self.shared.session();
        AuthSnapshot {
            tab: s.tab,
            step: s.step,
            phase: s.phase.clone(),
            zoom: s.zoom,
            face_rect: s.face_rect,
            validation_status: s.validation_status.clone(),
            verified_image: s.verified_image.clone(),
            error: s.error.clone(),
            has_feed,
            validation_timers: usize::from(s.validate_task.is_some()),
            tracking_timers: usize::from(s.track_task.is_some()),
        }
    }

    /// Raw current camera frame for previews.
    pub fn preview_frame(&self) -> Option<image::DynamicImage> {
        self.shared.camera().latest_image().ok().flatten()
    }

    /// Open the camera and start both pollers. Any previous run is stopped
    /// first, so at most one of each timer exists.
    pub fn start_camera(&self) -> Result<()> {
        self.stop_camera();

        {
            let mut s = self.shared.session();
            s.error = None;
        }

        if let Err(e) = self.shared.camera().start() {
            tracing::warn!("Camera start failed: {}", e);
            self.shared.session().error = Some(CAMERA_DENIED_MESSAGE.to_string());
            return Err(e);
        }

        let mut s = self.shared.session();
        s.halt();
        s.clear_transient();
        s.phase = Phase::Polling;
        s.validation_status = STATUS_POSITION_FACE.to_string();
        let epoch = s.epoch;

        let shared = self.shared.clone();
        s.track_task = Some(spawn_poller(self.shared.track_schedule, move || {
            let shared = shared.clone();
            async move { run_face_track(shared, epoch).await }
        }));

        let shared = self.shared.clone();
        s.validate_task = Some(spawn_poller(self.shared.validate_schedule, move || {
            let shared = shared.clone();
            async move { run_validation(shared, epoch).await }
        }));

        tracing::info!("Camera polling started on {:?} tab", s.tab);
        Ok(())
    }

    /// Cancel both pollers, release the camera and clear transient state.
    /// Safe to call any number of times.
    pub fn stop_camera(&self) {
        {
            let mut s = self.shared.session();
            s.halt();
            s.clear_transient();
            if s.phase != Phase::Authenticated {
                s.phase = Phase::Idle;
            }
        }
        self.shared.camera().stop();
    }

    pub fn switch_tab(&self, tab: Tab) {
        self.stop_camera();
        let mut s = self.shared.session();
        s.tab = tab;
        s.error = None;
        s.validation_status.clear();
        s.verified_image = None;
        tracing::debug!("Switched to {:?} tab", tab);
    }

    /// Affects subsequent captures only.
    pub fn set_zoom(&self, zoom: Zoom) {
        self.shared.session().zoom = zoom;
    }

    /// Register tab: submit the verified frame to obtain a user id and move
    /// on to name entry.
    pub async fn confirm_registration(&self) -> Result<()> {
        let (frame, epoch) = {
            let mut s = self.shared.session();
            if s.tab != Tab::Register || s.phase != Phase::Verified {
                return Err(JarvisError::Other(anyhow::anyhow!("No verified face to register")));
            }
            if s.pending_user_id.is_some() {
                s.phase = Phase::NameEntry;
                s.step = Step::NameEntry;
                return Ok(());
            }
            let frame = s
                .verified_image
                .clone()
                .ok_or_else(|| JarvisError::Other(anyhow::anyhow!("No verified face to register")))?;
            s.submitting = true;
            s.error = None;
            s.phase = Phase::Registering;
            (frame, s.epoch)
        };

        let result = self.shared.api.register_face(frame.as_str()).await;

        let mut s = self.shared.session();
        if s.epoch != epoch {
            tracing::debug!("Discarding face registration result from a stale session");
            return Ok(());
        }
        s.submitting = false;
        match result {
            Ok(user_id) => {
                tracing::info!("Face stored, awaiting name for {}", user_id);
                s.pending_user_id = Some(user_id);
                s.phase = Phase::NameEntry;
                s.step = Step::NameEntry;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Face registration failed: {}", e);
                s.error = Some(e.user_message());
                s.phase = Phase::Verified;
                Err(e)
            }
        }
    }

    /// Name entry: complete registration with an optional display name.
    pub async fn submit_name(&self, name: &str) -> Result<AuthenticatedUser> {
        let (user_id, epoch) = {
            let mut s = self.shared.session();
            let user_id = match (&s.phase, &s.pending_user_id) {
                (Phase::NameEntry, Some(id)) => id.clone(),
                _ => return Err(JarvisError::Other(anyhow::anyhow!("Registration is not awaiting a name"))),
            };
            s.error = None;
            s.phase = Phase::Completing;
            (user_id, s.epoch)
        };

        let result = self.shared.api.register_complete(&user_id, name.trim()).await;

        {
            let mut s = self.shared.session();
            if s.epoch != epoch {
                return Err(JarvisError::Other(anyhow::anyhow!("Registration was cancelled")));
            }
            if let Err(e) = &result {
                tracing::warn!("Registration completion failed: {}", e);
                s.error = Some(e.user_message());
                s.phase = Phase::Verified;
                s.step = Step::Camera;
            }
        }

        let user = result?;
        self.finish(user.clone(), epoch)?;
        Ok(user)
    }

    /// Hand the user to the session manager and shut the screen down.
    fn finish(&self, user: AuthenticatedUser, epoch: u64) -> Result<()> {
        finish_authenticated(&self.shared, user, epoch)
    }
}

fn finish_authenticated(shared: &Shared, user: AuthenticatedUser, epoch: u64) -> Result<()> {
    {
        let mut s = shared.session();
        if s.epoch != epoch {
            return Ok(());
        }
        s.halt();
        s.clear_transient();
        s.phase = Phase::Authenticated;
    }
    shared.camera().stop();
    shared.sessions.login(user)
}

async fn run_face_track(shared: Arc<Shared>, epoch: u64) -> ControlFlow<()> {
    let zoom = {
        let s = shared.session();
        if s.epoch != epoch {
            return ControlFlow::Break(());
        }
        s.zoom
    };
    let Some(frame) = shared.capture(zoom) else {
        return ControlFlow::Continue(());
    };

    let analysis = shared.api.analyze_face(frame.as_str()).await;

    let mut s = shared.session();
    if s.epoch != epoch {
        return ControlFlow::Break(());
    }
    s.face_rect = match analysis {
        Ok(a) if a.face_count == 1 => a
            .faces
            .first()
            .and_then(|face| FaceRect::from_box(face, frame.width, frame.height)),
        Ok(_) => None,
        Err(e) => {
            tracing::trace!("Face tracking request failed: {}", e);
            None
        }
    };
    ControlFlow::Continue(())
}

async fn run_validation(shared: Arc<Shared>, epoch: u64) -> ControlFlow<()> {
    let (tab, zoom) = {
        let s = shared.session();
        if s.epoch != epoch {
            return ControlFlow::Break(());
        }
        if s.submitting {
            return ControlFlow::Continue(());
        }
        (s.tab, s.zoom)
    };
    let Some(frame) = shared.capture(zoom) else {
        return ControlFlow::Continue(());
    };

    let response = shared.api.validate_face(frame.as_str()).await;

    {
        let mut s = shared.session();
        if s.epoch != epoch {
            tracing::debug!("Discarding validation result from a stale session");
            return ControlFlow::Break(());
        }
        if s.submitting {
            return ControlFlow::Continue(());
        }

        let outcome = match response {
            Ok(result) => interpret(tab, &result),
            Err(e) => {
                tracing::debug!("Validation request failed: {}", e);
                s.validation_status = STATUS_VERIFYING.to_string();
                return ControlFlow::Continue(());
            }
        };

        match outcome {
            ValidationOutcome::Transient { status } => {
                s.validation_status = status;
                s.verified_image = None;
                s.phase = Phase::Polling;
                return ControlFlow::Continue(());
            }
            ValidationOutcome::AlreadyRegistered { name } => {
                s.validation_status = already_registered_status(&name);
                s.verified_image = None;
                s.phase = Phase::AlreadyRegistered { name };
                return ControlFlow::Continue(());
            }
            ValidationOutcome::NotRegistered => {
                s.validate_task = None;
                s.validation_status = STATUS_NOT_REGISTERED.to_string();
                s.verified_image = None;
                s.phase = Phase::NotRegistered;
                return ControlFlow::Break(());
            }
            ValidationOutcome::Verified => {
                tracing::info!("Face verified for registration");
                s.validate_task = None;
                s.validation_status = STATUS_VERIFIED.to_string();
                s.verified_image = Some(frame.clone());
                s.phase = Phase::Verified;
                return ControlFlow::Break(());
            }
            ValidationOutcome::Recognized { name } => {
                tracing::info!("Recognized {}, logging in", name);
                s.validate_task = None;
                s.validation_status = STATUS_RECOGNIZED.to_string();
                s.phase = Phase::Authenticating;
            }
        }
    }

    let login = shared.api.login(frame.as_str()).await;
    match login {
        Ok(user) => {
            if let Err(e) = finish_authenticated(&shared, user, epoch) {
                tracing::error!("Failed to store session: {}", e);
                let mut s = shared.session();
                s.error = Some(e.user_message());
                s.phase = Phase::Failed;
            }
        }
        Err(e) => {
            let mut s = shared.session();
            if s.epoch == epoch {
                tracing::warn!("Login failed: {}", e);
                s.validation_status = STATUS_LOGIN_FAILED.to_string();
                s.phase = Phase::Failed;
            }
        }
    }
    ControlFlow::Break(())
}
