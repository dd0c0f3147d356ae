use crate::camera::Zoom;
use crate::cli::ascii_preview::{clear_screen, poll_key, AsciiRenderer};
use crate::common::{JarvisError, Result, ZOOM_LEVELS};
use crate::core::{AuthFlowController, AuthSnapshot, Phase, Tab};
use crossterm::event::KeyCode;
use crossterm::{cursor, style, terminal};
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const REDRAW_INTERVAL: Duration = Duration::from_millis(100);

/// The camera can be restarted after a failed login or while the feed is
/// down, for example when access was denied.
fn can_retry(snap: &AuthSnapshot) -> bool {
    snap.phase == Phase::Failed || !snap.has_feed
}

/// Keys `1`..`3` pick the zoom levels in ascending order.
fn zoom_for_key(key: KeyCode) -> Option<Zoom> {
    let KeyCode::Char(c) = key else {
        return None;
    };
    let index = c.to_digit(10)?.checked_sub(1)? as usize;
    ZOOM_LEVELS.get(index).and_then(|factor| Zoom::new(*factor).ok())
}

/// What the user is offered in the current phase.
fn hint(snap: &AuthSnapshot) -> String {
    let lead = match (&snap.phase, snap.tab) {
        (Phase::Verified, _) => "ENTER register this face | TAB switch",
        _ if can_retry(snap) => "R retry | TAB switch",
        (Phase::NotRegistered, _) | (Phase::AlreadyRegistered { .. }, _) => "TAB switch",
        (_, Tab::Login) => "LOGIN  | TAB register",
        (_, Tab::Register) => "REGISTER  | TAB login",
    };
    if snap.has_feed {
        format!("{} | 1/2/3 zoom | ESC cancel", lead)
    } else {
        format!("{} | ESC cancel", lead)
    }
}

/// Start the feed. A failure leaves the screen up; the error is part of the
/// next snapshot.
fn restart_camera(controller: &AuthFlowController) {
    if let Err(e) = controller.start_camera() {
        tracing::debug!("Camera unavailable, waiting for retry: {}", e);
    }
}

enum Action {
    Continue,
    Cancel,
}

/// Interactive auth screen. Returns once the flow authenticates or the
/// user cancels; the session manager has the user in the former case.
pub async fn run(controller: &AuthFlowController, tab: Tab, preset_name: Option<&str>) -> Result<bool> {
    let renderer = AsciiRenderer::new(None, None);
    controller.switch_tab(tab);

    terminal::enable_raw_mode()
        .map_err(|e| JarvisError::Other(anyhow::anyhow!("Failed to enable raw mode: {}", e)))?;
    clear_screen().ok();
    crossterm::execute!(io::stdout(), cursor::Hide).ok();

    let result = drive(controller, &renderer, preset_name).await;

    controller.stop_camera();
    crossterm::execute!(io::stdout(), cursor::Show).ok();
    terminal::disable_raw_mode().ok();
    clear_screen().ok();
    result
}

async fn drive(controller: &AuthFlowController, renderer: &AsciiRenderer, preset_name: Option<&str>) -> Result<bool> {
    restart_camera(controller);
    let mut ticker = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        ticker.tick().await;
        let snap = controller.snapshot();
        if snap.phase == Phase::Authenticated {
            return Ok(true);
        }

        draw(controller, renderer, &snap);

        let key = poll_key().map_err(|e| JarvisError::Other(anyhow::anyhow!("Failed to check input: {}", e)))?;
        let Some(key) = key else {
            continue;
        };
        match handle_key(controller, &snap, key, preset_name).await? {
            Action::Continue => {}
            Action::Cancel => return Ok(false),
        }
    }
}

async fn handle_key(
    controller: &AuthFlowController,
    snap: &AuthSnapshot,
    key: KeyCode,
    preset_name: Option<&str>,
) -> Result<Action> {
    match key {
        KeyCode::Esc => return Ok(Action::Cancel),
        KeyCode::Tab => {
            let next = match snap.tab {
                Tab::Login => Tab::Register,
                Tab::Register => Tab::Login,
            };
            controller.switch_tab(next);
            clear_screen().ok();
            restart_camera(controller);
        }
        KeyCode::Char('r') | KeyCode::Char('R') if can_retry(snap) => {
            clear_screen().ok();
            restart_camera(controller);
        }
        key @ KeyCode::Char(_) if snap.has_feed => {
            if let Some(zoom) = zoom_for_key(key) {
                controller.set_zoom(zoom);
            }
        }
        KeyCode::Enter if snap.phase == Phase::Verified => {
            if controller.confirm_registration().await.is_err() {
                return Ok(Action::Continue);
            }
            let name = match preset_name {
                Some(name) => name.to_string(),
                None => prompt_name().await?,
            };
            // Failures are shown on the next redraw.
            let _ = controller.submit_name(&name).await;
            clear_screen().ok();
        }
        _ => {}
    }
    Ok(Action::Continue)
}

fn draw(controller: &AuthFlowController, renderer: &AsciiRenderer, snap: &AuthSnapshot) {
    let art = match controller.preview_frame() {
        Some(frame) => renderer.render(&frame, snap.face_rect.as_ref(), &snap.validation_status),
        None => String::new(),
    };
    let error = snap.error.as_deref().unwrap_or("");

    crossterm::execute!(
        io::stdout(),
        cursor::MoveTo(0, 0),
        style::Print(&art),
        cursor::MoveTo(0, (renderer.height() + 1) as u16),
        terminal::Clear(terminal::ClearType::CurrentLine),
        style::Print(format!("{}  [zoom {}]", snap.validation_status, snap.zoom)),
        cursor::MoveTo(0, (renderer.height() + 2) as u16),
        terminal::Clear(terminal::ClearType::CurrentLine),
        style::Print(error),
        cursor::MoveTo(0, (renderer.height() + 3) as u16),
        terminal::Clear(terminal::ClearType::CurrentLine),
        style::Print(hint(snap)),
    )
    .ok();
}

async fn prompt_name() -> Result<String> {
    terminal::disable_raw_mode().ok();
    clear_screen().ok();
    crossterm::execute!(io::stdout(), cursor::Show).ok();
    print!("Face registered. What should I call you? (optional): ");
    io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

    terminal::enable_raw_mode().ok();
    crossterm::execute!(io::stdout(), cursor::Hide).ok();
    Ok(line.trim().to_string())
}
