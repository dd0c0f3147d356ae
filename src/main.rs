use jarvis::{
    camera::{CameraCapture, V4l2Source, Zoom},
    cli::{auth_screen, chat_repl},
    common::{Config, DevMode},
    core::{chat, AuthFlowController, ChatSession, Tab, TerminalSpeech, VoiceController},
    service::{ApiClient, FaceAuthApi},
    storage::{SessionManager, SessionStore},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "jarvis")]
#[command(about = "J.A.R.V.I.S. terminal assistant with face login")]
struct Cli {
    /// Enable development mode (saves data locally for testing)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (defaults to configs/jarvis.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with your face
    Login,
    /// Register a new face
    Register {
        /// Display name; asked for interactively when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Talk to the assistant
    Chat,
    /// Manage documents for question answering
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },
    /// Show the logged-in user
    Whoami,
    /// Forget the stored session
    Logout,
    /// Capture one frame and save it
    TestCamera {
        /// Digital zoom: 1.0, 1.4 or 1.8
        #[arg(short, long, default_value = "1.0")]
        zoom: f32,
    },
}

#[derive(Subcommand)]
enum DocsCommands {
    /// List uploaded documents
    List,
    /// Upload a pdf, txt or docx file
    Upload { path: PathBuf },
    /// Ask a question about uploaded documents
    Ask { question: String },
}

struct App {
    config: Config,
    dev_mode: DevMode,
    sessions: Arc<SessionManager>,
    api: Arc<ApiClient>,
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load()?,
        };
        let dev_mode = DevMode::new(cli.dev)?;
        let sessions = SessionManager::new(SessionStore::new_with_dev_mode(&dev_mode)?);
        sessions.restore()?;
        let api = Arc::new(ApiClient::new(&config, sessions.context())?);
        Ok(Self { config, dev_mode, sessions, api })
    }

    fn auth_controller(&self) -> Result<AuthFlowController> {
        let camera = CameraCapture::new(Box::new(V4l2Source::new(&self.config.camera)));
        let api: Arc<dyn FaceAuthApi> = self.api.clone();
        Ok(AuthFlowController::new(api, camera, self.sessions.clone(), &self.config.auth)?)
    }

    async fn authenticate(&self, tab: Tab, name: Option<&str>) -> Result<bool> {
        let controller = self.auth_controller()?;
        match auth_screen::run(&controller, tab, name).await {
            Ok(done) => Ok(done),
            Err(e) => {
                println!("❌ {}", e.user_message());
                Ok(false)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on mode
    setup_logging(cli.dev);

    let app = App::new(&cli)?;

    match &cli.command {
        Commands::Login => {
            if app.authenticate(Tab::Login, None).await? {
                print_user(&app);
            } else {
                println!("Login cancelled");
            }
        }
        Commands::Register { name } => {
            if app.authenticate(Tab::Register, name.as_deref()).await? {
                print_user(&app);
            } else {
                println!("Registration cancelled");
            }
        }
        Commands::Chat => {
            if app.sessions.current_user().is_none() && !app.authenticate(Tab::Login, None).await? {
                println!("Login required to chat");
                return Ok(());
            }
            let backend = chat::backend_for(&app.config.chat, app.api.clone());
            let session = ChatSession::new(backend);
            let voice = VoiceController::new(Box::new(TerminalSpeech::new(&app.config.voice)));
            chat_repl::run(&session, &voice, &app.sessions, app.config.voice.speak_replies).await?;
        }
        Commands::Docs { command } => run_docs(&app, command).await?,
        Commands::Whoami => print_user(&app),
        Commands::Logout => {
            app.sessions.logout()?;
            println!("Logged out");
        }
        Commands::TestCamera { zoom } => test_camera(&app, *zoom).await?,
    }

    Ok(())
}

fn print_user(app: &App) {
    match app.sessions.current_user() {
        Some(user) => println!("✅ Logged in as {} ({})", user.name, user.user_id),
        None => println!("Not logged in"),
    }
}

async fn run_docs(app: &App, command: &DocsCommands) -> Result<()> {
    match command {
        DocsCommands::List => {
            let list = app.api.list_documents().await?;
            if list.documents.is_empty() {
                println!("No documents uploaded");
            }
            for doc in list.documents {
                println!("📄 {}  {}", doc.id, doc.filename);
            }
        }
        DocsCommands::Upload { path } => {
            let uploaded = app
                .api
                .upload_document(path)
                .await
                .with_context(|| format!("Uploading {}", path.display()))?;
            println!("Uploaded {} ({})", uploaded.doc_id, uploaded.status);
        }
        DocsCommands::Ask { question } => {
            let answer = app.api.query_documents(question).await?;
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources: {}", answer.sources.join(", "));
            }
        }
    }
    Ok(())
}

async fn test_camera(app: &App, zoom: f32) -> Result<()> {
    let zoom = Zoom::new(zoom)?;
    println!("Testing camera at {} zoom...", zoom);

    let mut camera = CameraCapture::new(Box::new(V4l2Source::new(&app.config.camera)));
    camera.start()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let frame = loop {
        if let Some(frame) = camera.capture_frame(zoom)? {
            break frame;
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("No frame received from camera");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    camera.stop();

    let mut img = frame.decode()?.to_rgb8();
    match app.api.analyze_face(frame.as_str()).await {
        Ok(analysis) => {
            println!("Faces detected: {}", analysis.face_count);
            for face in &analysis.faces {
                let rect = Rect::at(face.x.max(0.0) as i32, face.y.max(0.0) as i32)
                    .of_size(face.width.max(1.0) as u32, face.height.max(1.0) as u32);
                draw_hollow_rect_mut(&mut img, rect, Rgb([0, 255, 0]));
            }
        }
        Err(e) => println!("Face analysis unavailable: {}", e),
    }

    let save_path = if app.dev_mode.is_enabled() {
        app.dev_mode.get_capture_path("test_capture")
    } else {
        PathBuf::from("test_capture.jpg")
    };
    img.save(&save_path)?;
    println!("Saved test image to {:?}", save_path);
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
