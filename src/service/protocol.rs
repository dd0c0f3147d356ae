use serde::{Deserialize, Serialize};

// Chat
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatReply {
    pub content: String,
}

// Face analysis
#[derive(Serialize, Debug, Clone)]
pub struct ImageRequest<'a> {
    pub image: &'a str,
}

/// Detected face in source-frame pixels.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FaceAnalysis {
    #[serde(default)]
    pub face_count: u32,
    #[serde(default)]
    pub faces: Vec<FaceBox>,
    #[serde(default)]
    pub recognized: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

// Auth
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub already_registered: bool,
    #[serde(default)]
    pub existing_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegisteredFace {
    pub user_id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct RegisterCompleteRequest<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
}

#[derive(Serialize, Debug, Clone)]
pub struct RegisterRequest<'a> {
    pub image: &'a str,
    pub name: &'a str,
}

/// Terminal artifact of the auth flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub name: String,
    pub token: String,
}

// Documents
#[derive(Deserialize, Debug, Clone)]
pub struct UploadedDocument {
    #[serde(default)]
    pub status: String,
    pub doc_id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct QueryRequest<'a> {
    pub question: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct QueryAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Vec<DocumentSummary>,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub detail: Option<String>,
}

/// Extensions the document endpoint accepts.
pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["pdf", "txt", "docx"];
