use crate::common::{Config, JarvisError, Result, SessionContext};
use crate::service::protocol::{
    AuthenticatedUser, ChatReply, DocumentList, ErrorBody, FaceAnalysis, ImageRequest, Message,
    QueryAnswer, QueryRequest, RegisterCompleteRequest, RegisterRequest, RegisteredFace,
    UploadedDocument, ValidationResult, DOCUMENT_EXTENSIONS,
};
use async_trait::async_trait;
use reqwest::{multipart, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Remote face checks the auth screen depends on.
#[async_trait]
pub trait FaceAuthApi: Send + Sync {
    async fn analyze_face(&self, image: &str) -> Result<FaceAnalysis>;
    async fn validate_face(&self, image: &str) -> Result<ValidationResult>;
    async fn login(&self, image: &str) -> Result<AuthenticatedUser>;
    async fn register_face(&self, image: &str) -> Result<String>;
    async fn register_complete(&self, user_id: &str, name: &str) -> Result<AuthenticatedUser>;
}

/// Thin client over the backend's JSON API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_secs))
            .build()
            .map_err(|e| JarvisError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let reply: ChatReply = self.post_json("/api/chat/message", messages, "Chat failed").await?;
        Ok(reply.content)
    }

    /// One-shot registration with the name already known.
    pub async fn register(&self, image: &str, name: &str) -> Result<AuthenticatedUser> {
        self.post_json("/api/auth/register", &RegisterRequest { image, name }, "Registration failed")
            .await
    }

    pub async fn upload_document(&self, path: &Path) -> Result<UploadedDocument> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(JarvisError::Api {
                status: 400,
                detail: "Supported formats: PDF, TXT, DOCX".to_string(),
            });
        }

        let data = tokio::fs::read(path).await?;
        tracing::info!("Uploading {} ({} bytes)", filename, data.len());
        let form = multipart::Form::new().part("file", multipart::Part::bytes(data).file_name(filename));

        let (request, sent_token) = self.authorize(self.http.post(self.url("/api/documents/upload")));
        let response = request.multipart(form).send().await?;
        let response = self.check(response, sent_token.as_deref(), "Upload failed").await?;
        Ok(response.json().await?)
    }

    pub async fn query_documents(&self, question: &str) -> Result<QueryAnswer> {
        self.post_json("/api/documents/query", &QueryRequest { question }, "Query failed")
            .await
    }

    /// Lists uploaded documents. Any non-success status yields an empty list.
    pub async fn list_documents(&self) -> Result<DocumentList> {
        let (request, sent_token) = self.authorize(self.http.get(self.url("/api/documents/list")));
        let response = request.send().await?;
        let status = response.status().as_u16();
        if let (401, Some(token)) = (status, sent_token.as_deref()) {
            self.session.report_unauthorized(token);
        }
        if !response.status().is_success() {
            tracing::debug!("Document list returned HTTP {}", status);
            return Ok(DocumentList::default());
        }
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the current bearer token. Also returns it, so a 401 can be
    /// matched against the token the request actually carried.
    fn authorize(&self, request: RequestBuilder) -> (RequestBuilder, Option<String>) {
        match self.session.token() {
            Some(token) => (request.bearer_auth(&token), Some(token)),
            None => (request, None),
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, fallback: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let (request, sent_token) = self.authorize(self.http.post(self.url(path)));
        let response = request.json(body).send().await?;
        let response = self.check(response, sent_token.as_deref(), fallback).await?;
        response
            .json()
            .await
            .map_err(|e| JarvisError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn check(&self, response: Response, sent_token: Option<&str>, fallback: &str) -> Result<Response> {
        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.error_for_status(status, &body, sent_token, fallback))
    }

    fn error_for_status(&self, status: u16, body: &str, sent_token: Option<&str>, fallback: &str) -> JarvisError {
        if let (401, Some(token)) = (status, sent_token) {
            self.session.report_unauthorized(token);
            return JarvisError::Unauthorized;
        }
        JarvisError::Api { status, detail: error_detail(body, fallback) }
    }
}

#[async_trait]
impl FaceAuthApi for ApiClient {
    async fn analyze_face(&self, image: &str) -> Result<FaceAnalysis> {
        self.post_json("/api/face/analyze-base64", &ImageRequest { image }, "Face analysis failed")
            .await
    }

    async fn validate_face(&self, image: &str) -> Result<ValidationResult> {
        self.post_json("/api/auth/validate", &ImageRequest { image }, "Validation failed")
            .await
    }

    async fn login(&self, image: &str) -> Result<AuthenticatedUser> {
        self.post_json("/api/auth/login", &ImageRequest { image }, "Login failed").await
    }

    async fn register_face(&self, image: &str) -> Result<String> {
        let face: RegisteredFace = self
            .post_json("/api/auth/register-face", &ImageRequest { image }, "Registration failed")
            .await?;
        if face.user_id.is_empty() {
            return Err(JarvisError::InvalidResponse("Invalid response".into()));
        }
        Ok(face.user_id)
    }

    async fn register_complete(&self, user_id: &str, name: &str) -> Result<AuthenticatedUser> {
        self.post_json(
            "/api/auth/register-complete",
            &RegisterCompleteRequest { user_id, name },
            "Registration failed",
        )
        .await
    }
}

/// Pull `detail` out of a backend error body, or fall back to a fixed message.
fn error_detail(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
