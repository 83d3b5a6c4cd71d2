//! HTTP client for the facematchd API.

use anyhow::{Context, Result};
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// Status and decoded JSON body of one API call.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    /// The server's `detail` or `message`, or the raw body.
    pub fn error_message(&self) -> String {
        self.body
            .get("detail")
            .or_else(|| self.body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.body.to_string())
    }
}

pub struct FaceMatchClient {
    client: Client,
    base_url: String,
}

impl FaceMatchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn enroll(&self, name: &str, id: &str, image: &Path) -> Result<ApiResponse> {
        let form = Form::new()
            .text("name", name.to_string())
            .text("user_id", id.to_string())
            .part("image", image_part(image).await?);
        self.send(self.client.post(self.url("/upload")).multipart(form)).await
    }

    pub async fn recognize(&self, image: &Path) -> Result<ApiResponse> {
        let form = Form::new().part("image", image_part(image).await?);
        self.send(self.client.post(self.url("/recognize")).multipart(form)).await
    }

    pub async fn scan(&self, image: &Path) -> Result<ApiResponse> {
        let bytes = read_image(image).await?;
        let body = json!({ "image": data_url(image, &bytes) });
        self.send(self.client.post(self.url("/recognize_realtime")).json(&body)).await
    }

    pub async fn list(&self) -> Result<ApiResponse> {
        self.send(self.client.get(self.url("/known-faces"))).await
    }

    pub async fn status(&self) -> Result<ApiResponse> {
        self.send(self.client.get(self.url("/status"))).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse> {
        let response = request
            .send()
            .await
            .with_context(|| format!("could not reach facematchd at {}", self.base_url))?;
        let status = response.status();
        let text = response.text().await.context("failed to read response body")?;
        tracing::debug!(%status, bytes = text.len(), "response received");

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ApiResponse { status, body })
    }
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn image_part(path: &Path) -> Result<Part> {
    let bytes = read_image(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string());
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime_type(path))
        .context("invalid mime type")
}

fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn data_url(path: &Path, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type(path),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
