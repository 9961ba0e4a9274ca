// TALKREEL Uploader - Public URL Staging
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// The lip-sync service only accepts public URLs, so every audio clip and
// portrait is pushed to a throwaway file host first. Hosts are tried in a
// fixed order; a URL only counts once a HEAD probe answers 200.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{check_response, PipelineError};

#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn upload(&self, path: &Path) -> Result<String, PipelineError>;
}

/// Existence check for an uploaded URL. Returns the final HTTP status.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<u16, PipelineError>;
}

async fn file_part(path: &Path) -> Result<Part, PipelineError> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.bin".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// 0x0.st: plain-text URL in the body.
pub struct ZeroX0Backend {
    client: reqwest::Client,
    endpoint: String,
}

impl ZeroX0Backend {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(60))?,
            endpoint: "https://0x0.st".to_string(),
        })
    }
}

#[async_trait]
impl UploadBackend for ZeroX0Backend {
    fn name(&self) -> &str {
        "0x0.st"
    }

    async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        let form = Form::new().part("file", file_part(path).await?);
        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        let url = check_response(resp).await?.text().await?.trim().to_string();
        if !url.starts_with("http") {
            return Err(PipelineError::Upload(format!("0x0.st returned invalid response: {}", url)));
        }
        Ok(url)
    }
}

/// tmpfiles.org: JSON body whose page URL must be turned into a `/dl/` link.
pub struct TmpfilesBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl TmpfilesBackend {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(60))?,
            endpoint: "https://tmpfiles.org/api/v1/upload".to_string(),
        })
    }
}

/// `https://tmpfiles.org/123/a.mp3` -> `https://tmpfiles.org/dl/123/a.mp3`.
/// Other URLs pass through untouched.
pub fn direct_download_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let is_tmpfiles = url
        .host_str()
        .map(|h| h == "tmpfiles.org" || h.ends_with(".tmpfiles.org"))
        .unwrap_or(false);
    if !is_tmpfiles || url.path().starts_with("/dl/") {
        return raw.to_string();
    }
    let path = format!("/dl{}", url.path());
    url.set_path(&path);
    url.to_string()
}

#[async_trait]
impl UploadBackend for TmpfilesBackend {
    fn name(&self) -> &str {
        "tmpfiles.org"
    }

    async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        let form = Form::new().part("file", file_part(path).await?);
        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        let body: Value = check_response(resp).await?.json().await?;
        match (body["status"].as_str(), body["data"]["url"].as_str()) {
            (Some("success"), Some(url)) => Ok(direct_download_url(url)),
            _ => Err(PipelineError::Upload(format!("tmpfiles.org returned invalid format: {}", body))),
        }
    }
}

/// catbox.moe: permanent storage, plain-text URL.
pub struct CatboxBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl CatboxBackend {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(120))?,
            endpoint: "https://catbox.moe/user/api.php".to_string(),
        })
    }
}

#[async_trait]
impl UploadBackend for CatboxBackend {
    fn name(&self) -> &str {
        "catbox.moe"
    }

    async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", file_part(path).await?);
        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        let url = check_response(resp).await?.text().await?.trim().to_string();
        if !url.starts_with("http") {
            return Err(PipelineError::Upload(format!("catbox.moe returned invalid response: {}", url)));
        }
        Ok(url)
    }
}

/// HEAD request with redirects followed.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(10))?,
        })
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<u16, PipelineError> {
        let resp = self.client.head(url).send().await?;
        Ok(resp.status().as_u16())
    }
}

/// Ordered fallback over upload backends.
pub struct UploadChain {
    backends: Vec<Arc<dyn UploadBackend>>,
    probe: Arc<dyn UrlProbe>,
}

impl UploadChain {
    pub fn new(backends: Vec<Arc<dyn UploadBackend>>, probe: Arc<dyn UrlProbe>) -> Self {
        Self { backends, probe }
    }

    /// 0x0.st, then tmpfiles.org, then catbox.moe.
    pub fn with_default_backends() -> Result<Self, PipelineError> {
        let chain = Self::new(
            vec![
                Arc::new(ZeroX0Backend::new()?),
                Arc::new(TmpfilesBackend::new()?),
                Arc::new(CatboxBackend::new()?),
            ],
            Arc::new(HttpProbe::new()?),
        );
        info!("[UPLOAD] Chain: {}", chain.backend_names().join(" -> "));
        Ok(chain)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Upload `path` and return the first URL that passes the probe.
    pub async fn upload(&self, path: &Path) -> Result<String, PipelineError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("[UPLOAD] 📤 Uploading {}...", file_name);

        let mut errors = Vec::new();
        for backend in &self.backends {
            let url = match backend.upload(path).await {
                Ok(url) => url,
                Err(e) => {
                    warn!("[UPLOAD] {} failed, trying next: {}", backend.name(), e);
                    errors.push(format!("{}: {}", backend.name(), e));
                    continue;
                }
            };

            match self.probe.probe(&url).await {
                Ok(200) => {
                    info!("[UPLOAD] ✅ {} verified via {}", url, backend.name());
                    return Ok(url);
                }
                Ok(status) => {
                    warn!("[UPLOAD] {} returned status {} on probe", url, status);
                    errors.push(format!("{}: probe returned status {}", backend.name(), status));
                }
                Err(e) => {
                    warn!("[UPLOAD] Probe of {} failed: {}", url, e);
                    errors.push(format!("{}: probe failed: {}", backend.name(), e));
                }
            }
        }

        Err(PipelineError::Upload(format!(
            "all services failed for {}: {}",
            file_name,
            errors.join("; ")
        )))
    }
}
