//! `BlobStore` over the Supabase Storage REST API.
//!
//! Env: SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY, STORAGE_TIMEOUT_SECS (default 30).
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{BlobStore, ObjectInfo};
use crate::error::{OpsError, OpsResult};
use crate::util::env as envutil;

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    id: Option<String>,
    updated_at: Option<String>,
    metadata: Option<ListMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListMetadata {
    size: Option<u64>,
    mimetype: Option<String>,
}

pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> OpsResult<Self> {
        let base = url::Url::parse(base_url)
            .map_err(|e| OpsError::Validation(format!("invalid SUPABASE_URL: {e}")))?;
        if service_key.trim().is_empty() {
            return Err(OpsError::Validation("empty storage service key".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpsError::transport("build http client", e))?;
        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    /// Build from SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY.
    pub fn from_env() -> anyhow::Result<Self> {
        let base = envutil::env_req("SUPABASE_URL")?;
        let key = envutil::env_req("SUPABASE_SERVICE_ROLE_KEY")?;
        let timeout = Duration::from_secs(envutil::env_parse("STORAGE_TIMEOUT_SECS", 30u64));
        Ok(Self::new(&base, &key, timeout)?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn object_path(bucket: &str, name: &str) -> String {
        let encoded: Vec<String> = name
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!("{}/{}", urlencoding::encode(bucket), encoded.join("/"))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }
}

async fn error_for(op: String, resp: reqwest::Response) -> OpsError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body = body.chars().take(300).collect::<String>();
    if status == StatusCode::NOT_FOUND {
        OpsError::not_found("storage object", format!("{op}: {body}"))
    } else {
        OpsError::transport(op, format!("status {status}: {body}"))
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn list_objects(&self, bucket: &str, limit: usize) -> OpsResult<Vec<ObjectInfo>> {
        let url = self.endpoint(&format!("object/list/{}", urlencoding::encode(bucket)));
        let body = json!({
            "prefix": "",
            "limit": limit,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });
        let resp = self.authed(self.client.post(&url)).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(error_for(format!("list bucket {bucket}"), resp).await);
        }
        let entries: Vec<ListEntry> = resp.json().await?;
        debug!(bucket, entries = entries.len(), "listed bucket");
        Ok(entries
            .into_iter()
            .map(|e| {
                let (size, content_type) = match e.metadata {
                    Some(m) => (m.size, m.mimetype),
                    None => (None, None),
                };
                ObjectInfo {
                    name: e.name,
                    id: e.id,
                    size,
                    content_type,
                    updated_at: e.updated_at,
                }
            })
            .collect())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        overwrite: bool,
    ) -> OpsResult<()> {
        let url = self.endpoint(&format!("object/{}", Self::object_path(bucket, name)));
        let resp = self
            .authed(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_for(format!("upload {bucket}/{name}"), resp).await);
        }
        Ok(())
    }

    async fn resolve_public_locator(&self, bucket: &str, name: &str) -> OpsResult<String> {
        Ok(self.endpoint(&format!("object/public/{}", Self::object_path(bucket, name))))
    }

    async fn bucket_exists(&self, name: &str) -> OpsResult<bool> {
        let url = self.endpoint(&format!("bucket/{}", urlencoding::encode(name)));
        let resp = self.authed(self.client.get(&url)).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        // Storage answers a missing bucket with 400 or 404 depending on version.
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND || body.to_ascii_lowercase().contains("not found") {
                return Ok(false);
            }
            return Err(OpsError::transport(
                format!("bucket_exists {name}"),
                format!("status {status}: {body}"),
            ));
        }
        Err(error_for(format!("bucket_exists {name}"), resp).await)
    }

    async fn create_bucket(&self, name: &str, public: bool) -> OpsResult<()> {
        let url = self.endpoint("bucket");
        let resp = self
            .authed(self.client.post(&url))
            .json(&json!({ "id": name, "name": name, "public": public }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_for(format!("create bucket {name}"), resp).await);
        }
        Ok(())
    }
}
