use async_trait::async_trait;
use reqwest::Client;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// Object storage for rendered invoices.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Upload `bytes` at `path` (relative to the bucket) and return its public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Supabase Storage via its REST API, authenticated with the service role key.
pub struct SupabaseStorage {
    config: StorageConfig,
    http_client: Client,
}

impl SupabaseStorage {
    pub fn new(config: StorageConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.config.bucket, path
        )
    }
}

#[async_trait]
impl InvoiceStore for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url, self.config.bucket, path
        );

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.service_role_key)
            .header("apikey", &self.config.service_role_key)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Storage upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Storage upload returned {}: {}",
                status, body
            )));
        }

        Ok(self.public_url(path))
    }
}
