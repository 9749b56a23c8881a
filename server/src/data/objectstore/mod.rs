//! S3-compatible object store access
//!
//! Telemetry files land in a bucket under per-signal prefixes; the loader
//! lists and fetches them from here. Works against AWS S3 and S3-compatible
//! services like MinIO (custom endpoint + path-style addressing).

pub mod error;

pub use error::ObjectStoreError;

use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use serde::Deserialize;

use crate::core::config::S3Config;
use crate::core::constants::{S3_DEFAULT_REGION, SERVICE_INVENTORY_KEY};

/// Side-channel service inventory written next to the telemetry prefixes
#[derive(Debug, Deserialize)]
struct ServiceInventory {
    #[serde(default)]
    services: Vec<String>,
}

/// Object store client scoped to the telemetry bucket
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Create a client with static credentials against the configured
    /// endpoint
    pub async fn new(config: &S3Config) -> Self {
        let credentials = aws_credential_types::Credentials::from_keys(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(S3_DEFAULT_REGION))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        tracing::debug!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    /// List all `.json` object keys under the given prefix.
    /// Other objects are ignored.
    pub async fn list_json_objects(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                ObjectStoreError::Backend(format!("S3 list_objects_v2 error: {}", e))
            })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|key| key.ends_with(".json"))
                    .map(|key| key.to_string()),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Fetch an object and decode it as UTF-8
    pub async fn get_object_utf8(&self, key: &str) -> Result<String, ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    ObjectStoreError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::Backend(format!("S3 get_object error: {}", service_err))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("S3 body read error: {}", e)))?
            .into_bytes();

        String::from_utf8(data.to_vec()).map_err(|e| ObjectStoreError::Decode {
            key: key.to_string(),
            error: e.to_string(),
        })
    }

    /// Read the service inventory from `metadata.json` in the bucket root.
    /// Used when the warehouse is not directly queryable.
    pub async fn service_inventory(&self) -> Result<Vec<String>, ObjectStoreError> {
        let raw = self.get_object_utf8(SERVICE_INVENTORY_KEY).await?;
        let inventory: ServiceInventory =
            serde_json::from_str(&raw).map_err(|e| ObjectStoreError::Decode {
                key: SERVICE_INVENTORY_KEY.to_string(),
                error: e.to_string(),
            })?;
        Ok(inventory.services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_inventory_parses() {
        let raw = r#"{"services": ["auth-service", "checkout"], "generated_at": "2024-01-01"}"#;
        let inventory: ServiceInventory = serde_json::from_str(raw).unwrap();
        assert_eq!(inventory.services, vec!["auth-service", "checkout"]);
    }

    #[test]
    fn test_service_inventory_missing_field_defaults_empty() {
        let inventory: ServiceInventory = serde_json::from_str("{}").unwrap();
        assert!(inventory.services.is_empty());
    }
}
