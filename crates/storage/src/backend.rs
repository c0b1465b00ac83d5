use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::info;

use ruler_core::config::{StoreBackendKind, StoreConfig};

use crate::error::StorageError;

/// Object store holding rule groups and alert configs.
pub enum StorageBackend {
    Memory(Arc<InMemory>),
    Local(LocalBackend),
    S3(S3Backend),
}

impl StorageBackend {
    pub fn from_config(cfg: &StoreConfig) -> Result<Self, StorageError> {
        match cfg.backend {
            StoreBackendKind::Memory => {
                info!("Storage: in-memory backend (contents are lost on restart)");
                Ok(StorageBackend::Memory(Arc::new(InMemory::new())))
            }
            StoreBackendKind::Local => {
                std::fs::create_dir_all(&cfg.data_dir).map_err(|e| {
                    StorageError::Other(format!(
                        "create data dir {}: {e}",
                        cfg.data_dir.display()
                    ))
                })?;
                Ok(StorageBackend::Local(LocalBackend::new(&cfg.data_dir)?))
            }
            StoreBackendKind::S3 => Ok(StorageBackend::S3(S3Backend::new(cfg)?)),
        }
    }

    /// Get an Arc-wrapped ObjectStore.
    pub fn store_arc(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::Memory(s) => s.clone(),
            StorageBackend::Local(b) => b.store.clone(),
            StorageBackend::S3(b) => b.store.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Key prefix all objects live under (empty unless S3 has one configured).
    pub fn prefix(&self) -> &str {
        match self {
            StorageBackend::Memory(_) | StorageBackend::Local(_) => "",
            StorageBackend::S3(b) => &b.prefix,
        }
    }

    /// Root path for store keys, derived from [`prefix`](Self::prefix).
    pub fn root(&self) -> Path {
        Path::from(self.prefix())
    }
}

/// Local filesystem backend.
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub data_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(data_dir: &std::path::Path) -> Result<Self, StorageError> {
        let canonical = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            data_dir: canonical,
        })
    }
}

/// S3 backend.
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub prefix: String,
}

impl S3Backend {
    pub fn new(cfg: &StoreConfig) -> Result<Self, StorageError> {
        let bucket = cfg
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("RULER_S3_BUCKET not set".into()))?;

        let mut builder = AmazonS3Builder::new().with_region(&cfg.region);

        if let Some(ref key) = cfg.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = cfg.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = cfg.session_token {
            builder = builder.with_token(token);
        }

        match cfg.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                // object_store requires an absolute endpoint URL
                let endpoint_url =
                    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                        endpoint.to_string()
                    } else {
                        format!("https://{endpoint}")
                    };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_allow_http(endpoint_url.starts_with("http://"))
                    .with_endpoint(endpoint_url);
            }
            None => {
                builder = builder.with_url(format!("s3://{bucket}"));
            }
        }

        let store = builder.build()?;

        let prefix = cfg
            .s3_prefix
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();

        info!(
            "Storage: S3 backend s3://{}/{} (region: {})",
            bucket, prefix, cfg.region
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(backend: StoreBackendKind, data_dir: PathBuf) -> StoreConfig {
        StoreConfig {
            backend,
            data_dir,
            region: "us-east-1".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            s3_bucket: None,
            s3_prefix: None,
            endpoint_url: None,
        }
    }

    #[test]
    fn local_backend_creates_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("rules-data");
        let backend = StorageBackend::from_config(&cfg(StoreBackendKind::Local, dir.clone())).unwrap();
        assert!(!backend.is_remote());
        assert!(dir.exists());
        assert_eq!(backend.prefix(), "");
    }

    #[test]
    fn s3_without_bucket_is_not_configured() {
        let err = StorageBackend::from_config(&cfg(StoreBackendKind::S3, PathBuf::from("data")))
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::NotConfigured(_)));
    }
}
