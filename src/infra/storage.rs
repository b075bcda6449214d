use anyhow::{anyhow, Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use url::Url;
use uuid::Uuid;

use crate::config::{AppConfig, ObjectStoreConfig, StorageBackendKind};

/// Result of placing a blob: the key it landed under and, for backends
/// whose objects are directly fetchable, the public URL.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub public_url: Option<String>,
}

/// Blob storage capability. Both variants speak the same contract:
/// `put` refuses to clobber an existing key unless asked, `remove` treats
/// a missing key as success, and `get` reads bytes back for inline
/// serving.
#[derive(Clone)]
pub enum MediaStore {
    Local(LocalStore),
    Object(ObjectStore),
}

impl MediaStore {
    pub fn from_config(config: &AppConfig) -> Self {
        match config.storage_backend {
            StorageBackendKind::Local => {
                MediaStore::Local(LocalStore::new(config.uploads_dir.clone()))
            }
            StorageBackendKind::Object => {
                MediaStore::Object(ObjectStore::new(config.object_store.clone()))
            }
        }
    }

    pub async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<StoredObject> {
        ensure_key_safe(key)?;
        match self {
            MediaStore::Local(store) => store.put(key, bytes, upsert).await,
            MediaStore::Object(store) => store.put(key, bytes, content_type, upsert).await,
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        ensure_key_safe(key)?;
        match self {
            MediaStore::Local(store) => store.remove(key).await,
            MediaStore::Object(store) => store.remove(key).await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        ensure_key_safe(key)?;
        match self {
            MediaStore::Local(store) => store.get(key).await,
            MediaStore::Object(store) => store.get(key).await,
        }
    }
}

/// Rejects keys that could escape the storage root. Keys are produced by
/// the media service (`{section}/{uuid}.{ext}`), so anything else here is
/// a programming error or a tampered database row.
fn ensure_key_safe(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains("..") {
        return Err(anyhow!("invalid storage key: {}", key));
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(anyhow!("invalid storage key: {}", key));
    }
    Ok(())
}

/// Filesystem-backed store. Blobs land under `{root}/{section}/{filename}`
/// and are served by the static `/uploads` route, so no URL is stored.
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn put(&self, key: &str, bytes: Bytes, upsert: bool) -> Result<StoredObject> {
        let path = self.blob_path(key);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("storage key {} has no parent directory", key))?;
        fs::create_dir_all(parent).await?;

        if !upsert && fs::try_exists(&path).await? {
            return Err(anyhow!("storage key {} already exists", key));
        }

        // Write to a temp file and rename so a crash mid-write never
        // leaves a half-written blob at the final path.
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        drop(file);
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        Ok(StoredObject {
            key: key.to_string(),
            public_url: None,
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// S3-compatible object store. The SDK client is built once, on first
/// use, so missing provider configuration fails the first storage call
/// rather than process start.
#[derive(Clone)]
pub struct ObjectStore {
    config: ObjectStoreConfig,
    client: Arc<OnceCell<Client>>,
}

impl ObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            config,
            client: Arc::new(OnceCell::new()),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let endpoint = self.config.endpoint.clone().ok_or_else(|| {
                    anyhow!("object storage backend requested but STORAGE_ENDPOINT is not set")
                })?;

                let region_provider =
                    RegionProviderChain::first_try(Region::new(self.config.region.clone()));
                let shared_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(region_provider)
                    .load()
                    .await;

                let mut builder = aws_sdk_s3::config::Builder::from(&shared_config)
                    .region(shared_config.region().cloned())
                    .endpoint_url(endpoint)
                    .force_path_style(true);
                if let Some(provider) = shared_config.credentials_provider() {
                    builder = builder.credentials_provider(provider);
                }

                Ok(Client::from_conf(builder.build()))
            })
            .await
    }

    fn bucket(&self) -> Result<&str> {
        self.config.bucket.as_deref().ok_or_else(|| {
            anyhow!("object storage backend requested but STORAGE_BUCKET is not set")
        })
    }

    /// Public URL for a stored key: `{public endpoint}/{bucket}/{key}`.
    pub fn public_url(&self, key: &str) -> Result<String> {
        let base = self
            .config
            .public_endpoint
            .as_deref()
            .or(self.config.endpoint.as_deref())
            .ok_or_else(|| anyhow!("no public endpoint configured for object storage"))?;
        let bucket = self.bucket()?;

        let mut url = Url::parse(base)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid storage endpoint: {}", base))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url.to_string())
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<StoredObject> {
        let client = self.client().await?;
        let bucket = self.bucket()?;

        if !upsert {
            match client.head_object().bucket(bucket).key(key).send().await {
                Ok(_) => return Err(anyhow!("storage key {} already exists", key)),
                Err(err) => {
                    let service_err = err.into_service_error();
                    if !service_err.is_not_found() {
                        return Err(anyhow!("failed to check key {}: {}", key, service_err));
                    }
                }
            }
        }

        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to store key {}", key))?;

        Ok(StoredObject {
            key: key.to_string(),
            public_url: Some(self.public_url(key)?),
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let client = self.client().await?;
        let bucket = self.bucket()?;

        // S3 DeleteObject succeeds for absent keys, which gives us the
        // idempotency the delete path relies on.
        client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to remove key {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let client = self.client().await?;
        let bucket = self.bucket()?;

        match client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .with_context(|| format!("failed to read key {}", key))?;
                Ok(Some(data.into_bytes()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(anyhow!("failed to fetch key {}: {}", key, service_err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (LocalStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("atelier-store-{}", Uuid::new_v4()));
        (LocalStore::new(root.clone()), root)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (store, root) = temp_store();
        let body = Bytes::from_static(b"fake png bytes");

        store
            .put("sports/a.png", body.clone(), false)
            .await
            .unwrap();
        let read = store.get("sports/a.png").await.unwrap();
        assert_eq!(read, Some(body));

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn put_refuses_to_clobber_without_upsert() {
        let (store, root) = temp_store();

        store
            .put("news/b.png", Bytes::from_static(b"one"), false)
            .await
            .unwrap();
        let second = store
            .put("news/b.png", Bytes::from_static(b"two"), false)
            .await;
        assert!(second.is_err());

        store
            .put("news/b.png", Bytes::from_static(b"two"), true)
            .await
            .unwrap();
        assert_eq!(
            store.get("news/b.png").await.unwrap(),
            Some(Bytes::from_static(b"two"))
        );

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, root) = temp_store();

        store
            .put("awards/c.mp4", Bytes::from_static(b"vid"), false)
            .await
            .unwrap();
        store.remove("awards/c.mp4").await.unwrap();
        store.remove("awards/c.mp4").await.unwrap();
        assert_eq!(store.get("awards/c.mp4").await.unwrap(), None);

        let _ = fs::remove_dir_all(&root).await;
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(ensure_key_safe("sports/ok.png").is_ok());
        assert!(ensure_key_safe("../etc/passwd").is_err());
        assert!(ensure_key_safe("/absolute").is_err());
        assert!(ensure_key_safe("").is_err());
    }
}
