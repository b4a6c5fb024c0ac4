//! S3 object store.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use aws_config::{BehaviorVersion, Region};
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use common::metrics::{CREDENTIAL_FALLBACK_TOTAL, STORE_CONNECT_TOTAL};
use configs::{AwsConfig, ConfigTree};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::errors::{StoreError, StoreKind, StoreResult};

const KIND: StoreKind = StoreKind::Object;

/// Upper bound on concurrent fetches issued by [`ObjectStore::read_all`].
pub const READ_ALL_WORKERS: usize = 10;

#[derive(Default)]
pub struct ObjectStore {
    client: ArcSwapOption<Client>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already configured client, e.g. one pointed at a local S3 emulator.
    pub fn with_client(client: Client) -> Self {
        let store = Self::default();
        store.client.store(Some(Arc::new(client)));
        store
    }

    pub fn is_connected(&self) -> bool {
        self.client.load().is_some()
    }

    /// Build a client from the `aws` section.
    ///
    /// The named profile is tried first. If it cannot produce credentials the
    /// default provider chain is used instead; that fallback is logged and
    /// counted in `backbone_credential_fallback_total`.
    #[instrument(skip_all, fields(store = "object"))]
    pub async fn connect(&self, config: &ConfigTree) -> StoreResult<()> {
        let Some(aws) = config
            .section::<AwsConfig>("aws")
            .map_err(|e| StoreError::config(KIND, e))?
        else {
            debug!("no aws section, object store left unconnected");
            return Ok(());
        };

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
        let profile = ProfileFileCredentialsProvider::builder()
            .profile_name(&aws.profile)
            .build();
        match profile.provide_credentials().await {
            Ok(_) => {
                debug!(profile = %aws.profile, "using named credential profile");
                loader = loader.profile_name(&aws.profile);
            }
            Err(e) => {
                warn!(
                    profile = %aws.profile,
                    error = %DisplayErrorContext(&e),
                    "credential profile unavailable, falling back to default credential chain"
                );
                CREDENTIAL_FALLBACK_TOTAL.inc();
            }
        }
        if let Some(endpoint) = &aws.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(aws.endpoint.is_some())
            .build();
        self.client.store(Some(Arc::new(Client::from_conf(s3_config))));
        STORE_CONNECT_TOTAL.with_label_values(&[KIND.as_str()]).inc();
        info!(region = %aws.region, "object store connected");
        Ok(())
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let client = self.client()?;
        match client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::operation(KIND, DisplayErrorContext(&err)))
                }
            }
        }
    }

    pub async fn read(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let client = self.client()?;
        fetch(&client, bucket, key).await
    }

    pub async fn write(&self, bucket: &str, key: &str, contents: impl Into<Vec<u8>>) -> StoreResult<()> {
        let client = self.client()?;
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(contents.into()))
            .send()
            .await
            .map_err(|e| StoreError::operation(KIND, DisplayErrorContext(&e)))?;
        debug!(bucket, key, "object written");
        Ok(())
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let client = self.client()?;
        client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::operation(KIND, DisplayErrorContext(&e)))?;
        Ok(())
    }

    /// Every key under `prefix`, across all result pages.
    pub async fn walk(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let client = self.client()?;
        let mut pages = client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::operation(KIND, DisplayErrorContext(&e)))?;
            keys.extend(page.contents().iter().filter_map(|obj| obj.key().map(str::to_owned)));
        }
        Ok(keys)
    }

    /// Fetch every object under `prefix`, keyed by file stem.
    ///
    /// At most [`READ_ALL_WORKERS`] fetches are in flight. Keys that vanish or
    /// fail between listing and fetching are skipped.
    pub async fn read_all(&self, bucket: &str, prefix: &str) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let keys = self.walk(bucket, prefix).await?;
        let client = self.client()?;
        let fetched = gather(keys, READ_ALL_WORKERS, |key| {
            let client = Arc::clone(&client);
            let bucket = bucket.to_owned();
            async move {
                match fetch(&client, &bucket, &key).await {
                    Ok(body) => Some(body),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => {
                        warn!(%bucket, %key, error = %e, "skipping object in bulk read");
                        None
                    }
                }
            }
        })
        .await;
        Ok(index_by_stem(fetched))
    }

    /// Presigned GET URL valid for `ttl`. Any failure reads as "not found".
    pub async fn redirect_url(&self, bucket: &str, key: &str, ttl: Duration) -> StoreResult<String> {
        let not_found = || StoreError::NotFound(format!("{bucket}/{key}"));
        let client = self.client().map_err(|_| not_found())?;
        let presigning = PresigningConfig::expires_in(ttl).map_err(|e| {
            debug!(error = %e, "invalid presign ttl");
            not_found()
        })?;
        let request = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                debug!(error = %DisplayErrorContext(&e), "presign failed");
                not_found()
            })?;
        Ok(request.uri().to_string())
    }

    fn client(&self) -> StoreResult<Arc<Client>> {
        self.client.load_full().ok_or(StoreError::Unavailable(KIND))
    }
}

async fn fetch(client: &Client, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
    let output = match client.get_object().bucket(bucket).key(key).send().await {
        Ok(output) => output,
        Err(err) => {
            let err = err.into_service_error();
            if err.is_no_such_key() {
                debug!(bucket, key, "missing object");
                return Err(StoreError::NotFound(format!("{bucket}/{key}")));
            }
            return Err(StoreError::operation(KIND, DisplayErrorContext(&err)));
        }
    };
    let body = output
        .body
        .collect()
        .await
        .map_err(|e| StoreError::operation(KIND, e))?;
    Ok(body.into_bytes().to_vec())
}

/// Run `fetch` over `keys` with at most `workers` in flight, keeping hits.
async fn gather<F, Fut>(keys: Vec<String>, workers: usize, fetch: F) -> Vec<(String, Vec<u8>)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Option<Vec<u8>>>,
{
    stream::iter(keys)
        .map(|key| {
            let pending = fetch(key.clone());
            async move { pending.await.map(|body| (key, body)) }
        })
        .buffer_unordered(workers.max(1))
        .filter_map(|hit| async move { hit })
        .collect()
        .await
}

// Same stem under two prefixes: the lexicographically last key wins.
fn index_by_stem(mut entries: Vec<(String, Vec<u8>)>) -> BTreeMap<String, Vec<u8>> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out = BTreeMap::new();
    for (key, body) in entries {
        let stem = Path::new(&key)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        if out.insert(stem.clone(), body).is_some() {
            warn!(%stem, %key, "duplicate object stem in bulk read, later key wins");
        }
    }
    out
}
