//! S3互換REST API（パススタイル）を使うオブジェクトストア。
//!
//! LocalStack等のエンドポイントを想定し、リクエストは署名しません。
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, header::CONTENT_TYPE};
use tracing::debug;

use super::{ObjectStore, StorageError, validate_location};

/// S3互換ストアの設定。
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    pub endpoint_url: String,
    pub region: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    endpoint: Url,
    region: String,
}

impl S3ObjectStore {
    /// 新しいS3互換ストアクライアントを作成する。
    ///
    /// # Errors
    /// エンドポイントURLが不正な場合やHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: S3StoreConfig) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.endpoint_url).context("invalid S3 endpoint URL")?;
        if endpoint.cannot_be_a_base() {
            bail!("S3 endpoint URL must be hierarchical: {endpoint}");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build S3 HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            region: config.region,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StorageError> {
        validate_location(bucket, key)?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidLocation {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "endpoint cannot carry a path",
            })?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    fn transport_error(bucket: &str, key: &str, source: reqwest::Error) -> StorageError {
        StorageError::Transport {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        }
    }

    async fn backend_error(
        bucket: &str,
        key: &str,
        status: StatusCode,
        response: reqwest::Response,
    ) -> StorageError {
        StorageError::Backend {
            bucket: bucket.to_string(),
            key: key.to_string(),
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, region = %self.region, "fetching object");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error(bucket, key, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Self::backend_error(bucket, key, status, response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(bucket, key, e))?;
        Ok(body.to_vec())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, bytes = body.len(), content_type, "storing object");

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(bucket, key, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::backend_error(bucket, key, status, response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(endpoint_url: String) -> S3ObjectStore {
        S3ObjectStore::new(S3StoreConfig {
            endpoint_url,
            region: "us-east-1".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("store should build")
    }

    #[test]
    fn object_url_uses_path_style_addressing() {
        let store = store_for("http://localhost:4566".to_string());
        let url = store
            .object_url("genre-recommendations", "assets/asset info.json")
            .expect("url");

        assert_eq!(
            url.as_str(),
            "http://localhost:4566/genre-recommendations/assets/asset%20info.json"
        );
    }

    #[test]
    fn object_url_keeps_endpoint_prefix() {
        let store = store_for("http://minio.local:9000/s3/".to_string());
        let url = store.object_url("bucket", "k.json").expect("url");

        assert_eq!(url.as_str(), "http://minio.local:9000/s3/bucket/k.json");
    }

    #[tokio::test]
    async fn get_returns_object_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genre-recommendations/aggregated_data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let body = store_for(server.uri())
            .get("genre-recommendations", "aggregated_data.json")
            .await
            .expect("get succeeds");

        assert_eq!(body, b"[]");
    }

    #[tokio::test]
    async fn get_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<Error>NoSuchKey</Error>"))
            .mount(&server)
            .await;

        let error = store_for(server.uri())
            .get("genre-recommendations", "missing.json")
            .await
            .expect_err("missing object");

        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn get_maps_other_statuses_to_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
            .mount(&server)
            .await;

        let error = store_for(server.uri())
            .get("genre-recommendations", "assets/asset_info.json")
            .await
            .expect_err("forbidden");

        match error {
            StorageError::Backend { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "AccessDenied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn put_sends_body_with_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/genre-recommendations/recommendations/recommendations.csv"))
            .and(header("content-type", "text/csv"))
            .and(body_bytes(b"ID,Title,Genres\n".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store_for(server.uri())
            .put(
                "genre-recommendations",
                "recommendations/recommendations.csv",
                b"ID,Title,Genres\n".to_vec(),
                "text/csv",
            )
            .await
            .expect("put succeeds");
    }

    #[tokio::test]
    async fn put_surfaces_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500).set_body_string("InternalError"))
            .mount(&server)
            .await;

        let error = store_for(server.uri())
            .put("genre-recommendations", "aggregated_data.json", b"[]".to_vec(), "application/json")
            .await
            .expect_err("put must fail");

        assert!(matches!(error, StorageError::Backend { status: 500, .. }));
    }
}
