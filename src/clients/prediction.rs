//! ジャンル予測サービス（DS service）クライアント。
//!
//! 1資産につき1リクエストを送信し、バッチ・キャッシュ・再試行は行いません。
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{AssetRecord, GenreList, null_as_empty};

/// 予測サービスへのリクエスト。
#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    id: &'a str,
    title: &'a str,
}

/// 予測サービスのレスポンス。
#[derive(Debug, Deserialize)]
struct GenrePrediction {
    #[serde(deserialize_with = "null_as_empty")]
    genres: GenreList,
}

/// 予測呼び出しの失敗。部分的な結果は存在しない。
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("asset id must not be empty")]
    InvalidAsset,
    #[error("prediction request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("prediction service returned status {status}: {body}")]
    Service { status: StatusCode, body: String },
    #[error("failed to decode prediction response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// 1資産のジャンルを予測する。
#[async_trait]
pub trait GenrePredictor: Send + Sync {
    async fn predict(&self, asset: &AssetRecord) -> Result<GenreList, PredictionError>;
}

/// 予測クライアントの設定。
#[derive(Debug, Clone)]
pub struct PredictionClientConfig {
    pub service_url: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

/// HTTP経由で予測サービスと通信するクライアント。
#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: Client,
    service_url: Url,
}

impl PredictionClient {
    /// 新しい予測クライアントを作成する。
    ///
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: PredictionClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build prediction service HTTP client")?;

        let service_url =
            Url::parse(&config.service_url).context("invalid prediction service URL")?;

        Ok(Self {
            client,
            service_url,
        })
    }
}

#[async_trait]
impl GenrePredictor for PredictionClient {
    async fn predict(&self, asset: &AssetRecord) -> Result<GenreList, PredictionError> {
        if asset.id.is_empty() {
            return Err(PredictionError::InvalidAsset);
        }

        let request_body = PredictionRequest {
            id: &asset.id,
            title: &asset.title,
        };

        let response = self
            .client
            .post(self.service_url.clone())
            .json(&request_body)
            .send()
            .await
            .map_err(PredictionError::Transport)?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                asset_id = %asset.id,
                status = status.as_u16(),
                body = %body,
                "prediction service returned error status"
            );
            return Err(PredictionError::Service { status, body });
        }

        let body = response.bytes().await.map_err(PredictionError::Transport)?;
        let prediction: GenrePrediction =
            serde_json::from_slice(&body).map_err(PredictionError::Decode)?;

        debug!(
            asset_id = %asset.id,
            genre_count = prediction.genres.len(),
            "received genre prediction"
        );

        Ok(prediction.genres)
    }
}
