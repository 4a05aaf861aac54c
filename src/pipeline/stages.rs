//! 2段階パイプラインの各ステージ。
//!
//! ステージ内の処理はすべて直列で、いずれかの手順が失敗した時点でステージ全体を中断する。
//! 失敗後に成果物をアップロードすることはない。
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::schema::artifact::{self, ArtifactError};
use crate::storage::{CONTENT_TYPE_CSV, CONTENT_TYPE_JSON, ObjectStore, StorageError};

use super::aggregate::Aggregator;
use super::report::{self, RenderError};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to fetch {key}")]
    Fetch {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to decode {key}")]
    Decode {
        key: String,
        #[source]
        source: ArtifactError,
    },
    #[error("failed to encode {key}")]
    Encode {
        key: String,
        #[source]
        source: ArtifactError,
    },
    #[error("failed to render report")]
    Render(#[from] RenderError),
    #[error("failed to store {key}")]
    Store {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl StageError {
    /// ストレージ操作（取得・保存）の失敗かどうか。
    #[must_use]
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Store { .. })
    }

    /// 入出力アーティファクトのシリアライズ失敗かどうか。
    #[must_use]
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Encode { .. })
    }
}

/// ステージが読み書きするオブジェクトの位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLocations {
    pub bucket: String,
    pub asset_info_key: String,
    pub intermediate_key: String,
    pub report_key: String,
}

/// process-and-send ステージの結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub assets: usize,
    pub aggregated: usize,
    pub failed_asset_ids: Vec<String>,
    pub intermediate_key: String,
}

/// generate-and-upload ステージの結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub rows: usize,
    pub bytes: usize,
    pub report_key: String,
}

/// アセット一覧を読み込み、ジャンル予測を集約して中間アーティファクトを保存する。
pub struct ProcessAndSendStage {
    store: Arc<dyn ObjectStore>,
    aggregator: Aggregator,
    locations: StageLocations,
}

impl ProcessAndSendStage {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        aggregator: Aggregator,
        locations: StageLocations,
    ) -> Self {
        Self {
            store,
            aggregator,
            locations,
        }
    }

    /// ステージを実行する。
    ///
    /// 個々の予測失敗は集約結果から除外されるだけで、ステージの失敗にはならない。
    ///
    /// # Errors
    /// 取得・デコード・エンコード・保存のいずれかが失敗した場合は [`StageError`] を返す。
    pub async fn run(&self) -> Result<ProcessSummary, StageError> {
        let StageLocations {
            bucket,
            asset_info_key,
            intermediate_key,
            ..
        } = &self.locations;

        let body = self
            .store
            .get(bucket, asset_info_key)
            .await
            .map_err(|source| {
                error!(key = %asset_info_key, error = %source, "error retrieving asset info");
                StageError::Fetch {
                    key: asset_info_key.clone(),
                    source,
                }
            })?;

        let assets = artifact::decode_assets(&body).map_err(|source| {
            error!(key = %asset_info_key, error = %source, "error parsing asset info");
            StageError::Decode {
                key: asset_info_key.clone(),
                source,
            }
        })?;
        let asset_count = assets.len();

        let outcome = self.aggregator.aggregate(assets).await;

        let payload = artifact::encode_records(&outcome.records).map_err(|source| {
            error!(error = %source, "error serializing aggregated data");
            StageError::Encode {
                key: intermediate_key.clone(),
                source,
            }
        })?;

        self.store
            .put(bucket, intermediate_key, payload, CONTENT_TYPE_JSON)
            .await
            .map_err(|source| {
                error!(key = %intermediate_key, error = %source, "error uploading aggregated data");
                StageError::Store {
                    key: intermediate_key.clone(),
                    source,
                }
            })?;

        let summary = ProcessSummary {
            assets: asset_count,
            aggregated: outcome.records.len(),
            failed_asset_ids: outcome.failed_asset_ids(),
            intermediate_key: intermediate_key.clone(),
        };

        info!(
            bucket = %bucket,
            key = %summary.intermediate_key,
            assets = summary.assets,
            aggregated = summary.aggregated,
            failed = summary.failed_asset_ids.len(),
            "processed assets and stored aggregated data"
        );

        Ok(summary)
    }
}

/// 中間アーティファクトからCSVレポートを生成し、保存する。
pub struct GenerateAndUploadStage {
    store: Arc<dyn ObjectStore>,
    locations: StageLocations,
}

impl GenerateAndUploadStage {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, locations: StageLocations) -> Self {
        Self { store, locations }
    }

    /// ステージを実行する。
    ///
    /// # Errors
    /// 取得・スキーマ検証・描画・保存のいずれかが失敗した場合は [`StageError`] を返す。
    pub async fn run(&self) -> Result<ReportSummary, StageError> {
        let StageLocations {
            bucket,
            intermediate_key,
            report_key,
            ..
        } = &self.locations;

        let body = self
            .store
            .get(bucket, intermediate_key)
            .await
            .map_err(|source| {
                error!(key = %intermediate_key, error = %source, "error retrieving aggregated data");
                StageError::Fetch {
                    key: intermediate_key.clone(),
                    source,
                }
            })?;

        let records = artifact::decode_records(&body).map_err(|source| {
            error!(key = %intermediate_key, error = %source, "error parsing aggregated data");
            StageError::Decode {
                key: intermediate_key.clone(),
                source,
            }
        })?;

        let csv = report::render(&records).inspect_err(|source| {
            error!(error = %source, "error writing CSV report");
        })?;
        let bytes = csv.len();

        self.store
            .put(bucket, report_key, csv, CONTENT_TYPE_CSV)
            .await
            .map_err(|source| {
                error!(key = %report_key, error = %source, "error uploading CSV to storage");
                StageError::Store {
                    key: report_key.clone(),
                    source,
                }
            })?;

        let summary = ReportSummary {
            rows: records.len(),
            bytes,
            report_key: report_key.clone(),
        };

        info!(
            bucket = %bucket,
            key = %summary.report_key,
            rows = summary.rows,
            bytes = summary.bytes,
            "recommendations CSV generated and uploaded"
        );

        Ok(summary)
    }
}
