use std::{
    env,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;

use crate::pipeline::StageLocations;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// カレントディレクトリ（または祖先ディレクトリ）の `.env` をプロセス環境変数に読み込む。
///
/// 既に設定されている変数は上書きしない。tracing の初期化より前に呼ぶこと。
/// 読み込んだファイルのパスを返す。
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// 指定した `.env` ファイルをプロセス環境変数に読み込む。
///
/// # Errors
/// ファイルが読めない場合や書式が不正な場合は [`dotenvy::Error`] を返す。
pub fn load_dotenv_from(path: &Path) -> Result<(), dotenvy::Error> {
    dotenvy::from_path(path)
}

/// レポートファイル名。`RECOMMENDATIONS_KEY` の後ろに連結される。
pub const REPORT_FILE_NAME: &str = "recommendations.csv";

/// オブジェクトストアのバックエンド種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Filesystem,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "filesystem" | "fs" | "local" => Ok(Self::Filesystem),
            other => Err(anyhow::anyhow!(
                "unknown storage backend: {other} (expected s3 or filesystem)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    aws_region: String,
    s3_bucket: String,
    asset_info_key: String,
    intermediate_key: String,
    recommendations_key: String,
    ds_service_url: String,
    ds_connect_timeout: Duration,
    ds_total_timeout: Duration,
    prediction_concurrency: NonZeroUsize,
    storage_backend: StorageBackend,
    s3_endpoint_url: String,
    s3_timeout: Duration,
    storage_root: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数からパイプラインの設定値を読み込み、検証する。
    ///
    /// `.env` の読み込みは [`load_dotenv`] で事前に済ませておくこと。
    ///
    /// # Errors
    /// 数値のパースに失敗した場合や、値が空の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let aws_region = env_or("AWS_REGION", "us-east-1")?;
        let s3_bucket = env_or("S3_BUCKET", "genre-recommendations")?;
        let asset_info_key = env_or("ASSET_INFO_KEY", "assets/asset_info.json")?;
        let intermediate_key = env_or("INTERMEDIATE_KEY", "aggregated_data.json")?;
        let recommendations_key =
            env::var("RECOMMENDATIONS_KEY").unwrap_or_else(|_| "recommendations/".to_string());

        // 予測サービス
        let ds_service_url = env_or("DS_SERVICE_URL", "http://localhost:8080/predict")?;
        let ds_connect_timeout = parse_duration_ms("DS_CONNECT_TIMEOUT_MS", 3000)?;
        let ds_total_timeout = parse_duration_ms("DS_TOTAL_TIMEOUT_MS", 30000)?;
        let prediction_concurrency = parse_non_zero_usize("PREDICTION_CONCURRENCY", 1)?;

        // オブジェクトストレージ
        let storage_backend = parse_from_str("STORAGE_BACKEND", StorageBackend::S3)?;
        let s3_endpoint_url = env_or("S3_ENDPOINT_URL", "http://localhost:4566")?;
        let s3_timeout = parse_duration_ms("S3_TIMEOUT_MS", 30000)?;
        let storage_root = PathBuf::from(env_or("STORAGE_ROOT", "./data")?);

        Ok(Self {
            aws_region,
            s3_bucket,
            asset_info_key,
            intermediate_key,
            recommendations_key,
            ds_service_url,
            ds_connect_timeout,
            ds_total_timeout,
            prediction_concurrency,
            storage_backend,
            s3_endpoint_url,
            s3_timeout,
            storage_root,
        })
    }

    #[must_use]
    pub fn aws_region(&self) -> &str {
        &self.aws_region
    }

    #[must_use]
    pub fn s3_bucket(&self) -> &str {
        &self.s3_bucket
    }

    #[must_use]
    pub fn asset_info_key(&self) -> &str {
        &self.asset_info_key
    }

    #[must_use]
    pub fn intermediate_key(&self) -> &str {
        &self.intermediate_key
    }

    #[must_use]
    pub fn recommendations_key(&self) -> &str {
        &self.recommendations_key
    }

    /// 最終レポートのキー（プレフィックス + ファイル名）。
    ///
    /// プレフィックスが空の場合、レポートはバケット直下に置かれる。
    #[must_use]
    pub fn report_key(&self) -> String {
        format!("{}{REPORT_FILE_NAME}", self.recommendations_key)
    }

    #[must_use]
    pub fn ds_service_url(&self) -> &str {
        &self.ds_service_url
    }

    #[must_use]
    pub fn ds_connect_timeout(&self) -> Duration {
        self.ds_connect_timeout
    }

    #[must_use]
    pub fn ds_total_timeout(&self) -> Duration {
        self.ds_total_timeout
    }

    #[must_use]
    pub fn prediction_concurrency(&self) -> NonZeroUsize {
        self.prediction_concurrency
    }

    #[must_use]
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage_backend
    }

    #[must_use]
    pub fn s3_endpoint_url(&self) -> &str {
        &self.s3_endpoint_url
    }

    #[must_use]
    pub fn s3_timeout(&self) -> Duration {
        self.s3_timeout
    }

    #[must_use]
    pub fn storage_root(&self) -> &std::path::Path {
        &self.storage_root
    }

    #[must_use]
    pub fn stage_locations(&self) -> StageLocations {
        StageLocations {
            bucket: self.s3_bucket.clone(),
            asset_info_key: self.asset_info_key.clone(),
            intermediate_key: self.intermediate_key.clone(),
            report_key: self.report_key(),
        }
    }
}

fn env_or(name: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(value)
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("value must be greater than zero"),
    })
}

fn parse_duration_ms(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })
}

fn parse_from_str<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = anyhow::Error>,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|source| ConfigError::Invalid { name, source }),
        Err(_) => Ok(default),
    }
}
