use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    clients::{GenrePredictor, PredictionClient, PredictionClientConfig},
    config::{Config, StorageBackend},
    pipeline::{Aggregator, GenerateAndUploadStage, ProcessAndSendStage},
    storage::{FilesystemObjectStore, ObjectStore, S3ObjectStore, s3::S3StoreConfig},
};

/// 設定から組み立てたパイプラインの依存一式。
pub struct Components {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    predictor: Arc<dyn GenrePredictor>,
}

impl Components {
    /// 構成情報からオブジェクトストアと予測クライアントを初期化する。
    ///
    /// # Errors
    /// URLが不正な場合やHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let store = build_store(&config)?;
        let predictor: Arc<dyn GenrePredictor> =
            Arc::new(PredictionClient::new(PredictionClientConfig {
                service_url: config.ds_service_url().to_string(),
                connect_timeout: config.ds_connect_timeout(),
                total_timeout: config.ds_total_timeout(),
            })?);

        Ok(Self::from_parts(config, store, predictor))
    }

    /// 任意のストアと予測器から組み立てる。
    #[must_use]
    pub fn from_parts(
        config: Config,
        store: Arc<dyn ObjectStore>,
        predictor: Arc<dyn GenrePredictor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            predictor,
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn process_and_send(&self) -> ProcessAndSendStage {
        let aggregator = Aggregator::new(
            Arc::clone(&self.predictor),
            self.config.prediction_concurrency(),
        );
        ProcessAndSendStage::new(
            Arc::clone(&self.store),
            aggregator,
            self.config.stage_locations(),
        )
    }

    #[must_use]
    pub fn generate_and_upload(&self) -> GenerateAndUploadStage {
        GenerateAndUploadStage::new(Arc::clone(&self.store), self.config.stage_locations())
    }
}

fn build_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage_backend() {
        StorageBackend::S3 => {
            let store = S3ObjectStore::new(S3StoreConfig {
                endpoint_url: config.s3_endpoint_url().to_string(),
                region: config.aws_region().to_string(),
                timeout: config.s3_timeout(),
            })
            .context("failed to configure S3 object store")?;
            info!(
                endpoint = config.s3_endpoint_url(),
                region = config.aws_region(),
                bucket = config.s3_bucket(),
                "using S3-compatible object store"
            );
            Ok(Arc::new(store))
        }
        StorageBackend::Filesystem => {
            info!(
                root = %config.storage_root().display(),
                bucket = config.s3_bucket(),
                "using filesystem object store"
            );
            Ok(Arc::new(FilesystemObjectStore::new(config.storage_root())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;
    use crate::storage::MemoryObjectStore;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        // SAFETY: test code adjusts deterministic environment state while holding ENV_MUTEX.
        unsafe {
            for name in ["STORAGE_BACKEND", "STORAGE_ROOT", "DS_SERVICE_URL", "S3_ENDPOINT_URL"] {
                std::env::remove_var(name);
            }
            for (name, value) in vars {
                std::env::set_var(name, value);
            }
        }
        let config = Config::from_env().expect("config loads");
        // SAFETY: same as above.
        unsafe {
            for (name, _) in vars {
                std::env::remove_var(name);
            }
        }
        config
    }

    #[test]
    fn components_build_with_default_s3_backend() {
        let components = Components::build(config_with(&[])).expect("components build");

        assert_eq!(components.config().storage_backend(), StorageBackend::S3);
        let _ = components.process_and_send();
        let _ = components.generate_and_upload();
    }

    #[test]
    fn components_build_with_filesystem_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_string_lossy().to_string();
        let components = Components::build(config_with(&[
            ("STORAGE_BACKEND", "filesystem"),
            ("STORAGE_ROOT", root.as_str()),
        ]))
        .expect("components build");

        assert_eq!(components.config().storage_root(), dir.path());
    }

    #[test]
    fn components_reject_invalid_prediction_url() {
        let result = Components::build(config_with(&[("DS_SERVICE_URL", "::not-a-url")]));

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn generate_stage_reads_from_injected_store() {
        let store = Arc::new(MemoryObjectStore::new());
        let config = config_with(&[]);
        store.insert(
            config.s3_bucket(),
            config.intermediate_key(),
            br#"[{"id":"1","title":"Movie A","genres":["Comedy"]}]"#.to_vec(),
            "application/json",
        );
        let predictor = Arc::new(
            PredictionClient::new(PredictionClientConfig {
                service_url: "http://127.0.0.1:9/predict".to_string(),
                connect_timeout: std::time::Duration::from_millis(100),
                total_timeout: std::time::Duration::from_millis(100),
            })
            .expect("client"),
        );
        let components = Components::from_parts(config.clone(), store.clone(), predictor);

        let summary = components
            .generate_and_upload()
            .run()
            .await
            .expect("stage succeeds");

        assert_eq!(summary.rows, 1);
        let report = store
            .object(config.s3_bucket(), &config.report_key())
            .expect("report stored");
        assert_eq!(report.body, b"ID,Title,Genres\n1,Movie A,Comedy\n");
        assert_eq!(report.content_type, "text/csv");
    }
}
