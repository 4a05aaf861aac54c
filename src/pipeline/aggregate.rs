//! 資産ごとの予測結果を集約し、失敗した資産をスキップする。
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::clients::{GenrePredictor, PredictionError};
use crate::domain::{AggregatedRecord, AssetRecord};

/// 予測に失敗した資産。
#[derive(Debug)]
pub struct PredictionFailure {
    pub asset_id: String,
    pub error: PredictionError,
}

/// 集約結果。成功したレコードと失敗した資産を分けて保持する。
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    pub records: Vec<AggregatedRecord>,
    pub failures: Vec<PredictionFailure>,
}

impl AggregationOutcome {
    /// 処理対象となった資産数。
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    /// すべての予測が成功したかどうか。
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn failed_asset_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.asset_id.clone()).collect()
    }
}

pub struct Aggregator {
    predictor: Arc<dyn GenrePredictor>,
    concurrency: NonZeroUsize,
}

impl Aggregator {
    #[must_use]
    pub fn new(predictor: Arc<dyn GenrePredictor>, concurrency: NonZeroUsize) -> Self {
        Self {
            predictor,
            concurrency,
        }
    }

    /// 1件ずつ順番に予測する集約器を作成する。
    #[must_use]
    pub fn sequential(predictor: Arc<dyn GenrePredictor>) -> Self {
        Self::new(predictor, NonZeroUsize::MIN)
    }

    /// 入力順に予測を行い、成功した資産だけを入力順のまま集約する。
    ///
    /// 個々の予測失敗でバッチ全体が失敗することはない。並行数が1より大きい場合も
    /// 結果は元の入力順で組み立てる。
    pub async fn aggregate(&self, assets: Vec<AssetRecord>) -> AggregationOutcome {
        let total = assets.len();
        info!(
            count = total,
            concurrency = self.concurrency.get(),
            "starting genre aggregation"
        );

        // buffered は完了順ではなく投入順で結果を返す
        let predictor = &self.predictor;
        let results: Vec<(AssetRecord, Result<_, PredictionError>)> = stream::iter(assets)
            .map(move |asset| async move {
                let result = predictor.predict(&asset).await;
                (asset, result)
            })
            .buffered(self.concurrency.get())
            .collect()
            .await;

        let mut outcome = AggregationOutcome::default();
        for (asset, result) in results {
            match result {
                Ok(genres) => {
                    debug!(asset_id = %asset.id, genres = ?genres, "aggregated asset");
                    outcome.records.push(AggregatedRecord::new(asset, genres));
                }
                Err(error) => {
                    warn!(
                        asset_id = %asset.id,
                        error = %error,
                        "skipping asset after prediction failure"
                    );
                    outcome.failures.push(PredictionFailure {
                        asset_id: asset.id,
                        error,
                    });
                }
            }
        }

        info!(
            total,
            aggregated = outcome.records.len(),
            failed = outcome.failures.len(),
            "completed genre aggregation"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use crate::domain::GenreList;

    /// 資産IDごとに応答を決める予測器。登録のないIDは失敗する。
    #[derive(Default)]
    struct ScriptedPredictor {
        responses: HashMap<String, GenreList>,
        delay_for: HashMap<String, Duration>,
    }

    impl ScriptedPredictor {
        fn succeed(mut self, id: &str, genres: &[&str]) -> Self {
            self.responses
                .insert(id.to_string(), genres.iter().map(ToString::to_string).collect());
            self
        }

        fn with_delay(mut self, id: &str, delay: Duration) -> Self {
            self.delay_for.insert(id.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl GenrePredictor for ScriptedPredictor {
        async fn predict(&self, asset: &AssetRecord) -> Result<GenreList, PredictionError> {
            if let Some(delay) = self.delay_for.get(&asset.id) {
                tokio::time::sleep(*delay).await;
            }
            match self.responses.get(&asset.id) {
                Some(genres) => Ok(genres.clone()),
                None => Err(PredictionError::Service {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn assets(ids: &[&str]) -> Vec<AssetRecord> {
        ids.iter()
            .map(|id| AssetRecord::new(*id, format!("Movie {id}")))
            .collect()
    }

    #[tokio::test]
    async fn aggregate_skips_failed_assets_and_continues() {
        let predictor = ScriptedPredictor::default()
            .succeed("1", &["Comedy", "Action"])
            .succeed("3", &[]);
        let aggregator = Aggregator::sequential(Arc::new(predictor));

        let outcome = aggregator.aggregate(assets(&["1", "2", "3"])).await;

        assert_eq!(
            outcome.records,
            vec![
                AggregatedRecord {
                    id: "1".into(),
                    title: "Movie 1".into(),
                    genres: vec!["Comedy".into(), "Action".into()],
                },
                AggregatedRecord {
                    id: "3".into(),
                    title: "Movie 3".into(),
                    genres: vec![],
                },
            ]
        );
        assert_eq!(outcome.failed_asset_ids(), vec!["2"]);
        assert_eq!(outcome.attempted(), 3);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn aggregate_empty_input_yields_empty_outcome() {
        let aggregator = Aggregator::sequential(Arc::new(ScriptedPredictor::default()));

        let outcome = aggregator.aggregate(Vec::new()).await;

        assert!(outcome.records.is_empty());
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn aggregate_keeps_duplicates_without_deduplication() {
        let predictor = ScriptedPredictor::default().succeed("1", &["Drama", "Drama"]);
        let aggregator = Aggregator::sequential(Arc::new(predictor));

        let outcome = aggregator.aggregate(assets(&["1", "1"])).await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].genres, vec!["Drama", "Drama"]);
    }

    #[tokio::test]
    async fn concurrent_aggregation_preserves_input_order() {
        let predictor = ScriptedPredictor::default()
            .succeed("a", &["Horror"])
            .succeed("b", &["Drama"])
            .succeed("d", &["History"])
            .with_delay("a", Duration::from_millis(60))
            .with_delay("b", Duration::from_millis(30));
        let concurrency = NonZeroUsize::new(4).expect("non-zero");
        let aggregator = Aggregator::new(Arc::new(predictor), concurrency);

        let outcome = aggregator.aggregate(assets(&["a", "b", "c", "d"])).await;

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert_eq!(outcome.failed_asset_ids(), vec!["c"]);
    }

    proptest! {
        #[test]
        fn output_is_projection_of_input_onto_successes(
            outcomes in proptest::collection::vec(any::<bool>(), 0..24),
            concurrency in 1usize..6,
        ) {
            let ids: Vec<String> = (0..outcomes.len()).map(|i| format!("asset-{i}")).collect();
            let predictor = ids
                .iter()
                .zip(&outcomes)
                .filter(|(_, ok)| **ok)
                .fold(ScriptedPredictor::default(), |p, (id, _)| p.succeed(id, &["Drama"]));
            let aggregator = Aggregator::new(
                Arc::new(predictor),
                NonZeroUsize::new(concurrency).expect("non-zero"),
            );
            let input: Vec<AssetRecord> =
                ids.iter().map(|id| AssetRecord::new(id.clone(), "")).collect();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("runtime");
            let outcome = runtime.block_on(aggregator.aggregate(input));

            let expected: Vec<&String> = ids
                .iter()
                .zip(&outcomes)
                .filter_map(|(id, ok)| ok.then_some(id))
                .collect();
            let actual: Vec<&String> = outcome.records.iter().map(|r| &r.id).collect();
            prop_assert_eq!(actual, expected);
            prop_assert_eq!(outcome.failures.len(), outcomes.iter().filter(|ok| !**ok).count());
        }
    }
}
