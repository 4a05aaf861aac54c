//! ローカル実行用のジャンル予測サービスのモック。

use axum::{
    Json, Router,
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rand::{Rng, seq::SliceRandom};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::domain::{AssetRecord, GenreList};

/// モックが予測結果として返すジャンルの候補。
pub const GENRE_CATALOG: [&str; 10] = [
    "Comedy",
    "Drama",
    "Action",
    "Thriller",
    "Sci-Fi",
    "Adventure",
    "Documentary",
    "History",
    "Fantasy",
    "Horror",
];

pub const DEFAULT_PORT: u16 = 9090;

#[derive(Debug, Serialize)]
struct GenrePrediction {
    genres: GenreList,
}

/// `POST /predict` と `GET /health` を公開するルーター。
pub fn router() -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
}

/// GET /health のハンドラー
pub async fn health_handler() -> &'static str {
    "Healthy"
}

/// POST /predict のハンドラー
///
/// `{id, title}` としてデコードできないリクエストには 400 を返す。
pub async fn predict_handler(body: Bytes) -> Response {
    let asset: AssetRecord = match serde_json::from_slice(&body) {
        Ok(asset) => asset,
        Err(e) => {
            warn!(error = %e, "rejecting malformed prediction request");
            return (StatusCode::BAD_REQUEST, "Invalid request payload").into_response();
        }
    };

    let genres = mock_genres(&mut rand::rng());
    debug!(asset_id = %asset.id, genres = ?genres, "generated mock prediction");

    Json(GenrePrediction { genres }).into_response()
}

/// カタログをシャッフルし、ランダムな長さ（1件以上）の先頭部分を返す。
pub fn mock_genres<R: Rng>(rng: &mut R) -> GenreList {
    let mut genres = GENRE_CATALOG.to_vec();
    genres.shuffle(rng);
    let count = rng.random_range(1..=genres.len());
    genres
        .into_iter()
        .take(count)
        .map(ToString::to_string)
        .collect()
}

/// `DS_PORT` から待ち受けポートを決定する。未設定の場合は 9090。
///
/// # Errors
/// `DS_PORT` が有効なポート番号でない場合はエラーを返す。
pub fn port_from_env() -> anyhow::Result<u16> {
    match std::env::var("DS_PORT") {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("invalid DS_PORT {raw:?}: {e}")),
        _ => Ok(DEFAULT_PORT),
    }
}

/// グレースフルシャットダウンのため SIGTERM または SIGINT (Ctrl+C) を待つ
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
