//! ステージ間の中間アーティファクト（集約レコード列）とアセット一覧の契約。
use std::sync::LazyLock;

use serde_json::{Value, json};
use thiserror::Error;

use crate::domain::{AggregatedRecord, AssetRecord};

use super::validate_json;

/// 中間アーティファクトのJSON Schema。
pub static INTERMEDIATE_ARTIFACT_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://alt.dev/schemas/genre-recommendation/aggregated-data.json",
        "title": "Aggregated Genre Records",
        "description": "Ordered aggregated records handed from process-and-send to generate-and-upload",
        "type": "array",
        "items": { "$ref": "#/$defs/record" },
        "$defs": {
            "record": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "title": { "type": "string" },
                    "genres": {
                        "type": ["array", "null"],
                        "items": { "type": "string" }
                    }
                },
                "required": ["id", "title", "genres"]
            }
        }
    })
});

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("malformed JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode JSON: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("artifact violates schema: {}", .errors.join("; "))]
    SchemaViolation { errors: Vec<String> },
}

/// 集約レコード列を中間アーティファクトとしてエンコードする。
///
/// 空の列は `[]` として書き出す。
///
/// # Errors
/// シリアライズに失敗した場合は [`ArtifactError::Encode`] を返す。
pub fn encode_records(records: &[AggregatedRecord]) -> Result<Vec<u8>, ArtifactError> {
    serde_json::to_vec(records).map_err(ArtifactError::Encode)
}

/// 中間アーティファクトをスキーマ検証した上でデコードする。
///
/// トップレベルの `null` は空の列として扱う。
///
/// # Errors
/// JSONとして不正な場合、スキーマに違反する場合はエラーを返す。
pub fn decode_records(bytes: &[u8]) -> Result<Vec<AggregatedRecord>, ArtifactError> {
    let value: Value = serde_json::from_slice(bytes).map_err(ArtifactError::Decode)?;
    if value.is_null() {
        return Ok(Vec::new());
    }

    let validation = validate_json(&INTERMEDIATE_ARTIFACT_SCHEMA, &value);
    if !validation.valid {
        return Err(ArtifactError::SchemaViolation {
            errors: validation.errors,
        });
    }

    serde_json::from_value(value).map_err(ArtifactError::Decode)
}

/// アセット一覧（`[{"id","title"}, ...]`）をデコードする。
///
/// # Errors
/// JSON配列としてデコードできない場合は [`ArtifactError::Decode`] を返す。
pub fn decode_assets(bytes: &[u8]) -> Result<Vec<AssetRecord>, ArtifactError> {
    let assets: Option<Vec<AssetRecord>> =
        serde_json::from_slice(bytes).map_err(ArtifactError::Decode)?;
    Ok(assets.unwrap_or_default())
}
