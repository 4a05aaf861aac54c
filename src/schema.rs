//! JSON Schema 2020-12定義モジュール。
//!
//! ステージ間で受け渡す中間アーティファクトの契約をJSON Schemaで定義し、
//! 読み込み時に検証を行います。
pub mod artifact;

use serde_json::Value;

/// スキーマ検証結果。
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub(crate) fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// JSON Schemaでデータを検証する。
///
/// 違反があった場合は、違反箇所のJSON Pointerとメッセージを `errors` に格納する。
#[must_use]
pub fn validate_json(schema_json: &Value, instance: &Value) -> ValidationResult {
    match jsonschema::validator_for(schema_json) {
        Ok(validator) => {
            let errors: Vec<String> = validator
                .iter_errors(instance)
                .map(|error| format!("{}: {}", error.instance_path, error))
                .collect();
            if errors.is_empty() {
                ValidationResult::valid()
            } else {
                ValidationResult::invalid(errors)
            }
        }
        Err(e) => ValidationResult::invalid(vec![format!("Schema compilation error: {e}")]),
    }
}
