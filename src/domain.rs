//! カタログ資産・ジャンル予測・集約レコードのドメインモデル。
use serde::{Deserialize, Deserializer, Serialize};

/// 予測サービスが返すジャンルラベルの順序付きリスト。
///
/// 重複は除去せず、予測サービスの返した順序をそのまま保持する。
pub type GenreList = Vec<String>;

/// カタログ上の1資産を識別する情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl AssetRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// 予測に成功した資産とそのジャンルの結合。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genres: GenreList,
}

impl AggregatedRecord {
    #[must_use]
    pub fn new(asset: AssetRecord, genres: GenreList) -> Self {
        Self {
            id: asset.id,
            title: asset.title,
            genres,
        }
    }
}

/// `null` を空のシーケンスとして扱う。
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_record_ignores_unknown_fields_and_defaults_title() {
        let asset: AssetRecord =
            serde_json::from_str(r#"{"id":"42","year":1999}"#).expect("asset decodes");

        assert_eq!(asset, AssetRecord::new("42", ""));
    }

    #[test]
    fn aggregated_record_treats_null_genres_as_empty() {
        let record: AggregatedRecord =
            serde_json::from_str(r#"{"id":"1","title":"Movie A","genres":null}"#)
                .expect("record decodes");

        assert!(record.genres.is_empty());
    }

    #[test]
    fn aggregated_record_keeps_duplicate_genres_in_order() {
        let record = AggregatedRecord::new(
            AssetRecord::new("7", "Heat"),
            vec!["Drama".into(), "Action".into(), "Drama".into()],
        );

        assert_eq!(record.genres, vec!["Drama", "Action", "Drama"]);
        assert_eq!(record.id, "7");
        assert_eq!(record.title, "Heat");
    }
}
