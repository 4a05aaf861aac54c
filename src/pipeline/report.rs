//! 集約レコード列をCSVレポートに変換する。
//!
//! ジャンルリストは `|` 区切りの1フィールドにまとめる。逆変換は提供しない。
use std::io;

use csv::{Terminator, WriterBuilder};
use thiserror::Error;

use crate::domain::AggregatedRecord;

pub const REPORT_HEADER: [&str; 3] = ["ID", "Title", "Genres"];
pub const GENRE_SEPARATOR: &str = "|";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write report row {row}: {source}")]
    Write {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("failed to flush report: {0}")]
    Flush(#[source] io::Error),
}

/// ジャンルリストを1フィールドにエンコードする。空リストは空文字列になる。
#[must_use]
pub fn encode_genres(genres: &[String]) -> String {
    genres.join(GENRE_SEPARATOR)
}

/// レポート全体をメモリ上に描画する。
///
/// # Errors
/// 行の書き込みまたはフラッシュに失敗した場合は [`RenderError`] を返す。
pub fn render(records: &[AggregatedRecord]) -> Result<Vec<u8>, RenderError> {
    render_to(Vec::new(), records)
}

/// 任意の書き込み先にレポートを描画し、フラッシュ済みの書き込み先を返す。
///
/// 途中で失敗した場合は部分的な結果を返さない。
///
/// # Errors
/// 行の書き込みまたはフラッシュに失敗した場合は [`RenderError`] を返す。
pub fn render_to<W: io::Write>(writer: W, records: &[AggregatedRecord]) -> Result<W, RenderError> {
    let mut csv_writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer
        .write_record(REPORT_HEADER)
        .map_err(|source| RenderError::Write { row: 1, source })?;

    for (index, record) in records.iter().enumerate() {
        let genres = encode_genres(&record.genres);
        csv_writer
            .write_record([record.id.as_str(), record.title.as_str(), genres.as_str()])
            .map_err(|source| RenderError::Write {
                row: index + 2,
                source,
            })?;
    }

    csv_writer
        .into_inner()
        .map_err(|error| RenderError::Flush(error.into_error()))
}
