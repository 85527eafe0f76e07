use chrono::{DateTime, Utc};

/// Human-readable request identifier: `SOL-{YYYYMMDD}-{sequence:04}`.
///
/// `sequence` comes from the store's atomic counter. The protocol is for
/// display and search only; requests are always looked up by id.
pub fn generate(created_at: DateTime<Utc>, sequence: i64) -> String {
    format!("SOL-{}-{sequence:04}", created_at.format("%Y%m%d"))
}
