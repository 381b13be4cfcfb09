use log::info;
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::model::ApiError;
use crate::session::{urls, MacrotrendsSession};

/// 目录接口返回的原始条目：n = "AAPL - Apple Inc."，s = "AAPL/apple"
#[derive(Debug, Clone, Deserialize)]
pub struct RawDirectoryEntry {
    pub n: String,
    pub s: String,
}

/// 解析后的目录条目
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub symbol: String,
    pub name: String,
    pub full_name: String,
    pub url: String,
}

/// 拆解原始条目；不符合 "SYM - Name" / "SYM/name" 形状的条目丢弃
pub fn parse_directory_entry(raw: &RawDirectoryEntry) -> Option<DirectoryEntry> {
    let (symbol, full_name) = raw.n.split_once(" - ")?;
    let name = raw.s.split('/').nth(1)?;
    if symbol.is_empty() || name.is_empty() {
        return None;
    }
    Some(DirectoryEntry {
        symbol: symbol.to_string(),
        name: name.to_string(),
        full_name: full_name.to_string(),
        url: raw.s.clone(),
    })
}

/// 数据源全量代码目录缓存
///
/// 进程生命周期内只抓取一次；之后的所有读取复用同一份数据，
/// 不会再次触发网络请求。
pub struct TickerDirectory {
    entries: OnceCell<Vec<DirectoryEntry>>,
}

impl TickerDirectory {
    pub fn new() -> Self {
        Self {
            entries: OnceCell::new(),
        }
    }

    /// 获取目录（首次调用触发网络抓取，之后直接复用缓存）
    pub async fn entries(
        &self,
        session: &MacrotrendsSession,
    ) -> Result<&[DirectoryEntry], ApiError> {
        let entries = self
            .entries
            .get_or_try_init(|| async {
                let resp = session.get(urls::URL_TICKER_DIRECTORY).await?;
                if !resp.status().is_success() {
                    return Err(ApiError::Decode(format!(
                        "ticker directory returned status {}",
                        resp.status()
                    )));
                }
                let raw = resp.text().await?;
                let raw: Vec<RawDirectoryEntry> = serde_json::from_str(&raw)
                    .map_err(|e| {
                        ApiError::Decode(format!("ticker directory json parse failed: {e}"))
                    })?;
                let parsed: Vec<DirectoryEntry> =
                    raw.iter().filter_map(parse_directory_entry).collect();
                info!("✓ 已缓存数据源代码目录: {} 条", parsed.len());
                Ok(parsed)
            })
            .await?;
        Ok(entries.as_slice())
    }
}

impl Default for TickerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_entry_is_parsed() {
        let raw = RawDirectoryEntry {
            n: "AAPL - Apple Inc.".to_string(),
            s: "AAPL/apple".to_string(),
        };
        let entry = parse_directory_entry(&raw).unwrap();
        assert_eq!(entry.symbol, "AAPL");
        assert_eq!(entry.name, "apple");
        assert_eq!(entry.full_name, "Apple Inc.");
        assert_eq!(entry.url, "AAPL/apple");
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let no_dash = RawDirectoryEntry {
            n: "AAPL Apple Inc.".to_string(),
            s: "AAPL/apple".to_string(),
        };
        assert!(parse_directory_entry(&no_dash).is_none());

        let no_slash = RawDirectoryEntry {
            n: "AAPL - Apple Inc.".to_string(),
            s: "AAPL".to_string(),
        };
        assert!(parse_directory_entry(&no_slash).is_none());
    }
}
