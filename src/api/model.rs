use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 一只可轮询的股票：交易所代码 + 展示名 + 数据源 key
///
/// 由交易所列表与数据源目录连接得到，之后不再变化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub display_name: String,
    /// 数据源个股页面 URL 的路径段（如 "AAPL/apple"）
    pub provider_key: String,
}

/// P/B 历史表中的一行（日期解析失败的行在解析阶段即被丢弃）
#[derive(Debug, Clone, PartialEq)]
pub struct PbRow {
    pub date: NaiveDate,
    pub stock_price: Option<f64>,
    pub book_value_per_share: Option<f64>,
    pub price_to_book_ratio: Option<f64>,
}

/// P/E 历史表中的一行（股价列与 P/B 表重复，解析时不保留）
#[derive(Debug, Clone, PartialEq)]
pub struct PeRow {
    pub date: NaiveDate,
    pub ttm_net_eps: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// 一次 P/B 抓取的完整结果：历史表 + 页面上的当前值
#[derive(Debug, Clone)]
pub struct PbHistory {
    pub rows: Vec<PbRow>,
    pub current_pb: f64,
}

/// 一次 P/E 抓取的完整结果：历史表 + 页面上的当前值
#[derive(Debug, Clone)]
pub struct PeHistory {
    pub rows: Vec<PeRow>,
    pub current_pe: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("history table missing")]
    MissingHistoryTable,
    #[error("current value unavailable: {0}")]
    CurrentValueUnavailable(String),
    #[error("invalid response: {0}")]
    Decode(String),
}
