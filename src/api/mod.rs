pub mod directory;
pub mod model;
pub mod parser;

pub use directory::{DirectoryEntry, TickerDirectory};
pub use model::{ApiError, PbHistory, PbRow, PeHistory, PeRow, Ticker};

use async_trait::async_trait;
use log::debug;
use rand::seq::SliceRandom;
use scraper::Html;
use serde::Deserialize;
use std::collections::HashSet;

use crate::session::{urls, MacrotrendsSession};

/// 交易所名 -> screener 接口 exchange 参数
///
/// 用查表扩展新交易所，而不是在代码里加分支。
const EXCHANGE_SCREENERS: &[(&str, &str)] = &[("nasdaq", "nasdaq"), ("nyse", "nyse")];

/// 排除的尾缀字符：权证/供股权/优先股等衍生类份额标记
const EXCLUDED_SUFFIXES: [char; 4] = ['W', 'R', 'P', 'Q'];

/// screener 接口要求的伪装请求头
const SCREENER_HEADERS: &[(&str, &str)] = &[
    ("authority", "api.nasdaq.com"),
    ("accept", "application/json, text/plain, */*"),
    ("origin", "https://www.nasdaq.com"),
    ("referer", "https://www.nasdaq.com/"),
    ("accept-language", "en-US,en;q=0.9"),
];

/// 外部数据源的统一入口：供轮询调度器注入，测试时可替换
#[async_trait]
pub trait StockDataProvider: Send + Sync {
    /// 解析交易所的可轮询代码集合（去重、去衍生份额、连接目录）
    async fn exchange_tickers(
        &self,
        exchanges: &[String],
        randomize: bool,
    ) -> Result<Vec<Ticker>, ApiError>;

    /// 抓取单只股票的 P/B 历史表与当前值
    async fn pb_ratio_history(&self, ticker: &Ticker) -> Result<PbHistory, ApiError>;

    /// 抓取单只股票的 P/E 历史表与当前值
    async fn pe_ratio_history(&self, ticker: &Ticker) -> Result<PeHistory, ApiError>;
}

/// 默认实现：真实抓取 Macrotrends 与交易所 screener 接口
pub struct StockDataApi {
    session: MacrotrendsSession,
    directory: TickerDirectory,
}

impl StockDataApi {
    pub fn new() -> Self {
        Self {
            session: MacrotrendsSession::new(),
            directory: TickerDirectory::new(),
        }
    }

    /// 符号有效性：长度 > 4 且以保留尾缀结尾的视为衍生份额，排除
    fn is_valid_symbol(symbol: &str) -> bool {
        if symbol.len() <= 4 {
            return true;
        }
        match symbol.chars().last() {
            Some(last) => !EXCLUDED_SUFFIXES.contains(&last),
            None => true,
        }
    }

    async fn fetch_exchange_symbols(&self, exchange: &str) -> Result<Vec<String>, ApiError> {
        let param = EXCHANGE_SCREENERS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(exchange))
            .map(|(_, param)| *param)
            .ok_or_else(|| ApiError::UnsupportedExchange(exchange.to_string()))?;

        let url = urls::url_exchange_screener(param);
        let resp = self.session.get_with_headers(&url, SCREENER_HEADERS).await?;
        if !resp.status().is_success() {
            return Err(ApiError::Decode(format!(
                "exchange screener returned status {}",
                resp.status()
            )));
        }
        let body: ScreenerResponse = resp.json().await?;
        Ok(body.data.rows.into_iter().map(|r| r.symbol).collect())
    }

    /// 用目录给符号补齐 provider_key 与展示名；目录里不存在的符号静默丢弃
    fn join_directory(valid: &HashSet<String>, directory: &[DirectoryEntry]) -> Vec<Ticker> {
        directory
            .iter()
            .filter(|e| valid.contains(&e.symbol))
            .map(|e| Ticker {
                symbol: e.symbol.clone(),
                display_name: e.full_name.clone(),
                provider_key: e.url.clone(),
            })
            .collect()
    }
}

impl Default for StockDataApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StockDataProvider for StockDataApi {
    async fn exchange_tickers(
        &self,
        exchanges: &[String],
        randomize: bool,
    ) -> Result<Vec<Ticker>, ApiError> {
        let mut symbols = HashSet::new();
        for exchange in exchanges {
            let listed = self.fetch_exchange_symbols(exchange).await?;
            debug!("交易所 {} 返回 {} 个代码", exchange, listed.len());
            symbols.extend(listed);
        }

        symbols.retain(|s: &String| Self::is_valid_symbol(s));

        let directory = self.directory.entries(&self.session).await?;
        let mut tickers = Self::join_directory(&symbols, directory);

        if randomize {
            tickers.shuffle(&mut rand::thread_rng());
        }
        Ok(tickers)
    }

    async fn pb_ratio_history(&self, ticker: &Ticker) -> Result<PbHistory, ApiError> {
        let url = urls::url_price_book(&ticker.provider_key);
        let resp = self.session.get(&url).await?;
        if !resp.status().is_success() {
            return Err(ApiError::Decode(format!(
                "price-book page returned status {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;

        // Html 不是 Send，解析收在同步块里，不跨 await
        let (rows, current_pb) = {
            let document = Html::parse_document(&body);
            let table = parser::parse_ratio_table(&document)?;
            let current = parser::parse_current_value(&document)?;
            (parser::parse_pb_rows(&table), current)
        };

        Ok(PbHistory { rows, current_pb })
    }

    async fn pe_ratio_history(&self, ticker: &Ticker) -> Result<PeHistory, ApiError> {
        let url = urls::url_pe_ratio(&ticker.provider_key);
        let resp = self.session.get(&url).await?;
        if !resp.status().is_success() {
            return Err(ApiError::Decode(format!(
                "pe-ratio page returned status {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;

        let (rows, current_pe) = {
            let document = Html::parse_document(&body);
            let table = parser::parse_ratio_table(&document)?;
            let current = parser::parse_current_value(&document)?;
            (parser::parse_pe_rows(&table), current)
        };

        Ok(PeHistory { rows, current_pe })
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    data: ScreenerData,
}

#[derive(Debug, Deserialize)]
struct ScreenerData {
    rows: Vec<ScreenerRow>,
}

#[derive(Debug, Deserialize)]
struct ScreenerRow {
    symbol: String,
}
