/// Macrotrends 站点基础 URL
pub const MACROTRENDS_BASE_URL: &str = "https://www.macrotrends.net";

/// 全量代码目录（站内搜索列表）URL
pub const URL_TICKER_DIRECTORY: &str =
    "https://www.macrotrends.net/assets/php/ticker_search_list.php";

/// 个股 P/B 历史页面
pub fn url_price_book(provider_key: &str) -> String {
    format!(
        "{}/stocks/charts/{}/price-book",
        MACROTRENDS_BASE_URL, provider_key
    )
}

/// 个股 P/E 历史页面
pub fn url_pe_ratio(provider_key: &str) -> String {
    format!(
        "{}/stocks/charts/{}/pe-ratio",
        MACROTRENDS_BASE_URL, provider_key
    )
}

/// 交易所代码筛选接口
pub const URL_EXCHANGE_SCREENER: &str = "https://api.nasdaq.com/api/screener/stocks";
pub fn url_exchange_screener(exchange: &str) -> String {
    format!("{}?exchange={}&download=true", URL_EXCHANGE_SCREENER, exchange)
}
