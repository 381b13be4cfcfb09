use log::debug;
use rand::seq::SliceRandom;
use reqwest::{Client, Response};
use std::time::Duration;

/// 常见桌面浏览器 UA 池，每次请求随机取一个，降低被源站关联识别的概率
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// Macrotrends 会话
///
/// 数据源无需登录，只维护一个带 cookie 的 HTTP 客户端；
/// User-Agent 每次请求重新随机。请求本身不做重试，
/// 重试/退避语义由上层调度器负责。
pub struct MacrotrendsSession {
    client: Client,
}

impl MacrotrendsSession {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .cookie_store(true)
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    fn random_user_agent(&self) -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    /// GET 请求（随机 UA）
    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", self.random_user_agent())
            .send()
            .await?;
        debug!("{} get(...) [{}]", self, url);
        Ok(resp)
    }

    /// GET 请求并附加额外请求头（交易所 screener 接口需要伪装来源）
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.random_user_agent());
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        let resp = request.send().await?;
        debug!("{} get_with_headers(...) [{}]", self, url);
        Ok(resp)
    }
}

impl Default for MacrotrendsSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MacrotrendsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<MacrotrendsSession>")
    }
}

impl std::fmt::Debug for MacrotrendsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<MacrotrendsSession>")
    }
}
