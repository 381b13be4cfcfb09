use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::StockDataProvider;
use crate::poller::model::{
    merge_observations, PollError, PollRunSummary, PollerState, TickerOutcome,
};
use crate::storage::entity::current_ratio;
use crate::storage::repository::{CurrentRatioRepository, RatioHistoryRepository};

/// 可注入的睡眠器：限速与退避的时序在测试里可以确定性验证
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// 默认实现：tokio 计时器
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 轮询配置
#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub exchanges: Vec<String>,
    /// 打乱轮询顺序，降低跨轮次的抓取规律性
    pub randomize: bool,
    /// 单次请求间的基础间隔（秒）
    pub base_delay_secs: f64,
    /// 叠加在基础间隔上的均匀随机抖动区间（秒）
    pub jitter_range: (f64, f64),
    /// 整批重试的上限
    pub max_retries: u32,
    /// 整批退避的基础等待（秒），实际等待 = base_wait * 2^retries
    pub base_wait_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            exchanges: vec!["nasdaq".to_string(), "nyse".to_string()],
            randomize: true,
            base_delay_secs: 10.0,
            jitter_range: (0.0, 1.0),
            max_retries: 5,
            base_wait_secs: 5,
        }
    }
}

/// 轮询调度器：顺序抓取 + 逐只立即入库 + 外层有界退避
///
/// 整条流水线是单逻辑线程的：逐只顺序抓取本身就是对源站的限速承诺，
/// 并发抓取会破坏间隔契约，这里刻意不做。
pub struct PollerService<P: StockDataProvider, S: Sleeper = TokioSleeper> {
    api: P,
    db: Arc<DatabaseConnection>,
    config: PollerConfig,
    sleeper: S,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: StockDataProvider> PollerService<P, TokioSleeper> {
    pub fn new(
        api: P,
        db: Arc<DatabaseConnection>,
        config: PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            db,
            config,
            sleeper: TokioSleeper,
            shutdown_rx,
        }
    }
}

impl<P: StockDataProvider, S: Sleeper> PollerService<P, S> {
    pub fn with_sleeper(
        api: P,
        db: Arc<DatabaseConnection>,
        config: PollerConfig,
        sleeper: S,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            db,
            config,
            sleeper,
            shutdown_rx,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// 限速睡眠：基础间隔 + 均匀抖动
    async fn do_sleep(&self) {
        let (lo, hi) = self.config.jitter_range;
        let jitter = lo + rand::random::<f64>() * (hi - lo).max(0.0);
        self.sleeper
            .sleep(Duration::from_secs_f64(
                self.config.base_delay_secs + jitter,
            ))
            .await;
    }

    /// 单轮轮询：逐只抓取并立即入库
    ///
    /// 单只股票的任何失败都被压在本只范围内；只有代码解析这类
    /// 批前失败会作为系统性错误抛出。
    pub async fn run_once(&self) -> Result<PollRunSummary, PollError> {
        let tickers = self
            .api
            .exchange_tickers(&self.config.exchanges, self.config.randomize)
            .await
            .map_err(|e| {
                PollError::systemic(format!(
                    "交易所代码解析失败 ({:?}): {}",
                    self.config.exchanges, e
                ))
            })?;

        info!(
            "P/B & P/E 轮询开始，共 {} 只，预计 ~{:.1} 小时",
            tickers.len(),
            tickers.len() as f64 * 2.0 * self.config.base_delay_secs / 3600.0
        );

        let mut summary = PollRunSummary::default();

        for (idx, ticker) in tickers.iter().enumerate() {
            // 取消信号只在 ticker 边界检查，保证单只流程完整
            if self.is_cancelled() {
                info!("收到取消信号，提前结束本轮轮询");
                break;
            }

            // 1. P/B 历史（基础序列，失败则整只跳过；间隔照常执行）
            let pb = match self.api.pb_ratio_history(ticker).await {
                Ok(pb) => {
                    debug!(
                        "({}/{}) 已抓取 {} 条 P/B 历史: {} ({})",
                        idx + 1,
                        tickers.len(),
                        pb.rows.len(),
                        ticker.symbol,
                        ticker.display_name
                    );
                    pb
                }
                Err(e) => {
                    warn!(
                        "⚠ 抓取 P/B 历史失败，跳过 {} ({}): {}",
                        ticker.symbol, ticker.provider_key, e
                    );
                    summary.outcomes.push(TickerOutcome::SkippedPb {
                        symbol: ticker.symbol.clone(),
                        reason: e.to_string(),
                    });
                    self.do_sleep().await;
                    continue;
                }
            };
            self.do_sleep().await;

            // 2. P/E 历史（失败时降级：仅保留 P/B 侧字段）
            let pe = match self.api.pe_ratio_history(ticker).await {
                Ok(pe) => {
                    debug!(
                        "({}/{}) 已抓取 {} 条 P/E 历史: {} ({})",
                        idx + 1,
                        tickers.len(),
                        pe.rows.len(),
                        ticker.symbol,
                        ticker.display_name
                    );
                    Some(pe)
                }
                Err(e) => {
                    warn!(
                        "⚠ 抓取 P/E 历史失败，仅保留 P/B 数据 {}: {}",
                        ticker.symbol, e
                    );
                    None
                }
            };
            self.do_sleep().await;

            // 3. 两侧序列按日期外连接合并
            let rows = merge_observations(
                ticker,
                &pb.rows,
                pe.as_ref().map(|p| p.rows.as_slice()).unwrap_or(&[]),
            );
            let history_rows = rows.len();

            // 4. 历史行立即入库：一只一批，崩溃时已完成的进度都保得住
            let history_persisted =
                match RatioHistoryRepository::insert_batch(self.db.as_ref(), rows).await {
                    Ok(_) => {
                        debug!(
                            "✓ 历史比率已入库: {} ({})",
                            ticker.symbol, ticker.display_name
                        );
                        true
                    }
                    Err(e) => {
                        warn!("⚠ 历史比率入库失败 {}: {}", ticker.symbol, e);
                        false
                    }
                };

            // 5. 快照独立入库；历史写入失败不影响这里
            let snapshot = current_ratio::Model {
                symbol: ticker.symbol.clone(),
                last_update: Utc::now().timestamp(),
                pb_ratio: pb.current_pb,
                pe_ratio: pe.as_ref().map(|p| p.current_pe),
            };
            let current_persisted =
                match CurrentRatioRepository::upsert(self.db.as_ref(), snapshot).await {
                    Ok(()) => {
                        debug!("✓ 当前比率快照已入库: {}", ticker.symbol);
                        true
                    }
                    Err(e) => {
                        warn!("⚠ 当前比率快照入库失败 {}: {}", ticker.symbol, e);
                        false
                    }
                };

            summary.outcomes.push(TickerOutcome::Stored {
                symbol: ticker.symbol.clone(),
                history_rows,
                pe_missing: pe.is_none(),
                history_persisted,
                current_persisted,
            });
        }

        info!(
            "本轮轮询结束: 入库 {} 只，跳过 {} 只",
            summary.stored_count(),
            summary.skipped_count()
        );
        Ok(summary)
    }

    /// 常驻轮询：{Polling, Backoff, Stopped} 有界状态机
    ///
    /// 成功一轮即清零重试计数；系统性失败按 base_wait * 2^retries
    /// 指数退避；超过上限视为致命，记录后终止。
    pub async fn run_forever(&self) {
        let mut retries: u32 = 0;
        let mut state = PollerState::Polling;

        loop {
            match state {
                PollerState::Polling => {
                    if self.is_cancelled() {
                        info!("轮询已取消，停止");
                        state = PollerState::Stopped;
                        continue;
                    }
                    match self.run_once().await {
                        Ok(_) => {
                            retries = 0;
                        }
                        Err(e) => {
                            error!("✗ 轮询出现系统性错误: {}", e);
                            retries += 1;
                            state = PollerState::Backoff;
                        }
                    }
                }
                PollerState::Backoff => {
                    if retries > self.config.max_retries {
                        error!(
                            "✗ 达到最大重试次数 ({})，轮询终止",
                            self.config.max_retries
                        );
                        state = PollerState::Stopped;
                        continue;
                    }
                    let wait = self.config.base_wait_secs * 2u64.pow(retries);
                    info!(
                        "{} 秒后重试整批轮询 [{}/{}]",
                        wait, retries, self.config.max_retries
                    );
                    self.sleeper.sleep(Duration::from_secs(wait)).await;
                    state = PollerState::Polling;
                }
                PollerState::Stopped => break,
            }
        }
    }
}
