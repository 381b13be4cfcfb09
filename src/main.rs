mod api;
mod poller;
mod screener;
mod session;
mod storage;

use anyhow::Context;
use chrono::Utc;
use log::info;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::StockDataApi;
use crate::poller::{PollerConfig, PollerService};
use crate::screener::{screen_stocks, ScreeningCriteria};
use crate::storage::repository::{CurrentRatioRepository, RatioHistoryRepository};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 Warn，本 crate Info，底层 SQL 噪音压到 Error
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustscreener", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    // 加载 .env（文件不存在时静默回退到系统环境变量）
    dotenv::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://ratios.db?mode=rwc".to_string());
    let db = storage::establish_connection(&db_url)
        .await
        .context("数据库连接失败")?;
    let db = Arc::new(db);

    let command = std::env::args().nth(1).unwrap_or_else(|| "poll".to_string());
    match command.as_str() {
        "poll" => run_poll(db).await,
        "screen" => run_screen(db).await,
        "report" => {
            let symbol = std::env::args()
                .nth(2)
                .context("用法: rustscreener report <SYMBOL>")?;
            run_report(db, &symbol).await
        }
        other => anyhow::bail!("未知命令: {} (可用: poll | screen | report <SYMBOL>)", other),
    }
}

/// 常驻轮询：Ctrl-C 触发取消信号，在 ticker 边界干净退出
async fn run_poll(db: Arc<DatabaseConnection>) -> anyhow::Result<()> {
    let mut config = PollerConfig::default();
    if let Ok(exchanges) = std::env::var("POLL_EXCHANGES") {
        config.exchanges = exchanges
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if config.exchanges.is_empty() {
        anyhow::bail!("POLL_EXCHANGES 不能为空");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到 Ctrl-C，当前股票处理完后停止轮询");
            let _ = shutdown_tx.send(true);
        }
    });

    let service = PollerService::new(StockDataApi::new(), db, config, shutdown_rx);
    service.run_forever().await;
    Ok(())
}

/// 对已入库数据执行一次筛选并打印结果
async fn run_screen(db: Arc<DatabaseConnection>) -> anyhow::Result<()> {
    let criteria = criteria_from_env()?;

    let history = RatioHistoryRepository::load(db.as_ref(), None).await?;
    let current = CurrentRatioRepository::load(db.as_ref(), None).await?;
    let result = screen_stocks(&history, &current, &criteria)?;

    println!("{} 只股票符合筛选条件:", result.symbols.len());
    for m in &result.metrics {
        let current_pb = result
            .current
            .iter()
            .find(|r| r.symbol == m.symbol)
            .map(|r| format!("{:.2}", r.pb_ratio))
            .unwrap_or_else(|| "-".to_string());
        let relative = m
            .relative_pb_ratio
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<8} 当前P/B {:>6}  相对P/B {:>6}  3年均值 {:>6.2}  {}年均值 {:>6.2}",
            m.symbol,
            current_pb,
            relative,
            m.averages.avg_pb_3yr,
            m.averages.available_years,
            m.averages.avg_pb_max_yr,
        );
    }
    Ok(())
}

/// 打印单只股票的文字报告
async fn run_report(db: Arc<DatabaseConnection>, symbol: &str) -> anyhow::Result<()> {
    let history = RatioHistoryRepository::load(db.as_ref(), Some(symbol)).await?;
    let current = CurrentRatioRepository::load(db.as_ref(), Some(symbol)).await?;

    match screener::report::stock_report(&history, &current, symbol) {
        Some(report) => {
            print!(
                "{}",
                screener::report::render_report_text(&report, Utc::now().date_naive())
            );
            Ok(())
        }
        None => anyhow::bail!("没有找到 {} 的历史数据", symbol),
    }
}

/// 从环境变量读取筛选条件；格式非法直接报错，不做静默替换
fn criteria_from_env() -> anyhow::Result<ScreeningCriteria> {
    let mut criteria = ScreeningCriteria::default();
    if let Ok(v) = std::env::var("SCREEN_YEARS_PB_HISTORY") {
        criteria.years_pb_history = v.parse().context("SCREEN_YEARS_PB_HISTORY 不是合法整数")?;
    }
    if let Ok(v) = std::env::var("SCREEN_ONLY_POSITIVE_PB") {
        criteria.only_positive_pb =
            v.parse().context("SCREEN_ONLY_POSITIVE_PB 不是合法布尔值")?;
    }
    if let Ok(v) = std::env::var("SCREEN_MAX_CURRENT_PB") {
        criteria.max_current_pb_ratio =
            v.parse().context("SCREEN_MAX_CURRENT_PB 不是合法数字")?;
    }
    if let Ok(v) = std::env::var("SCREEN_PB_MARGIN_OF_SAFETY") {
        criteria.pb_margin_of_safety = v
            .parse()
            .context("SCREEN_PB_MARGIN_OF_SAFETY 不是合法数字")?;
    }
    if let Ok(v) = std::env::var("SCREEN_YEARS_POSITIVE_PE_HISTORY") {
        criteria.years_positive_pe_history = v
            .parse()
            .context("SCREEN_YEARS_POSITIVE_PE_HISTORY 不是合法整数")?;
    }
    if let Ok(v) = std::env::var("SCREEN_MAX_CURRENT_PE") {
        criteria.max_current_pe_ratio =
            v.parse().context("SCREEN_MAX_CURRENT_PE 不是合法数字")?;
    }
    Ok(criteria)
}
