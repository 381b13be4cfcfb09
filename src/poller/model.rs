use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::api::{PbRow, PeRow, Ticker};
use crate::storage::entity::ratio_history;

/// 系统性失败：逃出单只股票隔离边界的错误，触发外层退避重试
#[derive(Debug, Clone)]
pub struct PollError {
    pub message: String,
}

impl PollError {
    pub fn systemic(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// 单只股票在一轮轮询中的结局
///
/// 跳过/降级/入库策略以数据形式暴露，而不是埋在控制流里。
#[derive(Debug, Clone, PartialEq)]
pub enum TickerOutcome {
    /// P/B 抓取失败，整只跳过（P/B 是基础序列，缺失时 P/E 数据无意义）
    SkippedPb { symbol: String, reason: String },
    /// 已走完入库流程；P/E 或某张表可能缺失，见各字段
    Stored {
        symbol: String,
        history_rows: usize,
        pe_missing: bool,
        history_persisted: bool,
        current_persisted: bool,
    },
}

/// 一轮 run_once 的汇总
#[derive(Debug, Clone, Default)]
pub struct PollRunSummary {
    pub outcomes: Vec<TickerOutcome>,
}

impl PollRunSummary {
    pub fn stored_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TickerOutcome::Stored { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TickerOutcome::SkippedPb { .. }))
            .count()
    }
}

/// run_forever 的显式状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Polling,
    Backoff,
    Stopped,
}

/// 将 P/B 与 P/E 序列按日期做外连接，合并为入库行
///
/// 任一侧缺失的日期保留另一侧字段，缺失侧置 None（不是 0，也不丢行）。
/// 输出按日期降序，与源站展示顺序一致。
pub fn merge_observations(
    ticker: &Ticker,
    pb_rows: &[PbRow],
    pe_rows: &[PeRow],
) -> Vec<ratio_history::Model> {
    let mut by_date: BTreeMap<NaiveDate, ratio_history::Model> = BTreeMap::new();

    for row in pb_rows {
        let entry = by_date
            .entry(row.date)
            .or_insert_with(|| empty_row(ticker, row.date));
        entry.stock_price = row.stock_price;
        entry.book_value_per_share = row.book_value_per_share;
        entry.price_to_book_ratio = row.price_to_book_ratio;
    }
    for row in pe_rows {
        let entry = by_date
            .entry(row.date)
            .or_insert_with(|| empty_row(ticker, row.date));
        entry.ttm_net_eps = row.ttm_net_eps;
        entry.pe_ratio = row.pe_ratio;
    }

    by_date.into_values().rev().collect()
}

fn empty_row(ticker: &Ticker, date: NaiveDate) -> ratio_history::Model {
    ratio_history::Model {
        symbol: ticker.symbol.clone(),
        name: ticker.display_name.clone(),
        date,
        stock_price: None,
        book_value_per_share: None,
        price_to_book_ratio: None,
        ttm_net_eps: None,
        pe_ratio: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker() -> Ticker {
        Ticker {
            symbol: "AAA".to_string(),
            display_name: "AAA Inc.".to_string(),
            provider_key: "AAA/aaa".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pb(d: NaiveDate, ratio: f64) -> PbRow {
        PbRow {
            date: d,
            stock_price: Some(10.0),
            book_value_per_share: Some(5.0),
            price_to_book_ratio: Some(ratio),
        }
    }

    fn pe(d: NaiveDate, ratio: f64) -> PeRow {
        PeRow {
            date: d,
            ttm_net_eps: Some(1.0),
            pe_ratio: Some(ratio),
        }
    }

    #[test]
    fn matching_dates_merge_into_one_row() {
        let d = date(2023, 12, 31);
        let rows = merge_observations(&ticker(), &[pb(d, 2.0)], &[pe(d, 15.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price_to_book_ratio, Some(2.0));
        assert_eq!(rows[0].pe_ratio, Some(15.0));
        assert_eq!(rows[0].ttm_net_eps, Some(1.0));
        assert_eq!(rows[0].symbol, "AAA");
        assert_eq!(rows[0].name, "AAA Inc.");
    }

    #[test]
    fn pb_only_date_has_absent_pe_fields() {
        let rows = merge_observations(&ticker(), &[pb(date(2023, 12, 31), 2.0)], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price_to_book_ratio, Some(2.0));
        // 缺失侧必须是 None，而不是 0，也不能整行丢掉
        assert_eq!(rows[0].pe_ratio, None);
        assert_eq!(rows[0].ttm_net_eps, None);
    }

    #[test]
    fn pe_only_date_has_absent_pb_fields() {
        let rows = merge_observations(&ticker(), &[], &[pe(date(2023, 9, 30), 11.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pe_ratio, Some(11.0));
        assert_eq!(rows[0].price_to_book_ratio, None);
        assert_eq!(rows[0].stock_price, None);
        assert_eq!(rows[0].book_value_per_share, None);
    }

    #[test]
    fn output_is_sorted_by_date_descending() {
        let rows = merge_observations(
            &ticker(),
            &[pb(date(2022, 12, 31), 1.0), pb(date(2023, 12, 31), 2.0)],
            &[pe(date(2023, 6, 30), 9.0)],
        );
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date(2023, 12, 31), date(2023, 6, 30), date(2022, 12, 31)]
        );
    }
}
