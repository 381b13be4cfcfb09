use chrono::{Datelike, Duration, Utc};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::screener::model::{
    CriteriaError, PbAverages, ScreeningCriteria, ScreeningResult, SymbolMetrics,
};
use crate::storage::entity::{current_ratio, ratio_history};

/// 对全量历史 + 快照执行一次筛选（当前自然年取自时钟）
pub fn screen_stocks(
    history: &[ratio_history::Model],
    current: &[current_ratio::Model],
    criteria: &ScreeningCriteria,
) -> Result<ScreeningResult, CriteriaError> {
    criteria.validate()?;
    Ok(screen_with_year(history, current, criteria, Utc::now().year()))
}

/// 筛选的确定性核心：当前年作为显式输入，固定输入必得固定输出
///
/// 窗口规则：先剔除当前年（数据不完整），再以剩余最大年份为锚，
/// 只保留最近 10 个自然年。
pub fn screen_with_year(
    history: &[ratio_history::Model],
    current: &[current_ratio::Model],
    criteria: &ScreeningCriteria,
    this_year: i32,
) -> ScreeningResult {
    let rows: Vec<&ratio_history::Model> = history
        .iter()
        .filter(|r| r.date.year() != this_year)
        .collect();

    let Some(most_recent_year) = rows.iter().map(|r| r.date.year()).max() else {
        return ScreeningResult::default();
    };

    let windowed: Vec<&ratio_history::Model> = rows
        .into_iter()
        .filter(|r| r.date.year() > most_recent_year - 10)
        .collect();

    let mut groups: BTreeMap<&str, Vec<&ratio_history::Model>> = BTreeMap::new();
    for row in &windowed {
        groups.entry(row.symbol.as_str()).or_default().push(*row);
    }

    let current_by_symbol: HashMap<&str, &current_ratio::Model> =
        current.iter().map(|r| (r.symbol.as_str(), r)).collect();

    let mut symbols = Vec::new();
    let mut metrics = Vec::new();
    for (symbol, mut group) in groups {
        group.sort_by_key(|r| r.date);
        let snapshot = current_by_symbol.get(symbol).copied();
        if stock_meets_criteria(&group, snapshot, criteria) {
            debug!("✓ 符合筛选条件: {}", symbol);
            let averages = calculate_avg_pb_ratios(&group);
            let relative_pb_ratio = relative_pb(latest_pb_ratio(&group, snapshot), &averages);
            metrics.push(SymbolMetrics {
                symbol: symbol.to_string(),
                averages,
                relative_pb_ratio,
            });
            symbols.push(symbol.to_string());
        }
    }

    // symbols 来自 BTreeMap 遍历，天然有序，可二分
    let history_out: Vec<ratio_history::Model> = windowed
        .iter()
        .filter(|r| symbols.binary_search(&r.symbol).is_ok())
        .map(|r| (*r).clone())
        .collect();
    let current_out: Vec<current_ratio::Model> = current
        .iter()
        .filter(|r| symbols.binary_search(&r.symbol).is_ok())
        .cloned()
        .collect();

    ScreeningResult {
        symbols,
        history: history_out,
        current: current_out,
        metrics,
    }
}

/// 当前 P/B：快照优先，否则回退组内最近一行
fn latest_pb_ratio(
    group: &[&ratio_history::Model],
    current: Option<&current_ratio::Model>,
) -> Option<f64> {
    match current {
        Some(row) => Some(row.pb_ratio),
        None => group.last().and_then(|r| r.price_to_book_ratio),
    }
}

/// 相对 P/B：当前值 ÷ 两均值中较低者；较低者为 0 或无定义时为 None
pub(crate) fn relative_pb(current_pb: Option<f64>, averages: &PbAverages) -> Option<f64> {
    let lower = lower_of(averages.avg_pb_3yr, averages.avg_pb_max_yr);
    match current_pb {
        Some(pb) if lower.is_finite() && lower != 0.0 => Some(pb / lower),
        _ => None,
    }
}

/// 逐项计算所有条件后再取与
///
/// 每个条件都基于同一份窗口数据求值；任一失败即淘汰。
/// group 必须已按日期升序。
fn stock_meets_criteria(
    group: &[&ratio_history::Model],
    current: Option<&current_ratio::Model>,
    criteria: &ScreeningCriteria,
) -> bool {
    let mut valid = true;

    // 历史深度：窗口内不同年份数
    let years: BTreeSet<i32> = group.iter().map(|r| r.date.year()).collect();
    if (years.len() as u32) < criteria.years_pb_history {
        valid = false;
    }

    // 全正 P/B（开关关闭时此条完全不参与）
    if criteria.only_positive_pb {
        let has_non_positive = group
            .iter()
            .any(|r| matches!(r.price_to_book_ratio, Some(v) if v <= 0.0));
        if has_non_positive {
            valid = false;
        }
    }

    let latest_pb = latest_pb_ratio(group, current);

    // 上限是严格小于；取不到值视为不合格
    if !matches!(latest_pb, Some(v) if v < criteria.max_current_pb_ratio) {
        valid = false;
    }

    // 安全边际：当前 P/B ≤ 系数 × 两均值中较低者。
    // 与上一条的 < 不同，这里是 ≤。均值为 NaN 时比较恒为假，自然淘汰。
    let averages = calculate_avg_pb_ratios(group);
    let threshold =
        criteria.pb_margin_of_safety * lower_of(averages.avg_pb_3yr, averages.avg_pb_max_yr);
    if !matches!(latest_pb, Some(v) if v <= threshold) {
        valid = false;
    }

    // 正 P/E 年数：每年取最晚一行的 P/E 统计正值年数
    let mut latest_per_year: BTreeMap<i32, &ratio_history::Model> = BTreeMap::new();
    for row in group {
        // group 已升序，后写覆盖即取到该年最晚一行
        latest_per_year.insert(row.date.year(), *row);
    }
    let positive_pe_years = latest_per_year
        .values()
        .filter(|r| matches!(r.pe_ratio, Some(v) if v > 0.0))
        .count();
    if (positive_pe_years as u32) < criteria.years_positive_pe_history {
        valid = false;
    }

    // 当前 P/E：快照存在时总是优先（即使其中 P/E 缺失）
    let latest_pe = match current {
        Some(row) => row.pe_ratio,
        None => group.last().and_then(|r| r.pe_ratio),
    };
    if !matches!(latest_pe, Some(v) if v < criteria.max_current_pe_ratio) {
        valid = false;
    }

    valid
}

/// 计算 3 年均值 / 全窗口均值 / 可用年数
///
/// 内部自行按日期排序，结果与输入行顺序无关。
/// 3 年窗口用固定的 3×365 天近似，刻意与既有口径保持一致。
pub fn calculate_avg_pb_ratios(rows: &[&ratio_history::Model]) -> PbAverages {
    let mut sorted: Vec<&ratio_history::Model> = rows.to_vec();
    sorted.sort_by_key(|r| r.date);

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return PbAverages {
            avg_pb_3yr: f64::NAN,
            avg_pb_max_yr: f64::NAN,
            available_years: 0,
        };
    };

    let available_years = last.date.year() - first.date.year() + 1;
    let cutoff = last.date - Duration::days(3 * 365);

    let recent: Vec<f64> = sorted
        .iter()
        .filter(|r| r.date > cutoff)
        .filter_map(|r| r.price_to_book_ratio)
        .collect();
    let all: Vec<f64> = sorted.iter().filter_map(|r| r.price_to_book_ratio).collect();

    PbAverages {
        avg_pb_3yr: mean(&recent),
        avg_pb_max_yr: mean(&all),
        available_years,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// min 的 NaN 传染版本：任一侧为 NaN 则结果为 NaN
/// （f64::min 会把 NaN 丢掉，这里不能用）
fn lower_of(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const THIS_YEAR: i32 = 2024;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hist(symbol: &str, y: i32, pb: f64, pe: f64) -> ratio_history::Model {
        ratio_history::Model {
            symbol: symbol.to_string(),
            name: format!("{} Inc.", symbol),
            date: date(y, 12, 31),
            stock_price: Some(10.0),
            book_value_per_share: Some(5.0),
            price_to_book_ratio: Some(pb),
            ttm_net_eps: Some(1.0),
            pe_ratio: Some(pe),
        }
    }

    fn snapshot(symbol: &str, pb: f64, pe: f64) -> current_ratio::Model {
        current_ratio::Model {
            symbol: symbol.to_string(),
            last_update: 1_700_000_000,
            pb_ratio: pb,
            pe_ratio: Some(pe),
        }
    }

    fn criteria() -> ScreeningCriteria {
        ScreeningCriteria {
            years_pb_history: 7,
            only_positive_pb: true,
            max_current_pb_ratio: 2.0,
            pb_margin_of_safety: 1.0,
            years_positive_pe_history: 7,
            max_current_pe_ratio: 30.0,
        }
    }

    /// 8 年正 P/B：2021-2023 每年 1.5（3 年均值 1.5），
    /// 2016-2020 每年 1.98，全窗口均值 (5*1.98 + 3*1.5)/8 = 1.8
    fn eight_good_years(symbol: &str) -> Vec<ratio_history::Model> {
        let mut rows = Vec::new();
        for y in 2016..=2020 {
            rows.push(hist(symbol, y, 1.98, 12.0));
        }
        for y in 2021..=2023 {
            rows.push(hist(symbol, y, 1.5, 12.0));
        }
        rows
    }

    #[test]
    fn symbol_meeting_all_criteria_qualifies() {
        let history = eight_good_years("AAA");
        let current = vec![snapshot("AAA", 1.4, 12.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
        assert_eq!(result.history.len(), 8);
        assert_eq!(result.current.len(), 1);

        let m = &result.metrics[0];
        assert_eq!(m.symbol, "AAA");
        assert!((m.averages.avg_pb_3yr - 1.5).abs() < 1e-9);
        assert!((m.averages.avg_pb_max_yr - 1.8).abs() < 1e-9);
        assert_eq!(m.averages.available_years, 8);
        // 相对 P/B = 当前 1.4 ÷ 较低均值 1.5
        assert!((m.relative_pb_ratio.unwrap() - 1.4 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn margin_of_safety_fails_even_when_ceiling_passes() {
        let history = eight_good_years("AAA");
        // 1.6 < 2.0 过上限，但 1.6 > 1.0 × min(1.5, 1.8) = 1.5，安全边际不过
        let current = vec![snapshot("AAA", 1.6, 12.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn margin_boundary_is_inclusive() {
        let history = eight_good_years("AAA");
        // 恰好等于阈值：≤ 判定应当放行
        let current = vec![snapshot("AAA", 1.5, 12.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
    }

    #[test]
    fn too_few_distinct_years_never_qualifies() {
        // 5 年数据，其余指标全优
        let mut history = Vec::new();
        for y in 2019..=2023 {
            history.push(hist("AAA", y, 0.5, 5.0));
        }
        let current = vec![snapshot("AAA", 0.4, 5.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn positive_pb_toggle_is_observably_inert_when_off() {
        // 5 年窗口里有一年 P/B 为负
        let mut history = vec![hist("AAA", 2019, -1.0, 10.0)];
        for y in 2020..=2023 {
            history.push(hist("AAA", y, 1.0, 10.0));
        }
        // 3 年均值 1.0，全窗口均值 0.6，下限 0.6
        let current = vec![snapshot("AAA", 0.5, 10.0)];
        let mut relaxed = criteria();
        relaxed.years_pb_history = 5;
        relaxed.years_positive_pe_history = 5;

        relaxed.only_positive_pb = true;
        let result = screen_with_year(&history, &current, &relaxed, THIS_YEAR);
        assert!(result.symbols.is_empty());

        relaxed.only_positive_pb = false;
        let result = screen_with_year(&history, &current, &relaxed, THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
    }

    #[test]
    fn current_year_rows_are_excluded_from_the_window() {
        let mut history = eight_good_years("AAA");
        // 当前年里塞一行灾难性数据：不应影响结果
        history.push(hist("AAA", THIS_YEAR, 99.0, -50.0));
        let current = vec![snapshot("AAA", 1.4, 12.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
        assert!(result.history.iter().all(|r| r.date.year() != THIS_YEAR));
    }

    #[test]
    fn rows_older_than_ten_years_fall_out_of_the_window() {
        // 2010-2023 共 14 年，窗口锚定 2023，只留 2014 之后
        let mut history = Vec::new();
        for y in 2010..=2023 {
            history.push(hist("AAA", y, 1.0, 10.0));
        }
        let current = vec![snapshot("AAA", 0.9, 10.0)];

        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
        assert!(result.history.iter().all(|r| r.date.year() > 2013));
        assert_eq!(result.history.len(), 10);
    }

    #[test]
    fn missing_snapshot_falls_back_to_latest_history_row() {
        let history = eight_good_years("AAA");
        // 没有快照：最近一行 P/B = 1.5 ≤ 1.5，P/E = 12 < 30，应合格
        let result = screen_with_year(&history, &[], &criteria(), THIS_YEAR);
        assert_eq!(result.symbols, vec!["AAA".to_string()]);
    }

    #[test]
    fn snapshot_is_preferred_over_history_fallback() {
        let history = eight_good_years("AAA");
        // 历史最近一行是合格的 1.5，但快照是 1.9（> 1.5 边际）：以快照为准
        let current = vec![snapshot("AAA", 1.9, 12.0)];
        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn all_absent_pb_values_disqualify_via_nan_margin() {
        // P/B 全缺失：均值为 NaN，安全边际比较恒为假，必须淘汰
        let mut history = Vec::new();
        for y in 2016..=2023 {
            let mut row = hist("AAA", y, 0.0, 10.0);
            row.price_to_book_ratio = None;
            history.push(row);
        }
        let current = vec![snapshot("AAA", 1.0, 10.0)];
        let mut relaxed = criteria();
        relaxed.only_positive_pb = false;

        let result = screen_with_year(&history, &current, &relaxed, THIS_YEAR);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn averages_are_order_independent() {
        let rows_asc = eight_good_years("AAA");
        let mut rows_shuffled = rows_asc.clone();
        rows_shuffled.reverse();
        rows_shuffled.swap(0, 3);
        rows_shuffled.swap(2, 6);

        let refs_asc: Vec<&ratio_history::Model> = rows_asc.iter().collect();
        let refs_shuffled: Vec<&ratio_history::Model> = rows_shuffled.iter().collect();

        let a = calculate_avg_pb_ratios(&refs_asc);
        let b = calculate_avg_pb_ratios(&refs_shuffled);
        assert_eq!(a, b);
        assert_eq!(a.available_years, 8);
        assert!((a.avg_pb_3yr - 1.5).abs() < 1e-9);
        assert!((a.avg_pb_max_yr - 1.8).abs() < 1e-9);
    }

    #[test]
    fn empty_group_yields_nan_averages() {
        let averages = calculate_avg_pb_ratios(&[]);
        assert!(averages.avg_pb_3yr.is_nan());
        assert!(averages.avg_pb_max_yr.is_nan());
        assert_eq!(averages.available_years, 0);
    }

    #[test]
    fn screening_rejects_invalid_criteria_before_computing() {
        let history = eight_good_years("AAA");
        let mut bad = criteria();
        bad.years_pb_history = 0;
        let err = screen_stocks(&history, &[], &bad).unwrap_err();
        assert!(matches!(err, CriteriaError::Invalid { field, .. } if field == "years_pb_history"));
    }

    #[test]
    fn symbols_without_windowed_rows_cannot_qualify() {
        // 只有当前年数据的股票：窗口为空，无从合格
        let history = vec![hist("AAA", THIS_YEAR, 1.0, 10.0)];
        let current = vec![snapshot("AAA", 1.0, 10.0)];
        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn only_latest_row_per_year_counts_for_pe_positivity() {
        // 每年两行：年中 P/E 为正，年末为负 —— 应按年末行计数
        let mut history = Vec::new();
        for y in 2016..=2023 {
            let mut mid = hist("AAA", y, 1.0, 10.0);
            mid.date = date(y, 6, 30);
            history.push(mid);
            history.push(hist("AAA", y, 1.0, -5.0));
        }
        let current = vec![snapshot("AAA", 0.5, 10.0)];
        let result = screen_with_year(&history, &current, &criteria(), THIS_YEAR);
        assert!(result.symbols.is_empty());
    }
}
