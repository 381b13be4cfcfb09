use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::screener::service::{calculate_avg_pb_ratios, relative_pb};
use crate::storage::entity::{current_ratio, ratio_history};

/// 单只股票的报告原料：逐年时间序列 + 基本面指标
#[derive(Debug, Clone)]
pub struct StockReport {
    pub symbol: String,
    pub company_name: String,
    /// 每个自然年保留该年最晚一行
    pub yearly: Vec<ratio_history::Model>,
    pub current_pe_ratio: Option<f64>,
    pub current_pb_ratio: Option<f64>,
    pub avg_pb_3yr: f64,
    pub avg_pb_max_yr: f64,
    pub available_years: i32,
    /// 当前 P/B ÷ 两均值中较低者；较低者为 0 或无定义时为 None
    pub relative_pb_ratio: Option<f64>,
}

/// 生成单只股票的报告；没有任何历史行时返回 None
pub fn stock_report(
    history: &[ratio_history::Model],
    current: &[current_ratio::Model],
    symbol: &str,
) -> Option<StockReport> {
    let mut rows: Vec<&ratio_history::Model> =
        history.iter().filter(|r| r.symbol == symbol).collect();
    if rows.is_empty() {
        return None;
    }
    rows.sort_by_key(|r| r.date);

    let averages = calculate_avg_pb_ratios(&rows);

    // 快照优先，否则回退最近一行历史
    let snapshot = current.iter().find(|r| r.symbol == symbol);
    let (current_pb_ratio, current_pe_ratio) = match snapshot {
        Some(row) => (Some(row.pb_ratio), row.pe_ratio),
        None => {
            let last = *rows.last()?;
            (last.price_to_book_ratio, last.pe_ratio)
        }
    };

    let relative_pb_ratio = relative_pb(current_pb_ratio, &averages);

    // 每年取最晚一行（rows 已升序，后写覆盖）
    let mut by_year: BTreeMap<i32, &ratio_history::Model> = BTreeMap::new();
    for row in &rows {
        by_year.insert(row.date.year(), *row);
    }
    let yearly: Vec<ratio_history::Model> = by_year.into_values().cloned().collect();

    let company_name = rows
        .last()
        .map(|r| r.name.clone())
        .unwrap_or_default();

    Some(StockReport {
        symbol: symbol.to_string(),
        company_name,
        yearly,
        current_pe_ratio,
        current_pb_ratio,
        avg_pb_3yr: averages.avg_pb_3yr,
        avg_pb_max_yr: averages.avg_pb_max_yr,
        available_years: averages.available_years,
        relative_pb_ratio,
    })
}

/// 渲染为纯文本报告，可直接落盘或随工具输出
pub fn render_report_text(report: &StockReport, today: NaiveDate) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} ({}) Stock Report\n\n",
        today, report.company_name, report.symbol
    ));
    out.push_str(&format!("Symbol: {}\n", report.symbol));
    out.push_str(&format!("Company_Name: {}\n\n", report.company_name));

    out.push_str(&format!(
        "{:<12} {:>12} {:>14} {:>10} {:>10}\n",
        "Report Date", "Stock Price", "BV per Share", "P/B", "P/E"
    ));
    for row in &report.yearly {
        out.push_str(&format!(
            "{:<12} {:>12} {:>14} {:>10} {:>10}\n",
            row.date.format("%Y-%m").to_string(),
            fmt_opt(row.stock_price),
            fmt_opt(row.book_value_per_share),
            fmt_opt(row.price_to_book_ratio),
            fmt_opt(row.pe_ratio),
        ));
    }
    out.push('\n');

    out.push_str(&format!(
        "Current P/E Ratio: {}\n",
        fmt_opt(report.current_pe_ratio)
    ));
    out.push_str(&format!(
        "Current P/B Ratio: {}\n",
        fmt_opt(report.current_pb_ratio)
    ));
    out.push_str(&format!("3 Year Average P/B: {}\n", fmt_f64(report.avg_pb_3yr)));
    out.push_str(&format!(
        "{} Year Average P/B: {}\n",
        report.available_years,
        fmt_f64(report.avg_pb_max_yr)
    ));
    out.push_str(&format!(
        "Relative P/B Ratio: {}\n",
        fmt_opt(report.relative_pb_ratio)
    ));
    out
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

fn fmt_f64(value: f64) -> String {
    if value.is_nan() {
        "-".to_string()
    } else {
        format!("{:.2}", value)
    }
}
