use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};

use super::model::{ApiError, PbRow, PeRow};

/// "当前值"文本节点在页面中的固定结构位置
const CURRENT_VALUE_SELECTOR: &str =
    "#main_content > div:nth-child(2) > span > p:nth-child(1) > strong";

/// 归一化列名：小写、空格转下划线
fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// 清洗货币单元格：去掉 $ 与千分位逗号后转 f64，解析失败返回 None
pub fn clean_money(cell: &str) -> Option<f64> {
    let re = Regex::new(r"[\$,]").unwrap();
    let s = re.replace_all(cell.trim(), "");
    s.parse::<f64>().ok()
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), "%Y-%m-%d").ok()
}

/// 页面里提取出的历史表：归一化列名 + 单元格文本
#[derive(Debug, Clone)]
pub struct RatioTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RatioTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn cell<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column_index(name)
            .and_then(|i| row.get(i))
            .map(|s| s.as_str())
    }
}

/// 从页面中提取第一张历史表
///
/// 源站表格带一行装饰性合并表头，跳过后用第二行作为列名。
pub fn parse_ratio_table(document: &Html) -> Result<RatioTable, ApiError> {
    let table_sel = Selector::parse("table").unwrap();
    let tr_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("th, td").unwrap();

    let table = document
        .select(&table_sel)
        .next()
        .ok_or(ApiError::MissingHistoryTable)?;

    let mut rows_iter = table.select(&tr_sel);
    // 第一行是装饰性表头
    rows_iter.next().ok_or(ApiError::MissingHistoryTable)?;
    let header = rows_iter.next().ok_or(ApiError::MissingHistoryTable)?;

    let columns: Vec<String> = header
        .select(&cell_sel)
        .map(|c| normalize_column(&c.text().collect::<String>()))
        .collect();
    if columns.is_empty() {
        return Err(ApiError::MissingHistoryTable);
    }

    let rows: Vec<Vec<String>> = rows_iter
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect::<Vec<String>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(RatioTable { columns, rows })
}

/// 提取"当前值"文本节点并转 f64
///
/// 节点缺失或文本非数字都视为当前值不可用，由调用方决定是否放弃该股票。
pub fn parse_current_value(document: &Html) -> Result<f64, ApiError> {
    let sel = Selector::parse(CURRENT_VALUE_SELECTOR).unwrap();
    let node = document
        .select(&sel)
        .next()
        .ok_or_else(|| ApiError::CurrentValueUnavailable("element not found".to_string()))?;
    let text = node.text().collect::<String>();
    text.trim()
        .parse::<f64>()
        .map_err(|_| ApiError::CurrentValueUnavailable(format!("not numeric: {}", text.trim())))
}

/// 解析 P/B 历史表（日期解析失败的行直接丢弃，不影响整次抓取）
pub fn parse_pb_rows(table: &RatioTable) -> Vec<PbRow> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let date = parse_date(table.cell(row, "date")?)?;
            Some(PbRow {
                date,
                stock_price: table.cell(row, "stock_price").and_then(clean_money),
                book_value_per_share: table
                    .cell(row, "book_value_per_share")
                    .and_then(clean_money),
                price_to_book_ratio: table
                    .cell(row, "price_to_book_ratio")
                    .and_then(clean_money),
            })
        })
        .collect()
}

/// 解析 P/E 历史表（同样按日期过滤；股价列不保留）
pub fn parse_pe_rows(table: &RatioTable) -> Vec<PeRow> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let date = parse_date(table.cell(row, "date")?)?;
            Some(PeRow {
                date,
                ttm_net_eps: table.cell(row, "ttm_net_eps").and_then(clean_money),
                pe_ratio: table.cell(row, "pe_ratio").and_then(clean_money),
            })
        })
        .collect()
}
