use serde::{Deserialize, Serialize};

use crate::storage::entity::{current_ratio, ratio_history};

/// 价值筛选条件
///
/// 一次筛选调用的纯输入，不落库、没有独立身份。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    /// 最少 P/B 历史年数（窗口内不同年份数）
    pub years_pb_history: u32,
    /// 是否要求窗口内所有 P/B 严格为正
    pub only_positive_pb: bool,
    /// 当前 P/B 上限（严格小于）
    pub max_current_pb_ratio: f64,
    /// 安全边际系数：当前 P/B ≤ 系数 × min(3年均值, 全窗口均值)
    pub pb_margin_of_safety: f64,
    /// 最少正 P/E 年数（每年取该年最晚一行）
    pub years_positive_pe_history: u32,
    /// 当前 P/E 上限（严格小于）
    pub max_current_pe_ratio: f64,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            years_pb_history: 7,
            only_positive_pb: true,
            max_current_pb_ratio: 2.0,
            pb_margin_of_safety: 1.0,
            years_positive_pe_history: 7,
            max_current_pe_ratio: 30.0,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CriteriaError {
    #[error("invalid criteria: {field} = {value}")]
    Invalid {
        field: &'static str,
        value: String,
    },
}

impl ScreeningCriteria {
    /// 校验全部字段；任何非法值在计算开始前直接失败，
    /// 绝不悄悄替换成默认值改变筛选语义。
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.years_pb_history < 1 || self.years_pb_history > 10 {
            return Err(CriteriaError::Invalid {
                field: "years_pb_history",
                value: self.years_pb_history.to_string(),
            });
        }
        if self.years_positive_pe_history < 1 || self.years_positive_pe_history > 10 {
            return Err(CriteriaError::Invalid {
                field: "years_positive_pe_history",
                value: self.years_positive_pe_history.to_string(),
            });
        }
        if !self.max_current_pb_ratio.is_finite() || self.max_current_pb_ratio <= 0.0 {
            return Err(CriteriaError::Invalid {
                field: "max_current_pb_ratio",
                value: self.max_current_pb_ratio.to_string(),
            });
        }
        if !self.pb_margin_of_safety.is_finite() || self.pb_margin_of_safety <= 0.0 {
            return Err(CriteriaError::Invalid {
                field: "pb_margin_of_safety",
                value: self.pb_margin_of_safety.to_string(),
            });
        }
        if !self.max_current_pe_ratio.is_finite() || self.max_current_pe_ratio <= 0.0 {
            return Err(CriteriaError::Invalid {
                field: "max_current_pe_ratio",
                value: self.max_current_pe_ratio.to_string(),
            });
        }
        Ok(())
    }
}

/// 单只股票的 P/B 均值统计，供筛选与个股报告共用
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PbAverages {
    pub avg_pb_3yr: f64,
    pub avg_pb_max_yr: f64,
    pub available_years: i32,
}

/// 合格股票的派生指标
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub averages: PbAverages,
    /// 当前 P/B ÷ 两均值中较低者；较低者为 0 或无定义时为 None
    pub relative_pb_ratio: Option<f64>,
}

/// 筛选输出：合格代码 + 限定到该集合的窗口历史行与快照行 + 逐只派生指标
#[derive(Debug, Clone, Default)]
pub struct ScreeningResult {
    pub symbols: Vec<String>,
    pub history: Vec<ratio_history::Model>,
    pub current: Vec<current_ratio::Model>,
    pub metrics: Vec<SymbolMetrics>,
}
