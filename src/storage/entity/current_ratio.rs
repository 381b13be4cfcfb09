use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 当前比率快照：每个 symbol 一行，每次轮询整行覆盖
///
/// 代表"现在"，与历史序列的"截至各报告日"相区分。
/// P/B 抓取失败的股票整只跳过，所以 pb_ratio 必有值；
/// P/E 抓取失败时 pe_ratio 为 NULL。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "current_ratios")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub symbol: String,
    /// 最近一次刷新时间（unix 秒）
    pub last_update: i64,
    pub pb_ratio: f64,
    #[sea_orm(nullable)]
    pub pe_ratio: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
