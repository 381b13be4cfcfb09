use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 历史比率行：按 (symbol, date) 自然键唯一，只增不改
///
/// P/B 与 P/E 两侧在入库前按日期合并；某一侧缺失时对应列为 NULL。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ratio_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub symbol: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: Date,
    pub name: String,

    // P/B 侧字段
    #[sea_orm(nullable)]
    pub stock_price: Option<f64>,
    #[sea_orm(nullable)]
    pub book_value_per_share: Option<f64>,
    #[sea_orm(nullable)]
    pub price_to_book_ratio: Option<f64>,

    // P/E 侧字段
    #[sea_orm(nullable)]
    pub ttm_net_eps: Option<f64>,
    #[sea_orm(nullable)]
    pub pe_ratio: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
