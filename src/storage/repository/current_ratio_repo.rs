use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::storage::entity::current_ratio::{
    self, ActiveModel as CurrentRatioActiveModel, Entity as CurrentRatio,
    Model as CurrentRatioModel,
};

pub struct CurrentRatioRepository;

impl CurrentRatioRepository {
    /// 写入/刷新快照；symbol 冲突时整行更新为最新值
    pub async fn upsert(
        db: &DatabaseConnection,
        row: CurrentRatioModel,
    ) -> Result<(), sea_orm::DbErr> {
        let model = CurrentRatioActiveModel {
            symbol: Set(row.symbol),
            last_update: Set(row.last_update),
            pb_ratio: Set(row.pb_ratio),
            pe_ratio: Set(row.pe_ratio),
        };

        CurrentRatio::insert(model)
            .on_conflict(
                OnConflict::column(current_ratio::Column::Symbol)
                    .update_columns([
                        current_ratio::Column::LastUpdate,
                        current_ratio::Column::PbRatio,
                        current_ratio::Column::PeRatio,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        Ok(())
    }

    /// 读取快照；symbol 为 None 时返回全量，无匹配时返回空集
    pub async fn load(
        db: &DatabaseConnection,
        symbol: Option<&str>,
    ) -> Result<Vec<CurrentRatioModel>, sea_orm::DbErr> {
        let mut query = CurrentRatio::find();
        if let Some(symbol) = symbol {
            query = query.filter(current_ratio::Column::Symbol.eq(symbol));
        }
        query
            .order_by_asc(current_ratio::Column::Symbol)
            .all(db)
            .await
    }
}
