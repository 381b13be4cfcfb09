use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::storage::entity::ratio_history::{
    self, ActiveModel as RatioHistoryActiveModel, Entity as RatioHistory, Model as RatioHistoryModel,
};

pub struct RatioHistoryRepository;

impl RatioHistoryRepository {
    /// 批量写入历史行
    ///
    /// (symbol, date) 冲突时忽略，绝不覆盖已入库的历史行。
    /// 返回实际插入的行数（整批冲突时为 0，不是错误）。
    pub async fn insert_batch(
        db: &DatabaseConnection,
        rows: Vec<RatioHistoryModel>,
    ) -> Result<u64, sea_orm::DbErr> {
        if rows.is_empty() {
            return Ok(0);
        }

        let models: Vec<RatioHistoryActiveModel> = rows
            .into_iter()
            .map(|row| RatioHistoryActiveModel {
                symbol: Set(row.symbol),
                date: Set(row.date),
                name: Set(row.name),
                stock_price: Set(row.stock_price),
                book_value_per_share: Set(row.book_value_per_share),
                price_to_book_ratio: Set(row.price_to_book_ratio),
                ttm_net_eps: Set(row.ttm_net_eps),
                pe_ratio: Set(row.pe_ratio),
            })
            .collect();

        RatioHistory::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    ratio_history::Column::Symbol,
                    ratio_history::Column::Date,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await
    }

    /// 读取历史行；symbol 为 None 时返回全量
    ///
    /// 无匹配时返回空集而非错误。
    pub async fn load(
        db: &DatabaseConnection,
        symbol: Option<&str>,
    ) -> Result<Vec<RatioHistoryModel>, sea_orm::DbErr> {
        let mut query = RatioHistory::find();
        if let Some(symbol) = symbol {
            query = query.filter(ratio_history::Column::Symbol.eq(symbol));
        }
        query
            .order_by_asc(ratio_history::Column::Symbol)
            .order_by_asc(ratio_history::Column::Date)
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn test_db(name: &str) -> DatabaseConnection {
        let path = std::env::temp_dir().join(format!(
            "rustscreener_{}_{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite://{}?mode=rwc", path.display());
        crate::storage::establish_connection(&url).await.unwrap()
    }

    fn row(symbol: &str, date: NaiveDate, pb: f64) -> RatioHistoryModel {
        RatioHistoryModel {
            symbol: symbol.to_string(),
            date,
            name: format!("{} Inc.", symbol),
            stock_price: Some(10.0),
            book_value_per_share: Some(5.0),
            price_to_book_ratio: Some(pb),
            ttm_net_eps: Some(1.2),
            pe_ratio: Some(8.3),
        }
    }

    #[tokio::test]
    async fn reinserting_same_key_keeps_original_row() {
        let db = test_db("history_idempotent").await;
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();

        let inserted = RatioHistoryRepository::insert_batch(&db, vec![row("AAA", date, 2.0)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        // 同一自然键、不同数值：应被忽略而不是覆盖
        let mut changed = row("AAA", date, 2.0);
        changed.price_to_book_ratio = Some(9.9);
        changed.stock_price = Some(99.0);
        let inserted = RatioHistoryRepository::insert_batch(&db, vec![changed])
            .await
            .unwrap();
        assert_eq!(inserted, 0);

        let stored = RatioHistoryRepository::load(&db, Some("AAA")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].price_to_book_ratio, Some(2.0));
        assert_eq!(stored[0].stock_price, Some(10.0));
    }

    #[tokio::test]
    async fn nullable_pe_fields_round_trip() {
        let db = test_db("history_nullable").await;
        let date = NaiveDate::from_ymd_opt(2022, 6, 30).unwrap();

        let mut pb_only = row("BBB", date, 1.1);
        pb_only.ttm_net_eps = None;
        pb_only.pe_ratio = None;
        RatioHistoryRepository::insert_batch(&db, vec![pb_only])
            .await
            .unwrap();

        let stored = RatioHistoryRepository::load(&db, Some("BBB")).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].pe_ratio, None);
        assert_eq!(stored[0].price_to_book_ratio, Some(1.1));
    }

    #[tokio::test]
    async fn load_without_match_returns_empty() {
        let db = test_db("history_empty").await;
        let stored = RatioHistoryRepository::load(&db, Some("NOPE")).await.unwrap();
        assert!(stored.is_empty());
        let all = RatioHistoryRepository::load(&db, None).await.unwrap();
        assert!(all.is_empty());
    }
}
