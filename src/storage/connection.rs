use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::time::Duration;

use crate::storage::entity;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);

    let db = Database::connect(opt).await?;

    // 启用 WAL 模式
    let _ = sea_orm::ConnectionTrait::execute(
        &db,
        sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ),
    )
    .await?;

    // 创建表（如果不存在）
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // 历史比率表
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::ratio_history::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    // 当前比率快照表
    let stmt = builder.build(
        schema
            .create_table_from_entity(entity::current_ratio::Entity)
            .if_not_exists(),
    );
    db.execute(stmt).await?;

    info!("Database connection established with WAL mode and table initialized.");

    Ok(db)
}
