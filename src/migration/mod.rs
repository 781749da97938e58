use sea_orm_migration::prelude::*;

mod m20261019_000001_init;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20261019_000001_init::Migration)]
    }
}

/// 已执行迁移的内存 SQLite，仅供测试使用
#[cfg(test)]
pub async fn memory_database() -> sea_orm::DatabaseConnection {
    let db = sea_orm::Database::connect("sqlite::memory:")
        .await
        .expect("failed to connect sqlite");
    Migrator::up(&db, None).await.expect("failed to run migrations");
    db
}
