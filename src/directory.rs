//! 路由器目录：提供需要轮询的网关列表

use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};

use crate::entity::{router, Router};

/// 一台待轮询的网关
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterEndpoint {
    pub name: String,
    pub public_address: String,
}

#[async_trait]
pub trait RouterDirectory: Send + Sync {
    /// 按固定顺序返回所有路由器
    async fn routers(&self) -> Result<Vec<RouterEndpoint>>;
}

/// 从 `router` 表读取路由器列表
pub struct DbRouterDirectory {
    db: DatabaseConnection,
}

impl DbRouterDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RouterDirectory for DbRouterDirectory {
    async fn routers(&self) -> Result<Vec<RouterEndpoint>> {
        let routers = Router::find()
            .order_by_asc(router::Column::Id)
            .all(&self.db)
            .await?;

        Ok(routers
            .into_iter()
            .map(|r| RouterEndpoint {
                name: r.name,
                public_address: r.public_address,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::memory_database;
    use sea_orm::{ActiveModelTrait, NotSet, Set};

    #[tokio::test]
    async fn test_routers_in_id_order() {
        let db = memory_database().await;

        for (name, address) in [("core", "192.0.2.1"), ("edge", "192.0.2.2:8729")] {
            router::ActiveModel {
                id: NotSet,
                name: Set(name.to_string()),
                public_address: Set(address.to_string()),
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let directory = DbRouterDirectory::new(db);
        let routers = directory.routers().await.unwrap();
        assert_eq!(
            routers,
            vec![
                RouterEndpoint { name: "core".into(), public_address: "192.0.2.1".into() },
                RouterEndpoint { name: "edge".into(), public_address: "192.0.2.2:8729".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let directory = DbRouterDirectory::new(memory_database().await);
        assert!(directory.routers().await.unwrap().is_empty());
    }
}
