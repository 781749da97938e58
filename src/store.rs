//! 会话持久化

use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, NotSet, Set};

use crate::entity::{node_session, NodeSession};
use crate::session::UsageSession;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 保存一条会话；返回错误时调用方不得清零设备计数
    async fn save(&self, session: &UsageSession) -> Result<()>;
}

/// 写入 `node_session` 表
pub struct DbSessionStore {
    db: DatabaseConnection,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_column(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{} 的值 {} 超出数据库列范围", column, value))
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn save(&self, session: &UsageSession) -> Result<()> {
        let row = node_session::ActiveModel {
            id: NotSet,
            customer_id: Set(session.customer_id),
            node_id: Set(session.node_id),
            ip: Set(session.address),
            download: Set(to_column(session.download_bytes, "download")?),
            upload: Set(to_column(session.upload_bytes, "upload")?),
            start: Set(to_column(session.window_start, "start")?),
            stop: Set(to_column(session.window_end, "stop")?),
        };

        NodeSession::insert(row)
            .exec(&self.db)
            .await
            .context("写入 node_session 失败")?;
        Ok(())
    }
}
