mod collector;
mod config;
mod decode;
mod device;
mod directory;
mod entity;
mod migration;
mod queue;
mod session;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::collector::Collector;
use crate::device::RouterOsConnector;
use crate::directory::DbRouterDirectory;
use crate::session::SystemClock;
use crate::store::DbSessionStore;

#[derive(Parser)]
#[command(name = "queue-stats", version, about = "采集 RouterOS 简单队列流量并写入节点会话")]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = "/etc/lms/queue-stats.toml")]
    config: PathBuf,

    /// 绑定地址（采集流程不使用）
    #[arg(long, default_value = "localhost:1029")]
    bind: String,
}

/// 执行一个采集周期；周期之间由外部调度器（如 cron）驱动
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化 tracing 日志系统
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let config = config::Config::from_file(&cli.config)?;
    info!("📋 加载配置文件: {}", cli.config.display());
    debug!("bind 地址 {} 未被采集流程使用", cli.bind);

    let db = Database::connect(config.database.url.as_str())
        .await
        .context("无法连接数据库")?;
    if config.database.migrate {
        migration::Migrator::up(&db, None).await?;
        info!("✅ 数据库迁移完成");
    }

    let collector = Collector::new(
        Arc::new(DbRouterDirectory::new(db.clone())),
        Arc::new(RouterOsConnector::new(config.device.clone())),
        Arc::new(DbSessionStore::new(db)),
        Arc::new(SystemClock),
        &config.collector,
    );

    collector.run().await?;
    Ok(())
}
