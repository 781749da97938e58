//! 采集流程编排
//!
//! 一个采集周期内严格顺序执行：
//! 1. 从目录读取路由器列表（失败则整个周期失败）
//! 2. 逐台连接设备并读取 `/queue/simple` 快照（失败则跳过该路由器）
//! 3. 逐条解码规则并构建会话，零流量规则直接跳过
//! 4. 会话保存成功后才清零该规则的设备计数；保存失败时保留计数，留待下次采集

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::decode::{decode_address, decode_byte_pair, parse_identity, DecodeError};
use crate::device::{DeviceClient, DeviceConnector};
use crate::directory::{RouterDirectory, RouterEndpoint};
use crate::queue::{queue_stats_query, QueueRule, RESET_COUNTERS_COMMAND};
use crate::session::{Built, Clock, SessionBuilder};
use crate::store::SessionStore;

/// 一个采集周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub routers_total: usize,
    pub routers_failed: usize,
    pub rules_seen: usize,
    pub sessions_skipped: usize,
    pub sessions_saved: usize,
    pub save_failures: usize,
    pub resets_issued: usize,
    pub reset_failures: usize,
}

pub struct Collector {
    directory: Arc<dyn RouterDirectory>,
    connector: Arc<dyn DeviceConnector>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    builder: SessionBuilder,
}

impl Collector {
    pub fn new(
        directory: Arc<dyn RouterDirectory>,
        connector: Arc<dyn DeviceConnector>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: &CollectorConfig,
    ) -> Self {
        Self {
            directory,
            connector,
            store,
            clock,
            builder: SessionBuilder::new(config.lookback_secs),
        }
    }

    /// 执行一个完整的采集周期
    ///
    /// 只有读取路由器列表失败会返回错误，其余错误记录日志后继续。
    pub async fn run(&self) -> Result<CycleReport> {
        let routers = self
            .directory
            .routers()
            .await
            .context("无法从数据库获取路由器列表")?;

        let mut report = CycleReport {
            routers_total: routers.len(),
            ..Default::default()
        };
        info!("🔄 开始采集，共 {} 台路由器", routers.len());

        for router in &routers {
            if let Err(e) = self.poll_router(router, &mut report).await {
                report.routers_failed += 1;
                error!(router = %router.public_address, "跳过路由器 {}: {:#}", router.name, e);
            }
        }

        info!(
            routers = report.routers_total,
            routers_failed = report.routers_failed,
            rules = report.rules_seen,
            skipped = report.sessions_skipped,
            saved = report.sessions_saved,
            save_failures = report.save_failures,
            resets = report.resets_issued,
            reset_failures = report.reset_failures,
            "✅ 采集周期结束"
        );
        Ok(report)
    }

    async fn poll_router(&self, router: &RouterEndpoint, report: &mut CycleReport) -> Result<()> {
        let mut device = self
            .connector
            .connect(&router.public_address)
            .await
            .context("无法连接 RouterOS 设备")?;

        let records = device
            .execute_entity("print", &queue_stats_query())
            .await
            .context("无法从 RouterOS 获取队列统计")?;

        let now = self.clock.now_unix_sec();
        debug!(router = %router.public_address, "获取到 {} 条队列规则", records.len());

        for record in &records {
            let rule = QueueRule::from_record(record);
            self.account_rule(device.as_mut(), router, &rule, now, report).await;
        }

        Ok(())
    }

    async fn account_rule(
        &self,
        device: &mut dyn DeviceClient,
        router: &RouterEndpoint,
        rule: &QueueRule,
        now: u64,
        report: &mut CycleReport,
    ) {
        report.rules_seen += 1;

        let identity = parse_identity(&rule.comment);
        let address = decode_address(&rule.target);
        let counters = decode_byte_pair(&rule.bytes);
        for diagnostic in identity
            .diagnostics
            .iter()
            .chain(&address.diagnostics)
            .chain(&counters.diagnostics)
        {
            log_diagnostic(router, rule, diagnostic);
        }

        let session = match self.builder.build(identity.value, address.value, counters.value, now) {
            Built::Session(session) => session,
            Built::Skip => {
                report.sessions_skipped += 1;
                return;
            }
        };

        info!(router = %router.public_address, rule = %rule.id, "session: {:?}", session);
        if let Err(e) = self.store.save(&session).await {
            // 保存失败时不清零计数，下次采集仍可取回这部分流量
            report.save_failures += 1;
            error!(router = %router.public_address, rule = %rule.id, "无法保存节点会话: {:#}", e);
            return;
        }
        report.sessions_saved += 1;

        match device.execute(RESET_COUNTERS_COMMAND, &rule.reset_argument()).await {
            Ok(reply) => {
                report.resets_issued += 1;
                debug!(router = %router.public_address, rule = %rule.id, "reset: {:?}", reply);
            }
            Err(e) => {
                report.reset_failures += 1;
                warn!(router = %router.public_address, rule = %rule.id, "清零队列计数失败: {:#}", e);
            }
        }
    }
}

fn log_diagnostic(router: &RouterEndpoint, rule: &QueueRule, diagnostic: &DecodeError) {
    warn!(router = %router.public_address, rule = %rule.id, "{}", diagnostic);
}
