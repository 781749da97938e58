//! 用量会话构建

use chrono::Utc;

use crate::decode::{ByteCounters, ParsedIdentity};

/// 默认回溯窗口（秒），与外部调度器的采集间隔一致
pub const DEFAULT_LOOKBACK_SECS: u64 = 300;

/// 当前 Unix 时间（秒）
pub trait Clock: Send + Sync {
    fn now_unix_sec(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// 一个节点在一个采集周期内的用量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSession {
    pub customer_id: i64,
    pub node_id: i64,
    pub address: u32,
    pub upload_bytes: u64,
    pub download_bytes: u64,
    pub window_start: u64,
    pub window_end: u64,
}

/// 构建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Built {
    Session(UsageSession),
    /// 上传和下载均为 0，不生成会话
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionBuilder {
    lookback_secs: u64,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKBACK_SECS)
    }
}

impl SessionBuilder {
    pub fn new(lookback_secs: u64) -> Self {
        Self { lookback_secs }
    }

    /// 只有零流量会被跳过；身份无效的规则仍会生成会话，身份字段为 0
    pub fn build(
        &self,
        identity: ParsedIdentity,
        address: u32,
        counters: ByteCounters,
        now: u64,
    ) -> Built {
        if counters.is_zero() {
            return Built::Skip;
        }

        Built::Session(UsageSession {
            customer_id: identity.customer_id,
            node_id: identity.node_id,
            address,
            upload_bytes: counters.upload,
            download_bytes: counters.download,
            window_start: now.saturating_sub(self.lookback_secs),
            window_end: now,
        })
    }
}
