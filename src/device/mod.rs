//! 网关设备访问接口
//!
//! 采集流程只依赖这里的 trait，RouterOS API 的具体实现位于 [`routeros`]。

pub mod routeros;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub use routeros::RouterOsConnector;

/// 设备返回的一条记录（属性名 -> 属性值）
pub type Record = HashMap<String, String>;

/// 一次命令的完整响应
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// `!re` 句子携带的记录，保持设备返回的顺序
    pub records: Vec<Record>,
    /// `!done` 句子携带的属性
    pub done: Record,
}

/// 查询形状：菜单路径、附加标志以及需要返回的属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub path: &'static str,
    pub flags: Vec<&'static str>,
    pub attributes: Vec<&'static str>,
}

impl Query {
    /// 生成发送给设备的词序列，例如 `/queue/simple/print =stats= =.proplist=.id,bytes`
    pub fn words(&self, command: &str) -> Vec<String> {
        let mut words = vec![format!("{}/{}", self.path, command)];
        words.extend(self.flags.iter().map(|flag| format!("={}=", flag)));
        if !self.attributes.is_empty() {
            words.push(format!("=.proplist={}", self.attributes.join(",")));
        }
        words
    }
}

/// 与单个网关的会话
#[async_trait]
pub trait DeviceClient: Send {
    /// 按查询形状执行命令，返回有序记录
    async fn execute_entity(&mut self, command: &str, query: &Query) -> Result<Vec<Record>>;

    /// 执行带一个参数的命令
    async fn execute(&mut self, command: &str, argument: &str) -> Result<Reply>;
}

/// 根据路由器地址建立设备会话
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn DeviceClient>>;
}
