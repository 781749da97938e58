//! `/queue/simple` 规则快照

use crate::device::{Query, Record};

/// RouterOS 简单队列菜单
pub const QUEUE_PATH: &str = "/queue/simple";

/// 清零单条队列计数的命令
pub const RESET_COUNTERS_COMMAND: &str = "/queue/simple/reset-counters";

/// 一条简单队列规则，所有字段保持设备返回的原始文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRule {
    pub id: String,
    pub packets: String,
    /// "upload/download"
    pub bytes: String,
    pub dropped: String,
    pub max_limit: String,
    pub comment: String,
    pub target: String,
}

type FieldSetter = fn(&mut QueueRule, String);

/// 设备属性名到字段的映射表，同时决定查询的 `.proplist`
pub const QUEUE_RULE_FIELDS: &[(&str, FieldSetter)] = &[
    (".id", set_id),
    ("packets", set_packets),
    ("bytes", set_bytes),
    ("dropped", set_dropped),
    ("max-limit", set_max_limit),
    ("comment", set_comment),
    ("target", set_target),
];

fn set_id(rule: &mut QueueRule, value: String) {
    rule.id = value;
}

fn set_packets(rule: &mut QueueRule, value: String) {
    rule.packets = value;
}

fn set_bytes(rule: &mut QueueRule, value: String) {
    rule.bytes = value;
}

fn set_dropped(rule: &mut QueueRule, value: String) {
    rule.dropped = value;
}

fn set_max_limit(rule: &mut QueueRule, value: String) {
    rule.max_limit = value;
}

fn set_comment(rule: &mut QueueRule, value: String) {
    rule.comment = value;
}

fn set_target(rule: &mut QueueRule, value: String) {
    rule.target = value;
}

impl QueueRule {
    /// 按映射表从设备记录构建规则，缺失的属性保持为空字符串
    pub fn from_record(record: &Record) -> Self {
        let mut rule = QueueRule::default();
        for (name, set) in QUEUE_RULE_FIELDS {
            if let Some(value) = record.get(*name) {
                set(&mut rule, value.clone());
            }
        }
        rule
    }

    /// 清零该规则计数所需的参数
    pub fn reset_argument(&self) -> String {
        format!("=.id={}", self.id)
    }
}

/// 带统计信息的队列查询
pub fn queue_stats_query() -> Query {
    Query {
        path: QUEUE_PATH,
        flags: vec!["stats"],
        attributes: QUEUE_RULE_FIELDS.iter().map(|(name, _)| *name).collect(),
    }
}
