//! 队列规则字段解码
//!
//! 从 `comment` 中解析客户/节点编号，从 `target` 中解析 IPv4 地址，
//! 从 `bytes` 中解析 "上传/下载" 字节计数。
//! 解码从不失败：无法解析的字段取 0，并附带诊断信息交给调用方处理。

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// 解码结果：值 + 诊断
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub diagnostics: Vec<DecodeError>,
}

impl<T> Decoded<T> {
    fn new(value: T, diagnostics: Vec<DecodeError>) -> Self {
        Self { value, diagnostics }
    }
}

/// 字节计数的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterSide {
    Upload,
    Download,
}

impl fmt::Display for CounterSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterSide::Upload => write!(f, "upload"),
            CounterSide::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("comment 中缺少 ':' 分隔符")]
    MissingSeparator,

    #[error("无法将客户编号 {0:?} 转换为整数")]
    InvalidCustomerId(String),

    #[error("无法将节点编号 {0:?} 转换为整数")]
    InvalidNodeId(String),

    #[error("节点编号之后缺少空格")]
    MissingNodeTerminator,

    #[error("无法将 {0:?} 解析为网段")]
    InvalidCidr(String),

    #[error("{0:?} 不是 IPv4 地址")]
    NotIpv4(String),

    #[error("缺少 {0} 计数")]
    MissingCounter(CounterSide),

    #[error("无法将 {side} 计数 {input:?} 转换为整数")]
    InvalidCounter { side: CounterSide, input: String },
}

/// comment 中编码的身份信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsedIdentity {
    pub customer_id: i64,
    pub node_id: i64,
}

/// 上传/下载字节计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub upload: u64,
    pub download: u64,
}

impl ByteCounters {
    pub fn is_zero(&self) -> bool {
        self.upload == 0 && self.download == 0
    }
}

/// 解析 `"<customerId>:<nodeId> <备注>"` 格式的 comment
///
/// 第一个 ':' 之前是客户编号；':' 之后到下一个空格之间是节点编号。
/// 没有 ':' 时客户编号为 0，节点编号取 comment 开头到第一个空格之间的内容；
/// 节点编号之后没有空格时节点编号为 0。
pub fn parse_identity(comment: &str) -> Decoded<ParsedIdentity> {
    let mut identity = ParsedIdentity::default();
    let mut diagnostics = Vec::new();

    let width = match comment.find(':') {
        Some(colon) => {
            let customer = &comment[..colon];
            match customer.parse::<i64>() {
                Ok(id) => identity.customer_id = id,
                Err(_) => diagnostics.push(DecodeError::InvalidCustomerId(customer.to_string())),
            }
            colon + 1
        }
        None => {
            diagnostics.push(DecodeError::MissingSeparator);
            0
        }
    };

    match comment[width..].find(' ') {
        Some(offset) => {
            let node = &comment[width..width + offset];
            match node.parse::<i64>() {
                Ok(id) => identity.node_id = id,
                Err(_) => diagnostics.push(DecodeError::InvalidNodeId(node.to_string())),
            }
        }
        None => diagnostics.push(DecodeError::MissingNodeTerminator),
    }

    Decoded::new(identity, diagnostics)
}

/// 将 CIDR 字符串中的 IPv4 地址按大端序转换为 u32
///
/// 返回的是地址本身而不是网络号，`10.0.0.5/24` 得到 `10.0.0.5`。
/// 输入不做去空白处理，前缀长度只接受十进制数字。
pub fn decode_address(cidr: &str) -> Decoded<u32> {
    let invalid = || Decoded::new(0, vec![DecodeError::InvalidCidr(cidr.to_string())]);

    let Some((addr, prefix)) = cidr.split_once('/') else {
        return invalid();
    };
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return invalid();
    }
    let Ok(ip) = addr.parse::<IpAddr>() else {
        return invalid();
    };
    let max_prefix = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    match prefix.parse::<u8>() {
        Ok(bits) if bits <= max_prefix => {}
        _ => return invalid(),
    }

    let v4: Option<Ipv4Addr> = match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    };
    match v4 {
        Some(v4) => Decoded::new(u32::from_be_bytes(v4.octets()), Vec::new()),
        None => Decoded::new(0, vec![DecodeError::NotIpv4(cidr.to_string())]),
    }
}

/// 解析 `"upload/download"` 格式的字节计数
///
/// 缺少的一侧取 0，第二个 '/' 之后的内容被忽略。
pub fn decode_byte_pair(pair: &str) -> Decoded<ByteCounters> {
    let mut counters = ByteCounters::default();
    let mut diagnostics = Vec::new();
    let mut segments = pair.split('/');

    counters.upload = decode_counter(segments.next(), CounterSide::Upload, &mut diagnostics);
    counters.download = decode_counter(segments.next(), CounterSide::Download, &mut diagnostics);

    Decoded::new(counters, diagnostics)
}

fn decode_counter(
    segment: Option<&str>,
    side: CounterSide,
    diagnostics: &mut Vec<DecodeError>,
) -> u64 {
    match segment {
        None | Some("") => {
            diagnostics.push(DecodeError::MissingCounter(side));
            0
        }
        Some(text) => text.parse::<u64>().unwrap_or_else(|_| {
            diagnostics.push(DecodeError::InvalidCounter {
                side,
                input: text.to_string(),
            });
            0
        }),
    }
}
