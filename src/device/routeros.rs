//! RouterOS API 客户端
//!
//! 协议以"词"为单位传输：每个词带一个 1~5 字节的长度前缀，
//! 若干个词组成一个句子，句子以长度为 0 的词结束。
//! 设备以 `!re` 返回记录，`!done` 结束响应，`!trap` 表示命令失败，`!fatal` 表示会话被关闭。
//! RouterOS 7.18 起，没有结果的查询会在 `!done` 之前返回 `!empty`。

use super::{DeviceClient, DeviceConnector, Query, Record, Reply};
use crate::config::DeviceConfig;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("网络 I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("请求超时")]
    Timeout,

    #[error("登录失败: {0}")]
    Login(String),

    #[error("设备返回错误: {0}")]
    Trap(String),

    #[error("设备关闭了会话: {0}")]
    Fatal(String),

    #[error("协议错误: {0}")]
    Protocol(String),

    #[error("会话已中断，需要重新连接")]
    Broken,
}

/// 单个词允许的最大长度
const MAX_WORD_LEN: u32 = 16 * 1024 * 1024;

/// 编码词长度前缀
pub fn encode_length(len: u32) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        ((len | 0x8000) as u16).to_be_bytes().to_vec()
    } else if len < 0x20_0000 {
        (len | 0xC0_0000).to_be_bytes()[1..].to_vec()
    } else if len < 0x1000_0000 {
        (len | 0xE000_0000).to_be_bytes().to_vec()
    } else {
        let mut bytes = vec![0xF0];
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes
    }
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, DeviceError> {
    let first = reader.read_u8().await?;

    let len = if first & 0x80 == 0x00 {
        u32::from(first)
    } else if first & 0xC0 == 0x80 {
        let next = reader.read_u8().await?;
        (u32::from(first & 0x3F) << 8) | u32::from(next)
    } else if first & 0xE0 == 0xC0 {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await?;
        (u32::from(first & 0x1F) << 16) | (u32::from(buf[0]) << 8) | u32::from(buf[1])
    } else if first & 0xF0 == 0xE0 {
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).await?;
        (u32::from(first & 0x0F) << 24)
            | (u32::from(buf[0]) << 16)
            | (u32::from(buf[1]) << 8)
            | u32::from(buf[2])
    } else if first == 0xF0 {
        reader.read_u32().await?
    } else {
        return Err(DeviceError::Protocol(format!("无效的长度前缀: {:#04x}", first)));
    };

    Ok(len)
}

/// 读取一个完整句子（不含结尾的空词）
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>, DeviceError> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(DeviceError::Protocol(format!("词长度超出限制: {}", len)));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        // comment 可能不是 UTF-8 编码
        words.push(String::from_utf8_lossy(&buf).into_owned());
    }
}

/// 写入一个句子并追加结尾的空词
pub async fn write_sentence<W: AsyncWrite + Unpin>(writer: &mut W, words: &[String]) -> Result<(), DeviceError> {
    let mut buf = Vec::new();
    for word in words {
        let len = u32::try_from(word.len())
            .map_err(|_| DeviceError::Protocol(format!("词长度超出限制: {}", word.len())))?;
        buf.extend_from_slice(&encode_length(len));
        buf.extend_from_slice(word.as_bytes());
    }
    buf.push(0);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

fn parse_attributes(words: &[String]) -> Record {
    words
        .iter()
        .filter_map(|word| word.strip_prefix('='))
        .filter_map(|attr| attr.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// 单个 RouterOS 设备的 API 会话
pub struct RouterOsClient<S> {
    stream: S,
    timeout: Duration,
    /// 流中可能残留未读完的响应，之后的请求一律拒绝
    broken: bool,
}

impl RouterOsClient<TcpStream> {
    /// 建立 TCP 连接并登录
    ///
    /// `address` 带端口时直接使用，否则使用配置中的 API 端口。
    pub async fn connect(address: &str, config: &DeviceConfig) -> Result<Self, DeviceError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let connecting = async {
            match address.parse::<SocketAddr>() {
                Ok(addr) => TcpStream::connect(addr).await,
                Err(_) => TcpStream::connect((address, config.port)).await,
            }
        };
        let stream = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| DeviceError::Timeout)??;

        let mut client = Self::new(stream, timeout);
        client.login(&config.username, &config.password).await?;
        Ok(client)
    }
}

impl<S> RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            broken: false,
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), DeviceError> {
        let words = vec![
            "/login".to_string(),
            format!("=name={}", username),
            format!("=password={}", password),
        ];

        match self.talk(words).await {
            Ok(reply) if reply.done.contains_key("ret") => Err(DeviceError::Login(
                "设备要求 challenge 登录（RouterOS 6.43 之前的版本），暂不支持".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(DeviceError::Trap(message)) => Err(DeviceError::Login(message)),
            Err(e) => Err(e),
        }
    }

    /// 发送一个句子并读取完整响应，整个过程受超时限制
    ///
    /// 超时、I/O 错误、协议错误或 `!fatal` 之后会话失效，后续请求直接返回 `Broken`。
    pub async fn talk(&mut self, words: Vec<String>) -> Result<Reply, DeviceError> {
        if self.broken {
            return Err(DeviceError::Broken);
        }

        let timeout = self.timeout;
        let result = match tokio::time::timeout(timeout, self.exchange(&words)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout),
        };
        if matches!(
            result,
            Err(DeviceError::Timeout | DeviceError::Io(_) | DeviceError::Protocol(_) | DeviceError::Fatal(_))
        ) {
            self.broken = true;
        }
        result
    }

    async fn exchange(&mut self, words: &[String]) -> Result<Reply, DeviceError> {
        write_sentence(&mut self.stream, words).await?;

        let mut reply = Reply::default();
        let mut trap: Option<String> = None;
        loop {
            let sentence = read_sentence(&mut self.stream).await?;
            let Some((kind, rest)) = sentence.split_first() else {
                continue;
            };
            match kind.as_str() {
                "!re" => reply.records.push(parse_attributes(rest)),
                "!done" => {
                    reply.done = parse_attributes(rest);
                    break;
                }
                "!trap" => {
                    let attributes = parse_attributes(rest);
                    trap.get_or_insert(attributes.get("message").cloned().unwrap_or_default());
                }
                "!fatal" => return Err(DeviceError::Fatal(rest.join(" "))),
                "!empty" => {}
                other => {
                    return Err(DeviceError::Protocol(format!("未知的响应类型: {}", other)));
                }
            }
        }

        match trap {
            Some(message) => Err(DeviceError::Trap(message)),
            None => Ok(reply),
        }
    }
}

#[async_trait]
impl<S> DeviceClient for RouterOsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn execute_entity(&mut self, command: &str, query: &Query) -> anyhow::Result<Vec<Record>> {
        let reply = self.talk(query.words(command)).await?;
        Ok(reply.records)
    }

    async fn execute(&mut self, command: &str, argument: &str) -> anyhow::Result<Reply> {
        let mut words = vec![command.to_string()];
        if !argument.is_empty() {
            words.push(argument.to_string());
        }
        Ok(self.talk(words).await?)
    }
}

/// 使用统一凭据连接各路由器
pub struct RouterOsConnector {
    config: DeviceConfig,
}

impl RouterOsConnector {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceConnector for RouterOsConnector {
    async fn connect(&self, address: &str) -> anyhow::Result<Box<dyn DeviceClient>> {
        let client = RouterOsClient::connect(address, &self.config).await?;
        debug!("已登录 RouterOS 设备: {}", address);
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{queue_stats_query, RESET_COUNTERS_COMMAND};

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_length_prefix() {
        let cases: [(u32, &[u8]); 7] = [
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x3FFF, &[0xBF, 0xFF]),
            (0x4000, &[0xC0, 0x40, 0x00]),
            (0x20_0000, &[0xE0, 0x20, 0x00, 0x00]),
            (0x0FFF_FFFF, &[0xEF, 0xFF, 0xFF, 0xFF]),
            (0x1000_0000, &[0xF0, 0x10, 0x00, 0x00, 0x00]),
        ];

        for (len, expected) in cases {
            assert_eq!(encode_length(len), expected, "len = {:#x}", len);
            let mut reader = expected;
            assert_eq!(read_length(&mut reader).await.unwrap(), len);
        }

        let mut reader: &[u8] = &[0xF8];
        assert!(matches!(read_length(&mut reader).await, Err(DeviceError::Protocol(_))));

        // 超长的词在分配缓冲区之前被拒绝
        let mut reader: &[u8] = &[0xF0, 0x7F, 0xFF, 0xFF, 0xFF];
        assert!(matches!(read_sentence(&mut reader).await, Err(DeviceError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_print_and_reset_over_api() {
        let (client_side, mut device_side) = tokio::io::duplex(4096);

        let device = tokio::spawn(async move {
            let login = read_sentence(&mut device_side).await.unwrap();
            assert_eq!(login, vec!["/login", "=name=api", "=password=secret"]);
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();

            let print = read_sentence(&mut device_side).await.unwrap();
            assert_eq!(print[0], "/queue/simple/print");
            assert_eq!(print[1], "=stats=");
            write_sentence(
                &mut device_side,
                &words(&["!re", "=.id=*1", "=bytes=500/300", "=comment=42:7 a=b"]),
            )
            .await
            .unwrap();
            write_sentence(&mut device_side, &words(&["!re", "=.id=*2", "=bytes=0/0"]))
                .await
                .unwrap();
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();

            let reset = read_sentence(&mut device_side).await.unwrap();
            assert_eq!(reset, vec![RESET_COUNTERS_COMMAND, "=.id=*1"]);
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();

            let reset = read_sentence(&mut device_side).await.unwrap();
            assert_eq!(reset, vec![RESET_COUNTERS_COMMAND, "=.id=*9"]);
            write_sentence(&mut device_side, &words(&["!trap", "=message=no such item"]))
                .await
                .unwrap();
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();
        });

        let mut client = RouterOsClient::new(client_side, Duration::from_secs(5));
        client.login("api", "secret").await.unwrap();

        let records = client.execute_entity("print", &queue_stats_query()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0][".id"], "*1");
        assert_eq!(records[0]["bytes"], "500/300");
        assert_eq!(records[0]["comment"], "42:7 a=b");
        assert_eq!(records[1][".id"], "*2");

        client.execute(RESET_COUNTERS_COMMAND, "=.id=*1").await.unwrap();

        let err = client.execute(RESET_COUNTERS_COMMAND, "=.id=*9").await.unwrap_err();
        assert!(err.to_string().contains("no such item"));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_print() {
        let (client_side, mut device_side) = tokio::io::duplex(1024);

        let device = tokio::spawn(async move {
            read_sentence(&mut device_side).await.unwrap();
            write_sentence(&mut device_side, &words(&["!empty"])).await.unwrap();
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();
        });

        let mut client = RouterOsClient::new(client_side, Duration::from_secs(5));
        let records = client.execute_entity("print", &queue_stats_query()).await.unwrap();
        assert!(records.is_empty());

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_late_reply_after_timeout() {
        let (client_side, mut device_side) = tokio::io::duplex(1024);

        let device = tokio::spawn(async move {
            let reset = read_sentence(&mut device_side).await.unwrap();
            assert_eq!(reset, vec![RESET_COUNTERS_COMMAND, "=.id=*1"]);
            tokio::time::sleep(Duration::from_millis(150)).await;
            write_sentence(&mut device_side, &words(&["!trap", "=message=late reply for first"]))
                .await
                .unwrap();
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();
        });

        let mut client = RouterOsClient::new(client_side, Duration::from_millis(50));
        let err = client.execute(RESET_COUNTERS_COMMAND, "=.id=*1").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DeviceError>(), Some(DeviceError::Timeout)));

        // 迟到的响应不能被当作下一条命令的结果
        let err = client.execute(RESET_COUNTERS_COMMAND, "=.id=*2").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DeviceError>(), Some(DeviceError::Broken)));
        assert!(!err.to_string().contains("late reply"));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (client_side, mut device_side) = tokio::io::duplex(1024);

        let device = tokio::spawn(async move {
            read_sentence(&mut device_side).await.unwrap();
            write_sentence(
                &mut device_side,
                &words(&["!trap", "=message=invalid user name or password"]),
            )
            .await
            .unwrap();
            write_sentence(&mut device_side, &words(&["!done"])).await.unwrap();
        });

        let mut client = RouterOsClient::new(client_side, Duration::from_secs(5));
        let err = client.login("api", "wrong").await.unwrap_err();
        assert!(matches!(err, DeviceError::Login(ref m) if m.contains("invalid user name")));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_fatal_and_timeout() {
        let (client_side, _device_side) = tokio::io::duplex(1024);
        let mut client = RouterOsClient::new(client_side, Duration::from_millis(50));

        // 设备不响应
        let err = client.talk(words(&["/system/resource/print"])).await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout));

        let (client_side, mut fatal_side) = tokio::io::duplex(1024);
        let device = tokio::spawn(async move {
            read_sentence(&mut fatal_side).await.unwrap();
            write_sentence(&mut fatal_side, &words(&["!fatal", "session terminated"]))
                .await
                .unwrap();
        });
        let mut client = RouterOsClient::new(client_side, Duration::from_secs(5));
        let err = client.talk(words(&["/quit"])).await.unwrap_err();
        assert!(matches!(err, DeviceError::Fatal(ref m) if m == "session terminated"));

        device.await.unwrap();
    }
}
