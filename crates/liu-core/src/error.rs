//! 统一错误类型定义.
//!
//! 所有 liu crate 共用的错误类型, 覆盖容器解析和基本流解析的失败面.

use thiserror::Error;

/// liu 统一错误类型
#[derive(Debug, Error)]
pub enum LiuError {
    /// MP4/MOV 容器解析错误
    #[error("MP4/MOV 解析错误: {0}")]
    MovParse(String),

    /// HEVC 基本流解析错误
    #[error("HEVC 解析错误: {0}")]
    HevcParse(String),

    /// 目标缓冲区容量不足
    #[error("目标缓冲区容量不足")]
    BufferTooSmall,

    /// 工作缓冲区内数据不完整, 无法继续解析
    #[error("工作缓冲区内数据不完整")]
    NotEnoughBuffer,

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无法打开输入流
    #[error("无法打开输入流: {0}")]
    FileNotFound(String),

    /// 不支持的特性
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// liu 统一 Result 类型
pub type LiuResult<T> = Result<T, LiuError>;
