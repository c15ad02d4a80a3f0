//! 编解码器标识.

use std::fmt;

/// 编解码器标识
///
/// 覆盖 MOV 解封装器能够重组的编解码器, 以及 HEVC 基本流探测结果.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecId {
    /// 未知/未识别
    #[default]
    None,
    /// H.264/AVC
    H264,
    /// H.265/HEVC
    H265,
    /// H.266/VVC
    H266,
    /// AAC (MPEG-4 Audio)
    Aac,
    /// Dolby Digital AC-3
    Ac3,
    /// 3GPP 定时文本字幕
    Tx3g,
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecId::None => "none",
            CodecId::H264 => "h264",
            CodecId::H265 => "hevc",
            CodecId::H266 => "vvc",
            CodecId::Aac => "aac",
            CodecId::Ac3 => "ac3",
            CodecId::Tx3g => "tx3g",
        };
        write!(f, "{}", name)
    }
}
