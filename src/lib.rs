//! # liu (流)
//!
//! 复用工具链核心: MP4/MOV 容器解封装与 HEVC 基本流解析.
//!
//! 两个子系统配合工作:
//! - **MOV 解封装器**: 递归解析 box 树, 按文件偏移顺序输出各轨道的
//!   重组负载 (长度前缀 NAL → Annex B, 裸 AAC → ADTS, 定时文本 → SRT)
//! - **HEVC 流读取器**: 前向扫描基本流, 检测访问单元边界, 推导
//!   POC/DTS/PTS, 并产出 MPEG-TS 描述符所需的 HDR/Dolby Vision 信令
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::collections::HashSet;
//! use liu::format::{Demuxer, MovDemuxer};
//!
//! let mut demuxer = MovDemuxer::new();
//! demuxer.open_file("input.mp4").unwrap();
//! for (id, info) in demuxer.track_list() {
//!     println!("轨道 {}: {:?} [{}]", id, info.kind, info.language);
//! }
//! let mut out = liu::format::DemuxedData::new();
//! let accepted: HashSet<u32> = demuxer.track_list().keys().copied().collect();
//! while demuxer.demux_block(&mut out, &accepted).is_ok() {}
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `liu-core` | 错误类型与比特流读写 |
//! | `liu-codec` | 数据包类型与 HEVC 基本流解析 |
//! | `liu-format` | I/O 抽象与 MP4/MOV 解封装 |

/// 错误类型与比特流读写
pub use liu_core as core;

/// 数据包类型与 HEVC 基本流解析
pub use liu_codec as codec;

/// I/O 抽象与 MP4/MOV 解封装
pub use liu_format as format;

/// 获取 liu 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
