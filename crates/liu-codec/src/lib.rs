//! # liu-codec
//!
//! liu 编解码层: 压缩数据包类型, 编解码器标识, 以及 HEVC
//! 基本流的 NAL 级解析 (访问单元检测, 时序推导, TS 描述符参数).

pub mod codec_id;
pub mod hevc;
pub mod packet;

// 重导出常用类型
pub use codec_id::CodecId;
pub use packet::Packet;
