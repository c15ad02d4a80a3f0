//! # liu-format
//!
//! liu 容器层: I/O 抽象与 MP4/MOV 解封装.
//!
//! 解封装器把容器内的采样重组为基本流形态, 按文件偏移顺序
//! 产出 `(轨道号, 负载字节)` 记录.

pub mod demuxer;
pub mod demuxers;
pub mod io;

// 重导出常用类型
pub use demuxer::{DemuxedData, Demuxer, FileNameIterator, TrackFilter, TrackInfo, TrackKind};
pub use demuxers::mov::MovDemuxer;
pub use io::IoContext;
