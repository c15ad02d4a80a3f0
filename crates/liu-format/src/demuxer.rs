//! 解封装器 (Demuxer) 契约定义.
//!
//! 容器解封装器按块产出 `(轨道号, 负载字节)` 记录, 供 TS 打包器消费.
//! 本模块定义所有容器解封装器共享的接口与协作方类型.

use std::collections::{BTreeMap, HashSet};

use liu_codec::Packet;
use liu_core::LiuResult;

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// 视频
    Video,
    /// 音频
    Audio,
    /// 字幕
    Subtitle,
    /// 控制轨道 (时间码等, 不输出)
    Control,
    /// 未识别数据
    Data,
}

/// 轨道信息
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// 轨道类型
    pub kind: TrackKind,
    /// ISO-639 语言码 (3 字母, 可能为空)
    pub language: String,
}

/// 按轨道号归集的输出字节队列 (轨道号从 1 开始)
pub type DemuxedData = BTreeMap<u32, Vec<u8>>;

/// 解封装器 trait
///
/// 使用流程:
/// 1. `open_file` 打开容器并解析头部
/// 2. `track_list` 获取轨道信息
/// 3. 循环调用 `demux_block` 产出数据, 直到返回 `Eof`
pub trait Demuxer: Send {
    /// 打开输入并解析头部
    fn open_file(&mut self, name: &str) -> LiuResult<()>;

    /// 获取轨道列表 (键为 1-based 轨道号)
    fn track_list(&self) -> BTreeMap<u32, TrackInfo>;

    /// 解出一个数据块
    ///
    /// 被接受的轨道数据追加到 `demuxed` 的对应队列, 其余字节被丢弃.
    /// 返回本次丢弃的字节数; 输入耗尽时返回 `Err(Eof)`.
    fn demux_block(
        &mut self,
        demuxed: &mut DemuxedData,
        accepted: &HashSet<u32>,
    ) -> LiuResult<i64>;

    /// 容器时长 (纳秒, 0 表示未知)
    fn file_duration_nano(&self) -> i64;
}

/// 播放列表文件名迭代器
///
/// 当前文件耗尽时由解封装器调用, 返回下一个文件名.
pub trait FileNameIterator: Send {
    /// 下一个文件名, `None` 表示列表结束
    fn next_name(&mut self) -> Option<String>;
}

/// 轨道侧过滤器
///
/// 挂接在单一轨道上, 对重组后的数据包做二次加工 (如字幕重排).
pub trait TrackFilter: Send {
    /// 处理一个数据包, 返回实际写入输出队列的字节数
    fn demux_packet(
        &mut self,
        demuxed: &mut DemuxedData,
        accepted: &HashSet<u32>,
        packet: &Packet,
    ) -> LiuResult<usize>;
}
