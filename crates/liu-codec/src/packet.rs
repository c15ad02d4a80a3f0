//! 压缩数据包 (Packet).
//!
//! 解封装器/基本流读取器产出的一帧压缩数据, 供 TS 打包器消费.

use bytes::Bytes;

/// 压缩数据包
///
/// 输出记录为 `(track_id, payload, flags)` 三元组, 外加时间戳与关键帧标记.
/// `track_id` 对外从 1 开始编号.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (90 kHz)
    pub pts: i64,
    /// 解码时间戳 (90 kHz)
    pub dts: i64,
    /// 所属轨道编号 (1-based)
    pub track_id: u32,
    /// 是否为关键帧 (IRAP)
    pub is_keyframe: bool,
    /// 标志位
    pub flags: u32,
}

impl Packet {
    /// 本 GOP 内已包含参数集, 打包器无需再插入 VPS/SPS/PPS
    pub const FLAG_SPS_PPS_IN_GOP: u32 = 0x01;

    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: 0,
            dts: 0,
            track_id: 0,
            is_keyframe: false,
            flags: 0,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
