//! HEVC 基本流读取器.
//!
//! 对 Annex B 码流做前向扫描, 检测访问单元 (AU) 边界, 维护
//! POC/DTS/PTS 时间轴, 并在帧率被外部覆盖时原位改写 VPS.
//!
//! 读取器持有一个容量受限的工作缓冲区, 调用方通过 `feed` 注入数据,
//! 通过 `next_access_unit` 逐帧取出; 缓冲区尾部数据不足时返回
//! `NotEnoughBuffer`/`NeedMoreData`, 调用方补充数据后重试.

use bytes::Bytes;
use liu_core::{BitWriter, LiuError, LiuResult};
use log::{debug, info};

use super::descriptor;
use super::nal::{
    self, NAL_BLA_W_LP, NAL_DVEL, NAL_DVRPU, NAL_FD_NUT, NAL_AUD, NAL_PPS, NAL_RASL_R,
    NAL_RSV_IRAP_VCL23, NAL_RSV_NVCL45, NAL_RSV_NVCL47, NAL_SEI_PREFIX, NAL_SEI_SUFFIX, NAL_SPS,
    NAL_TRAIL_N, NAL_UNSPEC56, NAL_VPS,
};
use super::units::{HevcHdrUnit, HevcPpsUnit, HevcSliceHeader, HevcSpsUnit, HevcVpsUnit};
use crate::codec_id::CodecId;
use crate::packet::Packet;

/// 工作缓冲区容量上限
pub const TMP_BUFFER_SIZE: usize = 4 * 1024 * 1024;
/// 片头解析所需的最大字节数
const MAX_SLICE_HEADER: usize = 64;
/// 内部时钟频率 (90 kHz)
const INTERNAL_CLOCK_FREQ: f64 = 90000.0;

/// 码流探测结果
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// 识别出的编解码器 (`None` 表示探测失败)
    pub codec: CodecId,
    /// 人类可读的流描述
    pub description: String,
}

impl CheckResult {
    /// 是否探测成功
    pub fn is_valid(&self) -> bool {
        self.codec != CodecId::None
    }
}

/// HEVC 基本流读取器
pub struct HevcStreamReader {
    /// 工作缓冲区 (容量受 `TMP_BUFFER_SIZE` 限制)
    buffer: Vec<u8>,
    /// 输入已结束
    eof: bool,

    // 参数集缓存
    vps: Option<HevcVpsUnit>,
    sps: Option<HevcSpsUnit>,
    pps: Option<HevcPpsUnit>,
    hdr: HevcHdrUnit,
    /// 参数集原始字节 (供跨文件插入)
    vps_buffer: Vec<u8>,
    sps_buffer: Vec<u8>,
    pps_buffer: Vec<u8>,

    // 帧率与时钟
    fps: f64,
    fps_override: Option<f64>,
    pcr_inc_per_frame: i64,
    cur_dts: i64,
    cur_pts: i64,

    // 帧计数与 POC 状态
    total_frame_num: u64,
    frame_num: i64,
    full_pic_order: i64,
    frame_depth: i64,
    pic_order_msb: i64,
    prev_pic_order: i64,
    pic_order_base: i64,

    first_frame: bool,
    last_i_frame: bool,
    sps_pps_found: bool,
    first_file_frame: bool,
    short_start_codes: bool,
    vps_size_diff: i64,

    // Dolby Vision 轨道布局 (由宿主设置)
    dv_el_track: bool,
    four_k: bool,
}

impl Default for HevcStreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl HevcStreamReader {
    /// 创建读取器
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            eof: false,
            vps: None,
            sps: None,
            pps: None,
            hdr: HevcHdrUnit::default(),
            vps_buffer: Vec::new(),
            sps_buffer: Vec::new(),
            pps_buffer: Vec::new(),
            fps: 0.0,
            fps_override: None,
            pcr_inc_per_frame: 0,
            cur_dts: 0,
            cur_pts: 0,
            total_frame_num: 0,
            frame_num: 0,
            full_pic_order: 0,
            frame_depth: 1,
            pic_order_msb: 0,
            prev_pic_order: 0,
            pic_order_base: 0,
            first_frame: true,
            last_i_frame: false,
            sps_pps_found: false,
            first_file_frame: true,
            short_start_codes: false,
            vps_size_diff: 0,
            dv_el_track: false,
            four_k: false,
        }
    }

    /// 注入输入数据
    ///
    /// 超出工作缓冲区容量时返回 `BufferTooSmall`.
    pub fn feed(&mut self, data: &[u8]) -> LiuResult<()> {
        if self.buffer.len() + data.len() > TMP_BUFFER_SIZE {
            return Err(LiuError::BufferTooSmall);
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// 标记输入结束
    pub fn set_eof(&mut self) {
        self.eof = true;
    }

    /// 外部覆盖帧率 (触发 VPS 原位改写)
    pub fn set_fps_override(&mut self, fps: f64) {
        self.fps_override = Some(fps);
    }

    /// 设置 Dolby Vision 轨道布局: 当前轨道是否为独立 EL 轨道, 以及是否 4K
    pub fn set_dv_layout(&mut self, el_track: bool, four_k: bool) {
        self.dv_el_track = el_track;
        self.four_k = four_k;
    }

    /// 播放列表切换到新文件: 下一帧前重新插入参数集
    pub fn set_new_file(&mut self) {
        self.first_file_frame = true;
    }

    /// 当前有效帧率 (覆盖值或码流值)
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// 最近一次 VPS 改写造成的长度差 (字节)
    pub fn vps_size_diff(&self) -> i64 {
        self.vps_size_diff
    }

    /// 码流宽度 (SPS 未知时为 0)
    pub fn stream_width(&self) -> u32 {
        self.sps
            .as_ref()
            .map_or(0, |s| s.pic_width_in_luma_samples)
    }

    /// 码流高度 (SPS 未知时为 0)
    pub fn stream_height(&self) -> u32 {
        self.sps
            .as_ref()
            .map_or(0, |s| s.pic_height_in_luma_samples)
    }

    /// HDR 种类: 4 = Dolby Vision, 16 = HDR10+, 2 = HDR10, 1 = SDR
    pub fn stream_hdr(&self) -> u32 {
        if self.hdr.is_dv_rpu || self.hdr.is_dv_el {
            4
        } else if self.hdr.is_hdr10plus {
            16
        } else if self.hdr.is_hdr10 {
            2
        } else {
            1
        }
    }

    /// HDR 描述符 (探测后有效)
    pub fn hdr_info(&self) -> &HevcHdrUnit {
        &self.hdr
    }

    // ========================
    // 码流探测
    // ========================

    /// 尽力探测: 扫描缓冲区内所有 NAL, 填充参数集与 HDR 状态
    ///
    /// 返回空结果表示码流不完整或非法. 末尾恰为 4 字节的 NAL
    /// 不参与探测 (沿用既有扫描边界).
    pub fn check_stream(&mut self, buffer: &[u8]) -> CheckResult {
        let rez = CheckResult::default();
        let end = buffer.len();

        let mut nal_pos = nal::find_next_nal(buffer, 0);
        while nal_pos + 4 < end {
            if buffer[nal_pos] & 0x80 != 0 {
                return rez; // 非法 NAL
            }
            let nal_type = nal::nal_type(buffer[nal_pos]);
            let next = nal::find_nal_with_start_code(buffer, nal_pos, true);
            let data = &buffer[nal_pos..next];

            match nal_type {
                NAL_VPS => {
                    let mut vps = HevcVpsUnit::default();
                    if vps.decode_buffer(data).is_err() || vps.deserialize().is_err() {
                        return rez;
                    }
                    self.sps_pps_found = true;
                    let stream_fps = vps.fps();
                    let has_timing = vps.num_units_in_tick > 0;
                    self.vps = Some(vps);
                    if has_timing {
                        self.update_fps(stream_fps);
                    }
                }
                NAL_SPS => {
                    let mut sps = HevcSpsUnit::default();
                    if sps.decode_buffer(data).is_err() || sps.deserialize().is_err() {
                        return rez;
                    }
                    self.sps_pps_found = true;
                    let stream_fps = sps.fps();
                    self.sps = Some(sps);
                    self.update_fps(stream_fps);
                }
                NAL_PPS => {
                    let mut pps = HevcPpsUnit::default();
                    if pps.decode_buffer(data).is_err() || pps.deserialize().is_err() {
                        return rez;
                    }
                    self.pps = Some(pps);
                }
                NAL_SEI_PREFIX => {
                    if self.hdr.decode_buffer(data).is_err() || self.hdr.deserialize().is_err() {
                        return rez;
                    }
                }
                NAL_DVRPU | NAL_DVEL => {
                    if data.len() > 1 && data[1] == 1 {
                        if nal_type == NAL_DVEL {
                            self.hdr.is_dv_el = true;
                        } else {
                            self.hdr.is_dv_rpu = true;
                        }
                    }
                }
                _ => {}
            }

            nal_pos = nal::find_next_nal(buffer, nal_pos);
        }

        self.finish_check()
    }

    /// 交叉校验参数集, 推导 DV 兼容性, 生成探测结果
    fn finish_check(&mut self) -> CheckResult {
        let mut rez = CheckResult::default();
        let (Some(vps), Some(sps), Some(pps)) = (&self.vps, &self.sps, &self.pps) else {
            return rez;
        };
        if sps.vps_id != vps.vps_id || pps.sps_id != sps.sps_id {
            return rez;
        }

        let cp = sps.colour_primaries;
        let tc = sps.transfer_characteristics;
        let mc = sps.matrix_coeffs;
        let cslt = sps.chroma_sample_loc_type_top_field;

        // 参见 "Dolby Vision Profiles and Levels" 兼容性表
        if cp == 9 && tc == 16 && mc == 9 {
            // BT.2100 PQ
            self.hdr.is_hdr10 = true;
            if cslt == 2 {
                self.hdr.dv_compatibility = 6;
            } else if cslt == 0 {
                self.hdr.dv_compatibility = 1;
            }
        } else if cp == 9 && tc == 18 && mc == 9 && cslt == 2 {
            // ARIB HLG
            self.hdr.dv_compatibility = 4;
        } else if cp == 9 && tc == 14 && mc == 9 && cslt == 0 {
            // DVB HLG
            self.hdr.dv_compatibility = 4;
        } else if cp == 1 && tc == 1 && mc == 1 && cslt == 0 {
            // SDR
            self.hdr.dv_compatibility = 2;
        } else if cp == 2 && tc == 2 && mc == 2 && cslt == 0 {
            // 未指定
            self.hdr.dv_compatibility = if self.hdr.is_dv_el { 2 } else { 0 };
        }

        rez.codec = CodecId::H265;
        rez.description = sps.description();
        if sps.num_units_in_tick == 0 {
            rez.description.push_str(", ");
            rez.description.push_str(&vps.description());
        }
        rez
    }

    // ========================
    // 访问单元提取
    // ========================

    /// 取出下一个访问单元
    ///
    /// - `Err(NotEnoughBuffer)` / `Err(NeedMoreData)`: 先 `feed` 更多数据
    /// - `Err(Eof)`: 码流已完整消费
    pub fn next_access_unit(&mut self) -> LiuResult<Packet> {
        if self.buffer.is_empty() {
            return Err(if self.eof {
                LiuError::Eof
            } else {
                LiuError::NeedMoreData
            });
        }

        let end_pos = self.decode_access_unit()?;
        if end_pos == 0 {
            return Err(LiuError::Eof);
        }

        let mut payload: Vec<u8> = self.buffer.drain(..end_pos).collect();

        let mut flags = 0u32;
        if self.sps_pps_found {
            flags |= Packet::FLAG_SPS_PPS_IN_GOP;
        }
        if self.first_file_frame && flags & Packet::FLAG_SPS_PPS_IN_GOP == 0 {
            self.insert_parameter_sets(&mut payload);
            flags |= Packet::FLAG_SPS_PPS_IN_GOP;
        }
        self.first_file_frame = false;

        Ok(Packet {
            data: Bytes::from(payload),
            pts: self.cur_pts,
            dts: self.cur_dts,
            track_id: 1,
            is_keyframe: self.last_i_frame,
            flags,
        })
    }

    /// 前向扫描, 返回当前 AU 的结束位置 (下一帧起始码的偏移)
    fn decode_access_unit(&mut self) -> LiuResult<usize> {
        self.sps_pps_found = false;
        self.last_i_frame = false;
        let mut slice_found = false;

        let mut cur_pos = nal::find_next_nal(&self.buffer, 0);
        let mut next_nal = nal::find_next_nal(&self.buffer, cur_pos);
        if !self.eof && next_nal == self.buffer.len() {
            return Err(LiuError::NotEnoughBuffer);
        }

        while cur_pos < self.buffer.len() {
            let nal_type = nal::nal_type(self.buffer[cur_pos]);

            if self.is_slice(nal_type) {
                // 首片标志位于片头第一个负载位
                if cur_pos + 2 < self.buffer.len() && self.buffer[cur_pos + 2] & 0x80 != 0 {
                    if slice_found {
                        // 下一帧的首片: AU 在前一个 NAL 边界处结束
                        self.inc_timings();
                        return Ok(start_code_pos(&self.buffer, cur_pos));
                    }
                    // 当前帧首片: 解析片头, 推导完整 POC
                    let slice_end = (cur_pos + MAX_SLICE_HEADER).min(next_nal);
                    let pic_bits;
                    let slice = {
                        let (Some(sps), Some(pps)) = (self.sps.as_ref(), self.pps.as_ref())
                        else {
                            return Err(LiuError::HevcParse("片头解析缺少参数集".into()));
                        };
                        pic_bits = sps.log2_max_pic_order_cnt_lsb;
                        let mut s = HevcSliceHeader::default();
                        s.decode_buffer(&self.buffer[cur_pos..slice_end])?;
                        s.deserialize(sps, pps)?;
                        s
                    };
                    if nal_type >= NAL_BLA_W_LP {
                        self.last_i_frame = true;
                    }
                    self.full_pic_order = self.to_full_pic_order(&slice, pic_bits);
                }
                slice_found = true;
            } else if !self.is_suffix(nal_type) {
                // 帧后的第一个前缀 NAL (AUD, SEI, 参数集...) 同样结束 AU
                if slice_found {
                    self.inc_timings();
                    return Ok(start_code_pos(&self.buffer, cur_pos));
                }

                let next_with_code = if next_nal == self.buffer.len() {
                    next_nal
                } else {
                    start_code_pos(&self.buffer, next_nal)
                };

                match nal_type {
                    NAL_VPS => {
                        let mut vps = HevcVpsUnit::default();
                        vps.decode_buffer(&self.buffer[cur_pos..next_with_code])?;
                        vps.deserialize()?;
                        self.sps_pps_found = true;
                        self.vps_size_diff = 0;
                        let stream_fps = vps.fps();
                        let has_timing = vps.num_units_in_tick > 0;
                        self.vps = Some(vps);
                        let mut vps_end = next_with_code;
                        if has_timing {
                            self.update_fps(stream_fps);
                            if self.fps_override.is_some() {
                                let diff = self.rewrite_vps(cur_pos, next_with_code)?;
                                self.vps_size_diff = diff;
                                vps_end = (next_with_code as i64 + diff) as usize;
                                next_nal = (next_nal as i64 + diff) as usize;
                            }
                        }
                        store_buffer(&mut self.vps_buffer, &self.buffer[cur_pos..vps_end]);
                    }
                    NAL_SPS => {
                        let mut sps = HevcSpsUnit::default();
                        sps.decode_buffer(&self.buffer[cur_pos..next_with_code])?;
                        sps.deserialize()?;
                        self.sps_pps_found = true;
                        let stream_fps = sps.fps();
                        self.sps = Some(sps);
                        self.update_fps(stream_fps);
                        store_buffer(&mut self.sps_buffer, &self.buffer[cur_pos..next_with_code]);
                    }
                    NAL_PPS => {
                        let mut pps = HevcPpsUnit::default();
                        pps.decode_buffer(&self.buffer[cur_pos..next_with_code])?;
                        pps.deserialize()?;
                        self.sps_pps_found = true;
                        self.pps = Some(pps);
                        store_buffer(&mut self.pps_buffer, &self.buffer[cur_pos..next_with_code]);
                    }
                    NAL_SEI_PREFIX => {
                        self.hdr.decode_buffer(&self.buffer[cur_pos..next_nal])?;
                        self.hdr.deserialize()?;
                    }
                    _ => {}
                }
            }

            cur_pos = next_nal;
            next_nal = nal::find_next_nal(&self.buffer, cur_pos);
            if !self.eof && next_nal == self.buffer.len() {
                return Err(LiuError::NotEnoughBuffer);
            }
        }

        if self.eof {
            // 未闭合的 AU 在 EOF 时整体作为最后一帧发出
            if slice_found {
                self.inc_timings();
            }
            Ok(self.buffer.len())
        } else {
            Err(LiuError::NeedMoreData)
        }
    }

    /// 是否为片 NAL (参数集未齐时一律视为否)
    fn is_slice(&self, nal_type: u8) -> bool {
        if self.sps.is_none() || self.vps.is_none() || self.pps.is_none() {
            return false;
        }
        (NAL_TRAIL_N..=NAL_RASL_R).contains(&nal_type)
            || (NAL_BLA_W_LP..=NAL_RSV_IRAP_VCL23).contains(&nal_type)
    }

    /// 是否为后缀 NAL (归属前一帧)
    fn is_suffix(&self, nal_type: u8) -> bool {
        if self.sps.is_none() || self.vps.is_none() || self.pps.is_none() {
            return false;
        }
        nal_type == NAL_FD_NUT
            || nal_type == NAL_SEI_SUFFIX
            || (NAL_RSV_NVCL45..=NAL_RSV_NVCL47).contains(&nal_type)
            || (NAL_UNSPEC56..=NAL_DVEL).contains(&nal_type)
    }

    // ========================
    // 时间轴
    // ========================

    /// AU 闭合时推进 DTS/PTS 与帧计数
    fn inc_timings(&mut self) {
        if self.total_frame_num > 0 {
            self.cur_dts += self.pcr_inc_per_frame;
        }
        self.total_frame_num += 1;

        let delta = self.frame_num - self.full_pic_order;
        self.cur_pts = self.cur_dts - delta * self.pcr_inc_per_frame;
        self.frame_num += 1;
        self.first_frame = false;

        if delta > self.frame_depth {
            self.frame_depth = delta.min(4);
            info!(
                "检测到 B 金字塔层级 {}, DTS 前移 {} 帧",
                self.frame_depth - 1,
                self.frame_depth,
            );
        }
    }

    /// POC LSB → 完整 POC
    ///
    /// IDR 帧重置 MSB 并以当前帧号为基准; 其余帧按半程窗口检测回绕.
    /// 用相同片重复调用不推进状态.
    fn to_full_pic_order(&mut self, slice: &HevcSliceHeader, pic_bits: u32) -> i64 {
        if slice.is_idr() {
            self.pic_order_base = self.frame_num;
            self.pic_order_msb = 0;
            self.prev_pic_order = 0;
        } else {
            let range = 1i64 << pic_bits;
            let lsb = i64::from(slice.pic_order_cnt_lsb);

            if lsb < self.prev_pic_order && self.prev_pic_order - lsb >= range / 2 {
                self.pic_order_msb += range;
            } else if lsb > self.prev_pic_order && lsb - self.prev_pic_order >= range / 2 {
                self.pic_order_msb -= range;
            }

            self.prev_pic_order = lsb;
        }

        i64::from(slice.pic_order_cnt_lsb) + self.pic_order_msb + self.pic_order_base
    }

    /// 采纳码流帧率或外部覆盖值, 刷新每帧时钟增量
    fn update_fps(&mut self, stream_fps: f64) {
        if let Some(forced) = self.fps_override {
            self.fps = forced;
        } else if stream_fps != 0.0 {
            self.fps = stream_fps;
        }
        if self.fps > 0.0 {
            self.pcr_inc_per_frame = (INTERNAL_CLOCK_FREQ / self.fps).round() as i64;
        }
    }

    // ========================
    // VPS 原位改写
    // ========================

    /// 以覆盖帧率重写缓冲区中 `[start, old_end)` 处的 VPS
    ///
    /// 长度变化时平移缓冲区尾部, 返回字节差值.
    fn rewrite_vps(&mut self, start: usize, old_end: usize) -> LiuResult<i64> {
        let new_vps = {
            let Some(vps) = self.vps.as_mut() else {
                return Ok(0);
            };
            vps.set_fps(self.fps);
            let mut tmp = vec![0u8; vps.unit.rbsp().len() + 16];
            let n = vps.serialize_buffer(&mut tmp)?;
            tmp.truncate(n);
            tmp
        };

        let old_len = old_end - start;
        let diff = new_vps.len() as i64 - old_len as i64;
        if self.buffer.len() as i64 + diff > TMP_BUFFER_SIZE as i64 {
            return Err(LiuError::BufferTooSmall);
        }
        debug!(
            "按覆盖帧率 {:.3} 重写 VPS, 长度变化 {:+}",
            self.fps, diff,
        );
        self.buffer.splice(start..old_end, new_vps);
        Ok(diff)
    }

    // ========================
    // 参数集插入
    // ========================

    /// 在帧前插入缓存的 VPS/SPS/PPS (保持 AUD 在最前)
    fn insert_parameter_sets(&self, payload: &mut Vec<u8>) {
        let mut ps = Vec::new();
        for buf in [&self.vps_buffer, &self.sps_buffer, &self.pps_buffer] {
            if buf.is_empty() {
                continue;
            }
            if !self.short_start_codes {
                ps.push(0);
            }
            ps.extend_from_slice(&[0, 0, 1]);
            ps.extend_from_slice(buf);
        }
        if ps.is_empty() {
            return;
        }

        let first_nal = nal::find_next_nal(payload, 0);
        if first_nal < payload.len() && nal::nal_type(payload[first_nal]) == NAL_AUD {
            let insert_at = nal::find_nal_with_start_code(payload, first_nal, true);
            payload.splice(insert_at..insert_at, ps);
        } else {
            payload.splice(0..0, ps);
        }
    }

    // ========================
    // TS 描述符
    // ========================

    /// 生成 TS 描述符字节 (HDMV 注册 + 视频格式块, 可选 DOVI 描述符)
    pub fn ts_descriptor(&mut self, bluray_mode: bool) -> Vec<u8> {
        if self.first_frame {
            let buf = std::mem::take(&mut self.buffer);
            self.check_stream(&buf);
            self.buffer = buf;
        }

        let mut out = Vec::with_capacity(16);
        // 'HDMV' 注册描述符
        out.extend_from_slice(&[0x05, 0x08]);
        out.extend_from_slice(b"HDMV");
        out.extend_from_slice(&[0xff, 0x24]);

        let (width, height, interlaced, dar) = match &self.sps {
            Some(sps) => (
                sps.pic_width_in_luma_samples,
                sps.pic_height_in_luma_samples,
                sps.interlaced,
                f64::from(sps.pic_width_in_luma_samples * sps.sar_width)
                    / f64::from(sps.pic_height_in_luma_samples * sps.sar_height).max(1.0),
            ),
            None => (0, 0, false, 16.0 / 9.0),
        };
        let (video_format, frame_rate_index, aspect_ratio_index) =
            descriptor::bluray_stream_params(self.fps, interlaced, width, height, dar);

        out.push((video_format << 4) | frame_rate_index);
        out.push((aspect_ratio_index << 4) | 0x0f);

        if !bluray_mode && (self.hdr.is_dv_el || self.hdr.is_dv_rpu) {
            out.extend_from_slice(&self.dovi_descriptor());
        }

        out
    }

    /// 生成 'DOVI' 注册描述符与 DoVi 描述符 (0xb0)
    fn dovi_descriptor(&mut self) -> Vec<u8> {
        let is_dv_bl = !self.dv_el_track;
        if !is_dv_bl {
            self.hdr.is_dv_el = true;
        }

        let mut width = self.stream_width();
        if !is_dv_bl && self.four_k {
            width *= 2;
        }
        let pixel_rate = f64::from(width) * f64::from(self.stream_height()) * self.fps;
        let level = descriptor::dovi_level(width, pixel_rate);

        let profile: u32 = if self.hdr.is_dv_el {
            if is_dv_bl { 4 } else { 7 }
        } else if matches!(self.hdr.dv_compatibility, 1 | 2 | 4) {
            8
        } else {
            5
        };

        let mut bw = BitWriter::with_capacity(16);
        // 'DOVI' 注册描述符
        bw.write_bits(5, 8);
        bw.write_bits(4, 8);
        bw.write_bits(0x444f5649, 32); // "DOVI"

        bw.write_bits(0xb0, 8); // DoVi 描述符 tag
        bw.write_bits(if is_dv_bl { 5 } else { 7 }, 8); // 长度
        bw.write_bits(1, 8); // dv 主版本
        bw.write_bits(0, 8); // dv 次版本
        bw.write_bits(profile, 7);
        bw.write_bits(u32::from(level), 6);
        bw.write_bits(u32::from(self.hdr.is_dv_rpu), 1); // rpu_present_flag
        bw.write_bits(u32::from(self.hdr.is_dv_el), 1); // el_present_flag
        bw.write_bits(u32::from(is_dv_bl), 1); // bl_present_flag
        if !is_dv_bl {
            bw.write_bits(0x1011, 13); // dependency_pid
            bw.write_bits(7, 3); // reserved
        }
        bw.write_bits(u32::from(self.hdr.dv_compatibility), 4);
        bw.write_bits(15, 4); // reserved

        bw.finish()
    }
}

/// 找到 NAL 头之前的起始码起点
fn start_code_pos(buffer: &[u8], nal_pos: usize) -> usize {
    if nal_pos >= 4 && buffer[nal_pos - 4] == 0 {
        nal_pos - 4
    } else {
        nal_pos - 3
    }
}

/// 存储参数集字节, 去掉尾部零填充
fn store_buffer(dst: &mut Vec<u8>, data: &[u8]) {
    let mut end = data.len();
    while end > 1 && data[end - 1] == 0 {
        end -= 1;
    }
    if end > 0 {
        dst.clear();
        dst.extend_from_slice(&data[..end]);
    }
}
