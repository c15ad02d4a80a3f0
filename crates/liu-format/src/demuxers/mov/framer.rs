//! 采样取景器 (Sample Framer).
//!
//! 每条轨道可挂接一个取景策略, 把容器内的原始采样重组为基本流形态:
//! - AAC: 为每帧加 ADTS 头
//! - AVC/HEVC/VVC: 长度前缀 NAL → Annex B 起始码
//! - TX3G: 定时文本 → SRT 片段 (含样式标签)
//!
//! `new_buffer_size` 预先计算输出大小且不产生不可回退的副作用,
//! `extract_data` 写出数据并推进游标.

use liu_codec::hevc::nal::extract_hvcc_nal_units;
use liu_codec::CodecId;
use liu_core::{BitReader, LiuError, LiuResult};

use super::track::SampleTables;

/// 取景器契约
pub trait SampleFramer: Send {
    /// 编解码器私有数据变更时调用
    fn set_priv_data(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<()>;

    /// 计算一个输入块重组后的输出大小 (无不可回退的副作用)
    fn new_buffer_size(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<usize>;

    /// 写出重组数据, 推进内部游标
    fn extract_data(
        &mut self,
        tables: &mut SampleTables,
        dst: &mut Vec<u8>,
        data: &[u8],
    ) -> LiuResult<()>;

    /// esds 中解析出 AAC 配置时调用 (仅音频取景器关心)
    fn mark_aac(&mut self) {}
}

// ============================================================
// AAC / 透传音频
// ============================================================

/// ADTS 头长度
const ADTS_HEADER_LEN: usize = 7;

/// ADTS 采样率索引表
const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// 音频取景器
///
/// AAC 轨道为每个采样加 ADTS 头, 其余音频原样透传.
#[derive(Default)]
pub struct AudioFramer {
    /// 由 esds 解析置位
    is_aac: bool,
    /// AAC 对象类型 - 1 (ADTS profile 字段)
    profile: u8,
    /// 采样率
    sample_rate: u32,
    /// 声道数
    channels: u8,
}

impl AudioFramer {
    /// 创建音频取景器
    pub fn new() -> Self {
        Self::default()
    }

    /// 构建 7 字节 ADTS 头, `frame_len` 为含头的帧总长
    fn build_adts_header(&self, dst: &mut Vec<u8>, frame_len: usize) {
        let sr_index = ADTS_SAMPLE_RATES
            .iter()
            .position(|&r| r == self.sample_rate)
            .unwrap_or(15) as u8;
        let ch = self.channels;

        dst.push(0xFF);
        dst.push(0xF1); // MPEG-4, layer 0, 无 CRC
        dst.push(((self.profile & 0x03) << 6) | (sr_index << 2) | ((ch >> 2) & 0x01));
        dst.push(((ch & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8);
        dst.push(((frame_len >> 3) & 0xFF) as u8);
        dst.push((((frame_len & 0x07) << 5) | 0x1F) as u8);
        dst.push(0xFC);
    }
}

impl SampleFramer for AudioFramer {
    fn set_priv_data(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<()> {
        self.channels = tables.channels as u8;
        self.sample_rate = tables.sample_rate;
        if !data.is_empty() {
            self.profile = (data[0] >> 3).wrapping_sub(1);
        }
        Ok(())
    }

    fn new_buffer_size(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<usize> {
        let mut left = data.len() as i64;
        let mut count = 0usize;
        while left > 4 {
            let frame_size = if tables.sample_size != 0 {
                i64::from(tables.sample_size)
            } else {
                let idx = tables.index_cur + count;
                i64::from(*tables.sample_sizes.get(idx).ok_or_else(|| {
                    LiuError::MovParse(format!("AAC 轨道 #{} 的采样索引越界", tables.ffindex))
                })?)
            };
            left -= frame_size;
            count += 1;
            if left < 0 {
                return Err(LiuError::MovParse(format!(
                    "轨道 #{} 中存在无效的 AAC 帧",
                    tables.ffindex,
                )));
            }
        }
        if !self.is_aac {
            count = 0;
        }
        Ok((data.len() as i64 - left) as usize + count * ADTS_HEADER_LEN)
    }

    fn extract_data(
        &mut self,
        tables: &mut SampleTables,
        dst: &mut Vec<u8>,
        data: &[u8],
    ) -> LiuResult<()> {
        let mut src = 0usize;
        while data.len() - src > 4 {
            let frame_size = if tables.sample_size != 0 {
                tables.sample_size as usize
            } else {
                let size = *tables.sample_sizes.get(tables.index_cur).ok_or_else(|| {
                    LiuError::MovParse(format!("AAC 轨道 #{} 的采样索引越界", tables.ffindex))
                })? as usize;
                tables.index_cur += 1;
                size
            };
            if src + frame_size > data.len() {
                break;
            }
            if self.is_aac {
                self.channels = tables.channels as u8;
                self.build_adts_header(dst, frame_size + ADTS_HEADER_LEN);
            }
            dst.extend_from_slice(&data[src..src + frame_size]);
            src += frame_size;
        }
        Ok(())
    }

    fn mark_aac(&mut self) {
        self.is_aac = true;
    }
}

// ============================================================
// AVC / HEVC / VVC
// ============================================================

/// 长度前缀 NAL 取景器
///
/// 把容器内 `长度 ‖ NAL` 形式的采样改写为 Annex B 起始码形式,
/// 并在私有数据更新后的第一个块前插入缓存的参数集.
/// AVC/HEVC/VVC 仅私有数据布局不同 (avcC / hvcC / vvcC).
pub struct NalFramer {
    codec: CodecId,
    /// 长度前缀字段的字节数 (1-4)
    nal_length_size: u8,
    /// 待插入的 SPS/PPS (及 VPS) 列表
    sps_pps_list: Vec<Vec<u8>>,
}

impl NalFramer {
    /// 创建指定编解码器的取景器
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            nal_length_size: 4,
            sps_pps_list: Vec::new(),
        }
    }

    /// 读取一个长度前缀
    fn nal_size(&self, data: &[u8], pos: usize) -> LiuResult<usize> {
        let n = self.nal_length_size as usize;
        if pos + n > data.len() {
            return Err(LiuError::MovParse("NAL 长度字段被截断".into()));
        }
        let mut size = 0usize;
        for &b in &data[pos..pos + n] {
            size = (size << 8) | b as usize;
        }
        Ok(size)
    }

    /// 解析 avcC (AVCDecoderConfigurationRecord)
    fn parse_avcc(&mut self, data: &[u8]) -> LiuResult<()> {
        if data.len() < 6 {
            return Err(LiuError::MovParse("H.264/AVC 附加数据格式非法".into()));
        }
        self.nal_length_size = (data[4] & 0x03) + 1;
        let sps_cnt = (data[5] & 0x1f) as usize;
        if sps_cnt == 0 {
            return Ok(());
        }
        let mut src = 6usize;
        for _ in 0..sps_cnt {
            src = self.push_prefixed_nal(data, src)?;
        }
        let pps_cnt = *data
            .get(src)
            .ok_or_else(|| LiuError::MovParse("H.264/AVC 附加数据格式非法".into()))?
            as usize;
        src += 1;
        for _ in 0..pps_cnt {
            src = self.push_prefixed_nal(data, src)?;
        }
        Ok(())
    }

    /// 读取一个 `u16 长度 ‖ NAL` 条目并缓存
    fn push_prefixed_nal(&mut self, data: &[u8], src: usize) -> LiuResult<usize> {
        if src + 2 > data.len() {
            return Err(LiuError::MovParse("附加数据中的 NAL 长度被截断".into()));
        }
        let nal_size = ((data[src] as usize) << 8) | data[src + 1] as usize;
        let start = src + 2;
        if start + nal_size > data.len() {
            return Err(LiuError::MovParse("附加数据中的 NAL 数据被截断".into()));
        }
        if nal_size > 0 {
            self.sps_pps_list.push(data[start..start + nal_size].to_vec());
        }
        Ok(start + nal_size)
    }

    /// 解析 vvcC (VvcDecoderConfigurationRecord)
    fn parse_vvcc(&mut self, data: &[u8]) -> LiuResult<()> {
        const VVC_OPI_NUT: u32 = 12;
        const VVC_DCI_NUT: u32 = 13;

        if data.len() < 2 {
            return Err(LiuError::MovParse("H.266/VVC 附加数据格式非法".into()));
        }
        let mut br = BitReader::new(data);
        br.skip_bits(5)?; // reserved '11111'
        self.nal_length_size = br.read_bits(2)? as u8 + 1;
        let ptl_present = br.read_bits(1)? != 0;

        if ptl_present {
            br.skip_bits(9)?; // ols_idx
            let num_sublayers = br.read_bits(3)?;
            br.skip_bits(7)?; // constant_frame_rate + chroma_format_idc + bit_depth_minus8
            br.skip_bits(5)?; // reserved

            // VvcPTLRecord
            br.skip_bits(2)?; // reserved
            let num_bytes_constraint_info = br.read_bits(6)?;
            br.skip_bits(16)?; // profile_idc(7) + tier(1) + level_idc(8)
            br.skip_bits(2)?; // frame_only + multilayer
            if num_bytes_constraint_info > 0 {
                br.skip_bits(num_bytes_constraint_info * 8 - 2)?;
            }
            let mut sublayer_present = Vec::new();
            if num_sublayers > 1 {
                for _ in 0..num_sublayers - 1 {
                    sublayer_present.push(br.read_bits(1)? != 0);
                }
            }
            for _ in num_sublayers..=8 {
                br.skip_bits(1)?; // ptl_reserved_zero_bit
            }
            for present in sublayer_present {
                if present {
                    br.skip_bits(8)?; // sublayer_level_idc
                }
            }
            let num_sub_profiles = br.read_bits(8)?;
            for _ in 0..num_sub_profiles {
                br.skip_bits(32)?;
            }
            br.skip_bits(48)?; // max_picture_width/height + avg_frame_rate
        }

        let num_arrays = br.read_bits(8)?;
        for _ in 0..num_arrays {
            br.skip_bits(3)?; // array_completeness + reserved
            let nal_type = br.read_bits(5)?;
            let num_nalus = if nal_type != VVC_DCI_NUT && nal_type != VVC_OPI_NUT {
                br.read_bits(16)?
            } else {
                1
            };
            for _ in 0..num_nalus {
                let nal_len = br.read_bits(16)? as usize;
                let start = br.byte_position();
                if start + nal_len > data.len() {
                    return Err(LiuError::MovParse("vvcC 中的 NAL 数据被截断".into()));
                }
                if nal_len > 0 {
                    self.sps_pps_list.push(data[start..start + nal_len].to_vec());
                }
                br.skip_bits((nal_len * 8) as u32)?;
            }
        }
        Ok(())
    }
}

impl SampleFramer for NalFramer {
    fn set_priv_data(&mut self, _tables: &SampleTables, data: &[u8]) -> LiuResult<()> {
        self.sps_pps_list.clear();
        match self.codec {
            CodecId::H265 => {
                let (units, length_size) = extract_hvcc_nal_units(data)
                    .map_err(|e| LiuError::MovParse(format!("hvcC 解析失败: {}", e)))?;
                self.sps_pps_list = units;
                self.nal_length_size = length_size;
                Ok(())
            }
            CodecId::H266 => self.parse_vvcc(data),
            _ => self.parse_avcc(data),
        }
    }

    fn new_buffer_size(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<usize> {
        let mut pos = 0usize;
        let mut nal_count = 0usize;
        while pos < data.len() {
            let size = self.nal_size(data, pos).map_err(|_| {
                LiuError::MovParse(format!("轨道 #{} 中存在无效的视频帧", tables.ffindex))
            })?;
            pos += self.nal_length_size as usize;
            if pos + size > data.len() {
                return Err(LiuError::MovParse(format!(
                    "轨道 #{} 中存在无效的视频帧",
                    tables.ffindex,
                )));
            }
            pos += size;
            nal_count += 1;
        }

        let sps_pps_size: usize = self.sps_pps_list.iter().map(|n| n.len() + 4).sum();
        Ok(data.len() + sps_pps_size + nal_count * (4 - self.nal_length_size as usize))
    }

    fn extract_data(
        &mut self,
        _tables: &mut SampleTables,
        dst: &mut Vec<u8>,
        data: &[u8],
    ) -> LiuResult<()> {
        if !self.sps_pps_list.is_empty() {
            for nal in &self.sps_pps_list {
                dst.extend_from_slice(&[0, 0, 0, 1]);
                dst.extend_from_slice(nal);
            }
            self.sps_pps_list.clear();
        }
        let mut pos = 0usize;
        while pos < data.len() {
            let size = self.nal_size(data, pos)?;
            pos += self.nal_length_size as usize;
            if pos + size > data.len() {
                return Err(LiuError::MovParse("视频帧中的 NAL 被截断".into()));
            }
            dst.extend_from_slice(&[0, 0, 0, 1]);
            dst.extend_from_slice(&data[pos..pos + size]);
            pos += size;
        }
        Ok(())
    }
}

// ============================================================
// TX3G → SRT
// ============================================================

/// 'styl' 修饰盒
const MOD_STYL: u32 = 0x7374796C;

/// 定时文本取景器
///
/// 每个输入采样转换为一个 SRT 片段; 时间来自 stts 表的逐项消费,
/// 样式标志映射为内联标签.
pub struct Tx3gFramer {
    /// 已输出的片段数
    packet_cnt: u32,
    /// stts 游标: 条目下标
    stts_pos: i64,
    /// stts 游标: 当前条目剩余计数
    stts_cnt: i64,
    /// 当前时间偏移 (毫秒)
    time_offset: i64,
}

impl Default for Tx3gFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tx3gFramer {
    /// 创建定时文本取景器
    pub fn new() -> Self {
        Self {
            packet_cnt: 0,
            stts_pos: -1,
            stts_cnt: 0,
            time_offset: 0,
        }
    }

    /// 消费下一个 stts 时长, 换算为毫秒
    fn stts_val(&mut self, tables: &SampleTables) -> LiuResult<i64> {
        if self.stts_cnt == 0 {
            self.stts_pos += 1;
            if self.stts_pos < 0 || self.stts_pos as usize >= tables.stts_data.len() {
                return Err(LiuError::MovParse(format!(
                    "SRT 轨道 #{} 的 stts 索引非法",
                    tables.ffindex,
                )));
            }
            self.stts_cnt = i64::from(tables.stts_data[self.stts_pos as usize].count);
        }
        self.stts_cnt -= 1;
        let entry = tables.stts_data[self.stts_pos as usize];
        Ok(entry.duration * 1000 / i64::from(tables.time_scale.max(1)))
    }

    /// 生成片段头: 序号行 + 时间轴行 (首片段带 UTF-8 BOM)
    fn build_prefix(&self, packet_number: u32, start_ms: i64, end_ms: i64) -> String {
        let mut prefix = String::new();
        if self.packet_cnt == 0 {
            prefix.push('\u{FEFF}');
        }
        prefix.push_str(&packet_number.to_string());
        prefix.push('\n');
        prefix.push_str(&format_srt_time(start_ms));
        prefix.push_str(" --> ");
        prefix.push_str(&format_srt_time(end_ms));
        prefix.push('\n');
        prefix
    }

    /// 读取文本长度前缀 (跳过零长度前缀), 返回 (文本起点, 文本长度)
    fn read_text_unit(&self, data: &[u8]) -> LiuResult<(usize, usize)> {
        let mut pos = 0usize;
        let mut unit_size = 0usize;
        while unit_size == 0 {
            if pos + 2 > data.len() {
                return Err(LiuError::MovParse("定时文本采样被截断".into()));
            }
            unit_size = ((data[pos] as usize) << 8) | data[pos + 1] as usize;
            pos += 2;
        }
        if pos + unit_size > data.len() {
            return Err(LiuError::MovParse("定时文本长度越界".into()));
        }
        Ok((pos, unit_size))
    }

    /// 遍历修饰盒, 对每个有效的 styl 条目回调 (startChar, endChar, 样式标志)
    fn walk_modifiers<F: FnMut(usize, usize, u8)>(
        &self,
        data: &[u8],
        mut from: usize,
        mut on_style: F,
    ) -> LiuResult<()> {
        while from + 8 <= data.len() {
            let size32 = u32::from_be_bytes([data[from], data[from + 1], data[from + 2], data[from + 3]]);
            let mtype = u32::from_be_bytes([
                data[from + 4],
                data[from + 5],
                data[from + 6],
                data[from + 7],
            ]);
            from += 8;
            let payload_len: i64 = if size32 == 1 {
                // 64 位扩展长度
                if from + 8 > data.len() {
                    return Err(LiuError::MovParse("修饰盒扩展长度被截断".into()));
                }
                let mut size64 = 0i64;
                for &b in &data[from..from + 8] {
                    size64 = (size64 << 8) | i64::from(b);
                }
                from += 8;
                size64 - 16
            } else {
                i64::from(size32) - 8
            };
            if payload_len < 0 {
                return Err(LiuError::MovParse("修饰盒长度非法".into()));
            }

            if mtype == MOD_STYL {
                if from + 2 > data.len() {
                    return Err(LiuError::MovParse("styl 盒被截断".into()));
                }
                let entry_count = ((data[from] as usize) << 8) | data[from + 1] as usize;
                from += 2;
                for _ in 0..entry_count {
                    if from + 12 > data.len() {
                        return Err(LiuError::MovParse("styl 条目被截断".into()));
                    }
                    let start_char = ((data[from] as usize) << 8) | data[from + 1] as usize;
                    let end_char = ((data[from + 2] as usize) << 8) | data[from + 3] as usize;
                    let flags = data[from + 6];
                    if start_char < end_char {
                        on_style(start_char, end_char, flags);
                    }
                    from += 12;
                }
            } else {
                from = (from as i64 + payload_len) as usize;
            }
        }
        Ok(())
    }
}

impl SampleFramer for Tx3gFramer {
    fn set_priv_data(&mut self, _tables: &SampleTables, _data: &[u8]) -> LiuResult<()> {
        self.stts_cnt = 0;
        self.stts_pos = -1;
        Ok(())
    }

    fn new_buffer_size(&mut self, tables: &SampleTables, data: &[u8]) -> LiuResult<usize> {
        let saved_cnt = self.stts_cnt;
        let saved_pos = self.stts_pos;

        let start_ms = self.time_offset;
        let end_ms = start_ms + self.stts_val(tables)?;
        if data.len() <= 2 {
            // 空采样仍然消费其时长
            self.time_offset = end_ms;
            return Ok(0);
        }

        let prefix = self.build_prefix(self.packet_cnt + 1, start_ms, end_ms);

        let (text_start, unit_size) = self.read_text_unit(data)?;
        let mut text_len = unit_size;
        self.walk_modifiers(data, text_start + unit_size, |_, _, flags| {
            if flags & 1 != 0 {
                text_len += 7; // <b></b>
            }
            if flags & 2 != 0 {
                text_len += 7; // <i></i>
            }
            if flags & 4 != 0 {
                text_len += 7; // <u></u>
            }
        })?;

        self.stts_cnt = saved_cnt;
        self.stts_pos = saved_pos;
        Ok(prefix.len() + text_len + 2)
    }

    fn extract_data(
        &mut self,
        tables: &mut SampleTables,
        dst: &mut Vec<u8>,
        data: &[u8],
    ) -> LiuResult<()> {
        let start_ms = self.time_offset;
        let end_ms = start_ms + self.stts_val(tables)?;
        let prefix = self.build_prefix(self.packet_cnt + 1, start_ms, end_ms);
        self.packet_cnt += 1;
        dst.extend_from_slice(prefix.as_bytes());

        let (text_start, unit_size) = self.read_text_unit(data)?;
        let mut text: Vec<u8> = data[text_start..text_start + unit_size].to_vec();

        // (插入位置, 标签) 对: 起始标签排在同位置结束标签之前
        let mut tags: Vec<(usize, String)> = Vec::new();
        self.walk_modifiers(data, text_start + unit_size, |start_char, end_char, flags| {
            let mut open = String::new();
            let mut close = String::new();
            if flags & 1 != 0 {
                open.push_str("<b>");
                close.insert_str(0, "</b>");
            }
            if flags & 2 != 0 {
                open.push_str("<i>");
                close.insert_str(0, "</i>");
            }
            if flags & 4 != 0 {
                open.push_str("<u>");
                close.insert_str(0, "</u>");
            }
            tags.insert(0, (start_char, open));
            tags.push((end_char, close));
        })?;

        // 按插入位置降序写入, 保持靠前偏移不失效
        tags.sort_by(|a, b| b.cmp(a));
        for (at, tag) in tags {
            let at = at.min(text.len());
            text.splice(at..at, tag.bytes());
        }

        dst.extend_from_slice(&text);
        dst.push(b'\n');
        dst.push(b'\n');
        self.time_offset = end_ms;
        Ok(())
    }
}

/// 毫秒 → SRT 时间戳 "HH:MM:SS,mmm"
fn format_srt_time(ms: i64) -> String {
    let ms = ms.max(0);
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        ms / 60_000 % 60,
        ms / 1000 % 60,
        ms % 1000,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_tables(sample_size: u32, channels: u32, sample_rate: u32) -> SampleTables {
        SampleTables {
            ffindex: 1,
            sample_size,
            channels,
            sample_rate,
            ..SampleTables::default()
        }
    }

    #[test]
    fn test_aac_adts_取景() {
        // AudioSpecificConfig 11 90: AAC-LC, 48 kHz, 双声道
        let mut tables = audio_tables(256, 2, 48000);
        let mut framer = AudioFramer::new();
        framer.mark_aac();
        framer.set_priv_data(&tables, &[0x11, 0x90]).unwrap();

        let chunk = vec![0xAB; 1024];
        let size = framer.new_buffer_size(&tables, &chunk).unwrap();
        assert_eq!(size, 4 * (256 + ADTS_HEADER_LEN));

        let mut out = Vec::new();
        framer.extract_data(&mut tables, &mut out, &chunk).unwrap();
        assert_eq!(out.len(), size);

        // 每帧 263 字节, 以 FF F1 同步字开头
        for frame in out.chunks(256 + ADTS_HEADER_LEN) {
            assert_eq!(frame[0], 0xFF);
            assert_eq!(frame[1], 0xF1);
            // profile=1, 采样率索引=3 (48kHz), 声道=2
            assert_eq!(frame[2], (1 << 6) | (3 << 2));
            assert_eq!(frame[3] >> 6, 2);
        }
    }

    #[test]
    fn test_非aac_透传() {
        let mut tables = audio_tables(100, 2, 48000);
        let mut framer = AudioFramer::new();

        let chunk = vec![0x55; 300];
        let size = framer.new_buffer_size(&tables, &chunk).unwrap();
        assert_eq!(size, 300);
        let mut out = Vec::new();
        framer.extract_data(&mut tables, &mut out, &chunk).unwrap();
        assert_eq!(out, chunk);
    }

    #[test]
    fn test_aac_逐样本索引越界() {
        let mut tables = audio_tables(0, 2, 48000);
        tables.sample_sizes = vec![100];
        let mut framer = AudioFramer::new();
        framer.mark_aac();

        let chunk = vec![0u8; 300];
        assert!(framer.new_buffer_size(&tables, &chunk).is_err());
    }

    /// 构建 avcC: 1 个 SPS + 1 个 PPS, 长度字段 4 字节
    fn build_avcc(sps: &[u8], pps: &[u8]) -> Vec<u8> {
        let mut data = vec![0x01, 0x64, 0x00, 0x28, 0xFF, 0xE1];
        data.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        data.extend_from_slice(sps);
        data.push(1);
        data.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        data.extend_from_slice(pps);
        data
    }

    #[test]
    fn test_avc_长度前缀转起始码() {
        let sps = [0x67, 0x64, 0x00, 0x28];
        let pps = [0x68, 0xEE, 0x3C, 0x80];
        let tables = SampleTables::default();
        let mut framer = NalFramer::new(CodecId::H264);
        framer.set_priv_data(&tables, &build_avcc(&sps, &pps)).unwrap();

        // 两个长度前缀 NAL
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&5u32.to_be_bytes());
        chunk.extend_from_slice(&[0x65, 1, 2, 3, 4]);
        chunk.extend_from_slice(&3u32.to_be_bytes());
        chunk.extend_from_slice(&[0x41, 5, 6]);

        let mut tables = SampleTables::default();
        let size = framer.new_buffer_size(&tables, &chunk).unwrap();
        let mut out = Vec::new();
        framer.extract_data(&mut tables, &mut out, &chunk).unwrap();
        assert_eq!(out.len(), size);

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&sps);
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&pps);
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&[0x65, 1, 2, 3, 4]);
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&[0x41, 5, 6]);
        assert_eq!(out, expected);

        // 参数集只插入一次
        let mut chunk2 = Vec::new();
        chunk2.extend_from_slice(&2u32.to_be_bytes());
        chunk2.extend_from_slice(&[0x41, 9]);
        let size2 = framer.new_buffer_size(&tables, &chunk2).unwrap();
        assert_eq!(size2, chunk2.len());
    }

    #[test]
    fn test_avc_短长度字段() {
        // lengthSizeMinusOne = 1 (2 字节长度)
        let mut avcc = build_avcc(&[0x67], &[0x68]);
        avcc[4] = 0xFD;
        let tables = SampleTables::default();
        let mut framer = NalFramer::new(CodecId::H264);
        framer.set_priv_data(&tables, &avcc).unwrap();
        framer.sps_pps_list.clear();

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&3u16.to_be_bytes());
        chunk.extend_from_slice(&[0x41, 1, 2]);

        let mut tables = SampleTables::default();
        // 2 字节长度换 4 字节起始码: 每 NAL 增加 2 字节
        assert_eq!(framer.new_buffer_size(&tables, &chunk).unwrap(), chunk.len() + 2);
        let mut out = Vec::new();
        framer.extract_data(&mut tables, &mut out, &chunk).unwrap();
        assert_eq!(out, vec![0, 0, 0, 1, 0x41, 1, 2]);
    }

    #[test]
    fn test_tx3g_srt_输出() {
        let mut tables = SampleTables {
            ffindex: 3,
            time_scale: 1000,
            stts_data: vec![super::super::track::SttsEntry {
                count: 2,
                duration: 1000,
            }],
            ..SampleTables::default()
        };

        // 采样: 文本 "Hello" + styl 盒 (粗体, 范围 0..5)
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&5u16.to_be_bytes());
        chunk.extend_from_slice(b"Hello");
        chunk.extend_from_slice(&22u32.to_be_bytes()); // styl 盒大小: 8 + 2 + 12
        chunk.extend_from_slice(b"styl");
        chunk.extend_from_slice(&1u16.to_be_bytes()); // entry_count
        chunk.extend_from_slice(&0u16.to_be_bytes()); // startChar
        chunk.extend_from_slice(&5u16.to_be_bytes()); // endChar
        chunk.extend_from_slice(&0u16.to_be_bytes()); // font_ID
        chunk.push(1); // face: bold
        chunk.push(16); // font size
        chunk.extend_from_slice(&[0x00, 0x00, 0xFF, 0xFF]); // rgba

        let mut framer = Tx3gFramer::new();
        framer.set_priv_data(&tables, &[]).unwrap();

        let size = framer.new_buffer_size(&tables, &chunk).unwrap();
        let mut out = Vec::new();
        framer.extract_data(&mut tables, &mut out, &chunk).unwrap();
        assert_eq!(out.len(), size);

        let expected = "\u{FEFF}1\n00:00:00,000 --> 00:00:01,000\n<b>Hello</b>\n\n";
        assert_eq!(out, expected.as_bytes());

        // 第二个片段: 无 BOM, 时间继续推进
        let mut chunk2 = Vec::new();
        chunk2.extend_from_slice(&2u16.to_be_bytes());
        chunk2.extend_from_slice(b"Hi");
        let size2 = framer.new_buffer_size(&tables, &chunk2).unwrap();
        let mut out2 = Vec::new();
        framer.extract_data(&mut tables, &mut out2, &chunk2).unwrap();
        assert_eq!(out2.len(), size2);
        assert_eq!(
            out2,
            b"2\n00:00:01,000 --> 00:00:02,000\nHi\n\n".to_vec(),
        );
    }

    #[test]
    fn test_tx3g_重叠样式() {
        let tables = SampleTables {
            ffindex: 1,
            time_scale: 1000,
            stts_data: vec![super::super::track::SttsEntry {
                count: 10,
                duration: 500,
            }],
            ..SampleTables::default()
        };

        // "abcdef": 粗体 0..6, 斜体 2..4
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&6u16.to_be_bytes());
        chunk.extend_from_slice(b"abcdef");
        chunk.extend_from_slice(&34u32.to_be_bytes()); // 8 + 2 + 24
        chunk.extend_from_slice(b"styl");
        chunk.extend_from_slice(&2u16.to_be_bytes());
        for (start, end, face) in [(0u16, 6u16, 1u8), (2, 4, 2)] {
            chunk.extend_from_slice(&start.to_be_bytes());
            chunk.extend_from_slice(&end.to_be_bytes());
            chunk.extend_from_slice(&0u16.to_be_bytes());
            chunk.push(face);
            chunk.push(16);
            chunk.extend_from_slice(&[0, 0, 0, 0]);
        }

        let mut framer = Tx3gFramer::new();
        let mut t = tables;
        let size = framer.new_buffer_size(&t, &chunk).unwrap();
        let mut out = Vec::new();
        framer.extract_data(&mut t, &mut out, &chunk).unwrap();
        assert_eq!(out.len(), size);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<b>ab<i>cd</i>ef</b>"), "实际输出: {}", text);
    }

    #[test]
    fn test_srt_时间格式() {
        assert_eq!(format_srt_time(0), "00:00:00,000");
        assert_eq!(format_srt_time(1000), "00:00:01,000");
        assert_eq!(format_srt_time(3_661_234), "01:01:01,234");
    }
}
