//! HEVC 语法单元解析.
//!
//! 覆盖复用所需的语法子集: VPS/SPS 的时序与色彩信息, PPS 的
//! 片头依赖标志, 片头前缀 (帧边界与 POC), 以及 SEI 中的 HDR 信令.
//! 每个单元先通过 `decode_buffer` 捕获原始 NAL (去除防竞争字节),
//! 再由 `deserialize` 做位级解析.

use liu_core::{BitReader, LiuError, LiuResult};

use super::nal::{self, NAL_BLA_W_LP, NAL_IDR_N_LP, NAL_IDR_W_RADL, NAL_RSV_IRAP_VCL23};

/// 语法单元公共部分: NAL 类型与 RBSP 缓冲
///
/// RBSP 为去除防竞争字节后的完整 NAL (含 2 字节头), 拷贝自输入缓冲区,
/// 因此输入缓冲区随后可被覆盖.
#[derive(Debug, Clone, Default)]
pub struct HevcUnit {
    /// NAL 单元类型
    pub nal_type: u8,
    /// RBSP 数据 (含 2 字节 NAL 头)
    rbsp: Vec<u8>,
}

impl HevcUnit {
    /// 捕获一个 NAL (不含起始码), 去除防竞争字节
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        if data.len() < 2 {
            return Err(LiuError::HevcParse("NAL 单元太短".into()));
        }
        self.nal_type = nal::nal_type(data[0]);
        self.rbsp = nal::decode_nal_vec(data);
        Ok(())
    }

    /// RBSP 数据 (含 2 字节 NAL 头)
    pub fn rbsp(&self) -> &[u8] {
        &self.rbsp
    }

    /// 创建跳过 2 字节 NAL 头的位读取器
    fn payload_reader(&self) -> LiuResult<BitReader<'_>> {
        let mut br = BitReader::new(&self.rbsp);
        br.skip_bits(16)?;
        Ok(br)
    }
}

/// 解析 profile_tier_level, 返回 (profile_idc, tier_flag, level_idc)
fn parse_profile_tier_level(br: &mut BitReader, max_sub_layers: u8) -> LiuResult<(u8, bool, u8)> {
    let _profile_space = br.read_bits(2)?;
    let tier_flag = br.read_bits(1)? != 0;
    let profile_idc = br.read_bits(5)? as u8;

    // general_profile_compatibility_flags (32 bits)
    br.skip_bits(32)?;
    // progressive/interlaced/non_packed/frame_only + 44 bits 约束标志
    br.skip_bits(4)?;
    br.skip_bits(32)?;
    br.skip_bits(12)?;

    let level_idc = br.read_bits(8)? as u8;

    if max_sub_layers > 1 {
        let mut profile_present = Vec::new();
        let mut level_present = Vec::new();
        for _ in 0..max_sub_layers - 1 {
            profile_present.push(br.read_bits(1)? != 0);
            level_present.push(br.read_bits(1)? != 0);
        }
        if max_sub_layers < 9 {
            for _ in max_sub_layers - 1..8 {
                br.skip_bits(2)?; // reserved
            }
        }
        for i in 0..max_sub_layers as usize - 1 {
            if profile_present[i] {
                br.skip_bits(32)?;
                br.skip_bits(32)?;
                br.skip_bits(24)?;
            }
            if level_present[i] {
                br.skip_bits(8)?;
            }
        }
    }

    Ok((profile_idc, tier_flag, level_idc))
}

// ============================================================
// VPS
// ============================================================

/// 视频参数集 (Video Parameter Set)
///
/// 只保留复用所需的时序字段, 但记录 `num_units_in_tick` 的位偏移
/// 以便在帧率被外部覆盖时原位改写.
#[derive(Debug, Clone, Default)]
pub struct HevcVpsUnit {
    /// 公共单元部分
    pub unit: HevcUnit,
    /// vps_video_parameter_set_id
    pub vps_id: u8,
    /// vps_num_units_in_tick (0 表示无时序信息)
    pub num_units_in_tick: u32,
    /// vps_time_scale
    pub time_scale: u32,
    /// num_units_in_tick 字段在 RBSP 中的位偏移 (0 表示无时序信息)
    num_units_in_tick_bit_pos: usize,
}

impl HevcVpsUnit {
    /// 捕获 NAL 数据
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        self.unit.decode_buffer(data)
    }

    /// 位级解析
    pub fn deserialize(&mut self) -> LiuResult<()> {
        let mut br = self.unit.payload_reader()?;

        self.vps_id = br.read_bits(4)? as u8;
        // vps_base_layer_internal_flag + vps_base_layer_available_flag + vps_max_layers_minus1(6)
        br.skip_bits(8)?;
        let max_sub_layers = br.read_bits(3)? as u8 + 1;
        br.skip_bits(1)?; // vps_temporal_id_nesting_flag
        br.skip_bits(16)?; // vps_reserved_0xffff_16bits

        parse_profile_tier_level(&mut br, max_sub_layers)?;

        let sub_layer_ordering = br.read_bits(1)? != 0;
        let start = if sub_layer_ordering {
            0
        } else {
            u32::from(max_sub_layers) - 1
        };
        for _ in start..u32::from(max_sub_layers) {
            br.read_ue()?; // vps_max_dec_pic_buffering_minus1
            br.read_ue()?; // vps_max_num_reorder_pics
            br.read_ue()?; // vps_max_latency_increase_plus1
        }

        let max_layer_id = br.read_bits(6)?;
        let num_layer_sets_minus1 = br.read_ue()?;
        for _ in 0..num_layer_sets_minus1 {
            for _ in 0..=max_layer_id {
                br.skip_bits(1)?; // layer_id_included_flag
            }
        }

        self.num_units_in_tick = 0;
        self.num_units_in_tick_bit_pos = 0;
        if br.read_bits(1)? != 0 {
            // vps_timing_info_present_flag
            self.num_units_in_tick_bit_pos = br.bits_read();
            self.num_units_in_tick = br.read_bits(32)?;
            self.time_scale = br.read_bits(32)?;
        }

        Ok(())
    }

    /// 获取帧率, 无时序信息时返回 0
    pub fn fps(&self) -> f64 {
        if self.num_units_in_tick > 0 {
            f64::from(self.time_scale) / f64::from(self.num_units_in_tick)
        } else {
            0.0
        }
    }

    /// 设置帧率
    ///
    /// NTSC 系帧率 (`round(1001·fps)` 是 1000 的倍数) 使用 1001 时基,
    /// 否则使用 1000 时基.
    pub fn set_fps(&mut self, fps: f64) {
        let ntsc_scale = (1001.0 * fps).round() as u32;
        if ntsc_scale % 1000 == 0 {
            self.num_units_in_tick = 1001;
            self.time_scale = ntsc_scale;
        } else {
            self.num_units_in_tick = 1000;
            self.time_scale = (1000.0 * fps).round() as u32;
        }
    }

    /// 重新序列化 VPS (插回防竞争字节)
    ///
    /// 以当前时序字段替换原始值, 其余字段逐位保留.
    /// 返回写入 `dst` 的字节数, 容量不足时返回 `BufferTooSmall`.
    pub fn serialize_buffer(&self, dst: &mut [u8]) -> LiuResult<usize> {
        if self.num_units_in_tick_bit_pos == 0 {
            return nal::encode_nal(self.unit.rbsp(), dst);
        }
        let mut rbsp = self.unit.rbsp().to_vec();
        write_bits_at(
            &mut rbsp,
            self.num_units_in_tick_bit_pos,
            self.num_units_in_tick,
        )?;
        write_bits_at(
            &mut rbsp,
            self.num_units_in_tick_bit_pos + 32,
            self.time_scale,
        )?;
        nal::encode_nal(&rbsp, dst)
    }

    /// 人类可读的描述
    pub fn description(&self) -> String {
        if self.num_units_in_tick > 0 {
            format!("帧率: {:.3}", self.fps())
        } else {
            "帧率: 未知".to_string()
        }
    }
}

/// 在字节缓冲区的任意位偏移处覆写一个 32 位大端值
fn write_bits_at(buf: &mut [u8], bit_pos: usize, value: u32) -> LiuResult<()> {
    if (bit_pos + 32).div_ceil(8) > buf.len() {
        return Err(LiuError::HevcParse("VPS 时序字段越界".into()));
    }
    for i in 0..32 {
        let bit = (value >> (31 - i)) & 1;
        let pos = bit_pos + i as usize;
        let mask = 0x80u8 >> (pos % 8);
        if bit != 0 {
            buf[pos / 8] |= mask;
        } else {
            buf[pos / 8] &= !mask;
        }
    }
    Ok(())
}

// ============================================================
// SPS
// ============================================================

/// 序列参数集 (Sequence Parameter Set)
#[derive(Debug, Clone)]
pub struct HevcSpsUnit {
    /// 公共单元部分
    pub unit: HevcUnit,
    /// 引用的 VPS ID
    pub vps_id: u8,
    /// SPS ID
    pub sps_id: u32,
    /// general_profile_idc
    pub profile_idc: u8,
    /// general_tier_flag
    pub tier_flag: bool,
    /// general_level_idc
    pub level_idc: u8,
    /// 色度格式
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane_flag: bool,
    /// 亮度采样宽度
    pub pic_width_in_luma_samples: u32,
    /// 亮度采样高度
    pub pic_height_in_luma_samples: u32,
    /// POC LSB 位宽
    pub log2_max_pic_order_cnt_lsb: u32,
    /// VUI: colour_primaries (缺省 2 = 未指定)
    pub colour_primaries: u8,
    /// VUI: transfer_characteristics (缺省 2)
    pub transfer_characteristics: u8,
    /// VUI: matrix_coeffs (缺省 2)
    pub matrix_coeffs: u8,
    /// VUI: chroma_sample_loc_type_top_field
    pub chroma_sample_loc_type_top_field: u32,
    /// VUI: field_seq_flag (隔行标志)
    pub interlaced: bool,
    /// VUI: SAR 宽
    pub sar_width: u32,
    /// VUI: SAR 高
    pub sar_height: u32,
    /// VUI: num_units_in_tick (0 表示无时序信息)
    pub num_units_in_tick: u32,
    /// VUI: time_scale
    pub time_scale: u32,
    /// HRD: sub_pic_hrd_params_present_flag
    pub sub_pic_hrd_params_present_flag: bool,
}

impl Default for HevcSpsUnit {
    fn default() -> Self {
        Self {
            unit: HevcUnit::default(),
            vps_id: 0,
            sps_id: 0,
            profile_idc: 0,
            tier_flag: false,
            level_idc: 0,
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            pic_width_in_luma_samples: 0,
            pic_height_in_luma_samples: 0,
            log2_max_pic_order_cnt_lsb: 4,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coeffs: 2,
            chroma_sample_loc_type_top_field: 0,
            interlaced: false,
            sar_width: 1,
            sar_height: 1,
            num_units_in_tick: 0,
            time_scale: 0,
            sub_pic_hrd_params_present_flag: false,
        }
    }
}

/// 预定义 SAR 表 (ITU-T H.265 表 E.1)
const SAR_TABLE: [(u32, u32); 17] = [
    (0, 1),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

impl HevcSpsUnit {
    /// 捕获 NAL 数据
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        self.unit.decode_buffer(data)
    }

    /// 位级解析, 直到 VUI/HRD 中复用所需的最后一个字段
    pub fn deserialize(&mut self) -> LiuResult<()> {
        let rbsp = self.unit.rbsp().to_vec();
        let mut br = BitReader::new(&rbsp);
        br.skip_bits(16)?;

        self.vps_id = br.read_bits(4)? as u8;
        let max_sub_layers = br.read_bits(3)? as u8 + 1;
        br.skip_bits(1)?; // sps_temporal_id_nesting_flag

        let (profile_idc, tier_flag, level_idc) =
            parse_profile_tier_level(&mut br, max_sub_layers)?;
        self.profile_idc = profile_idc;
        self.tier_flag = tier_flag;
        self.level_idc = level_idc;

        self.sps_id = br.read_ue()?;
        self.chroma_format_idc = br.read_ue()?;
        if self.chroma_format_idc == 3 {
            self.separate_colour_plane_flag = br.read_bits(1)? != 0;
        }

        self.pic_width_in_luma_samples = br.read_ue()?;
        self.pic_height_in_luma_samples = br.read_ue()?;

        if br.read_bits(1)? != 0 {
            // conformance_window_flag
            br.read_ue()?;
            br.read_ue()?;
            br.read_ue()?;
            br.read_ue()?;
        }

        br.read_ue()?; // bit_depth_luma_minus8
        br.read_ue()?; // bit_depth_chroma_minus8
        self.log2_max_pic_order_cnt_lsb = br.read_ue()? + 4;

        let sub_layer_ordering = br.read_bits(1)? != 0;
        let start = if sub_layer_ordering {
            0
        } else {
            u32::from(max_sub_layers) - 1
        };
        for _ in start..u32::from(max_sub_layers) {
            br.read_ue()?; // sps_max_dec_pic_buffering_minus1
            br.read_ue()?; // sps_max_num_reorder_pics
            br.read_ue()?; // sps_max_latency_increase_plus1
        }

        br.read_ue()?; // log2_min_luma_coding_block_size_minus3
        br.read_ue()?; // log2_diff_max_min_luma_coding_block_size
        br.read_ue()?; // log2_min_luma_transform_block_size_minus2
        br.read_ue()?; // log2_diff_max_min_luma_transform_block_size
        br.read_ue()?; // max_transform_hierarchy_depth_inter
        br.read_ue()?; // max_transform_hierarchy_depth_intra

        if br.read_bits(1)? != 0 {
            // scaling_list_enabled_flag
            if br.read_bits(1)? != 0 {
                skip_scaling_list_data(&mut br)?;
            }
        }

        br.skip_bits(2)?; // amp_enabled_flag + sample_adaptive_offset_enabled_flag

        if br.read_bits(1)? != 0 {
            // pcm_enabled_flag
            br.skip_bits(8)?; // pcm 位深 (luma 4 + chroma 4)
            br.read_ue()?; // log2_min_pcm_luma_coding_block_size_minus3
            br.read_ue()?; // log2_diff_max_min_pcm_luma_coding_block_size
            br.skip_bits(1)?; // pcm_loop_filter_disabled_flag
        }

        let num_short_term_rps = br.read_ue()?;
        if num_short_term_rps > 64 {
            return Err(LiuError::HevcParse(format!(
                "num_short_term_ref_pic_sets 超出范围: {}",
                num_short_term_rps,
            )));
        }
        let mut num_delta_pocs = vec![0u32; num_short_term_rps as usize];
        for i in 0..num_short_term_rps as usize {
            skip_short_term_rps(&mut br, i, &mut num_delta_pocs)?;
        }

        if br.read_bits(1)? != 0 {
            // long_term_ref_pics_present_flag
            let num_long_term = br.read_ue()?;
            for _ in 0..num_long_term {
                br.skip_bits(self.log2_max_pic_order_cnt_lsb)?; // lt_ref_pic_poc_lsb_sps
                br.skip_bits(1)?; // used_by_curr_pic_lt_sps_flag
            }
        }

        br.skip_bits(2)?; // sps_temporal_mvp_enabled_flag + strong_intra_smoothing_enabled_flag

        if br.read_bits(1)? != 0 {
            // vui_parameters_present_flag
            self.parse_vui(&mut br, max_sub_layers)?;
        }

        Ok(())
    }

    /// 解析 VUI (直到 HRD 中的 sub_pic 标志)
    fn parse_vui(&mut self, br: &mut BitReader, max_sub_layers: u8) -> LiuResult<()> {
        if br.read_bits(1)? != 0 {
            // aspect_ratio_info_present_flag
            let idc = br.read_bits(8)? as usize;
            if idc == 255 {
                // Extended_SAR
                self.sar_width = br.read_bits(16)?;
                self.sar_height = br.read_bits(16)?;
            } else if idc < SAR_TABLE.len() {
                let (w, h) = SAR_TABLE[idc];
                if w > 0 {
                    self.sar_width = w;
                    self.sar_height = h;
                }
            }
        }

        if br.read_bits(1)? != 0 {
            // overscan_info_present_flag
            br.skip_bits(1)?;
        }

        if br.read_bits(1)? != 0 {
            // video_signal_type_present_flag
            br.skip_bits(3)?; // video_format
            br.skip_bits(1)?; // video_full_range_flag
            if br.read_bits(1)? != 0 {
                // colour_description_present_flag
                self.colour_primaries = br.read_bits(8)? as u8;
                self.transfer_characteristics = br.read_bits(8)? as u8;
                self.matrix_coeffs = br.read_bits(8)? as u8;
            }
        }

        if br.read_bits(1)? != 0 {
            // chroma_loc_info_present_flag
            self.chroma_sample_loc_type_top_field = br.read_ue()?;
            br.read_ue()?; // chroma_sample_loc_type_bottom_field
        }

        br.skip_bits(1)?; // neutral_chroma_indication_flag
        self.interlaced = br.read_bits(1)? != 0; // field_seq_flag
        br.skip_bits(1)?; // frame_field_info_present_flag

        if br.read_bits(1)? != 0 {
            // default_display_window_flag
            br.read_ue()?;
            br.read_ue()?;
            br.read_ue()?;
            br.read_ue()?;
        }

        if br.read_bits(1)? != 0 {
            // vui_timing_info_present_flag
            self.num_units_in_tick = br.read_bits(32)?;
            self.time_scale = br.read_bits(32)?;
            if br.read_bits(1)? != 0 {
                // vui_poc_proportional_to_timing_flag
                br.read_ue()?; // vui_num_ticks_poc_diff_one_minus1
            }
            if br.read_bits(1)? != 0 {
                // vui_hrd_parameters_present_flag
                self.parse_hrd(br, max_sub_layers)?;
            }
        }

        Ok(())
    }

    /// 解析 hrd_parameters (commonInfPresentFlag = 1)
    fn parse_hrd(&mut self, br: &mut BitReader, max_sub_layers: u8) -> LiuResult<()> {
        let nal_hrd = br.read_bits(1)? != 0;
        let vcl_hrd = br.read_bits(1)? != 0;
        let mut sub_pic = false;

        if nal_hrd || vcl_hrd {
            sub_pic = br.read_bits(1)? != 0;
            self.sub_pic_hrd_params_present_flag = sub_pic;
            if sub_pic {
                br.skip_bits(8)?; // tick_divisor_minus2
                br.skip_bits(5)?; // du_cpb_removal_delay_increment_length_minus1
                br.skip_bits(1)?; // sub_pic_cpb_params_in_pic_timing_sei_flag
                br.skip_bits(5)?; // dpb_output_delay_du_length_minus1
            }
            br.skip_bits(8)?; // bit_rate_scale + cpb_size_scale
            if sub_pic {
                br.skip_bits(4)?; // cpb_size_du_scale
            }
            br.skip_bits(15)?; // 三个 xxx_delay_length_minus1 (各 5 位)
        }

        for _ in 0..max_sub_layers {
            let fixed_general = br.read_bits(1)? != 0;
            let fixed_within_cvs = if fixed_general {
                true
            } else {
                br.read_bits(1)? != 0
            };
            let mut low_delay = false;
            if fixed_within_cvs {
                br.read_ue()?; // elemental_duration_in_tc_minus1
            } else {
                low_delay = br.read_bits(1)? != 0;
            }
            let cpb_cnt = if low_delay { 1 } else { br.read_ue()? + 1 };

            for hrd_present in [nal_hrd, vcl_hrd] {
                if !hrd_present {
                    continue;
                }
                for _ in 0..cpb_cnt {
                    br.read_ue()?; // bit_rate_value_minus1
                    br.read_ue()?; // cpb_size_value_minus1
                    if sub_pic {
                        br.read_ue()?; // cpb_size_du_value_minus1
                        br.read_ue()?; // bit_rate_du_value_minus1
                    }
                    br.skip_bits(1)?; // cbr_flag
                }
            }
        }

        Ok(())
    }

    /// 获取帧率, 无时序信息时返回 0
    pub fn fps(&self) -> f64 {
        if self.num_units_in_tick > 0 {
            f64::from(self.time_scale) / f64::from(self.num_units_in_tick)
        } else {
            0.0
        }
    }

    /// 人类可读的描述
    pub fn description(&self) -> String {
        let mut descr = format!(
            "HEVC, Profile {}@L{:.1}, {}x{}{}",
            self.profile_idc,
            f64::from(self.level_idc) / 30.0,
            self.pic_width_in_luma_samples,
            self.pic_height_in_luma_samples,
            if self.interlaced { "i" } else { "p" },
        );
        if self.num_units_in_tick > 0 {
            descr.push_str(&format!(", 帧率: {:.3}", self.fps()));
        }
        descr
    }
}

/// 跳过 scaling_list_data
fn skip_scaling_list_data(br: &mut BitReader) -> LiuResult<()> {
    for size_id in 0..4u32 {
        let count = if size_id == 3 { 2 } else { 6 };
        for _ in 0..count {
            if br.read_bits(1)? == 0 {
                // scaling_list_pred_mode_flag
                br.read_ue()?; // scaling_list_pred_matrix_id_delta
            } else {
                let coef_num = 1u32 << (4 + (size_id << 1)).min(6);
                if size_id > 1 {
                    br.read_se()?; // scaling_list_dc_coef_minus8
                }
                for _ in 0..coef_num {
                    br.read_se()?; // scaling_list_delta_coef
                }
            }
        }
    }
    Ok(())
}

/// 跳过 short_term_ref_pic_set, 维护各集合的 delta POC 计数
fn skip_short_term_rps(
    br: &mut BitReader,
    idx: usize,
    num_delta_pocs: &mut [u32],
) -> LiuResult<()> {
    let predicted = if idx > 0 { br.read_bits(1)? != 0 } else { false };

    if predicted {
        br.skip_bits(1)?; // delta_rps_sign
        br.read_ue()?; // abs_delta_rps_minus1
        let prev = num_delta_pocs[idx - 1];
        let mut count = 0u32;
        for _ in 0..=prev {
            let used = br.read_bits(1)? != 0;
            let use_delta = if used { true } else { br.read_bits(1)? != 0 };
            if used || use_delta {
                count += 1;
            }
        }
        num_delta_pocs[idx] = count;
    } else {
        let num_negative = br.read_ue()?;
        let num_positive = br.read_ue()?;
        if num_negative > 16 || num_positive > 16 {
            return Err(LiuError::HevcParse("参考图像集大小超出范围".into()));
        }
        num_delta_pocs[idx] = num_negative + num_positive;
        for _ in 0..num_negative {
            br.read_ue()?; // delta_poc_s0_minus1
            br.skip_bits(1)?; // used_by_curr_pic_s0_flag
        }
        for _ in 0..num_positive {
            br.read_ue()?; // delta_poc_s1_minus1
            br.skip_bits(1)?; // used_by_curr_pic_s1_flag
        }
    }
    Ok(())
}

// ============================================================
// PPS
// ============================================================

/// 图像参数集 (Picture Parameter Set)
///
/// 只解析片头前缀所依赖的开头字段.
#[derive(Debug, Clone, Default)]
pub struct HevcPpsUnit {
    /// 公共单元部分
    pub unit: HevcUnit,
    /// PPS ID
    pub pps_id: u32,
    /// 引用的 SPS ID
    pub sps_id: u32,
    /// dependent_slice_segments_enabled_flag
    pub dependent_slice_segments_enabled_flag: bool,
    /// output_flag_present_flag
    pub output_flag_present_flag: bool,
    /// num_extra_slice_header_bits
    pub num_extra_slice_header_bits: u32,
}

impl HevcPpsUnit {
    /// 捕获 NAL 数据
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        self.unit.decode_buffer(data)
    }

    /// 位级解析 (前缀)
    pub fn deserialize(&mut self) -> LiuResult<()> {
        let mut br = self.unit.payload_reader()?;
        self.pps_id = br.read_ue()?;
        self.sps_id = br.read_ue()?;
        self.dependent_slice_segments_enabled_flag = br.read_bits(1)? != 0;
        self.output_flag_present_flag = br.read_bits(1)? != 0;
        self.num_extra_slice_header_bits = br.read_bits(3)?;
        Ok(())
    }
}

// ============================================================
// 片头
// ============================================================

/// 片头前缀
///
/// 只解码帧定时所需的开头部分: 首片标志, POC LSB, 以及片类型.
#[derive(Debug, Clone, Default)]
pub struct HevcSliceHeader {
    /// 公共单元部分
    pub unit: HevcUnit,
    /// first_slice_segment_in_pic_flag
    pub first_slice: bool,
    /// 引用的 PPS ID
    pub pps_id: u32,
    /// 片类型 (0=B, 1=P, 2=I)
    pub slice_type: u32,
    /// slice_pic_order_cnt_lsb
    pub pic_order_cnt_lsb: u32,
}

impl HevcSliceHeader {
    /// 捕获 NAL 数据
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        self.unit.decode_buffer(data)
    }

    /// 是否为 IDR 帧
    pub fn is_idr(&self) -> bool {
        self.unit.nal_type == NAL_IDR_W_RADL || self.unit.nal_type == NAL_IDR_N_LP
    }

    /// 位级解析片头前缀
    ///
    /// 只有 `first_slice` 片会被解析到 POC 字段; 非首片直接返回.
    pub fn deserialize(&mut self, sps: &HevcSpsUnit, pps: &HevcPpsUnit) -> LiuResult<()> {
        let mut br = self.unit.payload_reader()?;

        self.first_slice = br.read_bits(1)? != 0;
        if (NAL_BLA_W_LP..=NAL_RSV_IRAP_VCL23).contains(&self.unit.nal_type) {
            br.skip_bits(1)?; // no_output_of_prior_pics_flag
        }
        self.pps_id = br.read_ue()?;
        if !self.first_slice {
            return Ok(());
        }

        br.skip_bits(pps.num_extra_slice_header_bits)?;
        self.slice_type = br.read_ue()?;
        if pps.output_flag_present_flag {
            br.skip_bits(1)?; // pic_output_flag
        }
        if sps.separate_colour_plane_flag {
            br.skip_bits(2)?; // colour_plane_id
        }
        self.pic_order_cnt_lsb = if self.is_idr() {
            0
        } else {
            br.read_bits(sps.log2_max_pic_order_cnt_lsb)?
        };

        Ok(())
    }
}

// ============================================================
// SEI / HDR 信令
// ============================================================

/// HDR 描述符
///
/// 融合 VUI 色彩信令与 SEI/DV NAL 的探测结果.
#[derive(Debug, Clone, Default)]
pub struct HevcHdrUnit {
    /// 公共单元部分
    pub unit: HevcUnit,
    /// 检测到 HDR10 (主控显示色彩容量 SEI 或 BT.2100 PQ 信令)
    pub is_hdr10: bool,
    /// 检测到 HDR10+ (ST 2094-40 动态元数据)
    pub is_hdr10plus: bool,
    /// 检测到 Dolby Vision RPU NAL
    pub is_dv_rpu: bool,
    /// 检测到 Dolby Vision EL NAL
    pub is_dv_el: bool,
    /// Dolby Vision 兼容性标识 (0..8)
    pub dv_compatibility: u8,
}

/// SEI: mastering_display_colour_volume
const SEI_MASTERING_DISPLAY: usize = 137;
/// SEI: user_data_registered_itu_t_t35
const SEI_USER_DATA_T35: usize = 4;

impl HevcHdrUnit {
    /// 捕获 NAL 数据
    pub fn decode_buffer(&mut self, data: &[u8]) -> LiuResult<()> {
        self.unit.decode_buffer(data)
    }

    /// 遍历 SEI 消息, 更新 HDR 标志
    pub fn deserialize(&mut self) -> LiuResult<()> {
        let rbsp = self.unit.rbsp();
        if rbsp.len() < 2 {
            return Err(LiuError::HevcParse("SEI NAL 太短".into()));
        }
        let d = &rbsp[2..];
        let mut pos = 0usize;

        while pos < d.len() {
            // rbsp_trailing_bits
            if d[pos] == 0x80 {
                break;
            }

            let mut payload_type = 0usize;
            while pos < d.len() && d[pos] == 0xFF {
                payload_type += 255;
                pos += 1;
            }
            if pos >= d.len() {
                return Err(LiuError::HevcParse("SEI 负载类型被截断".into()));
            }
            payload_type += d[pos] as usize;
            pos += 1;

            let mut payload_size = 0usize;
            while pos < d.len() && d[pos] == 0xFF {
                payload_size += 255;
                pos += 1;
            }
            if pos >= d.len() {
                return Err(LiuError::HevcParse("SEI 负载长度被截断".into()));
            }
            payload_size += d[pos] as usize;
            pos += 1;

            if pos + payload_size > d.len() {
                return Err(LiuError::HevcParse("SEI 负载数据被截断".into()));
            }

            match payload_type {
                SEI_MASTERING_DISPLAY => self.is_hdr10 = true,
                SEI_USER_DATA_T35 => {
                    // ST 2094-40: 国家码 0xB5, 提供者 0x003C, 0x0001, 应用标识 4
                    let p = &d[pos..pos + payload_size];
                    if p.len() >= 7
                        && p[0] == 0xB5
                        && p[1] == 0x00
                        && p[2] == 0x3C
                        && p[3] == 0x00
                        && p[4] == 0x01
                        && p[5] == 4
                    {
                        self.is_hdr10plus = true;
                    }
                }
                _ => {}
            }

            pos += payload_size;
        }

        Ok(())
    }
}
