//! HEVC (H.265) 基本流解析.
//!
//! 分为四层:
//! - `nal`: 起始码定位与防竞争字节处理
//! - `units`: VPS/SPS/PPS/片头/SEI 语法单元
//! - `reader`: 前向扫描的访问单元检测与时间轴推导
//! - `descriptor`: TS 描述符所需的 Blu-ray/DoVi 参数

pub mod descriptor;
pub mod nal;
pub mod reader;
pub mod units;

pub use reader::{CheckResult, HevcStreamReader};

/// 测试用码流构造工具
#[cfg(test)]
pub(crate) mod testdata {
    use liu_core::BitWriter;

    use super::nal;
    use super::nal::{NAL_BLA_W_LP, NAL_IDR_N_LP, NAL_IDR_W_RADL, NAL_RSV_IRAP_VCL23};

    /// 写入 ue(v) 指数哥伦布码
    pub fn write_ue(bw: &mut BitWriter, value: u32) {
        let code = value + 1;
        let bits = 32 - code.leading_zeros();
        bw.write_bits(0, bits - 1);
        bw.write_bits(code, bits);
    }

    /// 构建最小 profile_tier_level (sub_layers = 1)
    pub fn write_ptl(bw: &mut BitWriter, profile_idc: u32, level_idc: u32) {
        bw.write_bits(0, 2); // profile_space
        bw.write_bits(0, 1); // tier
        bw.write_bits(profile_idc, 5);
        bw.write_bits(0, 32); // compatibility
        bw.write_bits(0, 4); // progressive 等
        bw.write_bits(0, 32);
        bw.write_bits(0, 12); // 约束标志
        bw.write_bits(level_idc, 8);
    }

    /// 构建带时序信息的最小 VPS NAL (含 2 字节头, 已插入防竞争字节)
    pub fn build_vps_nal(num_units_in_tick: u32, time_scale: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        // NAL 头: type=32
        bw.write_bits(u32::from(nal::NAL_VPS) << 9 | 1, 16);
        bw.write_bits(0, 4); // vps_id
        bw.write_bits(0b11, 2); // base_layer 标志
        bw.write_bits(0, 6); // max_layers_minus1
        bw.write_bits(0, 3); // max_sub_layers_minus1
        bw.write_bits(1, 1); // temporal_id_nesting
        bw.write_bits(0xFFFF, 16); // reserved
        write_ptl(&mut bw, 1, 123);
        bw.write_bits(1, 1); // sub_layer_ordering_info_present
        write_ue(&mut bw, 3); // max_dec_pic_buffering_minus1
        write_ue(&mut bw, 0); // max_num_reorder_pics
        write_ue(&mut bw, 0); // max_latency_increase
        bw.write_bits(0, 6); // vps_max_layer_id
        write_ue(&mut bw, 0); // vps_num_layer_sets_minus1
        bw.write_bits(1, 1); // vps_timing_info_present
        bw.write_bits(num_units_in_tick, 32);
        bw.write_bits(time_scale, 32);
        bw.write_bits(1, 1); // rbsp_stop_one_bit
        nal::encode_nal_vec(&bw.finish())
    }

    /// 构建最小 SPS NAL (含 2 字节头)
    pub fn build_sps_nal(
        width: u32,
        height: u32,
        log2_max_poc_lsb: u32,
        colour: Option<(u32, u32, u32, u32)>,
    ) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(u32::from(nal::NAL_SPS) << 9 | 1, 16);
        bw.write_bits(0, 4); // vps_id
        bw.write_bits(0, 3); // max_sub_layers_minus1
        bw.write_bits(1, 1); // temporal_id_nesting
        write_ptl(&mut bw, 1, 123);
        write_ue(&mut bw, 0); // sps_id
        write_ue(&mut bw, 1); // chroma_format_idc
        write_ue(&mut bw, width);
        write_ue(&mut bw, height);
        bw.write_bits(0, 1); // conformance_window_flag
        write_ue(&mut bw, 0); // bit_depth_luma_minus8
        write_ue(&mut bw, 0); // bit_depth_chroma_minus8
        write_ue(&mut bw, log2_max_poc_lsb - 4);
        bw.write_bits(1, 1); // sub_layer_ordering_info_present
        write_ue(&mut bw, 3);
        write_ue(&mut bw, 0);
        write_ue(&mut bw, 0);
        write_ue(&mut bw, 0); // log2_min_luma_coding_block_size_minus3
        write_ue(&mut bw, 2); // log2_diff_max_min
        write_ue(&mut bw, 0); // log2_min_transform
        write_ue(&mut bw, 3); // log2_diff_transform
        write_ue(&mut bw, 0); // depth inter
        write_ue(&mut bw, 0); // depth intra
        bw.write_bits(0, 1); // scaling_list_enabled
        bw.write_bits(0, 2); // amp + sao
        bw.write_bits(0, 1); // pcm_enabled
        write_ue(&mut bw, 0); // num_short_term_ref_pic_sets
        bw.write_bits(0, 1); // long_term_ref_pics_present
        bw.write_bits(0, 2); // temporal_mvp + strong_intra_smoothing

        match colour {
            None => bw.write_bits(0, 1), // vui_parameters_present = 0
            Some((cp, tc, mc, cslt)) => {
                bw.write_bits(1, 1); // vui_parameters_present
                bw.write_bits(0, 1); // aspect_ratio_info_present
                bw.write_bits(0, 1); // overscan_info_present
                bw.write_bits(1, 1); // video_signal_type_present
                bw.write_bits(5, 3); // video_format (unspecified)
                bw.write_bits(0, 1); // full_range
                bw.write_bits(1, 1); // colour_description_present
                bw.write_bits(cp, 8);
                bw.write_bits(tc, 8);
                bw.write_bits(mc, 8);
                bw.write_bits(1, 1); // chroma_loc_info_present
                write_ue(&mut bw, cslt);
                write_ue(&mut bw, 0); // bottom_field
                bw.write_bits(0, 1); // neutral_chroma
                bw.write_bits(0, 1); // field_seq
                bw.write_bits(0, 1); // frame_field_info
                bw.write_bits(0, 1); // default_display_window
                bw.write_bits(0, 1); // timing_info_present
            }
        }
        bw.write_bits(1, 1); // rbsp_stop_one_bit
        nal::encode_nal_vec(&bw.finish())
    }

    /// 构建最小 PPS NAL
    pub fn build_pps_nal() -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(u32::from(nal::NAL_PPS) << 9 | 1, 16);
        write_ue(&mut bw, 0); // pps_id
        write_ue(&mut bw, 0); // sps_id
        bw.write_bits(0, 1); // dependent_slice_segments_enabled
        bw.write_bits(0, 1); // output_flag_present
        bw.write_bits(0, 3); // num_extra_slice_header_bits
        bw.write_bits(1, 1); // rbsp_stop_one_bit
        nal::encode_nal_vec(&bw.finish())
    }

    /// 构建片 NAL: 首片标志 + POC
    pub fn build_slice_nal(nal_type: u8, first_slice: bool, poc_lsb: u32, poc_bits: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(u32::from(nal_type) << 9 | 1, 16);
        bw.write_bits(u32::from(first_slice), 1);
        if (NAL_BLA_W_LP..=NAL_RSV_IRAP_VCL23).contains(&nal_type) {
            bw.write_bits(0, 1); // no_output_of_prior_pics
        }
        write_ue(&mut bw, 0); // pps_id
        if first_slice {
            write_ue(&mut bw, 1); // slice_type (P)
            if !(nal_type == NAL_IDR_W_RADL || nal_type == NAL_IDR_N_LP) {
                bw.write_bits(poc_lsb, poc_bits);
            }
        }
        // 填充避免片头被截断
        bw.write_bits(0xFFFF, 16);
        nal::encode_nal_vec(&bw.finish())
    }

    /// 以 4 字节起始码拼接若干 NAL 为 Annex B 码流
    pub fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nal);
        }
        out
    }
}
