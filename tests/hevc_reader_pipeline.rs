//! HEVC 基本流读取器集成测试.
//!
//! 通过位级构造 VPS/SPS/PPS/片 NAL 拼成 Annex B 码流, 验证
//! 起始码扫描、防竞争字节处理、访问单元边界、时间轴推导和
//! TS 描述符输出的完整流程.

use liu::codec::hevc::{nal, units::HevcVpsUnit, HevcStreamReader};
use liu::codec::{CodecId, Packet};
use liu::core::error::LiuError;
use liu::core::BitWriter;

// ========================
// 辅助函数: 构造 NAL
// ========================

/// 写入 ue(v) 指数哥伦布码
fn write_ue(bw: &mut BitWriter, value: u32) {
    let code = value + 1;
    let bits = 32 - code.leading_zeros();
    bw.write_bits(0, bits - 1);
    bw.write_bits(code, bits);
}

/// 最小 profile_tier_level (sub_layers = 1)
fn write_ptl(bw: &mut BitWriter) {
    bw.write_bits(0, 2); // profile_space
    bw.write_bits(0, 1); // tier
    bw.write_bits(1, 5); // profile_idc (Main)
    bw.write_bits(0, 32); // compatibility
    bw.write_bits(0, 4);
    bw.write_bits(0, 32);
    bw.write_bits(0, 12); // 约束标志
    bw.write_bits(123, 8); // level 4.1
}

/// 带时序信息的最小 VPS NAL
fn build_vps(num_units_in_tick: u32, time_scale: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(u32::from(nal::NAL_VPS) << 9 | 1, 16);
    bw.write_bits(0, 4); // vps_id
    bw.write_bits(0b11, 2); // base_layer 标志
    bw.write_bits(0, 6); // max_layers_minus1
    bw.write_bits(0, 3); // max_sub_layers_minus1
    bw.write_bits(1, 1); // temporal_id_nesting
    bw.write_bits(0xFFFF, 16); // reserved
    write_ptl(&mut bw);
    bw.write_bits(1, 1); // sub_layer_ordering_info_present
    write_ue(&mut bw, 3);
    write_ue(&mut bw, 0);
    write_ue(&mut bw, 0);
    bw.write_bits(0, 6); // vps_max_layer_id
    write_ue(&mut bw, 0); // vps_num_layer_sets_minus1
    bw.write_bits(1, 1); // vps_timing_info_present
    bw.write_bits(num_units_in_tick, 32);
    bw.write_bits(time_scale, 32);
    bw.write_bits(1, 1); // rbsp_stop_one_bit
    nal::encode_nal_vec(&bw.finish())
}

/// 最小 SPS NAL
fn build_sps(width: u32, height: u32, log2_max_poc_lsb: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(u32::from(nal::NAL_SPS) << 9 | 1, 16);
    bw.write_bits(0, 4); // vps_id
    bw.write_bits(0, 3); // max_sub_layers_minus1
    bw.write_bits(1, 1); // temporal_id_nesting
    write_ptl(&mut bw);
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
    write_ue(&mut bw, 0);
    write_ue(&mut bw, 2);
    write_ue(&mut bw, 0);
    write_ue(&mut bw, 3);
    write_ue(&mut bw, 0);
    write_ue(&mut bw, 0);
    bw.write_bits(0, 1); // scaling_list_enabled
    bw.write_bits(0, 2); // amp + sao
    bw.write_bits(0, 1); // pcm_enabled
    write_ue(&mut bw, 0); // num_short_term_ref_pic_sets
    bw.write_bits(0, 1); // long_term_ref_pics_present
    bw.write_bits(0, 2); // temporal_mvp + strong_intra_smoothing
    bw.write_bits(0, 1); // vui_parameters_present
    bw.write_bits(1, 1); // rbsp_stop_one_bit
    nal::encode_nal_vec(&bw.finish())
}

/// 最小 PPS NAL
fn build_pps() -> Vec<u8> {
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

/// 首片 NAL
fn build_slice(nal_type: u8, poc_lsb: u32, poc_bits: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(u32::from(nal_type) << 9 | 1, 16);
    bw.write_bits(1, 1); // first_slice_segment_in_pic_flag
    if (16..=23).contains(&nal_type) {
        bw.write_bits(0, 1); // no_output_of_prior_pics
    }
    write_ue(&mut bw, 0); // pps_id
    write_ue(&mut bw, 1); // slice_type
    if !(nal_type == nal::NAL_IDR_W_RADL || nal_type == nal::NAL_IDR_N_LP) {
        bw.write_bits(poc_lsb, poc_bits);
    }
    bw.write_bits(0xFFFF, 16); // 填充
    nal::encode_nal_vec(&bw.finish())
}

/// 以 4 字节起始码拼接
fn annex_b(nals: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for n in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(n);
    }
    out
}

/// 参数集 + 指定 POC 序列的码流
fn build_stream(pocs: &[u32], poc_bits: u32) -> Vec<u8> {
    let vps = build_vps(1001, 24000);
    let sps = build_sps(1920, 1080, poc_bits);
    let pps = build_pps();
    let mut nals: Vec<Vec<u8>> = vec![vps, sps, pps];
    for (i, &poc) in pocs.iter().enumerate() {
        let nal_type = if i == 0 { nal::NAL_IDR_W_RADL } else { 1 };
        nals.push(build_slice(nal_type, poc, poc_bits));
    }
    let refs: Vec<&[u8]> = nals.iter().map(|v| v.as_slice()).collect();
    annex_b(&refs)
}

// ========================
// NAL 扫描
// ========================

#[test]
fn test_起始码扫描() {
    let data = [
        0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00, 0x00, 0x00, 0x01, 0x42, 0x01, 0xAA, 0xBB,
    ];
    let first = nal::find_next_nal(&data, 0);
    assert_eq!(first, 4);
    assert_eq!(nal::nal_type(data[first]), 0x20); // VPS
    let second = nal::find_next_nal(&data, first);
    assert_eq!(second, 10);
    assert_eq!(nal::nal_type(data[second]), 0x21); // SPS
}

#[test]
fn test_防竞争字节去除() {
    let src = [0xAA, 0x00, 0x00, 0x03, 0x01, 0xBB];
    let mut dst = [0u8; 16];
    let n = nal::decode_nal(&src, &mut dst).unwrap();
    assert_eq!(&dst[..n], &[0xAA, 0x00, 0x00, 0x01, 0xBB]);
}

// ========================
// VPS 时序
// ========================

#[test]
fn test_vps_fps_往返() {
    for fps in [23.976, 24.0, 25.0, 29.97, 50.0, 59.94] {
        let mut vps = HevcVpsUnit::default();
        vps.set_fps(fps);
        assert!(
            (vps.fps() - fps).abs() <= 1e-3,
            "fps {} 往返得到 {}",
            fps,
            vps.fps(),
        );
    }
}

#[test]
fn test_vps_序列化_字节一致() {
    let raw = build_vps(1000, 25000);
    let mut vps = HevcVpsUnit::default();
    vps.decode_buffer(&raw).unwrap();
    vps.deserialize().unwrap();

    let fps = vps.fps();
    vps.set_fps(fps);
    let mut out = vec![0u8; raw.len() + 16];
    let n = vps.serialize_buffer(&mut out).unwrap();
    assert_eq!(&out[..n], &raw[..]);
}

// ========================
// 读取器流水线
// ========================

/// 分小片喂入并收集全部访问单元
fn pump(stream: &[u8], step: usize) -> Vec<Packet> {
    let mut reader = HevcStreamReader::new();
    let mut fed = 0usize;
    let mut packets = Vec::new();
    loop {
        match reader.next_access_unit() {
            Ok(pkt) => packets.push(pkt),
            Err(LiuError::NeedMoreData) | Err(LiuError::NotEnoughBuffer) => {
                if fed >= stream.len() {
                    unreachable!("EOF 后仍要求更多数据");
                }
                let end = (fed + step).min(stream.len());
                reader.feed(&stream[fed..end]).unwrap();
                fed = end;
                if fed >= stream.len() {
                    reader.set_eof();
                }
            }
            Err(LiuError::Eof) => break,
            Err(e) => panic!("解码失败: {}", e),
        }
    }
    packets
}

#[test]
fn test_流水线_分片喂入() {
    let stream = build_stream(&[0, 1, 2, 3, 4], 4);
    // 以 17 字节为步长增量喂入
    let packets = pump(&stream, 17);
    assert_eq!(packets.len(), 5);

    // 字节完整性: 所有输出拼起来等于输入
    let total: usize = packets.iter().map(|p| p.data.len()).sum();
    assert_eq!(total, stream.len());

    // 第一帧是 IDR 且带参数集标记
    assert!(packets[0].is_keyframe);
    assert!(packets[0].flags & Packet::FLAG_SPS_PPS_IN_GOP != 0);

    // DTS 严格递增, 顺序播放时 PTS == DTS
    let inc = (90000.0 / 23.976_f64).round() as i64;
    for w in packets.windows(2) {
        assert_eq!(w[1].dts - w[0].dts, inc);
        assert!(w[1].pts >= w[1].dts - 4 * inc);
    }
}

#[test]
fn test_探测与描述() {
    let stream = build_stream(&[0, 1], 4);
    let mut reader = HevcStreamReader::new();
    let rez = reader.check_stream(&stream);
    assert_eq!(rez.codec, CodecId::H265);
    assert!(rez.description.contains("1920x1080"), "{}", rez.description);
    assert_eq!(reader.stream_hdr(), 1); // SDR
}

#[test]
fn test_ts描述符() {
    let stream = build_stream(&[0, 1], 4);
    let mut reader = HevcStreamReader::new();
    reader.feed(&stream).unwrap();
    reader.set_eof();

    let desc = reader.ts_descriptor(true);
    // 'HDMV' 注册描述符 + 视频格式/帧率 + 宽高比
    assert_eq!(
        desc,
        vec![0x05, 0x08, b'H', b'D', b'M', b'V', 0xff, 0x24, (6 << 4) | 1, (3 << 4) | 0x0f],
    );
}

#[test]
fn test_帧率覆盖_改写vps() {
    let stream = build_stream(&[0, 1, 2], 4);
    let mut reader = HevcStreamReader::new();
    reader.set_fps_override(25.0);
    reader.feed(&stream).unwrap();
    reader.set_eof();

    let first = reader.next_access_unit().unwrap();

    // 输出流中的 VPS 携带新时序
    let mut probe = HevcStreamReader::new();
    let rez = probe.check_stream(&first.data);
    assert_eq!(rez.codec, CodecId::H265);
    assert!((probe.fps() - 25.0).abs() < 1e-3);

    // 时钟增量按覆盖帧率推进
    let second = reader.next_access_unit().unwrap();
    assert_eq!(second.dts - first.dts, 3600); // 90000 / 25
}

#[test]
fn test_超出工作缓冲区() {
    let mut reader = HevcStreamReader::new();
    let big = vec![0u8; 3 * 1024 * 1024];
    reader.feed(&big).unwrap();
    // 第二次注入超过容量上限
    assert!(matches!(
        reader.feed(&big),
        Err(LiuError::BufferTooSmall)
    ));
}
