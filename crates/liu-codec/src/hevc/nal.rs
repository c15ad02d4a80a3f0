//! HEVC NAL (Network Abstraction Layer) 单元扫描与 RBSP 处理.
//!
//! 提供 Annex B 起始码定位、防竞争字节 (emulation prevention byte) 的
//! 去除与插入, 以及 hvcC 配置记录中参数集 NAL 的提取.
//!
//! HEVC NAL 头部为 2 字节:
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)

use liu_core::{LiuError, LiuResult};

// NAL 单元类型 (ITU-T H.265 表 7-1)
pub const NAL_TRAIL_N: u8 = 0;
pub const NAL_RASL_R: u8 = 9;
pub const NAL_BLA_W_LP: u8 = 16;
pub const NAL_IDR_W_RADL: u8 = 19;
pub const NAL_IDR_N_LP: u8 = 20;
pub const NAL_CRA: u8 = 21;
pub const NAL_RSV_IRAP_VCL23: u8 = 23;
pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
pub const NAL_AUD: u8 = 35;
pub const NAL_SEI_PREFIX: u8 = 39;
pub const NAL_SEI_SUFFIX: u8 = 40;
pub const NAL_FD_NUT: u8 = 38;
pub const NAL_RSV_NVCL45: u8 = 45;
pub const NAL_RSV_NVCL47: u8 = 47;
pub const NAL_UNSPEC56: u8 = 56;
/// Dolby Vision RPU (未指定范围内的私有类型)
pub const NAL_DVRPU: u8 = 62;
/// Dolby Vision EL (未指定范围内的私有类型)
pub const NAL_DVEL: u8 = 63;

/// 从字节中取 NAL 单元类型
#[inline]
pub fn nal_type(first_byte: u8) -> u8 {
    (first_byte >> 1) & 0x3f
}

/// 查找下一个起始码, 返回紧跟在 `00 00 01` / `00 00 00 01` 之后的位置
///
/// 未找到时返回 `data.len()`.
pub fn find_next_nal(data: &[u8], from: usize) -> usize {
    let mut i = from + 2;
    while i < data.len() {
        let b = data[i];
        if b > 1 {
            i += 3;
        } else if b == 0 {
            i += 1;
        } else if data[i - 2] == 0 && data[i - 1] == 0 {
            return i + 1;
        } else {
            i += 3;
        }
    }
    data.len()
}

/// 查找下一个 NAL, 返回其起始码第一个 `00` 字节的位置
///
/// `long_codes` 为真时, 若起始码为 4 字节形式 (`00 00 00 01`),
/// 返回位置再前移一个字节.
pub fn find_nal_with_start_code(data: &[u8], from: usize, long_codes: bool) -> usize {
    let nal = find_next_nal(data, from);
    if nal == data.len() {
        return nal;
    }
    if long_codes && nal >= from + 4 && data[nal - 4] == 0 {
        return nal - 4;
    }
    nal - 3
}

/// 去除防竞争字节 (RBSP 提取)
///
/// 将 `src` 复制到 `dst`, 丢弃每个紧跟在两个 `00` 之后的 `03` 字节.
/// 返回写入的字节数; `dst` 容量不足时返回 `BufferTooSmall`.
pub fn decode_nal(src: &[u8], dst: &mut [u8]) -> LiuResult<usize> {
    let mut out = 0usize;
    let mut zeros = 0u32;
    for &b in src {
        if b == 3 && zeros >= 2 {
            zeros = 0;
            continue;
        }
        if out >= dst.len() {
            return Err(LiuError::BufferTooSmall);
        }
        dst[out] = b;
        out += 1;
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    Ok(out)
}

/// 去除防竞争字节, 输出到新分配的缓冲区
pub fn decode_nal_vec(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut zeros = 0u32;
    for &b in src {
        if b == 3 && zeros >= 2 {
            zeros = 0;
            continue;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    out
}

/// 插入防竞争字节 (RBSP → NAL)
///
/// 在两个 `00` 之后遇到 `00`-`03` 时插入一个 `03`.
/// 返回写入的字节数; `dst` 容量不足时返回 `BufferTooSmall`.
pub fn encode_nal(src: &[u8], dst: &mut [u8]) -> LiuResult<usize> {
    let mut out = 0usize;
    let mut zeros = 0u32;
    for &b in src {
        if zeros >= 2 && b <= 3 {
            if out >= dst.len() {
                return Err(LiuError::BufferTooSmall);
            }
            dst[out] = 3;
            out += 1;
            zeros = 0;
        }
        if out >= dst.len() {
            return Err(LiuError::BufferTooSmall);
        }
        dst[out] = b;
        out += 1;
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    Ok(out)
}

/// 插入防竞争字节, 输出到新分配的缓冲区
pub fn encode_nal_vec(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + 8);
    let mut zeros = 0u32;
    for &b in src {
        if zeros >= 2 && b <= 3 {
            out.push(3);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    out
}

/// 从 hvcC (HEVCDecoderConfigurationRecord) 中提取参数集 NAL 列表
///
/// 返回按出现顺序排列的 NAL (VPS/SPS/PPS/SEI, 含 2 字节头)
/// 和长度前缀字段的字节数.
pub fn extract_hvcc_nal_units(data: &[u8]) -> LiuResult<(Vec<Vec<u8>>, u8)> {
    if data.len() < 23 {
        return Err(LiuError::HevcParse("hvcC 数据太短".into()));
    }

    // byte 21: constantFrameRate(2) | numTemporalLayers(3) | temporalIdNested(1) | lengthSizeMinusOne(2)
    let length_size = (data[21] & 0x03) + 1;
    let num_arrays = data[22];

    let mut units = Vec::new();
    let mut pos = 23usize;

    for _ in 0..num_arrays {
        if pos + 3 > data.len() {
            return Err(LiuError::HevcParse("hvcC 数组头被截断".into()));
        }
        let _nal_type = data[pos] & 0x3F;
        let num_nalus = u16::from_be_bytes([data[pos + 1], data[pos + 2]]) as usize;
        pos += 3;

        for _ in 0..num_nalus {
            if pos + 2 > data.len() {
                return Err(LiuError::HevcParse("hvcC NAL 长度被截断".into()));
            }
            let nal_len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2;
            if pos + nal_len > data.len() {
                return Err(LiuError::HevcParse("hvcC NAL 数据被截断".into()));
            }
            if nal_len > 0 {
                units.push(data[pos..pos + nal_len].to_vec());
            }
            pos += nal_len;
        }
    }

    Ok((units, length_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_next_nal() {
        // 两个 NAL: VPS (0x40) 位于偏移 4, SPS (0x42) 位于偏移 10
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00, 0x00, 0x00, 0x01, 0x42, 0x01, 0xAA,
        ];
        let first = find_next_nal(&data, 0);
        assert_eq!(first, 4);
        assert_eq!(nal_type(data[first]), NAL_VPS);
        let second = find_next_nal(&data, first);
        assert_eq!(second, 10);
        assert_eq!(nal_type(data[second]), NAL_SPS);
        assert_eq!(find_next_nal(&data, second), data.len());
    }

    #[test]
    fn test_find_nal_with_start_code() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0x00, 0x00, 0x01, 0x42, 0x01,
        ];
        // 短起始码形式
        assert_eq!(find_nal_with_start_code(&data, 4, false), 6);
        // 长起始码形式: 第一个 NAL 前是 4 字节起始码
        assert_eq!(find_nal_with_start_code(&data, 0, true), 0);
    }

    #[test]
    fn test_decode_nal_去除防竞争() {
        let src = [0xAA, 0x00, 0x00, 0x03, 0x01, 0xBB];
        let mut dst = [0u8; 16];
        let n = decode_nal(&src, &mut dst).unwrap();
        assert_eq!(&dst[..n], &[0xAA, 0x00, 0x00, 0x01, 0xBB]);
    }

    #[test]
    fn test_decode_nal_缓冲区不足() {
        let src = [0xAA, 0xBB, 0xCC];
        let mut dst = [0u8; 2];
        assert!(matches!(
            decode_nal(&src, &mut dst),
            Err(LiuError::BufferTooSmall)
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let rbsp = [0x40, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF];
        let mut encoded = [0u8; 32];
        let n = encode_nal(&rbsp, &mut encoded).unwrap();
        // 00 00 01 和 00 00 00 处都需要插入 03
        assert!(n > rbsp.len());
        let decoded = decode_nal_vec(&encoded[..n]);
        assert_eq!(decoded, rbsp);
    }

    #[test]
    fn test_encode_nal_插入位置() {
        let rbsp = [0x00, 0x00, 0x01];
        let mut dst = [0u8; 8];
        let n = encode_nal(&rbsp, &mut dst).unwrap();
        assert_eq!(&dst[..n], &[0x00, 0x00, 0x03, 0x01]);
    }

    #[test]
    fn test_extract_hvcc() {
        let vps = [0x40, 0x01, 0x0C];
        let sps = [0x42, 0x01, 0x01];
        let pps = [0x44, 0x01, 0xC1];

        let mut hvcc = vec![0u8; 22];
        hvcc[0] = 1; // configurationVersion
        hvcc[21] = 0x03; // lengthSizeMinusOne = 3
        hvcc.push(3); // numOfArrays
        for (ty, nal) in [(0x20u8, &vps[..]), (0x21, &sps[..]), (0x22, &pps[..])] {
            hvcc.push(ty);
            hvcc.extend_from_slice(&1u16.to_be_bytes());
            hvcc.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            hvcc.extend_from_slice(nal);
        }

        let (units, length_size) = extract_hvcc_nal_units(&hvcc).unwrap();
        assert_eq!(length_size, 4);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], vps);
        assert_eq!(units[1], sps);
        assert_eq!(units[2], pps);
    }
}
