//! Blu-ray / Dolby Vision 描述符参数.
//!
//! 为 TS 打包器提供 HDMV 描述符中的视频格式/帧率/宽高比索引,
//! 以及 DoVi 描述符的等级推导.

/// 按 Blu-ray 规范推导 (video_format, frame_rate_index, aspect_ratio_index)
pub fn bluray_stream_params(
    fps: f64,
    interlaced: bool,
    width: u32,
    height: u32,
    dar: f64,
) -> (u8, u8, u8) {
    let aspect_ratio_index = if (dar - 4.0 / 3.0).abs() < 0.05 { 2 } else { 3 };

    let video_format = if height >= 2160 {
        8
    } else if height == 1080 {
        if interlaced { 4 } else { 6 }
    } else if height == 720 {
        5
    } else if height == 576 {
        if interlaced { 2 } else { 7 }
    } else if height == 480 {
        if interlaced { 1 } else { 3 }
    } else {
        let _ = width;
        0
    };

    let frame_rate_index = if (fps - 23.976).abs() < 1e-4 {
        1
    } else if (fps - 24.0).abs() < 1e-4 {
        2
    } else if (fps - 25.0).abs() < 1e-4 {
        3
    } else if (fps - 29.97).abs() < 1e-4 {
        4
    } else if (fps - 50.0).abs() < 1e-4 {
        6
    } else if (fps - 59.94).abs() < 1e-4 {
        7
    } else {
        0
    };

    (video_format, frame_rate_index, aspect_ratio_index)
}

/// 按像素速率推导 DoVi 等级 (1..13, 0 表示超出所有等级)
///
/// 参见 "Dolby Vision Profiles and Levels" 等级表.
pub fn dovi_level(width: u32, pixel_rate: f64) -> u8 {
    let w = width as f64;
    let checks: [(f64, f64, u8); 13] = [
        (1280.0, 22_118_400.0, 1),
        (1280.0, 27_648_000.0, 2),
        (1920.0, 49_766_400.0, 3),
        (2560.0, 62_208_000.0, 4),
        (3840.0, 124_416_000.0, 5),
        (3840.0, 199_065_600.0, 6),
        (3840.0, 248_832_000.0, 7),
        (3840.0, 398_131_200.0, 8),
        (3840.0, 497_664_000.0, 9),
        (3840.0, 995_328_000.0, 10),
        (7680.0, 995_328_000.0, 11),
        (7680.0, 1_990_656_000.0, 12),
        (7680.0, 3_981_312_000.0, 13),
    ];
    for (max_width, max_rate, level) in checks {
        if w <= max_width && pixel_rate <= max_rate {
            return level;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluray_params_1080p24() {
        let (vf, fr, ar) = bluray_stream_params(23.976, false, 1920, 1080, 16.0 / 9.0);
        assert_eq!(vf, 6);
        assert_eq!(fr, 1);
        assert_eq!(ar, 3);
    }

    #[test]
    fn test_bluray_params_1080i25() {
        let (vf, fr, ar) = bluray_stream_params(25.0, true, 1920, 1080, 16.0 / 9.0);
        assert_eq!(vf, 4);
        assert_eq!(fr, 3);
        assert_eq!(ar, 3);
    }

    #[test]
    fn test_bluray_params_2160p() {
        let (vf, fr, _) = bluray_stream_params(59.94, false, 3840, 2160, 16.0 / 9.0);
        assert_eq!(vf, 8);
        assert_eq!(fr, 7);
    }

    #[test]
    fn test_bluray_params_sd_4x3() {
        let (vf, fr, ar) = bluray_stream_params(29.97, true, 720, 480, 4.0 / 3.0);
        assert_eq!(vf, 1);
        assert_eq!(fr, 4);
        assert_eq!(ar, 2);
    }

    #[test]
    fn test_dovi_level() {
        // 1080p24: 1920*1080*24 = 49.77M → 等级 3
        assert_eq!(dovi_level(1920, 1920.0 * 1080.0 * 24.0), 3);
        // 2160p60: 3840*2160*60 = 497.7M → 等级 9
        assert_eq!(dovi_level(3840, 3840.0 * 2160.0 * 60.0), 9);
        // 720p24
        assert_eq!(dovi_level(1280, 1280.0 * 720.0 * 24.0), 1);
    }
}
