//! MOV 轨道状态.
//!
//! 每个 `trak` box 对应一个轨道, 其子 box 解析过程中逐步填充
//! 采样表与编解码参数. 采样表在取景 (framing) 阶段被消费.

use crate::demuxer::TrackKind;

use super::framer::SampleFramer;

/// 时间→采样条目 (stts / ctts 共用)
#[derive(Debug, Clone, Copy)]
pub struct SttsEntry {
    /// 采样计数
    pub count: u32,
    /// 每采样的时间增量 (ctts 时为合成偏移)
    pub duration: i64,
}

/// 采样→块条目 (stsc)
#[derive(Debug, Clone, Copy)]
pub struct StscEntry {
    /// 起始块号 (1-based)
    pub first: u32,
    /// 每块的采样数
    pub count: u32,
    /// 采样描述索引
    pub id: u32,
}

/// 采样表与轨道参数
///
/// 取景器通过 `index_cur` 游标单调消费逐样本大小表.
#[derive(Debug, Default)]
pub struct SampleTables {
    /// 对外轨道号 (1-based, 用于错误信息)
    pub ffindex: u32,
    /// 块偏移表 (stco/co64, 碎片文件时来自 trun)
    pub chunk_offsets: Vec<i64>,
    /// 逐样本大小表 (stsz, sample_size 为 0 时有效)
    pub sample_sizes: Vec<u32>,
    /// 逐样本大小表的消费游标
    pub index_cur: usize,
    /// 统一采样大小 (0 表示逐样本)
    pub sample_size: u32,
    /// 采样总数 (stsz)
    pub sample_count: u32,
    /// 时间→采样表 (stts)
    pub stts_data: Vec<SttsEntry>,
    /// 合成偏移表 (ctts)
    pub ctts_data: Vec<SttsEntry>,
    /// 采样→块表 (stsc)
    pub stsc_data: Vec<StscEntry>,
    /// 关键帧采样号列表 (stss, 1-based)
    pub keyframes: Vec<u32>,
    /// 媒体时间刻度
    pub time_scale: u32,
    /// 首个 stts 条目推出的帧率
    pub fps: f64,
    /// stsd 条目索引
    pub pseudo_stream_id: u32,
    /// 声道数
    pub channels: u32,
    /// 采样率
    pub sample_rate: u32,
    /// 每编码样本位数
    pub bits_per_coded_sample: u32,
    /// stsd 音频压缩 id
    pub audio_cid: i32,
    /// 包大小 (QT 音频)
    pub packet_size: u32,
    /// 每帧采样数 (QT v1/v2 音频)
    pub samples_per_frame: u32,
    /// 每帧字节数 (QT v1/v2 音频)
    pub bytes_per_frame: u32,
}

/// 一条 MOV 轨道
pub struct MovTrack {
    /// 轨道类型
    pub kind: TrackKind,
    /// ISO-639 语言码
    pub language: String,
    /// 编解码器私有数据 (avcC/hvcC/esds 负载等)
    pub codec_priv: Vec<u8>,
    /// 采样取景策略
    pub framer: Option<Box<dyn SampleFramer>>,
    /// 采样表
    pub tables: SampleTables,
}

impl MovTrack {
    /// 创建空轨道, `ffindex` 为 1-based 轨道号
    pub fn new(ffindex: u32) -> Self {
        Self {
            kind: TrackKind::Data,
            language: String::new(),
            codec_priv: Vec::new(),
            framer: None,
            tables: SampleTables {
                ffindex,
                ..SampleTables::default()
            },
        }
    }
}

/// QuickTime 旧式语言码表
///
/// 参见 Apple QTFF 规范第 4 章. 空串表示未分配.
const MOV_MDHD_LANGUAGE_MAP: [&str; 139] = [
    "eng", "fra", "deu", "ita", "dut", "sve", "spa", "dan", "por", "nor", "heb", "jpn", "ara",
    "fin", "ell", "isl", "mlt", "tur", "hrv", "zho", "urd", "hin", "tha", "kor", "lit", "pol",
    "hun", "est", "lav", "smi", "fao", "fas", "rus", "zho", "nld", "gle", "alb", "ron", "ces",
    "slk", "slv", "yid", "srp", "mkd", "bul", "ukr", "bel", "uzb", "kaz", "aze", "aze", "arm",
    "geo", "ron", "kir", "tgk", "tuk", "mon", "mon", "pus", "kur", "kas", "snd", "tib", "nep",
    "san", "mar", "ben", "asm", "guj", "pa ", "ori", "mal", "kan", "tam", "tel", "sin", "bur",
    "khm", "lao", "vie", "ind", "tgl", "may", "may", "amh", "tir", "orm", "som", "swa", "kin",
    "run", "nya", "mlg", "epo", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "",
    "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "", "cym", "eus", "cat",
    "lat", "que", "grn", "aym", "crh", "uig", "dzo", "jav",
];

/// mdhd 语言码 → ISO-639 三字母码
///
/// 大于 138 的值按 3×5 位打包字母解码, 否则查旧式 QuickTime 表.
pub fn lang_to_iso639(code: u16) -> Option<String> {
    if code > 138 {
        let mut chars = [0u8; 3];
        let mut c = code;
        for i in (0..3).rev() {
            chars[i] = 0x60 + (c & 0x1f) as u8;
            c >>= 5;
        }
        return Some(String::from_utf8_lossy(&chars).into_owned());
    }
    let entry = MOV_MDHD_LANGUAGE_MAP.get(code as usize)?;
    if entry.is_empty() {
        None
    } else {
        Some((*entry).to_string())
    }
}
