//! MP4/MOV (ISO Base Media File Format) 解封装器.
//!
//! 基于 ISO 14496-12 的递归 box 树解析, 支持连续与碎片 (moof) 两种布局,
//! 以及 64 位扩展 box 大小. 每条轨道的采样经取景器重组后按
//! 文件偏移顺序输出.
//!
//! # Box 树结构
//! ```text
//! ftyp                  文件类型
//! moov                  影片元数据
//! ├── mvhd              影片头部 (时长, 时间刻度)
//! ├── trak              轨道 (每个基本流一个)
//! │   ├── tkhd          轨道头部
//! │   ├── edts/elst     编辑列表 (首时间码)
//! │   └── mdia
//! │       ├── mdhd      媒体头部 (时间刻度, 语言)
//! │       ├── hdlr      处理器引用
//! │       └── minf/stbl 采样表 (stsd stts ctts stsc stsz stss stco/co64)
//! ├── mvex/trex         碎片默认值
//! └── udta              元数据 (©xxx, trkn)
//! moof/traf/tfhd/trun   影片碎片
//! mdat                  媒体数据
//! ```

pub mod framer;
pub mod track;

use std::collections::{BTreeMap, HashSet};
use std::io::SeekFrom;

use liu_codec::{CodecId, Packet};
use liu_core::{LiuError, LiuResult};
use log::{debug, warn};

use crate::demuxer::{DemuxedData, Demuxer, FileNameIterator, TrackFilter, TrackInfo, TrackKind};
use crate::io::IoContext;

use self::framer::{AudioFramer, NalFramer, SampleFramer, Tx3gFramer};
use self::track::{MovTrack, SttsEntry, StscEntry, lang_to_iso639};

/// MPEG-4 描述符 tag
const MP4_ES_DESCR_TAG: u8 = 0x03;
const MP4_DEC_CONFIG_DESCR_TAG: u8 = 0x04;
const MP4_DEC_SPECIFIC_DESCR_TAG: u8 = 0x05;

/// 默认单次解出的块大小
const DEFAULT_FILE_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// 一个 box (atom) 头
#[derive(Debug, Clone, Copy)]
struct MovAtom {
    tag: [u8; 4],
    offset: i64,
    size: i64,
}

/// 当前影片碎片状态 (tfhd/trun)
#[derive(Debug, Clone, Copy, Default)]
struct MovFragment {
    track_id: u32,
    base_data_offset: i64,
    stsd_id: u32,
    #[allow(dead_code)]
    duration: u32,
    size: u32,
    #[allow(dead_code)]
    flags: u32,
    moof_offset: i64,
}

/// trex 登记的每轨道默认值
#[derive(Debug, Clone, Copy, Default)]
struct MovTrackExt {
    track_id: u32,
    stsd_id: u32,
    duration: u32,
    size: u32,
    flags: u32,
}

/// 在错误信息上附加文件字节位置
fn at_position(err: LiuError, pos: i64) -> LiuError {
    match err {
        LiuError::MovParse(msg) => LiuError::MovParse(format!("{} (位置 {})", msg, pos)),
        other => other,
    }
}

/// MP4/MOV 解封装器
pub struct MovDemuxer {
    io: Option<IoContext>,
    file_name: String,
    tracks: Vec<MovTrack>,

    found_moov: bool,
    found_moof: bool,
    mdat_pos: i64,
    mdat_size: i64,
    /// 每个 mdat box 的 (偏移, 大小); 碎片文件按块号索引
    mdat_data: Vec<(i64, i64)>,
    file_size: u64,
    timescale: u32,
    /// 文件时长 (纳秒)
    file_duration: i64,
    isom: bool,
    itunes_metadata: bool,
    metadata: BTreeMap<String, String>,
    /// 编辑列表给出的轨道首时间码 (毫秒), 键为 1-based 轨道号
    first_timecode: BTreeMap<u32, i64>,

    /// 全局块列表: (相对 mdat 的偏移, 轨道下标), 按偏移升序
    chunks: Vec<(i64, usize)>,
    cur_chunk: usize,
    first_demux: bool,
    first_header_size: i64,
    processed_bytes: i64,
    is_eof: bool,

    fragment: MovFragment,
    trex_data: Vec<MovTrackExt>,

    file_iterator: Option<Box<dyn FileNameIterator>>,
    filters: BTreeMap<u32, Box<dyn TrackFilter>>,
    file_block_size: usize,
}

impl Default for MovDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl MovDemuxer {
    /// 创建解封装器
    pub fn new() -> Self {
        Self {
            io: None,
            file_name: String::new(),
            tracks: Vec::new(),
            found_moov: false,
            found_moof: false,
            mdat_pos: 0,
            mdat_size: 0,
            mdat_data: Vec::new(),
            file_size: 0,
            timescale: 0,
            file_duration: 0,
            isom: false,
            itunes_metadata: false,
            metadata: BTreeMap::new(),
            first_timecode: BTreeMap::new(),
            chunks: Vec::new(),
            cur_chunk: 0,
            first_demux: true,
            first_header_size: 0,
            processed_bytes: 0,
            is_eof: false,
            fragment: MovFragment::default(),
            trex_data: Vec::new(),
            file_iterator: None,
            filters: BTreeMap::new(),
            file_block_size: DEFAULT_FILE_BLOCK_SIZE,
        }
    }

    /// 设置播放列表迭代器 (文件链)
    pub fn set_file_iterator(&mut self, iterator: Box<dyn FileNameIterator>) {
        self.file_iterator = Some(iterator);
    }

    /// 为指定轨道挂接过滤器
    pub fn set_track_filter(&mut self, track_id: u32, filter: Box<dyn TrackFilter>) {
        self.filters.insert(track_id, filter);
    }

    /// 设置单次解块的目标大小
    pub fn set_file_block_size(&mut self, size: usize) {
        self.file_block_size = size;
    }

    /// 当前打开的文件名
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// 容器级元数据 (©xxx, trkn)
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// 编辑列表给出的首时间码 (毫秒)
    pub fn first_timecode(&self, track_id: u32) -> Option<i64> {
        self.first_timecode.get(&track_id).copied()
    }

    /// 轨道帧率 (来自首个 stts 条目)
    pub fn track_fps(&self, track_id: u32) -> f64 {
        if track_id == 0 {
            return 0.0;
        }
        self.tracks
            .get(track_id as usize - 1)
            .map_or(0.0, |t| t.tables.fps)
    }

    /// 打开输入文件并解析头部
    pub fn open_file(&mut self, name: &str) -> LiuResult<()> {
        let io = IoContext::open_read(name)?;
        self.file_name = name.to_string();
        self.open_io(io)
    }

    /// 从已构造的 I/O 上下文打开 (测试及内存输入)
    pub fn open_io(&mut self, io: IoContext) -> LiuResult<()> {
        // 打开前拆除上一文件的全部状态
        self.found_moov = false;
        self.found_moof = false;
        self.mdat_pos = 0;
        self.mdat_size = 0;
        self.mdat_data.clear();
        self.timescale = 0;
        self.file_duration = 0;
        self.isom = false;
        self.itunes_metadata = false;
        self.cur_chunk = 0;
        self.first_demux = true;
        self.processed_bytes = 0;
        self.is_eof = false;
        self.tracks.clear();
        self.trex_data.clear();
        self.chunks.clear();
        self.fragment = MovFragment::default();

        self.file_size = io.size().unwrap_or(u64::MAX);
        self.io = Some(io);

        self.read_headers()?;
        if self.mdat_pos != 0 && self.processed_bytes != self.mdat_pos {
            self.url_fseek(self.mdat_pos)?;
        }
        self.build_index()?;
        self.first_header_size = self.processed_bytes;

        debug!(
            "打开 MP4/MOV: {} 条轨道, {} 个块, 碎片布局: {}",
            self.tracks.len(),
            self.chunks.len(),
            self.found_moof,
        );
        Ok(())
    }

    // ========================
    // I/O 辅助
    // ========================

    fn io_mut(&mut self) -> LiuResult<&mut IoContext> {
        self.io
            .as_mut()
            .ok_or_else(|| LiuError::MovParse("输入流未打开".into()))
    }

    fn get_byte(&mut self) -> LiuResult<u8> {
        let v = self.io_mut()?.read_u8()?;
        self.processed_bytes += 1;
        Ok(v)
    }

    fn get_be16(&mut self) -> LiuResult<u16> {
        let v = self.io_mut()?.read_u16_be()?;
        self.processed_bytes += 2;
        Ok(v)
    }

    fn get_be24(&mut self) -> LiuResult<u32> {
        let v = self.io_mut()?.read_u24_be()?;
        self.processed_bytes += 3;
        Ok(v)
    }

    fn get_be32(&mut self) -> LiuResult<u32> {
        let v = self.io_mut()?.read_u32_be()?;
        self.processed_bytes += 4;
        Ok(v)
    }

    fn get_be64(&mut self) -> LiuResult<u64> {
        let v = self.io_mut()?.read_u64_be()?;
        self.processed_bytes += 8;
        Ok(v)
    }

    fn get_tag(&mut self) -> LiuResult<[u8; 4]> {
        let v = self.io_mut()?.read_tag()?;
        self.processed_bytes += 4;
        Ok(v)
    }

    fn get_buffer_vec(&mut self, count: usize) -> LiuResult<Vec<u8>> {
        let v = self.io_mut()?.read_bytes(count)?;
        self.processed_bytes += count as i64;
        Ok(v)
    }

    /// 尽力读取 (文件尾允许短读)
    fn get_buffer_upto(&mut self, buf: &mut [u8]) -> LiuResult<usize> {
        let n = self.io_mut()?.read_up_to(buf)?;
        self.processed_bytes += n as i64;
        Ok(n)
    }

    fn url_fseek(&mut self, pos: i64) -> LiuResult<()> {
        self.io_mut()?.seek(SeekFrom::Start(pos as u64))?;
        self.processed_bytes = pos;
        Ok(())
    }

    fn skip_bytes(&mut self, count: i64) -> LiuResult<()> {
        if count == 0 {
            return Ok(());
        }
        if count < 0 {
            let target = self.processed_bytes + count;
            return self.url_fseek(target);
        }
        self.io_mut()?.skip(count as usize)?;
        self.processed_bytes += count;
        Ok(())
    }

    fn current_track(&mut self) -> LiuResult<&mut MovTrack> {
        self.tracks
            .last_mut()
            .ok_or_else(|| LiuError::MovParse("在 trak 之外遇到轨道级 box".into()))
    }

    // ========================
    // box 树解析
    // ========================

    fn read_headers(&mut self) -> LiuResult<()> {
        let atom = MovAtom {
            tag: [0; 4],
            offset: 0,
            size: i64::MAX,
        };
        self.mov_read_default(atom)?;
        if !self.found_moov {
            return Err(LiuError::MovParse("未找到 moov box".into()));
        }
        Ok(())
    }

    /// 递归 box 分发器
    ///
    /// 单个处理函数出错只跳过该 box (不支持的特性与 I/O 错误除外);
    /// 未知 box 静默跳过.
    fn mov_read_default(&mut self, atom: MovAtom) -> LiuResult<()> {
        let atom_size = if atom.size < 0 { i64::MAX } else { atom.size };
        let mut a = MovAtom {
            tag: [0; 4],
            offset: atom.offset,
            size: 0,
        };
        let mut total_size: i64 = 0;

        while total_size + 8 < atom_size && !self.is_eof {
            a.size = atom_size;
            a.tag = [0; 4];
            if atom_size >= 8 {
                a.size = match self.get_be32() {
                    Ok(v) => i64::from(v),
                    Err(LiuError::Eof) => {
                        self.is_eof = true;
                        break;
                    }
                    Err(e) => return Err(e),
                };
                a.tag = match self.get_tag() {
                    Ok(v) => v,
                    Err(LiuError::Eof) => {
                        self.is_eof = true;
                        break;
                    }
                    Err(e) => return Err(e),
                };
            }
            total_size += 8;
            a.offset += 8;

            if a.size == 1 {
                // 64 位扩展大小
                a.size = self.get_be64()? as i64 - 8;
                a.offset += 8;
                total_size += 8;
            }
            if a.size == 0 {
                // 延伸到父 box 末尾
                a.size = atom_size - total_size;
                if a.size <= 8 {
                    break;
                }
            }
            a.size -= 8;
            if a.size < 0 {
                break;
            }
            a.size = a.size.min(atom_size - total_size);

            let start_pos = self.processed_bytes;
            if let Err(e) = self.parse_table_entry(a) {
                match e {
                    LiuError::Unsupported(_) | LiuError::Io(_) => return Err(e),
                    LiuError::Eof => {
                        self.is_eof = true;
                        break;
                    }
                    other => warn!(
                        "跳过无法解析的 box '{}': {}",
                        String::from_utf8_lossy(&a.tag),
                        other,
                    ),
                }
            }
            let left = a.size - (self.processed_bytes - start_pos);

            // 非碎片文件: moov 与 mdat 都已定位即可停止;
            // 碎片文件: 剩余字节越过文件尾时停止
            if (!self.found_moof && self.mdat_pos != 0 && self.found_moov)
                || (self.found_moof && self.processed_bytes + left >= self.file_size as i64)
            {
                return Ok(());
            }

            if left > 0 {
                self.skip_bytes(left)?;
            } else if left < 0 {
                self.url_fseek(start_pos + a.size)?;
            }

            a.offset += a.size;
            total_size += a.size;
        }

        if total_size < atom_size && atom_size < 0x7ffff {
            self.skip_bytes(atom_size - total_size)?;
        }
        Ok(())
    }

    /// 按 tag 分发到对应处理函数
    fn parse_table_entry(&mut self, atom: MovAtom) -> LiuResult<()> {
        match &atom.tag {
            b"cmov" => Err(LiuError::Unsupported("压缩 MOV (cmov)".into())),
            // 容器 box: 递归下降
            b"dinf" | b"edts" | b"mdia" | b"minf" | b"mvex" | b"stbl" | b"traf" | b"udta" => {
                self.mov_read_default(atom)
            }
            b"avss" | b"alac" | b"fiel" | b"jp2h" => self.mov_read_extradata(atom),
            b"avcC" | b"glbl" | b"mvcC" | b"hvcC" | b"vvcC" => self.mov_read_glbl(atom),
            b"co64" | b"stco" => self.mov_read_stco(atom),
            b"ctts" => self.mov_read_ctts(),
            b"dref" => Ok(()),
            b"elst" => self.mov_read_elst(),
            b"esds" => self.mov_read_esds(),
            b"ftyp" => self.mov_read_ftyp(),
            b"hdlr" => self.mov_read_hdlr(),
            b"mdat" => self.mov_read_mdat(atom),
            b"mdhd" => self.mov_read_mdhd(),
            b"moof" => self.mov_read_moof(atom),
            b"moov" => self.mov_read_moov(atom),
            b"mvhd" => self.mov_read_mvhd(),
            b"stsc" => self.mov_read_stsc(),
            b"stsd" => self.mov_read_stsd(atom),
            b"stss" => self.mov_read_stss(),
            b"stsz" => self.mov_read_stsz(),
            b"stts" => self.mov_read_stts(),
            b"tkhd" => Ok(()),
            b"tfhd" => self.mov_read_tfhd(),
            b"trak" => self.mov_read_trak(atom),
            b"trex" => self.mov_read_trex(),
            b"trkn" => self.mov_read_trkn(),
            b"trun" => self.mov_read_trun(),
            b"wave" => self.mov_read_wave(atom),
            b"wide" => self.mov_read_wide(atom),
            _ => {
                // Apple QuickTime 元数据 tag
                if atom.tag[0] == 0xA9 {
                    self.mov_read_udta_string(atom)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn mov_read_ftyp(&mut self) -> LiuResult<()> {
        let major = self.get_tag()?;
        if &major != b"qt  " {
            self.isom = true;
        }
        self.get_be32()?; // minor version
        Ok(())
    }

    fn mov_read_moov(&mut self, atom: MovAtom) -> LiuResult<()> {
        self.mov_read_default(atom)?;
        self.found_moov = true;
        Ok(())
    }

    /// mdat: 只记录字节范围, 继续扫描 moov
    fn mov_read_mdat(&mut self, atom: MovAtom) -> LiuResult<()> {
        if atom.size == 0 {
            return Ok(());
        }
        if self.mdat_pos == 0 {
            self.mdat_pos = self.processed_bytes;
            self.mdat_size = atom.size;
        }
        self.mdat_data.push((self.processed_bytes, atom.size));
        Ok(())
    }

    /// wide: 可能内嵌零大小的 mdat
    fn mov_read_wide(&mut self, atom: MovAtom) -> LiuResult<()> {
        if atom.size < 8 {
            return Ok(());
        }
        if self.get_be32()? != 0 {
            // 非零首字: 不是内嵌 mdat
            return Ok(());
        }
        let tag = self.get_tag()?;
        if &tag != b"mdat" {
            return Ok(());
        }
        let inner = MovAtom {
            tag,
            offset: atom.offset + 8,
            size: atom.size - 8,
        };
        self.mov_read_mdat(inner)
    }

    fn mov_read_mvhd(&mut self) -> LiuResult<()> {
        let version = self.get_byte()?;
        self.get_be24()?; // flags
        if version == 1 {
            self.get_be64()?;
            self.get_be64()?;
        } else {
            self.get_be32()?; // creation time
            self.get_be32()?; // modification time
        }
        self.timescale = self.get_be32()?;
        let duration = if version == 1 {
            self.get_be64()? as i64
        } else {
            i64::from(self.get_be32()?)
        };
        if self.timescale > 0 {
            self.file_duration = duration * 1_000_000_000 / i64::from(self.timescale);
        }
        Ok(())
    }

    fn mov_read_mdhd(&mut self) -> LiuResult<()> {
        let version = self.get_byte()?;
        if version > 1 {
            return Err(LiuError::MovParse(format!("不支持的 mdhd 版本 {}", version)));
        }
        self.get_be24()?; // flags
        if version == 1 {
            self.get_be64()?;
            self.get_be64()?;
        } else {
            self.get_be32()?;
            self.get_be32()?;
        }
        let time_scale = self.get_be32()?;
        let duration = if version == 1 {
            self.get_be64()? as i64
        } else {
            i64::from(self.get_be32()?)
        };
        if time_scale > 0 {
            let dur_nano = (duration as f64 / f64::from(time_scale) * 1e9) as i64;
            self.file_duration = self.file_duration.max(dur_nano);
        }
        let lang = self.get_be16()?;
        self.get_be16()?; // quality

        let track = self.current_track()?;
        track.tables.time_scale = time_scale;
        if let Some(language) = lang_to_iso639(lang) {
            track.language = language;
        }
        Ok(())
    }

    fn mov_read_hdlr(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let ctype = self.get_tag()?;
        if ctype == [0; 4] {
            self.isom = true;
        }
        self.get_tag()?; // component subtype
        self.get_be32()?; // manufacture
        self.get_be32()?; // component flags
        self.get_be32()?; // component flags mask
        Ok(())
    }

    fn mov_read_trak(&mut self, atom: MovAtom) -> LiuResult<()> {
        let ffindex = self.tracks.len() as u32 + 1;
        self.tracks.push(MovTrack::new(ffindex));
        self.mov_read_default(atom)
    }

    /// stsd: 按采样格式确定轨道类型并挂接取景器
    fn mov_read_stsd(&mut self, atom: MovAtom) -> LiuResult<()> {
        if self.tracks.is_empty() {
            return Err(LiuError::MovParse("stsd 出现在 trak 之外".into()));
        }
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;

        for pseudo_stream_id in 0..entries {
            let start_pos = self.processed_bytes;
            let size = i64::from(self.get_be32()?);
            let format = self.get_tag()?;

            self.get_be32()?; // reserved
            self.get_be16()?; // reserved
            self.get_be16()?; // dref_id

            let (kind, new_framer): (TrackKind, Option<Box<dyn SampleFramer>>) = match &format {
                b"avc1" | b"avc3" | b"dvav" | b"dva1" => (
                    TrackKind::Video,
                    Some(Box::new(NalFramer::new(CodecId::H264))),
                ),
                b"hvc1" | b"hev1" | b"dvhe" | b"dvh1" => (
                    TrackKind::Video,
                    Some(Box::new(NalFramer::new(CodecId::H265))),
                ),
                b"vvc1" | b"vvi1" => (
                    TrackKind::Video,
                    Some(Box::new(NalFramer::new(CodecId::H266))),
                ),
                b"mp4a" | b"ac-3" => (TrackKind::Audio, Some(Box::new(AudioFramer::new()))),
                b"tx3g" => (TrackKind::Subtitle, Some(Box::new(Tx3gFramer::new()))),
                b"tmcd" => (TrackKind::Control, None),
                _ => (TrackKind::Data, None),
            };
            debug!(
                "stsd: 轨道 #{} 格式 '{}' → {:?}",
                self.tracks.len(),
                String::from_utf8_lossy(&format),
                kind,
            );
            {
                let track = self.current_track()?;
                track.tables.pseudo_stream_id = pseudo_stream_id;
                track.kind = kind;
                track.framer = new_framer;
            }

            match kind {
                TrackKind::Video => {
                    self.get_be16()?; // version
                    self.get_be16()?; // revision level
                    self.get_be32()?; // vendor
                    self.get_be32()?; // temporal quality
                    self.get_be32()?; // spatial quality
                    self.get_be16()?; // width
                    self.get_be16()?; // height
                    self.get_be32()?; // horiz resolution
                    self.get_be32()?; // vert resolution
                    self.get_be32()?; // data size
                    self.get_be16()?; // frames per samples
                    self.skip_bytes(32)?; // codec name (pascal string)
                    let depth = self.get_be16()?;
                    self.get_be16()?; // colortable id
                    self.current_track()?.tables.bits_per_coded_sample = u32::from(depth);
                }
                TrackKind::Audio => {
                    let version = self.get_be16()?;
                    self.get_be16()?; // revision level
                    self.get_be32()?; // vendor
                    let mut channels = u32::from(self.get_be16()?);
                    let mut bits = u32::from(self.get_be16()?);
                    let audio_cid = i32::from(self.get_be16()? as i16);
                    let packet_size = u32::from(self.get_be16()?);
                    let mut sample_rate = self.get_be32()? >> 16;
                    let mut samples_per_frame = 0u32;
                    let mut bytes_per_frame = 0u32;
                    // QT 版本 1/2 字段只在非 isom 文件中出现
                    if !self.isom {
                        if version == 1 {
                            samples_per_frame = self.get_be32()?;
                            self.get_be32()?; // bytes per packet
                            bytes_per_frame = self.get_be32()?;
                            self.get_be32()?; // bytes per sample
                        } else if version == 2 {
                            self.get_be32()?; // sizeof struct only
                            sample_rate = f64::from_bits(self.get_be64()?) as u32;
                            channels = self.get_be32()?;
                            self.get_be32()?; // 固定 0x7F000000
                            bits = self.get_be32()?;
                            self.get_be32()?; // lpcm 格式标志
                            bytes_per_frame = self.get_be32()?;
                            samples_per_frame = self.get_be32()?;
                        }
                    }
                    let track = self.current_track()?;
                    track.tables.channels = channels;
                    track.tables.bits_per_coded_sample = bits;
                    track.tables.audio_cid = audio_cid;
                    track.tables.packet_size = packet_size;
                    track.tables.sample_rate = sample_rate;
                    track.tables.samples_per_frame = samples_per_frame;
                    track.tables.bytes_per_frame = bytes_per_frame;
                }
                TrackKind::Subtitle => {
                    // 剩余字节整体作为私有数据
                    let remaining = size - (self.processed_bytes - start_pos);
                    let fake = MovAtom {
                        tag: *b"glbl",
                        offset: self.processed_bytes,
                        size: remaining,
                    };
                    self.mov_read_glbl(fake)?;
                }
                _ => {
                    // 其他类型 (tmcd, rtp, mp4s...) 直接跳过
                    self.skip_bytes(size - (self.processed_bytes - start_pos))?;
                }
            }

            // 读取条目尾部的附加 box (avcC, hvcC, esds, wave...)
            let a_size = size - (self.processed_bytes - start_pos);
            if a_size > atom.size {
                return Err(LiuError::MovParse("stsd 条目大小非法".into()));
            }
            if a_size > 8 {
                let a = MovAtom {
                    tag: [0; 4],
                    offset: self.processed_bytes,
                    size: a_size,
                };
                self.mov_read_default(a)?;
            } else if a_size > 0 {
                self.skip_bytes(a_size)?;
            }
        }
        Ok(())
    }

    fn mov_read_stts(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;
        let mut data = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let count = self.get_be32()?;
            let duration = i64::from(self.get_be32()?);
            data.push(SttsEntry { count, duration });
        }
        let track = self.current_track()?;
        track.tables.stts_data = data;
        if let Some(first) = track.tables.stts_data.first() {
            if first.duration > 0 && track.tables.time_scale > 0 {
                track.tables.fps = f64::from(track.tables.time_scale) / first.duration as f64;
            }
        }
        Ok(())
    }

    fn mov_read_ctts(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;
        let mut data = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let count = self.get_be32()?;
            let duration = i64::from(self.get_be32()?);
            data.push(SttsEntry { count, duration });
        }
        self.current_track()?.tables.ctts_data = data;
        Ok(())
    }

    fn mov_read_stsc(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;
        let mut data = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let first = self.get_be32()?;
            let count = self.get_be32()?;
            let id = self.get_be32()?;
            data.push(StscEntry { first, count, id });
        }
        self.current_track()?.tables.stsc_data = data;
        Ok(())
    }

    fn mov_read_stsz(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let sample_size = self.get_be32()?;
        let entries = self.get_be32()?;
        {
            let track = self.current_track()?;
            track.tables.sample_size = sample_size;
            track.tables.sample_count = entries;
        }
        if sample_size != 0 {
            return Ok(());
        }
        if entries as u64 >= u32::MAX as u64 / 4 {
            return Err(LiuError::MovParse("stsz 条目数非法".into()));
        }
        let mut sizes = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            sizes.push(self.get_be32()?);
        }
        self.current_track()?.tables.sample_sizes = sizes;
        Ok(())
    }

    fn mov_read_stss(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;
        if self.current_track()?.tables.sample_size != 0 {
            return Ok(());
        }
        if entries as u64 >= u32::MAX as u64 / 4 {
            return Err(LiuError::MovParse("stss 条目数非法".into()));
        }
        let mut keyframes = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            keyframes.push(self.get_be32()?);
        }
        self.current_track()?.tables.keyframes = keyframes;
        Ok(())
    }

    fn mov_read_stco(&mut self, atom: MovAtom) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let entries = self.get_be32()?;
        if entries as u64 >= u32::MAX as u64 / 8 {
            return Err(LiuError::MovParse("stco 条目数非法".into()));
        }
        let mut offsets = Vec::with_capacity(entries as usize);
        if &atom.tag == b"stco" {
            for _ in 0..entries {
                offsets.push(i64::from(self.get_be32()?));
            }
        } else {
            // co64
            for _ in 0..entries {
                offsets.push(self.get_be64()? as i64);
            }
        }
        self.current_track()?.tables.chunk_offsets = offsets;
        Ok(())
    }

    /// avcC/hvcC/mvcC/vvcC/glbl: 整体替换编解码私有数据
    fn mov_read_glbl(&mut self, atom: MovAtom) -> LiuResult<()> {
        if atom.size < 0 || atom.size > (1 << 30) {
            return Err(LiuError::MovParse("私有数据大小非法".into()));
        }
        let data = self.get_buffer_vec(atom.size as usize)?;
        let track = self.current_track()?;
        track.codec_priv = data;
        let MovTrack {
            framer,
            tables,
            codec_priv,
            ..
        } = track;
        if let Some(framer) = framer {
            framer.set_priv_data(tables, codec_priv)?;
        }
        Ok(())
    }

    /// avss/alac/fiel/jp2h: 带 box 头追加到私有数据
    fn mov_read_extradata(&mut self, atom: MovAtom) -> LiuResult<()> {
        if self.tracks.is_empty() {
            // jp2 文件会出现
            return Ok(());
        }
        if atom.size < 0 || atom.size > (1 << 30) {
            return Err(LiuError::MovParse("附加数据大小非法".into()));
        }
        let payload = self.get_buffer_vec(atom.size as usize)?;
        let track = self.current_track()?;
        track
            .codec_priv
            .extend_from_slice(&((atom.size + 8) as u32).to_be_bytes());
        track.codec_priv.extend_from_slice(&atom.tag);
        track.codec_priv.extend_from_slice(&payload);
        let MovTrack {
            framer,
            tables,
            codec_priv,
            ..
        } = track;
        if let Some(framer) = framer {
            framer.set_priv_data(tables, codec_priv)?;
        }
        Ok(())
    }

    /// 读取一个 MPEG-4 描述符头, 返回 (tag, 长度)
    fn mp4_read_descr(&mut self) -> LiuResult<(u8, usize)> {
        let tag = self.get_byte()?;
        let mut len = 0usize;
        for _ in 0..4 {
            let c = self.get_byte()?;
            len = (len << 7) | (c & 0x7f) as usize;
            if c & 0x80 == 0 {
                break;
            }
        }
        Ok((tag, len))
    }

    /// esds: 沿描述符链找到 AudioSpecificConfig
    fn mov_read_esds(&mut self) -> LiuResult<()> {
        self.get_be32()?; // version + flags
        let (tag, _len) = self.mp4_read_descr()?;
        self.get_be16()?; // ES_ID
        if tag == MP4_ES_DESCR_TAG {
            self.get_byte()?; // priority
        }
        let (tag, _len) = self.mp4_read_descr()?;
        if tag != MP4_DEC_CONFIG_DESCR_TAG {
            return Ok(());
        }
        self.get_byte()?; // object_type_id
        self.get_byte()?; // stream type
        self.get_be24()?; // buffer size db
        self.get_be32()?; // max bitrate
        self.get_be32()?; // avg bitrate
        let (tag, len) = self.mp4_read_descr()?;
        if tag != MP4_DEC_SPECIFIC_DESCR_TAG {
            return Ok(());
        }
        if len < 2 || len > (1 << 30) {
            return Err(LiuError::MovParse("esds 解码配置长度非法".into()));
        }
        let priv_data = self.get_buffer_vec(len)?;
        let track = self.current_track()?;
        track.codec_priv = priv_data;
        let MovTrack {
            framer,
            tables,
            codec_priv,
            ..
        } = track;
        if let Some(framer) = framer {
            framer.mark_aac();
            framer.set_priv_data(tables, codec_priv)?;
            tables.channels = u32::from((codec_priv[1] >> 3) & 0x0f);
        }
        Ok(())
    }

    /// elst: `(duration, -1)` 条目记录轨道首时间码
    fn mov_read_elst(&mut self) -> LiuResult<()> {
        let version = self.get_byte()?;
        self.get_be24()?; // flags
        let edit_count = self.get_be32()?;
        let track_num = self.tracks.len() as u32;

        for _ in 0..edit_count {
            if version == 1 {
                let duration = self.get_be64()? as i64;
                let time = self.get_be64()? as i64;
                if time == -1 && self.timescale > 0 {
                    self.first_timecode
                        .insert(track_num, duration * 1000 / i64::from(self.timescale));
                }
            } else {
                let duration = i64::from(self.get_be32()?);
                let time = self.get_be32()?;
                if time == u32::MAX && self.timescale > 0 {
                    self.first_timecode
                        .insert(track_num, duration * 1000 / i64::from(self.timescale));
                }
            }
        }
        self.get_be32()?; // media rate
        Ok(())
    }

    /// ©xxx: QuickTime/iTunes 元数据字符串
    fn mov_read_udta_string(&mut self, atom: MovAtom) -> LiuResult<()> {
        let mut atom_size = atom.size;
        let str_size;
        if self.itunes_metadata {
            let data_size = self.get_be32()?;
            let tag = self.get_tag()?;
            if &tag != b"data" {
                return Ok(());
            }
            self.get_be32()?; // type
            self.get_be32()?; // unknown
            str_size = data_size.saturating_sub(16) as usize;
            atom_size -= 16;
        } else {
            str_size = self.get_be16()? as usize;
            self.get_be16()?; // language
            atom_size -= 4;
        }
        if atom_size < 0 {
            return Err(LiuError::MovParse("元数据 box 大小非法".into()));
        }

        let key: String = atom.tag[1..4]
            .iter()
            .map(|&b| char::from(b))
            .collect();
        let to_read = str_size.min(1023).min(atom_size as usize);
        let raw = self.get_buffer_vec(to_read)?;
        let value = String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .to_string();
        self.metadata.insert(key, value);
        Ok(())
    }

    fn mov_read_trkn(&mut self) -> LiuResult<()> {
        self.get_be32()?; // type
        self.get_be32()?; // unknown
        let n = self.get_be32()?;
        self.metadata.insert("track".to_string(), n.to_string());
        Ok(())
    }

    // ========================
    // 碎片 MP4
    // ========================

    fn mov_read_moof(&mut self, atom: MovAtom) -> LiuResult<()> {
        self.found_moof = true;
        self.fragment.moof_offset = self.processed_bytes - 8;
        self.mov_read_default(atom)
    }

    fn mov_read_trex(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        self.get_be24()?; // flags
        let trex = MovTrackExt {
            track_id: self.get_be32()?,
            stsd_id: self.get_be32()?,
            duration: self.get_be32()?,
            size: self.get_be32()?,
            flags: self.get_be32()?,
        };
        self.trex_data.push(trex);
        Ok(())
    }

    fn mov_read_tfhd(&mut self) -> LiuResult<()> {
        self.get_byte()?; // version
        let flags = self.get_be24()?;
        let track_id = self.get_be32()?;
        if track_id == 0 || track_id as usize > self.tracks.len() {
            return Err(LiuError::MovParse(format!("tfhd 轨道号非法: {}", track_id)));
        }
        let trex = self
            .trex_data
            .iter()
            .find(|t| t.track_id == track_id)
            .copied()
            .ok_or_else(|| LiuError::MovParse("未找到对应的 trex".into()))?;

        self.fragment.track_id = track_id;
        self.fragment.base_data_offset = if flags & 0x01 != 0 {
            self.get_be64()? as i64
        } else {
            self.fragment.moof_offset
        };
        self.fragment.stsd_id = if flags & 0x02 != 0 {
            self.get_be32()?
        } else {
            trex.stsd_id
        };
        self.fragment.duration = if flags & 0x08 != 0 {
            self.get_be32()?
        } else {
            trex.duration
        };
        self.fragment.size = if flags & 0x10 != 0 {
            self.get_be32()?
        } else {
            trex.size
        };
        self.fragment.flags = if flags & 0x20 != 0 {
            self.get_be32()?
        } else {
            trex.flags
        };
        Ok(())
    }

    fn mov_read_trun(&mut self) -> LiuResult<()> {
        if self.fragment.track_id == 0 || self.fragment.track_id as usize > self.tracks.len() {
            return Err(LiuError::MovParse("trun 之前缺少有效的 tfhd".into()));
        }
        let track_idx = self.fragment.track_id as usize - 1;
        if self.tracks[track_idx].tables.pseudo_stream_id + 1 != self.fragment.stsd_id {
            return Ok(());
        }

        self.get_byte()?; // version
        let flags = self.get_be24()?;
        let entries = self.get_be32()?;
        let mut data_offset = 0u32;
        if flags & 0x001 != 0 {
            data_offset = self.get_be32()?;
        }
        if flags & 0x004 != 0 {
            self.get_be32()?; // first_sample_flags
        }

        let chunk_offset = self.fragment.base_data_offset + i64::from(data_offset);
        let mut offset = chunk_offset;
        let mut ctts_new = Vec::new();
        for _ in 0..entries {
            let mut sample_size = self.fragment.size;
            if flags & 0x100 != 0 {
                self.get_be32()?; // sample_duration
            }
            if flags & 0x200 != 0 {
                sample_size = self.get_be32()?;
            }
            if flags & 0x400 != 0 {
                self.get_be32()?; // sample_flags
            }
            if flags & 0x800 != 0 {
                ctts_new.push(SttsEntry {
                    count: 1,
                    duration: i64::from(self.get_be32()?),
                });
            }
            offset += i64::from(sample_size);
        }

        let tables = &mut self.tracks[track_idx].tables;
        tables.chunk_offsets.push(chunk_offset);
        tables.ctts_data.extend(ctts_new);
        self.fragment.moof_offset = offset;
        Ok(())
    }

    fn mov_read_wave(&mut self, atom: MovAtom) -> LiuResult<()> {
        if atom.size < 0 || atom.size > (1 << 30) {
            return Err(LiuError::MovParse("wave box 大小非法".into()));
        }
        if atom.size > 8 {
            // 读取内部的 frma/esds 等
            self.mov_read_default(atom)?;
        }
        Ok(())
    }

    // ========================
    // 索引与块解出
    // ========================

    /// 把所有轨道的块偏移拼成全局升序列表
    fn build_index(&mut self) -> LiuResult<()> {
        self.cur_chunk = 0;
        self.chunks.clear();

        if self.tracks.len() == 1 && self.tracks[0].tables.chunk_offsets.is_empty() {
            self.chunks.push((0, 0));
            return Ok(());
        }
        for (i, track) in self.tracks.iter().enumerate() {
            for &offset in &track.tables.chunk_offsets {
                if !self.found_moof
                    && (offset < self.mdat_pos || offset > self.mdat_pos + self.mdat_size)
                {
                    return Err(LiuError::MovParse(format!("块偏移 {} 非法", offset)));
                }
                self.chunks.push((offset - self.mdat_pos, i));
            }
        }
        self.chunks.sort_unstable();
        Ok(())
    }

    /// 解出一个数据块, 返回丢弃的字节数
    fn demux_block_impl(
        &mut self,
        demuxed: &mut DemuxedData,
        accepted: &HashSet<u32>,
    ) -> LiuResult<i64> {
        for &pid in accepted {
            demuxed.entry(pid).or_default();
        }
        let mut discard = self.first_header_size;
        self.first_header_size = 0;

        if self.first_demux {
            self.first_demux = false;
            let before_headers = self.processed_bytes;
            if self.mdat_pos == 0 {
                self.read_headers()?;
                if self.is_eof {
                    // 当前文件已尽: 尝试播放列表中的下一个文件
                    if self.try_next_file()? {
                        return Ok(discard);
                    }
                    return Err(LiuError::Eof);
                }
                self.build_index()?;
                if self.mdat_pos != 0 && self.processed_bytes != self.mdat_pos {
                    self.url_fseek(self.mdat_pos)?;
                }
            }
            discard += self.mdat_pos - before_headers;
            if !self.chunks.is_empty() {
                discard += self.chunks[self.cur_chunk].0;
                self.skip_bytes(self.chunks[self.cur_chunk].0)?;
            }
        }

        let start_pos = self.processed_bytes;
        while self.processed_bytes - start_pos < self.file_block_size as i64
            && self.cur_chunk < self.chunks.len()
        {
            // 碎片文件的块大小来自 mdat 列表, 超出时无法继续
            if self.found_moof && self.cur_chunk >= self.mdat_data.len() {
                break;
            }

            let offset = self.chunks[self.cur_chunk].0;
            let next = if self.cur_chunk < self.chunks.len() - 1 {
                self.chunks[self.cur_chunk + 1].0
            } else {
                // 最后一个块: 下次调用重新读取头部 (碎片文件继续, 普通文件走文件链)
                self.first_demux = true;
                self.mdat_pos = 0;
                self.mdat_size
            };
            let chunk_size = if self.found_moof {
                self.mdat_data[self.cur_chunk].1
            } else {
                next - offset
            };
            let track_idx = self.chunks[self.cur_chunk].1;
            let pid = track_idx as u32 + 1;
            let has_filter = self.filters.contains_key(&pid);

            if !has_filter && !accepted.contains(&pid) {
                discard += chunk_size;
                self.skip_bytes(chunk_size)?;
            } else if chunk_size > 0 {
                let mut chunk_buf = vec![0u8; chunk_size as usize];
                let readed = self.get_buffer_upto(&mut chunk_buf)?;
                if readed == 0 {
                    break;
                }
                chunk_buf.truncate(readed);

                let chunk_pos = self.processed_bytes - readed as i64;
                let track = &mut self.tracks[track_idx];
                let MovTrack { framer, tables, .. } = track;
                match framer {
                    Some(framer) => {
                        let new_size = framer
                            .new_buffer_size(tables, &chunk_buf)
                            .map_err(|e| at_position(e, chunk_pos))?;
                        if new_size > 0 {
                            if let Some(filter) = self.filters.get_mut(&pid) {
                                let mut filtered = Vec::with_capacity(new_size);
                                framer
                                    .extract_data(tables, &mut filtered, &chunk_buf)
                                    .map_err(|e| at_position(e, chunk_pos))?;
                                let mut packet = Packet::from_data(filtered);
                                packet.track_id = pid;
                                let passed = filter.demux_packet(demuxed, accepted, &packet)?;
                                discard += chunk_size - passed as i64;
                            } else if let Some(queue) = demuxed.get_mut(&pid) {
                                let before = queue.len();
                                framer
                                    .extract_data(tables, queue, &chunk_buf)
                                    .map_err(|e| at_position(e, chunk_pos))?;
                                discard += chunk_size - (queue.len() - before) as i64;
                            }
                        } else {
                            discard += chunk_size;
                        }
                    }
                    None => {
                        if let Some(filter) = self.filters.get_mut(&pid) {
                            let mut packet = Packet::from_data(chunk_buf);
                            packet.track_id = pid;
                            let passed = filter.demux_packet(demuxed, accepted, &packet)?;
                            discard += chunk_size - passed as i64;
                        } else if let Some(queue) = demuxed.get_mut(&pid) {
                            queue.extend_from_slice(&chunk_buf);
                        }
                    }
                }
            }

            // 碎片文件: 跳过块之间的空隙
            if self.found_moof && self.cur_chunk < self.chunks.len() - 1 {
                self.skip_bytes(next - offset - self.mdat_data[self.cur_chunk].1)?;
            }
            self.cur_chunk += 1;
        }

        if self.processed_bytes > start_pos {
            return Ok(discard);
        }

        if self.try_next_file()? {
            return Ok(discard);
        }
        Err(LiuError::Eof)
    }

    /// 从播放列表取下一个文件名并切换, 返回是否切换成功
    fn try_next_file(&mut self) -> LiuResult<bool> {
        let next_name = self
            .file_iterator
            .as_mut()
            .and_then(|it| it.next_name());
        match next_name {
            Some(name) => {
                debug!("文件链: 切换到 {}", name);
                self.open_file(&name)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Demuxer for MovDemuxer {
    fn open_file(&mut self, name: &str) -> LiuResult<()> {
        MovDemuxer::open_file(self, name)
    }

    fn track_list(&self) -> BTreeMap<u32, TrackInfo> {
        let mut list = BTreeMap::new();
        for (i, track) in self.tracks.iter().enumerate() {
            if track.kind == TrackKind::Control {
                continue;
            }
            list.insert(
                i as u32 + 1,
                TrackInfo {
                    kind: track.kind,
                    language: track.language.clone(),
                },
            );
        }
        list
    }

    fn demux_block(
        &mut self,
        demuxed: &mut DemuxedData,
        accepted: &HashSet<u32>,
    ) -> LiuResult<i64> {
        self.demux_block_impl(demuxed, accepted)
    }

    fn file_duration_nano(&self) -> i64 {
        self.file_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    fn build_box(tag: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let size = (8 + content.len()) as u32;
        let mut data = Vec::with_capacity(size as usize);
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(tag);
        data.extend_from_slice(content);
        data
    }

    fn build_fullbox(tag: &[u8; 4], version: u8, flags: u32, content: &[u8]) -> Vec<u8> {
        let mut full = vec![
            version,
            ((flags >> 16) & 0xFF) as u8,
            ((flags >> 8) & 0xFF) as u8,
            (flags & 0xFF) as u8,
        ];
        full.extend_from_slice(content);
        build_box(tag, &full)
    }

    fn open_from_bytes(data: Vec<u8>) -> LiuResult<MovDemuxer> {
        let io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let mut demuxer = MovDemuxer::new();
        demuxer.open_io(io)?;
        Ok(demuxer)
    }

    #[test]
    fn test_cmov_被拒绝() {
        let mut data = Vec::new();
        data.extend_from_slice(&build_box(b"ftyp", b"isom\x00\x00\x00\x00isom"));
        let cmov = build_box(b"cmov", &[0u8; 16]);
        data.extend_from_slice(&build_box(b"moov", &cmov));

        let result = open_from_bytes(data);
        assert!(matches!(result, Err(LiuError::Unsupported(_))));
    }

    #[test]
    fn test_缺少moov_报错() {
        let mut data = Vec::new();
        data.extend_from_slice(&build_box(b"ftyp", b"isom\x00\x00\x00\x00isom"));
        data.extend_from_slice(&build_box(b"free", &[0u8; 32]));

        let result = open_from_bytes(data);
        assert!(matches!(result, Err(LiuError::MovParse(_))));
    }

    #[test]
    fn test_未知box_被跳过() {
        // moov 内包含未知 box 'zzzz', 解析不应失败
        let mvhd = build_fullbox(b"mvhd", 0, 0, &{
            let mut c = Vec::new();
            c.extend_from_slice(&0u32.to_be_bytes()); // creation
            c.extend_from_slice(&0u32.to_be_bytes()); // modification
            c.extend_from_slice(&1000u32.to_be_bytes()); // timescale
            c.extend_from_slice(&5000u32.to_be_bytes()); // duration
            c.extend_from_slice(&[0u8; 80]);
            c
        });
        let zzzz = build_box(b"zzzz", &[0xAA; 24]);
        let moov = build_box(b"moov", &[mvhd, zzzz].concat());

        let mut data = Vec::new();
        data.extend_from_slice(&build_box(b"ftyp", b"isom\x00\x00\x00\x00isom"));
        data.extend_from_slice(&moov);
        // 空轨道场景: moov 后无 mdat, 单轨道列表为空
        let result = open_from_bytes(data);
        // 无 trak 时 build_index 产生空索引, 打开成功
        let demuxer = result.unwrap();
        assert_eq!(demuxer.file_duration_nano(), 5_000_000_000);
        assert!(demuxer.track_list().is_empty());
    }
}
