//! ATSC PSIP（A/65）で規定されるテーブルと関連する型の定義。
//!
//! PSIPのテーブルはすべてベースPID（`0x1FFB`）か、MGTで示されるPIDで送られる。

use chrono::{Duration, NaiveDateTime};

use crate::bytes::BytesExt;
use crate::pid::Pid;
use crate::psi::desc::DescriptorBlock;
use crate::psi::{PsiSection, PsiSectionSyntax, PsiTable};
use crate::text::MultipleString;

/// MGTで定義されるテーブル。
#[derive(Debug, PartialEq, Eq)]
pub struct MgtTable<'a> {
    /// テーブル種別。
    pub table_type: u16,
    /// テーブルを送るPID。
    pub pid: Pid,
    /// バージョン番号（5ビット）。
    pub version_number: u8,
    /// テーブルのバイト数。
    pub number_bytes: u32,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> MgtTable<'a> {
    /// 地上波の現在のVCT。
    pub const TYPE_TVCT_CURRENT: u16 = 0x0000;
    /// ケーブルの現在のVCT。
    pub const TYPE_CVCT_CURRENT: u16 = 0x0002;
    /// チャンネルETT。
    pub const TYPE_CHANNEL_ETT: u16 = 0x0004;

    /// EITであればその番号（EIT-0からEIT-127）を返す。
    #[inline]
    pub fn eit_index(&self) -> Option<u8> {
        match self.table_type {
            0x0100..=0x017F => Some((self.table_type - 0x0100) as u8),
            _ => None,
        }
    }

    /// イベントETTであればその番号（ETT-0からETT-127）を返す。
    #[inline]
    pub fn ett_index(&self) -> Option<u8> {
        match self.table_type {
            0x0200..=0x027F => Some((self.table_type - 0x0200) as u8),
            _ => None,
        }
    }
}

/// MGT（Master Guide Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Mgt<'a> {
    /// プロトコルバージョン。
    pub protocol_version: u8,
    /// テーブルを格納する配列。
    pub tables: Vec<MgtTable<'a>>,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Mgt<'a> {
    /// MGTのテーブルID。
    pub const TABLE_ID: u8 = 0xC7;
}

impl<'a> PsiTable<'a> for Mgt<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Mgt<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Mgt::table_id");
            return None;
        }

        let data = psi.data;
        if data.len() < 3 {
            log::debug!("invalid Mgt");
            return None;
        }

        let protocol_version = data[0];
        let tables_defined = data[1..=2].read_be_16();

        let mut data = &data[3..];
        let mut tables = Vec::with_capacity(tables_defined as usize);
        for _ in 0..tables_defined {
            if data.len() < 11 {
                log::debug!("invalid MgtTable");
                return None;
            }

            let table_type = data[0..=1].read_be_16();
            let pid = Pid::read(&data[2..=3]);
            let version_number = data[4] & 0b00011111;
            let number_bytes = data[5..=8].read_be_32();
            let Some((descriptors, rem)) = DescriptorBlock::read(&data[9..]) else {
                log::debug!("invalid MgtTable::descriptors");
                return None;
            };
            data = rem;

            tables.push(MgtTable {
                table_type,
                pid,
                version_number,
                number_bytes,
                descriptors,
            });
        }

        let Some((descriptors, _)) = DescriptorBlock::read(data) else {
            log::debug!("invalid Mgt::descriptors");
            return None;
        };

        Some(Mgt {
            protocol_version,
            tables,
            descriptors,
        })
    }
}

/// VCTで定義される仮想チャンネル。
#[derive(Debug, PartialEq, Eq)]
pub struct VctChannel<'a> {
    /// チャンネルの短縮名。
    pub short_name: String,
    /// メジャーチャンネル番号（10ビット）。
    pub major_channel_number: u16,
    /// マイナーチャンネル番号（10ビット）。
    pub minor_channel_number: u16,
    /// 変調方式。
    pub modulation_mode: u8,
    /// 搬送波周波数（Hz）。
    pub carrier_frequency: u32,
    /// チャンネルのTSID。
    pub channel_tsid: u16,
    /// 放送番組番号識別。
    pub program_number: u16,
    /// スクランブル。
    pub access_controlled: bool,
    /// 受信機のチャンネル一覧に表示しない。
    pub hidden: bool,
    /// サービス種別（6ビット）。
    pub service_type: u8,
    /// ソース識別。EITとETTで番組とチャンネルを結び付ける。
    pub source_id: u16,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// VCT（Virtual Channel Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Vct<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// チャンネルを格納する配列。
    pub channels: Vec<VctChannel<'a>>,
    /// 追加の記述子の塊。
    pub additional_descriptors: DescriptorBlock<'a>,
}

impl<'a> Vct<'a> {
    /// 地上波のVCTのテーブルID。
    pub const TABLE_ID_TERRESTRIAL: u8 = 0xC8;
    /// ケーブルのVCTのテーブルID。
    pub const TABLE_ID_CABLE: u8 = 0xC9;
}

impl<'a> PsiTable<'a> for Vct<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Vct<'a>> {
        if !matches!(psi.table_id, Self::TABLE_ID_TERRESTRIAL | Self::TABLE_ID_CABLE) {
            log::debug!("invalid Vct::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid Vct::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 2 {
            log::debug!("invalid Vct");
            return None;
        }

        let num_channels_in_section = data[1];

        let mut data = &data[2..];
        let mut channels = Vec::with_capacity(num_channels_in_section as usize);
        for _ in 0..num_channels_in_section {
            if data.len() < 32 {
                log::debug!("invalid VctChannel");
                return None;
            }

            // UTF-16の7文字で、余りはヌル文字で埋まる
            let (short_name, _) = encoding_rs::UTF_16BE.decode_without_bom_handling(&data[0..14]);
            let short_name = short_name.trim_end_matches('\0').to_string();
            let channel_number = data[14..=16].read_be_24();
            let major_channel_number = ((channel_number >> 10) & 0x3FF) as u16;
            let minor_channel_number = (channel_number & 0x3FF) as u16;
            let modulation_mode = data[17];
            let carrier_frequency = data[18..=21].read_be_32();
            let channel_tsid = data[22..=23].read_be_16();
            let program_number = data[24..=25].read_be_16();
            let access_controlled = data[26] & 0b00100000 != 0;
            let hidden = data[26] & 0b00010000 != 0;
            let service_type = data[27] & 0b00111111;
            let source_id = data[28..=29].read_be_16();
            let Some((descriptors, rem)) = DescriptorBlock::read_10bit(&data[30..]) else {
                log::debug!("invalid VctChannel::descriptors");
                return None;
            };
            data = rem;

            channels.push(VctChannel {
                short_name,
                major_channel_number,
                minor_channel_number,
                modulation_mode,
                carrier_frequency,
                channel_tsid,
                program_number,
                access_controlled,
                hidden,
                service_type,
                source_id,
                descriptors,
            });
        }

        let Some((additional_descriptors, _)) = DescriptorBlock::read_10bit(data) else {
            log::debug!("invalid Vct::additional_descriptors");
            return None;
        };

        Some(Vct {
            table_id: psi.table_id,
            transport_stream_id: syntax.table_id_extension,
            syntax,
            channels,
            additional_descriptors,
        })
    }
}

/// ATSCのEITにおけるイベント。
#[derive(Debug, PartialEq, Eq)]
pub struct AtscEvent<'a> {
    /// イベント識別（14ビット）。
    pub event_id: u16,
    /// 開始時間（GPS秒）。
    pub start_time: u32,
    /// ETMの位置（2ビット）。
    pub etm_location: u8,
    /// 継続時間。
    pub length: Duration,
    /// 番組名。
    pub title: MultipleString<'a>,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> AtscEvent<'a> {
    /// GPS時刻とUTCの差分から開始時間をUTCで返す。
    #[inline]
    pub fn start_time_utc(&self, gps_utc_offset: u8) -> NaiveDateTime {
        crate::time::gps_to_utc(self.start_time, gps_utc_offset)
    }
}

/// ATSCのEIT（Event Information Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct AtscEit<'a> {
    /// ソース識別。
    pub source_id: u16,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// イベントを格納する配列。
    pub events: Vec<AtscEvent<'a>>,
}

impl<'a> AtscEit<'a> {
    /// ATSCのEITのテーブルID。
    pub const TABLE_ID: u8 = 0xCB;
}

impl<'a> PsiTable<'a> for AtscEit<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<AtscEit<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid AtscEit::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid AtscEit::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 2 {
            log::debug!("invalid AtscEit");
            return None;
        }

        let num_events_in_section = data[1];

        let mut data = &data[2..];
        let mut events = Vec::with_capacity(num_events_in_section as usize);
        for _ in 0..num_events_in_section {
            if data.len() < 10 {
                log::debug!("invalid AtscEvent");
                return None;
            }

            let event_id = data[0..=1].read_be_16() & 0b0011_1111_1111_1111;
            let start_time = data[2..=5].read_be_32();
            let etm_location = (data[6] & 0b00110000) >> 4;
            let length = Duration::seconds((data[6..=8].read_be_24() & 0x0F_FFFF) as i64);
            let title_length = data[9];
            let Some((title, rem)) = data[10..].split_at_checked(title_length as usize) else {
                log::debug!("invalid AtscEvent::title");
                return None;
            };
            let Some((descriptors, rem)) = DescriptorBlock::read(rem) else {
                log::debug!("invalid AtscEvent::descriptors");
                return None;
            };
            data = rem;

            events.push(AtscEvent {
                event_id,
                start_time,
                etm_location,
                length,
                title: MultipleString::new(title),
                descriptors,
            });
        }

        Some(AtscEit {
            source_id: syntax.table_id_extension,
            syntax,
            events,
        })
    }
}

/// ETT（Extended Text Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Ett<'a> {
    /// ETM識別。
    pub etm_id: u32,
    /// 拡張テキスト。
    pub extended_text_message: MultipleString<'a>,
}

impl<'a> Ett<'a> {
    /// ETTのテーブルID。
    pub const TABLE_ID: u8 = 0xCC;

    /// ETM識別のソース識別を返す。
    #[inline]
    pub fn source_id(&self) -> u16 {
        (self.etm_id >> 16) as u16
    }

    /// イベントの拡張テキストであればイベント識別を返す。
    ///
    /// チャンネルの拡張テキストであれば`None`を返す。
    #[inline]
    pub fn event_id(&self) -> Option<u16> {
        match self.etm_id & 0b11 {
            0b10 => Some(((self.etm_id >> 2) & 0x3FFF) as u16),
            _ => None,
        }
    }
}

impl<'a> PsiTable<'a> for Ett<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Ett<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Ett::table_id");
            return None;
        }

        let data = psi.data;
        if data.len() < 5 {
            log::debug!("invalid Ett");
            return None;
        }

        Some(Ett {
            etm_id: data[1..=4].read_be_32(),
            extended_text_message: MultipleString::new(&data[5..]),
        })
    }
}

/// STT（System Time Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Stt<'a> {
    /// 現在時刻（GPS秒）。
    pub system_time: u32,
    /// GPS時刻とUTCの差分（秒）。
    pub gps_utc_offset: u8,
    /// 夏時間の状態。
    pub daylight_saving: u16,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Stt<'a> {
    /// STTのテーブルID。
    pub const TABLE_ID: u8 = 0xCD;

    /// 現在時刻をUTCで返す。
    #[inline]
    pub fn utc_time(&self) -> NaiveDateTime {
        crate::time::gps_to_utc(self.system_time, self.gps_utc_offset)
    }
}

impl<'a> PsiTable<'a> for Stt<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Stt<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Stt::table_id");
            return None;
        }

        let data = psi.data;
        if data.len() < 8 {
            log::debug!("invalid Stt");
            return None;
        }

        let system_time = data[1..=4].read_be_32();
        let gps_utc_offset = data[5];
        let daylight_saving = data[6..=7].read_be_16();
        // 残りはすべて記述子
        let descriptors = DescriptorBlock::new(&data[8..]);

        Some(Stt {
            system_time,
            gps_utc_offset,
            daylight_saving,
            descriptors,
        })
    }
}
