//! MPEG-2 SystemsおよびDVB-SI（EN 300 468）で規定されるテーブルと関連する型の定義。

use std::ops::RangeInclusive;

use chrono::{Duration, NaiveDateTime};

use crate::bytes::BytesExt;
use crate::pid::Pid;
use crate::psi::desc::{DescriptorBlock, StreamType};
use crate::psi::{PsiSection, PsiSectionSyntax, PsiTable, SectionMapEntry};

/// 進行状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunningStatus {
    /// 未定義。
    Undefined,
    /// 非実行中。
    NotRunning,
    /// 数秒以内に開始。
    StartsSoon,
    /// 停止中。
    Pausing,
    /// 実行中。
    Running,
    /// 放送休止中。
    OffAir,
    /// 予約。
    Reserved,
}

impl From<u8> for RunningStatus {
    #[inline]
    fn from(value: u8) -> RunningStatus {
        match value {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsSoon,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            5 => RunningStatus::OffAir,
            _ => RunningStatus::Reserved,
        }
    }
}

/// PATに列挙される番組。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatProgram {
    /// 番組番号。
    pub program_number: u16,
    /// PMTのPID。
    pub program_map_pid: Pid,
}

/// PAT（Program Association Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// NITのPID。
    pub network_pid: Pid,
    /// 番組ごとのPMTのPID。
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// PATのテーブルID。
    pub const TABLE_ID: u8 = 0x00;
}

impl PsiTable<'_> for Pat {
    fn read(psi: &PsiSection) -> Option<Pat> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Pat::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.as_ref() else {
            log::debug!("invalid Pat::syntax");
            return None;
        };

        let mut network_pid = Pid::NIT;
        let mut programs = Vec::new();
        for chunk in psi.data.chunks_exact(4) {
            let program_number = chunk[0..=1].read_be_16();
            let pid = Pid::read(&chunk[2..=3]);
            if program_number == 0 {
                network_pid = pid;
            } else {
                programs.push(PatProgram {
                    program_number,
                    program_map_pid: pid,
                });
            }
        }

        Some(Pat {
            transport_stream_id: syntax.table_id_extension,
            network_pid,
            programs,
        })
    }
}

/// PMTに列挙されるストリーム。
#[derive(Debug, PartialEq, Eq)]
pub struct PmtStream<'a> {
    /// ストリームの種別。
    pub stream_type: StreamType,
    /// エレメンタリーPID。
    pub elementary_pid: Pid,
    /// 記述子群。
    pub descriptors: DescriptorBlock<'a>,
}

/// PMT（Program Map Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Pmt<'a> {
    /// 番組番号。
    pub program_number: u16,
    /// PCRのPID。
    pub pcr_pid: Pid,
    /// 記述子群。
    pub descriptors: DescriptorBlock<'a>,
    /// 番組を構成するストリーム。
    pub streams: Vec<PmtStream<'a>>,
}

impl<'a> Pmt<'a> {
    /// PMTのテーブルID。
    pub const TABLE_ID: u8 = 0x02;
}

impl<'a> PsiTable<'a> for Pmt<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Pmt<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Pmt::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.as_ref() else {
            log::debug!("invalid Pmt::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 4 {
            log::debug!("invalid Pmt");
            return None;
        }

        let pcr_pid = Pid::read(&data[0..=1]);
        let Some((descriptors, mut data)) = DescriptorBlock::read(&data[2..]) else {
            log::debug!("invalid Pmt::descriptors");
            return None;
        };

        let mut streams = Vec::new();
        while !data.is_empty() {
            if data.len() < 5 {
                log::debug!("invalid PmtStream");
                return None;
            }

            let stream_type = StreamType(data[0]);
            let elementary_pid = Pid::read(&data[1..=2]);
            let Some((descriptors, rem)) = DescriptorBlock::read(&data[3..]) else {
                log::debug!("invalid PmtStream::descriptors");
                return None;
            };
            data = rem;

            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Some(Pmt {
            program_number: syntax.table_id_extension,
            pcr_pid,
            descriptors,
            streams,
        })
    }
}

/// NITやBATに列挙されるTS。
#[derive(Debug, PartialEq, Eq)]
pub struct TransportStreamConfig<'a> {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// TSごとの記述子群。
    pub transport_descriptors: DescriptorBlock<'a>,
}

/// ネットワーク記述子に続くTSループを読み取る。
fn read_transport_streams<'a>(
    data: &'a [u8],
    name: &str,
) -> Option<(DescriptorBlock<'a>, Vec<TransportStreamConfig<'a>>)> {
    let Some((descriptors, data)) = DescriptorBlock::read(data) else {
        log::debug!("invalid {}::descriptors", name);
        return None;
    };

    if data.len() < 2 {
        log::debug!("invalid {}::transport_stream_loop_length", name);
        return None;
    }
    let transport_stream_loop_length = data[0..=1].read_be_16() & 0b0000_1111_1111_1111;
    let Some(mut data) = data[2..].get(..transport_stream_loop_length as usize) else {
        log::debug!("invalid {}::transport_streams", name);
        return None;
    };

    let mut transport_streams = Vec::new();
    while !data.is_empty() {
        if data.len() < 6 {
            log::debug!("invalid {}TransportStream", name);
            return None;
        }

        let transport_stream_id = data[0..=1].read_be_16();
        let original_network_id = data[2..=3].read_be_16();
        let Some((transport_descriptors, rem)) = DescriptorBlock::read(&data[4..]) else {
            log::debug!("invalid {}TransportStream::transport_descriptors", name);
            return None;
        };
        data = rem;

        transport_streams.push(TransportStreamConfig {
            transport_stream_id,
            original_network_id,
            transport_descriptors,
        });
    }

    Some((descriptors, transport_streams))
}

/// NIT（Network Information Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Nit<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// ネットワーク識別。
    pub network_id: u16,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// ネットワーク全体の記述子群。
    pub network_descriptors: DescriptorBlock<'a>,
    /// 含まれるTSの一覧。
    pub transport_streams: Vec<TransportStreamConfig<'a>>,
}

impl<'a> Nit<'a> {
    /// 自ネットワークにおけるNITのテーブルID。
    pub const TABLE_ID_ACTUAL: u8 = 0x40;
    /// 他ネットワークにおけるNITのテーブルID。
    pub const TABLE_ID_OTHER: u8 = 0x41;

    /// 自ネットワークのNITかどうかを返す。
    #[inline]
    pub fn is_actual(&self) -> bool {
        self.table_id == Self::TABLE_ID_ACTUAL
    }
}

impl<'a> PsiTable<'a> for Nit<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Nit<'a>> {
        if !matches!(psi.table_id, Self::TABLE_ID_ACTUAL | Self::TABLE_ID_OTHER) {
            log::debug!("invalid Nit::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid Nit::syntax");
            return None;
        };

        let (network_descriptors, transport_streams) = read_transport_streams(psi.data, "Nit")?;

        Some(Nit {
            table_id: psi.table_id,
            network_id: syntax.table_id_extension,
            syntax,
            network_descriptors,
            transport_streams,
        })
    }
}

/// BAT（Bouquet Association Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Bat<'a> {
    /// ブーケ識別。
    pub bouquet_id: u16,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// ブーケ全体の記述子群。
    pub bouquet_descriptors: DescriptorBlock<'a>,
    /// 含まれるTSの一覧。
    pub transport_streams: Vec<TransportStreamConfig<'a>>,
}

impl<'a> Bat<'a> {
    /// BATのテーブルID。
    pub const TABLE_ID: u8 = 0x4A;
}

impl<'a> PsiTable<'a> for Bat<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Bat<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Bat::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid Bat::syntax");
            return None;
        };

        let (bouquet_descriptors, transport_streams) = read_transport_streams(psi.data, "Bat")?;

        Some(Bat {
            bouquet_id: syntax.table_id_extension,
            syntax,
            bouquet_descriptors,
            transport_streams,
        })
    }
}

/// SDTに列挙されるサービス。
#[derive(Debug, PartialEq, Eq)]
pub struct SdtService<'a> {
    /// サービス識別。
    pub service_id: u16,
    /// EIT［スケジュール］フラグ。
    pub eit_schedule_flag: bool,
    /// EIT［現在／次］フラグ。
    pub eit_present_following_flag: bool,
    /// 進行状態。
    pub running_status: RunningStatus,
    /// スクランブル。
    pub free_ca_mode: bool,
    /// 記述子群。
    pub descriptors: DescriptorBlock<'a>,
}

/// SDT（Service Description Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Sdt<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// TSに含まれるサービスの一覧。
    pub services: Vec<SdtService<'a>>,
}

impl<'a> Sdt<'a> {
    /// 自TSのSDTのテーブルID。
    pub const TABLE_ID_ACTUAL: u8 = 0x42;
    /// 他TSのSDTのテーブルID。
    pub const TABLE_ID_OTHER: u8 = 0x46;

    /// 現在のTSのSDTかどうかを返す。
    #[inline]
    pub fn is_actual(&self) -> bool {
        self.table_id == Self::TABLE_ID_ACTUAL
    }
}

impl<'a> PsiTable<'a> for Sdt<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Sdt<'a>> {
        if !matches!(psi.table_id, Self::TABLE_ID_ACTUAL | Self::TABLE_ID_OTHER) {
            log::debug!("invalid Sdt::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid Sdt::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 3 {
            log::debug!("invalid Sdt");
            return None;
        }

        let original_network_id = data[0..=1].read_be_16();

        let mut data = &data[3..];
        let mut services = Vec::new();
        while !data.is_empty() {
            if data.len() < 5 {
                log::debug!("invalid SdtService");
                return None;
            }

            let service_id = data[0..=1].read_be_16();
            let eit_schedule_flag = data[2] & 0b00000010 != 0;
            let eit_present_following_flag = data[2] & 0b00000001 != 0;
            let running_status = ((data[3] & 0b11100000) >> 5).into();
            let free_ca_mode = data[3] & 0b00010000 != 0;
            let Some((descriptors, rem)) = DescriptorBlock::read(&data[3..]) else {
                log::debug!("invalid SdtService::descriptors");
                return None;
            };
            data = rem;

            services.push(SdtService {
                service_id,
                eit_schedule_flag,
                eit_present_following_flag,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Some(Sdt {
            table_id: psi.table_id,
            transport_stream_id: syntax.table_id_extension,
            syntax,
            original_network_id,
            services,
        })
    }
}

/// 各サービスに含まれるイベント。
#[derive(Debug, PartialEq, Eq)]
pub struct EitEvent<'a> {
    /// イベント識別。
    pub event_id: u16,
    /// 開始時間（UTC）。未定義の場合は`None`。
    pub start_time: Option<NaiveDateTime>,
    /// 継続時間。未定義の場合は`None`。
    pub duration: Option<Duration>,
    /// 進行状態。
    pub running_status: RunningStatus,
    /// スクランブル。
    pub free_ca_mode: bool,
    /// 記述子群。
    pub descriptors: DescriptorBlock<'a>,
}

/// EIT（Event Information Table）。
///
/// 事業者形式の番組表もDVBのEITと同じ構造で送られるため、このテーブルで読み取る。
#[derive(Debug, PartialEq, Eq)]
pub struct Eit<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// セクションシンタクス。
    pub syntax: PsiSectionSyntax,
    /// サービス識別。
    pub service_id: u16,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// セグメント最終セクション番号。
    pub segment_last_section_number: u8,
    /// 最終テーブル識別。
    pub last_table_id: u8,
    /// イベントを格納する配列。
    pub events: Vec<EitEvent<'a>>,
}

impl<'a> Eit<'a> {
    /// 自TSにおけるイベント［現在／次］を格納するEITのテーブルID。
    pub const TABLE_ID_PF_ACTUAL: u8 = 0x4E;
    /// 他TSにおけるイベント［現在／次］を格納するEITのテーブルID。
    pub const TABLE_ID_PF_OTHER: u8 = 0x4F;
    /// 自TSにおけるイベント［スケジュール］を格納するEITのテーブルID。
    pub const TABLE_ID_SCHEDULE_ACTUAL: RangeInclusive<u8> = 0x50..=0x5F;
    /// 他TSにおけるイベント［スケジュール］を格納するEITのテーブルID。
    pub const TABLE_ID_SCHEDULE_OTHER: RangeInclusive<u8> = 0x60..=0x6F;
    /// 事業者形式の番組表のテーブルID。
    pub const TABLE_ID_DISH: RangeInclusive<u8> = 0x80..=0xFE;

    /// `table_id`がDVBのEITであれば`true`を返す。
    #[inline]
    pub fn is_dvb_table(table_id: u8) -> bool {
        matches!(table_id, 0x4E..=0x6F)
    }

    /// `table_id`が事業者形式の番組表であれば`true`を返す。
    #[inline]
    pub fn is_dish_table(table_id: u8) -> bool {
        Self::TABLE_ID_DISH.contains(&table_id)
    }

    /// イベント［現在／次］であれば`true`を返す。
    #[inline]
    pub fn is_present_following(&self) -> bool {
        matches!(self.table_id, Self::TABLE_ID_PF_ACTUAL | Self::TABLE_ID_PF_OTHER)
    }

    /// セクションマップに記録する識別子を返す。
    #[inline]
    pub fn section_map_entry(&self) -> SectionMapEntry {
        SectionMapEntry {
            table_id: self.table_id,
            section_number: self.syntax.section_number,
            last_section_number: self.syntax.last_section_number,
            segment_last_section_number: self.segment_last_section_number,
        }
    }
}

impl<'a> PsiTable<'a> for Eit<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Eit<'a>> {
        if !Self::is_dvb_table(psi.table_id) && !Self::is_dish_table(psi.table_id) {
            log::debug!("invalid Eit::table_id");
            return None;
        }
        let Some(syntax) = psi.syntax.clone() else {
            log::debug!("invalid Eit::syntax");
            return None;
        };

        let data = psi.data;
        if data.len() < 6 {
            log::debug!("invalid Eit");
            return None;
        }

        let transport_stream_id = data[0..=1].read_be_16();
        let original_network_id = data[2..=3].read_be_16();
        let segment_last_section_number = data[4];
        let last_table_id = data[5];

        let mut data = &data[6..];
        let mut events = Vec::new();
        while !data.is_empty() {
            if data.len() < 12 {
                log::debug!("invalid EitEvent");
                return None;
            }

            let event_id = data[0..=1].read_be_16();
            let start_time = crate::time::read_utc(&[data[2], data[3], data[4], data[5], data[6]]);
            let duration = crate::time::read_bcd_duration(&[data[7], data[8], data[9]]);
            let running_status = ((data[10] & 0b11100000) >> 5).into();
            let free_ca_mode = data[10] & 0b00010000 != 0;
            let Some((descriptors, rem)) = DescriptorBlock::read(&data[10..]) else {
                log::debug!("invalid EitEvent::descriptors");
                return None;
            };
            data = rem;

            events.push(EitEvent {
                event_id,
                start_time,
                duration,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Some(Eit {
            table_id: psi.table_id,
            service_id: syntax.table_id_extension,
            syntax,
            transport_stream_id,
            original_network_id,
            segment_last_section_number,
            last_table_id,
            events,
        })
    }
}

/// TDT（Time and Date Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tdt {
    /// 現在日付、現在時刻（UTC）。
    pub utc_time: NaiveDateTime,
}

impl Tdt {
    /// TDTのテーブルID。
    pub const TABLE_ID: u8 = 0x70;
}

impl PsiTable<'_> for Tdt {
    fn read(psi: &PsiSection) -> Option<Tdt> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Tdt::table_id");
            return None;
        }

        let Ok(data) = <&[u8; 5]>::try_from(psi.data) else {
            log::debug!("invalid Tdt");
            return None;
        };
        let Some(utc_time) = crate::time::read_utc(data) else {
            log::debug!("invalid Tdt::utc_time");
            return None;
        };

        Some(Tdt { utc_time })
    }
}

/// TOT（Time Offset Table）。
#[derive(Debug, PartialEq, Eq)]
pub struct Tot<'a> {
    /// 現在日付、現在時刻（UTC）。
    pub utc_time: NaiveDateTime,
    /// 記述子群。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Tot<'a> {
    /// TOTのテーブルID。
    pub const TABLE_ID: u8 = 0x73;
}

impl<'a> PsiTable<'a> for Tot<'a> {
    fn read(psi: &PsiSection<'a>) -> Option<Tot<'a>> {
        if psi.table_id != Self::TABLE_ID {
            log::debug!("invalid Tot::table_id");
            return None;
        }

        let data = psi.data;
        if data.len() < 7 {
            log::debug!("invalid Tot");
            return None;
        }

        let Some(utc_time) = crate::time::read_utc(&[data[0], data[1], data[2], data[3], data[4]])
        else {
            log::debug!("invalid Tot::utc_time");
            return None;
        };
        let Some((descriptors, _)) = DescriptorBlock::read(&data[5..]) else {
            log::debug!("invalid Tot::descriptors");
            return None;
        };

        Some(Tot {
            utc_time,
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::desc::{AnyDescriptor, CollectionType, Scope};
    use chrono::NaiveDate;
    use hex_literal::hex;

    fn syntax(table_id_extension: u16, section_number: u8, last_section_number: u8) -> PsiSectionSyntax {
        PsiSectionSyntax {
            table_id_extension,
            version_number: 1,
            current_next_indicator: true,
            section_number,
            last_section_number,
        }
    }

    #[test]
    fn test_pat() {
        let data = hex!("00 00 E0 10 10 44 E1 00 10 45 E1 01");
        let psi = PsiSection {
            table_id: 0x00,
            syntax: Some(syntax(0x0001, 0, 0)),
            data: &data,
        };
        let pat = Pat::read(&psi).unwrap();
        assert_eq!(pat.transport_stream_id, 1);
        assert_eq!(pat.network_pid, Pid::NIT);
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(pat.programs[1].program_map_pid, Pid::new(0x0101));

        let psi = PsiSection { table_id: 0x02, ..psi };
        assert!(Pat::read(&psi).is_none());
    }

    #[test]
    fn test_pmt() {
        let data = hex!(
            "E1 00 F0 00"
            "02 E1 01 F0 00"
            "0B E1 02 F0 04 66 02 01 06"
        );
        let psi = PsiSection {
            table_id: 0x02,
            syntax: Some(syntax(0x1044, 0, 0)),
            data: &data,
        };
        let pmt = Pmt::read(&psi).unwrap();
        assert_eq!(pmt.program_number, 0x1044);
        assert_eq!(pmt.pcr_pid, Pid::new(0x0100));
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.streams[1].stream_type, StreamType::DSMCC_TYPE_B);
        assert_eq!(pmt.streams[1].descriptors.as_bytes(), &hex!("66 02 01 06"));
    }

    #[test]
    fn test_nit() {
        let data = hex!(
            "F0 05 40 03 4E 45 54"
            "F0 0C"
            "00 01 00 02 F0 06 83 04 10 44 FC 01"
        );
        let psi = PsiSection {
            table_id: 0x40,
            syntax: Some(syntax(0x3001, 0, 1)),
            data: &data,
        };
        let nit = Nit::read(&psi).unwrap();
        assert!(nit.is_actual());
        assert_eq!(nit.network_id, 0x3001);
        assert_eq!(nit.syntax.last_section_number, 1);
        assert_eq!(nit.transport_streams.len(), 1);
        assert_eq!(nit.transport_streams[0].original_network_id, 2);

        let descs: Vec<_> = nit.transport_streams[0]
            .transport_descriptors
            .parse_all(Scope::NIT, CollectionType::Dvb)
            .collect();
        assert!(matches!(descs[0], AnyDescriptor::LogicalChannel(_)));

        // TSループ長が足りない
        let psi = PsiSection {
            data: &data[..15],
            ..psi
        };
        assert!(Nit::read(&psi).is_none());
    }

    #[test]
    fn test_sdt() {
        let data = hex!(
            "00 02 FF"
            "10 44 FF 80 09 48 07 01 01 50 03 42 42 43"
        );
        let psi = PsiSection {
            table_id: 0x42,
            syntax: Some(syntax(0x0001, 0, 0)),
            data: &data,
        };
        let sdt = Sdt::read(&psi).unwrap();
        assert!(sdt.is_actual());
        assert_eq!(sdt.transport_stream_id, 1);
        assert_eq!(sdt.original_network_id, 2);
        let service = &sdt.services[0];
        assert_eq!(service.service_id, 0x1044);
        assert!(service.eit_schedule_flag);
        assert!(service.eit_present_following_flag);
        assert_eq!(service.running_status, RunningStatus::Running);
        assert!(!service.free_ca_mode);
        assert_eq!(service.descriptors.as_bytes().len(), 9);
    }

    #[test]
    fn test_eit() {
        let data = hex!(
            "00 01 00 02 01 50"
            "00 64 EB 96 20 00 00 00 30 00 80 00"
            "00 65 FF FF FF FF FF FF FF FF 00 00"
        );
        let psi = PsiSection {
            table_id: 0x50,
            syntax: Some(syntax(0x1044, 8, 15)),
            data: &data,
        };
        let eit = Eit::read(&psi).unwrap();
        assert_eq!(eit.service_id, 0x1044);
        assert!(!eit.is_present_following());
        assert_eq!(
            eit.section_map_entry(),
            SectionMapEntry {
                table_id: 0x50,
                section_number: 8,
                last_section_number: 15,
                segment_last_section_number: 1,
            }
        );
        assert_eq!(eit.events.len(), 2);
        assert_eq!(
            eit.events[0].start_time,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(20, 0, 0)
        );
        assert_eq!(eit.events[0].duration, Some(Duration::minutes(30)));
        assert_eq!(eit.events[0].running_status, RunningStatus::Running);
        assert_eq!(eit.events[1].start_time, None);
        assert_eq!(eit.events[1].duration, None);

        // 事業者形式のテーブルIDも読み取れる
        let psi = PsiSection { table_id: 0x80, ..psi };
        assert!(Eit::read(&psi).is_some());
        assert!(Eit::is_dish_table(0xFE));
        assert!(!Eit::is_dish_table(0xFF));
        let psi = PsiSection { table_id: 0x70, ..psi };
        assert!(Eit::read(&psi).is_none());
    }

    #[test]
    fn test_tdt_tot() {
        let data = hex!("EB 96 12 34 56");
        let psi = PsiSection {
            table_id: 0x70,
            syntax: None,
            data: &data,
        };
        let tdt = Tdt::read(&psi).unwrap();
        assert_eq!(
            tdt.utc_time,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 34, 56).unwrap()
        );

        let data = hex!("EB 96 12 34 56 F0 0F 58 0D 47 42 52 02 00 00 EB 96 01 00 00 01 00");
        let psi = PsiSection {
            table_id: 0x73,
            syntax: None,
            data: &data,
        };
        let tot = Tot::read(&psi).unwrap();
        assert_eq!(tot.utc_time, tdt.utc_time);
        assert_eq!(tot.descriptors.iter().count(), 1);
    }
}
