//! MPEG-2 SystemsおよびDVB-SI（EN 300 468）で規定される記述子と関連する型の定義。

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use smallvec::SmallVec;

use crate::bytes::BytesExt;
use crate::lang::LangCode;
use crate::pid::Pid;
use crate::text::DvbStr;

use super::base::{Descriptor, DescriptorError};
use super::Scope;

/// ストリーム形式種別。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamType(pub u8);

impl StreamType {
    /// ISO/IEC 11172-2映像。
    pub const MPEG1_VIDEO: StreamType = StreamType(0x01);
    /// ITU-T勧告H.262|ISO/IEC 13818-2映像。
    pub const MPEG2_VIDEO: StreamType = StreamType(0x02);
    /// ISO/IEC 11172-3音声。
    pub const MPEG1_AUDIO: StreamType = StreamType(0x03);
    /// ISO/IEC 13818-3音声。
    pub const MPEG2_AUDIO: StreamType = StreamType(0x04);
    /// プライベートセクション。
    pub const PRIVATE_SECTIONS: StreamType = StreamType(0x05);
    /// プライベートデータを収容したPESパケット。
    pub const PRIVATE_DATA: StreamType = StreamType(0x06);
    /// ISO/IEC 13522 MHEG。
    pub const MHEG: StreamType = StreamType(0x07);
    /// ISO/IEC 13818-6（タイプB）。MHEG5のオブジェクトカルーセルで使われる。
    pub const DSMCC_TYPE_B: StreamType = StreamType(0x0B);
    /// ISO/IEC 13818-7音声（ADTS）。
    pub const AAC: StreamType = StreamType(0x0F);
    /// ISO/IEC 14496-3音声（LATM）。
    pub const MPEG4_AUDIO: StreamType = StreamType(0x11);
    /// H.264映像。
    pub const H264: StreamType = StreamType(0x1B);
    /// H.265映像。
    pub const H265: StreamType = StreamType(0x24);
    /// ATSCのAC-3音声。
    pub const AC3: StreamType = StreamType(0x81);

    /// ストリーム形式が映像を示す場合に`true`を返す。
    pub fn is_video(&self) -> bool {
        matches!(
            *self,
            StreamType::MPEG1_VIDEO
                | StreamType::MPEG2_VIDEO
                | StreamType::H264
                | StreamType::H265
        )
    }

    /// ストリーム形式が音声を示す場合に`true`を返す。
    pub fn is_audio(&self) -> bool {
        matches!(
            *self,
            StreamType::MPEG1_AUDIO
                | StreamType::MPEG2_AUDIO
                | StreamType::AAC
                | StreamType::MPEG4_AUDIO
                | StreamType::AC3
        )
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamType(0x{:02X})", self.0)
    }
}

/// サービス形式種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceType(pub u8);

impl ServiceType {
    /// デジタルTVサービス。
    pub const DIGITAL_TV: ServiceType = ServiceType(0x01);
    /// デジタルラジオサービス。
    pub const DIGITAL_RADIO: ServiceType = ServiceType(0x02);
    /// テレテキストサービス。
    pub const TELETEXT: ServiceType = ServiceType(0x03);
    /// 高度符号化方式のラジオサービス。
    pub const ADVANCED_RADIO: ServiceType = ServiceType(0x0A);
    /// データ放送サービス。
    pub const DATA_BROADCAST: ServiceType = ServiceType(0x0C);
    /// H.264のSDTVサービス。
    pub const AVC_SD_TV: ServiceType = ServiceType(0x16);
    /// H.264のHDTVサービス。
    pub const AVC_HD_TV: ServiceType = ServiceType(0x19);
    /// H.265のTVサービス。
    pub const HEVC_TV: ServiceType = ServiceType(0x1F);

    /// テレビサービスかどうかを返す。
    #[inline]
    pub fn is_tv(&self) -> bool {
        matches!(self.0, 0x01 | 0x11 | 0x16 | 0x19 | 0x1F)
    }

    /// ラジオサービスかどうかを返す。
    #[inline]
    pub fn is_radio(&self) -> bool {
        matches!(self.0, 0x02 | 0x07 | 0x0A)
    }
}

/// 限定受信方式記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ConditionalAccessDescriptor<'a> {
    /// 限定受信方式識別。
    pub ca_system_id: u16,
    /// 限定受信PID。
    pub ca_pid: Pid,
    /// プライベートデータ。
    pub private_data: &'a [u8],
}

impl<'a> Descriptor<'a> for ConditionalAccessDescriptor<'a> {
    const TAG: u8 = 0x09;
    const SCOPE: Scope = Scope::PMT.union(Scope::CAT);

    fn read(data: &'a [u8]) -> Result<ConditionalAccessDescriptor<'a>, DescriptorError> {
        if data.len() < 4 {
            return Err(DescriptorError::InvalidLength("ConditionalAccessDescriptor"));
        }

        let ca_system_id = data[0..=1].read_be_16();
        let ca_pid = Pid::read(&data[2..=3]);
        let private_data = &data[4..];

        Ok(ConditionalAccessDescriptor {
            ca_system_id,
            ca_pid,
            private_data,
        })
    }
}

/// ネットワーク名記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkNameDescriptor<'a> {
    /// ネットワーク名。
    pub network_name: &'a DvbStr,
}

impl<'a> Descriptor<'a> for NetworkNameDescriptor<'a> {
    const TAG: u8 = 0x40;
    const SCOPE: Scope = Scope::NIT.union(Scope::BAT);

    fn read(data: &'a [u8]) -> Result<NetworkNameDescriptor<'a>, DescriptorError> {
        Ok(NetworkNameDescriptor {
            network_name: DvbStr::from_bytes(data),
        })
    }
}

/// サービスリスト記述子におけるサービス。
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceEntry {
    /// サービス識別。
    pub service_id: u16,
    /// サービス形式種別。
    pub service_type: ServiceType,
}

/// サービスリスト記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceListDescriptor {
    /// サービスを格納する配列。
    pub services: Vec<ServiceEntry>,
}

impl Descriptor<'_> for ServiceListDescriptor {
    const TAG: u8 = 0x41;
    const SCOPE: Scope = Scope::NIT.union(Scope::BAT);

    fn read(data: &[u8]) -> Result<ServiceListDescriptor, DescriptorError> {
        if data.len() % 3 != 0 {
            return Err(DescriptorError::InvalidLength("ServiceListDescriptor"));
        }

        let services = data
            .chunks_exact(3)
            .map(|chunk| ServiceEntry {
                service_id: chunk[0..=1].read_be_16(),
                service_type: ServiceType(chunk[2]),
            })
            .collect();

        Ok(ServiceListDescriptor { services })
    }
}

/// 偏波。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Polarization {
    /// 水平。
    LinearHorizontal,
    /// 垂直。
    LinearVertical,
    /// 左旋。
    CircularLeft,
    /// 右旋。
    CircularRight,
}

/// ロールオフ率。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollOff {
    /// α=0.35
    Alpha035,
    /// α=0.25
    Alpha025,
    /// α=0.20
    Alpha020,
}

/// 衛星分配システム記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct SatelliteDeliverySystemDescriptor {
    /// 周波数（単位は10kHz）。
    pub frequency: u32,
    /// 軌道位置（単位は0.1度）。
    pub orbital_position: u16,
    /// 東経なら`true`。
    pub west_east_flag: bool,
    /// 偏波。
    pub polarization: Polarization,
    /// ロールオフ率。DVB-S2でのみ意味を持つ。
    pub roll_off: RollOff,
    /// DVB-S2であれば`true`。
    pub is_dvb_s2: bool,
    /// 変調方式（2ビット）。
    pub modulation_type: u8,
    /// シンボルレート（単位は100シンボル/秒）。
    pub symbol_rate: u32,
    /// FEC（内符号、4ビット）。
    pub fec_inner: u8,
}

impl Descriptor<'_> for SatelliteDeliverySystemDescriptor {
    const TAG: u8 = 0x43;
    const SCOPE: Scope = Scope::NIT;

    fn read(data: &[u8]) -> Result<SatelliteDeliverySystemDescriptor, DescriptorError> {
        if data.len() != 11 {
            return Err(DescriptorError::InvalidLength("SatelliteDeliverySystemDescriptor"));
        }

        let frequency = data[0..=3].read_bcd(8);
        let orbital_position = data[4..=5].read_bcd(4) as u16;
        let west_east_flag = data[6] & 0b10000000 != 0;
        let polarization = match (data[6] & 0b01100000) >> 5 {
            0b00 => Polarization::LinearHorizontal,
            0b01 => Polarization::LinearVertical,
            0b10 => Polarization::CircularLeft,
            0b11 => Polarization::CircularRight,
            _ => unreachable!(),
        };
        let is_dvb_s2 = data[6] & 0b00000100 != 0;
        let roll_off = match (data[6] & 0b00011000) >> 3 {
            0b00 => RollOff::Alpha035,
            0b01 => RollOff::Alpha025,
            0b10 => RollOff::Alpha020,
            value if is_dvb_s2 => {
                return Err(DescriptorError::OutOfRange {
                    field: "roll_off",
                    value: value as u32,
                })
            }
            // DVB-Sでは予約領域
            _ => RollOff::Alpha035,
        };
        let modulation_type = data[6] & 0b00000011;
        let symbol_rate = data[7..=10].read_bcd(7);
        let fec_inner = data[10] & 0b00001111;

        Ok(SatelliteDeliverySystemDescriptor {
            frequency,
            orbital_position,
            west_east_flag,
            polarization,
            roll_off,
            is_dvb_s2,
            modulation_type,
            symbol_rate,
            fec_inner,
        })
    }
}

/// ケーブル分配システム記述子における変調方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CableModulation {
    /// 未定義。
    NotDefined,
    /// 16QAM
    Qam16,
    /// 32QAM
    Qam32,
    /// 64QAM
    Qam64,
    /// 128QAM
    Qam128,
    /// 256QAM
    Qam256,
}

/// ケーブル分配システム記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct CableDeliverySystemDescriptor {
    /// 周波数（単位は100Hz）。
    pub frequency: u32,
    /// FEC（外符号、4ビット）。
    pub fec_outer: u8,
    /// 変調方式。
    pub modulation: CableModulation,
    /// シンボルレート（単位は100シンボル/秒）。
    pub symbol_rate: u32,
    /// FEC（内符号、4ビット）。
    pub fec_inner: u8,
}

impl Descriptor<'_> for CableDeliverySystemDescriptor {
    const TAG: u8 = 0x44;
    const SCOPE: Scope = Scope::NIT;

    fn read(data: &[u8]) -> Result<CableDeliverySystemDescriptor, DescriptorError> {
        if data.len() != 11 {
            return Err(DescriptorError::InvalidLength("CableDeliverySystemDescriptor"));
        }

        let frequency = data[0..=3].read_bcd(8);
        let fec_outer = data[5] & 0b00001111;
        let modulation = match data[6] {
            0x00 => CableModulation::NotDefined,
            0x01 => CableModulation::Qam16,
            0x02 => CableModulation::Qam32,
            0x03 => CableModulation::Qam64,
            0x04 => CableModulation::Qam128,
            0x05 => CableModulation::Qam256,
            value => {
                return Err(DescriptorError::OutOfRange {
                    field: "modulation",
                    value: value as u32,
                })
            }
        };
        let symbol_rate = data[7..=10].read_bcd(7);
        let fec_inner = data[10] & 0b00001111;

        Ok(CableDeliverySystemDescriptor {
            frequency,
            fec_outer,
            modulation,
            symbol_rate,
            fec_inner,
        })
    }
}

/// ブーケ名記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct BouquetNameDescriptor<'a> {
    /// ブーケ名。
    pub bouquet_name: &'a DvbStr,
}

impl<'a> Descriptor<'a> for BouquetNameDescriptor<'a> {
    const TAG: u8 = 0x47;
    const SCOPE: Scope = Scope::BAT.union(Scope::SDT);

    fn read(data: &'a [u8]) -> Result<BouquetNameDescriptor<'a>, DescriptorError> {
        Ok(BouquetNameDescriptor {
            bouquet_name: DvbStr::from_bytes(data),
        })
    }
}

/// サービス記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ServiceDescriptor<'a> {
    /// サービス形式種別。
    pub service_type: ServiceType,
    /// 事業者名。
    pub service_provider_name: &'a DvbStr,
    /// サービス名。
    pub service_name: &'a DvbStr,
}

impl<'a> Descriptor<'a> for ServiceDescriptor<'a> {
    const TAG: u8 = 0x48;
    const SCOPE: Scope = Scope::SDT;

    fn read(data: &'a [u8]) -> Result<ServiceDescriptor<'a>, DescriptorError> {
        let [service_type, provider_length, ref rem @ ..] = *data else {
            return Err(DescriptorError::InvalidLength("ServiceDescriptor"));
        };
        let Some((service_provider_name, rem)) = rem.split_at_checked(provider_length as usize)
        else {
            return Err(DescriptorError::InvalidLength("ServiceDescriptor::service_provider_name"));
        };
        let Some((&name_length, rem)) = rem.split_first() else {
            return Err(DescriptorError::InvalidLength("ServiceDescriptor"));
        };
        let Some(service_name) = rem.get(..name_length as usize) else {
            return Err(DescriptorError::InvalidLength("ServiceDescriptor::service_name"));
        };

        Ok(ServiceDescriptor {
            service_type: ServiceType(service_type),
            service_provider_name: DvbStr::from_bytes(service_provider_name),
            service_name: DvbStr::from_bytes(service_name),
        })
    }
}

/// リンク記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct LinkageDescriptor<'a> {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// サービス識別。
    pub service_id: u16,
    /// リンク種別。
    pub linkage_type: u8,
    /// プライベートデータ。
    pub private_data: &'a [u8],
}

impl<'a> LinkageDescriptor<'a> {
    /// 事業者形式の番組表へのリンクを示すリンク種別。
    pub const LINKAGE_TYPE_EPG: u8 = 0x82;

    /// 事業者形式の番組表へのリンクであれば、その時刻のずれ（分）を返す。
    pub fn epg_offset_minutes(&self) -> Option<i16> {
        if self.linkage_type != Self::LINKAGE_TYPE_EPG {
            return None;
        }

        let offset = self.private_data.get(0..2)?;
        Some(offset.read_be_16() as i16)
    }
}

impl<'a> Descriptor<'a> for LinkageDescriptor<'a> {
    const TAG: u8 = 0x4A;
    const SCOPE: Scope = Scope::NIT
        .union(Scope::BAT)
        .union(Scope::SDT)
        .union(Scope::EIT);

    fn read(data: &'a [u8]) -> Result<LinkageDescriptor<'a>, DescriptorError> {
        if data.len() < 7 {
            return Err(DescriptorError::InvalidLength("LinkageDescriptor"));
        }

        Ok(LinkageDescriptor {
            transport_stream_id: data[0..=1].read_be_16(),
            original_network_id: data[2..=3].read_be_16(),
            service_id: data[4..=5].read_be_16(),
            linkage_type: data[6],
            private_data: &data[7..],
        })
    }
}

/// 短形式イベント記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ShortEventDescriptor<'a> {
    /// 言語コード。
    pub lang_code: LangCode,
    /// 番組名。
    pub event_name: &'a DvbStr,
    /// 番組記述。
    pub text: &'a DvbStr,
}

impl<'a> Descriptor<'a> for ShortEventDescriptor<'a> {
    const TAG: u8 = 0x4D;
    const SCOPE: Scope = Scope::EIT;

    fn read(data: &'a [u8]) -> Result<ShortEventDescriptor<'a>, DescriptorError> {
        if data.len() < 4 {
            return Err(DescriptorError::InvalidLength("ShortEventDescriptor"));
        }

        let lang_code = LangCode::read(&data[0..=2]);
        let event_name_length = data[3];
        let Some((event_name, rem)) = data[4..].split_at_checked(event_name_length as usize)
        else {
            return Err(DescriptorError::InvalidLength("ShortEventDescriptor::event_name"));
        };
        let Some((&text_length, rem)) = rem.split_first() else {
            return Err(DescriptorError::InvalidLength("ShortEventDescriptor"));
        };
        let Some(text) = rem.get(..text_length as usize) else {
            return Err(DescriptorError::InvalidLength("ShortEventDescriptor::text"));
        };

        Ok(ShortEventDescriptor {
            lang_code,
            event_name: DvbStr::from_bytes(event_name),
            text: DvbStr::from_bytes(text),
        })
    }
}

/// 拡張形式イベント記述子における項目。
#[derive(Debug, PartialEq, Eq)]
pub struct ExtendedEventItem<'a> {
    /// 項目名。
    pub item_description: &'a DvbStr,
    /// 項目記述。
    pub item: &'a DvbStr,
}

/// 拡張形式イベント記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ExtendedEventDescriptor<'a> {
    /// 記述子番号（4ビット）。
    pub descriptor_number: u8,
    /// 最終記述子番号（4ビット）。
    pub last_descriptor_number: u8,
    /// 言語コード。
    pub lang_code: LangCode,
    /// 項目を格納する配列。
    pub items: Vec<ExtendedEventItem<'a>>,
    /// 拡張記述。
    pub text: &'a DvbStr,
}

impl<'a> Descriptor<'a> for ExtendedEventDescriptor<'a> {
    const TAG: u8 = 0x4E;
    const SCOPE: Scope = Scope::EIT;

    fn read(data: &'a [u8]) -> Result<ExtendedEventDescriptor<'a>, DescriptorError> {
        if data.len() < 5 {
            return Err(DescriptorError::InvalidLength("ExtendedEventDescriptor"));
        }

        let descriptor_number = (data[0] & 0b11110000) >> 4;
        let last_descriptor_number = data[0] & 0b00001111;
        let lang_code = LangCode::read(&data[1..=3]);
        let length_of_items = data[4];
        let Some((mut items_data, rem)) = data[5..].split_at_checked(length_of_items as usize)
        else {
            return Err(DescriptorError::InvalidLength("ExtendedEventDescriptor::items"));
        };

        let mut items = Vec::new();
        while !items_data.is_empty() {
            let Some((item_description, rem)) = read_length_prefixed(items_data) else {
                return Err(DescriptorError::InvalidLength("ExtendedEventDescriptor::item_description"));
            };
            let Some((item, rem)) = read_length_prefixed(rem) else {
                return Err(DescriptorError::InvalidLength("ExtendedEventDescriptor::item"));
            };
            items_data = rem;

            items.push(ExtendedEventItem {
                item_description: DvbStr::from_bytes(item_description),
                item: DvbStr::from_bytes(item),
            });
        }

        let Some((text, _)) = read_length_prefixed(rem) else {
            return Err(DescriptorError::InvalidLength("ExtendedEventDescriptor::text"));
        };

        Ok(ExtendedEventDescriptor {
            descriptor_number,
            last_descriptor_number,
            lang_code,
            items,
            text: DvbStr::from_bytes(text),
        })
    }
}

/// CA識別記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct CaIdentifierDescriptor {
    /// 限定受信方式識別を格納する配列。
    pub ca_system_ids: Vec<u16>,
}

impl Descriptor<'_> for CaIdentifierDescriptor {
    const TAG: u8 = 0x53;
    const SCOPE: Scope = Scope::SDT.union(Scope::BAT).union(Scope::EIT);

    fn read(data: &[u8]) -> Result<CaIdentifierDescriptor, DescriptorError> {
        if data.len() % 2 != 0 {
            return Err(DescriptorError::InvalidLength("CaIdentifierDescriptor"));
        }

        let ca_system_ids = data.chunks_exact(2).map(<[u8]>::read_be_16).collect();
        Ok(CaIdentifierDescriptor { ca_system_ids })
    }
}

/// コンテント記述子におけるジャンル。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentGenre {
    /// 大分類（4ビット）。
    pub level1: u8,
    /// 中分類（4ビット）。
    pub level2: u8,
    /// ユーザジャンル。
    pub user_byte: u8,
}

/// コンテント記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ContentDescriptor {
    /// ジャンルを格納する配列。
    pub genres: SmallVec<[ContentGenre; 4]>,
}

impl Descriptor<'_> for ContentDescriptor {
    const TAG: u8 = 0x54;
    const SCOPE: Scope = Scope::EIT;

    fn read(data: &[u8]) -> Result<ContentDescriptor, DescriptorError> {
        let genres = data
            .chunks_exact(2)
            .map(|chunk| ContentGenre {
                level1: (chunk[0] & 0b11110000) >> 4,
                level2: chunk[0] & 0b00001111,
                user_byte: chunk[1],
            })
            .collect();

        Ok(ContentDescriptor { genres })
    }
}

/// パレンタルレート記述子における国ごとのレート。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentalRating {
    /// 国コード。
    pub country_code: LangCode,
    /// レート。
    pub rating: u8,
}

impl ParentalRating {
    /// レートが示す最低年齢を返す。
    ///
    /// `0x01`から`0x0F`までは`rating + 3`歳、それ以外は事業者定義または未定義。
    #[inline]
    pub fn min_age(&self) -> Option<u8> {
        match self.rating {
            0x01..=0x0F => Some(self.rating + 3),
            _ => None,
        }
    }
}

/// パレンタルレート記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ParentalRatingDescriptor {
    /// 国ごとのレートを格納する配列。
    pub ratings: Vec<ParentalRating>,
}

impl Descriptor<'_> for ParentalRatingDescriptor {
    const TAG: u8 = 0x55;
    const SCOPE: Scope = Scope::EIT;

    fn read(data: &[u8]) -> Result<ParentalRatingDescriptor, DescriptorError> {
        let ratings = data
            .chunks_exact(4)
            .map(|chunk| ParentalRating {
                country_code: LangCode::read(&chunk[0..=2]),
                rating: chunk[3],
            })
            .collect();

        Ok(ParentalRatingDescriptor { ratings })
    }
}

/// 地域ごとの時差。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffset {
    /// 国コード。
    pub country_code: LangCode,
    /// 国内地域識別（6ビット）。
    pub country_region_id: u8,
    /// UTCからの時差。
    pub local_time_offset: Duration,
    /// 時差が変更される日時（UTC）。
    pub time_of_change: Option<NaiveDateTime>,
    /// 変更後の時差。
    pub next_time_offset: Duration,
}

/// 地域時差記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct LocalTimeOffsetDescriptor {
    /// 地域ごとの時差を格納する配列。
    pub offsets: Vec<LocalTimeOffset>,
}

impl Descriptor<'_> for LocalTimeOffsetDescriptor {
    const TAG: u8 = 0x58;
    const SCOPE: Scope = Scope::TOT;

    fn read(data: &[u8]) -> Result<LocalTimeOffsetDescriptor, DescriptorError> {
        if data.len() % 13 != 0 {
            return Err(DescriptorError::InvalidLength("LocalTimeOffsetDescriptor"));
        }

        let offsets = data
            .chunks_exact(13)
            .map(|chunk| {
                let negative = chunk[3] & 0b00000001 != 0;
                let hhmm = |b: &[u8]| {
                    let minutes = Duration::minutes(b.read_bcd(4) as i64 / 100 * 60)
                        + Duration::minutes(b.read_bcd(4) as i64 % 100);
                    if negative {
                        -minutes
                    } else {
                        minutes
                    }
                };

                LocalTimeOffset {
                    country_code: LangCode::read(&chunk[0..=2]),
                    country_region_id: (chunk[3] & 0b11111100) >> 2,
                    local_time_offset: hhmm(&chunk[4..=5]),
                    time_of_change: crate::time::read_utc(
                        chunk[6..=10].try_into().expect("5 bytes"),
                    ),
                    next_time_offset: hhmm(&chunk[11..=12]),
                }
            })
            .collect();

        Ok(LocalTimeOffsetDescriptor { offsets })
    }
}

/// 地上分配システム記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct TerrestrialDeliverySystemDescriptor {
    /// 中心周波数（単位は10Hz）。
    pub centre_frequency: u32,
    /// 帯域幅（MHz）。
    pub bandwidth_mhz: u8,
    /// 高優先度ストリームであれば`true`。
    pub priority: bool,
    /// コンスタレーション（2ビット）。
    pub constellation: u8,
    /// 階層情報（3ビット）。
    pub hierarchy_information: u8,
    /// 高優先度ストリームの符号化率（3ビット）。
    pub code_rate_hp: u8,
    /// 低優先度ストリームの符号化率（3ビット）。
    pub code_rate_lp: u8,
    /// ガードインターバル（2ビット）。
    pub guard_interval: u8,
    /// 伝送モード（2ビット）。
    pub transmission_mode: u8,
    /// 他の周波数でも伝送されていれば`true`。
    pub other_frequency_flag: bool,
}

impl Descriptor<'_> for TerrestrialDeliverySystemDescriptor {
    const TAG: u8 = 0x5A;
    const SCOPE: Scope = Scope::NIT;

    fn read(data: &[u8]) -> Result<TerrestrialDeliverySystemDescriptor, DescriptorError> {
        if data.len() != 11 {
            return Err(DescriptorError::InvalidLength("TerrestrialDeliverySystemDescriptor"));
        }

        let centre_frequency = data[0..=3].read_be_32();
        let bandwidth_mhz = match (data[4] & 0b11100000) >> 5 {
            value @ 0..=3 => 8 - value,
            value => {
                return Err(DescriptorError::OutOfRange {
                    field: "bandwidth",
                    value: value as u32,
                })
            }
        };
        let priority = data[4] & 0b00010000 != 0;
        let constellation = (data[5] & 0b11000000) >> 6;
        let hierarchy_information = (data[5] & 0b00111000) >> 3;
        let code_rate_hp = data[5] & 0b00000111;
        let code_rate_lp = (data[6] & 0b11100000) >> 5;
        let guard_interval = (data[6] & 0b00011000) >> 3;
        let transmission_mode = (data[6] & 0b00000110) >> 1;
        let other_frequency_flag = data[6] & 0b00000001 != 0;

        Ok(TerrestrialDeliverySystemDescriptor {
            centre_frequency,
            bandwidth_mhz,
            priority,
            constellation,
            hierarchy_information,
            code_rate_hp,
            code_rate_lp,
            guard_interval,
            transmission_mode,
            other_frequency_flag,
        })
    }
}

/// データ放送識別記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DataBroadcastIdDescriptor<'a> {
    /// データ放送識別。
    pub data_broadcast_id: u16,
    /// 識別子バイト。
    pub id_selector: &'a [u8],
}

impl<'a> DataBroadcastIdDescriptor<'a> {
    /// MHEG5のオブジェクトカルーセルを示すデータ放送識別。
    pub const MHEG5: u16 = 0x0106;
}

impl<'a> Descriptor<'a> for DataBroadcastIdDescriptor<'a> {
    const TAG: u8 = 0x66;
    const SCOPE: Scope = Scope::PMT;

    fn read(data: &'a [u8]) -> Result<DataBroadcastIdDescriptor<'a>, DescriptorError> {
        if data.len() < 2 {
            return Err(DescriptorError::InvalidLength("DataBroadcastIdDescriptor"));
        }

        Ok(DataBroadcastIdDescriptor {
            data_broadcast_id: data[0..=1].read_be_16(),
            id_selector: &data[2..],
        })
    }
}

/// CRIDの参照先。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CridLocation<'a> {
    /// 記述子中に含まれるCRID。
    Inline(&'a [u8]),
    /// CIT中のCRIDへの参照。
    Reference(u16),
}

/// コンテント識別記述子におけるCRID。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crid<'a> {
    /// CRID種別（6ビット）。
    pub crid_type: u8,
    /// CRIDの参照先。
    pub location: CridLocation<'a>,
}

impl<'a> Crid<'a> {
    /// エピソードを示すCRIDかどうかを返す。
    #[inline]
    pub fn is_episode(&self) -> bool {
        matches!(self.crid_type, 0x01 | 0x31)
    }

    /// シリーズを示すCRIDかどうかを返す。
    #[inline]
    pub fn is_series(&self) -> bool {
        matches!(self.crid_type, 0x02 | 0x32)
    }

    /// 記述子中に含まれるCRIDを文字列で返す。
    pub fn as_str(&self) -> Option<&'a str> {
        match self.location {
            CridLocation::Inline(bytes) => std::str::from_utf8(bytes).ok(),
            CridLocation::Reference(_) => None,
        }
    }
}

/// コンテント識別記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ContentIdentifierDescriptor<'a> {
    /// CRIDを格納する配列。
    pub crids: Vec<Crid<'a>>,
}

impl<'a> ContentIdentifierDescriptor<'a> {
    /// エピソードを示すCRIDを返す。
    pub fn episode(&self) -> Option<&'a str> {
        self.crids.iter().find(|c| c.is_episode()).and_then(Crid::as_str)
    }

    /// シリーズを示すCRIDを返す。
    pub fn series(&self) -> Option<&'a str> {
        self.crids.iter().find(|c| c.is_series()).and_then(Crid::as_str)
    }
}

impl<'a> Descriptor<'a> for ContentIdentifierDescriptor<'a> {
    const TAG: u8 = 0x76;
    const SCOPE: Scope = Scope::EIT;

    fn read(mut data: &'a [u8]) -> Result<ContentIdentifierDescriptor<'a>, DescriptorError> {
        let mut crids = Vec::new();
        while let Some((&head, rem)) = data.split_first() {
            let crid_type = (head & 0b11111100) >> 2;
            let location = match head & 0b00000011 {
                0 => {
                    let Some((crid, rem)) = read_length_prefixed(rem) else {
                        return Err(DescriptorError::InvalidLength("ContentIdentifierDescriptor::crid"));
                    };
                    data = rem;
                    CridLocation::Inline(crid)
                }
                1 => {
                    let Some((crid_ref, rem)) = rem.split_at_checked(2) else {
                        return Err(DescriptorError::InvalidLength("ContentIdentifierDescriptor::crid_ref"));
                    };
                    data = rem;
                    CridLocation::Reference(crid_ref.read_be_16())
                }
                value => {
                    return Err(DescriptorError::OutOfRange {
                        field: "crid_location",
                        value: value as u32,
                    })
                }
            };

            crids.push(Crid {
                crid_type,
                location,
            });
        }

        Ok(ContentIdentifierDescriptor { crids })
    }
}

/// T2分配システム記述子におけるセル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T2Cell {
    /// セル識別。
    pub cell_id: u16,
    /// 中心周波数（単位は10Hz）。
    pub centre_frequencies: SmallVec<[u32; 2]>,
}

/// T2分配システム記述子（拡張記述子）。
#[derive(Debug, PartialEq, Eq)]
pub struct T2DeliverySystemDescriptor {
    /// PLP識別。
    pub plp_id: u8,
    /// T2システム識別。
    pub t2_system_id: u16,
    /// 帯域幅の符号（4ビット）。詳細情報がない場合は`None`。
    pub bandwidth: Option<u8>,
    /// セルを格納する配列。
    pub cells: Vec<T2Cell>,
}

impl Descriptor<'_> for T2DeliverySystemDescriptor {
    const TAG: u8 = 0x7F;
    const TAG_EXTENSION: Option<u8> = Some(0x04);
    const SCOPE: Scope = Scope::NIT;

    fn read(data: &[u8]) -> Result<T2DeliverySystemDescriptor, DescriptorError> {
        // 先頭は拡張タグ
        if data.len() < 4 {
            return Err(DescriptorError::InvalidLength("T2DeliverySystemDescriptor"));
        }

        let plp_id = data[1];
        let t2_system_id = data[2..=3].read_be_16();
        let mut rem = &data[4..];
        if rem.is_empty() {
            return Ok(T2DeliverySystemDescriptor {
                plp_id,
                t2_system_id,
                bandwidth: None,
                cells: Vec::new(),
            });
        }

        if rem.len() < 2 {
            return Err(DescriptorError::InvalidLength("T2DeliverySystemDescriptor"));
        }
        let bandwidth = (rem[0] & 0b00111100) >> 2;
        let tfs_flag = rem[1] & 0b00000001 != 0;
        rem = &rem[2..];

        let truncated = || DescriptorError::InvalidLength("T2DeliverySystemDescriptor::cells");
        let mut cells = Vec::new();
        while !rem.is_empty() {
            let (cell_id, tail) = rem.split_at_checked(2).ok_or_else(truncated)?;
            let (frequencies, tail) = if tfs_flag {
                let (&length, tail) = tail.split_first().ok_or_else(truncated)?;
                tail.split_at_checked(length as usize).ok_or_else(truncated)?
            } else {
                tail.split_at_checked(4).ok_or_else(truncated)?
            };
            let (&subcell_length, tail) = tail.split_first().ok_or_else(truncated)?;
            rem = tail.get(subcell_length as usize..).ok_or_else(truncated)?;

            cells.push(T2Cell {
                cell_id: cell_id.read_be_16(),
                centre_frequencies: frequencies.chunks_exact(4).map(<[u8]>::read_be_32).collect(),
            });
        }

        Ok(T2DeliverySystemDescriptor {
            plp_id,
            t2_system_id,
            bandwidth: Some(bandwidth),
            cells,
        })
    }
}

/// 先頭1バイトを長さとするバイト列を読み取り、後続データと共に返す。
fn read_length_prefixed(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&length, rem) = data.split_first()?;
    rem.split_at_checked(length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use hex_literal::hex;

    #[test]
    fn test_service() {
        let data = hex!("01 03 42 42 43 05 42 42 43 20 31");
        let desc = ServiceDescriptor::read(&data).unwrap();
        assert_eq!(desc.service_type, ServiceType::DIGITAL_TV);
        assert_eq!(desc.service_provider_name.as_bytes(), b"BBC");
        assert_eq!(desc.service_name.as_bytes(), b"BBC 1");

        assert_matches!(
            ServiceDescriptor::read(&data[..8]),
            Err(DescriptorError::InvalidLength(_))
        );
    }

    #[test]
    fn test_satellite() {
        // 11.778GHz、19.2E、水平、DVB-S2、α=0.20、27.5Msym/s、FEC 3/4
        let data = hex!("01 17 78 00 01 92 95 02 75 00 03");
        let desc = SatelliteDeliverySystemDescriptor::read(&data).unwrap();
        assert_eq!(desc.frequency, 1177800);
        assert_eq!(desc.orbital_position, 192);
        assert!(desc.west_east_flag);
        assert_eq!(desc.polarization, Polarization::LinearHorizontal);
        assert_eq!(desc.roll_off, RollOff::Alpha020);
        assert!(desc.is_dvb_s2);
        assert_eq!(desc.modulation_type, 0b01);
        assert_eq!(desc.symbol_rate, 275000);
        assert_eq!(desc.fec_inner, 3);

        // DVB-S2でロールオフ0b11は範囲外
        let data = hex!("01 17 78 00 01 92 9D 02 75 00 03");
        assert_matches!(
            SatelliteDeliverySystemDescriptor::read(&data),
            Err(DescriptorError::OutOfRange { field: "roll_off", value: 3 })
        );
    }

    #[test]
    fn test_cable() {
        let data = hex!("03 46 00 00 FF F2 03 00 69 00 05");
        let desc = CableDeliverySystemDescriptor::read(&data).unwrap();
        assert_eq!(desc.frequency, 3460000);
        assert_eq!(desc.fec_outer, 2);
        assert_eq!(desc.modulation, CableModulation::Qam64);
        assert_eq!(desc.symbol_rate, 69000);

        let data = hex!("03 46 00 00 FF F2 06 00 69 00 05");
        assert_matches!(
            CableDeliverySystemDescriptor::read(&data),
            Err(DescriptorError::OutOfRange { field: "modulation", value: 6 })
        );
    }

    #[test]
    fn test_terrestrial() {
        // 474MHz、8MHz
        let data = hex!("02 D3 44 40 1F 8A 41 FF FF FF FF");
        let desc = TerrestrialDeliverySystemDescriptor::read(&data).unwrap();
        assert_eq!(desc.centre_frequency, 47_400_000);
        assert_eq!(desc.bandwidth_mhz, 8);
        assert!(desc.priority);
        assert!(desc.other_frequency_flag);

        let data = hex!("02 D3 44 40 9F 8A 41 FF FF FF FF");
        assert_matches!(
            TerrestrialDeliverySystemDescriptor::read(&data),
            Err(DescriptorError::OutOfRange { field: "bandwidth", value: 4 })
        );
    }

    #[test]
    fn test_linkage() {
        let data = hex!("00 01 00 02 00 03 82 FF C4");
        let desc = LinkageDescriptor::read(&data).unwrap();
        assert_eq!(desc.service_id, 3);
        assert_eq!(desc.epg_offset_minutes(), Some(-60));

        let data = hex!("00 01 00 02 00 03 09");
        assert_eq!(LinkageDescriptor::read(&data).unwrap().epg_offset_minutes(), None);
    }

    #[test]
    fn test_short_and_extended_event() {
        let data = hex!("65 6E 67 04 4E 65 77 73 05 54 6F 64 61 79");
        let desc = ShortEventDescriptor::read(&data).unwrap();
        assert_eq!(desc.lang_code, LangCode::ENG);
        assert_eq!(desc.event_name.as_bytes(), b"News");
        assert_eq!(desc.text.as_bytes(), b"Today");

        let data = hex!("01 65 6E 67 07 04 43 61 73 74 01 58 02 48 69");
        let desc = ExtendedEventDescriptor::read(&data).unwrap();
        assert_eq!(desc.last_descriptor_number, 1);
        assert_eq!(desc.items.len(), 1);
        assert_eq!(desc.items[0].item_description.as_bytes(), b"Cast");
        assert_eq!(desc.items[0].item.as_bytes(), b"X");
        assert_eq!(desc.text.as_bytes(), b"Hi");
    }

    #[test]
    fn test_content_and_rating() {
        let desc = ContentDescriptor::read(&hex!("10 00 43 01")).unwrap();
        assert_eq!(desc.genres.len(), 2);
        assert_eq!(desc.genres[1].level1, 4);
        assert_eq!(desc.genres[1].level2, 3);

        let desc = ParentalRatingDescriptor::read(&hex!("47 42 52 0C")).unwrap();
        assert_eq!(desc.ratings[0].min_age(), Some(15));
        assert!(desc.ratings[0].country_code.matches("gbr"));
    }

    #[test]
    fn test_local_time_offset() {
        let data = hex!("47 42 52 02 00 00 EB 96 01 00 00 01 00");
        let desc = LocalTimeOffsetDescriptor::read(&data).unwrap();
        let offset = &desc.offsets[0];
        assert_eq!(offset.local_time_offset, Duration::zero());
        assert_eq!(
            offset.time_of_change,
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(1, 0, 0).unwrap())
        );
        assert_eq!(offset.next_time_offset, Duration::hours(1));

        // 西経側は負
        let data = hex!("55 53 41 07 05 30 EB 96 01 00 00 04 30");
        let desc = LocalTimeOffsetDescriptor::read(&data).unwrap();
        assert_eq!(desc.offsets[0].country_region_id, 1);
        assert_eq!(desc.offsets[0].local_time_offset, -Duration::minutes(330));
        assert_eq!(desc.offsets[0].next_time_offset, -Duration::minutes(270));
    }

    #[test]
    fn test_content_identifier() {
        let data = hex!("04 05 2F 61 62 63 31 09 00 10 0C 01 58");
        let desc = ContentIdentifierDescriptor::read(&data).unwrap();
        assert_eq!(desc.crids.len(), 3);
        assert_eq!(desc.episode(), Some("/abc1"));
        assert_eq!(desc.series(), None);
        assert_eq!(desc.crids[1].location, CridLocation::Reference(0x0010));

        assert_matches!(
            ContentIdentifierDescriptor::read(&hex!("0B 00")),
            Err(DescriptorError::OutOfRange { field: "crid_location", value: 3 })
        );
    }

    #[test]
    fn test_t2_delivery() {
        let data = hex!("04 00 80 01 09 00 00 01 02 D3 44 40 00");
        let desc = T2DeliverySystemDescriptor::read(&data).unwrap();
        assert_eq!(desc.t2_system_id, 0x8001);
        assert_eq!(desc.bandwidth, Some(2));
        assert_eq!(desc.cells.len(), 1);
        assert_eq!(desc.cells[0].cell_id, 1);
        assert_eq!(desc.cells[0].centre_frequencies.as_slice(), &[47_400_000]);

        let desc = T2DeliverySystemDescriptor::read(&hex!("04 00 80 01")).unwrap();
        assert_eq!(desc.bandwidth, None);
    }
}
