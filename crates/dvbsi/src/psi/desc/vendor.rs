//! 事業者独自の記述子。
//!
//! 論理チャンネル記述子はどの収集形式でも有効だが、
//! それ以外は事業者形式の番組表を収集している場合にのみ有効となる。

use chrono::NaiveDate;

use crate::bytes::BytesExt;

use super::base::{Descriptor, DescriptorError};
use super::{CollectionType, Scope};

/// 論理チャンネル記述子におけるチャンネル。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalChannel {
    /// サービス識別。
    pub service_id: u16,
    /// 受信機のチャンネル一覧に表示するかどうか。
    pub visible: bool,
    /// 論理チャンネル番号（10ビット）。
    pub channel_number: u16,
}

/// 論理チャンネル記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct LogicalChannelDescriptor {
    /// チャンネルを格納する配列。
    pub channels: Vec<LogicalChannel>,
}

impl Descriptor<'_> for LogicalChannelDescriptor {
    const TAG: u8 = 0x83;
    const SCOPE: Scope = Scope::NIT.union(Scope::BAT);

    fn read(data: &[u8]) -> Result<LogicalChannelDescriptor, DescriptorError> {
        if data.len() % 4 != 0 {
            return Err(DescriptorError::InvalidLength("LogicalChannelDescriptor"));
        }

        let channels = data
            .chunks_exact(4)
            .map(|chunk| LogicalChannel {
                service_id: chunk[0..=1].read_be_16(),
                visible: chunk[2] & 0b10000000 != 0,
                channel_number: chunk[2..=3].read_be_16() & 0b0000_0011_1111_1111,
            })
            .collect();

        Ok(LogicalChannelDescriptor { channels })
    }
}

/// 内容に関する注意事項のフラグ。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Advisory(pub u8);

impl Advisory {
    /// 言葉遣い。
    pub const LANGUAGE: u8 = 0x01;
    /// 性的表現。
    pub const SEX: u8 = 0x02;
    /// 暴力表現。
    pub const VIOLENCE: u8 = 0x04;
    /// 裸体表現。
    pub const NUDITY: u8 = 0x08;

    /// 言葉遣いに関する注意があるかどうか。
    #[inline]
    pub fn language(&self) -> bool {
        self.0 & Self::LANGUAGE != 0
    }

    /// 性的表現に関する注意があるかどうか。
    #[inline]
    pub fn sex(&self) -> bool {
        self.0 & Self::SEX != 0
    }

    /// 暴力表現に関する注意があるかどうか。
    #[inline]
    pub fn violence(&self) -> bool {
        self.0 & Self::VIOLENCE != 0
    }

    /// 裸体表現に関する注意があるかどうか。
    #[inline]
    pub fn nudity(&self) -> bool {
        self.0 & Self::NUDITY != 0
    }
}

/// 事業者形式のレート記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishRatingDescriptor {
    /// 映画のレート。
    pub mpaa_rating: &'static str,
    /// 評価（0から7）。
    pub star_rating: u8,
    /// 注意事項。
    pub advisory: Advisory,
}

impl DishRatingDescriptor {
    const MPAA_RATINGS: [&'static str; 7] = ["", "G", "PG", "PG-13", "R", "NC-17", "NR"];
}

impl Descriptor<'_> for DishRatingDescriptor {
    const TAG: u8 = 0x89;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &[u8]) -> Result<DishRatingDescriptor, DescriptorError> {
        if data.len() < 2 {
            return Err(DescriptorError::InvalidLength("DishRatingDescriptor"));
        }

        let index = (data[0] & 0b11100000) >> 5;
        let Some(&mpaa_rating) = Self::MPAA_RATINGS.get(index as usize) else {
            return Err(DescriptorError::OutOfRange {
                field: "mpaa_rating",
                value: index as u32,
            });
        };
        let star_rating = (data[0] & 0b00001110) >> 1;
        let advisory = Advisory(data[1] & 0x0F);

        Ok(DishRatingDescriptor {
            mpaa_rating,
            star_rating,
            advisory,
        })
    }
}

/// 事業者形式の番組名記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishEventNameDescriptor<'a> {
    /// 圧縮された番組名。
    pub compressed: &'a [u8],
}

impl<'a> Descriptor<'a> for DishEventNameDescriptor<'a> {
    const TAG: u8 = 0x91;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &'a [u8]) -> Result<DishEventNameDescriptor<'a>, DescriptorError> {
        Ok(DishEventNameDescriptor { compressed: data })
    }
}

/// 事業者形式の番組記述記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishEventDescriptionDescriptor<'a> {
    /// 圧縮された番組記述。
    pub compressed: &'a [u8],
}

impl<'a> Descriptor<'a> for DishEventDescriptionDescriptor<'a> {
    const TAG: u8 = 0x92;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &'a [u8]) -> Result<DishEventDescriptionDescriptor<'a>, DescriptorError> {
        Ok(DishEventDescriptionDescriptor { compressed: data })
    }
}

/// 事業者形式の番組属性記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishPropertiesDescriptor {
    /// 字幕あり。
    pub subtitles: bool,
    /// ステレオ音声。
    pub stereo: bool,
    /// HD映像。
    pub high_definition: bool,
    /// ドルビー音声。
    pub dolby: bool,
}

impl Descriptor<'_> for DishPropertiesDescriptor {
    const TAG: u8 = 0x94;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &[u8]) -> Result<DishPropertiesDescriptor, DescriptorError> {
        let Some(&flags) = data.first() else {
            return Err(DescriptorError::InvalidLength("DishPropertiesDescriptor"));
        };

        Ok(DishPropertiesDescriptor {
            subtitles: flags & 0x01 != 0,
            stereo: flags & 0x02 != 0,
            high_definition: flags & 0x04 != 0,
            dolby: flags & 0x08 != 0,
        })
    }
}

/// 事業者形式のVチップ記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishVchipDescriptor {
    /// テレビ番組のレート。
    pub tv_rating: &'static str,
    /// 注意事項。
    pub advisory: Advisory,
}

impl DishVchipDescriptor {
    const TV_RATINGS: [&'static str; 6] = ["TV-Y", "TV-Y7", "TV-G", "TV-PG", "TV-14", "TV-MA"];
}

impl Descriptor<'_> for DishVchipDescriptor {
    const TAG: u8 = 0x95;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &[u8]) -> Result<DishVchipDescriptor, DescriptorError> {
        let [index, flags, ..] = *data else {
            return Err(DescriptorError::InvalidLength("DishVchipDescriptor"));
        };
        let Some(&tv_rating) = Self::TV_RATINGS.get(index as usize) else {
            return Err(DescriptorError::OutOfRange {
                field: "tv_rating",
                value: index as u32,
            });
        };

        Ok(DishVchipDescriptor {
            tv_rating,
            advisory: Advisory(flags & 0x0F),
        })
    }
}

/// 事業者形式のシリーズ記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct DishSeriesDescriptor {
    /// シリーズ識別。
    pub series_id: u32,
    /// シーズン番号。
    pub season: u8,
    /// エピソード番号。
    pub episode: u16,
    /// 初回放送日。
    pub original_air_date: Option<NaiveDate>,
}

impl Descriptor<'_> for DishSeriesDescriptor {
    const TAG: u8 = 0x96;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::DishNetwork);

    fn read(data: &[u8]) -> Result<DishSeriesDescriptor, DescriptorError> {
        if data.len() < 7 {
            return Err(DescriptorError::InvalidLength("DishSeriesDescriptor"));
        }

        let series_id = data[0..=3].read_be_32();
        let season = data[4];
        let episode = data[5..=6].read_be_16();
        let original_air_date = match data.get(7..9) {
            Some([0, 0]) | Some([0xFF, 0xFF]) | None => None,
            Some(mjd) => Some(crate::time::read_mjd(&[mjd[0], mjd[1]])),
        };

        Ok(DishSeriesDescriptor {
            series_id,
            season,
            episode,
            original_air_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_logical_channel() {
        let desc = LogicalChannelDescriptor::read(&hex!("10 44 FC 01 10 45 7C 65")).unwrap();
        assert_eq!(
            desc.channels,
            [
                LogicalChannel {
                    service_id: 0x1044,
                    visible: true,
                    channel_number: 1,
                },
                LogicalChannel {
                    service_id: 0x1045,
                    visible: false,
                    channel_number: 101,
                },
            ]
        );
        assert!(LogicalChannelDescriptor::read(&hex!("10 44 FC")).is_err());
    }

    #[test]
    fn test_dish_rating() {
        // PG-13、星5、暴力表現
        let desc = DishRatingDescriptor::read(&hex!("6A 04")).unwrap();
        assert_eq!(desc.mpaa_rating, "PG-13");
        assert_eq!(desc.star_rating, 5);
        assert!(desc.advisory.violence());
        assert!(!desc.advisory.sex());

        assert_matches!(
            DishRatingDescriptor::read(&hex!("E0 00")),
            Err(DescriptorError::OutOfRange { field: "mpaa_rating", value: 7 })
        );
    }

    #[test]
    fn test_dish_vchip() {
        let desc = DishVchipDescriptor::read(&hex!("04 03")).unwrap();
        assert_eq!(desc.tv_rating, "TV-14");
        assert!(desc.advisory.language());
        assert!(desc.advisory.sex());

        assert_matches!(
            DishVchipDescriptor::read(&hex!("06 00")),
            Err(DescriptorError::OutOfRange { field: "tv_rating", value: 6 })
        );
    }

    #[test]
    fn test_dish_series() {
        let desc = DishSeriesDescriptor::read(&hex!("00 00 30 39 02 00 0A EB 96")).unwrap();
        assert_eq!(desc.series_id, 12345);
        assert_eq!(desc.season, 2);
        assert_eq!(desc.episode, 10);
        assert_eq!(desc.original_air_date, NaiveDate::from_ymd_opt(2024, 1, 1));

        let desc = DishSeriesDescriptor::read(&hex!("00 00 30 39 02 00 0A")).unwrap();
        assert_eq!(desc.original_air_date, None);
    }

    #[test]
    fn test_dish_properties() {
        let desc = DishPropertiesDescriptor::read(&[0x05]).unwrap();
        assert!(desc.subtitles);
        assert!(!desc.stereo);
        assert!(desc.high_definition);
    }
}
