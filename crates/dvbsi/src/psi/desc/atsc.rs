//! ATSC（A/65）で規定される記述子。

use crate::text::MultipleString;

use super::base::{Descriptor, DescriptorError};
use super::{CollectionType, Scope};

/// コンテント勧告記述子における地域ごとのレート。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRegion<'a> {
    /// レート地域。
    pub rating_region: u8,
    /// 次元ごとの値（次元、値（4ビット））。
    pub dimensions: Vec<(u8, u8)>,
    /// レートの説明。
    pub description: MultipleString<'a>,
}

/// コンテント勧告記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ContentAdvisoryDescriptor<'a> {
    /// 地域ごとのレートを格納する配列。
    pub regions: Vec<RatingRegion<'a>>,
}

impl<'a> Descriptor<'a> for ContentAdvisoryDescriptor<'a> {
    const TAG: u8 = 0x87;
    const SCOPE: Scope = Scope::EIT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::Atsc);

    fn read(data: &'a [u8]) -> Result<ContentAdvisoryDescriptor<'a>, DescriptorError> {
        let Some((&count, mut data)) = data.split_first() else {
            return Err(DescriptorError::InvalidLength("ContentAdvisoryDescriptor"));
        };

        let truncated = || DescriptorError::InvalidLength("ContentAdvisoryDescriptor::regions");
        let mut regions = Vec::new();
        for _ in 0..count & 0b00111111 {
            let [rating_region, rated_dimensions, ref rem @ ..] = *data else {
                return Err(truncated());
            };
            let (dims, rem) = rem
                .split_at_checked(2 * rated_dimensions as usize)
                .ok_or_else(truncated)?;
            let (&description_length, rem) = rem.split_first().ok_or_else(truncated)?;
            let (description, rem) = rem
                .split_at_checked(description_length as usize)
                .ok_or_else(truncated)?;
            data = rem;

            regions.push(RatingRegion {
                rating_region,
                dimensions: dims
                    .chunks_exact(2)
                    .map(|chunk| (chunk[0], chunk[1] & 0b00001111))
                    .collect(),
                description: MultipleString::new(description),
            });
        }

        Ok(ContentAdvisoryDescriptor { regions })
    }
}

/// 拡張チャンネル名記述子。
#[derive(Debug, PartialEq, Eq)]
pub struct ExtendedChannelNameDescriptor<'a> {
    /// チャンネルの正式名。
    pub long_channel_name: MultipleString<'a>,
}

impl<'a> Descriptor<'a> for ExtendedChannelNameDescriptor<'a> {
    const TAG: u8 = 0xA0;
    const SCOPE: Scope = Scope::VCT;
    const COLLECTION: Option<CollectionType> = Some(CollectionType::Atsc);

    fn read(data: &'a [u8]) -> Result<ExtendedChannelNameDescriptor<'a>, DescriptorError> {
        Ok(ExtendedChannelNameDescriptor {
            long_channel_name: MultipleString::new(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_content_advisory() {
        let data = hex!(
            "C1"
            "01 02 00 F3 01 F2"
            "0C 01 65 6E 67 01 00 00 04 54 56 2D 31"
        );
        let desc = ContentAdvisoryDescriptor::read(&data).unwrap();
        assert_eq!(desc.regions.len(), 1);
        assert_eq!(desc.regions[0].rating_region, 1);
        assert_eq!(desc.regions[0].dimensions, [(0, 3), (1, 2)]);
        assert_eq!(desc.regions[0].description.strings().count(), 1);

        assert_matches!(
            ContentAdvisoryDescriptor::read(&data[..5]),
            Err(DescriptorError::InvalidLength(_))
        );
    }
}
