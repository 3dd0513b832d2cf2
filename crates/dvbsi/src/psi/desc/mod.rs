//! 記述子と、タグ・テーブルの範囲・収集形式による記述子の振り分け。
//!
//! [`parse`]は記述子を1つ読み取り、次の記述子の位置を返す。
//! 未定義のタグや、テーブルの範囲・収集形式が一致しない記述子は
//! [`AnyDescriptor::Generic`]として読み取られる。

mod atsc;
mod base;
mod dvb;
mod vendor;

pub use atsc::*;
pub use base::*;
pub use dvb::*;
pub use vendor::*;

use std::fmt;
use std::ops::BitOr;

/// 記述子が有効なテーブルの範囲を示すビットマスク。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope(u16);

impl Scope {
    /// NIT。
    pub const NIT: Scope = Scope(1 << 0);
    /// SDT。
    pub const SDT: Scope = Scope(1 << 1);
    /// EIT。
    pub const EIT: Scope = Scope(1 << 2);
    /// BAT。
    pub const BAT: Scope = Scope(1 << 3);
    /// TOT。
    pub const TOT: Scope = Scope(1 << 4);
    /// PMT。
    pub const PMT: Scope = Scope(1 << 5);
    /// SIT。
    pub const SIT: Scope = Scope(1 << 6);
    /// CAT。
    pub const CAT: Scope = Scope(1 << 7);
    /// ATSCのVCT。
    pub const VCT: Scope = Scope(1 << 8);
    /// すべてのテーブル。
    pub const ALL: Scope = Scope(u16::MAX);

    /// 2つの範囲を合わせた範囲を返す。
    #[inline]
    pub const fn union(self, other: Scope) -> Scope {
        Scope(self.0 | other.0)
    }

    /// この範囲で有効な記述子が`requested`のテーブルで使えるかどうかを返す。
    #[inline]
    pub const fn accepts(self, requested: Scope) -> bool {
        self.0 & requested.0 != 0
    }
}

impl BitOr for Scope {
    type Output = Scope;

    #[inline]
    fn bitor(self, rhs: Scope) -> Scope {
        self.union(rhs)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Scope({:#011b})", self.0)
    }
}

/// 番組表の収集形式。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionType {
    /// DVBのEIT。
    #[default]
    Dvb,
    /// 事業者形式の圧縮された番組表。
    DishNetwork,
    /// ATSC PSIP。
    Atsc,
}

/// 記述子を読み取る関数。
pub type ParserFn<'a> = fn(u8, &'a [u8]) -> Result<AnyDescriptor<'a>, DescriptorError>;

fn parse_typed<'a, T>(_tag: u8, data: &'a [u8]) -> Result<AnyDescriptor<'a>, DescriptorError>
where
    T: Descriptor<'a> + Into<AnyDescriptor<'a>>,
{
    T::read(data).map(Into::into)
}

fn parse_generic(tag: u8, data: &[u8]) -> Result<AnyDescriptor, DescriptorError> {
    Ok(AnyDescriptor::Generic(RawDescriptor { tag, data }))
}

macro_rules! any_descriptor {
    ($($variant:ident($ty:ty),)*) => {
        /// 種別ごとに読み取られた記述子。
        #[derive(Debug, PartialEq, Eq)]
        pub enum AnyDescriptor<'a> {
            $(
                #[allow(missing_docs)]
                $variant($ty),
            )*
            /// 未定義、または範囲外の記述子。
            Generic(RawDescriptor<'a>),
        }

        $(
            impl<'a> From<$ty> for AnyDescriptor<'a> {
                #[inline]
                fn from(desc: $ty) -> AnyDescriptor<'a> {
                    AnyDescriptor::$variant(desc)
                }
            }
        )*

        impl<'a> AnyDescriptor<'a> {
            /// 記述子のタグを返す。
            pub fn tag(&self) -> u8 {
                match self {
                    $(AnyDescriptor::$variant(_) => <$ty as Descriptor<'a>>::TAG,)*
                    AnyDescriptor::Generic(raw) => raw.tag,
                }
            }
        }

        /// タグ、拡張タグ、テーブルの範囲、収集形式から記述子を読み取る関数を返す。
        ///
        /// 一致するものがない場合は[`AnyDescriptor::Generic`]を返す関数となる。
        pub fn parser_for<'a>(
            tag: u8,
            tag_extension: Option<u8>,
            scope: Scope,
            collection: CollectionType,
        ) -> ParserFn<'a> {
            $(
                if tag == <$ty as Descriptor<'a>>::TAG
                    && <$ty as Descriptor<'a>>::TAG_EXTENSION
                        .map_or(true, |ext| Some(ext) == tag_extension)
                    && <$ty as Descriptor<'a>>::is_valid_in(scope, collection)
                {
                    return parse_typed::<$ty>;
                }
            )*
            parse_generic
        }
    };
}

any_descriptor! {
    ConditionalAccess(ConditionalAccessDescriptor<'a>),
    NetworkName(NetworkNameDescriptor<'a>),
    ServiceList(ServiceListDescriptor),
    SatelliteDeliverySystem(SatelliteDeliverySystemDescriptor),
    CableDeliverySystem(CableDeliverySystemDescriptor),
    BouquetName(BouquetNameDescriptor<'a>),
    Service(ServiceDescriptor<'a>),
    Linkage(LinkageDescriptor<'a>),
    ShortEvent(ShortEventDescriptor<'a>),
    ExtendedEvent(ExtendedEventDescriptor<'a>),
    CaIdentifier(CaIdentifierDescriptor),
    Content(ContentDescriptor),
    ParentalRating(ParentalRatingDescriptor),
    LocalTimeOffset(LocalTimeOffsetDescriptor),
    TerrestrialDeliverySystem(TerrestrialDeliverySystemDescriptor),
    DataBroadcastId(DataBroadcastIdDescriptor<'a>),
    ContentIdentifier(ContentIdentifierDescriptor<'a>),
    T2DeliverySystem(T2DeliverySystemDescriptor),
    LogicalChannel(LogicalChannelDescriptor),
    DishRating(DishRatingDescriptor),
    DishEventName(DishEventNameDescriptor<'a>),
    DishEventDescription(DishEventDescriptionDescriptor<'a>),
    DishProperties(DishPropertiesDescriptor),
    DishVchip(DishVchipDescriptor),
    DishSeries(DishSeriesDescriptor),
    ContentAdvisory(ContentAdvisoryDescriptor<'a>),
    ExtendedChannelName(ExtendedChannelNameDescriptor<'a>),
}

/// 拡張記述子のタグ。
const TAG_EXTENSION_DESCRIPTOR: u8 = 0x7F;

/// `buffer`の`tag_offset`にある記述子の次の記述子の位置を返す。
///
/// 記述子のヘッダが`buffer`に収まっていない場合は`None`を返す。
#[inline]
pub fn next_offset(buffer: &[u8], tag_offset: usize) -> Option<usize> {
    let length = *buffer.get(tag_offset.checked_add(1)?)?;
    Some(tag_offset + 2 + length as usize)
}

/// `buffer`の`tag_offset`にある記述子を`scope`のテーブル、`collection`の収集形式として読み取り、
/// 次の記述子の位置と共に返す。
///
/// 次の記述子の位置は常に`tag_offset + 2 + descriptor_length`となる。
pub fn parse(
    buffer: &[u8],
    tag_offset: usize,
    scope: Scope,
    collection: CollectionType,
) -> Result<(AnyDescriptor, usize), DescriptorError> {
    let Some(next) = next_offset(buffer, tag_offset) else {
        return Err(DescriptorError::Truncated(tag_offset));
    };
    let Some(data) = buffer.get(tag_offset + 2..next) else {
        return Err(DescriptorError::Truncated(tag_offset));
    };

    let tag = buffer[tag_offset];
    let tag_extension = match tag {
        TAG_EXTENSION_DESCRIPTOR => data.first().copied(),
        _ => None,
    };
    let parser = parser_for(tag, tag_extension, scope, collection);
    Ok((parser(tag, data)?, next))
}

/// [`DescriptorBlock::parse_all`]で返されるイテレーター。
///
/// 内容が不正な記述子はログに出力して読み飛ばし、
/// ヘッダが途切れている場合はそこで終了する。
#[derive(Debug, Clone)]
pub struct Descriptors<'a> {
    buffer: &'a [u8],
    offset: usize,
    scope: Scope,
    collection: CollectionType,
}

impl<'a> Descriptors<'a> {
    #[inline]
    pub(super) fn new(buffer: &'a [u8], scope: Scope, collection: CollectionType) -> Self {
        Descriptors {
            buffer,
            offset: 0,
            scope,
            collection,
        }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = AnyDescriptor<'a>;

    fn next(&mut self) -> Option<AnyDescriptor<'a>> {
        while self.offset < self.buffer.len() {
            match parse(self.buffer, self.offset, self.scope, self.collection) {
                Ok((desc, next)) => {
                    self.offset = next;
                    return Some(desc);
                }
                Err(e @ DescriptorError::Truncated(_)) => {
                    log::debug!("{}: {}", e, crate::bytes::hex(&self.buffer[self.offset..]));
                    self.offset = self.buffer.len();
                }
                Err(e) => {
                    let next = next_offset(self.buffer, self.offset).unwrap_or(self.buffer.len());
                    log::debug!("{}: {}", e, crate::bytes::hex(&self.buffer[self.offset..next]));
                    self.offset = next;
                }
            }
        }

        None
    }
}

impl<'a> std::iter::FusedIterator for Descriptors<'a> {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    /// 各種別の記述子を連結したもの。
    const BLOCK: &[u8] = &hex!(
        // 限定受信方式
        "09 04 0B 00 E1 00"
        // ネットワーク名
        "40 03 4E 45 54"
        // サービスリスト
        "41 03 10 44 01"
        // 衛星分配システム
        "43 0B 01 17 78 00 01 92 95 02 75 00 03"
        // ケーブル分配システム
        "44 0B 03 46 00 00 FF F2 03 00 69 00 05"
        // ブーケ名
        "47 02 42 51"
        // サービス
        "48 07 01 01 50 03 42 42 43"
        // リンク
        "4A 09 00 01 00 02 00 03 82 00 3C"
        // 短形式イベント
        "4D 07 65 6E 67 01 58 01 59"
        // 拡張形式イベント
        "4E 07 00 65 6E 67 00 01 5A"
        // CA識別
        "53 02 0B 00"
        // コンテント
        "54 02 10 00"
        // パレンタルレート
        "55 04 47 42 52 0C"
        // 地域時差
        "58 0D 47 42 52 02 00 00 EB 96 01 00 00 01 00"
        // 地上分配システム
        "5A 0B 02 D3 44 40 1F 8A 41 FF FF FF FF"
        // データ放送識別
        "66 02 01 06"
        // コンテント識別
        "76 03 04 01 41"
        // T2分配システム
        "7F 04 04 00 80 01"
        // 論理チャンネル
        "83 04 10 44 FC 01"
        // 事業者形式
        "89 02 6A 04"
        "91 02 01 00"
        "92 02 01 00"
        "94 01 05"
        "95 02 04 03"
        "96 07 00 00 30 39 02 00 0A"
        // ATSC
        "87 01 C0"
        "A0 00"
        // 未定義
        "C3 03 01 02 03"
    );

    fn offsets(buffer: &[u8]) -> Vec<usize> {
        let mut offsets = vec![0];
        while let Some(&last) = offsets.last() {
            if last >= buffer.len() {
                break;
            }
            offsets.push(next_offset(buffer, last).unwrap());
        }
        offsets
    }

    #[test]
    fn test_advance_by_declared_length() {
        let collections = [CollectionType::Dvb, CollectionType::DishNetwork, CollectionType::Atsc];
        let offsets = offsets(BLOCK);
        assert_eq!(*offsets.last().unwrap(), BLOCK.len());

        for collection in collections {
            for scope in [Scope::ALL, Scope::NIT, Scope::EIT, Scope::VCT] {
                for pair in offsets.windows(2) {
                    let (desc, next) = parse(BLOCK, pair[0], scope, collection).unwrap();
                    assert_eq!(next, pair[1]);
                    assert_eq!(next, pair[0] + 2 + BLOCK[pair[0] + 1] as usize);
                    assert_eq!(desc.tag(), BLOCK[pair[0]]);
                }
            }
        }
    }

    #[test]
    fn test_all_variants() {
        let parsed: Vec<_> = DescriptorBlock::new(BLOCK)
            .parse_all(Scope::ALL, CollectionType::DishNetwork)
            .collect();
        assert_eq!(parsed.len(), 28);
        assert_matches!(parsed[0], AnyDescriptor::ConditionalAccess(_));
        assert_matches!(parsed[3], AnyDescriptor::SatelliteDeliverySystem(_));
        assert_matches!(parsed[17], AnyDescriptor::T2DeliverySystem(_));
        assert_matches!(parsed[18], AnyDescriptor::LogicalChannel(_));
        assert_matches!(parsed[19], AnyDescriptor::DishRating(_));
        assert_matches!(parsed[24], AnyDescriptor::DishSeries(_));
        // ATSCの記述子は事業者形式では汎用
        assert_matches!(parsed[25], AnyDescriptor::Generic(RawDescriptor { tag: 0x87, .. }));
        assert_matches!(parsed[26], AnyDescriptor::Generic(RawDescriptor { tag: 0xA0, .. }));
        assert_matches!(parsed[27], AnyDescriptor::Generic(RawDescriptor { tag: 0xC3, data: &[1, 2, 3] }));

        let generic = parsed
            .iter()
            .filter(|d| matches!(d, AnyDescriptor::Generic(_)))
            .count();
        assert_eq!(generic, 3);

        let parsed: Vec<_> = DescriptorBlock::new(BLOCK)
            .parse_all(Scope::ALL, CollectionType::Atsc)
            .collect();
        assert_matches!(parsed[19], AnyDescriptor::Generic(RawDescriptor { tag: 0x89, .. }));
        assert_matches!(parsed[25], AnyDescriptor::ContentAdvisory(_));
        assert_matches!(parsed[26], AnyDescriptor::ExtendedChannelName(_));
    }

    #[test]
    fn test_scope_gating() {
        assert!(Scope::NIT.union(Scope::BAT).accepts(Scope::BAT));
        assert!(!Scope::NIT.accepts(Scope::SDT));
        assert!(Scope::EIT.accepts(Scope::ALL));
        assert!((Scope::SDT | Scope::EIT).accepts(Scope::EIT));

        // サービス記述子はSDTでのみ有効
        let data = hex!("48 07 01 01 50 03 42 42 43");
        assert_matches!(
            parse(&data, 0, Scope::SDT, CollectionType::Dvb),
            Ok((AnyDescriptor::Service(_), 9))
        );
        assert_matches!(
            parse(&data, 0, Scope::EIT, CollectionType::Dvb),
            Ok((AnyDescriptor::Generic(RawDescriptor { tag: 0x48, .. }), 9))
        );

        // 拡張タグが一致しない拡張記述子
        let data = hex!("7F 02 05 00");
        assert_matches!(
            parse(&data, 0, Scope::NIT, CollectionType::Dvb),
            Ok((AnyDescriptor::Generic(_), 4))
        );
    }

    #[test]
    fn test_errors() {
        // 記述子長がデータを超える
        assert_matches!(
            parse(&hex!("48 10 01"), 0, Scope::SDT, CollectionType::Dvb),
            Err(DescriptorError::Truncated(0))
        );
        assert_matches!(
            parse(&hex!("40 03 41"), 3, Scope::NIT, CollectionType::Dvb),
            Err(DescriptorError::Truncated(3))
        );

        // 範囲外の値は読み飛ばされ、後続の記述子は読み取られる
        let data = hex!(
            "44 0B 03 46 00 00 FF F2 09 00 69 00 05"
            "40 03 4E 45 54"
            "41 05 10"
        );
        assert_matches!(
            parse(&data, 0, Scope::NIT, CollectionType::Dvb),
            Err(DescriptorError::OutOfRange { field: "modulation", value: 9 })
        );
        let parsed: Vec<_> = DescriptorBlock::new(&data)
            .parse_all(Scope::NIT, CollectionType::Dvb)
            .collect();
        assert_eq!(parsed.len(), 1);
        assert_matches!(&parsed[0], AnyDescriptor::NetworkName(d) if d.network_name.as_bytes() == b"NET");
    }
}
