//! 記述子に関する基礎の型。

use std::fmt;

use thiserror::Error;

use crate::bytes::{BytesExt, UpperHex};

use super::{CollectionType, Scope};

/// 記述子の読み取りで発生するエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// 記述子のヘッダ、または記述子長で示される内容がデータ中に収まっていない。
    #[error("truncated descriptor at offset {0}")]
    Truncated(usize),

    /// 記述子の内容の長さが不正。
    #[error("invalid length of {0}")]
    InvalidLength(&'static str),

    /// フィールドの値が定義域外。
    #[error("field {field} out of range: {value:#X}")]
    OutOfRange {
        /// フィールド名。
        field: &'static str,
        /// 読み取った値。
        value: u32,
    },
}

/// 記述子を表すトレイト。
pub trait Descriptor<'a>: Sized {
    /// この記述子のタグ。
    const TAG: u8;

    /// 拡張記述子（タグ`0x7F`）における拡張タグ。
    const TAG_EXTENSION: Option<u8> = None;

    /// この記述子が有効なテーブルの範囲。
    const SCOPE: Scope;

    /// この記述子が特定の収集形式でのみ有効な場合、その収集形式。
    const COLLECTION: Option<CollectionType> = None;

    /// `data`から記述子を読み取る。
    ///
    /// `data`には`descriptor_tag`と`descriptor_length`は含まない。
    fn read(data: &'a [u8]) -> Result<Self, DescriptorError>;

    /// `scope`のテーブル、`collection`の収集形式においてこの記述子が有効かどうかを返す。
    #[inline]
    fn is_valid_in(scope: Scope, collection: CollectionType) -> bool {
        Self::SCOPE.accepts(scope) && Self::COLLECTION.map_or(true, |c| c == collection)
    }
}

/// パース前の記述子。
///
/// 未定義のタグやテーブルの範囲外で使われた記述子もこの形で保持される。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawDescriptor<'a> {
    /// 記述子のタグ。
    pub tag: u8,

    /// 記述子の内容。
    pub data: &'a [u8],
}

impl<'a> RawDescriptor<'a> {
    /// 記述子長を返す。
    #[inline]
    pub fn length(&self) -> u8 {
        self.data.len() as u8
    }
}

impl<'a> fmt::Debug for RawDescriptor<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        struct PrintBytes<'a>(&'a [u8]);
        impl<'a> fmt::Debug for PrintBytes<'a> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{} bytes", self.0.len())
            }
        }

        f.debug_struct("RawDescriptor")
            .field("tag", &UpperHex(self.tag))
            .field("data", &PrintBytes(self.data))
            .finish()
    }
}

/// 複数の記述子からなる記述子群。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBlock<'a>(&'a [u8]);

impl<'a> DescriptorBlock<'a> {
    /// `data`全体を記述子群として扱う。
    #[inline]
    pub fn new(data: &'a [u8]) -> DescriptorBlock<'a> {
        DescriptorBlock(data)
    }

    /// `data`から`length`バイト分の記述子群を読み取り後続データと共に返す。
    ///
    /// 記述子の内容はパースせず、`get`メソッドなどで初めてパースする。
    ///
    /// データ長が不足している場合は`None`を返す。
    // `length`が`u16`なのは規格上`u16`以上の長さになることがなく、
    // 呼び出し側でのキャストが無意味であるため。
    pub fn read_with_len(data: &'a [u8], length: u16) -> Option<(DescriptorBlock<'a>, &'a [u8])> {
        let (block, rem) = data.split_at_checked(length as usize)?;
        Some((DescriptorBlock(block), rem))
    }

    /// `data`から12ビットの記述子長に続く記述子群を読み取り後続データと共に返す。
    ///
    /// データ長が不足している場合は`None`を返す。
    #[inline]
    pub fn read(data: &'a [u8]) -> Option<(DescriptorBlock<'a>, &'a [u8])> {
        if data.len() < 2 {
            return None;
        }

        let length = data[0..=1].read_be_16() & 0b0000_1111_1111_1111;
        DescriptorBlock::read_with_len(&data[2..], length)
    }

    /// `data`から10ビットの記述子長に続く記述子群を読み取り後続データと共に返す。
    ///
    /// ATSCのテーブルで使われる。データ長が不足している場合は`None`を返す。
    #[inline]
    pub fn read_10bit(data: &'a [u8]) -> Option<(DescriptorBlock<'a>, &'a [u8])> {
        if data.len() < 2 {
            return None;
        }

        let length = data[0..=1].read_be_16() & 0b0000_0011_1111_1111;
        DescriptorBlock::read_with_len(&data[2..], length)
    }

    /// 記述子群のバイト列を返す。
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// 内包する記述子群のイテレーターを返す。
    #[inline]
    pub fn iter(&self) -> DescriptorIter<'a> {
        DescriptorIter(self.0)
    }

    /// 内包する記述子群から`T`のタグと一致する記述子を読み取って返す。
    ///
    /// `T`のタグと一致する記述子がない場合や読み取れない場合は`None`を返す。
    pub fn get<T: Descriptor<'a>>(&self) -> Option<T> {
        self.iter()
            .find(|d| d.tag == T::TAG)
            .and_then(|d| match T::read(d.data) {
                Ok(desc) => Some(desc),
                Err(e) => {
                    log::debug!("{}: {}", e, crate::bytes::hex(d.data));
                    None
                }
            })
    }

    /// 内包する記述子群を`scope`と`collection`に応じて種別ごとにパースするイテレーターを返す。
    ///
    /// 読み取れない記述子はログに出力して読み飛ばす。
    #[inline]
    pub fn parse_all(&self, scope: Scope, collection: CollectionType) -> super::Descriptors<'a> {
        super::Descriptors::new(self.0, scope, collection)
    }
}

impl<'a> fmt::Debug for DescriptorBlock<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("DescriptorBlock(")?;
        f.debug_list().entries(self).finish()?;
        f.write_str(")")
    }
}

impl<'a> IntoIterator for &DescriptorBlock<'a> {
    type Item = RawDescriptor<'a>;
    type IntoIter = DescriptorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// [`DescriptorBlock`]のイテレーター。
#[derive(Clone)]
pub struct DescriptorIter<'a>(&'a [u8]);

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = RawDescriptor<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let [tag, length, ref rem @ ..] = *self.0 else {
            return None;
        };
        let Some((data, tail)) = rem.split_at_checked(length as usize) else {
            return None;
        };

        self.0 = tail;
        Some(RawDescriptor { tag, data })
    }
}

impl<'a> std::iter::FusedIterator for DescriptorIter<'a> {}

impl<'a> fmt::Debug for DescriptorIter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DescriptorIter(")?;
        f.debug_list().entries(self.clone()).finish()?;
        f.write_str(")")
    }
}
