//! PSI/SI用のモジュール。

pub mod desc;
pub mod table;

use fxhash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::bytes::BytesExt;

/// [`PsiSection::parse`]で発生するエラー。
///
/// セクション長が確定したあとで発生するエラーにはセクション長が付随する。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PsiError {
    /// PSIセクションの長さが足りない。
    #[error("insufficient length of a PSI section")]
    InsufficientLength,

    /// PSIの終端に到達した。
    #[error("reached to end of PSI sections")]
    EndOfPsi,

    /// PSIセクションに最低限必要なバイト数がなく、壊れたセクションである。
    ///
    /// 内包する`usize`にはPSIのセクション長が入る。
    #[error("corrupt section")]
    Corrupted(usize),

    /// PSIセクションのCRC32が一致しない。
    ///
    /// 内包する`usize`にはPSIのセクション長が入る。
    #[error("crc32 error")]
    Crc32(usize),
}

/// PSIのセクション。
#[derive(Debug)]
pub struct PsiSection<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// セクションシンタクス。
    pub syntax: Option<PsiSectionSyntax>,
    /// PSIのデータ。
    ///
    /// ヘッダとCRCは含まない。
    pub data: &'a [u8],
}

impl<'a> PsiSection<'a> {
    /// TOTのテーブルID。セクションシンタクスを持たないがCRCを持つ。
    const TABLE_ID_TOT: u8 = 0x73;

    /// PSIセクションをパースし、[`PsiSection`]とセクション長を返す。
    ///
    /// セクションシンタクスを持つセクションとTOTはCRC32を検査する。
    pub fn parse(buf: &'a [u8]) -> Result<(PsiSection<'a>, usize), PsiError> {
        if buf.len() < 3 {
            return Err(PsiError::InsufficientLength);
        }

        let table_id = buf[0];
        if table_id == 0xFF {
            return Err(PsiError::EndOfPsi);
        }
        let section_syntax_indicator = buf[1] & 0b10000000 != 0;
        let section_length = buf[1..=2].read_be_16() & 0b0000_1111_1111_1111;

        let Some(psi) = buf.get(..3 + section_length as usize) else {
            return Err(PsiError::InsufficientLength);
        };

        let has_crc = section_syntax_indicator || table_id == Self::TABLE_ID_TOT;
        if has_crc && !crate::crc::verify32(psi) {
            return Err(PsiError::Crc32(psi.len()));
        }

        let (syntax, data) = if section_syntax_indicator {
            if psi.len() < 3 + 5 + 4 {
                return Err(PsiError::Corrupted(psi.len()));
            }

            let table_id_extension = psi[3..=4].read_be_16();
            let version_number = (psi[5] & 0b00111110) >> 1;
            let current_next_indicator = psi[5] & 0b00000001 != 0;
            let section_number = psi[6];
            let last_section_number = psi[7];

            let ss = PsiSectionSyntax {
                table_id_extension,
                version_number,
                current_next_indicator,
                section_number,
                last_section_number,
            };
            (Some(ss), &psi[8..psi.len() - 4])
        } else if has_crc {
            (None, &psi[3..psi.len() - 4])
        } else {
            (None, &psi[3..])
        };

        Ok((
            PsiSection {
                table_id,
                syntax,
                data,
            },
            psi.len(),
        ))
    }
}

/// PSIセクションのシンタクス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsiSectionSyntax {
    /// テーブル識別拡張。
    pub table_id_extension: u16,
    /// バージョン番号（5ビット）。
    pub version_number: u8,
    /// カレントネクスト指示。
    pub current_next_indicator: bool,
    /// セクション番号。
    pub section_number: u8,
    /// 最終セクション番号。
    pub last_section_number: u8,
}

/// PSIテーブルを表すトレイト。
pub trait PsiTable<'a>: Sized {
    /// PSIテーブルを読み取る。
    fn read(psi: &PsiSection<'a>) -> Option<Self>;
}

/// セクションマップに記録されるセクションの識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectionMapEntry {
    /// テーブル識別。
    pub table_id: u8,
    /// セクション番号。
    pub section_number: u8,
    /// 最終セクション番号。
    pub last_section_number: u8,
    /// セグメント最終セクション番号。
    ///
    /// セグメントを持たないテーブルでは`last_section_number`と同じ値とする。
    pub segment_last_section_number: u8,
}

impl SectionMapEntry {
    /// セグメントを持たないテーブルのセクションから`SectionMapEntry`を生成する。
    #[inline]
    pub fn from_syntax(table_id: u8, syntax: &PsiSectionSyntax) -> SectionMapEntry {
        SectionMapEntry {
            table_id,
            section_number: syntax.section_number,
            last_section_number: syntax.last_section_number,
            segment_last_section_number: syntax.last_section_number,
        }
    }
}

/// 受信済みセクションの記録。
///
/// 同じ[`SectionMapEntry`]を二度処理しないために使う。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionMap {
    entries: FxHashSet<SectionMapEntry>,
}

impl SectionMap {
    /// 空の`SectionMap`を生成する。
    #[inline]
    pub fn new() -> SectionMap {
        SectionMap::default()
    }

    /// `entry`を記録し、初めて記録された場合は`true`を返す。
    #[inline]
    pub fn insert(&mut self, entry: SectionMapEntry) -> bool {
        self.entries.insert(entry)
    }

    /// `entry`が記録済みかどうかを返す。
    #[inline]
    pub fn contains(&self, entry: &SectionMapEntry) -> bool {
        self.entries.contains(entry)
    }

    /// 記録されたセクションの数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 何も記録されていないかどうかを返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 記録されたすべてのテーブルについて、
    /// セクション番号0から最終セクション番号までがすべて揃っているかどうかを返す。
    ///
    /// 何も記録されていない場合は`false`を返す。
    pub fn is_complete(&self) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        let mut tables: FxHashMap<u8, (u8, FxHashSet<u8>)> = FxHashMap::default();
        for entry in &self.entries {
            let (last, sections) = tables
                .entry(entry.table_id)
                .or_insert_with(|| (entry.last_section_number, FxHashSet::default()));
            *last = std::cmp::max(*last, entry.last_section_number);
            sections.insert(entry.section_number);
        }

        tables
            .values()
            .all(|(last, sections)| (0..=*last).all(|n| sections.contains(&n)))
    }

    /// 記録を消去する。
    #[inline]
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_parse() {
        let pat = hex!("00 B0 0D 00 01 C1 00 00 00 01 F0 00 2A B1 04 B2 FF FF");
        let (psi, len) = PsiSection::parse(&pat).unwrap();
        assert_eq!(len, 16);
        assert_eq!(psi.table_id, 0x00);
        assert_eq!(
            psi.syntax,
            Some(PsiSectionSyntax {
                table_id_extension: 1,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            }),
        );
        assert_eq!(psi.data, &hex!("00 01 F0 00"));

        assert_matches!(PsiSection::parse(&pat[..10]), Err(PsiError::InsufficientLength));
        assert_matches!(PsiSection::parse(&pat[16..]), Err(PsiError::EndOfPsi));

        let mut broken = pat;
        broken[8] = 0x01;
        assert_matches!(PsiSection::parse(&broken), Err(PsiError::Crc32(16)));
    }

    #[test]
    fn test_parse_tdt() {
        // TDTはCRCを持たない
        let tdt = hex!("70 70 05 EB 96 20 00 00");
        let (psi, len) = PsiSection::parse(&tdt).unwrap();
        assert_eq!(len, 8);
        assert_eq!(psi.syntax, None);
        assert_eq!(psi.data, &hex!("EB 96 20 00 00"));
    }

    #[test]
    fn test_section_map() {
        let entry = SectionMapEntry {
            table_id: 0x50,
            section_number: 0,
            last_section_number: 8,
            segment_last_section_number: 0,
        };

        let mut map = SectionMap::new();
        assert!(map.insert(entry));
        assert!(!map.insert(entry));
        assert!(map.contains(&entry));
        assert_eq!(map.len(), 1);

        let other = SectionMapEntry {
            segment_last_section_number: 1,
            ..entry
        };
        assert!(map.insert(other));
    }

    #[test]
    fn test_section_map_complete() {
        let mut map = SectionMap::new();
        assert!(!map.is_complete());

        let entry = |n| SectionMapEntry {
            table_id: 0x40,
            section_number: n,
            last_section_number: 2,
            segment_last_section_number: 2,
        };
        map.insert(entry(0));
        map.insert(entry(2));
        assert!(!map.is_complete());
        map.insert(entry(1));
        assert!(map.is_complete());

        map.clear();
        assert!(map.is_empty());
    }
}
