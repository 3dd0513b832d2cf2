//! 番組情報などで使われる文字列の復号。
//!
//! 先頭の制御バイトで文字符号化方式を選択し、`encoding_rs`で復号する。
//! 1バイト符号化方式ではC0/C1制御符号を[`ReplaceMode`]に従って置き換える。

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use encoding_rs::Encoding;
use smallvec::SmallVec;

use crate::bytes::{hex, parse_hex};
use crate::huffman::{Dictionaries, TreeId};
use crate::lang::LangCode;

/// 復号できなかった文字列の代わりに返される文字列。
pub const UNDECODABLE_TEXT: &str = "<undecodable text>";

/// 文字符号化方式を示す制御バイトを含んだ、復号前の文字列。
#[derive(PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DvbStr([u8]);

impl DvbStr {
    /// バイト列から`DvbStr`を生成する。
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> &DvbStr {
        // SAFETY: DvbStrは[u8]とメモリ上の表現が同一
        unsafe { &*(bytes as *const [u8] as *const DvbStr) }
    }

    /// バイト列を返す。
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// バイト数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 空かどうかを返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DvbStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

impl<'a> Default for &'a DvbStr {
    fn default() -> &'a DvbStr {
        DvbStr::from_bytes(&[])
    }
}

/// 1バイト符号化方式におけるC0/C1制御符号の扱い。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// 制御符号を取り除く。
    Ignore,
    /// 制御符号を空白に置き換える。
    SetToSpace,
    /// 制御符号を同じ符号位置の文字としてそのまま出力する。
    TransferUnchanged,
    /// `0x8A`を改行（CRLF）に置き換え、それ以外を取り除く。
    #[default]
    Convert,
    /// 置換表の1バイトの置換を適用し、表にない制御符号は`Convert`と同様に扱う。
    ConvertUsingTable,
}

/// [`ReplaceMode`]の文字列表現が不正。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown replace mode `{0}`")]
pub struct ParseReplaceModeError(String);

impl FromStr for ReplaceMode {
    type Err = ParseReplaceModeError;

    fn from_str(s: &str) -> Result<ReplaceMode, ParseReplaceModeError> {
        match s {
            "ignore" => Ok(ReplaceMode::Ignore),
            "space" => Ok(ReplaceMode::SetToSpace),
            "unchanged" => Ok(ReplaceMode::TransferUnchanged),
            "convert" => Ok(ReplaceMode::Convert),
            "table" => Ok(ReplaceMode::ConvertUsingTable),
            _ => Err(ParseReplaceModeError(s.to_string())),
        }
    }
}

/// 復号前のバイト列に適用する置換。
///
/// 2バイトのパターンは常に適用され、1バイトのパターンは
/// [`ReplaceMode::ConvertUsingTable`]で制御符号に適用される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// 置換対象のバイト列（1バイトまたは2バイト）。
    pub pattern: SmallVec<[u8; 2]>,
    /// 置換後のバイト。
    pub replacement: u8,
}

/// [`Substitution`]の文字列表現が不正。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid substitution `{0}`")]
pub struct ParseSubstitutionError(String);

impl FromStr for Substitution {
    type Err = ParseSubstitutionError;

    /// `C28A=20`のように16進数で`パターン=置換後`を記述した文字列を解析する。
    fn from_str(s: &str) -> Result<Substitution, ParseSubstitutionError> {
        let err = || ParseSubstitutionError(s.to_string());

        let (pattern, replacement) = s.split_once('=').ok_or_else(err)?;
        let pattern = parse_hex(pattern.trim()).ok_or_else(err)?;
        let replacement = match *parse_hex(replacement.trim()).ok_or_else(err)? {
            [b] => b,
            _ => return Err(err()),
        };
        if !(1..=2).contains(&pattern.len()) {
            return Err(err());
        }

        Ok(Substitution {
            pattern: SmallVec::from_slice(&pattern),
            replacement,
        })
    }
}

/// 文字列復号の設定。
#[derive(Debug, Clone)]
pub struct TextOptions {
    /// 制御符号の扱い。
    pub replace_mode: ReplaceMode,
    /// 復号前に適用する置換表。
    pub substitutions: Vec<Substitution>,
    /// 制御バイトがない場合の文字符号化方式。
    pub default_encoding: &'static Encoding,
}

impl Default for TextOptions {
    fn default() -> TextOptions {
        TextOptions {
            replace_mode: ReplaceMode::default(),
            substitutions: Vec::new(),
            default_encoding: encoding_rs::WINDOWS_1252,
        }
    }
}

impl TextOptions {
    /// ラベルから既定の文字符号化方式を設定する。
    ///
    /// 不明なラベルの場合は何もせず`false`を返す。
    pub fn set_default_codepage(&mut self, label: &str) -> bool {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                self.default_encoding = encoding;
                true
            }
            None => false,
        }
    }
}

/// 使用回数を集計する文字集合の分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// 制御バイトなし。
    Default,
    /// ISO/IEC 8859。
    Iso8859,
    /// UCS-2（ビッグエンディアン）。
    Ucs2,
    /// KS X 1001。
    Ksc5601,
    /// GB2312。
    Gb2312,
    /// Big5。
    Big5,
    /// UTF-8。
    Utf8,
    /// ハフマン圧縮。
    Huffman,
    /// 未定義の制御バイト。
    Unknown,
}

impl Charset {
    /// 分類の数。
    pub const COUNT: usize = 9;

    /// すべての分類。
    pub const ALL: [Charset; Charset::COUNT] = [
        Charset::Default,
        Charset::Iso8859,
        Charset::Ucs2,
        Charset::Ksc5601,
        Charset::Gb2312,
        Charset::Big5,
        Charset::Utf8,
        Charset::Huffman,
        Charset::Unknown,
    ];
}

enum Codepage {
    /// 1バイト符号化方式。
    Single(&'static Encoding),
    /// 多バイト符号化方式。
    Multi(&'static Encoding),
    Huffman(TreeId),
    Invalid,
}

/// 文字列を復号する。
#[derive(Debug, Default)]
pub struct TextDecoder {
    options: TextOptions,
    dictionaries: Dictionaries,
    usage: [AtomicU64; Charset::COUNT],
}

impl TextDecoder {
    /// `options`と`dictionaries`で`TextDecoder`を生成する。
    pub fn new(options: TextOptions, dictionaries: Dictionaries) -> TextDecoder {
        TextDecoder {
            options,
            dictionaries,
            usage: Default::default(),
        }
    }

    /// 復号の設定を返す。
    #[inline]
    pub fn options(&self) -> &TextOptions {
        &self.options
    }

    /// ハフマン辞書を返す。
    #[inline]
    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dictionaries
    }

    /// ハフマン辞書を可変参照で返す。
    #[inline]
    pub fn dictionaries_mut(&mut self) -> &mut Dictionaries {
        &mut self.dictionaries
    }

    /// 文字集合ごとの使用回数を返す。
    pub fn usage(&self) -> impl Iterator<Item = (Charset, u64)> + '_ {
        Charset::ALL
            .into_iter()
            .zip(&self.usage)
            .map(|(c, n)| (c, n.load(Ordering::Relaxed)))
    }

    fn count(&self, charset: Charset) {
        // 判別値はALLの並びと一致する
        self.usage[charset as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// `buffer`の`offset`から`length`バイトを文字列として復号する。
    pub fn decode_at(&self, buffer: &[u8], offset: usize, length: usize) -> String {
        match offset
            .checked_add(length)
            .and_then(|end| buffer.get(offset..end))
        {
            Some(data) => self.decode(DvbStr::from_bytes(data)),
            None => {
                log::debug!("text out of buffer: {}+{} > {}", offset, length, buffer.len());
                UNDECODABLE_TEXT.to_string()
            }
        }
    }

    /// `buffer`の`offset`から`terminator`の直前までを文字列として復号する。
    ///
    /// `terminator`がない場合は末尾までを復号する。
    pub fn decode_until(&self, buffer: &[u8], offset: usize, terminator: u8) -> String {
        let data = buffer.get(offset..).unwrap_or_default();
        let end = memchr::memchr(terminator, data).unwrap_or(data.len());
        self.decode(DvbStr::from_bytes(&data[..end]))
    }

    /// 文字列を復号する。
    ///
    /// 復号できない場合はバイト列をログに出力し[`UNDECODABLE_TEXT`]を返す。
    pub fn decode(&self, s: &DvbStr) -> String {
        let data = s.as_bytes();
        let (codepage, body) = self.select_codepage(data);

        let decoded = match codepage {
            Codepage::Single(encoding) => self.decode_single(encoding, body),
            Codepage::Multi(encoding) => self.decode_multi(encoding, body),
            Codepage::Huffman(id) => Some(self.decode_huffman(id, body)),
            Codepage::Invalid => None,
        };
        match decoded {
            Some(s) => s,
            None => {
                log::debug!("undecodable text: {}", hex(data));
                UNDECODABLE_TEXT.to_string()
            }
        }
    }

    /// 事業者形式の圧縮テキストを`table_id`に応じた辞書で展開する。
    ///
    /// 辞書が読み込まれていない場合は16進数の文字列を返す。
    pub fn decode_dish(&self, table_id: u8, data: &[u8]) -> String {
        self.count(Charset::Huffman);
        self.decode_huffman(TreeId::for_dish_table(table_id), data)
    }

    /// 複数文字列構造から`lang`の文字列を、なければ最初の文字列を復号する。
    pub fn decode_multiple_string(&self, mss: &MultipleString, lang: Option<LangCode>) -> String {
        let string = lang
            .and_then(|lang| mss.strings().find(|s| s.lang == lang))
            .or_else(|| mss.strings().next());
        let Some(string) = string else {
            return String::new();
        };

        let mut out = String::new();
        for segment in string.segments() {
            let text: String = match (segment.compression_type, segment.mode) {
                (0x00, 0x00) => segment.bytes.iter().map(|&b| char::from(b)).collect(),
                (0x00, 0x3F) => match encoding_rs::UTF_16BE
                    .decode_without_bom_handling_and_without_replacement(segment.bytes)
                {
                    Some(s) => s.into_owned(),
                    None => UNDECODABLE_TEXT.to_string(),
                },
                (0x01 | 0x02, _) => {
                    self.count(Charset::Huffman);
                    let id = TreeId::for_selector(segment.compression_type)
                        .unwrap_or(TreeId::Standard1);
                    self.decode_huffman(id, segment.bytes)
                }
                (compression, mode) => {
                    log::debug!(
                        "unsupported segment compression={:#04X} mode={:#04X}: {}",
                        compression,
                        mode,
                        hex(segment.bytes)
                    );
                    UNDECODABLE_TEXT.to_string()
                }
            };
            out.push_str(&text);
        }
        out
    }

    fn select_codepage<'a>(&self, data: &'a [u8]) -> (Codepage, &'a [u8]) {
        let iso8859 = |n: u8| {
            let label = format!("iso-8859-{}", n);
            match Encoding::for_label(label.as_bytes()) {
                Some(encoding) => Codepage::Single(encoding),
                None => Codepage::Invalid,
            }
        };

        let (charset, codepage, body) = match *data {
            [] => (Charset::Default, Codepage::Single(self.options.default_encoding), data),
            [b @ 0x01..=0x0B, ref body @ ..] => (Charset::Iso8859, iso8859(b + 4), body),
            [0x10, 0x00, n, ref body @ ..] => (Charset::Iso8859, iso8859(n), body),
            [0x11, ref body @ ..] => (Charset::Ucs2, Codepage::Multi(encoding_rs::UTF_16BE), body),
            [0x12, ref body @ ..] => (Charset::Ksc5601, Codepage::Multi(encoding_rs::EUC_KR), body),
            [0x13, ref body @ ..] => (Charset::Gb2312, Codepage::Multi(encoding_rs::GBK), body),
            [0x14, ref body @ ..] => (Charset::Big5, Codepage::Multi(encoding_rs::BIG5), body),
            [0x15, ref body @ ..] => (Charset::Utf8, Codepage::Multi(encoding_rs::UTF_8), body),
            [0x1F, selector, ref body @ ..] => match TreeId::for_selector(selector) {
                Some(id) => (Charset::Huffman, Codepage::Huffman(id), body),
                None => (Charset::Unknown, Codepage::Invalid, body),
            },
            [0x00..=0x1F, ..] => (Charset::Unknown, Codepage::Invalid, data),
            _ => (Charset::Default, Codepage::Single(self.options.default_encoding), data),
        };

        self.count(charset);
        (codepage, body)
    }

    fn decode_huffman(&self, id: TreeId, data: &[u8]) -> String {
        if !self.dictionaries.is_loaded(id) {
            log::warn!("huffman dictionary {} is not loaded", id);
            return hex(data).to_string();
        }

        match self.dictionaries.decompress(id, data) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("{}", e);
                hex(data).to_string()
            }
        }
    }

    fn decode_multi(&self, encoding: &'static Encoding, body: &[u8]) -> Option<String> {
        let decoded = encoding.decode_without_bom_handling_and_without_replacement(body)?;
        // UCS-2では制御符号がU+E080からU+E09Fの私用領域に置かれる
        let mut out = String::with_capacity(decoded.len());
        for c in decoded.chars() {
            let code = match u32::from(c) {
                code @ 0xE080..=0xE09F => code - 0xE000,
                code => code,
            };
            if is_control(code) {
                self.push_control(&mut out, code as u8);
            } else {
                out.push(c);
            }
        }
        Some(out)
    }

    fn decode_single(&self, encoding: &'static Encoding, body: &[u8]) -> Option<String> {
        let body = self.substitute_pairs(body);

        let mut out = String::with_capacity(body.len());
        let mut run = Vec::with_capacity(body.len());
        for &b in body.iter() {
            if !is_control(b as u32) {
                run.push(b);
                continue;
            }

            if self.options.replace_mode == ReplaceMode::ConvertUsingTable {
                if let Some(sub) = self.find_substitution(&[b]) {
                    run.push(sub.replacement);
                    continue;
                }
            }

            flush(encoding, &mut run, &mut out)?;
            self.push_control(&mut out, b);
        }
        flush(encoding, &mut run, &mut out)?;

        Some(out)
    }

    fn push_control(&self, out: &mut String, b: u8) {
        match self.options.replace_mode {
            ReplaceMode::Ignore => {}
            ReplaceMode::SetToSpace => out.push(' '),
            ReplaceMode::TransferUnchanged => out.push(char::from(b)),
            ReplaceMode::Convert | ReplaceMode::ConvertUsingTable => {
                if b == 0x8A {
                    out.push_str("\r\n");
                }
            }
        }
    }

    fn find_substitution(&self, pattern: &[u8]) -> Option<&Substitution> {
        self.options
            .substitutions
            .iter()
            .find(|s| s.pattern.as_slice() == pattern)
    }

    fn substitute_pairs<'a>(&self, body: &'a [u8]) -> Cow<'a, [u8]> {
        if !self.options.substitutions.iter().any(|s| s.pattern.len() == 2) {
            return Cow::Borrowed(body);
        }

        let mut out = Vec::with_capacity(body.len());
        let mut i = 0;
        while i < body.len() {
            if let Some(pair) = body.get(i..i + 2) {
                if let Some(sub) = self.find_substitution(pair) {
                    out.push(sub.replacement);
                    i += 2;
                    continue;
                }
            }
            out.push(body[i]);
            i += 1;
        }
        Cow::Owned(out)
    }
}

#[inline]
fn is_control(code: u32) -> bool {
    matches!(code, 0x00..=0x1F | 0x80..=0x9F)
}

fn flush(encoding: &'static Encoding, run: &mut Vec<u8>, out: &mut String) -> Option<()> {
    if run.is_empty() {
        return Some(());
    }

    let decoded = encoding.decode_without_bom_handling_and_without_replacement(run)?;
    out.push_str(&decoded);
    run.clear();
    Some(())
}

/// ATSCの複数文字列構造。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MultipleString<'a>(&'a [u8]);

impl<'a> MultipleString<'a> {
    /// `data`を複数文字列構造として扱う。
    #[inline]
    pub fn new(data: &'a [u8]) -> MultipleString<'a> {
        MultipleString(data)
    }

    /// 含まれる文字列のイテレーターを返す。
    ///
    /// 構造が壊れている場合、読み取れた文字列までを返す。
    pub fn strings(&self) -> impl Iterator<Item = LangString<'a>> + 'a {
        let (count, mut data) = match self.0.split_first() {
            Some((&n, rem)) => (n, rem),
            None => (0, &[][..]),
        };

        (0..count).map_while(move |_| {
            let [l1, l2, l3, number_segments, ref rem @ ..] = *data else {
                return None;
            };
            let start = rem;
            let mut rem = rem;
            for _ in 0..number_segments {
                let [_, _, number_bytes, ref tail @ ..] = *rem else {
                    return None;
                };
                rem = tail.get(number_bytes as usize..)?;
            }

            let segments = &start[..start.len() - rem.len()];
            data = rem;
            Some(LangString {
                lang: LangCode([l1, l2, l3]),
                number_segments,
                segments,
            })
        })
    }
}

impl<'a> fmt::Debug for MultipleString<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.strings()).finish()
    }
}

/// 複数文字列構造における1言語分の文字列。
#[derive(Debug, Clone, Copy)]
pub struct LangString<'a> {
    /// 言語コード。
    pub lang: LangCode,
    number_segments: u8,
    segments: &'a [u8],
}

impl<'a> LangString<'a> {
    /// セグメントのイテレーターを返す。
    pub fn segments(&self) -> impl Iterator<Item = Segment<'a>> + 'a {
        let mut data = self.segments;
        (0..self.number_segments).map_while(move |_| {
            let [compression_type, mode, number_bytes, ref rem @ ..] = *data else {
                return None;
            };
            let (bytes, tail) = rem.split_at_checked(number_bytes as usize)?;
            data = tail;
            Some(Segment {
                compression_type,
                mode,
                bytes,
            })
        })
    }
}

/// 複数文字列構造のセグメント。
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    /// 圧縮形式。
    pub compression_type: u8,
    /// 文字符号化方式。
    pub mode: u8,
    /// 符号化されたバイト列。
    pub bytes: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn decoder(replace_mode: ReplaceMode) -> TextDecoder {
        TextDecoder::new(
            TextOptions {
                replace_mode,
                ..Default::default()
            },
            Dictionaries::new(),
        )
    }

    fn decode(decoder: &TextDecoder, data: &[u8]) -> String {
        decoder.decode(DvbStr::from_bytes(data))
    }

    #[test]
    fn test_ascii_round_trip() {
        const ASCII: &str = "The Quick Brown Fox 0123 !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

        let labels = [
            "windows-1252",
            "iso-8859-2",
            "iso-8859-5",
            "iso-8859-6",
            "iso-8859-7",
            "iso-8859-8",
            "iso-8859-10",
            "iso-8859-13",
            "iso-8859-14",
            "iso-8859-15",
            "windows-1254",
            "windows-874",
        ];
        for label in labels {
            let mut options = TextOptions::default();
            assert!(options.set_default_codepage(label), "{}", label);
            let decoder = TextDecoder::new(options, Dictionaries::new());

            let (encoded, _, had_errors) = decoder.options().default_encoding.encode(ASCII);
            assert!(!had_errors);
            assert_eq!(decode(&decoder, &encoded), ASCII, "{}", label);
        }
    }

    #[test]
    fn test_selector() {
        let decoder = decoder(ReplaceMode::Convert);
        // ISO-8859-5
        assert_eq!(decode(&decoder, &hex!("01 B0 B1")), "АБ");
        // ISO-8859-15
        assert_eq!(decode(&decoder, &hex!("0B A4")), "€");
        // 0x10 0x00 0x02 => ISO-8859-2
        assert_eq!(decode(&decoder, &hex!("10 00 02 A3")), "Ł");
        assert_eq!(decode(&decoder, &hex!("11 00 41 30 42")), "A\u{3042}");
        assert_eq!(decode(&decoder, &hex!("15 E3 81 82")), "\u{3042}");
        assert_eq!(decode(&decoder, b"plain"), "plain");
        assert_eq!(decode(&decoder, &[]), "");

        // 未定義の制御バイト
        assert_eq!(decode(&decoder, &hex!("1E 41")), UNDECODABLE_TEXT);
        // 不正なUTF-8
        assert_eq!(decode(&decoder, &hex!("15 FF")), UNDECODABLE_TEXT);

        let usage: Vec<_> = decoder.usage().filter(|(_, n)| *n > 0).collect();
        assert!(usage.contains(&(Charset::Iso8859, 3)));
        assert!(usage.contains(&(Charset::Utf8, 2)));
        assert!(usage.contains(&(Charset::Unknown, 1)));
    }

    #[test]
    fn test_replace_mode() {
        let data = b"A\x86B\x87\x8AC";
        assert_eq!(decode(&decoder(ReplaceMode::Ignore), data), "ABC");
        assert_eq!(decode(&decoder(ReplaceMode::SetToSpace), data), "A B  C");
        assert_eq!(
            decode(&decoder(ReplaceMode::TransferUnchanged), data),
            "A\u{86}B\u{87}\u{8A}C"
        );
        assert_eq!(decode(&decoder(ReplaceMode::Convert), data), "AB\r\nC");

        // UCS-2の私用領域にある制御符号
        assert_eq!(decode(&decoder(ReplaceMode::Convert), &hex!("11 00 41 E0 8A 00 42")), "A\r\nB");
    }

    #[test]
    fn test_substitution() {
        let options = TextOptions {
            replace_mode: ReplaceMode::ConvertUsingTable,
            substitutions: vec!["C2 41=C4".parse().unwrap(), "86=2A".parse().unwrap()],
            ..Default::default()
        };
        let decoder = TextDecoder::new(options, Dictionaries::new());

        assert_eq!(decode(&decoder, b"\xC2A\x86x\x87\x8A"), "Ä*x\r\n");
        assert!("C2=".parse::<Substitution>().is_err());
        assert!("C2 41 42=20".parse::<Substitution>().is_err());
        assert_eq!("unchanged".parse::<ReplaceMode>(), Ok(ReplaceMode::TransferUnchanged));
        assert!("bogus".parse::<ReplaceMode>().is_err());
    }

    #[test]
    fn test_decode_at() {
        let decoder = decoder(ReplaceMode::Convert);
        let buffer = b"xxHello\0yy";
        assert_eq!(decoder.decode_at(buffer, 2, 5), "Hello");
        assert_eq!(decoder.decode_at(buffer, 8, 5), UNDECODABLE_TEXT);
        assert_eq!(decoder.decode_until(buffer, 2, 0), "Hello");
        assert_eq!(decoder.decode_until(buffer, 8, 0), "yy");
    }

    #[test]
    fn test_huffman() {
        let mut decoder = decoder(ReplaceMode::Convert);
        // 辞書がなければ16進数で出力する
        assert_eq!(decode(&decoder, &hex!("1F 01 0A")), "0A");
        assert_eq!(decoder.decode_dish(0x80, &hex!("02 00")), "02 00");

        decoder
            .dictionaries_mut()
            .load_multi(TreeId::Standard1, "START:0:H\nSTART:1:STOP\nH:0:i\nH:1:STOP\ni:0:STOP\ni:1:H\n")
            .unwrap();
        // H(0) i(0) STOP(0)
        assert_eq!(decode(&decoder, &hex!("1F 01 00")), "Hi");

        decoder
            .dictionaries_mut()
            .load_single(TreeId::Dish255, "0=a\n10=b\n11=STOP\n")
            .unwrap();
        assert_eq!(decoder.decode_dish(0x81, &hex!("03 40")), "aba");
    }

    #[test]
    fn test_multiple_string() {
        let decoder = decoder(ReplaceMode::Convert);
        let data = hex!(
            "02"
            "73 70 61 01 00 00 04 48 6F 6C 61"
            "65 6E 67 02 00 00 02 48 65 00 00 03 6C 6C 6F"
        );
        let mss = MultipleString::new(&data);
        assert_eq!(mss.strings().count(), 2);
        assert_eq!(decoder.decode_multiple_string(&mss, Some(LangCode::ENG)), "Hello");
        assert_eq!(decoder.decode_multiple_string(&mss, None), "Hola");
        assert_eq!(decoder.decode_multiple_string(&mss, Some(LangCode::FRA)), "Hola");

        // 途中で途切れている
        let mss = MultipleString::new(&data[..14]);
        assert_eq!(mss.strings().count(), 1);
        assert_eq!(decoder.decode_multiple_string(&MultipleString::new(&[]), None), "");
    }
}
