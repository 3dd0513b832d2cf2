//! バイト列を整数やBCD、16進文字列として読み書きするための関数群。

use std::fmt;

/// バイト列用拡張トレイト。
///
/// 各メソッドは読み込みに必要な長さがない場合にパニックする。
/// 事前に長さが分かるようなコードであれば境界検査の最適化が期待できる。
pub trait BytesExt {
    /// ビッグエンディアンで16ビット符号無し整数を読み込む。
    fn read_be_16(&self) -> u16;

    /// ビッグエンディアンで24ビット符号無し整数を読み込む。
    fn read_be_24(&self) -> u32;

    /// ビッグエンディアンで32ビット符号無し整数を読み込む。
    fn read_be_32(&self) -> u32;

    /// リトルエンディアンで16ビット符号無し整数を読み込む。
    fn read_le_16(&self) -> u16;

    /// リトルエンディアンで32ビット符号無し整数を読み込む。
    fn read_le_32(&self) -> u32;

    /// 先頭から`digits`桁のBCDを読み込む。
    ///
    /// 上位ニブルから順に読み、`digits`が奇数の場合は最後のバイトの上位ニブルまでを読む。
    fn read_bcd(&self, digits: usize) -> u32;

    /// `hhmmss`形式の3バイトBCDを秒数として読み込む。
    fn read_bcd_second(&self) -> u32;
}

impl BytesExt for [u8] {
    #[inline]
    fn read_be_16(&self) -> u16 {
        u16::from_be_bytes(self[..2].try_into().unwrap())
    }

    #[inline]
    fn read_be_24(&self) -> u32 {
        u32::from_be_bytes([0, self[0], self[1], self[2]])
    }

    #[inline]
    fn read_be_32(&self) -> u32 {
        u32::from_be_bytes(self[..4].try_into().unwrap())
    }

    #[inline]
    fn read_le_16(&self) -> u16 {
        u16::from_le_bytes(self[..2].try_into().unwrap())
    }

    #[inline]
    fn read_le_32(&self) -> u32 {
        u32::from_le_bytes(self[..4].try_into().unwrap())
    }

    fn read_bcd(&self, digits: usize) -> u32 {
        let bytes = &self[..(digits + 1) / 2];
        (0..digits).fold(0, |acc, i| {
            let b = bytes[i / 2];
            let nibble = if i % 2 == 0 { b >> 4 } else { b & 0x0F };
            acc * 10 + nibble as u32
        })
    }

    #[inline]
    fn read_bcd_second(&self) -> u32 {
        let hour = read_bcd_digit(self[0]) as u32;
        let minute = read_bcd_digit(self[1]) as u32;
        let second = read_bcd_digit(self[2]) as u32;
        hour * 3600 + minute * 60 + second
    }
}

impl<const N: usize> BytesExt for [u8; N] {
    #[inline]
    fn read_be_16(&self) -> u16 {
        self[..].read_be_16()
    }

    #[inline]
    fn read_be_24(&self) -> u32 {
        self[..].read_be_24()
    }

    #[inline]
    fn read_be_32(&self) -> u32 {
        self[..].read_be_32()
    }

    #[inline]
    fn read_le_16(&self) -> u16 {
        self[..].read_le_16()
    }

    #[inline]
    fn read_le_32(&self) -> u32 {
        self[..].read_le_32()
    }

    #[inline]
    fn read_bcd(&self, digits: usize) -> u32 {
        self[..].read_bcd(digits)
    }

    #[inline]
    fn read_bcd_second(&self) -> u32 {
        self[..].read_bcd_second()
    }
}

/// 2桁のBCDを読み込む。
#[inline]
pub const fn read_bcd_digit(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}

/// 数値を2桁のBCDに変換する。
///
/// `n`が100以上の場合は下2桁のみを変換する。
#[inline]
pub const fn to_bcd_digit(n: u8) -> u8 {
    let n = n % 100;
    ((n / 10) << 4) | (n % 10)
}

/// バイト列を空白区切りの16進数として表示するためのラッパー。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Hex<'a>(pub &'a [u8]);

impl<'a> fmt::Display for Hex<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl<'a> fmt::Debug for Hex<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]", self)
    }
}

/// `data`を空白区切りの16進数として表示する値を返す。
#[inline]
pub fn hex(data: &[u8]) -> Hex {
    Hex(data)
}

/// 16進文字列をバイト列に変換する。
///
/// 空白と`0x`接頭辞は無視する。奇数桁や16進数以外の文字を含む場合は`None`を返す。
pub fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s
        .split_whitespace()
        .flat_map(|word| {
            let word = word
                .strip_prefix("0x")
                .or_else(|| word.strip_prefix("0X"))
                .unwrap_or(word);
            word.bytes()
        })
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let h = (pair[0] as char).to_digit(16)?;
            let l = (pair[1] as char).to_digit(16)?;
            Some((h * 16 + l) as u8)
        })
        .collect()
}

/// `Debug`で16進数表示する値のラッパー。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UpperHex<T>(pub T);

impl<T: fmt::UpperHex> fmt::Debug for UpperHex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_be() {
        assert_eq!(b"\x12\x34\x56\x78".read_be_16(), 0x1234);
        assert_eq!(b"\x12\x34\x56\x78".read_be_24(), 0x123456);
        assert_eq!(b"\x12\x34\x56\x78\x9A\xBC\xDE".read_be_32(), 0x12345678);
    }

    #[test]
    fn test_read_le() {
        assert_eq!(b"\x12\x34\x56\x78".read_le_16(), 0x3412);
        assert_eq!(b"\x12\x34\x56\x78".read_le_32(), 0x78563412);
    }

    #[test]
    fn test_bcd() {
        assert_eq!(read_bcd_digit(0x59), 59);
        assert_eq!(to_bcd_digit(59), 0x59);
        assert_eq!(to_bcd_digit(123), 0x23);
        assert_eq!(b"\x01\x23\x45\x67".read_bcd(8), 1234567);
        assert_eq!(b"\x27\x50\x00".read_bcd(5), 27500);
        assert_eq!(b"\x01\x30\x15".read_bcd_second(), 3600 + 30 * 60 + 15);
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x47, 0x00, 0xFF]).to_string(), "47 00 FF");
        assert_eq!(hex(&[]).to_string(), "");
        assert_eq!(format!("{:?}", hex(&[0x0A])), "[0A]");
        assert_eq!(format!("{:?}", UpperHex(0x4Du8)), "0x4D");

        assert_eq!(parse_hex("47 00 ff"), Some(vec![0x47, 0x00, 0xFF]));
        assert_eq!(parse_hex("0x1F0x02"), None);
        assert_eq!(parse_hex("0x1F 0x02"), Some(vec![0x1F, 0x02]));
        assert_eq!(parse_hex("abc"), None);
        assert_eq!(parse_hex("zz"), None);
    }
}
