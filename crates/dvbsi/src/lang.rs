//! 言語コードおよび国コード。

use std::fmt;

/// ISO 639-2で規定される3文字の言語コード、またはISO 3166で規定される3文字の国コード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LangCode(pub [u8; 3]);

impl LangCode {
    /// 英語。
    pub const ENG: LangCode = LangCode(*b"eng");
    /// ドイツ語。
    pub const DEU: LangCode = LangCode(*b"deu");
    /// フランス語。
    pub const FRA: LangCode = LangCode(*b"fra");
    /// スペイン語。
    pub const SPA: LangCode = LangCode(*b"spa");

    /// `data`の先頭3バイトから`LangCode`を読み取る。
    ///
    /// # パニック
    ///
    /// `data`の長さが3未満の場合、このメソッドはパニックする。
    #[inline]
    pub fn read(data: &[u8]) -> LangCode {
        LangCode([data[0], data[1], data[2]])
    }

    /// 大文字小文字を区別せずに`code`と一致するかどうかを返す。
    #[inline]
    pub fn matches(&self, code: &str) -> bool {
        self.0.eq_ignore_ascii_case(code.as_bytes())
    }
}

impl fmt::Display for LangCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.escape_ascii().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lang_code() {
        let code = LangCode::read(b"GBR\x00");
        assert_eq!(code.to_string(), "GBR");
        assert!(code.matches("gbr"));
        assert!(!code.matches("gb"));
        assert!(LangCode::ENG.matches("ENG"));
    }
}
