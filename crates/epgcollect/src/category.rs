//! 番組の分類の解決。
//!
//! 分類は次の順に探す。
//!
//! 1. 大分類と中分類の組（`use_content_subtype`が有効な場合のみ）
//! 2. 大分類のみ
//! 3. 番組名や番組記述による独自の規則
//!
//! 1と2のどちらにもない組は未定義の分類として一度だけ記録する。

use fxhash::{FxBuildHasher, FxHashMap};
use indexmap::IndexMap;
use thiserror::Error;

use crate::model::Category;

/// 分類表の読み込みで発生するエラー。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CategoryError {
    /// 行の形式が不正。
    #[error("invalid category line {line}: `{content}`")]
    InvalidLine {
        /// 行番号（1始まり）。
        line: usize,
        /// 行の内容。
        content: String,
    },
}

fn parse_number(s: &str) -> Option<u8> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// 設定ファイルの各行を`#`によるコメントと空行を除いて返す。
fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// 分類の説明を引く表。
///
/// 各行は`大分類,中分類=説明`または`大分類=説明`の形式で、数値は10進数か`0x`付きの16進数で記述する。
#[derive(Debug, Default, Clone)]
pub struct CategoryTable {
    entries: FxHashMap<(u8, Option<u8>), String>,
}

impl CategoryTable {
    /// 空の表を生成する。
    #[inline]
    pub fn new() -> CategoryTable {
        CategoryTable::default()
    }

    /// 表を読み込む。
    pub fn parse(text: &str) -> Result<CategoryTable, CategoryError> {
        let mut entries = FxHashMap::default();
        for (line, content) in lines(text) {
            let err = || CategoryError::InvalidLine {
                line,
                content: content.to_string(),
            };

            let (key, description) = content.split_once('=').ok_or_else(err)?;
            let key = match key.split_once(',') {
                Some((main, sub)) => (
                    parse_number(main).ok_or_else(err)?,
                    Some(parse_number(sub).ok_or_else(err)?),
                ),
                None => (parse_number(key).ok_or_else(err)?, None),
            };
            entries.insert(key, description.trim().to_string());
        }

        Ok(CategoryTable { entries })
    }

    /// 分類の説明を返す。`sub`が`None`の場合は大分類の説明を返す。
    #[inline]
    pub fn get(&self, main: u8, sub: Option<u8>) -> Option<&str> {
        self.entries.get(&(main, sub)).map(|s| &**s)
    }

    /// 登録された分類の数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 何も登録されていなければ`true`を返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 独自の規則で照合する対象。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// 番組名が一致する。
    Title,
    /// 番組名が前方一致する。
    TitlePrefix,
    /// 番組名に含まれる。
    TitleContains,
    /// 番組記述に含まれる。
    DescriptionContains,
}

/// 番組名や番組記述から分類を決める独自の規則。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRule {
    /// 照合する対象。
    pub kind: RuleKind,
    /// 照合する文字列（大文字小文字を区別しない）。
    pub pattern: String,
    /// 一致した場合の分類の説明。
    pub description: String,
}

impl CustomRule {
    /// 独自の規則を読み込む。
    ///
    /// 各行は`title=番組名:説明`のような形式で、照合の対象には
    /// `title`、`title-prefix`、`title-contains`、`description-contains`を指定できる。
    pub fn parse_rules(text: &str) -> Result<Vec<CustomRule>, CategoryError> {
        lines(text)
            .map(|(line, content)| {
                let err = || CategoryError::InvalidLine {
                    line,
                    content: content.to_string(),
                };

                let (kind, rest) = content.split_once('=').ok_or_else(err)?;
                let kind = match kind.trim() {
                    "title" => RuleKind::Title,
                    "title-prefix" => RuleKind::TitlePrefix,
                    "title-contains" => RuleKind::TitleContains,
                    "description-contains" => RuleKind::DescriptionContains,
                    _ => return Err(err()),
                };
                let (pattern, description) = rest.rsplit_once(':').ok_or_else(err)?;
                if pattern.trim().is_empty() {
                    return Err(err());
                }

                Ok(CustomRule {
                    kind,
                    pattern: pattern.trim().to_lowercase(),
                    description: description.trim().to_string(),
                })
            })
            .collect()
    }

    fn matches(&self, title: &str, description: &str) -> bool {
        match self.kind {
            RuleKind::Title => title == self.pattern,
            RuleKind::TitlePrefix => title.starts_with(&*self.pattern),
            RuleKind::TitleContains => title.contains(&*self.pattern),
            RuleKind::DescriptionContains => description.contains(&*self.pattern),
        }
    }
}

/// 分類が見つかった段階。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryTier {
    /// 大分類と中分類の組。
    Subtype,
    /// 大分類のみ。
    MainType,
    /// 独自の規則。
    Custom,
}

/// 分類表に定義されていなかった分類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedCategory {
    /// 大分類。
    pub main: u8,
    /// 中分類。
    pub sub: u8,
    /// 最初に見つかった番組の名前。
    pub sample_title: String,
}

/// 番組の分類を解決する。
#[derive(Debug, Default, Clone)]
pub struct CategoryResolver {
    native: CategoryTable,
    generic: CategoryTable,
    custom: Vec<CustomRule>,
    use_content_subtype: bool,
    undefined: IndexMap<(u8, u8), String, FxBuildHasher>,
}

impl CategoryResolver {
    /// 空の表で`CategoryResolver`を生成する。
    pub fn new(use_content_subtype: bool) -> CategoryResolver {
        CategoryResolver {
            use_content_subtype,
            ..CategoryResolver::default()
        }
    }

    /// 事業者独自の分類表を設定する。
    #[inline]
    pub fn set_native(&mut self, table: CategoryTable) {
        self.native = table;
    }

    /// 汎用の分類表を設定する。
    #[inline]
    pub fn set_generic(&mut self, table: CategoryTable) {
        self.generic = table;
    }

    /// 独自の規則を設定する。
    #[inline]
    pub fn set_custom(&mut self, rules: Vec<CustomRule>) {
        self.custom = rules;
    }

    fn lookup(&self, main: u8, sub: Option<u8>) -> Option<&str> {
        self.native
            .get(main, sub)
            .or_else(|| self.generic.get(main, sub))
    }

    /// 分類を解決する。
    ///
    /// 大分類と中分類のどちらの表にもない場合は未定義の分類として記録し、
    /// 独自の規則による結果を返す。
    pub fn resolve(
        &mut self,
        main: u8,
        sub: u8,
        title: &str,
        description: &str,
    ) -> Option<(Category, CategoryTier)> {
        let found = self
            .use_content_subtype
            .then(|| self.lookup(main, Some(sub)))
            .flatten()
            .map(|d| (d, CategoryTier::Subtype))
            .or_else(|| self.lookup(main, None).map(|d| (d, CategoryTier::MainType)));
        if let Some((description, tier)) = found {
            let category = Category {
                main,
                sub,
                description: description.to_string(),
            };
            return Some((category, tier));
        }

        if !self.undefined.contains_key(&(main, sub)) {
            log::debug!("undefined category {},{}: {}", main, sub, title);
            self.undefined.insert((main, sub), title.to_string());
        }

        self.resolve_custom(title, description)
            .map(|d| {
                let category = Category {
                    main,
                    sub,
                    description: d.to_string(),
                };
                (category, CategoryTier::Custom)
            })
    }

    /// 独自の規則のみで分類を探し、説明を返す。
    pub fn resolve_custom(&self, title: &str, description: &str) -> Option<&str> {
        let title = title.to_lowercase();
        let description = description.to_lowercase();
        self.custom
            .iter()
            .find(|rule| rule.matches(&title, &description))
            .map(|rule| &*rule.description)
    }

    /// 記録された未定義の分類を、記録された順に返す。
    pub fn undefined(&self) -> impl Iterator<Item = UndefinedCategory> + '_ {
        self.undefined
            .iter()
            .map(|(&(main, sub), title)| UndefinedCategory {
                main,
                sub,
                sample_title: title.clone(),
            })
    }
}
