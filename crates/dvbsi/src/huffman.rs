//! 辞書によるハフマン圧縮テキストの展開。
//!
//! 事業者独自形式の番組情報では単一の符号木を、放送規格の圧縮テキストでは
//! 直前の文字によって符号木を切り替える複数木の辞書を用いる。
//! 辞書は設定ファイルの内容から[`Dictionaries`]に読み込む。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxHashMap;
use thiserror::Error;

/// 辞書の識別子。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeId {
    /// 事業者形式の128符号表（テーブル識別`0x80`以下）。
    Dish128,
    /// 事業者形式の255符号表（テーブル識別`0x80`超）。
    Dish255,
    /// 規格の圧縮テキスト、選択子`0x01`。
    Standard1,
    /// 規格の圧縮テキスト、選択子`0x02`。
    Standard2,
}

impl TreeId {
    /// 事業者形式のテーブル識別から辞書を選択する。
    #[inline]
    pub fn for_dish_table(table_id: u8) -> TreeId {
        if table_id <= 0x80 {
            TreeId::Dish128
        } else {
            TreeId::Dish255
        }
    }

    /// 圧縮テキストの選択子から辞書を選択する。
    #[inline]
    pub fn for_selector(selector: u8) -> Option<TreeId> {
        match selector {
            0x01 => Some(TreeId::Standard1),
            0x02 => Some(TreeId::Standard2),
            _ => None,
        }
    }

    #[inline]
    fn is_single(&self) -> bool {
        matches!(self, TreeId::Dish128 | TreeId::Dish255)
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            TreeId::Dish128 => "dish128",
            TreeId::Dish255 => "dish255",
            TreeId::Standard1 => "standard1",
            TreeId::Standard2 => "standard2",
        })
    }
}

/// 辞書の読み込みや展開で発生するエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuffmanError {
    /// 読み込まれていない辞書で展開しようとした。
    #[error("dictionary {0} is not loaded")]
    NotLoaded(TreeId),

    /// 辞書の種類と読み込み方法が一致しない。
    #[error("dictionary {0} cannot be loaded in this format")]
    WrongFormat(TreeId),

    /// 辞書の行が不正。
    #[error("line {line}: {message}")]
    InvalidLine {
        /// 1から始まる行番号。
        line: usize,
        /// エラーの内容。
        message: &'static str,
    },
}

/// 符号が表す記号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Symbol {
    Char(u8),
    Start,
    Stop,
    Escape,
}

impl Symbol {
    fn parse(s: &str) -> Option<Symbol> {
        match s {
            "START" => Some(Symbol::Start),
            "STOP" => Some(Symbol::Stop),
            "ESCAPE" => Some(Symbol::Escape),
            _ => {
                if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    return u8::from_str_radix(hex, 16).ok().map(Symbol::Char);
                }

                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => u8::try_from(u32::from(c)).ok().map(Symbol::Char),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug)]
enum Node {
    Branch([Option<Box<Node>>; 2]),
    Leaf(Symbol),
}

impl Node {
    #[inline]
    fn new_branch() -> Node {
        Node::Branch([None, None])
    }
}

/// 一つの符号木。
#[derive(Debug)]
struct Tree {
    root: Node,
}

impl Tree {
    fn new() -> Tree {
        Tree {
            root: Node::new_branch(),
        }
    }

    fn insert(&mut self, code: &str, symbol: Symbol) -> Result<(), &'static str> {
        if code.is_empty() {
            return Err("empty code");
        }

        let mut node = &mut self.root;
        for c in code.chars() {
            let bit = match c {
                '0' => 0,
                '1' => 1,
                _ => return Err("code must consist of 0 and 1"),
            };
            let Node::Branch(children) = node else {
                return Err("code conflicts with a shorter code");
            };
            node = children[bit].get_or_insert_with(|| Box::new(Node::new_branch()));
        }

        match node {
            Node::Branch([None, None]) => {
                *node = Node::Leaf(symbol);
                Ok(())
            }
            _ => Err("duplicate code"),
        }
    }

    /// 符号を1つ読み取る。ビット列が途中で尽きた場合は`None`を返す。
    fn decode(&self, bits: &mut BitReader) -> Option<Symbol> {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(symbol) => return Some(*symbol),
                Node::Branch(children) => {
                    let bit = bits.read_bit()?;
                    node = children[bit as usize].as_deref()?;
                }
            }
        }
    }
}

/// MSBから順にビットを読み取る。
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    #[inline]
    fn new(data: &'a [u8]) -> BitReader<'a> {
        BitReader { data, pos: 0 }
    }

    #[inline]
    fn read_bit(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos / 8)?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Some(bit)
    }

    fn read_u8(&mut self) -> Option<u8> {
        let mut value = 0;
        for _ in 0..8 {
            value = (value << 1) | self.read_bit()?;
        }
        Some(value)
    }
}

/// 直前の記号ごとに符号木を持つ辞書。
#[derive(Debug, Default)]
struct MultiTree {
    trees: FxHashMap<Symbol, Tree>,
}

/// 読み込まれた辞書群。
#[derive(Debug, Default)]
pub struct Dictionaries {
    dish128: Option<Tree>,
    dish255: Option<Tree>,
    standard1: Option<MultiTree>,
    standard2: Option<MultiTree>,
    escapes: AtomicU64,
}

impl Dictionaries {
    /// 辞書を持たない`Dictionaries`を生成する。
    #[inline]
    pub fn new() -> Dictionaries {
        Dictionaries::default()
    }

    /// `<ビット列>=<記号>`形式の単一木の辞書を読み込む。
    ///
    /// 空行と`#`で始まる行は無視する。
    pub fn load_single(&mut self, id: TreeId, text: &str) -> Result<(), HuffmanError> {
        if !id.is_single() {
            return Err(HuffmanError::WrongFormat(id));
        }

        let mut tree = Tree::new();
        for (i, line) in lines(text) {
            let invalid = |message| HuffmanError::InvalidLine { line: i, message };

            let (code, symbol) = line.split_once('=').ok_or(invalid("missing `=`"))?;
            let symbol = Symbol::parse(symbol).ok_or(invalid("invalid symbol"))?;
            tree.insert(code.trim(), symbol).map_err(invalid)?;
        }

        log::info!("loaded huffman dictionary {}", id);
        match id {
            TreeId::Dish128 => self.dish128 = Some(tree),
            TreeId::Dish255 => self.dish255 = Some(tree),
            TreeId::Standard1 | TreeId::Standard2 => unreachable!(),
        }
        Ok(())
    }

    /// `<直前の記号>:<ビット列>:<記号>`形式の複数木の辞書を読み込む。
    ///
    /// 空行と`#`で始まる行は無視する。
    pub fn load_multi(&mut self, id: TreeId, text: &str) -> Result<(), HuffmanError> {
        if id.is_single() {
            return Err(HuffmanError::WrongFormat(id));
        }

        let mut dict = MultiTree::default();
        for (i, line) in lines(text) {
            let invalid = |message| HuffmanError::InvalidLine { line: i, message };

            let (prev, rem) = line.split_once(':').ok_or(invalid("missing `:`"))?;
            // 直前の記号が`:`の場合は`0x3A`と表記する
            let (code, next) = rem.split_once(':').ok_or(invalid("missing `:`"))?;
            let prev = Symbol::parse(prev).ok_or(invalid("invalid previous symbol"))?;
            let next = Symbol::parse(next).ok_or(invalid("invalid symbol"))?;
            dict.trees
                .entry(prev)
                .or_insert_with(Tree::new)
                .insert(code.trim(), next)
                .map_err(invalid)?;
        }

        log::info!("loaded huffman dictionary {}", id);
        match id {
            TreeId::Standard1 => self.standard1 = Some(dict),
            TreeId::Standard2 => self.standard2 = Some(dict),
            TreeId::Dish128 | TreeId::Dish255 => unreachable!(),
        }
        Ok(())
    }

    /// 辞書が読み込まれているかどうかを返す。
    pub fn is_loaded(&self, id: TreeId) -> bool {
        match id {
            TreeId::Dish128 => self.dish128.is_some(),
            TreeId::Dish255 => self.dish255.is_some(),
            TreeId::Standard1 => self.standard1.is_some(),
            TreeId::Standard2 => self.standard2.is_some(),
        }
    }

    /// これまでの展開で出現したエスケープの数を返す。
    #[inline]
    pub fn escape_count(&self) -> u64 {
        self.escapes.load(Ordering::Relaxed)
    }

    /// `id`の辞書で`data`を展開する。
    ///
    /// 事業者形式の辞書では`data`の先頭に展開後の長さを示すヘッダがあるものとする。
    /// ヘッダが不正な場合はデータが尽きるまで展開する。
    ///
    /// 辞書が読み込まれていない場合は[`HuffmanError::NotLoaded`]を返す。
    pub fn decompress(&self, id: TreeId, data: &[u8]) -> Result<String, HuffmanError> {
        match id {
            TreeId::Dish128 | TreeId::Dish255 => {
                let tree = match id {
                    TreeId::Dish128 => self.dish128.as_ref(),
                    _ => self.dish255.as_ref(),
                };
                let tree = tree.ok_or(HuffmanError::NotLoaded(id))?;
                Ok(self.decompress_single(tree, data))
            }
            TreeId::Standard1 | TreeId::Standard2 => {
                let dict = match id {
                    TreeId::Standard1 => self.standard1.as_ref(),
                    _ => self.standard2.as_ref(),
                };
                let dict = dict.ok_or(HuffmanError::NotLoaded(id))?;
                Ok(self.decompress_multi(dict, data))
            }
        }
    }

    fn decompress_single(&self, tree: &Tree, data: &[u8]) -> String {
        let (length, body) = match *data {
            [len, ref body @ ..] if len & 0x80 == 0 => (Some(len as usize), body),
            [_, len, ref body @ ..] => (Some(len as usize), body),
            _ => {
                log::debug!("malformed compressed header: {}", crate::bytes::hex(data));
                (None, data.get(1..).unwrap_or_default())
            }
        };

        let mut bits = BitReader::new(body);
        let mut out = String::new();
        let mut emitted = 0;
        while length.map_or(true, |len| emitted < len) {
            match tree.decode(&mut bits) {
                None | Some(Symbol::Stop) => break,
                Some(Symbol::Escape) => {
                    self.escapes.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Some(Symbol::Start) => {}
                Some(Symbol::Char(c)) => {
                    out.push(char::from(c));
                    emitted += 1;
                }
            }
        }

        out
    }

    fn decompress_multi(&self, dict: &MultiTree, data: &[u8]) -> String {
        let mut bits = BitReader::new(data);
        let mut out = String::new();
        let mut context = Symbol::Start;
        loop {
            let Some(tree) = dict.trees.get(&context) else {
                log::debug!("no huffman tree for {:?}", context);
                break;
            };

            match tree.decode(&mut bits) {
                None | Some(Symbol::Stop) => break,
                Some(Symbol::Start) => context = Symbol::Start,
                Some(Symbol::Char(c)) => {
                    out.push(char::from(c));
                    context = Symbol::Char(c);
                }
                Some(Symbol::Escape) => {
                    self.escapes.fetch_add(1, Ordering::Relaxed);
                    // 0x80未満の文字が現れるまで生の文字が続く
                    loop {
                        let Some(c) = bits.read_u8() else {
                            return out;
                        };
                        if c == 0 {
                            return out;
                        }
                        out.push(char::from(c));
                        if c < 0x80 {
                            context = Symbol::Char(c);
                            break;
                        }
                    }
                }
            }
        }

        out
    }
}

/// 空行とコメント行を除いた行を行番号と共に返す。
fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
}
