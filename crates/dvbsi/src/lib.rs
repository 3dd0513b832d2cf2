//! DVB-SI、ATSC PSIPおよび事業者形式の番組表を含むMPEG2-TSを読み込むためのクレート。
//!
//! TSパケットからのセクション再構成、記述子とテーブルの読み取り、
//! 文字列の復号と圧縮テキストの展開を行う。

#![deny(missing_docs)]

pub mod bytes;
pub mod crc;
pub mod demux;
pub mod huffman;
pub mod lang;
pub mod packet;
pub mod pid;
pub mod psi;
pub mod text;
pub mod time;

pub use packet::Packet;
pub use pid::Pid;
pub use text::DvbStr;
