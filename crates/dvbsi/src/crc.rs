//! セクションのCRC検査。

use crc::{Crc, CRC_32_MPEG_2};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// `data`のCRC32（MPEG-2）を計算する。
#[inline]
pub fn calc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// 末尾4バイトにCRC32を含む`data`が正しいかどうかを返す。
///
/// CRCを含めた全体を計算した値が0になれば正しい。
#[inline]
pub fn verify32(data: &[u8]) -> bool {
    data.len() >= 4 && calc32(data) == 0
}
