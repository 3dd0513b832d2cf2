//! MPEG2-TSのパケット。

use std::fmt;

use crate::pid::Pid;

/// 同期バイト。
pub const SYNC_BYTE: u8 = 0x47;
/// TSパケットの大きさ。
pub const PACKET_SIZE: usize = 188;

/// MPEG2-TSのパケット。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet(pub [u8; PACKET_SIZE]);

/// [`Packet::check_continuity`]で判定される連続性指標の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// 前回のパケットから連続している。
    Continuous,
    /// 前回と同じ連続性指標であり、重複して送られたパケットである。
    Duplicate,
    /// 連続性指標が飛んでいる。
    Discontinuous,
}

impl Packet {
    /// `pid`宛てにペイロードのみを持つパケットを生成する。
    ///
    /// ペイロードが184バイトに満たない部分は`0xFF`で埋め、超える部分は切り捨てる。
    pub fn with_payload(pid: Pid, unit_start: bool, cc: u8, payload: &[u8]) -> Packet {
        let mut packet = Packet([0xFF; PACKET_SIZE]);
        let [hi, lo] = pid.get().to_be_bytes();
        packet.0[0] = SYNC_BYTE;
        packet.0[1] = if unit_start { 0b01000000 } else { 0 } | hi;
        packet.0[2] = lo;
        packet.0[3] = 0b00010000 | (cc & 0x0F);

        let len = std::cmp::min(payload.len(), PACKET_SIZE - 4);
        packet.0[4..4 + len].copy_from_slice(&payload[..len]);
        packet
    }

    /// パケットが正常かどうかを返す。
    ///
    /// 同期バイトやトランスポートエラーインジケーターによるエラー検知に加え、
    /// 予約されたPIDなどパケットとしてあり得ない状態であることも判断材料である。
    pub fn is_normal(&self) -> bool {
        if self.sync_byte() != SYNC_BYTE {
            // 同期バイト不正
            return false;
        }
        if self.error_indicator() {
            // ビット誤りあり
            return false;
        }
        if (0x0002..=0x000F).contains(&self.pid().get()) {
            // 未定義PID範囲
            return false;
        }
        if self.scrambling_control() == 0x01 {
            // 未定義スクランブル制御値
            return false;
        }
        if self.adaptation_field_control() == 0b00 {
            // 未定義アダプテーションフィールド制御値
            return false;
        }
        if self.adaptation_field_control() == 0b10 && self.adaptation_field_length_raw() > 183 {
            // アダプテーションフィールド長異常
            return false;
        }
        if self.adaptation_field_control() == 0b11 && self.adaptation_field_length_raw() > 182 {
            // アダプテーションフィールド長異常
            return false;
        }

        true
    }

    /// 同期バイトを返す。
    #[inline]
    pub fn sync_byte(&self) -> u8 {
        self.0[0]
    }

    /// トランスポートエラーインジケーターを返す。
    #[inline]
    pub fn error_indicator(&self) -> bool {
        self.0[1] & 0b10000000 != 0
    }

    /// ペイロードユニット開始インジケーターを返す。
    #[inline]
    pub fn unit_start_indicator(&self) -> bool {
        self.0[1] & 0b01000000 != 0
    }

    /// PIDを返す。
    #[inline]
    pub fn pid(&self) -> Pid {
        Pid::read(&self.0[1..])
    }

    /// ヌルパケットかどうかを返す。
    #[inline]
    pub fn is_null(&self) -> bool {
        self.pid() == Pid::NULL
    }

    /// トランスポートスクランブル制御（2ビット）を返す。
    #[inline]
    pub fn scrambling_control(&self) -> u8 {
        (self.0[3] & 0b11000000) >> 6
    }

    /// パケットがスクランブル処理されているかを返す。
    #[inline]
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control() & 0b10 != 0
    }

    /// アダプテーションフィールド制御（2ビット）を返す。
    #[inline]
    pub fn adaptation_field_control(&self) -> u8 {
        (self.0[3] & 0b00110000) >> 4
    }

    /// 連続性指標（4ビット）を返す。
    #[inline]
    pub fn continuity_counter(&self) -> u8 {
        self.0[3] & 0b00001111
    }

    /// パケットがアダプテーションフィールドを含むかどうかを返す。
    #[inline]
    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control() & 0b10 != 0
    }

    #[inline]
    fn adaptation_field_length_raw(&self) -> u8 {
        self.0[4]
    }

    /// アダプテーションフィールドがある場合、adaptation_field_lengthを返す。
    #[inline]
    pub fn adaptation_field_length(&self) -> Option<u8> {
        self.has_adaptation_field()
            .then(|| self.adaptation_field_length_raw())
    }

    /// 不連続性インジケーターを返す。
    ///
    /// アダプテーションフィールドがない場合は`false`を返す。
    pub fn discontinuity_indicator(&self) -> bool {
        match self.adaptation_field_length() {
            Some(len) if len >= 1 => self.0[5] & 0b10000000 != 0,
            _ => false,
        }
    }

    /// パケットがペイロードを含むかどうかを返す。
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control() & 0b01 != 0
    }

    /// ペイロードを返す。
    pub fn payload(&self) -> Option<&[u8]> {
        if !self.has_payload() {
            None
        } else if let Some(afl) = self.adaptation_field_length() {
            let offset = 4 + 1 + afl as usize;
            self.0.get(offset..)
        } else {
            self.0.get(4..)
        }
    }

    /// 前回の連続性指標である`last_cc`を元にパケット順の正当性を確認する。
    ///
    /// `last_cc`の初期値は`0x10`以上とする。
    /// ペイロードのないパケットでは連続性指標が増加しないため`last_cc`を更新しない。
    /// 重複パケットの場合も`last_cc`は更新しない。
    pub fn check_continuity(&self, last_cc: &mut u8) -> Continuity {
        if self.is_null() || !self.has_payload() {
            return Continuity::Continuous;
        }

        let cc = self.continuity_counter();
        let result = if self.discontinuity_indicator() || *last_cc >= 0x10 {
            Continuity::Continuous
        } else if *last_cc == cc {
            return Continuity::Duplicate;
        } else if (*last_cc + 1) & 0x0F == cc {
            Continuity::Continuous
        } else {
            Continuity::Discontinuous
        };
        *last_cc = cc;

        result
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Packet")
            .field("sync_byte", &self.sync_byte())
            .field("error_indicator", &self.error_indicator())
            .field("unit_start_indicator", &self.unit_start_indicator())
            .field("pid", &self.pid())
            .field("scrambling_control", &self.scrambling_control())
            .field("adaptation_field_control", &self.adaptation_field_control())
            .field("continuity_counter", &self.continuity_counter())
            .finish_non_exhaustive()
    }
}

/// 任意の位置で区切られたバイト列からTSパケットを切り出す。
///
/// 同期バイトの位置がずれている場合は次の同期バイトを探して再同期する。
#[derive(Debug, Default)]
pub struct PacketSync {
    buf: Vec<u8>,
    pos: usize,
    sync_byte_searches: u64,
}

impl PacketSync {
    /// 空の`PacketSync`を生成する。
    #[inline]
    pub fn new() -> PacketSync {
        PacketSync::default()
    }

    /// 入力データを追加する。
    pub fn push(&mut self, data: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// 同期バイトを探した回数を返す。
    #[inline]
    pub fn sync_byte_searches(&self) -> u64 {
        self.sync_byte_searches
    }

    /// まだパケットとして切り出されていないバイト数を返す。
    #[inline]
    pub fn pending(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// 次のパケットを切り出す。
    ///
    /// 1パケット分のデータがない場合は`None`を返す。
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            let data = &self.buf[self.pos..];
            if data.len() < PACKET_SIZE {
                return None;
            }

            // 次のパケットの先頭も同期バイトであれば同期が取れているとみなす
            let next_ok = data.get(PACKET_SIZE).map_or(true, |&b| b == SYNC_BYTE);
            if data[0] == SYNC_BYTE && next_ok {
                let packet = Packet(data[..PACKET_SIZE].try_into().unwrap());
                self.pos += PACKET_SIZE;
                return Some(packet);
            }

            // 同期バイト待ち
            self.sync_byte_searches += 1;
            match memchr::memchr(SYNC_BYTE, &data[1..]) {
                Some(pos) => self.pos += pos + 1,
                None => {
                    self.pos = self.buf.len();
                    return None;
                }
            }
        }
    }
}
