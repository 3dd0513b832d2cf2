//! MPEG2-TSのパケットからPSIセクションを再構成するためのモジュール。

use arrayvec::ArrayVec;

use crate::packet::{Continuity, Packet};
use crate::pid::{Pid, PidTable};
use crate::psi::{PsiError, PsiSection};

/// 各PIDにおける処理方法を設定するテーブル。
///
/// 型パラメータ`T`には`Filter::Tag`を指定する。
#[derive(Clone)]
pub struct Table<T>(PidTable<Option<PacketState<T>>>);

impl<T: Copy> Table<T> {
    /// 何も設定されていない空のテーブルを生成する。
    #[inline]
    pub fn new() -> Table<T> {
        Table(PidTable::from_fn(|_| None))
    }

    /// `pid`のパケットに処理が設定されているかどうかを返す。
    #[inline]
    pub fn is_set(&self, pid: Pid) -> bool {
        self.0[pid].is_some()
    }

    /// `pid`のパケットに設定されたタグを返す。
    #[inline]
    pub fn get_tag(&self, pid: Pid) -> Option<T> {
        self.0[pid].as_ref().map(|s| s.tag)
    }

    /// `pid`のパケットをPSIとして分離するよう設定する。
    ///
    /// 既に設定されている場合はタグのみを置き換え、再構成中のセクションは維持する。
    /// `tag`により、PMTなど動的に変わるPIDの代わりに定数でパケット種別を区別することができる。
    #[inline]
    pub fn set_as_psi(&mut self, pid: Pid, tag: T) {
        match &mut self.0[pid] {
            Some(state) => state.tag = tag,
            slot @ None => *slot = Some(PacketState::new(tag)),
        }
    }

    /// `pid`のパケットで何も処理しないよう設定を解除する。
    #[inline]
    pub fn unset(&mut self, pid: Pid) {
        self.0[pid] = None;
    }

    /// すべてのPIDの設定を解除する。
    pub fn clear(&mut self) {
        for (_, state) in self.0.iter_mut() {
            *state = None;
        }
    }

    /// `pid`で検出された連続性指標の不連続の回数を返す。
    #[inline]
    pub fn discontinuities(&self, pid: Pid) -> u64 {
        self.0[pid].as_ref().map_or(0, |s| s.discontinuities)
    }

    /// `pid`のセクション再構成の状態を返す。
    ///
    /// 設定されていないPIDでは`None`を返す。
    #[inline]
    pub fn section_state(&self, pid: Pid) -> Option<SectionState> {
        self.0[pid].as_ref().map(|s| s.section.state)
    }
}

impl<T: Copy> Default for Table<T> {
    #[inline]
    fn default() -> Table<T> {
        Table::new()
    }
}

/// パケットの分離における状況。
pub struct Context<'a, T> {
    packet: &'a Packet,
    tag: T,
    table: &'a mut Table<T>,
}

impl<'a, T: Copy> Context<'a, T> {
    /// 分離対象のパケットを返す。
    #[inline]
    pub fn packet(&self) -> &Packet {
        self.packet
    }

    /// 現在のPIDに設定されたタグを返す。
    #[inline]
    pub fn tag(&self) -> T {
        self.tag
    }

    /// 各PIDにおける処理方法を設定するテーブルを返す。
    #[inline]
    pub fn table(&mut self) -> &mut Table<T> {
        self.table
    }
}

/// [`Demuxer`]に渡すフィルターで、パケットを処理するために各メソッドが呼ばれる。
pub trait Filter {
    /// パケットの種類を識別するためのタグに使う型。
    type Tag: Copy;

    /// フィルター初期化時に呼ばれ、各PIDにおける処理方法を設定するテーブルを返す。
    fn on_setup(&mut self) -> Table<Self::Tag>;

    /// PSIセクションを再構成した際に呼ばれる。
    ///
    /// `raw`にはヘッダとCRCを含むセクション全体が入る。
    fn on_psi_section(&mut self, ctx: &mut Context<Self::Tag>, psi: &PsiSection, raw: &[u8]);
}

impl<T: Filter + ?Sized> Filter for &mut T {
    type Tag = T::Tag;

    #[inline]
    fn on_setup(&mut self) -> Table<Self::Tag> {
        (**self).on_setup()
    }

    #[inline]
    fn on_psi_section(&mut self, ctx: &mut Context<Self::Tag>, psi: &PsiSection, raw: &[u8]) {
        (**self).on_psi_section(ctx, psi, raw)
    }
}

/// パケット分離の統計。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemuxStats {
    /// 入力されたパケット数。
    pub packets: u64,
    /// トランスポートエラーなど異常なため捨てたパケット数。
    pub abnormal_packets: u64,
    /// ヌルパケット数。
    pub null_packets: u64,
    /// 重複して送られたため捨てたパケット数。
    pub duplicate_packets: u64,
    /// 連続性指標の不連続の回数。
    pub discontinuities: u64,
    /// 再構成したセクション数。
    pub sections: u64,
    /// 壊れていたかCRCが一致しなかったセクション数。
    pub broken_sections: u64,
}

/// TSパケットを分離し、PSIセクションを再構成する。
pub struct Demuxer<T: Filter> {
    filter: T,
    table: Table<T::Tag>,
    stats: DemuxStats,
}

impl<T: Filter> Demuxer<T> {
    /// `Demuxer`を生成する。
    pub fn new(mut filter: T) -> Demuxer<T> {
        let table = filter.on_setup();
        Demuxer {
            filter,
            table,
            stats: DemuxStats::default(),
        }
    }

    /// 内包するフィルターを参照で返す。
    #[inline]
    pub fn filter(&self) -> &T {
        &self.filter
    }

    /// 内包するフィルターを可変参照で返す。
    #[inline]
    pub fn filter_mut(&mut self) -> &mut T {
        &mut self.filter
    }

    /// 各PIDにおける処理方法を設定するテーブルを返す。
    #[inline]
    pub fn table(&self) -> &Table<T::Tag> {
        &self.table
    }

    /// 各PIDにおける処理方法を設定するテーブルを可変参照で返す。
    #[inline]
    pub fn table_mut(&mut self) -> &mut Table<T::Tag> {
        &mut self.table
    }

    /// これまでの統計を返す。
    #[inline]
    pub fn stats(&self) -> &DemuxStats {
        &self.stats
    }

    /// `Demuxer`を消費して内包するフィルターを返す。
    #[inline]
    pub fn into_filter(self) -> T {
        self.filter
    }

    /// [`Packet`]を処理してセクションを再構成する。
    pub fn feed(&mut self, packet: &Packet) {
        self.stats.packets += 1;
        if !packet.is_normal() {
            self.stats.abnormal_packets += 1;
            return;
        }
        if packet.is_null() {
            self.stats.null_packets += 1;
            return;
        }

        let pid = packet.pid();
        let Some(state) = self.table.0[pid].as_mut() else {
            return;
        };
        let tag = state.tag;

        match packet.check_continuity(&mut state.last_cc) {
            Continuity::Continuous => {}
            Continuity::Duplicate => {
                self.stats.duplicate_packets += 1;
                return;
            }
            Continuity::Discontinuous => {
                // 不連続は記録するのみで再構成中のセクションは捨てない
                log::debug!("continuity counter discontinuity: {:?}", pid);
                state.discontinuities += 1;
                self.stats.discontinuities += 1;
            }
        }

        let Some(payload) = packet.payload().filter(|p| !p.is_empty()) else {
            return;
        };

        // 所有権を切り離すためにパケット処理中は空の値と入れ替える
        let mut section = std::mem::take(&mut state.section);

        let mut ctx = Context {
            packet,
            tag,
            table: &mut self.table,
        };
        if packet.unit_start_indicator() {
            let len = payload[0] as usize;
            match payload[1..].split_at_checked(len) {
                Some((prev, next)) => {
                    if !prev.is_empty() {
                        section.append(&mut self.filter, &mut ctx, &mut self.stats, prev);
                    }
                    // 前のセクションの残りは破棄して新しいセクションを始める
                    section.start();
                    section.append(&mut self.filter, &mut ctx, &mut self.stats, next);
                }
                None => {
                    log::debug!("invalid pointer_field: {:?}", pid);
                    section.reset();
                }
            }
        } else {
            section.append(&mut self.filter, &mut ctx, &mut self.stats, payload);
        }

        // フィルター内で設定が解除されていなければ値を戻す
        if let Some(state) = &mut self.table.0[pid] {
            state.section = section;
        }
    }
}

#[derive(Clone)]
struct PacketState<T> {
    last_cc: u8,
    discontinuities: u64,
    tag: T,
    section: PartialSection,
}

impl<T> PacketState<T> {
    #[inline]
    pub fn new(tag: T) -> PacketState<T> {
        PacketState {
            last_cc: 0x10,
            discontinuities: 0,
            tag,
            section: PartialSection::default(),
        }
    }
}

/// PIDごとのセクション再構成の状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    /// 再構成中のセクションがない。
    Idle,
    /// セクションを再構成中。
    Accumulating,
}

#[derive(Clone)]
struct PartialSection {
    state: SectionState,
    // ヘッダ3バイトと最大セクション長
    buffer: Box<ArrayVec<u8, { 3 + 4093 }>>,
}

impl Default for PartialSection {
    fn default() -> PartialSection {
        PartialSection {
            state: SectionState::Idle,
            buffer: Box::new(ArrayVec::new()),
        }
    }
}

impl PartialSection {
    #[inline]
    fn start(&mut self) {
        self.buffer.clear();
        self.state = SectionState::Accumulating;
    }

    #[inline]
    fn reset(&mut self) {
        self.buffer.clear();
        self.state = SectionState::Idle;
    }

    fn append<T: Filter>(
        &mut self,
        filter: &mut T,
        ctx: &mut Context<T::Tag>,
        stats: &mut DemuxStats,
        data: &[u8],
    ) {
        if self.state == SectionState::Idle {
            return;
        }

        // バッファに収まる形でdataを追記
        let len = std::cmp::min(self.buffer.remaining_capacity(), data.len());
        let _result = self.buffer.try_extend_from_slice(&data[..len]);
        debug_assert!(_result.is_ok());

        let mut buf = self.buffer.as_slice();
        loop {
            let psi_len = match PsiSection::parse(buf) {
                Err(PsiError::InsufficientLength) => break,
                Err(PsiError::EndOfPsi) => {
                    // 残りはスタッフィング
                    buf = &[];
                    break;
                }
                Err(PsiError::Corrupted(psi_len)) => {
                    log::debug!(
                        "psi section corrupted: {:?} {}",
                        ctx.packet.pid(),
                        crate::bytes::hex(&buf[..psi_len]),
                    );
                    stats.broken_sections += 1;
                    psi_len
                }
                Err(PsiError::Crc32(psi_len)) => {
                    log::debug!("psi section crc32 error: {:?}", ctx.packet.pid());
                    stats.broken_sections += 1;
                    psi_len
                }
                Ok((psi, psi_len)) => {
                    stats.sections += 1;
                    filter.on_psi_section(ctx, &psi, &buf[..psi_len]);
                    psi_len
                }
            };

            // 読み込んだPSIセクションの分バッファを進める
            buf = &buf[psi_len..];
        }

        if buf.is_empty() {
            self.reset();
        } else if buf.len() < self.buffer.len() {
            // 処理した部分を捨てる
            let remaining = buf.len();
            let offset = self.buffer.len() - remaining;
            self.buffer.copy_within(offset.., 0);
            self.buffer.truncate(remaining);
        } else if self.buffer.is_full() {
            log::debug!("psi section overflow: {:?}", ctx.packet.pid());
            stats.broken_sections += 1;
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[derive(Default)]
    struct Collect {
        sections: Vec<Vec<u8>>,
    }

    impl Filter for Collect {
        type Tag = ();

        fn on_setup(&mut self) -> Table<()> {
            let mut table = Table::new();
            table.set_as_psi(Pid::PAT, ());
            table
        }

        fn on_psi_section(&mut self, _: &mut Context<()>, _: &PsiSection, raw: &[u8]) {
            self.sections.push(raw.to_vec());
        }
    }

    const PAT: [u8; 16] = hex!("00 B0 0D 00 01 C1 00 00 00 01 F0 00 2A B1 04 B2");

    /// 1パケットに収まらない大きさのPATを生成する。
    fn long_pat(programs: u16) -> Vec<u8> {
        let section_length = 5 + programs * 4 + 4;
        let mut section = vec![0x00, 0xB0 | (section_length >> 8) as u8, section_length as u8];
        section.extend_from_slice(&[0x00, 0x01, 0xC1, 0x00, 0x00]);
        for n in 1..=programs {
            section.extend_from_slice(&n.to_be_bytes());
            section.extend_from_slice(&(0xE100 + n).to_be_bytes());
        }
        let crc = crate::crc::calc32(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn start_packet(cc: u8, section: &[u8]) -> Packet {
        Packet::with_payload(Pid::PAT, true, cc, &[&[0x00], section].concat())
    }

    #[test]
    fn test_single_packet_section() {
        let mut demuxer = Demuxer::new(Collect::default());
        demuxer.feed(&start_packet(0, &PAT));
        assert_eq!(demuxer.filter().sections, [PAT.to_vec()]);
        assert_eq!(demuxer.table().section_state(Pid::PAT), Some(SectionState::Idle));
        assert_eq!(demuxer.stats().sections, 1);
    }

    #[test]
    fn test_split_section() {
        let pat = long_pat(50);
        assert_eq!(pat.len(), 212);

        let mut demuxer = Demuxer::new(Collect::default());
        demuxer.feed(&start_packet(0, &pat[..183]));
        assert_eq!(
            demuxer.table().section_state(Pid::PAT),
            Some(SectionState::Accumulating),
        );
        assert!(demuxer.filter().sections.is_empty());

        // 継続パケットの残りは0xFFで埋まる
        demuxer.feed(&Packet::with_payload(Pid::PAT, false, 1, &pat[183..]));
        assert_eq!(demuxer.filter().sections, [pat]);
        assert_eq!(demuxer.table().section_state(Pid::PAT), Some(SectionState::Idle));
    }

    #[test]
    fn test_discontinuity_keeps_section() {
        let pat = long_pat(50);
        let mut demuxer = Demuxer::new(Collect::default());
        demuxer.feed(&start_packet(0, &pat[..183]));
        // 連続性指標が飛んでも再構成は継続する
        demuxer.feed(&Packet::with_payload(Pid::PAT, false, 2, &pat[183..]));
        assert_eq!(demuxer.filter().sections, [pat]);
        assert_eq!(demuxer.table().discontinuities(Pid::PAT), 1);
    }

    #[test]
    fn test_continuity_counts() {
        let mut demuxer = Demuxer::new(Collect::default());
        for cc in [0, 1, 2, 4, 5] {
            demuxer.feed(&start_packet(cc, &PAT));
        }
        assert_eq!(demuxer.table().discontinuities(Pid::PAT), 1);
        assert_eq!(demuxer.filter().sections.len(), 5);

        let mut demuxer = Demuxer::new(Collect::default());
        for cc in [0, 1, 2, 3, 4] {
            demuxer.feed(&start_packet(cc, &PAT));
        }
        assert_eq!(demuxer.table().discontinuities(Pid::PAT), 0);
    }

    #[test]
    fn test_start_discards_partial() {
        let pat = long_pat(50);
        let mut demuxer = Demuxer::new(Collect::default());
        demuxer.feed(&start_packet(0, &pat[..183]));
        demuxer.feed(&start_packet(1, &PAT));
        assert_eq!(demuxer.filter().sections, [PAT.to_vec()]);
    }

    #[test]
    fn test_dropped_packets() {
        let mut demuxer = Demuxer::new(Collect::default());

        let mut error = start_packet(0, &PAT);
        error.0[1] |= 0b10000000;
        demuxer.feed(&error);
        demuxer.feed(&Packet::with_payload(Pid::NULL, false, 0, &[]));
        demuxer.feed(&start_packet(0, &PAT));
        demuxer.feed(&start_packet(0, &PAT));
        // 対象外のPID
        demuxer.feed(&Packet::with_payload(Pid::SDT, true, 0, &[0x00]));

        assert_eq!(demuxer.filter().sections.len(), 1);
        let stats = demuxer.stats();
        assert_eq!(stats.packets, 5);
        assert_eq!(stats.abnormal_packets, 1);
        assert_eq!(stats.null_packets, 1);
        assert_eq!(stats.duplicate_packets, 1);
    }

    #[test]
    fn test_crc_error() {
        let mut broken = PAT;
        broken[9] ^= 0xFF;
        let mut demuxer = Demuxer::new(Collect::default());
        demuxer.feed(&start_packet(0, &broken));
        assert!(demuxer.filter().sections.is_empty());
        assert_eq!(demuxer.stats().broken_sections, 1);
    }
}
