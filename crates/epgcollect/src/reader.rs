//! バッファからTSを読み取り、セクションを再構成して共有キューに積むスレッド。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::sync::{Parker, Unparker};
use dvbsi::demux::{Context, DemuxStats, Demuxer, Filter, Table};
use dvbsi::packet::PacketSync;
use dvbsi::psi::{PsiError, PsiSection};
use dvbsi::Pid;
use parking_lot::Mutex;

use crate::provider::SampleDataProvider;

/// 新しいデータがない場合に待つ時間。
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// 再構成されたセクション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// セクションが送られてきたPID。
    pub pid: Pid,
    /// テーブル識別。
    pub table_id: u8,
    /// ヘッダとCRCを含むセクション全体。
    pub data: Vec<u8>,
}

impl Section {
    /// セクションをパースする。
    #[inline]
    pub fn psi(&self) -> Result<PsiSection, PsiError> {
        PsiSection::parse(&self.data).map(|(psi, _)| psi)
    }
}

/// 受け付けるテーブル識別の集合。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TableFilter([u64; 4]);

impl TableFilter {
    /// 何も受け付けない`TableFilter`を生成する。
    #[inline]
    pub const fn new() -> TableFilter {
        TableFilter([0; 4])
    }

    /// `table_ids`を受け付ける`TableFilter`を生成する。
    pub fn with<I: IntoIterator<Item = u8>>(table_ids: I) -> TableFilter {
        let mut filter = TableFilter::new();
        for table_id in table_ids {
            filter.insert(table_id);
        }
        filter
    }

    /// `table_id`を受け付けるようにする。
    #[inline]
    pub fn insert(&mut self, table_id: u8) {
        self.0[(table_id >> 6) as usize] |= 1 << (table_id & 0x3F);
    }

    /// `table_id`を受け付けるかどうかを返す。
    #[inline]
    pub fn accepts(&self, table_id: u8) -> bool {
        self.0[(table_id >> 6) as usize] & (1 << (table_id & 0x3F)) != 0
    }
}

/// 再構成されたセクションを取り出す先。
///
/// ポーリング側はこのトレイトを通してのみ読み取りスレッドとやり取りする。
pub trait SectionSource {
    /// 受信するPIDと受け付けるテーブルを変更する。
    ///
    /// 未取得のセクションは捨てられる。
    fn retarget(&self, pids: &[Pid], tables: TableFilter);

    /// キューに溜まったセクションをすべて取り出す。
    fn drain(&self) -> Vec<Section>;

    /// 現在の設定でバッファの末尾まで読み終えているかどうかを返す。
    fn is_caught_up(&self) -> bool;
}

/// 読み取りスレッドの統計。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// 読み取ったバイト数。
    pub bytes_read: u64,
    /// 同期バイトを探した回数。
    pub sync_byte_searches: u64,
    /// パケット分離の統計。
    pub demux: DemuxStats,
}

struct Target {
    generation: u64,
    pids: Vec<Pid>,
    tables: TableFilter,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Vec<Section>>,
    target: Mutex<Option<Target>>,
    generation: AtomicU64,
    caught_up: AtomicU64,
    shutdown: AtomicBool,
    stats: Mutex<ReaderStats>,
}

impl Shared {
    /// 読み取り対象を切り替え、キューに残ったセクションを捨てる。
    fn set_target(&self, pids: &[Pid], tables: TableFilter) {
        let mut target = self.target.lock();
        let mut queue = self.queue.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *target = Some(Target {
            generation,
            pids: pids.to_vec(),
            tables,
        });
        queue.clear();
    }

    /// `generation`が現在の読み取り対象であればセクションを積む。
    ///
    /// 世代の比較はキューのロック中に行う。
    fn push(&self, generation: u64, sections: Vec<Section>) -> bool {
        let mut queue = self.queue.lock();
        if generation != self.generation.load(Ordering::SeqCst) {
            return false;
        }
        queue.extend(sections);
        true
    }
}

/// 別スレッドでバッファを読み取り、セクションを共有キューに積む。
pub struct SectionReader {
    shared: Arc<Shared>,
    unparker: Unparker,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SectionReader {
    /// 読み取りスレッドを起動する。
    ///
    /// [`SectionSource::retarget`]を呼ぶまでは何も読み取らない。
    pub fn spawn(provider: Arc<dyn SampleDataProvider>) -> SectionReader {
        let shared = Arc::new(Shared::default());
        let parker = Parker::new();
        let unparker = parker.unparker().clone();

        let worker = ReaderWorker {
            provider,
            shared: shared.clone(),
            parker,
            demuxer: Demuxer::new(QueueFilter::default()),
            sync: PacketSync::new(),
            generation: 0,
            offset: 0,
            buf: Vec::new(),
        };
        let handle = std::thread::spawn(move || worker.run());

        SectionReader {
            shared,
            unparker,
            handle: Some(handle),
        }
    }

    /// これまでの統計を返す。
    #[inline]
    pub fn stats(&self) -> ReaderStats {
        *self.shared.stats.lock()
    }

    /// 読み取りスレッドを終了させ、終了を待つ。
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.unparker.unpark();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("section reader panicked");
            }
        }
    }
}

impl SectionSource for SectionReader {
    fn retarget(&self, pids: &[Pid], tables: TableFilter) {
        self.shared.set_target(pids, tables);
        self.unparker.unpark();
    }

    fn drain(&self) -> Vec<Section> {
        // ロック中は入れ替えのみ行う
        std::mem::take(&mut *self.shared.queue.lock())
    }

    fn is_caught_up(&self) -> bool {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        generation != 0 && self.shared.caught_up.load(Ordering::SeqCst) == generation
    }
}

impl Drop for SectionReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Default)]
struct QueueFilter {
    tables: TableFilter,
    pending: Vec<Section>,
}

impl Filter for QueueFilter {
    type Tag = ();

    fn on_setup(&mut self) -> Table<()> {
        Table::new()
    }

    fn on_psi_section(&mut self, ctx: &mut Context<()>, psi: &PsiSection, raw: &[u8]) {
        // 対象外のテーブルは溜めずに捨てる
        if !self.tables.accepts(psi.table_id) {
            return;
        }

        self.pending.push(Section {
            pid: ctx.packet().pid(),
            table_id: psi.table_id,
            data: raw.to_vec(),
        });
    }
}

struct ReaderWorker {
    provider: Arc<dyn SampleDataProvider>,
    shared: Arc<Shared>,
    parker: Parker,
    demuxer: Demuxer<QueueFilter>,
    sync: PacketSync,
    generation: u64,
    offset: usize,
    buf: Vec<u8>,
}

impl ReaderWorker {
    fn apply(&mut self, target: Target) {
        log::debug!("reader target: {:?}", target.pids);

        let table = self.demuxer.table_mut();
        table.clear();
        for &pid in &target.pids {
            table.set_as_psi(pid, ());
        }
        let filter = self.demuxer.filter_mut();
        filter.tables = target.tables;
        filter.pending.clear();

        self.provider.change_pid_mapping(&target.pids);
        self.generation = target.generation;
        self.offset = 0;
        self.sync = PacketSync::new();
    }

    fn read(&mut self) -> usize {
        self.buf.clear();
        let n = self.provider.copy_buffer(self.offset, &mut self.buf);
        if n == 0 {
            return 0;
        }
        self.offset += n;

        self.sync.push(&self.buf);
        while let Some(packet) = self.sync.next_packet() {
            self.demuxer.feed(&packet);
        }

        let pending = std::mem::take(&mut self.demuxer.filter_mut().pending);
        if !pending.is_empty() && !self.shared.push(self.generation, pending) {
            log::debug!("sections of a previous target dropped");
        }

        let mut stats = self.shared.stats.lock();
        stats.bytes_read += n as u64;
        stats.sync_byte_searches =
            self.sync.sync_byte_searches() + self.provider.sync_byte_searches();
        stats.demux = *self.demuxer.stats();

        n
    }

    fn run(mut self) {
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let target = self.shared.target.lock().take();
            if let Some(target) = target {
                self.apply(target);
            }
            if self.generation == 0 {
                self.parker.park_timeout(IDLE_WAIT);
                continue;
            }

            if self.read() == 0 {
                self.shared.caught_up.store(self.generation, Ordering::SeqCst);
                self.parker.park_timeout(IDLE_WAIT);
            }
        }
    }
}
