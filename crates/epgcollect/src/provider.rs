//! TSを供給する側とのインターフェイス。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dvbsi::Pid;
use parking_lot::{Mutex, RwLock};

/// チューナーなどから受け取ったTSを保持するバッファを公開するトレイト。
///
/// 読み取り側は別スレッドから呼び出すため、実装は内部可変性を持つ必要がある。
pub trait SampleDataProvider: Send + Sync {
    /// バッファの`offset`バイト目以降を`out`に追記し、追記したバイト数を返す。
    fn copy_buffer(&self, offset: usize, out: &mut Vec<u8>) -> usize;

    /// バッファに書き込まれたバイト数を返す。
    fn buffer_space_used(&self) -> usize;

    /// 受信するPIDを`pids`に変更する。
    ///
    /// 変更後、読み取り側はバッファを先頭から読み直す。
    fn change_pid_mapping(&self, pids: &[Pid]);

    /// 同期バイトを探し直した回数を返す。
    fn sync_byte_searches(&self) -> u64 {
        0
    }

    /// 取りこぼしたサンプル数を返す。
    fn samples_dropped(&self) -> u64 {
        0
    }

    /// これまでに受け取った最大のサンプルの大きさを返す。
    fn max_sample_size(&self) -> usize {
        0
    }
}

/// メモリ上のバッファにTSを蓄える[`SampleDataProvider`]。
///
/// PIDの変更では何も捨てないため、読み取り側は蓄えたTSを繰り返し読むことになる。
#[derive(Debug, Default)]
pub struct MemoryDataProvider {
    buffer: RwLock<Vec<u8>>,
    pids: Mutex<Vec<Pid>>,
    pid_changes: AtomicU64,
    max_sample_size: AtomicUsize,
}

impl MemoryDataProvider {
    /// 空の`MemoryDataProvider`を生成する。
    #[inline]
    pub fn new() -> MemoryDataProvider {
        MemoryDataProvider::default()
    }

    /// `data`で初期化した`MemoryDataProvider`を生成する。
    pub fn with_data(data: Vec<u8>) -> MemoryDataProvider {
        let provider = MemoryDataProvider::new();
        provider.max_sample_size.store(data.len(), Ordering::Relaxed);
        *provider.buffer.write() = data;
        provider
    }

    /// サンプルをバッファの末尾に追加する。
    pub fn push(&self, sample: &[u8]) {
        self.max_sample_size
            .fetch_max(sample.len(), Ordering::Relaxed);
        self.buffer.write().extend_from_slice(sample);
    }

    /// 現在受信しているPIDを返す。
    #[inline]
    pub fn pid_mapping(&self) -> Vec<Pid> {
        self.pids.lock().clone()
    }

    /// PIDが変更された回数を返す。
    #[inline]
    pub fn pid_changes(&self) -> u64 {
        self.pid_changes.load(Ordering::Relaxed)
    }
}

impl SampleDataProvider for MemoryDataProvider {
    fn copy_buffer(&self, offset: usize, out: &mut Vec<u8>) -> usize {
        let buffer = self.buffer.read();
        let Some(data) = buffer.get(offset..) else {
            return 0;
        };
        out.extend_from_slice(data);
        data.len()
    }

    #[inline]
    fn buffer_space_used(&self) -> usize {
        self.buffer.read().len()
    }

    fn change_pid_mapping(&self, pids: &[Pid]) {
        log::debug!("pid mapping: {:?}", pids);
        *self.pids.lock() = pids.to_vec();
        self.pid_changes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn max_sample_size(&self) -> usize {
        self.max_sample_size.load(Ordering::Relaxed)
    }
}
