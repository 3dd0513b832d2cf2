//! 一つの周波数の収集を別スレッドで行う。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::sync::{Parker, Unparker};

use crate::collector::{self, PollOutcome};
use crate::context::RunContext;
use crate::provider::SampleDataProvider;
use crate::reader::SectionReader;

/// 協調的な中断を要求するためのトークン。
///
/// 複製したトークンはすべて同じ状態を共有する。
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    unparker: Unparker,
}

impl CancelToken {
    /// 中断を要求し、待機中のポーリングを起こす。
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.unparker.unpark();
    }

    /// 中断が要求されているかどうかを返す。
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// ポーリングの間隔を待つためのタイマー。
///
/// 中断が要求されると待機を打ち切る。
#[derive(Debug)]
pub struct PollTimer {
    parker: Parker,
    token: CancelToken,
}

impl PollTimer {
    /// `PollTimer`を生成する。
    pub fn new() -> PollTimer {
        let parker = Parker::new();
        let token = CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            unparker: parker.unparker().clone(),
        };
        PollTimer { parker, token }
    }

    /// このタイマーの待機を打ち切ることのできるトークンを返す。
    #[inline]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// 中断が要求されているかどうかを返す。
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 最大で`timeout`だけ待つ。中断が要求されていれば待たずに戻る。
    pub fn wait(&self, timeout: Duration) {
        if !self.is_cancelled() {
            self.parker.park_timeout(timeout);
        }
    }
}

impl Default for PollTimer {
    fn default() -> PollTimer {
        PollTimer::new()
    }
}

/// 収集の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStatus {
    /// すべてのテーブルを収集し終えた。
    Completed,
    /// 中断された。
    Cancelled,
}

/// [`collect_frequency`]で起動した収集を操作するためのハンドル。
#[derive(Debug)]
pub struct CollectHandle {
    token: CancelToken,
    handle: std::thread::JoinHandle<(RunContext, CollectStatus)>,
}

impl CollectHandle {
    /// 中断を要求する。
    #[inline]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 中断を要求するためのトークンを返す。
    #[inline]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// 収集の終了を待ち、収集結果を保持した[`RunContext`]を返す。
    pub fn join(self) -> anyhow::Result<(RunContext, CollectStatus)> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("collector thread panicked"))
    }
}

/// `ctx`の設定に従って、`provider`が受信している周波数の番組表を別スレッドで収集する。
///
/// 収集結果は[`CollectHandle::join`]で返される`RunContext`に蓄積される。
pub fn collect_frequency(
    mut ctx: RunContext,
    provider: Arc<dyn SampleDataProvider>,
) -> CollectHandle {
    let timer = PollTimer::new();
    let token = timer.token().clone();

    let handle = std::thread::spawn(move || {
        let reader = SectionReader::spawn(provider);
        ctx.begin_frequency();

        let mut collectors = collector::collectors_for(ctx.options.collection);
        for collector in &mut collectors {
            match collector::run(&mut **collector, &mut ctx, &reader, &timer) {
                PollOutcome::Completed { processed } => {
                    log::info!("{}: completed with {} sections", collector.name(), processed);
                }
                PollOutcome::Cancelled { processed } => {
                    log::info!("{}: cancelled after {} sections", collector.name(), processed);
                    return (ctx, CollectStatus::Cancelled);
                }
            }
        }

        let stats = reader.stats();
        log::info!(
            "collected {} stations, {} entries ({} packets, {} discontinuities)",
            ctx.stations.len(),
            ctx.stations.entry_count(),
            stats.demux.packets,
            stats.demux.discontinuities,
        );
        (ctx, CollectStatus::Completed)
    });

    CollectHandle { token, handle }
}
