//! テーブルごとの収集器と、収集器を動かすポーリングループ。

mod atsc;
mod eit;
mod si;

pub use atsc::{AtscEventCollector, AtscGuideCollector};
pub use eit::{DishCollector, EitCollector};
pub use si::{BatCollector, NitCollector, PatCollector, PmtCollector, SdtCollector, TotCollector};

use dvbsi::Pid;

use crate::context::RunContext;
use crate::options::Collection;
use crate::reader::{Section, SectionSource, TableFilter};
use crate::worker::PollTimer;

/// セクションを処理した結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// 新しい情報を含んでいた。
    Useful,
    /// 処理済みのセクションの繰り返しだった。
    Repeat,
    /// 対象外か不正なセクションだった。
    Discarded,
}

/// ポーリングループの結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// 収集を終えた。
    Completed {
        /// 処理したセクション数。
        processed: usize,
    },
    /// 中断された。
    Cancelled {
        /// 処理したセクション数。
        processed: usize,
    },
}

/// 特定のテーブルを収集し、[`RunContext`]に反映する。
pub trait TableCollector {
    /// ログに出力する名前を返す。
    fn name(&self) -> &'static str;

    /// 受信するPIDを返す。
    ///
    /// 空の場合は何も受信せずに収集を終える。
    fn pids(&self, ctx: &RunContext) -> Vec<Pid>;

    /// 受け付けるテーブル識別を返す。
    fn tables(&self) -> TableFilter;

    /// セクションを処理する。
    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed;

    /// テーブルがすべて揃っていれば`true`を返す。
    #[inline]
    fn is_complete(&self, ctx: &RunContext) -> bool {
        let _ = ctx;
        false
    }

    /// 収集を終えた後に一度だけ呼ばれる。
    #[inline]
    fn finish(&mut self, ctx: &mut RunContext) {
        let _ = ctx;
    }
}

/// `collection`の番組表を収集するための収集器を、動かす順に返す。
pub fn collectors_for(collection: Collection) -> Vec<Box<dyn TableCollector>> {
    match collection {
        Collection::Dvb => vec![
            Box::new(SdtCollector::new()),
            Box::new(NitCollector::new()),
            Box::new(PatCollector::new()),
            Box::new(PmtCollector::new()),
            Box::new(BatCollector::new()),
            Box::new(TotCollector::new()),
            Box::new(EitCollector::new()),
        ],
        Collection::DishNetwork => vec![
            Box::new(SdtCollector::new()),
            Box::new(NitCollector::new()),
            Box::new(BatCollector::new()),
            Box::new(TotCollector::new()),
            Box::new(DishCollector::new()),
        ],
        Collection::Atsc => vec![
            Box::new(AtscGuideCollector::new()),
            Box::new(AtscEventCollector::new()),
        ],
    }
}

/// `collector`が収集を終えるか中断されるまでポーリングする。
///
/// テーブルが揃うか、新しい情報のないポーリングが設定された回数続くと収集を終え、
/// [`TableCollector::finish`]を呼ぶ。
/// 中断は各ポーリングの先頭で確認し、中断された場合は`finish`を呼ばずに戻る。
pub fn run(
    collector: &mut dyn TableCollector,
    ctx: &mut RunContext,
    source: &dyn SectionSource,
    timer: &PollTimer,
) -> PollOutcome {
    let mut processed = 0;

    let pids = collector.pids(ctx);
    if pids.is_empty() {
        log::debug!("{}: nothing to receive", collector.name());
        if timer.is_cancelled() {
            return PollOutcome::Cancelled { processed };
        }
        collector.finish(ctx);
        return PollOutcome::Completed { processed };
    }

    log::debug!("{}: receiving {:?}", collector.name(), pids);
    source.retarget(&pids, collector.tables());

    let threshold = ctx.options.repeat_threshold.max(1);
    let interval = ctx.options.poll_interval();
    let mut idle = 0;
    loop {
        if timer.is_cancelled() {
            return PollOutcome::Cancelled { processed };
        }

        let sections = source.drain();
        let mut useful = 0;
        for section in &sections {
            if collector.process(ctx, section) == Processed::Useful {
                useful += 1;
            }
        }
        processed += sections.len();

        if collector.is_complete(ctx) {
            log::debug!("{}: complete", collector.name());
            break;
        }

        // 読み取りが追いつく前の空振りは数えない
        if useful == 0 && (!sections.is_empty() || source.is_caught_up()) {
            idle += 1;
            if idle >= threshold {
                log::debug!("{}: no new sections in {} polls", collector.name(), idle);
                break;
            }
        } else {
            idle = 0;
        }

        timer.wait(interval);
    }

    collector.finish(ctx);
    PollOutcome::Completed { processed }
}
