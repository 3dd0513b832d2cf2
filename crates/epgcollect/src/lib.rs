//! TSから番組表と局の情報を収集するクレート。
//!
//! [`collect_frequency`]で一つの周波数の収集を別スレッドで行い、
//! すべての周波数の収集を終えてから[`merge::run`]で局をまたいだ整理を行う。

#![deny(missing_docs)]

pub mod category;
pub mod collector;
pub mod context;
pub mod merge;
pub mod model;
pub mod offset;
pub mod options;
pub mod provider;
pub mod reader;
pub mod worker;

#[cfg(test)]
mod test_util;

pub use context::{CategoryKind, RunContext};
pub use model::{EpgEntry, Station, StationKey, Stations};
pub use options::Options;
pub use provider::{MemoryDataProvider, SampleDataProvider};
pub use worker::{collect_frequency, CancelToken, CollectHandle, CollectStatus};
