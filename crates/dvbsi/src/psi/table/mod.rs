//! PSI/SIテーブルの定義。

mod atsc;
mod dvb;

pub use atsc::*;
pub use dvb::*;
