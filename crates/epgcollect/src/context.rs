//! 一回の収集で共有する状態。

use std::path::Path;
use std::time::SystemTime;

use anyhow::Context as _;
use chrono::{Duration, NaiveDateTime};
use dvbsi::huffman::{Dictionaries, TreeId};
use dvbsi::psi::desc::CollectionType;
use dvbsi::psi::table::PatProgram;
use dvbsi::text::TextDecoder;
use dvbsi::Pid;
use fxhash::FxHashMap;

use crate::category::{CategoryResolver, CategoryTable, CustomRule};
use crate::model::{StationKey, Stations};
use crate::offset::TimeOffsets;
use crate::options::{Options, OptionsError};

/// 分類表の種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    /// 事業者独自の分類表。
    Native,
    /// 汎用の分類表。
    Generic,
    /// 番組名や番組記述による独自の規則。
    Custom,
}

/// ネットワークやブーケから得た情報。
#[derive(Debug, Default, Clone)]
pub struct NetworkInfo {
    /// ネットワーク名。
    pub network_name: Option<String>,
    /// ブーケ名。
    pub bouquet_names: Vec<String>,
    /// TS（オリジナルネットワーク識別、TS識別）ごとの周波数（kHz）。
    pub frequencies: FxHashMap<(u16, u16), u32>,
    /// 局ごとの論理チャンネル番号。
    pub channel_numbers: FxHashMap<StationKey, u16>,
}

impl NetworkInfo {
    /// 周波数と論理チャンネル番号を局に反映する。
    pub fn apply(&self, stations: &mut Stations) {
        for station in stations.iter_mut() {
            let ts = (
                station.key.original_network_id,
                station.key.transport_stream_id,
            );
            if let Some(&frequency) = self.frequencies.get(&ts) {
                station.frequency = Some(frequency);
            }
            if let Some(&number) = self.channel_numbers.get(&station.key) {
                station.logical_channel_number = Some(number);
            }
        }
    }
}

/// 周波数ごとに初期化される状態。
#[derive(Debug, Default, Clone)]
pub(crate) struct ScanState {
    /// PATのTS識別。
    pub transport_stream_id: Option<u16>,
    /// PATに記載された番組。
    pub programs: Vec<PatProgram>,
    /// STTのGPSとUTCの差（秒）。
    pub gps_utc_offset: u8,
    /// MGTに記載されたEITのPID。
    pub eit_pids: Vec<Pid>,
    /// MGTに記載されたETTのPID。
    pub ett_pids: Vec<Pid>,
}

/// 一回の収集で使う辞書や分類表と、収集結果を保持する。
///
/// 収集中は収集スレッドのみが変更し、収集後に呼び出し側へ返される。
#[derive(Debug)]
pub struct RunContext {
    /// 設定。
    pub options: Options,
    /// 文字列の復号器。
    pub decoder: TextDecoder,
    /// 分類の解決。
    pub categories: CategoryResolver,
    /// 時差。
    pub offsets: TimeOffsets,
    /// 収集した局。
    pub stations: Stations,
    /// ネットワーク情報。
    pub network: NetworkInfo,
    /// ストリームから得た現在時刻（UTC）。
    pub stream_time: Option<NaiveDateTime>,
    pub(crate) scan: ScanState,
}

impl RunContext {
    /// `options`から`RunContext`を生成する。辞書と分類表は空となる。
    pub fn new(options: Options) -> Result<RunContext, OptionsError> {
        let text = options.text.to_text_options()?;
        Ok(RunContext {
            decoder: TextDecoder::new(text, Dictionaries::new()),
            categories: CategoryResolver::new(options.use_content_subtype),
            offsets: TimeOffsets::new(),
            stations: Stations::new(),
            network: NetworkInfo::default(),
            stream_time: None,
            scan: ScanState::default(),
            options,
        })
    }

    /// 収集する番組表の形式を返す。
    #[inline]
    pub fn collection_type(&self) -> CollectionType {
        self.options.collection.into()
    }

    /// ハフマン辞書を読み込む。
    pub fn load_dictionary(&mut self, id: TreeId, text: &str) -> anyhow::Result<()> {
        let dictionaries = self.decoder.dictionaries_mut();
        let result = match id {
            TreeId::Dish128 | TreeId::Dish255 => dictionaries.load_single(id, text),
            TreeId::Standard1 | TreeId::Standard2 => dictionaries.load_multi(id, text),
        };
        result.with_context(|| format!("failed to load dictionary {}", id))
    }

    /// ハフマン辞書をファイルから読み込む。
    pub fn load_dictionary_file(
        &mut self,
        id: TreeId,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.load_dictionary(id, &text)
    }

    /// 分類表を読み込む。
    pub fn load_categories(&mut self, kind: CategoryKind, text: &str) -> anyhow::Result<()> {
        match kind {
            CategoryKind::Native => self.categories.set_native(CategoryTable::parse(text)?),
            CategoryKind::Generic => self.categories.set_generic(CategoryTable::parse(text)?),
            CategoryKind::Custom => self.categories.set_custom(CustomRule::parse_rules(text)?),
        }
        Ok(())
    }

    /// 分類表をファイルから読み込む。
    pub fn load_categories_file(
        &mut self,
        kind: CategoryKind,
        path: impl AsRef<Path>,
    ) -> anyhow::Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.load_categories(kind, &text)
            .with_context(|| format!("failed to load {}", path.display()))
    }

    /// 周波数ごとの状態を初期化する。
    pub(crate) fn begin_frequency(&mut self) {
        self.scan = ScanState::default();
    }

    /// 現在時刻（UTC）を返す。
    ///
    /// ストリームから時刻を得ていなければシステムの時刻を返す。
    pub fn now(&self) -> NaiveDateTime {
        self.stream_time.unwrap_or_else(|| {
            chrono::DateTime::<chrono::Utc>::from(SystemTime::now()).naive_utc()
        })
    }

    /// 設定に従って時刻を丸める。
    #[inline]
    pub fn normalize_time(&self, time: NaiveDateTime) -> NaiveDateTime {
        if self.options.round_times {
            dvbsi::time::round_to_minute(time)
        } else {
            time
        }
    }

    /// `start_time`の番組が収集する日数の範囲内であれば`true`を返す。
    ///
    /// 日数が表せる日付を超える場合は制限なしとみなす。
    pub fn within_epg_days(&self, start_time: NaiveDateTime) -> bool {
        let Some(days) = self.options.epg_days else {
            return true;
        };
        match self.now().checked_add_signed(Duration::days(days.into())) {
            Some(limit) => start_time < limit,
            None => true,
        }
    }

    /// 番組表の時刻をUTCに変換する。
    ///
    /// 番組表が現地時刻で送られる設定であれば、TOTから選んだ時差を差し引く。
    #[inline]
    pub fn event_time_to_utc(&self, time: NaiveDateTime) -> NaiveDateTime {
        if self.options.local_event_times {
            self.offsets.local_to_utc(time)
        } else {
            time
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_load() {
        let mut ctx = RunContext::new(Options::default()).unwrap();
        ctx.load_dictionary(TreeId::Dish128, "0=a\n1=STOP\n").unwrap();
        assert!(ctx.decoder.dictionaries().is_loaded(TreeId::Dish128));
        assert!(ctx.load_dictionary(TreeId::Standard1, "garbage").is_err());

        ctx.load_categories(CategoryKind::Native, "1=Movie").unwrap();
        assert!(ctx.load_categories(CategoryKind::Generic, "x=Bad").is_err());

        let err = ctx
            .load_categories_file(CategoryKind::Custom, "/nonexistent/categories.cfg")
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/categories.cfg"));
    }

    #[test]
    fn test_epg_days() {
        let mut options = Options::default();
        options.epg_days = Some(2);
        options.round_times = true;
        let mut ctx = RunContext::new(options).unwrap();
        ctx.stream_time = Some(dt(1, 12));

        assert!(ctx.within_epg_days(dt(2, 12)));
        assert!(ctx.within_epg_days(dt(3, 11)));
        assert!(!ctx.within_epg_days(dt(3, 12)));
        assert!(!ctx.within_epg_days(dt(9, 0)));

        let time = dt(1, 12) + Duration::seconds(31);
        assert_eq!(ctx.normalize_time(time), dt(1, 12) + Duration::minutes(1));

        // 日付として表せないほど先なら制限しない
        ctx.options.epg_days = Some(u32::MAX);
        assert!(ctx.within_epg_days(dt(9, 0)));
        assert!(ctx.within_epg_days(NaiveDateTime::MAX));
    }

    #[test]
    fn test_invalid_text_options() {
        let mut options = Options::default();
        options.text.default_codepage = Some("klingon".to_string());
        assert_matches!(RunContext::new(options), Err(OptionsError::UnknownCodepage(_)));
    }
}
