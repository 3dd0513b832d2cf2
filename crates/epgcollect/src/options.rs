//! 収集の設定。
//!
//! 設定はTOMLで記述し、[`Options::from_toml_str`]で読み込む。
//! すべての項目は省略可能で、省略時は既定値となる。

use dvbsi::psi::desc::CollectionType;
use dvbsi::text::{
    ParseReplaceModeError, ParseSubstitutionError, ReplaceMode, Substitution, TextOptions,
};
use thiserror::Error;

use crate::model::StationKey;

/// 設定の読み込みで発生するエラー。
#[derive(Debug, Error)]
pub enum OptionsError {
    /// TOMLとして不正。
    #[error("invalid options: {0}")]
    Toml(#[from] toml::de::Error),

    /// 制御符号の扱いが不正。
    #[error(transparent)]
    ReplaceMode(#[from] ParseReplaceModeError),

    /// 置換表が不正。
    #[error(transparent)]
    Substitution(#[from] ParseSubstitutionError),

    /// 文字符号化方式のラベルが不明。
    #[error("unknown codepage `{0}`")]
    UnknownCodepage(String),
}

/// 収集する番組表の形式。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    /// DVBのEIT。
    #[default]
    Dvb,
    /// 事業者形式の番組表。
    DishNetwork,
    /// ATSC PSIP。
    Atsc,
}

impl From<Collection> for CollectionType {
    #[inline]
    fn from(value: Collection) -> CollectionType {
        match value {
            Collection::Dvb => CollectionType::Dvb,
            Collection::DishNetwork => CollectionType::DishNetwork,
            Collection::Atsc => CollectionType::Atsc,
        }
    }
}

/// 再放送と判定した番組に設定する前回放送日の決め方。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatPolicy {
    /// 固定の日付（1900年1月1日）を設定する。
    #[default]
    Sentinel,
    /// 同じ番組のうち最も早い放送の日付を設定する。
    EarliestDate,
}

/// 時差放送局の設定。
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TimeShift {
    /// 番組表の複製元。
    pub source: StationKey,
    /// 番組表の複製先。
    pub destination: StationKey,
    /// 開始時刻に加える時間。
    pub offset_hours: i32,
}

/// 文字列復号の設定。
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TextSection {
    /// 制御符号の扱い（`ignore`、`space`、`unchanged`、`convert`、`table`）。
    pub replace_mode: Option<String>,
    /// `C28A=20`形式の置換表。
    pub substitutions: Vec<String>,
    /// 制御バイトがない場合の文字符号化方式のラベル。
    pub default_codepage: Option<String>,
}

impl TextSection {
    /// [`TextOptions`]に変換する。
    pub fn to_text_options(&self) -> Result<TextOptions, OptionsError> {
        let mut options = TextOptions::default();
        if let Some(mode) = &self.replace_mode {
            options.replace_mode = mode.parse::<ReplaceMode>()?;
        }
        options.substitutions = self
            .substitutions
            .iter()
            .map(|s| s.parse::<Substitution>())
            .collect::<Result<_, _>>()?;
        if let Some(label) = &self.default_codepage {
            if !options.set_default_codepage(label) {
                return Err(OptionsError::UnknownCodepage(label.clone()));
            }
        }
        Ok(options)
    }
}

/// 収集の設定。
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Options {
    /// 収集する番組表の形式。
    pub collection: Collection,
    /// 開始・終了時刻を分単位に丸める。
    pub round_times: bool,
    /// ジャンルの中分類まで使って分類を探す。
    pub use_content_subtype: bool,
    /// 番組表に現れたが局の情報がない局を作成する。
    pub create_missing_channels: bool,
    /// 同時刻に放送される同じ番組を再放送とみなさない。
    pub no_simulcast_repeats: bool,
    /// 再放送を検出する。
    pub detect_repeats: bool,
    /// 再放送と判定した番組の前回放送日の決め方。
    pub repeat_policy: RepeatPolicy,
    /// 新しいセクションがないまま何回ポーリングしたら収集を終えるか。
    pub repeat_threshold: u32,
    /// ポーリングの間隔（ミリ秒）。
    pub poll_interval_ms: u64,
    /// 何日先までの番組を収集するか。
    pub epg_days: Option<u32>,
    /// 番組表の時刻を現地時刻として扱い、TOTの時差でUTCに変換する。
    pub local_event_times: bool,
    /// 再放送の検出で番組名と番組記述から取り除く語句。
    pub ignored_phrases: Vec<String>,
    /// 番組名か番組記述に含まれていれば再放送の検出から除く語句。
    pub duplicate_exclusions: Vec<String>,
    /// 時差放送局。
    pub time_shifts: Vec<TimeShift>,
    /// 番組表を出力しない局。
    pub excluded_stations: Vec<StationKey>,
    /// 同じ名前の局で番組表を共有する。
    pub duplicate_same_name_channels: bool,
    /// 時差の選択に使う国コード。
    pub country_code: Option<String>,
    /// 時差の選択に使う地域識別。
    pub region: Option<u8>,
    /// 文字列復号の設定。
    pub text: TextSection,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            collection: Collection::default(),
            round_times: false,
            use_content_subtype: false,
            create_missing_channels: false,
            no_simulcast_repeats: false,
            detect_repeats: false,
            repeat_policy: RepeatPolicy::default(),
            repeat_threshold: 5,
            poll_interval_ms: 2000,
            epg_days: None,
            local_event_times: false,
            ignored_phrases: Vec::new(),
            duplicate_exclusions: Vec::new(),
            time_shifts: Vec::new(),
            excluded_stations: Vec::new(),
            duplicate_same_name_channels: false,
            country_code: None,
            region: None,
            text: TextSection::default(),
        }
    }
}

impl Options {
    /// TOML形式の文字列から設定を読み込む。
    ///
    /// 文字列復号の設定もここで検証する。
    pub fn from_toml_str(s: &str) -> Result<Options, OptionsError> {
        let options: Options = toml::from_str(s)?;
        options.text.to_text_options()?;
        Ok(options)
    }

    /// `key`の局が除外されているかどうかを返す。
    #[inline]
    pub fn is_excluded(&self, key: &StationKey) -> bool {
        self.excluded_stations.contains(key)
    }

    /// ポーリングの間隔を返す。
    #[inline]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}
