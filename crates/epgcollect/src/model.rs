//! 収集結果となる局と番組情報のモデル。

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dvbsi::psi::desc::Advisory;
use dvbsi::psi::SectionMap;
use dvbsi::Pid;
use fxhash::FxBuildHasher;
use indexmap::IndexMap;

/// 局を一意に識別するキー。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize)]
pub struct StationKey {
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// サービス識別。
    pub service_id: u16,
}

impl StationKey {
    /// `StationKey`を生成する。
    #[inline]
    pub const fn new(
        original_network_id: u16,
        transport_stream_id: u16,
        service_id: u16,
    ) -> StationKey {
        StationKey {
            original_network_id,
            transport_stream_id,
            service_id,
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.original_network_id, self.transport_stream_id, self.service_id
        )
    }
}

/// 他局の番組表へのリンク。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpgLink {
    /// 番組表を持つ局。
    pub target: StationKey,
    /// 番組表の時刻に加えるずれ（分）。
    pub offset_minutes: i16,
}

/// 番組のパレンタルレート。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParentalRating {
    /// 放送されたままの値。
    pub raw: Option<u8>,
    /// 正規化したレート（`"12+"`や`"TV-14"`など）。
    pub rating: Option<String>,
    /// レートの体系（`"DVB"`や`"MPAA"`など）。
    pub system: Option<String>,
}

/// 番組の分類。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// 大分類。
    pub main: u8,
    /// 中分類。
    pub sub: u8,
    /// 分類の説明。
    pub description: String,
}

/// 番組情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgEntry {
    /// 番組が属する局。
    pub station: StationKey,
    /// イベント識別。
    pub event_id: u16,
    /// 開始時刻（UTC）。
    pub start_time: NaiveDateTime,
    /// 番組の長さ。
    pub duration: Duration,
    /// 番組名。
    pub title: String,
    /// 副題。
    pub subtitle: String,
    /// 番組記述。
    pub description: String,
    /// パレンタルレート。
    pub parental_rating: ParentalRating,
    /// 分類。
    pub category: Option<Category>,
    /// 評価（`*`と`+`による表記）。
    pub star_rating: Option<&'static str>,
    /// 出演者。
    pub cast: Vec<String>,
    /// シリーズ識別。
    pub series_id: Option<u32>,
    /// シーズン番号。
    pub season: Option<u16>,
    /// エピソード番号。
    pub episode: Option<u16>,
    /// シリーズのCRID。
    pub series_crid: Option<String>,
    /// エピソードのCRID。
    pub episode_crid: Option<String>,
    /// 内容に関する注意事項。
    pub advisory: Advisory,
    /// 前回の放送日。未放送であれば`None`。
    pub previous_play_date: Option<NaiveDate>,
    /// HD映像。
    pub high_definition: bool,
    /// 字幕あり。
    pub subtitles: bool,
    /// ステレオ音声。
    pub stereo: bool,
}

impl EpgEntry {
    /// 最低限の情報で`EpgEntry`を生成する。
    pub fn new(
        station: StationKey,
        event_id: u16,
        start_time: NaiveDateTime,
        duration: Duration,
    ) -> EpgEntry {
        EpgEntry {
            station,
            event_id,
            start_time,
            duration,
            title: String::new(),
            subtitle: String::new(),
            description: String::new(),
            parental_rating: ParentalRating::default(),
            category: None,
            star_rating: None,
            cast: Vec::new(),
            series_id: None,
            season: None,
            episode: None,
            series_crid: None,
            episode_crid: None,
            advisory: Advisory::default(),
            previous_play_date: None,
            high_definition: false,
            subtitles: false,
            stereo: false,
        }
    }

    /// 終了時刻を返す。
    #[inline]
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + self.duration
    }

    /// `station`の番組として複製する。
    pub fn clone_for(&self, station: StationKey) -> EpgEntry {
        EpgEntry {
            station,
            ..self.clone()
        }
    }

    /// 同じ番組の別の情報から、未設定の項目を埋める。
    pub fn merge_from(&mut self, other: EpgEntry) {
        fn fill_str(dst: &mut String, src: String) {
            if dst.is_empty() {
                *dst = src;
            }
        }
        fn fill<T>(dst: &mut Option<T>, src: Option<T>) {
            if dst.is_none() {
                *dst = src;
            }
        }

        fill_str(&mut self.title, other.title);
        fill_str(&mut self.subtitle, other.subtitle);
        fill_str(&mut self.description, other.description);
        if self.parental_rating.rating.is_none() {
            self.parental_rating = other.parental_rating;
        }
        fill(&mut self.category, other.category);
        fill(&mut self.star_rating, other.star_rating);
        if self.cast.is_empty() {
            self.cast = other.cast;
        }
        fill(&mut self.series_id, other.series_id);
        fill(&mut self.season, other.season);
        fill(&mut self.episode, other.episode);
        fill(&mut self.series_crid, other.series_crid);
        fill(&mut self.episode_crid, other.episode_crid);
        self.advisory = Advisory(self.advisory.0 | other.advisory.0);
        self.high_definition |= other.high_definition;
        self.subtitles |= other.subtitles;
        self.stereo |= other.stereo;
    }
}

/// 局。
#[derive(Debug, Clone)]
pub struct Station {
    /// 局の識別子。
    pub key: StationKey,
    /// 局名。
    pub name: String,
    /// 事業者名。
    pub provider: String,
    /// 周波数（kHz）。
    pub frequency: Option<u32>,
    /// サービス形式種別。
    pub service_type: u8,
    /// スクランブルされているかどうか。
    pub encrypted: bool,
    /// スケジュールの番組表が送出されているかどうか。
    pub eit_schedule: bool,
    /// 現在と次の番組情報が送出されているかどうか。
    pub eit_present_following: bool,
    /// 番組表へのリンク。
    pub epg_link: Option<EpgLink>,
    /// 限定受信方式の識別。
    pub ca_system_ids: Vec<u16>,
    /// 論理チャンネル番号。
    pub logical_channel_number: Option<u16>,
    /// ATSCのソース識別。
    pub source_id: Option<u16>,
    /// ATSCの副チャンネル番号。
    pub minor_channel_number: Option<u16>,
    /// MHEG5のDSMCCが送出されるPID。
    pub dsmcc_pid: Option<Pid>,
    /// 番組表を出力しない局であれば`true`。
    pub excluded: bool,
    /// 処理済みのEITセクション。
    pub sections: SectionMap,
    /// 番組情報。
    pub epg: Vec<EpgEntry>,
}

impl Station {
    /// 空の局を生成する。
    pub fn new(key: StationKey) -> Station {
        Station {
            key,
            name: String::new(),
            provider: String::new(),
            frequency: None,
            service_type: 0,
            encrypted: false,
            eit_schedule: false,
            eit_present_following: false,
            epg_link: None,
            ca_system_ids: Vec::new(),
            logical_channel_number: None,
            source_id: None,
            minor_channel_number: None,
            dsmcc_pid: None,
            excluded: false,
            sections: SectionMap::new(),
            epg: Vec::new(),
        }
    }

    /// 番組情報を追加する。
    ///
    /// 開始時刻が同じ番組が既にあれば置き換える。
    pub fn add_entry(&mut self, entry: EpgEntry) {
        match self
            .epg
            .binary_search_by_key(&entry.start_time, |e| e.start_time)
        {
            Ok(i) => self.epg[i] = entry,
            Err(i) => self.epg.insert(i, entry),
        }
    }

    /// 番組情報を追加する。
    ///
    /// 開始時刻とイベント識別が同じ番組が既にあれば、その番組の未設定の項目を埋める。
    pub fn merge_entry(&mut self, entry: EpgEntry) {
        let existing = self
            .epg
            .iter_mut()
            .find(|e| e.start_time == entry.start_time && e.event_id == entry.event_id);
        match existing {
            Some(existing) => existing.merge_from(entry),
            None => self.add_entry(entry),
        }
    }
}

/// 局の一覧。
///
/// 挿入順が保たれ、その順序は重複検出で同着を解消するために使われる。
#[derive(Debug, Default, Clone)]
pub struct Stations(IndexMap<StationKey, Station, FxBuildHasher>);

impl Stations {
    /// 空の`Stations`を生成する。
    #[inline]
    pub fn new() -> Stations {
        Stations::default()
    }

    /// 局の数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 局が一つもなければ`true`を返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `key`の局を返す。
    #[inline]
    pub fn get(&self, key: &StationKey) -> Option<&Station> {
        self.0.get(key)
    }

    /// `key`の局を可変参照で返す。
    #[inline]
    pub fn get_mut(&mut self, key: &StationKey) -> Option<&mut Station> {
        self.0.get_mut(key)
    }

    /// `key`の局を返し、なければ追加してから返す。
    #[inline]
    pub fn get_or_insert(&mut self, key: StationKey) -> &mut Station {
        self.0.entry(key).or_insert_with(|| Station::new(key))
    }

    /// 挿入順で局を返すイテレーターを返す。
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.0.values()
    }

    /// 挿入順で局を可変参照で返すイテレーターを返す。
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.0.values_mut()
    }

    /// 挿入順で`index`番目の局を可変参照で返す。
    #[inline]
    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut Station> {
        self.0.get_index_mut(index).map(|(_, s)| s)
    }

    /// 番組情報の送り先を探す。
    ///
    /// `key`の局があればその局のみを、なければ`key`へのリンクを持つすべての局を、
    /// リンクの時刻のずれ（分）とともに返す。
    pub fn locate(&self, key: &StationKey) -> Vec<(StationKey, i16)> {
        if self.0.contains_key(key) {
            return vec![(*key, 0)];
        }

        self.0
            .values()
            .filter_map(|s| match s.epg_link {
                Some(link) if link.target == *key => Some((s.key, link.offset_minutes)),
                _ => None,
            })
            .collect()
    }

    /// サービス識別が`service_id`である局を探す。
    pub fn find_by_service_id(
        &mut self,
        transport_stream_id: u16,
        service_id: u16,
    ) -> impl Iterator<Item = &mut Station> {
        self.0.values_mut().filter(move |s| {
            s.key.transport_stream_id == transport_stream_id && s.key.service_id == service_id
        })
    }

    /// ATSCのソース識別が`source_id`である局を返す。
    pub fn find_by_source_id(&mut self, source_id: u16) -> Option<&mut Station> {
        self.0
            .values_mut()
            .find(|s| s.source_id == Some(source_id))
    }

    /// 全局の番組数を返す。
    pub fn entry_count(&self) -> usize {
        self.0.values().map(|s| s.epg.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_add_entry() {
        let key = StationKey::new(1, 2, 3);
        let mut station = Station::new(key);
        station.add_entry(EpgEntry::new(key, 2, dt(21, 0), Duration::minutes(30)));
        station.add_entry(EpgEntry::new(key, 1, dt(20, 0), Duration::minutes(60)));
        let mut replaced = EpgEntry::new(key, 3, dt(21, 0), Duration::minutes(45));
        replaced.title = "News".to_string();
        station.add_entry(replaced);

        assert_eq!(station.epg.len(), 2);
        assert_eq!(station.epg[0].event_id, 1);
        assert_eq!(station.epg[1].event_id, 3);
        assert_eq!(station.epg[1].end_time(), dt(21, 45));
    }

    #[test]
    fn test_merge_entry() {
        let key = StationKey::new(1, 2, 3);
        let mut station = Station::new(key);
        let mut entry = EpgEntry::new(key, 7, dt(20, 0), Duration::minutes(30));
        entry.title = "Film".to_string();
        station.merge_entry(entry);

        let mut extended = EpgEntry::new(key, 7, dt(20, 0), Duration::minutes(30));
        extended.title = "Other".to_string();
        extended.description = "A long description".to_string();
        extended.stereo = true;
        station.merge_entry(extended);

        assert_eq!(station.epg.len(), 1);
        assert_eq!(station.epg[0].title, "Film");
        assert_eq!(station.epg[0].description, "A long description");
        assert!(station.epg[0].stereo);
    }

    #[test]
    fn test_locate() {
        let mut stations = Stations::new();
        let direct = StationKey::new(1, 1, 100);
        let target = StationKey::new(1, 1, 900);
        stations.get_or_insert(direct);
        for (sid, offset) in [(200, 0), (201, 60)] {
            stations.get_or_insert(StationKey::new(1, 1, sid)).epg_link = Some(EpgLink {
                target,
                offset_minutes: offset,
            });
        }

        assert_eq!(stations.locate(&direct), [(direct, 0)]);
        assert_eq!(
            stations.locate(&target),
            [(StationKey::new(1, 1, 200), 0), (StationKey::new(1, 1, 201), 60)]
        );
        assert!(stations.locate(&StationKey::new(9, 9, 9)).is_empty());
    }

    #[test]
    fn test_insertion_order() {
        let mut stations = Stations::new();
        for sid in [30, 10, 20] {
            stations.get_or_insert(StationKey::new(1, 1, sid));
        }
        stations.get_or_insert(StationKey::new(1, 1, 10)).name = "BBC".to_string();

        let sids: Vec<_> = stations.iter().map(|s| s.key.service_id).collect();
        assert_eq!(sids, [30, 10, 20]);
        assert_eq!(stations.len(), 3);
    }
}
