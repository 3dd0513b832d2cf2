//! 国・地域ごとの時差。

use chrono::{Duration, NaiveDateTime};
use dvbsi::lang::LangCode;
use dvbsi::psi::desc::LocalTimeOffset;

/// 国・地域ごとの時差と、予定されている時差の変更。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOffsetEntry {
    /// 国コード。
    pub country_code: LangCode,
    /// 地域識別。
    pub region: u8,
    /// 現在の時差。
    pub offset: Duration,
    /// 時差が変わる日時（UTC）。
    pub time_of_change: Option<NaiveDateTime>,
    /// 変更後の時差。
    pub next_offset: Duration,
}

impl TimeOffsetEntry {
    /// `at`（UTC）における時差を返す。
    pub fn offset_at(&self, at: NaiveDateTime) -> Duration {
        match self.time_of_change {
            Some(change) if at >= change => self.next_offset,
            _ => self.offset,
        }
    }
}

impl From<&LocalTimeOffset> for TimeOffsetEntry {
    fn from(value: &LocalTimeOffset) -> TimeOffsetEntry {
        TimeOffsetEntry {
            country_code: value.country_code,
            region: value.country_region_id,
            offset: value.local_time_offset,
            time_of_change: value.time_of_change,
            next_offset: value.next_time_offset,
        }
    }
}

/// 収集した時差の一覧と、そこから選んだ現在の時差。
#[derive(Debug, Default, Clone)]
pub struct TimeOffsets {
    entries: Vec<TimeOffsetEntry>,
    current: Option<TimeOffsetEntry>,
}

impl TimeOffsets {
    /// 空の一覧を生成する。
    #[inline]
    pub fn new() -> TimeOffsets {
        TimeOffsets::default()
    }

    /// 時差を追加する。同じ国・地域の時差があれば置き換える。
    pub fn insert(&mut self, entry: TimeOffsetEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.country_code == entry.country_code && e.region == entry.region)
        {
            Some(e) => *e = entry,
            None => self.entries.push(entry),
        }
    }

    /// 収集した時差を返す。
    #[inline]
    pub fn entries(&self) -> &[TimeOffsetEntry] {
        &self.entries
    }

    /// 選択された現在の時差を返す。
    #[inline]
    pub fn current(&self) -> Option<&TimeOffsetEntry> {
        self.current.as_ref()
    }

    /// 収集した時差から現在の時差を選ぶ。
    ///
    /// 候補が一つならそれを、複数あれば`country`と`region`で絞り込んで一つに決まればそれを選ぶ。
    /// 決まらない場合は時差なしとなる。
    pub fn select_current(
        &mut self,
        country: Option<&str>,
        region: Option<u8>,
    ) -> Option<&TimeOffsetEntry> {
        self.current = match &*self.entries {
            [] => None,
            [entry] => Some(*entry),
            entries => {
                let mut candidates = entries.iter().filter(|e| {
                    country.map_or(true, |c| e.country_code.matches(c))
                        && region.map_or(true, |r| e.region == r)
                });
                match (candidates.next(), candidates.next()) {
                    (Some(entry), None) => Some(*entry),
                    _ => {
                        log::info!("no unique local time offset for {:?}/{:?}", country, region);
                        None
                    }
                }
            }
        };
        self.current.as_ref()
    }

    /// `at`（UTC）における現在の時差を返す。選択されていなければ0を返す。
    #[inline]
    pub fn offset_at(&self, at: NaiveDateTime) -> Duration {
        self.current.map_or(Duration::zero(), |e| e.offset_at(at))
    }

    /// 現地時刻をUTCに変換する。
    pub fn local_to_utc(&self, local: NaiveDateTime) -> NaiveDateTime {
        let Some(entry) = &self.current else {
            return local;
        };

        // 変更日時はUTCのため、変更前の時差で見積もってから判定する
        let utc = local - entry.offset;
        local - entry.offset_at(utc)
    }

    /// UTCを現地時刻に変換する。
    #[inline]
    pub fn utc_to_local(&self, utc: NaiveDateTime) -> NaiveDateTime {
        utc + self.offset_at(utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn entry(country: &[u8; 3], region: u8, hours: i64) -> TimeOffsetEntry {
        TimeOffsetEntry {
            country_code: LangCode(*country),
            region,
            offset: Duration::hours(hours),
            time_of_change: Some(dt(3, 31, 1)),
            next_offset: Duration::hours(hours + 1),
        }
    }

    #[test]
    fn test_select_single() {
        let mut offsets = TimeOffsets::new();
        assert_eq!(offsets.select_current(Some("GBR"), None), None);
        assert_eq!(offsets.offset_at(dt(1, 1, 0)), Duration::zero());

        offsets.insert(entry(b"GBR", 0, 0));
        offsets.insert(entry(b"GBR", 0, 0));
        assert_eq!(offsets.entries().len(), 1);
        // 候補が一つなら国コードに関わらず選ばれる
        assert!(offsets.select_current(Some("DEU"), None).is_some());
    }

    #[test]
    fn test_select_multiple() {
        let mut offsets = TimeOffsets::new();
        offsets.insert(entry(b"ESP", 0, 1));
        offsets.insert(entry(b"ESP", 1, 0));
        offsets.insert(entry(b"PRT", 0, 0));

        assert_eq!(offsets.select_current(None, None), None);
        assert_eq!(offsets.select_current(Some("ESP"), None), None);
        let current = offsets.select_current(Some("ESP"), Some(1)).unwrap();
        assert_eq!(current.region, 1);
        let current = offsets.select_current(Some("PRT"), None).unwrap();
        assert_eq!(current.country_code, LangCode(*b"PRT"));
    }

    #[test]
    fn test_local_to_utc() {
        let mut offsets = TimeOffsets::new();
        offsets.insert(entry(b"DEU", 0, 1));
        offsets.select_current(None, None);

        assert_eq!(offsets.local_to_utc(dt(1, 1, 20)), dt(1, 1, 19));
        // 変更後は夏時間
        assert_eq!(offsets.local_to_utc(dt(6, 1, 20)), dt(6, 1, 18));
        assert_eq!(offsets.utc_to_local(dt(6, 1, 18)), dt(6, 1, 20));
    }
}
