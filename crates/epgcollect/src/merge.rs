//! 収集を終えた局の番組表を局をまたいで整理する。
//!
//! 同名局への番組表の複製、時差放送局の生成、再放送の検出の三つを順に行う。
//! いずれも入力が変わらなければ何度実行しても同じ結果になる。

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::Stations;
use crate::options::{Options, RepeatPolicy, TimeShift};

/// [`run`]で行った処理の件数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// 同名局から番組表を複製した局の数。
    pub duplicated_stations: usize,
    /// 時差放送局として生成した番組の数。
    pub shifted_entries: usize,
    /// 再放送と判定した番組の数。
    pub repeats: usize,
}

/// 固定の前回放送日（1900年1月1日）を返す。
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// 設定に従ってすべての整理を行う。
pub fn run(options: &Options, stations: &mut Stations) -> MergeSummary {
    let mut summary = MergeSummary::default();
    if options.duplicate_same_name_channels {
        summary.duplicated_stations = duplicate_same_name(stations);
    }
    summary.shifted_entries = apply_time_shifts(&options.time_shifts, stations);
    if options.detect_repeats {
        summary.repeats = detect_repeats(options, stations);
    }

    log::info!(
        "merged: {} duplicated stations, {} shifted entries, {} repeats",
        summary.duplicated_stations,
        summary.shifted_entries,
        summary.repeats,
    );
    summary
}

/// 同じ名前の局に番組表を複製する。
///
/// 名前の順に並べた局のうち同じ名前が続く範囲ごとに、番組表を持つ最初の局の番組表で
/// 他の局の番組表を置き換える。名前の同じ局の間では挿入順を保つ。
/// 番組表を置き換えた局の数を返す。
pub fn duplicate_same_name(stations: &mut Stations) -> usize {
    let mut order: Vec<(String, usize)> = stations
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.excluded && !s.name.is_empty())
        .map(|(i, s)| (s.name.clone(), i))
        .collect();
    order.sort_by(|a, b| a.0.cmp(&b.0));

    let mut duplicated = 0;
    for run in order.chunk_by(|a, b| a.0 == b.0) {
        if run.len() < 2 {
            continue;
        }

        let source = run.iter().find_map(|&(_, i)| {
            let station = stations.get_index_mut(i)?;
            (!station.epg.is_empty()).then(|| (i, station.epg.clone()))
        });
        let Some((source, epg)) = source else {
            continue;
        };

        for &(_, i) in run.iter().filter(|&&(_, i)| i != source) {
            let Some(station) = stations.get_index_mut(i) else {
                continue;
            };
            let key = station.key;
            station.epg = epg.iter().map(|e| e.clone_for(key)).collect();
            duplicated += 1;
            log::debug!("{}: duplicated {} entries from {}", key, epg.len(), run[0].0);
        }
    }
    duplicated
}

/// 時差放送局の番組表を生成する。
///
/// 複製先の番組表を消去してから、複製元の番組を開始時刻をずらして追加する。
/// 生成した番組の数を返す。
pub fn apply_time_shifts(time_shifts: &[TimeShift], stations: &mut Stations) -> usize {
    let mut shifted = 0;
    for shift in time_shifts {
        let Some(source) = stations.get(&shift.source) else {
            log::warn!("time shift: source {} not found", shift.source);
            continue;
        };
        let offset = Duration::hours(shift.offset_hours as i64);
        let entries: Vec<_> = source
            .epg
            .iter()
            .map(|e| {
                let mut entry = e.clone_for(shift.destination);
                entry.start_time += offset;
                entry
            })
            .collect();

        let Some(destination) = stations.get_mut(&shift.destination) else {
            log::warn!("time shift: destination {} not found", shift.destination);
            continue;
        };
        destination.epg.clear();
        for entry in entries {
            destination.add_entry(entry);
        }
        shifted += destination.epg.len();
        log::debug!(
            "{}: {} entries shifted {}h from {}",
            shift.destination,
            destination.epg.len(),
            shift.offset_hours,
            shift.source,
        );
    }
    shifted
}

/// 再放送の検出で比較する番組。
#[derive(Debug)]
struct Candidate {
    station: usize,
    entry: usize,
    sequence: usize,
    title: String,
    description: String,
    season: Option<u16>,
    episode: Option<u16>,
    start_time: NaiveDateTime,
}

/// 小文字にし、取り除く語句と余分な空白を除いた文字列を返す。
fn normalize(text: &str, ignored_phrases: &[String]) -> String {
    let mut text = text.to_lowercase();
    for phrase in ignored_phrases {
        let phrase = phrase.to_lowercase();
        if !phrase.is_empty() {
            text = text.replace(&phrase, " ");
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 除外する語句を番組名か番組記述に含んでいれば`true`を返す。
fn is_excluded(title: &str, description: &str, exclusions: &[String]) -> bool {
    let title = title.to_lowercase();
    let description = description.to_lowercase();
    exclusions.iter().any(|phrase| {
        let phrase = phrase.to_lowercase();
        !phrase.is_empty() && (title.contains(&phrase) || description.contains(&phrase))
    })
}

/// 並べ替えた候補のうち、同じ内容の番組が続く範囲ごとに再放送を判定する。
///
/// 範囲の先頭を初回放送とし、残りに前回放送日を記録する。
fn mark_runs<K: Eq>(
    sorted: &[&Candidate],
    content_key: impl Fn(&Candidate) -> K,
    options: &Options,
    marks: &mut Vec<(usize, usize, NaiveDate)>,
) {
    for run in sorted.chunk_by(|a, b| content_key(*a) == content_key(*b)) {
        let Some((first, rest)) = run.split_first() else {
            continue;
        };
        for candidate in rest {
            if options.no_simulcast_repeats && candidate.start_time == first.start_time {
                continue;
            }
            let date = match options.repeat_policy {
                RepeatPolicy::Sentinel => sentinel_date(),
                RepeatPolicy::EarliestDate => first.start_time.date(),
            };
            marks.push((candidate.station, candidate.entry, date));
        }
    }
}

/// 再放送を検出し、再放送と判定した番組に前回放送日を設定する。
///
/// 番組名とシーズン・エピソード番号、番組名と番組記述の二通りで番組を比較し、
/// 開始時刻、局の挿入順、番組の順に並べたときに後ろになる番組を再放送とする。
/// 再放送と判定した番組の数を返す。
pub fn detect_repeats(options: &Options, stations: &mut Stations) -> usize {
    let mut candidates = Vec::new();
    let mut sequence = 0;
    for (station_index, station) in stations.iter().enumerate() {
        if station.excluded {
            continue;
        }
        for (entry_index, entry) in station.epg.iter().enumerate() {
            sequence += 1;
            if is_excluded(&entry.title, &entry.description, &options.duplicate_exclusions) {
                continue;
            }
            let title = normalize(&entry.title, &options.ignored_phrases);
            if title.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                station: station_index,
                entry: entry_index,
                sequence,
                title,
                description: normalize(&entry.description, &options.ignored_phrases),
                season: entry.season,
                episode: entry.episode,
                start_time: entry.start_time,
            });
        }
    }

    let mut marks = Vec::new();

    let mut by_episode: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.season.is_some() || c.episode.is_some())
        .collect();
    by_episode.sort_by(|a, b| {
        (&a.title, a.season, a.episode, a.start_time, a.sequence)
            .cmp(&(&b.title, b.season, b.episode, b.start_time, b.sequence))
    });
    mark_runs(
        &by_episode,
        |c| (c.title.clone(), c.season, c.episode),
        options,
        &mut marks,
    );

    let mut by_description: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !c.description.is_empty())
        .collect();
    by_description.sort_by(|a, b| {
        (&a.title, &a.description, a.start_time, a.sequence)
            .cmp(&(&b.title, &b.description, b.start_time, b.sequence))
    });
    mark_runs(
        &by_description,
        |c| (c.title.clone(), c.description.clone()),
        options,
        &mut marks,
    );

    // 両方の比較で判定された番組は一件と数える
    marks.sort_unstable();
    marks.dedup_by(|a, b| (a.0, a.1) == (b.0, b.1));
    for &(station_index, entry_index, date) in &marks {
        let Some(entry) = stations
            .get_index_mut(station_index)
            .and_then(|s| s.epg.get_mut(entry_index))
        else {
            continue;
        };
        entry.previous_play_date = Some(match entry.previous_play_date {
            Some(previous) => previous.min(date),
            None => date,
        });
    }
    marks.len()
}
