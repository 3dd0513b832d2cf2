//! DVBのEITと事業者形式の番組表の収集器。

use chrono::{Duration, NaiveDateTime};
use dvbsi::psi::desc::{Advisory, AnyDescriptor, ContentGenre, Scope};
use dvbsi::psi::table::{Eit, EitEvent};
use dvbsi::psi::{PsiTable, SectionMapEntry};
use dvbsi::Pid;

use super::{Processed, TableCollector};
use crate::context::RunContext;
use crate::model::{Category, EpgEntry, ParentalRating, StationKey};
use crate::reader::{Section, TableFilter};

/// 事業者形式の評価（0から7）の表記。
const STAR_RATINGS: [&str; 8] = ["", "*", "*+", "**", "**+", "***", "***+", "****"];

/// 拡張形式イベント記述子で出演者を表す項目名。
const CAST_ITEMS: [&str; 3] = ["cast", "actors", "actor"];

/// 番組表の送り先となる局のうち、`entry`のセクションを初めて受け取った局を返す。
///
/// 送り先がなければ、設定に応じて局を作成する。
fn locate_targets(
    ctx: &mut RunContext,
    key: StationKey,
    entry: SectionMapEntry,
) -> Result<Vec<(StationKey, i16)>, Processed> {
    let mut targets = ctx.stations.locate(&key);
    if targets.is_empty() {
        if !ctx.options.create_missing_channels || ctx.options.is_excluded(&key) {
            return Err(Processed::Discarded);
        }
        log::debug!("{}: created from EIT", key);
        ctx.stations.get_or_insert(key);
        targets.push((key, 0));
    }

    let stations = &mut ctx.stations;
    targets.retain(|(target, _)| stations.get(target).map_or(false, |s| !s.excluded));
    if targets.is_empty() {
        return Err(Processed::Discarded);
    }

    targets.retain(|(target, _)| match stations.get_mut(target) {
        Some(station) => station.sections.insert(entry),
        None => false,
    });
    if targets.is_empty() {
        return Err(Processed::Repeat);
    }
    Ok(targets)
}

/// 番組情報を送り先の局に追加する。リンクによる時刻のずれはここで加える。
fn store_entries(ctx: &mut RunContext, targets: &[(StationKey, i16)], entries: &[EpgEntry]) {
    for &(target, offset_minutes) in targets {
        let Some(station) = ctx.stations.get_mut(&target) else {
            continue;
        };
        for entry in entries {
            let mut entry = entry.clone_for(target);
            entry.start_time += Duration::minutes(offset_minutes as i64);
            station.merge_entry(entry);
        }
    }
}

/// 時刻を正規化して`EpgEntry`を生成する。収集する日数の範囲外であれば`None`を返す。
fn new_entry(
    ctx: &RunContext,
    key: StationKey,
    event_id: u16,
    start_time: NaiveDateTime,
    duration: Duration,
) -> Option<EpgEntry> {
    let start_time = ctx.event_time_to_utc(start_time);
    let start = ctx.normalize_time(start_time);
    let end = ctx.normalize_time(start_time + duration);
    if !ctx.within_epg_days(start) {
        return None;
    }
    Some(EpgEntry::new(key, event_id, start, end - start))
}

/// ジャンルか独自の規則から分類を設定する。
fn resolve_category(ctx: &mut RunContext, entry: &mut EpgEntry, genre: Option<ContentGenre>) {
    entry.category = match genre {
        Some(genre) => ctx
            .categories
            .resolve(genre.level1, genre.level2, &entry.title, &entry.description)
            .map(|(category, _)| category),
        None => ctx
            .categories
            .resolve_custom(&entry.title, &entry.description)
            .map(|description| Category {
                main: 0,
                sub: 0,
                description: description.to_string(),
            }),
    };
}

/// DVBのEITを収集する。
#[derive(Debug, Default)]
pub struct EitCollector {
    _priv: (),
}

impl EitCollector {
    /// `EitCollector`を生成する。
    #[inline]
    pub fn new() -> EitCollector {
        EitCollector::default()
    }

    fn entry_from(
        ctx: &mut RunContext,
        key: StationKey,
        event: &EitEvent,
    ) -> Option<EpgEntry> {
        let (Some(start_time), Some(duration)) = (event.start_time, event.duration) else {
            log::debug!("{}: event {} without time", key, event.event_id);
            return None;
        };
        let mut entry = new_entry(ctx, key, event.event_id, start_time, duration)?;

        let collection = ctx.collection_type();
        let mut genre = None;
        let mut short_text = String::new();
        let mut extended_text = String::new();
        for desc in event.descriptors.parse_all(Scope::EIT, collection) {
            match desc {
                AnyDescriptor::ShortEvent(sed) => {
                    entry.title = ctx.decoder.decode(sed.event_name);
                    short_text = ctx.decoder.decode(sed.text);
                }
                AnyDescriptor::ExtendedEvent(eed) => {
                    for item in &eed.items {
                        let name = ctx.decoder.decode(item.item_description);
                        if CAST_ITEMS.contains(&&*name.trim().to_lowercase()) {
                            let cast = ctx.decoder.decode(item.item);
                            entry.cast.extend(
                                cast.split(',')
                                    .map(str::trim)
                                    .filter(|s| !s.is_empty())
                                    .map(str::to_string),
                            );
                        }
                    }
                    extended_text.push_str(&ctx.decoder.decode(eed.text));
                }
                AnyDescriptor::Content(cd) => {
                    if genre.is_none() {
                        genre = cd.genres.first().copied();
                    }
                }
                AnyDescriptor::ParentalRating(prd) => {
                    if let Some(rating) = prd.ratings.first() {
                        entry.parental_rating = ParentalRating {
                            raw: Some(rating.rating),
                            rating: rating.min_age().map(|age| format!("{}+", age)),
                            system: Some("DVB".to_string()),
                        };
                    }
                }
                AnyDescriptor::ContentIdentifier(cid) => {
                    entry.series_crid = cid.series().map(str::to_string);
                    entry.episode_crid = cid.episode().map(str::to_string);
                }
                _ => {}
            }
        }

        // 拡張形式の記述があれば短形式の記述は副題とする
        if extended_text.trim().is_empty() {
            entry.description = short_text;
        } else {
            entry.subtitle = short_text;
            entry.description = extended_text;
        }
        resolve_category(ctx, &mut entry, genre);
        Some(entry)
    }
}

impl TableCollector for EitCollector {
    fn name(&self) -> &'static str {
        "EIT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::EIT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with(0x4E..=0x6F)
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(eit) = Eit::read(&psi) else {
            return Processed::Discarded;
        };
        if !Eit::is_dvb_table(eit.table_id) {
            return Processed::Discarded;
        }

        let key = StationKey::new(
            eit.original_network_id,
            eit.transport_stream_id,
            eit.service_id,
        );
        let targets = match locate_targets(ctx, key, eit.section_map_entry()) {
            Ok(targets) => targets,
            Err(processed) => return processed,
        };

        let entries: Vec<EpgEntry> = eit
            .events
            .iter()
            .filter_map(|event| EitCollector::entry_from(ctx, key, event))
            .collect();
        store_entries(ctx, &targets, &entries);
        Processed::Useful
    }
}

/// 事業者形式の番組表を収集する。
#[derive(Debug, Default)]
pub struct DishCollector {
    _priv: (),
}

impl DishCollector {
    /// `DishCollector`を生成する。
    #[inline]
    pub fn new() -> DishCollector {
        DishCollector::default()
    }

    fn entry_from(
        ctx: &mut RunContext,
        table_id: u8,
        key: StationKey,
        event: &EitEvent,
    ) -> Option<EpgEntry> {
        let (Some(start_time), Some(duration)) = (event.start_time, event.duration) else {
            log::debug!("{}: event {} without time", key, event.event_id);
            return None;
        };
        let mut entry = new_entry(ctx, key, event.event_id, start_time, duration)?;

        let collection = ctx.collection_type();
        let mut genre = None;
        let mut tv_rating = None;
        for desc in event.descriptors.parse_all(Scope::EIT, collection) {
            match desc {
                AnyDescriptor::DishEventName(den) => {
                    entry.title = ctx.decoder.decode_dish(table_id, den.compressed);
                }
                AnyDescriptor::DishEventDescription(ded) => {
                    entry.description = ctx.decoder.decode_dish(table_id, ded.compressed);
                }
                AnyDescriptor::ShortEvent(sed) => {
                    if entry.title.is_empty() {
                        entry.title = ctx.decoder.decode(sed.event_name);
                    }
                    if entry.subtitle.is_empty() {
                        entry.subtitle = ctx.decoder.decode(sed.text);
                    }
                }
                AnyDescriptor::Content(cd) => {
                    if genre.is_none() {
                        genre = cd.genres.first().copied();
                    }
                }
                AnyDescriptor::DishRating(drd) => {
                    if !drd.mpaa_rating.is_empty() {
                        entry.parental_rating = ParentalRating {
                            raw: None,
                            rating: Some(drd.mpaa_rating.to_string()),
                            system: Some("MPAA".to_string()),
                        };
                    }
                    entry.star_rating = STAR_RATINGS
                        .get(drd.star_rating as usize)
                        .copied()
                        .filter(|s| !s.is_empty());
                    entry.advisory = Advisory(entry.advisory.0 | drd.advisory.0);
                }
                AnyDescriptor::DishVchip(dvd) => {
                    tv_rating = Some(dvd.tv_rating);
                    entry.advisory = Advisory(entry.advisory.0 | dvd.advisory.0);
                }
                AnyDescriptor::DishSeries(dsd) => {
                    entry.series_id = Some(dsd.series_id);
                    entry.season = Some(dsd.season as u16).filter(|&n| n != 0);
                    entry.episode = Some(dsd.episode).filter(|&n| n != 0);
                }
                AnyDescriptor::DishProperties(dpd) => {
                    entry.high_definition = dpd.high_definition;
                    entry.subtitles = dpd.subtitles;
                    entry.stereo = dpd.stereo;
                }
                _ => {}
            }
        }

        // 映画のレートがなければテレビ番組のレートを使う
        if entry.parental_rating.rating.is_none() {
            if let Some(tv_rating) = tv_rating {
                entry.parental_rating = ParentalRating {
                    raw: None,
                    rating: Some(tv_rating.to_string()),
                    system: Some("VCHIP".to_string()),
                };
            }
        }
        resolve_category(ctx, &mut entry, genre);
        Some(entry)
    }
}

impl TableCollector for DishCollector {
    fn name(&self) -> &'static str {
        "Dish EIT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::DISH_EIT, Pid::DISH_EIT_EXTENDED]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with(Eit::TABLE_ID_DISH)
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(eit) = Eit::read(&psi) else {
            return Processed::Discarded;
        };
        if !Eit::is_dish_table(eit.table_id) {
            return Processed::Discarded;
        }

        let key = StationKey::new(
            eit.original_network_id,
            eit.transport_stream_id,
            eit.service_id,
        );
        let targets = match locate_targets(ctx, key, eit.section_map_entry()) {
            Ok(targets) => targets,
            Err(processed) => return processed,
        };

        let entries: Vec<EpgEntry> = eit
            .events
            .iter()
            .filter_map(|event| DishCollector::entry_from(ctx, eit.table_id, key, event))
            .collect();
        store_entries(ctx, &targets, &entries);
        Processed::Useful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::TotCollector;
    use crate::context::CategoryKind;
    use crate::model::EpgLink;
    use crate::options::{Collection, Options};
    use crate::test_util::{self, Event};
    use chrono::NaiveDate;
    use dvbsi::huffman::TreeId;
    use dvbsi::psi::table::Tot;
    use hex_literal::hex;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn to_section(pid: Pid, data: Vec<u8>) -> Section {
        Section {
            pid,
            table_id: data[0],
            data,
        }
    }

    #[test]
    fn test_same_section_twice() {
        let mut ctx = RunContext::new(Options::default()).unwrap();
        ctx.load_categories(CategoryKind::Generic, "1=Movie\n").unwrap();
        let key = StationKey::new(2, 0x0801, 0x1001);
        ctx.stations.get_or_insert(key);

        let mut descriptors = test_util::short_event("Film", "A film");
        descriptors.extend_from_slice(&hex!("54 02 12 00 55 04 47 42 52 09"));
        let data = test_util::eit(
            0x50,
            key,
            0,
            &[Event {
                event_id: 1,
                start_time: dt(20, 0),
                duration: [0x01, 0x30, 0x00],
                descriptors: &descriptors,
            }],
        );
        let section = to_section(Pid::EIT, data);

        let mut collector = EitCollector::new();
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert_eq!(collector.process(&mut ctx, &section), Processed::Repeat);

        let station = ctx.stations.get(&key).unwrap();
        assert_eq!(station.epg.len(), 1);
        assert_eq!(station.sections.len(), 1);
        let entry = &station.epg[0];
        assert_eq!(entry.title, "Film");
        assert_eq!(entry.description, "A film");
        assert_eq!(entry.end_time(), dt(21, 30));
        assert_eq!(entry.category.as_ref().unwrap().description, "Movie");
        assert_eq!(entry.parental_rating.rating.as_deref(), Some("12+"));
        assert_eq!(entry.parental_rating.raw, Some(9));
    }

    #[test]
    fn test_missing_and_linked_stations() {
        let mut ctx = RunContext::new(Options::default()).unwrap();
        let source = StationKey::new(2, 0x0801, 0x9000);
        let linked = StationKey::new(2, 0x0801, 0x1001);
        ctx.stations.get_or_insert(linked).epg_link = Some(EpgLink {
            target: source,
            offset_minutes: 60,
        });

        let descriptors = test_util::short_event("News", "");
        let events = [Event {
            event_id: 5,
            start_time: dt(18, 0),
            duration: [0x00, 0x30, 0x00],
            descriptors: &descriptors,
        }];
        let mut collector = EitCollector::new();

        // リンク元の局に時刻をずらして追加される
        let section = to_section(Pid::EIT, test_util::eit(0x4E, source, 0, &events));
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert!(ctx.stations.get(&source).is_none());
        assert_eq!(ctx.stations.get(&linked).unwrap().epg[0].start_time, dt(19, 0));

        // 局の情報がない番組表は設定に応じて局を作成する
        let unknown = StationKey::new(2, 0x0802, 0x2000);
        let section = to_section(Pid::EIT, test_util::eit(0x4E, unknown, 0, &events));
        assert_eq!(collector.process(&mut ctx, &section), Processed::Discarded);
        ctx.options.create_missing_channels = true;
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert_eq!(ctx.stations.get(&unknown).unwrap().epg.len(), 1);
    }

    #[test]
    fn test_epg_days() {
        let options = Options {
            epg_days: Some(1),
            ..Options::default()
        };
        let mut ctx = RunContext::new(options).unwrap();
        ctx.stream_time = Some(dt(12, 0));
        let key = StationKey::new(2, 0x0801, 0x1001);
        ctx.stations.get_or_insert(key);

        let descriptors = test_util::short_event("Late", "");
        let events = [
            Event {
                event_id: 1,
                start_time: dt(13, 0),
                duration: [0x00, 0x30, 0x00],
                descriptors: &descriptors,
            },
            Event {
                event_id: 2,
                start_time: dt(12, 0) + Duration::days(2),
                duration: [0x00, 0x30, 0x00],
                descriptors: &descriptors,
            },
        ];
        let section = to_section(Pid::EIT, test_util::eit(0x50, key, 0, &events));
        let mut collector = EitCollector::new();
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);

        let station = ctx.stations.get(&key).unwrap();
        assert_eq!(station.epg.len(), 1);
        assert_eq!(station.epg[0].event_id, 1);
    }

    #[test]
    fn test_dish() {
        let options = Options {
            collection: Collection::DishNetwork,
            ..Options::default()
        };
        let mut ctx = RunContext::new(options).unwrap();
        ctx.load_dictionary(TreeId::Dish128, "0=a\n10=b\n11=STOP\n").unwrap();
        let key = StationKey::new(0x1002, 0x0001, 0x2711);
        ctx.stations.get_or_insert(key);

        // 番組名「aba」、評価「***」とPG、TV-14、シリーズ、HDとステレオ
        let descriptors = hex!(
            "91 02 03 40
             89 02 4A 05
             95 02 04 02
             96 07 00 00 30 39 02 00 0A
             94 01 06"
        );
        let events = [Event {
            event_id: 9,
            start_time: dt(21, 0),
            duration: [0x01, 0x00, 0x00],
            descriptors: &descriptors,
        }];
        let section = to_section(Pid::DISH_EIT, test_util::eit(0x80, key, 0, &events));
        let mut collector = DishCollector::new();
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert_eq!(collector.process(&mut ctx, &section), Processed::Repeat);

        let entry = &ctx.stations.get(&key).unwrap().epg[0];
        assert_eq!(entry.title, "aba");
        assert_eq!(entry.star_rating, Some("***"));
        assert_eq!(entry.parental_rating.rating.as_deref(), Some("PG"));
        assert_eq!(entry.parental_rating.system.as_deref(), Some("MPAA"));
        assert!(entry.advisory.language());
        assert!(entry.advisory.sex());
        assert!(entry.advisory.violence());
        assert!(!entry.advisory.nudity());
        assert_eq!(entry.series_id, Some(12345));
        assert_eq!(entry.season, Some(2));
        assert_eq!(entry.episode, Some(10));
        assert!(entry.high_definition);
        assert!(entry.stereo);
        assert!(!entry.subtitles);
    }

    #[test]
    fn test_local_event_times() {
        let options = Options {
            local_event_times: true,
            ..Options::default()
        };
        let mut ctx = RunContext::new(options).unwrap();
        let key = StationKey::new(2, 0x0801, 0x1001);
        ctx.stations.get_or_insert(key);

        // 時差記述子：GBR、地域0、+01:00
        let mut data = vec![Tot::TABLE_ID, 0x70, 0x1A];
        data.extend_from_slice(&dvbsi::time::encode_utc(dt(12, 0)).unwrap());
        data.extend_from_slice(&hex!("F0 0F 58 0D 47 42 52 02 01 00"));
        let change = dvbsi::time::encode_utc(dt(12, 0) + Duration::days(30)).unwrap();
        data.extend_from_slice(&change);
        data.extend_from_slice(&hex!("00 00"));
        let crc = dvbsi::crc::calc32(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        let mut tot = TotCollector::new();
        assert_eq!(tot.process(&mut ctx, &to_section(Pid::TOT, data)), Processed::Useful);
        tot.finish(&mut ctx);

        let descriptors = test_util::short_event("Local", "");
        let events = [Event {
            event_id: 3,
            start_time: dt(20, 0),
            duration: [0x00, 0x45, 0x00],
            descriptors: &descriptors,
        }];
        let section = to_section(Pid::EIT, test_util::eit(0x50, key, 0, &events));
        let mut collector = EitCollector::new();
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);

        let entry = &ctx.stations.get(&key).unwrap().epg[0];
        assert_eq!(entry.start_time, dt(19, 0));
        assert_eq!(entry.end_time(), dt(19, 45));
    }

    #[test]
    fn test_dish_extended_chars() {
        let options = Options {
            collection: Collection::DishNetwork,
            ..Options::default()
        };
        let mut ctx = RunContext::new(options).unwrap();
        ctx.load_dictionary(TreeId::Dish128, "0=0xE9\n10=t\n11=STOP\n").unwrap();
        let key = StationKey::new(0x1002, 0x0001, 0x2711);
        ctx.stations.get_or_insert(key);

        // 番組名「été」：é t é => 0 10 0
        let descriptors = hex!("91 02 03 40");
        let events = [Event {
            event_id: 4,
            start_time: dt(21, 0),
            duration: [0x00, 0x30, 0x00],
            descriptors: &descriptors,
        }];
        let section = to_section(Pid::DISH_EIT, test_util::eit(0x80, key, 0, &events));
        let mut collector = DishCollector::new();
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);

        let entry = &ctx.stations.get(&key).unwrap().epg[0];
        assert_eq!(entry.title, "été");
        assert_eq!(entry.start_time, dt(21, 0));
    }
}
