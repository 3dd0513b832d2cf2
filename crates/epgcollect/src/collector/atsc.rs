//! ATSC PSIPの収集器。

use dvbsi::psi::desc::{AnyDescriptor, Scope};
use dvbsi::psi::table::{AtscEit, Ett, Mgt, Stt, Vct};
use dvbsi::psi::{PsiTable, SectionMap, SectionMapEntry};
use dvbsi::Pid;
use fxhash::{FxHashMap, FxHashSet};

use super::{Processed, TableCollector};
use crate::context::RunContext;
use crate::model::{Category, EpgEntry, ParentalRating, StationKey};
use crate::reader::{Section, TableFilter};

/// ベースPIDのMGT、VCT、STTを収集し、局とEIT・ETTのPIDを記録する。
#[derive(Debug, Default)]
pub struct AtscGuideCollector {
    mgt_seen: bool,
    stt_seen: bool,
    vct_sections: SectionMap,
}

impl AtscGuideCollector {
    /// `AtscGuideCollector`を生成する。
    #[inline]
    pub fn new() -> AtscGuideCollector {
        AtscGuideCollector::default()
    }

    fn process_mgt(&mut self, ctx: &mut RunContext, mgt: &Mgt) -> Processed {
        let mut eit_pids: Vec<Pid> = mgt
            .tables
            .iter()
            .filter(|t| t.eit_index().is_some())
            .map(|t| t.pid)
            .collect();
        let mut ett_pids: Vec<Pid> = mgt
            .tables
            .iter()
            .filter(|t| t.ett_index().is_some())
            .map(|t| t.pid)
            .collect();
        eit_pids.sort_unstable();
        eit_pids.dedup();
        ett_pids.sort_unstable();
        ett_pids.dedup();

        if self.mgt_seen && ctx.scan.eit_pids == eit_pids && ctx.scan.ett_pids == ett_pids {
            return Processed::Repeat;
        }
        log::debug!("MGT: {} EIT PIDs, {} ETT PIDs", eit_pids.len(), ett_pids.len());
        self.mgt_seen = true;
        ctx.scan.eit_pids = eit_pids;
        ctx.scan.ett_pids = ett_pids;
        Processed::Useful
    }

    fn process_vct(&mut self, ctx: &mut RunContext, vct: &Vct) -> Processed {
        let entry = SectionMapEntry::from_syntax(vct.table_id, &vct.syntax);
        if !self.vct_sections.insert(entry) {
            return Processed::Repeat;
        }

        let collection = ctx.collection_type();
        for channel in &vct.channels {
            if channel.hidden {
                log::debug!("VCT: hidden channel {}", channel.source_id);
                continue;
            }

            let key = StationKey::new(0, channel.channel_tsid, channel.program_number);
            let excluded = ctx.options.is_excluded(&key);
            let mut name = channel.short_name.clone();
            for desc in channel.descriptors.parse_all(Scope::VCT, collection) {
                if let AnyDescriptor::ExtendedChannelName(ecn) = desc {
                    let long_name = ctx.decoder.decode_multiple_string(&ecn.long_channel_name, None);
                    if !long_name.is_empty() {
                        name = long_name;
                    }
                }
            }

            let station = ctx.stations.get_or_insert(key);
            station.excluded = excluded;
            if excluded {
                continue;
            }
            station.name = name;
            station.service_type = channel.service_type;
            station.encrypted = channel.access_controlled;
            station.source_id = Some(channel.source_id);
            station.logical_channel_number = Some(channel.major_channel_number);
            station.minor_channel_number = Some(channel.minor_channel_number);
            if channel.carrier_frequency != 0 {
                station.frequency = Some(channel.carrier_frequency / 1000);
            }
        }
        Processed::Useful
    }

    fn process_stt(&mut self, ctx: &mut RunContext, stt: &Stt) -> Processed {
        ctx.scan.gps_utc_offset = stt.gps_utc_offset;
        ctx.stream_time = Some(stt.utc_time());
        if std::mem::replace(&mut self.stt_seen, true) {
            Processed::Repeat
        } else {
            Processed::Useful
        }
    }
}

impl TableCollector for AtscGuideCollector {
    fn name(&self) -> &'static str {
        "PSIP"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::PSIP]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([
            Mgt::TABLE_ID,
            Vct::TABLE_ID_TERRESTRIAL,
            Vct::TABLE_ID_CABLE,
            Stt::TABLE_ID,
        ])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        match psi.table_id {
            Mgt::TABLE_ID => match Mgt::read(&psi) {
                Some(mgt) => self.process_mgt(ctx, &mgt),
                None => Processed::Discarded,
            },
            Vct::TABLE_ID_TERRESTRIAL | Vct::TABLE_ID_CABLE => match Vct::read(&psi) {
                Some(vct) => self.process_vct(ctx, &vct),
                None => Processed::Discarded,
            },
            Stt::TABLE_ID => match Stt::read(&psi) {
                Some(stt) => self.process_stt(ctx, &stt),
                None => Processed::Discarded,
            },
            _ => Processed::Discarded,
        }
    }

    fn is_complete(&self, _: &RunContext) -> bool {
        self.mgt_seen && self.stt_seen && self.vct_sections.is_complete()
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        if !self.mgt_seen {
            log::warn!("PSIP: no MGT received");
        }
        log::debug!("PSIP: GPS-UTC offset {}s", ctx.scan.gps_utc_offset);
    }
}

/// MGTで示されたPIDのEITとETTを収集する。
#[derive(Debug, Default)]
pub struct AtscEventCollector {
    sections: FxHashMap<(Pid, u16), SectionMap>,
    etms: FxHashSet<u32>,
    texts: FxHashMap<(u16, u16), String>,
}

impl AtscEventCollector {
    /// `AtscEventCollector`を生成する。
    #[inline]
    pub fn new() -> AtscEventCollector {
        AtscEventCollector::default()
    }

    fn process_eit(&mut self, ctx: &mut RunContext, pid: Pid, eit: &AtscEit) -> Processed {
        let entry = SectionMapEntry::from_syntax(AtscEit::TABLE_ID, &eit.syntax);
        let sections = self.sections.entry((pid, eit.source_id)).or_default();
        if sections.contains(&entry) {
            return Processed::Repeat;
        }

        let Some(key) = ctx
            .stations
            .find_by_source_id(eit.source_id)
            .filter(|s| !s.excluded)
            .map(|s| s.key)
        else {
            return Processed::Discarded;
        };
        sections.insert(entry);

        let collection = ctx.collection_type();
        let mut entries = Vec::with_capacity(eit.events.len());
        for event in &eit.events {
            let start_time = event.start_time_utc(ctx.scan.gps_utc_offset);
            let start = ctx.normalize_time(start_time);
            let end = ctx.normalize_time(start_time + event.length);
            if !ctx.within_epg_days(start) {
                continue;
            }

            let mut entry = EpgEntry::new(key, event.event_id, start, end - start);
            entry.title = ctx.decoder.decode_multiple_string(&event.title, None);
            for desc in event.descriptors.parse_all(Scope::EIT, collection) {
                let AnyDescriptor::ContentAdvisory(cad) = desc else {
                    continue;
                };
                let Some(region) = cad.regions.first() else {
                    continue;
                };
                let rating = ctx.decoder.decode_multiple_string(&region.description, None);
                entry.parental_rating = ParentalRating {
                    raw: region.dimensions.first().map(|&(_, value)| value),
                    rating: Some(rating).filter(|s| !s.is_empty()),
                    system: Some("ATSC".to_string()),
                };
            }

            entry.category = ctx
                .categories
                .resolve_custom(&entry.title, "")
                .map(|description| Category {
                    main: 0,
                    sub: 0,
                    description: description.to_string(),
                });
            entries.push(entry);
        }

        if let Some(station) = ctx.stations.get_mut(&key) {
            for entry in entries {
                station.merge_entry(entry);
            }
        }
        Processed::Useful
    }

    fn process_ett(&mut self, ctx: &mut RunContext, ett: &Ett) -> Processed {
        let Some(event_id) = ett.event_id() else {
            return Processed::Discarded;
        };
        if !self.etms.insert(ett.etm_id) {
            return Processed::Repeat;
        }

        let text = ctx
            .decoder
            .decode_multiple_string(&ett.extended_text_message, None);
        self.texts.insert((ett.source_id(), event_id), text);
        Processed::Useful
    }
}

impl TableCollector for AtscEventCollector {
    fn name(&self) -> &'static str {
        "ATSC EIT"
    }

    fn pids(&self, ctx: &RunContext) -> Vec<Pid> {
        let mut pids: Vec<Pid> = ctx
            .scan
            .eit_pids
            .iter()
            .chain(&ctx.scan.ett_pids)
            .copied()
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([AtscEit::TABLE_ID, Ett::TABLE_ID])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        match psi.table_id {
            AtscEit::TABLE_ID => match AtscEit::read(&psi) {
                Some(eit) => self.process_eit(ctx, section.pid, &eit),
                None => Processed::Discarded,
            },
            Ett::TABLE_ID => match Ett::read(&psi) {
                Some(ett) => self.process_ett(ctx, &ett),
                None => Processed::Discarded,
            },
            _ => Processed::Discarded,
        }
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        // ETTはEITより先に届くことがあるため、収集を終えてから番組記述を埋める
        let mut applied = 0;
        for (&(source_id, event_id), text) in &self.texts {
            let Some(station) = ctx.stations.find_by_source_id(source_id) else {
                continue;
            };
            for entry in station.epg.iter_mut().filter(|e| e.event_id == event_id) {
                if entry.description.is_empty() {
                    entry.description = text.clone();
                    applied += 1;
                }
            }
        }
        log::debug!("ATSC EIT: {} of {} extended texts applied", applied, self.texts.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Collection, Options};
    use crate::test_util;
    use chrono::{NaiveDate, NaiveDateTime};
    use hex_literal::hex;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn gps_seconds(time: NaiveDateTime, gps_utc_offset: u8) -> u32 {
        let epoch = NaiveDate::from_ymd_opt(1980, 1, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ((time - epoch).num_seconds() + gps_utc_offset as i64) as u32
    }

    /// `text`だけを持つ複数文字列構造。
    fn mss(text: &str) -> Vec<u8> {
        let mut data = hex!("01 65 6E 67 01 00 00").to_vec();
        data.push(text.len() as u8);
        data.extend_from_slice(text.as_bytes());
        data
    }

    fn to_section(pid: Pid, data: Vec<u8>) -> Section {
        Section {
            pid,
            table_id: data[0],
            data,
        }
    }

    fn context() -> RunContext {
        let options = Options {
            collection: Collection::Atsc,
            ..Options::default()
        };
        RunContext::new(options).unwrap()
    }

    fn guide(ctx: &mut RunContext) {
        let mut collector = AtscGuideCollector::new();

        let mgt = hex!(
            "00 00 03"
            "00 00 FF FB E1 00 00 01 00 F0 00"
            "01 00 E1 00 E1 00 00 02 00 F0 00"
            "02 00 E1 10 E1 00 00 03 00 F0 00"
            "F0 00"
        );
        let section = to_section(Pid::PSIP, test_util::section(0xC7, 0, 0, 0, &mgt));
        assert_eq!(collector.process(ctx, &section), Processed::Useful);
        assert_eq!(collector.process(ctx, &section), Processed::Repeat);

        let vct = hex!(
            "00 01"
            // "KQED"
            "00 4B 00 51 00 45 00 44 00 00 00 00 00 00"
            "F0 24 01 04 00 00 00 00 00 01 00 03 0D 02 00 10 FC 00"
            "FC 00"
        );
        let section = to_section(Pid::PSIP, test_util::section(0xC8, 1, 0, 0, &vct));
        assert_eq!(collector.process(ctx, &section), Processed::Useful);

        let mut stt = vec![0x00];
        stt.extend_from_slice(&gps_seconds(dt(12, 0), 18).to_be_bytes());
        stt.extend_from_slice(&[18, 0x00, 0x00]);
        let section = to_section(Pid::PSIP, test_util::section(0xCD, 0, 0, 0, &stt));
        assert_eq!(collector.process(ctx, &section), Processed::Useful);
        assert!(collector.is_complete(ctx));
    }

    #[test]
    fn test_guide() {
        let mut ctx = context();
        guide(&mut ctx);

        assert_eq!(ctx.scan.eit_pids, [Pid::new(0x0100)]);
        assert_eq!(ctx.scan.ett_pids, [Pid::new(0x0110)]);
        assert_eq!(ctx.scan.gps_utc_offset, 18);
        assert_eq!(ctx.stream_time, Some(dt(12, 0)));

        let station = ctx.stations.get(&StationKey::new(0, 1, 3)).unwrap();
        assert_eq!(station.name, "KQED");
        assert_eq!(station.source_id, Some(0x10));
        assert_eq!(station.logical_channel_number, Some(9));
        assert_eq!(station.minor_channel_number, Some(1));
    }

    #[test]
    fn test_events() {
        let mut ctx = context();
        guide(&mut ctx);
        let mut collector = AtscEventCollector::new();
        assert_eq!(collector.pids(&ctx), [Pid::new(0x0100), Pid::new(0x0110)]);

        // ETTがEITより先に届く
        let mut ett = vec![0x00];
        ett.extend_from_slice(&((0x10 << 16) | (7 << 2) | 0b10u32).to_be_bytes());
        ett.extend_from_slice(&mss("Evening headlines"));
        let section = to_section(Pid::new(0x0110), test_util::section(0xCC, 7, 0, 0, &ett));
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert_eq!(collector.process(&mut ctx, &section), Processed::Repeat);

        let title = mss("News");
        let mut advisory = hex!("87 15 C1 01 02 00 F3 01 F2 0D").to_vec();
        advisory.extend_from_slice(&mss("TV-14"));
        let mut eit = vec![0x00, 0x01, 0xC0, 0x07];
        eit.extend_from_slice(&gps_seconds(dt(18, 0), 18).to_be_bytes());
        // ETMあり、30分
        eit.extend_from_slice(&[0xD0, 0x07, 0x08]);
        eit.push(title.len() as u8);
        eit.extend_from_slice(&title);
        eit.extend_from_slice(&(0xF000 | advisory.len() as u16).to_be_bytes());
        eit.extend_from_slice(&advisory);
        let section = to_section(Pid::new(0x0100), test_util::section(0xCB, 0x10, 0, 0, &eit));
        assert_eq!(collector.process(&mut ctx, &section), Processed::Useful);
        assert_eq!(collector.process(&mut ctx, &section), Processed::Repeat);

        collector.finish(&mut ctx);
        let station = ctx.stations.get(&StationKey::new(0, 1, 3)).unwrap();
        assert_eq!(station.epg.len(), 1);
        let entry = &station.epg[0];
        assert_eq!(entry.title, "News");
        assert_eq!(entry.start_time, dt(18, 0));
        assert_eq!(entry.end_time(), dt(18, 30));
        assert_eq!(entry.description, "Evening headlines");
        assert_eq!(entry.parental_rating.rating.as_deref(), Some("TV-14"));
        assert_eq!(entry.parental_rating.raw, Some(3));
    }

    #[test]
    fn test_unknown_source() {
        let mut ctx = context();
        let mut collector = AtscEventCollector::new();
        let title = mss("News");
        let mut eit = vec![0x00, 0x01, 0xC0, 0x01];
        eit.extend_from_slice(&gps_seconds(dt(18, 0), 0).to_be_bytes());
        eit.extend_from_slice(&[0xC0, 0x07, 0x08]);
        eit.push(title.len() as u8);
        eit.extend_from_slice(&title);
        eit.extend_from_slice(&[0xF0, 0x00]);
        let section = to_section(Pid::new(0x0100), test_util::section(0xCB, 0x20, 0, 0, &eit));

        // 局が分かるまではセクションを記録しない
        assert_eq!(collector.process(&mut ctx, &section), Processed::Discarded);
        assert_eq!(collector.process(&mut ctx, &section), Processed::Discarded);
        assert_eq!(ctx.stations.entry_count(), 0);
    }
}
