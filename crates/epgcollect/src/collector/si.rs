//! PAT、PMT、NIT、SDT、BAT、TOTの収集器。

use dvbsi::psi::desc::{AnyDescriptor, DataBroadcastIdDescriptor, LinkageDescriptor, Scope};
use dvbsi::psi::table::{Bat, Nit, Pat, Pmt, Sdt, Tdt, Tot, TransportStreamConfig};
use dvbsi::psi::{PsiTable, SectionMap, SectionMapEntry};
use dvbsi::Pid;
use fxhash::FxHashMap;

use super::{Processed, TableCollector};
use crate::context::RunContext;
use crate::model::{EpgLink, StationKey};
use crate::offset::TimeOffsetEntry;
use crate::reader::{Section, TableFilter};

/// PATを収集し、周波数内の番組を記録する。
#[derive(Debug, Default)]
pub struct PatCollector {
    sections: SectionMap,
}

impl PatCollector {
    /// `PatCollector`を生成する。
    #[inline]
    pub fn new() -> PatCollector {
        PatCollector::default()
    }
}

impl TableCollector for PatCollector {
    fn name(&self) -> &'static str {
        "PAT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::PAT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Pat::TABLE_ID])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(syntax) = &psi.syntax else {
            return Processed::Discarded;
        };
        if !self
            .sections
            .insert(SectionMapEntry::from_syntax(psi.table_id, syntax))
        {
            return Processed::Repeat;
        }
        let Some(pat) = Pat::read(&psi) else {
            return Processed::Discarded;
        };

        let scan = &mut ctx.scan;
        scan.transport_stream_id = Some(pat.transport_stream_id);
        for program in pat.programs {
            if !scan
                .programs
                .iter()
                .any(|p| p.program_number == program.program_number)
            {
                scan.programs.push(program);
            }
        }
        Processed::Useful
    }

    fn is_complete(&self, _: &RunContext) -> bool {
        self.sections.is_complete()
    }
}

/// PMTを収集し、MHEG5のDSMCCが送出されるPIDを局に設定する。
#[derive(Debug, Default)]
pub struct PmtCollector {
    sections: FxHashMap<u16, SectionMap>,
    dsmcc_pids: FxHashMap<u16, Pid>,
}

impl PmtCollector {
    /// `PmtCollector`を生成する。
    #[inline]
    pub fn new() -> PmtCollector {
        PmtCollector::default()
    }
}

impl TableCollector for PmtCollector {
    fn name(&self) -> &'static str {
        "PMT"
    }

    fn pids(&self, ctx: &RunContext) -> Vec<Pid> {
        let mut pids: Vec<Pid> = ctx
            .scan
            .programs
            .iter()
            .map(|p| p.program_map_pid)
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Pmt::TABLE_ID])
    }

    fn process(&mut self, _: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(syntax) = &psi.syntax else {
            return Processed::Discarded;
        };
        let entry = SectionMapEntry::from_syntax(psi.table_id, syntax);
        if !self
            .sections
            .entry(syntax.table_id_extension)
            .or_default()
            .insert(entry)
        {
            return Processed::Repeat;
        }
        let Some(pmt) = Pmt::read(&psi) else {
            return Processed::Discarded;
        };

        for stream in &pmt.streams {
            let Some(dbid) = stream.descriptors.get::<DataBroadcastIdDescriptor>() else {
                continue;
            };
            if dbid.data_broadcast_id == DataBroadcastIdDescriptor::MHEG5 {
                self.dsmcc_pids
                    .insert(pmt.program_number, stream.elementary_pid);
            }
        }
        Processed::Useful
    }

    fn is_complete(&self, ctx: &RunContext) -> bool {
        ctx.scan.programs.iter().all(|p| {
            self.sections
                .get(&p.program_number)
                .map_or(false, SectionMap::is_complete)
        })
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        let Some(transport_stream_id) = ctx.scan.transport_stream_id else {
            return;
        };

        for (&service_id, &pid) in &self.dsmcc_pids {
            for station in ctx
                .stations
                .find_by_service_id(transport_stream_id, service_id)
            {
                log::debug!("{}: DSMCC PID {:?}", station.key, pid);
                station.dsmcc_pid = Some(pid);
            }
        }
    }
}

/// 分配システム記述子から周波数（kHz）を得る。
fn delivery_frequency(desc: &AnyDescriptor) -> Option<u32> {
    match desc {
        AnyDescriptor::SatelliteDeliverySystem(sds) => Some(sds.frequency * 10),
        AnyDescriptor::CableDeliverySystem(cds) => Some(cds.frequency / 10),
        AnyDescriptor::TerrestrialDeliverySystem(tds) => Some(tds.centre_frequency / 100),
        AnyDescriptor::T2DeliverySystem(t2) => t2
            .cells
            .first()
            .and_then(|c| c.centre_frequencies.first())
            .map(|&f| f / 100),
        _ => None,
    }
}

/// NITやBATのTSループから論理チャンネル番号を記録する。
fn record_channel_numbers(
    ctx: &mut RunContext,
    ts: &TransportStreamConfig,
    scope: Scope,
    overwrite: bool,
) {
    let collection = ctx.collection_type();
    for desc in ts.transport_descriptors.parse_all(scope, collection) {
        let AnyDescriptor::LogicalChannel(lcd) = desc else {
            continue;
        };
        for channel in &lcd.channels {
            let key = StationKey::new(
                ts.original_network_id,
                ts.transport_stream_id,
                channel.service_id,
            );
            let numbers = &mut ctx.network.channel_numbers;
            if overwrite {
                numbers.insert(key, channel.channel_number);
            } else {
                numbers.entry(key).or_insert(channel.channel_number);
            }
        }
    }
}

/// NITを収集し、ネットワーク名と周波数、論理チャンネル番号を記録する。
#[derive(Debug, Default)]
pub struct NitCollector {
    sections: FxHashMap<u16, SectionMap>,
}

impl NitCollector {
    /// `NitCollector`を生成する。
    #[inline]
    pub fn new() -> NitCollector {
        NitCollector::default()
    }
}

impl TableCollector for NitCollector {
    fn name(&self) -> &'static str {
        "NIT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::NIT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Nit::TABLE_ID_ACTUAL, Nit::TABLE_ID_OTHER])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(nit) = Nit::read(&psi) else {
            return Processed::Discarded;
        };
        let entry = SectionMapEntry::from_syntax(nit.table_id, &nit.syntax);
        if !self.sections.entry(nit.network_id).or_default().insert(entry) {
            return Processed::Repeat;
        }

        let collection = ctx.collection_type();
        if nit.is_actual() {
            for desc in nit.network_descriptors.parse_all(Scope::NIT, collection) {
                if let AnyDescriptor::NetworkName(nnd) = desc {
                    ctx.network.network_name = Some(ctx.decoder.decode(nnd.network_name));
                }
            }
        }

        for ts in &nit.transport_streams {
            let frequency = ts
                .transport_descriptors
                .parse_all(Scope::NIT, collection)
                .find_map(|desc| delivery_frequency(&desc));
            if let Some(frequency) = frequency {
                ctx.network.frequencies.insert(
                    (ts.original_network_id, ts.transport_stream_id),
                    frequency,
                );
            }
            record_channel_numbers(ctx, ts, Scope::NIT, true);
        }
        Processed::Useful
    }

    fn is_complete(&self, _: &RunContext) -> bool {
        !self.sections.is_empty() && self.sections.values().all(SectionMap::is_complete)
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        log::info!(
            "network {:?}: {} transport streams",
            ctx.network.network_name,
            ctx.network.frequencies.len(),
        );
        ctx.network.apply(&mut ctx.stations);
    }
}

/// SDTを収集し、局を作成・更新する。
#[derive(Debug, Default)]
pub struct SdtCollector {
    sections: FxHashMap<(u16, u16), SectionMap>,
}

impl SdtCollector {
    /// `SdtCollector`を生成する。
    #[inline]
    pub fn new() -> SdtCollector {
        SdtCollector::default()
    }
}

impl TableCollector for SdtCollector {
    fn name(&self) -> &'static str {
        "SDT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::SDT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Sdt::TABLE_ID_ACTUAL, Sdt::TABLE_ID_OTHER])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(sdt) = Sdt::read(&psi) else {
            return Processed::Discarded;
        };
        let entry = SectionMapEntry::from_syntax(sdt.table_id, &sdt.syntax);
        if !self
            .sections
            .entry((sdt.original_network_id, sdt.transport_stream_id))
            .or_default()
            .insert(entry)
        {
            return Processed::Repeat;
        }

        let collection = ctx.collection_type();
        for svc in &sdt.services {
            let key = StationKey::new(
                sdt.original_network_id,
                sdt.transport_stream_id,
                svc.service_id,
            );
            if ctx.options.is_excluded(&key) {
                log::debug!("{}: excluded", key);
                ctx.stations.get_or_insert(key).excluded = true;
                continue;
            }

            let station = ctx.stations.get_or_insert(key);
            station.eit_schedule = svc.eit_schedule_flag;
            station.eit_present_following = svc.eit_present_following_flag;
            station.encrypted = svc.free_ca_mode;

            for desc in svc.descriptors.parse_all(Scope::SDT, collection) {
                match desc {
                    AnyDescriptor::Service(sd) => {
                        station.service_type = sd.service_type.0;
                        station.name = ctx.decoder.decode(sd.service_name);
                        station.provider = ctx.decoder.decode(sd.service_provider_name);
                    }
                    AnyDescriptor::Linkage(ld)
                        if ld.linkage_type == LinkageDescriptor::LINKAGE_TYPE_EPG =>
                    {
                        station.epg_link = Some(EpgLink {
                            target: StationKey::new(
                                ld.original_network_id,
                                ld.transport_stream_id,
                                ld.service_id,
                            ),
                            offset_minutes: ld.epg_offset_minutes().unwrap_or(0),
                        });
                    }
                    AnyDescriptor::CaIdentifier(cad) => {
                        station.ca_system_ids = cad.ca_system_ids;
                    }
                    _ => {}
                }
            }
        }
        Processed::Useful
    }
}

/// BATを収集し、ブーケ名と論理チャンネル番号を記録する。
#[derive(Debug, Default)]
pub struct BatCollector {
    sections: FxHashMap<u16, SectionMap>,
}

impl BatCollector {
    /// `BatCollector`を生成する。
    #[inline]
    pub fn new() -> BatCollector {
        BatCollector::default()
    }
}

impl TableCollector for BatCollector {
    fn name(&self) -> &'static str {
        "BAT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::BAT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Bat::TABLE_ID])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };
        let Some(bat) = Bat::read(&psi) else {
            return Processed::Discarded;
        };
        let entry = SectionMapEntry::from_syntax(Bat::TABLE_ID, &bat.syntax);
        if !self.sections.entry(bat.bouquet_id).or_default().insert(entry) {
            return Processed::Repeat;
        }

        let collection = ctx.collection_type();
        for desc in bat.bouquet_descriptors.parse_all(Scope::BAT, collection) {
            if let AnyDescriptor::BouquetName(bnd) = desc {
                let name = ctx.decoder.decode(bnd.bouquet_name);
                if !ctx.network.bouquet_names.contains(&name) {
                    ctx.network.bouquet_names.push(name);
                }
            }
        }

        // NITの論理チャンネル番号を優先する
        for ts in &bat.transport_streams {
            record_channel_numbers(ctx, ts, Scope::BAT, false);
        }
        Processed::Useful
    }

    fn is_complete(&self, _: &RunContext) -> bool {
        !self.sections.is_empty() && self.sections.values().all(SectionMap::is_complete)
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        ctx.network.apply(&mut ctx.stations);
    }
}

/// TDTとTOTを収集し、現在時刻と時差を記録する。
#[derive(Debug, Default)]
pub struct TotCollector {
    tdt_seen: bool,
    tot_seen: bool,
}

impl TotCollector {
    /// `TotCollector`を生成する。
    #[inline]
    pub fn new() -> TotCollector {
        TotCollector::default()
    }
}

impl TableCollector for TotCollector {
    fn name(&self) -> &'static str {
        "TOT"
    }

    fn pids(&self, _: &RunContext) -> Vec<Pid> {
        vec![Pid::TOT]
    }

    fn tables(&self) -> TableFilter {
        TableFilter::with([Tdt::TABLE_ID, Tot::TABLE_ID])
    }

    fn process(&mut self, ctx: &mut RunContext, section: &Section) -> Processed {
        let Ok(psi) = section.psi() else {
            return Processed::Discarded;
        };

        match psi.table_id {
            Tdt::TABLE_ID => {
                let Some(tdt) = Tdt::read(&psi) else {
                    return Processed::Discarded;
                };
                ctx.stream_time = Some(tdt.utc_time);

                // 時刻は毎回変わるため、二回目以降は新しい情報とみなさない
                if std::mem::replace(&mut self.tdt_seen, true) {
                    Processed::Repeat
                } else {
                    Processed::Useful
                }
            }
            Tot::TABLE_ID => {
                let Some(tot) = Tot::read(&psi) else {
                    return Processed::Discarded;
                };
                ctx.stream_time = Some(tot.utc_time);

                let collection = ctx.collection_type();
                for desc in tot.descriptors.parse_all(Scope::TOT, collection) {
                    if let AnyDescriptor::LocalTimeOffset(ltod) = desc {
                        for offset in &ltod.offsets {
                            ctx.offsets.insert(TimeOffsetEntry::from(offset));
                        }
                    }
                }
                self.tot_seen = true;
                Processed::Useful
            }
            _ => Processed::Discarded,
        }
    }

    fn is_complete(&self, _: &RunContext) -> bool {
        self.tot_seen
    }

    fn finish(&mut self, ctx: &mut RunContext) {
        let country = ctx.options.country_code.as_deref();
        if let Some(current) = ctx.offsets.select_current(country, ctx.options.region) {
            log::info!(
                "local time offset {}: {} minutes",
                current.country_code,
                current.offset.num_minutes(),
            );
        }
    }
}
