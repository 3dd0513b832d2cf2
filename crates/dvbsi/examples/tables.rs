use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use dvbsi::demux::{Context, Demuxer, Filter, Table};
use dvbsi::huffman::Dictionaries;
use dvbsi::packet::PacketSync;
use dvbsi::psi::desc::NetworkNameDescriptor;
use dvbsi::psi::table::{Nit, Tdt};
use dvbsi::psi::{PsiSection, PsiTable};
use dvbsi::text::{TextDecoder, TextOptions};
use dvbsi::Pid;

const HELP: &str = "\
TSに含まれるSIのセクションを数えるコマンド

USAGE:
  tables [PATH]

ARGS:
  <PATH>        読み込むTSファイルのパス
";

#[derive(Default)]
struct Counter {
    sections: BTreeMap<(Pid, u8), usize>,
    network_name: Option<String>,
    first_time: Option<chrono::NaiveDateTime>,
}

impl Filter for Counter {
    type Tag = ();

    fn on_setup(&mut self) -> Table<()> {
        let mut table = Table::new();
        for pid in [Pid::PAT, Pid::NIT, Pid::SDT, Pid::EIT, Pid::TDT, Pid::PSIP] {
            table.set_as_psi(pid, ());
        }
        table
    }

    fn on_psi_section(&mut self, ctx: &mut Context<()>, psi: &PsiSection, _: &[u8]) {
        let pid = ctx.packet().pid();
        *self.sections.entry((pid, psi.table_id)).or_default() += 1;

        match psi.table_id {
            Nit::TABLE_ID_ACTUAL if self.network_name.is_none() => {
                let Some(nit) = Nit::read(psi) else {
                    return;
                };
                if let Some(nnd) = nit.network_descriptors.get::<NetworkNameDescriptor>() {
                    let decoder = TextDecoder::new(TextOptions::default(), Dictionaries::new());
                    self.network_name = Some(decoder.decode(nnd.network_name));
                }
            }
            Tdt::TABLE_ID if self.first_time.is_none() => {
                self.first_time = Tdt::read(psi).map(|tdt| tdt.utc_time);
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        println!("{}", HELP);
        return Ok(());
    }
    let path: PathBuf = args.free_from_str()?;

    env_logger::init();

    let mut file = std::fs::File::open(path)?;
    let mut demuxer = Demuxer::new(Counter::default());
    let mut sync = PacketSync::new();
    let mut buf = vec![0; 188 * 512];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }

        sync.push(&buf[..n]);
        while let Some(packet) = sync.next_packet() {
            demuxer.feed(&packet);
        }
    }

    println!("{:?}", demuxer.stats());
    let counter = demuxer.into_filter();
    if let Some(name) = &counter.network_name {
        println!("network: {}", name);
    }
    if let Some(time) = counter.first_time {
        println!("time: {}", time);
    }
    for ((pid, table_id), n) in &counter.sections {
        println!("{:04X} {:02X} {:>8}", pid, table_id, n);
    }

    Ok(())
}
