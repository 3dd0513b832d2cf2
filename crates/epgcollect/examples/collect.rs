use std::path::PathBuf;
use std::sync::Arc;

use dvbsi::huffman::TreeId;
use epgcollect::{collect_frequency, CategoryKind, MemoryDataProvider, Options, RunContext};

#[derive(Debug)]
struct AppArgs {
    options: Option<PathBuf>,
    dictionaries: Vec<(TreeId, PathBuf)>,
    categories: Vec<(CategoryKind, PathBuf)>,
    show_events: bool,
    path: PathBuf,
}

impl AppArgs {
    const HELP: &str = "\
TSファイルから番組表を収集して表示するコマンド

USAGE:
  collect [OPTIONS] [PATH]

FLAGS:
  -h, --help             このヘルプを表示する
  --show-events          番組を表示する

OPTIONS:
  --options <PATH>       TOML形式の設定ファイル
  --dish128 <PATH>       事業者形式の圧縮テキストの辞書（128）
  --dish255 <PATH>       事業者形式の圧縮テキストの辞書（255）
  --standard1 <PATH>     標準の圧縮テキストの辞書（1）
  --standard2 <PATH>     標準の圧縮テキストの辞書（2）
  --native <PATH>        事業者独自の分類表
  --generic <PATH>       汎用の分類表
  --custom <PATH>        独自の分類の規則

ARGS:
  <PATH>                 番組表を収集するTSファイルのパス
";

    pub fn parse() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            println!("{}", Self::HELP);
            std::process::exit(0);
        }

        let show_events = args.contains("--show-events");
        let options = args.opt_value_from_str("--options")?;

        let mut dictionaries = Vec::new();
        for (key, id) in [
            ("--dish128", TreeId::Dish128),
            ("--dish255", TreeId::Dish255),
            ("--standard1", TreeId::Standard1),
            ("--standard2", TreeId::Standard2),
        ] {
            if let Some(path) = args.opt_value_from_str(key)? {
                dictionaries.push((id, path));
            }
        }

        let mut categories = Vec::new();
        for (key, kind) in [
            ("--native", CategoryKind::Native),
            ("--generic", CategoryKind::Generic),
            ("--custom", CategoryKind::Custom),
        ] {
            if let Some(path) = args.opt_value_from_str(key)? {
                categories.push((kind, path));
            }
        }

        Ok(AppArgs {
            options,
            dictionaries,
            categories,
            show_events,
            path: args.free_from_str()?,
        })
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = match AppArgs::parse() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let options = match &args.options {
        Some(path) => Options::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => Options::default(),
    };
    let mut ctx = RunContext::new(options)?;

    // 辞書や分類表が読めなくても収集は続ける
    for (id, path) in &args.dictionaries {
        if let Err(e) = ctx.load_dictionary_file(*id, path) {
            log::warn!("{:#}", e);
        }
    }
    for (kind, path) in &args.categories {
        if let Err(e) = ctx.load_categories_file(*kind, path) {
            log::warn!("{:#}", e);
        }
    }

    let data = std::fs::read(&args.path)?;
    let provider = Arc::new(MemoryDataProvider::with_data(data));
    let handle = collect_frequency(ctx, provider);
    let (mut ctx, status) = handle.join()?;
    println!("{:?}", status);

    epgcollect::merge::run(&ctx.options, &mut ctx.stations);

    for station in ctx.stations.iter().filter(|s| !s.excluded) {
        println!(
            "{} {:?} {} ({} entries)",
            station.key,
            station.logical_channel_number,
            station.name,
            station.epg.len()
        );
        if args.show_events {
            for entry in &station.epg {
                println!(
                    "  {} {:>4}m {}",
                    entry.start_time,
                    entry.duration.num_minutes(),
                    entry.title
                );
            }
        }
    }

    for undefined in ctx.categories.undefined() {
        println!(
            "undefined category {},{}: {}",
            undefined.main, undefined.sub, undefined.sample_title
        );
    }

    Ok(())
}
