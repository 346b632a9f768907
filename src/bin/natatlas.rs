use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use natatlas::metadata::Language;
use natatlas::{
    AtlasMetadata, HttpTransport, Loader, LogNotifier, MapChoice, RenderedMap, Viewer,
    ViewerSettings,
};
use natatlas::{legend::Legend, models::LoadedData};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "natatlas",
    version,
    about = "Load, join & classify thematic-map data from an atlas metadata document"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one map from the metadata and print its statistics.
    Stats(StatsArgs),
    /// Fetch and decode a single source and print what it contains.
    Load(LoadArgs),
    /// List every map in the metadata document.
    List(ListArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Geometry,
    Attribute,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Lang {
    Nl,
    En,
}

impl From<Lang> for Language {
    fn from(l: Lang) -> Self {
        match l {
            Lang::Nl => Language::Nl,
            Lang::En => Language::En,
        }
    }
}

#[derive(Args, Debug)]
struct StatsArgs {
    /// Atlas metadata document (JSON).
    #[arg(short, long)]
    metadata: PathBuf,
    /// Map group index.
    #[arg(short, long, default_value_t = 0)]
    group: usize,
    /// Map subject index within the group.
    #[arg(short, long, default_value_t = 0)]
    subject: usize,
    /// Map unit index within the subject.
    #[arg(short, long, default_value_t = 0)]
    unit: usize,
    /// Map date index within the unit.
    #[arg(short, long, default_value_t = 0)]
    date: usize,
    /// Radius of the largest proportional circle (default 20).
    #[arg(long)]
    max_circle_size: Option<f64>,
    /// Language for metadata texts.
    #[arg(long, value_enum, default_value = "en")]
    lang: Lang,
    /// Print the full result as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// What the source provides.
    #[arg(short, long, value_enum)]
    kind: Kind,
    /// geojson, topojson, csv or odata.
    #[arg(short, long)]
    format: String,
    /// http(s) URL or local path.
    url: String,
    /// Foreign key field (attribute sources only).
    #[arg(long)]
    fk: Option<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Atlas metadata document (JSON).
    #[arg(short, long)]
    metadata: PathBuf,
    /// Language for metadata texts.
    #[arg(long, value_enum, default_value = "en")]
    lang: Lang,
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => {
            // Format up to 4 decimals, then trim trailing zeros and trailing dot.
            let s = format!("{:.4}", x);
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        _ => "NA".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Stats(args) => cmd_stats(args).await,
        Command::Load(args) => cmd_load(args).await,
        Command::List(args) => cmd_list(args),
    }
}

async fn cmd_stats(args: StatsArgs) -> Result<()> {
    let metadata = AtlasMetadata::from_path(&args.metadata)
        .with_context(|| format!("reading {}", args.metadata.display()))?;
    let mut settings = ViewerSettings {
        language: args.lang.into(),
        ..Default::default()
    };
    if let Some(size) = args.max_circle_size {
        anyhow::ensure!(size > 0.0, "--max-circle-size must be positive");
        settings.max_circle_size = size;
    }

    let viewer = Viewer::new(Arc::new(HttpTransport::default()), Arc::new(LogNotifier))
        .with_settings(settings);
    let choice = MapChoice::new(args.group, args.subject, args.unit, args.date);
    let Some(map) = viewer.choose_map(&metadata, choice).await else {
        anyhow::bail!(
            "map [{},{},{},{}] could not be built (see messages above)",
            args.group,
            args.subject,
            args.unit,
            args.date
        );
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        print_summary(&map, viewer.settings().language);
    }
    Ok(())
}

fn print_summary(map: &RenderedMap, lang: Language) {
    let sel = &map.selection;
    println!(
        "{} / {} ({}, {})",
        sel.group_name.text(lang),
        sel.subject_name.text(lang),
        sel.unit_name.text(lang),
        sel.date.as_deref().unwrap_or("-")
    );
    println!(
        "type={:?} attribute={} features={} rows={}",
        sel.mode,
        sel.attribute,
        map.geometries.len(),
        map.attributes.len()
    );
    println!(
        "min={} max={}",
        fmt_opt(map.stats.min),
        fmt_opt(map.stats.max)
    );
    if let Some(breaks) = &map.stats.breaks {
        let b: Vec<String> = breaks.iter().map(|v| fmt_opt(Some(*v))).collect();
        println!("breaks={}", b.join(" "));
    }
    match &map.legend {
        Legend::Size(cells) => {
            for c in cells {
                println!("  r={:<6.2} {}", c.radius, c.label);
            }
        }
        Legend::Classes(entries) => {
            for e in entries {
                println!("  {} {}", e.colour, e.label);
            }
        }
        Legend::Categories(entries) => {
            for e in entries {
                println!("  {} {}", e.colour, e.label);
            }
        }
        Legend::Empty => {}
    }
}

async fn cmd_load(args: LoadArgs) -> Result<()> {
    let mut loader = Loader::new(Arc::new(HttpTransport::default()), Arc::new(LogNotifier));
    match args.kind {
        Kind::Geometry => loader.add_geometry_request("source", &args.format, &args.url)?,
        Kind::Attribute => {
            let fk = args
                .fk
                .as_deref()
                .context("--fk is required for attribute sources")?;
            loader.add_attribute_request("source", &args.format, &args.url, fk)?
        }
    };

    let mut result = loader.wait().await;
    match result.take("source") {
        Some(LoadedData::Geometries(features)) => {
            println!("{} feature(s) from {}", features.len(), args.url);
        }
        Some(LoadedData::Attributes(table)) => {
            println!("{} row(s) from {}", table.len(), args.url);
            for key in table.keys().take(5) {
                println!("  {}", key);
            }
        }
        None => anyhow::bail!("loading {} failed (see messages above)", args.url),
    }
    Ok(())
}

fn cmd_list(args: ListArgs) -> Result<()> {
    let metadata = AtlasMetadata::from_path(&args.metadata)
        .with_context(|| format!("reading {}", args.metadata.display()))?;
    let lang: Language = args.lang.into();
    for choice in metadata.choices() {
        match metadata.resolve(choice) {
            Ok(sel) => println!(
                "{} {} {} {}  {} / {} ({}) [{:?}]",
                choice.group,
                choice.subject,
                choice.unit,
                choice.date,
                sel.group_name.text(lang),
                sel.subject_name.text(lang),
                sel.date.as_deref().unwrap_or("-"),
                sel.mode
            ),
            Err(err) => println!(
                "{} {} {} {}  invalid: {}",
                choice.group, choice.subject, choice.unit, choice.date, err
            ),
        }
    }
    Ok(())
}
