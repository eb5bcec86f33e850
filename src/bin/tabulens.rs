//! Binary entry point for the tabulens inspection CLI.
//!
//! Operates on a raw memory dump plus a TOML manifest describing where the
//! table's arrays live; the `demo` subcommand builds a synthetic image
//! instead, so the engine can be exercised with no dump at hand.
#![forbid(unsafe_code)]

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tabulens::{
    fixture::{TableImageBuilder, XorMaskedPointers},
    stats::StatsSample,
    DisplayRecord, ElementDecoder, Inspector, LayoutDescriptor, MemoryImage, MetricKind,
    PointerHandle, Role, TableHandle, TypeKey, U64Decoder, U64PairDecoder,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tabulens",
    version,
    about = "Inspect open-addressing hash tables in raw memory dumps",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Traverse the table and print its display records.
    Dump(DumpCmd),
    /// Derive mean/variance/deviation for one tracked metric.
    Stats(StatsCmd),
    /// Summarize the manifest's layout and pointer-kind support.
    Describe(DescribeCmd),
    /// Build a synthetic table image and traverse it.
    Demo(DemoCmd),
}

#[derive(Args, Debug)]
struct InputArgs {
    #[arg(long, help = "Raw memory dump file")]
    image: PathBuf,

    #[arg(long, help = "TOML manifest describing the table layout")]
    manifest: PathBuf,
}

#[derive(Args, Debug)]
struct DumpCmd {
    #[command(flatten)]
    input: InputArgs,

    #[arg(long, help = "Cap on emitted records")]
    limit: Option<usize>,
}

#[derive(Args, Debug)]
struct StatsCmd {
    #[command(flatten)]
    input: InputArgs,

    #[arg(long, value_enum, help = "Metric to derive")]
    metric: MetricKind,
}

#[derive(Args, Debug)]
struct DescribeCmd {
    #[arg(long, help = "TOML manifest describing the table layout")]
    manifest: PathBuf,

    #[arg(long, help = "Additionally report support for this handle type")]
    type_key: Option<String>,
}

#[derive(Args, Debug)]
struct DemoCmd {
    #[arg(long, value_enum, default_value_t = DemoRole::Set)]
    role: DemoRole,

    #[arg(long, help = "Use the scalar metadata encoding")]
    scalar: bool,

    #[arg(long, help = "Route pointers through a demo opaque capability")]
    opaque: bool,

    #[arg(long, default_value_t = 40, help = "Number of elements to generate")]
    count: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DemoRole {
    Map,
    Set,
}

/// On-disk manifest: dump base address plus the table's layout facts.
#[derive(Deserialize, Debug)]
struct Manifest {
    base: u64,
    table: TableSpec,
}

#[derive(Deserialize, Debug)]
struct TableSpec {
    #[serde(flatten)]
    layout: LayoutDescriptor,
    groups: u64,
    elements: u64,
    group_count: u64,
    element_size: u64,
    stats: Option<u64>,
    element: ElementKind,
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
enum ElementKind {
    U64,
    U64Pair,
}

impl ElementKind {
    fn decoder(self) -> Box<dyn ElementDecoder> {
        match self {
            ElementKind::U64 => Box::new(U64Decoder),
            ElementKind::U64Pair => Box::new(U64PairDecoder),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Dump(cmd) => run_dump(cmd, cli.format),
        Command::Stats(cmd) => run_stats(cmd, cli.format),
        Command::Describe(cmd) => run_describe(cmd, cli.format),
        Command::Demo(cmd) => run_demo(cmd, cli.format),
    }
}

fn load_input(input: &InputArgs) -> Result<(MemoryImage, Manifest), Box<dyn Error>> {
    let manifest: Manifest = toml::from_str(&fs::read_to_string(&input.manifest)?)?;
    let bytes = fs::read(&input.image)?;
    Ok((MemoryImage::new(manifest.base, bytes), manifest))
}

fn table_handle(spec: &TableSpec) -> TableHandle {
    TableHandle {
        descriptor: spec.layout,
        groups: PointerHandle::Raw(spec.groups),
        elements: PointerHandle::Raw(spec.elements),
        group_count: spec.group_count,
        element_size: spec.element_size,
        stats: spec.stats,
    }
}

fn print_records(
    records: impl Iterator<Item = DisplayRecord>,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Text => {
            for record in records {
                println!("{record}");
            }
        }
        OutputFormat::Json => {
            let all: Vec<DisplayRecord> = records.collect();
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
    }
    Ok(())
}

fn run_dump(cmd: DumpCmd, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let (image, manifest) = load_input(&cmd.input)?;
    let options = tabulens::InspectOptions {
        element_limit: cmd.limit,
        ..Default::default()
    };
    let inspector = Inspector::with_options(image, options);
    let table = table_handle(&manifest.table);
    let decoder = manifest.table.element.decoder();
    let traversal = inspector.traverse(&table, decoder.as_ref())?;
    print_records(traversal, format)
}

fn run_stats(cmd: StatsCmd, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let (image, manifest) = load_input(&cmd.input)?;
    let inspector = Inspector::new(image);
    let table = table_handle(&manifest.table);
    let derived = inspector.stats(&table, cmd.metric)?;
    match format {
        OutputFormat::Text => {
            println!(
                "mean: {:.6}\nvariance: {:.6}\ndeviation: {:.6}",
                derived.mean, derived.variance, derived.deviation
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&derived)?),
    }
    Ok(())
}

fn run_describe(cmd: DescribeCmd, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let manifest: Manifest = toml::from_str(&fs::read_to_string(&cmd.manifest)?)?;
    let inspector = Inspector::new(MemoryImage::new(0, Vec::new()));
    let key = cmd
        .type_key
        .map(TypeKey::new)
        .unwrap_or_else(TypeKey::raw_address);
    let report = inspector.describe_pointer_kind(&key);
    match format {
        OutputFormat::Text => {
            println!(
                "layout: vectorized={} storage={:?} role={:?}",
                manifest.table.layout.vectorized,
                manifest.table.layout.slot_storage,
                manifest.table.layout.role
            );
            println!("groups: {} x 15 slots", manifest.table.group_count);
            println!("pointer kind for '{key}': {report:?}");
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "layout": manifest.table.layout,
                "group_count": manifest.table.group_count,
                "element_size": manifest.table.element_size,
                "pointer_kind": { key.as_str(): report },
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn run_demo(cmd: DemoCmd, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let role = match cmd.role {
        DemoRole::Map => Role::Map,
        DemoRole::Set => Role::Set,
    };
    let mut descriptor = LayoutDescriptor::new(role);
    if cmd.scalar {
        descriptor = descriptor.scalar();
    }
    let element_size = match role {
        Role::Map => 16,
        Role::Set => 8,
    };

    let mut builder = TableImageBuilder::new(descriptor, element_size).sentinel_trailer();
    for i in 0..cmd.count {
        builder = match role {
            Role::Map => builder.push_pair(i, i * 10),
            Role::Set => builder.push_u64(i * 3 + 1),
        };
    }
    builder = builder.stats([
        StatsSample {
            count: cmd.count,
            mean: 1.4,
            sum_squared_deviation: 0.9 * cmd.count as f64,
        },
        StatsSample {
            count: cmd.count * 2,
            mean: 1.1,
            sum_squared_deviation: 0.2 * cmd.count as f64,
        },
        StatsSample {
            count: cmd.count / 2,
            mean: 2.3,
            sum_squared_deviation: 0.0,
        },
    ]);
    let demo_key = TypeKey::new("demo_masked");
    if cmd.opaque {
        builder = builder.opaque(demo_key.clone(), 0xA5A5_A5A5_A5A5_A5A5);
    }
    let (image, table) = builder.build();

    let inspector = Inspector::new(image);
    if cmd.opaque {
        inspector.registry().register(
            demo_key.clone(),
            Arc::new(XorMaskedPointers::new(demo_key, 0xA5A5_A5A5_A5A5_A5A5)),
        );
    }
    let decoder: Box<dyn ElementDecoder> = match role {
        Role::Map => Box::new(U64PairDecoder),
        Role::Set => Box::new(U64Decoder),
    };
    let traversal = inspector.traverse(&table, decoder.as_ref())?;
    print_records(traversal, format)?;

    let derived = inspector.stats(&table, MetricKind::Insertion)?;
    match format {
        OutputFormat::Text => println!(
            "insertion: mean={:.4} variance={:.4} deviation={:.4}",
            derived.mean, derived.variance, derived.deviation
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&derived)?),
    }
    Ok(())
}
