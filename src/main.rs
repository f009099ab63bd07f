use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use vcfsheet::catalog::{self, Version};
use vcfsheet::config::{self, Config};
use vcfsheet::decode::{self, DecodeOptions, LabelStyle};
use vcfsheet::encode::{Encoder, VCARD_MIME_TYPE};
use vcfsheet::logging;
use vcfsheet::mapping::{self, ColumnMapping};
use vcfsheet::sheet::{self, OutputFormat};

// Batches smaller than this finish before a bar is worth drawing.
const PROGRESS_THRESHOLD: usize = 500;

#[derive(Parser, Debug)]
#[command(name = "vcfsheet", version, about = "Convert contact spreadsheets to vCard and back")]
struct Cli {
    /// Configuration file (default: <config dir>/vcfsheet/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a CSV sheet into a vCard file
    Encode(EncodeArgs),
    /// Flatten a vCard file into CSV or JSON
    Decode(DecodeArgs),
    /// Print the column mapping that would be used for a CSV sheet
    Suggest(SuggestArgs),
    /// List the vCard fields available for a version
    Fields(FieldsArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[arg(value_name = "CSV")]
    input: PathBuf,

    /// vCard version to write: 3.0 or 4.0
    #[arg(long = "vcard-version", value_name = "VERSION")]
    vcard_version: Option<Version>,

    /// TOML column mapping; defaults to the suggested mapping
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Output file (default: contacts-<version>.vcf)
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Number of threads for parallel encoding.
    /// Defaults to number of CPU cores.
    #[arg(long, short = 'j')]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[arg(value_name = "VCF")]
    input: PathBuf,

    /// csv or json
    #[arg(long)]
    format: Option<OutputFormat>,

    /// raw or zh
    #[arg(long)]
    labels: Option<LabelStyle>,

    /// Output file, or `-` for stdout (default: contacts.csv / contacts.json)
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SuggestArgs {
    #[arg(value_name = "CSV")]
    input: PathBuf,

    #[arg(long = "vcard-version", value_name = "VERSION")]
    vcard_version: Option<Version>,
}

#[derive(Args, Debug)]
struct FieldsArgs {
    #[arg(long = "vcard-version", value_name = "VERSION")]
    vcard_version: Option<Version>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load(cli.config.as_deref())?;
    if let Some(path) = &config.config_path {
        tracing::debug!(path = %path.display(), "loaded configuration");
    }

    match cli.command {
        Command::Encode(args) => handle_encode(args, &config),
        Command::Decode(args) => handle_decode(args, &config),
        Command::Suggest(args) => handle_suggest(args, &config),
        Command::Fields(args) => handle_fields(args, &config),
    }
}

fn handle_encode(args: EncodeArgs, config: &Config) -> Result<()> {
    let version = args.vcard_version.unwrap_or(config.version);
    let sheet = sheet::read_csv_path(&args.input)?;

    let mapping = match &args.mapping {
        Some(path) => load_mapping(path)?,
        None => mapping::suggest(&sheet.columns, version),
    };
    let absent = mapping.unknown_columns(&sheet.columns);
    if !absent.is_empty() {
        eprintln!(
            "warning: {} mapped column(s) not found in {}; their cells read as empty",
            absent.len(),
            args.input.display()
        );
    }
    mapping
        .validate()
        .context("column mapping cannot be used for encoding")?;

    if let Some(num_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .ok(); // Ignore error if pool already initialized
    }

    let encoder = Encoder::new(config.encode_options(version));
    let report = if sheet.rows.len() >= PROGRESS_THRESHOLD {
        let pb = ProgressBar::new(sheet.rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .context("invalid progress bar template")?
                .progress_chars("#>-"),
        );
        pb.set_message("Encoding contacts...");
        let report = encoder.encode_rows_with(&sheet.rows, &mapping, || pb.inc(1));
        pb.finish_with_message("Done encoding contacts");
        report
    } else {
        encoder.encode_rows(&sheet.rows, &mapping)
    };

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(version.output_file_name()));
    sheet::write_atomic(&output, report.document.as_bytes())?;
    tracing::debug!(
        path = %output.display(),
        bytes = report.document.len(),
        media_type = VCARD_MIME_TYPE,
        "wrote vCard document"
    );

    println!(
        "Encoded {} contacts as vCard {} to {}.",
        report.encoded,
        version,
        output.display()
    );
    if report.skipped > 0 {
        println!(
            "Skipped {} rows (missing full name or phone).",
            report.skipped
        );
    }
    Ok(())
}

fn load_mapping(path: &Path) -> Result<ColumnMapping> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read mapping file {}", path.display()))?;
    ColumnMapping::from_toml(&raw)
        .with_context(|| format!("failed to parse mapping file {}", path.display()))
}

fn handle_decode(args: DecodeArgs, config: &Config) -> Result<()> {
    let format = args.format.unwrap_or(config.decode.format);
    let options = DecodeOptions {
        labels: args.labels.unwrap_or(config.decode.labels),
    };

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read vCard file {}", args.input.display()))?;
    let report = decode::decode_with(&raw, &options);
    let data = sheet::render(&report.rows, format)?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format.default_file_name()));
    let to_stdout = output.as_os_str() == "-";
    if to_stdout {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&data).context("failed to write to stdout")?;
        stdout.flush().context("failed to flush stdout")?;
        eprintln!("Decoded {} contacts.", report.rows.len());
    } else {
        sheet::write_atomic(&output, &data)?;
        println!(
            "Decoded {} contacts to {}.",
            report.rows.len(),
            output.display()
        );
    }

    if report.skipped > 0 {
        eprintln!(
            "warning: skipped {} malformed vCard blocks",
            report.skipped
        );
    }
    Ok(())
}

fn handle_suggest(args: SuggestArgs, config: &Config) -> Result<()> {
    let version = args.vcard_version.unwrap_or(config.version);
    let sheet = sheet::read_csv_path(&args.input)?;
    let mapping = mapping::suggest(&sheet.columns, version);

    let rendered = mapping
        .to_toml()
        .context("failed to render mapping as TOML")?;
    print!("{rendered}");

    if let Err(err) = mapping.validate() {
        eprintln!("warning: {err}");
    }
    Ok(())
}

fn handle_fields(args: FieldsArgs, config: &Config) -> Result<()> {
    let version = args.vcard_version.unwrap_or(config.version);

    println!("vCard {version} fields:");
    for field in catalog::fields_for(version) {
        let generated = if field.key.is_managed() { " [generated]" } else { "" };
        println!(
            "  {:<12} {:<8} {}{}",
            field.name, field.label_zh, field.description, generated
        );

        let types = catalog::type_vocabulary(field.key, version);
        if !types.is_empty() {
            println!("  {:<12} TYPE: {}", "", types.join(", "));
        }
    }
    Ok(())
}
