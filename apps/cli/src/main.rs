//! # Comma CLI
//!
//! 描述符级别的 csv/binary 记录转换工具。
//!
//! ## 用法
//!
//! ```bash
//! # 文本记录转二进制（标准输入到标准输出）
//! cat nav.csv | comma-cli to-bin --format "%ui%2w%3d" > nav.bin
//!
//! # 二进制记录转文本
//! comma-cli from-bin --format "t,3d" --precision 9 nav.bin -o nav.csv
//!
//! # 查看描述符布局
//! comma-cli info --format "%ui%2w%3d"
//! ```
//!
//! 通用选项可放进 TOML 配置文件（`--config`），显式命令行参数优先：
//!
//! ```toml
//! format = "t,3d"
//! delimiter = ";"
//! precision = 9
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comma_csv::{CsvOptions, Format};
use comma_io::{LineReader, LineWriter, RecordReader, RecordWriter};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Comma CLI - 机器人数据流记录转换工具
#[derive(Parser, Debug)]
#[command(name = "comma-cli")]
#[command(about = "Csv/binary record converter for robot data streams", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 文本记录转定长二进制记录
    ToBin(ConvertArgs),

    /// 定长二进制记录转文本记录
    FromBin(ConvertArgs),

    /// 打印描述符的字段布局
    Info {
        /// 类型描述符，如 "%ui%2w%3d"
        #[arg(long)]
        format: String,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// 类型描述符，如 "%ui%2w%3d"
    #[arg(long)]
    format: Option<String>,

    /// 记录分隔符
    #[arg(long)]
    delimiter: Option<char>,

    /// 浮点输出精度（小数位数，仅 from-bin 生效）
    #[arg(long)]
    precision: Option<usize>,

    /// TOML 配置文件，字段同 CsvOptions；显式参数优先
    #[arg(long)]
    config: Option<PathBuf>,

    /// 输入文件，缺省标准输入
    input: Option<PathBuf>,

    /// 输出文件，缺省标准输出
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl ConvertArgs {
    /// 合并配置文件与命令行参数
    fn options(&self) -> Result<CsvOptions> {
        let mut options = match &self.config {
            Some(path) => load_config(path)?,
            None => CsvOptions::default(),
        };
        if let Some(format) = &self.format {
            options.format = format.clone();
        }
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
        if let Some(precision) = self.precision {
            options.precision = Some(precision);
        }
        Ok(options)
    }

    fn parse_format(&self, options: &CsvOptions) -> Result<Format> {
        if options.format.is_empty() {
            bail!("--format is required (or set `format` in the config file)");
        }
        Format::parse(&options.format)
            .with_context(|| format!("invalid format descriptor '{}'", options.format))
    }

    fn open_input(&self) -> Result<Box<dyn Read>> {
        match &self.input {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("cannot open input file {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(std::io::stdin().lock())),
        }
    }

    fn open_output(&self) -> Result<Box<dyn Write>> {
        match &self.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("cannot create output file {}", path.display()))?;
                Ok(Box::new(file))
            }
            None => Ok(Box::new(std::io::stdout().lock())),
        }
    }
}

fn load_config(path: &Path) -> Result<CsvOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::ToBin(args) => to_bin(&args),
        Commands::FromBin(args) => from_bin(&args),
        Commands::Info { format } => info(&format),
    }
}

/// 文本行 -> 定长二进制记录
fn to_bin(args: &ConvertArgs) -> Result<()> {
    let options = args.options()?;
    let format = args.parse_format(&options)?;

    let mut reader = LineReader::new(BufReader::new(args.open_input()?));
    let mut writer = RecordWriter::new(BufWriter::new(args.open_output()?), &format);

    let mut count = 0u64;
    while let Some(line) = reader.read_record()? {
        let tokens = comma_csv::ascii::split(line, options.delimiter);
        let record = format
            .csv_to_bin(&tokens)
            .with_context(|| format!("record {}: cannot convert line", count + 1))?;
        writer.write_record(&record)?;
        count += 1;
    }
    writer.flush()?;
    tracing::debug!(records = count, "to-bin finished");
    Ok(())
}

/// 定长二进制记录 -> 文本行
fn from_bin(args: &ConvertArgs) -> Result<()> {
    let options = args.options()?;
    let format = args.parse_format(&options)?;

    let mut reader = RecordReader::new(BufReader::new(args.open_input()?), &format);
    let mut writer = LineWriter::new(BufWriter::new(args.open_output()?));

    let mut count = 0u64;
    while let Some(record) = reader.read_record()? {
        let line = format
            .bin_to_csv(record, options.delimiter, options.precision)
            .with_context(|| format!("record {}: cannot render", count + 1))?;
        writer.write_record(&line)?;
        count += 1;
    }
    writer.flush()?;
    tracing::debug!(records = count, "from-bin finished");
    Ok(())
}

/// 打印描述符布局表
fn info(descriptor: &str) -> Result<()> {
    let format = Format::parse(descriptor)
        .with_context(|| format!("invalid format descriptor '{}'", descriptor))?;
    println!("format: {}", format);
    println!("size: {} bytes", format.size());
    println!("count: {} fields", format.count());
    println!("index,offset,size,type");
    for index in 0..format.count() {
        let view = format.offset(index)?;
        println!("{},{},{},{}", index, view.offset, view.size, view.kind.tag());
    }
    Ok(())
}
