#![allow(dead_code)]

use clap::Parser;
use log::debug;
use std::error;
use std::error::Error;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str;

#[derive(Debug)]
enum CompilerError {
    MissingOutputPath,
    UnknownOutputFormat,
}

impl error::Error for CompilerError {}
impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingOutputPath => {
                write!(f, "no output file given, use -o <file>")
            }
            Self::UnknownOutputFormat => {
                write!(
                    f,
                    "cannot detect the output format, use -f bin|c or a .bin/.c output path"
                )
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Bin,
    C,
}

impl str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bin" => Ok(OutputFormat::Bin),
            "c" => Ok(OutputFormat::C),
            _ => Err(format!("unknown output format {:?}", s)),
        }
    }
}

/// Compiles HDL markup into page binaries.
#[derive(Parser)]
#[command(name = "hdl-cmp")]
struct Opts {
    /// Input markup file.
    input: PathBuf,

    /// Output file path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format ('bin' or 'c'); detected from the output extension
    /// when absent.
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Annotate the C output with the decoded field layout.
    #[arg(short, long)]
    comment: bool,
}

fn detect_format(path: &Path) -> Result<OutputFormat, CompilerError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("bin") => Ok(OutputFormat::Bin),
        Some("c") => Ok(OutputFormat::C),
        _ => Err(CompilerError::UnknownOutputFormat),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts = Opts::parse();

    let source = fs::read_to_string(&opts.input)?;
    // Bitmap paths in the source are relative to the source file.
    let doc = hdl::parse_document(&source, opts.input.parent())?;
    debug!("{}", doc);

    let bytes = hdlbin::encode(&doc)?;

    let output = match &opts.output {
        Some(path) => path,
        None => return Err(CompilerError::MissingOutputPath.into()),
    };
    let format = match opts.format {
        Some(format) => format,
        None => detect_format(output)?,
    };

    match format {
        OutputFormat::Bin => fs::write(output, &bytes)?,
        OutputFormat::C => {
            let mut file = fs::File::create(output)?;
            hdlbin::write_c_source(&mut file, &bytes, source.len(), opts.comment)?;
        }
    }

    println!("Original: {}B, Compiled: {}B", source.len(), bytes.len());

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match run() {
        Err(e) => {
            return Err(e.to_string().into());
        }
        Ok(_) => Ok(()),
    }
}
