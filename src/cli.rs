//! Command line front end shared by the `merge2pdf` binary and tests.

use crate::assemble::{merge_args, MergeOptions};
use crate::batch::{run_batch, BatchOptions};
use crate::error::{Error, ErrorKind, Result};
use crate::extract::extract_args;
use crate::fonts::FontPattern;
use crate::geometry::{page_size, Gravity, LayoutBox};
use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::ffi::OsString;
use std::path::PathBuf;

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    Version,
    Help,
    InvalidOption,
    MissingRequiredOption,
    IllegalOptionCombination,
    NotEnoughFiles,
    DecodeFailed,
    IoFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::Version => 1,
            ExitCode::Help => 2,
            ExitCode::InvalidOption => 10,
            ExitCode::MissingRequiredOption => 11,
            ExitCode::IllegalOptionCombination => 12,
            ExitCode::NotEnoughFiles => 13,
            ExitCode::DecodeFailed => 20,
            ExitCode::IoFailed => 21,
        }
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ExitCode::InvalidOption,
            ErrorKind::MissingInput => ExitCode::NotEnoughFiles,
            ErrorKind::Decode => ExitCode::DecodeFailed,
            ErrorKind::Io => ExitCode::IoFailed,
        }
    }
}

/// Merge images and PDFs into one PDF, or extract images from a PDF
#[derive(Parser, Debug)]
#[command(
    name = "merge2pdf",
    version,
    about,
    disable_help_flag = true,
    disable_version_flag = true,
    after_help = "Usage:\n  merge2pdf --merge [options] in1.pdf in2.tiff ... out.pdf\n  \
                  merge2pdf --extract [--prefix dir/prefix] in.pdf\n  \
                  merge2pdf --based base-dir --from source-dir ... [--to goal-dir]"
)]
pub struct Args {
    /// Merge given files; the last one is the output
    #[arg(short, long)]
    pub merge: bool,

    /// Extract images from given file
    #[arg(short, long)]
    pub extract: bool,

    /// Place images on A<n> pages, e.g. -A4
    #[arg(short = 'A', value_name = "N")]
    pub a_page: Option<String>,

    /// Fit images into WxH points or a named page size
    #[arg(short, long, value_name = "DIM")]
    pub scale: Option<String>,

    /// Scale images according to their DPI
    #[arg(short, long)]
    pub dpi: bool,

    /// Border around images, in points
    #[arg(short, long, value_name = "N", allow_hyphen_values = true)]
    pub border: Option<String>,

    /// Image position on the page
    #[arg(short, long, value_name = "NAME")]
    pub gravity: Option<String>,

    /// Unembed TrueType fonts whose name matches; empty matches all
    #[arg(short, long, value_name = "REGEX")]
    pub remove_font: Option<String>,

    /// Output directory and/or file prefix for extraction
    #[arg(short, long, value_name = "PATH")]
    pub prefix: Option<String>,

    /// Merge today's PDFs below this directory with dated sources
    #[arg(long, value_name = "DIR")]
    pub based: Option<PathBuf>,

    /// Treat positional arguments as source directories of a batch
    #[arg(short, long)]
    pub from: bool,

    /// Goal directory of a batch; defaults to the base path with 主检 replaced by 体检
    #[arg(short, long, value_name = "DIR")]
    pub to: Option<PathBuf>,

    /// PDF appended to every batch merge
    #[arg(long, value_name = "PDF")]
    pub cover: Option<PathBuf>,

    /// Log debug details
    #[arg(long)]
    pub verbose: bool,

    /// Print version
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Print help
    #[arg(short = 'h', long)]
    pub help: bool,

    /// Input files, or source directories with --from
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

impl Args {
    /// Option values checked before any file is touched.
    pub fn merge_options(&self) -> Result<MergeOptions> {
        let page = self
            .a_page
            .as_deref()
            .map(|n| page_size(&format!("A{}", n)).ok_or_else(|| Error::UnknownPageSize(format!("A{}", n))))
            .transpose()?;
        let scale_box = self.scale.as_deref().map(LayoutBox::parse_dimension).transpose()?;
        let gravity = self.gravity.as_deref().map(str::parse::<Gravity>).transpose()?;
        if gravity.is_some() && page.is_none() {
            return Err(Error::GravityWithoutPage);
        }
        let border = match self.border.as_deref() {
            Some(b) => b.parse::<u32>().map_err(|_| Error::InvalidBorder(b.to_string()))?,
            None => 0,
        };
        let font_filter = self.remove_font.as_deref().map(FontPattern::new).transpose()?;

        Ok(MergeOptions {
            scale_to_dpi: self.dpi,
            scale_box,
            page,
            border,
            gravity,
            font_filter,
            drop_last_page_of_first: false,
        })
    }
}

/// Requested operation, after option combination checks.
enum Mode {
    Merge,
    Extract,
    Batch { base: PathBuf, goal: Option<PathBuf> },
}

fn select_mode(args: &Args) -> std::result::Result<Mode, ExitCode> {
    if let Some(base) = &args.based {
        if args.merge || args.extract {
            error!("Either \"merge\", \"extract\" or \"based\" option should be given");
            return Err(ExitCode::IllegalOptionCombination);
        }
        if !args.from {
            error!("Option \"based\" requires \"from\"");
            return Err(ExitCode::IllegalOptionCombination);
        }
        return Ok(Mode::Batch {
            base: base.clone(),
            goal: args.to.clone(),
        });
    }

    match (args.merge, args.extract) {
        (true, true) => {
            error!("Either \"merge\" or \"extract\" option should be given");
            Err(ExitCode::IllegalOptionCombination)
        }
        (true, false) => Ok(Mode::Merge),
        (false, true) => Ok(Mode::Extract),
        (false, false) => Err(ExitCode::Help),
    }
}

fn print_help() {
    println!("{}", Args::command().render_help());
}

fn report_error(e: &Error) -> ExitCode {
    error!("{}", e);
    ExitCode::from(e.kind())
}

fn clap_exit(e: &clap::Error) -> ExitCode {
    match e.kind() {
        ClapErrorKind::DisplayHelp => ExitCode::Help,
        ClapErrorKind::DisplayVersion => ExitCode::Version,
        ClapErrorKind::MissingRequiredArgument => ExitCode::MissingRequiredOption,
        ClapErrorKind::ArgumentConflict => ExitCode::IllegalOptionCombination,
        _ => ExitCode::InvalidOption,
    }
}

/// Parse command line arguments (program name excluded) without running
/// anything.
pub fn parse_args<I, T>(args: I) -> std::result::Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv = std::iter::once(OsString::from("merge2pdf")).chain(args.into_iter().map(Into::into));
    Args::try_parse_from(argv)
}

/// Run the command line, returning the exit status.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match parse_args(args) {
        Ok(args) => execute(&args),
        Err(e) => {
            error!("{}", e.render());
            clap_exit(&e)
        }
    }
}

/// Run already parsed arguments.
pub fn execute(args: &Args) -> ExitCode {
    if args.help {
        print_help();
        return ExitCode::Help;
    }
    if args.version {
        println!("merge2pdf v{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::Version;
    }

    let mode = match select_mode(args) {
        Ok(mode) => mode,
        Err(ExitCode::Help) => {
            print_help();
            return ExitCode::Help;
        }
        Err(code) => return code,
    };

    let result = match mode {
        Mode::Merge => args.merge_options().and_then(|options| {
            let report = merge_args(&args.files, &options)?;
            info!("Merged {} input(s), {} page(s)", report.inputs, report.pages);
            Ok(())
        }),
        Mode::Extract => extract_args(&args.files, args.prefix.as_deref()).map(|report| {
            info!(
                "Extracted {} image(s), skipped {}",
                report.files.len(),
                report.skipped.len()
            );
        }),
        Mode::Batch { base, goal } => args.merge_options().and_then(|options| {
            let mut batch = BatchOptions::new(base, args.files.clone(), goal);
            batch.cover = args.cover.clone();
            let report = run_batch(&batch, &options)?;
            info!(
                "Batch finished: {} merged, {} skipped",
                report.merged.len(),
                report.skipped.len()
            );
            Ok(())
        }),
    };

    match result {
        Ok(()) => ExitCode::Ok,
        Err(e) => report_error(&e),
    }
}
