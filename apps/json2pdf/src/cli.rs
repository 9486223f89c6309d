use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Two-letter short flags clap cannot express, rewritten to their long forms.
const MULTI_CHAR_SHORTS: &[(&str, &str)] = &[("-cv", "--cvjson"), ("-cl", "--cljson")];

/// Converts JSON resume and cover-letter data into PDF documents.
#[derive(Debug, Clone, Parser)]
#[command(name = "json2pdf", about, disable_version_flag = true)]
pub struct Args {
    /// Display current version
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub version: bool,

    /// Check for backend updates before compiling
    #[arg(short = 'u', long, action = ArgAction::SetTrue)]
    pub update: bool,

    /// Path to the CV JSON (also -cv)
    #[arg(long, value_name = "PATH")]
    pub cvjson: Option<PathBuf>,

    /// Path to the cover-letter JSON (also -cl)
    #[arg(long, value_name = "PATH")]
    pub cljson: Option<PathBuf>,

    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// One or more titles shown under the name
    #[arg(short = 't', long, num_args = 1..)]
    pub titles: Vec<String>,

    #[arg(short = 'a', long)]
    pub address: Option<String>,

    #[arg(short = 'm', long)]
    pub mobile: Option<String>,

    #[arg(short = 'e', long)]
    pub email: Option<String>,

    #[arg(short = 'l', long)]
    pub linkedin: Option<String>,

    #[arg(short = 'g', long)]
    pub github: Option<String>,

    /// Accent color: #rgb, #rrggbb or a name such as navy or teal
    #[arg(short = 'c', long)]
    pub color: Option<String>,

    #[arg(short = 'w', long)]
    pub website: Option<String>,

    /// Enables the document header
    #[arg(long, num_args = 0..=1, default_value_t = true, default_missing_value = "true", action = ArgAction::Set)]
    pub header: bool,

    /// Enables the document footer
    #[arg(long, num_args = 0..=1, default_value_t = true, default_missing_value = "true", action = ArgAction::Set)]
    pub footer: bool,

    /// Spaces document elements
    #[arg(long, num_args = 0..=1, default_value_t = true, default_missing_value = "true", action = ArgAction::Set)]
    pub spaced: bool,

    /// Darkens document elements
    #[arg(long, num_args = 0..=1, default_value_t = true, default_missing_value = "true", action = ArgAction::Set)]
    pub darken: bool,

    /// Anonymize during compilation
    #[arg(long, action = ArgAction::SetTrue)]
    pub anon: bool,

    /// Bolden during compilation
    #[arg(long, action = ArgAction::SetTrue)]
    pub bold: bool,

    /// Log every compilation stage
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Allow Ctrl-C to interrupt in-flight compilation
    #[arg(long, action = ArgAction::SetTrue)]
    pub interrupt: bool,

    /// Directory the PDFs are written to
    #[arg(short = 'o', long, env = "JSON2PDF_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Upper bound on concurrently compiled documents
    #[arg(long, env = "JSON2PDF_MAX_WORKERS")]
    pub max_workers: Option<NonZeroUsize>,

    /// Release manifest consulted by --update
    #[arg(long, env = "JSON2PDF_UPDATE_URL")]
    pub update_url: Option<String>,

    /// Where fetched backends are installed
    #[arg(long, env = "JSON2PDF_BACKEND_DIR", default_value = ".json2pdf")]
    pub backend_dir: PathBuf,
}

/// Rewrites `-cv`/`-cl` (and their `=value` forms) to long flags before clap sees them.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(text) = arg.to_str() else {
                return arg;
            };
            for (short, long) in MULTI_CHAR_SHORTS {
                if text == *short {
                    return OsString::from(*long);
                }
                if let Some(value) = text.strip_prefix(&format!("{short}=")) {
                    return OsString::from(format!("{long}={value}"));
                }
            }
            arg
        })
        .collect()
}
