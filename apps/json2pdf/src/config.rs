use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::errors::ConfigError;
use crate::models::{DocumentKind, PersonalFields};
use crate::render::{ContentFlags, RenderOptions, Rgb, StyleFlags};

/// Immutable run configuration, built once from the parsed command line.
///
/// Defaults: styling toggles on, content transforms off, no debug, no interrupt,
/// output to the current directory, one worker per document.
#[derive(Debug, Clone)]
pub struct Config {
    pub cv_json: Option<PathBuf>,
    pub cl_json: Option<PathBuf>,
    pub personal: PersonalFields,
    pub color: Option<Rgb>,
    pub style: StyleFlags,
    pub content: ContentFlags,
    pub debug: bool,
    pub interrupt: bool,
    pub update: bool,
    pub output_dir: PathBuf,
    pub max_workers: Option<NonZeroUsize>,
    pub update_url: Option<String>,
    pub backend_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cv_json: None,
            cl_json: None,
            personal: PersonalFields::default(),
            color: None,
            style: StyleFlags::default(),
            content: ContentFlags::default(),
            debug: false,
            interrupt: false,
            update: false,
            output_dir: PathBuf::from("."),
            max_workers: None,
            update_url: None,
            backend_dir: PathBuf::from(".json2pdf"),
        }
    }
}

impl Config {
    /// Validates the parsed arguments. Source files are not opened here; a missing
    /// source is reported on its own compilation unit.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let color = args
            .color
            .as_deref()
            .map(str::parse::<Rgb>)
            .transpose()
            .map_err(|message| ConfigError::InvalidOption {
                flag: "color",
                message,
            })?;

        if let (Some(cv), Some(cl)) = (&args.cvjson, &args.cljson) {
            if same_file(cv, cl) {
                return Err(ConfigError::Conflict(format!(
                    "--cvjson and --cljson both point at {}",
                    cv.display()
                )));
            }
        }

        if args.output_dir.is_file() {
            return Err(ConfigError::InvalidOption {
                flag: "output-dir",
                message: format!("{} is a file, not a directory", args.output_dir.display()),
            });
        }

        let update_url = non_blank(args.update_url);
        if let Some(url) = &update_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidOption {
                    flag: "update-url",
                    message: format!("expected an http(s) URL, got {url:?}"),
                });
            }
        }

        Ok(Config {
            cv_json: args.cvjson,
            cl_json: args.cljson,
            personal: PersonalFields {
                name: non_blank(args.name),
                titles: args
                    .titles
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
                address: non_blank(args.address),
                mobile: non_blank(args.mobile),
                email: non_blank(args.email),
                linkedin: non_blank(args.linkedin),
                github: non_blank(args.github),
                website: non_blank(args.website),
            },
            color,
            style: StyleFlags {
                header: args.header,
                footer: args.footer,
                spaced: args.spaced,
                darken: args.darken,
            },
            content: ContentFlags {
                anon: args.anon,
                bold: args.bold,
            },
            debug: args.debug,
            interrupt: args.interrupt,
            update: args.update,
            output_dir: args.output_dir,
            max_workers: args.max_workers,
            update_url,
            backend_dir: args.backend_dir,
        })
    }

    /// Present source paths in submission order: CV first, then cover letter.
    pub fn sources(&self) -> Vec<(DocumentKind, &Path)> {
        [
            (DocumentKind::Cv, self.cv_json.as_deref()),
            (DocumentKind::CoverLetter, self.cl_json.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|p| (kind, p)))
        .collect()
    }

    pub fn output_path(&self, kind: DocumentKind) -> PathBuf {
        self.output_dir.join(kind.output_file_name())
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            style: self.style,
            content: self.content,
            color: self.color,
            personal: self.personal.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["json2pdf"];
        argv.extend_from_slice(args);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_no_sources_is_valid_and_empty() {
        let config = config(&[]).unwrap();
        assert!(config.sources().is_empty());
    }

    #[test]
    fn test_sources_are_ordered_cv_first() {
        let config = config(&["--cljson", "cl.json", "--cvjson", "cv.json"]).unwrap();
        let kinds: Vec<DocumentKind> = config.sources().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![DocumentKind::Cv, DocumentKind::CoverLetter]);
    }

    #[test]
    fn test_missing_source_is_not_a_config_time_error() {
        assert!(config(&["--cvjson", "does/not/exist.json"]).is_ok());
    }

    #[test]
    fn test_same_source_for_both_documents_conflicts() {
        let err = config(&["--cvjson", "doc.json", "--cljson", "doc.json"]).unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
    }

    #[test]
    fn test_invalid_color_is_rejected() {
        let err = config(&["--color", "#12"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { flag: "color", .. }));
    }

    #[test]
    fn test_output_dir_must_not_be_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let err = config(&["--output-dir", &path]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { flag: "output-dir", .. }));
    }

    #[test]
    fn test_update_url_must_be_http() {
        let err = config(&["--update-url", "ftp://example.com/latest.json"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { flag: "update-url", .. }));
    }

    #[test]
    fn test_blank_fields_are_dropped() {
        let config = config(&["--name", "  ", "-t", "Engineer", " ", "--email", "a@b.c"]).unwrap();
        assert_eq!(config.personal.name, None);
        assert_eq!(config.personal.titles, vec!["Engineer".to_string()]);
        assert_eq!(config.personal.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn test_render_options_copy_flags() {
        let config = config(&["--anon", "--darken=false", "--color", "teal"]).unwrap();
        let options = config.render_options();
        assert!(options.content.anon);
        assert!(!options.style.darken);
        assert!(options.style.header);
        assert_eq!(options.color, Some(Rgb::new(0x0F, 0x76, 0x6E)));
    }

    #[test]
    fn test_output_paths_are_unique_per_kind() {
        let config = config(&["--output-dir", "build"]).unwrap();
        assert_eq!(config.output_path(DocumentKind::Cv), PathBuf::from("build/cv.pdf"));
        assert_ne!(
            config.output_path(DocumentKind::Cv),
            config.output_path(DocumentKind::CoverLetter)
        );
    }
}
