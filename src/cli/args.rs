//! Command-line argument parsing.
//!
//! A flat positional-then-flags form (`archive_path`, `registry_url`, then
//! options) — no subcommand tree. Boolean flags take an explicit
//! `true`/`false`/`1`/`0` argument rather than treating any non-empty
//! string as true.

use crate::config::{AuthConfig, PushConfig, TagRewrite};
use crate::error::{PusherError, Result};
use crate::logging::Verbosity;
use clap::Parser;
use std::path::PathBuf;

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!(
            "invalid boolean value '{other}', expected one of: true, false, 1, 0, yes, no, on, off"
        )),
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "archive-registry-pusher",
    version,
    about = "Pushes every image in a docker-save-style tar archive to a Docker Registry HTTP API v2 endpoint"
)]
pub struct Args {
    /// Path to the archive (tar) to push.
    pub archive_path: PathBuf,

    /// Base URL of the destination registry, e.g. `registry.example.com:5000`.
    pub registry_url: String,

    /// Number of images pushed concurrently.
    #[arg(short = 'p', long, default_value_t = 1)]
    pub parallel: usize,

    /// Registry login, if the registry requires HTTP Basic auth.
    #[arg(long)]
    pub login: Option<String>,

    /// Registry password, if the registry requires HTTP Basic auth.
    #[arg(long)]
    pub password: Option<String>,

    /// Verify the registry's TLS certificate.
    #[arg(long, value_parser = parse_bool, default_value = "true")]
    pub ssl_verify: bool,

    /// Stream per-chunk upload progress to the console. Forced off when
    /// `--parallel` exceeds 1.
    #[arg(long, value_parser = parse_bool, default_value = "false")]
    pub stream: bool,

    /// Recompress every layer to gzip before pushing it.
    #[arg(long, default_value_t = false)]
    pub gzip_layers: bool,

    /// Scratch directory for archive extraction (defaults to the system temp dir).
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Overrides `--tmp-dir` unconditionally, even if both are given.
    #[arg(long)]
    pub tmp_dir_override: Option<PathBuf>,

    /// Regex matched against the tag portion only (anchored), not the
    /// repository, of each `repository:tag` reference before it is pushed.
    #[arg(long, requires = "replace_tags_target")]
    pub replace_tags_match: Option<String>,

    /// Replacement text for `--replace-tags-match`, using `$1`-style capture references.
    #[arg(long, requires = "replace_tags_match")]
    pub replace_tags_target: Option<String>,

    /// Write logs to this file in addition to the console.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Disable ANSI color in console output.
    #[arg(long, default_value_t = false)]
    pub no_color: bool,

    /// Suppress all but warnings and errors.
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Increase console verbosity; repeat for trace-level output (`-vv`).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }

    /// Builds the resolved [`PushConfig`] this run will execute with,
    /// compiling the tag-rewrite regex if one was given.
    pub fn into_push_config(self) -> Result<PushConfig> {
        let tag_rewrite = match (self.replace_tags_match, self.replace_tags_target) {
            (Some(pattern), Some(target)) => Some(TagRewrite {
                match_regex: regex::Regex::new(&pattern)
                    .map_err(|e| PusherError::config(format!("invalid --replace-tags-match regex: {e}")))?,
                target,
            }),
            _ => None,
        };

        Ok(PushConfig {
            archive_path: self.archive_path,
            registry_url: self.registry_url,
            parallel: self.parallel.max(1),
            auth: AuthConfig {
                login: self.login,
                password: self.password,
            },
            ssl_verify: self.ssl_verify,
            stream: self.stream,
            gzip_layers: self.gzip_layers,
            tmp_dir: self.tmp_dir,
            tmp_dir_override: self.tmp_dir_override,
            tag_rewrite,
        }
        .normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_canonical_forms() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool("false"), Ok(false));
        assert_eq!(parse_bool("1"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
    }

    #[test]
    fn parse_bool_rejects_the_argparse_foot_gun() {
        // Under Python's argparse with type=bool, "false" is truthy because
        // any non-empty string is truthy. This parser must not repeat that.
        assert!(!parse_bool("false").unwrap());
        assert!(parse_bool("garbage").is_err());
    }

    #[test]
    fn verbosity_escalates_with_repeated_v() {
        let mut args = Args::try_parse_from(["bin", "a.tar", "registry.local"]).unwrap();
        assert_eq!(args.verbosity(), Verbosity::Normal);
        args.verbose = 1;
        assert_eq!(args.verbosity(), Verbosity::Verbose);
        args.verbose = 2;
        assert_eq!(args.verbosity(), Verbosity::Trace);
    }

    #[test]
    fn quiet_overrides_verbose_count() {
        let mut args = Args::try_parse_from(["bin", "a.tar", "registry.local"]).unwrap();
        args.quiet = true;
        assert_eq!(args.verbosity(), Verbosity::Quiet);
    }
}
