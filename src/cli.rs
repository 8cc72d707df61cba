use crate::core::planner::MAX_SEGMENTS;
use crate::driver::DriverContext;
use clap::{Arg, ArgAction, ArgMatches, Command};
use sanitize_filename::sanitize;
use std::path::PathBuf;
use url::Url;

pub fn build_cli() -> Command {
    let download = Command::new("download")
        .about("Download one resource in concurrent byte-range segments")
        .arg(Arg::new("url").help("Resource to download (prompted for when omitted)").num_args(1))
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("Target file (prompted for when omitted)")
                .num_args(1),
        )
        .arg(
            Arg::new("segments")
                .long("segments")
                .short('s')
                .help(format!("Number of segments, at most {MAX_SEGMENTS} (prompted for when omitted)"))
                .value_parser(clap::value_parser!(u64))
                .num_args(1),
        )
        .arg(
            Arg::new("temp_dir")
                .long("temp-dir")
                .help("Directory for the section-<n>.tmp files")
                .default_value(".")
                .num_args(1),
        )
        .arg(
            Arg::new("header")
                .long("header")
                .help_heading("HTTP")
                .help("Extra HTTP header (repeatable), e.g. --header 'Authorization: Bearer xxx'")
                .action(ArgAction::Append)
                .num_args(1),
        )
        .arg(
            Arg::new("user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("HTTP User-Agent")
                .num_args(1),
        )
        .arg(
            Arg::new("timeout_secs")
                .long("timeout-secs")
                .help_heading("HTTP")
                .help("Seconds to wait for a response")
                .default_value("60")
                .value_parser(clap::value_parser!(u64))
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Debug logging (RUST_LOG overrides)")
                .action(ArgAction::SetTrue),
        );

    Command::new("segfetch")
        .about("Segmented HTTP(S) downloader")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(download)
}

/// `download` arguments; the first three may still be missing.
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    pub url: Option<String>,
    pub output: Option<PathBuf>,
    pub segments: Option<u64>,
    pub temp_dir: PathBuf,
    pub driver_ctx: DriverContext,
    pub verbose: bool,
}

impl DownloadArgs {
    pub fn from_matches(m: &ArgMatches) -> anyhow::Result<Self> {
        let mut driver_ctx = DriverContext::default();
        if let Some(ua) = m.get_one::<String>("user_agent") {
            driver_ctx.user_agent = ua.clone();
        }
        if let Some(t) = m.get_one::<u64>("timeout_secs") {
            driver_ctx.timeout_secs = *t;
        }
        if let Some(values) = m.get_many::<String>("header") {
            for h in values {
                let (k, v) = h
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("invalid header format: {}", h))?;
                driver_ctx.headers.insert(k.trim().to_string(), v.trim().to_string());
            }
        }

        Ok(Self {
            url: m.get_one::<String>("url").cloned(),
            output: m.get_one::<String>("output").map(PathBuf::from),
            segments: m.get_one::<u64>("segments").copied(),
            temp_dir: m
                .get_one::<String>("temp_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            driver_ctx,
            verbose: m.get_flag("verbose"),
        })
    }
}

/// File name suggested by the last path segment of `raw`.
pub fn default_file_name(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|s| s.last())
                .filter(|s| !s.is_empty())
                .map(sanitize)
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download.bin".to_string())
}
