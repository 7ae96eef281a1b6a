//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Watch web pages and report newly appeared links.
///
/// Register pages with a CSS selector for the links you care about, then run
/// `sitewatch check` periodically to print links that were not there before.
#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Database file (defaults to the XDG data directory)
    #[arg(long, env = "SITEWATCH_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered sites
    List(ListArgs),
    /// Show one site in detail
    Show(SiteIdArg),
    /// List discovered links
    Links(LinksArgs),
    /// Register a site
    Add(AddArgs),
    /// Change a site
    Modify(ModifyArgs),
    /// Delete a site with its snapshots and links
    Remove(SiteIdArg),
    /// Check sites and print new links
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Also print url, selector and headers
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SiteIdArg {
    /// Site id
    pub site_id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct LinksArgs {
    /// Only links of this site
    #[arg(long)]
    pub site_id: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Unique display name
    pub name: String,
    /// Page to watch
    pub url: String,
    /// CSS selector matching the links to report
    pub css_selector: String,
    /// Request header sent with every fetch, as 'Name: Value' (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct ModifyArgs {
    /// Site id
    pub site_id: i64,
    /// New display name
    #[arg(long)]
    pub name: Option<String>,
    /// New page URL
    #[arg(long)]
    pub url: Option<String>,
    /// New CSS selector
    #[arg(long)]
    pub css_selector: Option<String>,
    /// Replace the stored headers, as 'Name: Value' (repeatable)
    #[arg(
        short = 'H',
        long = "header",
        value_parser = parse_header,
        conflicts_with = "clear_headers"
    )]
    pub headers: Vec<(String, String)>,
    /// Remove all stored headers
    #[arg(long)]
    pub clear_headers: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Only check this site
    #[arg(long)]
    pub site_id: Option<i64>,

    /// Checks in flight per host (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Minimum seconds between checks on one lane (0-3600, fractional allowed)
    #[arg(short = 'w', long, value_parser = parse_wait_secs)]
    pub wait: Option<f64>,

    /// Give up on a single check after this many seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: Value', got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_wait_secs(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("expected seconds, got '{raw}'"))?;
    if !(0.0..=3600.0).contains(&value) {
        return Err(format!("wait must be between 0 and 3600 seconds, got {value}"));
    }
    Ok(value)
}
