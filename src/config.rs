//! CLI and configuration input
//!
//! The configuration file carries at least three lines: range start (hex),
//! range end (hex) and one or more public keys. The same values can be given
//! directly on the command line, in which case an ephemeral config file is
//! materialised and removed on exit.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::Point;

/// Pollard kangaroo interval-ECDLP solver for secp256k1
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of CPU threads (default: all cores)
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Distinguished-point bits (default: auto)
    #[arg(short = 'd', long = "dp")]
    pub dp: Option<i32>,

    /// Save work to this file
    #[arg(short = 'w', long = "work")]
    pub work_file: Option<PathBuf>,

    /// Save a text mirror of the work file
    #[arg(long = "work-text", visible_alias = "wtext")]
    pub work_text_file: Option<PathBuf>,

    /// Resume work from this file
    #[arg(short = 'i', long = "input")]
    pub input_work_file: Option<PathBuf>,

    /// Save period in seconds
    #[arg(long = "work-interval", visible_alias = "wi", default_value_t = 60.0)]
    pub save_period: f64,

    /// Include kangaroo states in saved work
    #[arg(long = "save-kangaroo", visible_alias = "ws")]
    pub save_kangaroo: bool,

    /// Timestamp-rotate the work file and clear the table on each save
    #[arg(long = "wsplit")]
    pub split_workfile: bool,

    /// Verify a work file's integrity and exit
    #[arg(long = "wcheck", value_name = "FILE")]
    pub check_work_file: Option<PathBuf>,

    /// Print work file info and exit
    #[arg(long = "winfo", value_name = "FILE")]
    pub work_info: Option<PathBuf>,

    /// Abort a key after maxStep * expected operations
    #[arg(short = 'm', long = "max-step", default_value_t = 0.0)]
    pub max_step: f64,

    /// Append solutions to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output_file: Option<PathBuf>,

    /// Run the arithmetic/device self test and exit
    #[arg(long = "check")]
    pub check: bool,

    /// Use the (x, ±y) symmetry walk
    #[arg(long = "sym")]
    pub use_symmetry: bool,

    /// Enable device workers
    #[arg(long = "gpu")]
    pub gpu: bool,

    /// Device backend to use with --gpu
    #[arg(long = "gpu-backend", default_value = "reference")]
    pub gpu_backend: String,

    /// Device grid size as X,Y
    #[arg(short = 'g', long = "grid", value_name = "X,Y")]
    pub grid: Option<String>,

    /// Range start, hexadecimal
    #[arg(long = "start-hex", value_name = "HEX")]
    pub start_hex: Option<String>,

    /// Range end, hexadecimal
    #[arg(long = "end-hex", value_name = "HEX")]
    pub end_hex: Option<String>,

    /// Range start, decimal
    #[arg(long = "start-dec", value_name = "DEC")]
    pub start_dec: Option<String>,

    /// Range end, decimal
    #[arg(long = "end-dec", value_name = "DEC")]
    pub end_dec: Option<String>,

    /// Public key (compressed 02/03 or uncompressed 04 hex)
    #[arg(long = "pubkey", value_name = "HEX")]
    pub pubkey: Option<String>,

    /// Configuration file
    #[arg(value_name = "CONFIG")]
    pub config_file: Option<PathBuf>,
}

/// Parsed search input.
#[derive(Debug, Clone)]
pub struct SearchInput {
    pub range_start: BigInt256,
    pub range_end: BigInt256,
    pub keys: Vec<Point>,
}

/// Parse a configuration file: rangeStart, rangeEnd, then one or more public
/// keys. Keys that do not lie on the curve fail validation.
pub fn parse_config_file(path: &Path, curve: &Secp256k1) -> Result<SearchInput> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("cannot open {}: {e}", path.display())))?;
    let lines: Vec<&str> = content.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < 3 {
        return Err(Error::Input(format!("{}: not enough arguments", path.display())));
    }

    let range_start = BigInt256::from_hex(lines[0])?;
    let range_end = BigInt256::from_hex(lines[1])?;
    if range_start >= range_end {
        return Err(Error::Input("range start must be below range end".into()));
    }

    let mut keys = Vec::new();
    for (i, line) in lines[2..].iter().enumerate() {
        let key = curve
            .parse_public_key_hex(line)
            .map_err(|e| Error::Input(format!("{}, error line {}: {e}", path.display(), i + 3)))?;
        keys.push(key);
    }

    Ok(SearchInput { range_start, range_end, keys })
}

/// Build the ephemeral config from the CLI range flags. The returned temp
/// file deletes itself when dropped at exit.
pub fn ephemeral_config(args: &Args) -> Result<Option<NamedTempFile>> {
    let have_dec = args.start_dec.is_some() || args.end_dec.is_some();
    let have_hex = args.start_hex.is_some() || args.end_hex.is_some();
    if !have_dec && !have_hex && args.pubkey.is_none() {
        return Ok(None);
    }

    if have_dec && have_hex {
        return Err(Error::Input(
            "do not mix --start-dec/--end-dec with --start-hex/--end-hex".into(),
        ));
    }
    let (start, end) = if have_dec {
        let s = args
            .start_dec
            .as_deref()
            .ok_or_else(|| Error::Input("both --start-dec and --end-dec are required".into()))?;
        let e = args
            .end_dec
            .as_deref()
            .ok_or_else(|| Error::Input("both --start-dec and --end-dec are required".into()))?;
        (BigInt256::from_dec(s)?, BigInt256::from_dec(e)?)
    } else if have_hex {
        let s = args
            .start_hex
            .as_deref()
            .ok_or_else(|| Error::Input("both --start-hex and --end-hex are required".into()))?;
        let e = args
            .end_hex
            .as_deref()
            .ok_or_else(|| Error::Input("both --start-hex and --end-hex are required".into()))?;
        (BigInt256::from_hex(s)?, BigInt256::from_hex(e)?)
    } else {
        return Err(Error::Input("missing start/end range".into()));
    };
    if start > end {
        return Err(Error::Input("range start must not exceed range end".into()));
    }

    let pubkey = args
        .pubkey
        .as_deref()
        .ok_or_else(|| Error::Input("--pubkey HEX is required with CLI range input".into()))?;
    if !is_pubkey_hex(pubkey) {
        return Err(Error::Input(
            "--pubkey must be compressed (02/03) or uncompressed (04) hex".into(),
        ));
    }

    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", start.to_hex_padded())?;
    writeln!(file, "{}", end.to_hex_padded())?;
    writeln!(file, "{}", pubkey.to_uppercase())?;
    file.flush()?;
    Ok(Some(file))
}

fn is_pubkey_hex(s: &str) -> bool {
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    matches!(
        (s.len(), &s[..2.min(s.len())]),
        (66, "02") | (66, "03") | (130, "04")
    )
}

/// Parse the `-g X,Y` grid argument.
pub fn parse_grid(s: &str) -> Result<(usize, usize)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(Error::Input(format!("invalid grid size {s:?}, expected X,Y")));
    }
    let x = parts[0]
        .trim()
        .parse()
        .map_err(|_| Error::Input(format!("invalid grid size {s:?}")))?;
    let y = parts[1]
        .trim()
        .parse()
        .map_err(|_| Error::Input(format!("invalid grid size {s:?}")))?;
    Ok((x, y))
}
