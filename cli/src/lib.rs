// Command parsing, configuration and report formatting, kept out of main.rs for testing
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mumble_link_shared_memory::{RegionOrigin, DEFAULT_LINK_NAME, LINK_BYTES};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

/// Inspect the MumbleLink shared memory region
#[derive(Parser, Debug, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,

    /// Link name (defaults to the config file value, then "MumbleLink")
    #[clap(short, long, global = true)]
    pub name: Option<String>,

    /// Configuration file path
    #[clap(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug logging (same as --log-level=debug)
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Open the link, report what was found and close it again
    Inspect {
        /// Print the report as JSON
        #[clap(long)]
        json: bool,
    },

    /// Hex dump a byte range of the link
    Dump {
        /// First byte to dump
        #[clap(long, default_value = "0")]
        offset: usize,

        /// Number of bytes (0 dumps to the end of the region)
        #[clap(long, default_value = "0")]
        length: usize,
    },

    /// Keep the link open until Ctrl-C
    Hold,
}

/// Settings read from the optional TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Link name to open
    #[serde(default = "default_name")]
    pub name: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    DEFAULT_LINK_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl CliConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }
}

/// Load the config file, if any, and apply command line overrides
pub fn load_config(cli: &Cli) -> Result<CliConfig> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };

    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    Ok(config)
}

/// What `inspect` found in the region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkReport {
    pub name: String,
    pub origin: &'static str,
    pub size: usize,
    pub nonzero_bytes: usize,
}

impl LinkReport {
    pub fn new(name: &str, origin: RegionOrigin, view: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            origin: origin_label(origin),
            size: view.len(),
            nonzero_bytes: view.iter().filter(|b| **b != 0).count(),
        }
    }
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name:          {}", self.name)?;
        writeln!(f, "origin:        {}", self.origin)?;
        writeln!(f, "size:          {} bytes", self.size)?;
        writeln!(f, "non-zero:      {} bytes", self.nonzero_bytes)
    }
}

pub fn origin_label(origin: RegionOrigin) -> &'static str {
    match origin {
        RegionOrigin::Attached => "attached",
        RegionOrigin::Created => "created",
    }
}

/// Number of bytes `dump` reads; zero means everything after `offset`.
///
/// Fails if the range does not fit in the region.
pub fn dump_length(offset: usize, length: usize) -> Result<usize> {
    let length = if length == 0 {
        LINK_BYTES.saturating_sub(offset)
    } else {
        length
    };

    match offset.checked_add(length) {
        Some(end) if end <= LINK_BYTES => Ok(length),
        _ => Err(anyhow::anyhow!(
            "dump range {}+{} is outside the {}-byte region",
            offset,
            length,
            LINK_BYTES
        )),
    }
}

/// Classic 16-bytes-per-line hex dump, addressed from `base`
pub fn hex_dump(base: usize, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<47}  |{}|", base + i * 16, hex.join(" "), ascii);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn cli_with(config: Option<PathBuf>) -> Cli {
        Cli {
            command: Command::Hold,
            name: None,
            config,
            log_level: None,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["mumble-link", "inspect"]).unwrap();
        assert_eq!(cli.command, Command::Inspect { json: false });
        assert_eq!(cli.name, None);
        assert_eq!(cli.log_level, None);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_with_options() {
        let cli = Cli::try_parse_from([
            "mumble-link",
            "--name", "Local\\MumbleLink",
            "--config", "/path/to/link.toml",
            "inspect",
            "--json",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(cli.command, Command::Inspect { json: true });
        assert_eq!(cli.name.as_deref(), Some("Local\\MumbleLink"));
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/link.toml")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_dump_command() {
        let cli = Cli::try_parse_from(["mumble-link", "dump", "--offset", "4", "--length", "32"]).unwrap();
        assert_eq!(cli.command, Command::Dump { offset: 4, length: 32 });

        let cli = Cli::try_parse_from(["mumble-link", "dump"]).unwrap();
        assert_eq!(cli.command, Command::Dump { offset: 0, length: 0 });
    }

    #[test]
    fn test_invalid_command() {
        let err = Cli::try_parse_from(["mumble-link", "publish"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);

        assert!(Cli::try_parse_from(["mumble-link"]).is_err());
    }

    #[test]
    fn test_load_config_with_default() {
        let config = load_config(&cli_with(None)).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.name, "MumbleLink");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_config_with_nonexistent_file() {
        let result = load_config(&cli_with(Some(PathBuf::from("/nonexistent/link.toml"))));
        assert!(result.unwrap_err().to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_load_config_with_valid_file() -> anyhow::Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, r#"name = "MumbleLink_test""#)?;

        let config = load_config(&cli_with(Some(temp_file.path().to_path_buf())))?;
        assert_eq!(config.name, "MumbleLink_test");
        // Missing keys fall back to defaults
        assert_eq!(config.log_level, "info");

        Ok(())
    }

    #[test]
    fn test_flags_override_config_file() -> anyhow::Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "name = \"from_file\"\nlog_level = \"warn\"")?;

        let mut cli = cli_with(Some(temp_file.path().to_path_buf()));
        cli.name = Some("from_flag".to_string());
        cli.log_level = Some("trace".to_string());
        let config = load_config(&cli)?;
        assert_eq!(config.name, "from_flag");
        assert_eq!(config.log_level, "trace");

        cli.verbose = true;
        assert_eq!(load_config(&cli)?.log_level, "debug");

        Ok(())
    }

    #[test]
    fn test_report() {
        let mut view = vec![0u8; LINK_BYTES];
        view[0] = 2;
        view[10] = 0xFF;

        let report = LinkReport::new("MumbleLink", RegionOrigin::Attached, &view);
        assert_eq!(report.origin, "attached");
        assert_eq!(report.size, LINK_BYTES);
        assert_eq!(report.nonzero_bytes, 2);

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["origin"], "attached");
        assert_eq!(json["nonzero_bytes"], 2);
        assert!(report.to_string().contains("5460 bytes"));
    }

    #[test]
    fn test_dump_length() {
        assert_eq!(dump_length(0, 0).unwrap(), LINK_BYTES);
        assert_eq!(dump_length(100, 0).unwrap(), LINK_BYTES - 100);
        assert_eq!(dump_length(100, 16).unwrap(), 16);
        assert_eq!(dump_length(LINK_BYTES - 1, 1).unwrap(), 1);

        assert!(dump_length(LINK_BYTES + 1, 0).is_err());
        assert!(dump_length(LINK_BYTES - 1, 2).is_err());
        // Rejected before any buffer of that size is allocated
        let err = dump_length(0, usize::MAX).unwrap_err();
        assert!(err.to_string().contains("outside the 5460-byte region"));
        assert!(dump_length(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_hex_dump() {
        let dump = hex_dump(0x10, b"AB\0");
        assert!(dump.starts_with("00000010  41 42 00 "));
        assert!(dump.ends_with("  |AB.|\n"));

        let dump = hex_dump(0, &[0u8; 33]);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("00000010"));
        assert!(lines[2].starts_with("00000020  00 "));
        // Short last lines are padded so the ASCII column lines up
        assert_eq!(lines[0].find('|'), lines[2].find('|'));
    }
}
