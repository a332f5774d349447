use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use simple_error::{bail, SimpleError};

use n3dscap::layout::RECONNECT_DELAY;
use n3dscap::AuxProfiles;

/// Largest audio block a frame could carry while still fitting the protocol.
const MAX_AUX_BYTES: usize = 0x4000;

#[derive(Parser, Debug)]
#[command(version, about = "Capture video and audio from a New 3DS capture board")]
pub struct Args {
    /// Audio bytes per frame, skipping the bitstream version lookup
    #[arg(long, env = "N3DSCAP_AUX_SIZE", value_parser = parse_size)]
    pub aux_size: Option<usize>,

    /// Audio bytes per frame for one bitstream version, as VERSION=BYTES
    #[arg(long = "aux-profile", value_parser = parse_profile)]
    pub aux_profiles: Vec<(u8, usize)>,

    /// Delay between attempts to find the device
    #[arg(long, default_value_t = RECONNECT_DELAY.as_millis() as u64)]
    pub reconnect_ms: u64,

    /// Do not open an audio output device
    #[arg(long)]
    pub no_audio: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stream until interrupted (default)
    Run {
        /// Save the first good frame to this file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Print the board's bitstream version and config registers
    Info,
    /// Capture one frame to an image file and exit
    Snapshot { path: PathBuf },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { snapshot: None })
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn profiles(&self) -> AuxProfiles {
        let mut profiles = AuxProfiles::default();
        for (version, size) in &self.aux_profiles {
            profiles.insert(*version, *size);
        }
        if let Some(size) = self.aux_size {
            profiles.force(size);
        }
        profiles
    }
}

/// Accepts decimal or `0x` hex.
pub fn parse_size(s: &str) -> Result<usize, SimpleError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };

    let size = parsed.map_err(|e| SimpleError::with(&format!("invalid size '{}'", s), e))?;
    if size == 0 || size > MAX_AUX_BYTES {
        bail!("audio size {} out of range 1..={}", size, MAX_AUX_BYTES);
    }
    Ok(size)
}

pub fn parse_profile(s: &str) -> Result<(u8, usize), SimpleError> {
    let Some((version, size)) = s.split_once('=') else {
        bail!("expected VERSION=BYTES, got '{}'", s);
    };

    let version = version
        .trim()
        .parse::<u8>()
        .map_err(|e| SimpleError::with(&format!("invalid version '{}'", version), e))?;
    Ok((version, parse_size(size)?))
}
