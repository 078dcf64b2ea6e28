//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// kasa-link - discover and control Kasa smart plugs on the local network
#[derive(Parser, Debug)]
#[command(name = "kasa-link")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Command timeout in milliseconds
    #[arg(long, global = true, default_value = "5000", env = "KASA_LINK_TIMEOUT")]
    pub timeout: u64,

    /// Verbose output (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true, env = "KASA_LINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(long, global = true, env = "KASA_LINK_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Directory for the warm-start cache
    #[arg(long, global = true, env = "KASA_LINK_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover devices on the network
    Discover(DiscoverArgs),

    /// Run the engine and show live device state until Ctrl+C
    Watch(WatchArgs),

    /// Switch a relay on or off
    Relay(RelayArgs),

    /// Set dimmer brightness
    Brightness(BrightnessArgs),

    /// Start a countdown that flips the relay
    Countdown(CountdownArgs),

    /// Rename a device
    Alias(AliasArgs),

    /// Query one device directly
    Status(StatusArgs),
}

// ==================== Discover ====================

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Discovery duration in seconds
    #[arg(short, long, default_value = "3")]
    pub duration: u64,

    /// Only show devices whose alias or model matches this pattern
    #[arg(long)]
    pub filter: Option<String>,
}

// ==================== Watch ====================

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Load the warm-start cache at startup and save it on exit
    #[arg(long)]
    pub save_cache: bool,
}

// ==================== Actuation ====================

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Device id, alias or IP address
    pub target: String,

    #[arg(value_enum)]
    pub state: Switch,

    /// Child outlet id on a power strip
    #[arg(long)]
    pub child: Option<String>,

    /// Discovery duration in seconds used to find the target
    #[arg(long, default_value = "2")]
    pub discovery_duration: u64,
}

#[derive(Args, Debug)]
pub struct BrightnessArgs {
    /// Device id, alias or IP address
    pub target: String,

    /// Brightness percentage
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    pub level: u8,

    /// Discovery duration in seconds used to find the target
    #[arg(long, default_value = "2")]
    pub discovery_duration: u64,
}

#[derive(Args, Debug)]
pub struct CountdownArgs {
    /// Device id, alias or IP address
    pub target: String,

    /// Seconds until the relay flips; 0 clears the countdown
    pub seconds: u32,

    /// Discovery duration in seconds used to find the target
    #[arg(long, default_value = "2")]
    pub discovery_duration: u64,
}

#[derive(Args, Debug)]
pub struct AliasArgs {
    /// Device id, alias or IP address
    pub target: String,

    /// New name
    pub name: String,

    /// Discovery duration in seconds used to find the target
    #[arg(long, default_value = "2")]
    pub discovery_duration: u64,
}

// ==================== Status ====================

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Device IP address
    pub ip: String,
}
