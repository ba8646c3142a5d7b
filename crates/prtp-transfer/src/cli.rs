use clap::{Args, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

/// Shared impairment and window flags. Values left unset fall back to the
/// TOML profile (if given), then to clean-channel defaults.
#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Probability in [0,1] that an outgoing datagram is dropped.
    #[arg(long)]
    pub loss_rate: Option<f64>,

    /// Probability in [0,1] that one bit of an outgoing datagram flips.
    #[arg(long)]
    pub corruption_rate: Option<f64>,

    /// Minimum injected delivery delay, in seconds.
    #[arg(long)]
    pub min_delay: Option<f64>,

    /// Maximum injected delivery delay, in seconds.
    #[arg(long)]
    pub max_delay: Option<f64>,

    /// Initial congestion window, in segments.
    #[arg(long)]
    pub initial_window: Option<f64>,

    /// Optional TOML profile supplying any of the flags above.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log protocol state transitions as well as lifecycle events.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Send a file over PRTP.
#[derive(Parser, Debug)]
#[command(name = "prtp-send", version, about)]
pub struct SenderArgs {
    /// Local address to bind the UDP socket to.
    #[arg(long, default_value = "127.0.0.1")]
    pub local_ip: IpAddr,

    /// Local port; 0 picks an ephemeral one.
    #[arg(long, default_value_t = 0)]
    pub local_port: u16,

    /// Receiver address.
    #[arg(long, default_value = "127.0.0.1")]
    pub remote_ip: IpAddr,

    /// Receiver port.
    #[arg(long)]
    pub remote_port: u16,

    /// File to transmit.
    #[arg(long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub channel: ChannelArgs,
}

/// Receive a file over PRTP.
#[derive(Parser, Debug)]
#[command(name = "prtp-recv", version, about)]
pub struct ReceiverArgs {
    /// Local address to bind the UDP socket to.
    #[arg(long, default_value = "127.0.0.1")]
    pub local_ip: IpAddr,

    /// Local port the sender will target.
    #[arg(long)]
    pub local_port: u16,

    /// Destination path for the received bytes.
    #[arg(long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub channel: ChannelArgs,
}
