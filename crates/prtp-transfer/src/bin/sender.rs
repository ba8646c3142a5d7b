use clap::Parser;
use log::{LevelFilter, error, info};
use prtp::sender::Sender;
use prtp::transport::PacketChannel;
use prtp_log::PrtpLogger;
use prtp_transfer::cli::SenderArgs;
use prtp_transfer::config;
use std::net::SocketAddr;
use std::process;

#[tokio::main]
async fn main() {
    let args = SenderArgs::parse();
    let level = if args.channel.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = PrtpLogger::init(level);

    let settings = match config::resolve(&args.channel) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };

    let data = match tokio::fs::read(&args.file).await {
        Ok(data) => data,
        Err(e) => {
            error!("failed to read {}: {e}", args.file.display());
            process::exit(2);
        }
    };

    let bind = SocketAddr::new(args.local_ip, args.local_port);
    let transport = match PacketChannel::bind(bind, settings.impairments).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("failed to bind {bind}: {e}");
            process::exit(2);
        }
    };

    let peer = SocketAddr::new(args.remote_ip, args.remote_port);
    info!(
        "sending {} ({} bytes) to {peer}",
        args.file.display(),
        data.len()
    );

    let mut sender = Sender::new(transport, peer, settings.initial_window);
    match sender.transfer(&data).await {
        Ok(stats) => info!(
            "done: {} bytes in {} segments, {} retransmitted ({} fast, {} timeouts), peak cwnd {:.1}, {:.2}s",
            stats.payload_bytes,
            stats.data_segments,
            stats.retransmissions,
            stats.fast_retransmits,
            stats.timeouts,
            stats.peak_cwnd,
            stats.elapsed.as_secs_f64()
        ),
        Err(e) => {
            error!("transfer failed: {e}");
            process::exit(1);
        }
    }
}
