use clap::Parser;
use log::{LevelFilter, error, info};
use prtp::receiver::Receiver;
use prtp::transport::PacketChannel;
use prtp_log::PrtpLogger;
use prtp_transfer::cli::ReceiverArgs;
use prtp_transfer::config;
use std::net::SocketAddr;
use std::process;
use std::time::Instant;

#[tokio::main]
async fn main() {
    let args = ReceiverArgs::parse();
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

    let bind = SocketAddr::new(args.local_ip, args.local_port);
    let transport = match PacketChannel::bind(bind, settings.impairments).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("failed to bind {bind}: {e}");
            process::exit(2);
        }
    };

    let mut output = match tokio::fs::File::create(&args.output).await {
        Ok(file) => file,
        Err(e) => {
            error!("failed to create {}: {e}", args.output.display());
            process::exit(2);
        }
    };

    info!("listening on {bind}, writing to {}", args.output.display());
    let started = Instant::now();

    let mut receiver = Receiver::new(transport);
    if let Err(e) = receiver.accept().await {
        error!("open failed: {e}");
        process::exit(1);
    }

    match receiver.receive(&mut output).await {
        Ok(bytes) => {
            if let Err(e) = output.sync_all().await {
                error!("failed to flush {}: {e}", args.output.display());
                process::exit(2);
            }
            info!(
                "done: {bytes} bytes written to {} in {:.2}s",
                args.output.display(),
                started.elapsed().as_secs_f64()
            );
        }
        Err(e) => {
            error!("transfer failed: {e}");
            process::exit(1);
        }
    }
}
