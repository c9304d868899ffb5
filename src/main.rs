use clap::Parser;
use clap_derive::Parser;
use ordered_multicast::bootstrap;
use ordered_multicast::config::MulticastConfig;
use std::path::PathBuf;
use tokio::select;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "ordered-multicast", about = "Totally ordered multicast between a fixed set of hosts")]
struct Args {
    /// port the process listens on for incoming messages
    #[clap(short, long)]
    port: u16,

    /// path to a file containing the list of hosts, one per line
    #[clap(short = 'z', long)]
    hostfile: PathBuf,

    /// number of messages to multicast
    #[clap(short, long, default_value_t = 0)]
    count: u32,

    /// overrides the process id that is otherwise derived from the local hostname
    #[clap(long)]
    process_id: Option<u32>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = MulticastConfig::new(args.port, args.hostfile);
    config.num_messages_to_originate = args.count;
    config.process_id = args.process_id;

    let membership = bootstrap::load_membership(&config).await?;
    let myself = membership.myself();
    let (driver, _handle, mut delivered) = bootstrap::start(&config, membership).await?;

    select! {
        _ = driver.run() => {}
        _ = async {
            while let Some(msg) = delivered.recv().await {
                info!("{}: processed message {} from sender {} with seq ({}, {})", myself, msg.msg_id, msg.sender, msg.final_seq, msg.final_seq_proposer);
            }
        } => {}
    }
    Ok(())
}
