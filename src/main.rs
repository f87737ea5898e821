use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime;
use tokio::signal;
use tokio::time::Instant;
use tracing::{info, warn};

use relaymq::{
    global_config, setup_local_tracing, AppResult, Dispatcher, DispatcherConfig, Metadata,
    GLOBAL_CONFIG,
};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> AppResult<()> {
    setup_local_tracing()?;

    let commandline = CommandLine::parse();
    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("conf.toml"), PathBuf::from);
    let dispatcher_config = DispatcherConfig::set_up_config(config_path)?;
    GLOBAL_CONFIG
        .set(dispatcher_config)
        .expect("set dispatcher config failed");

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run())
}

async fn run() -> AppResult<()> {
    let config = Arc::new(global_config().clone());
    let metadata = Arc::new(Metadata::from_config(&config.metadata)?);

    let mut dispatcher = Dispatcher::new(config)?;
    dispatcher.start(metadata)?;
    info!("dispatcher running");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("got shutdown signal");
        }
        _ = dispatcher.pause_button().pushed() => {
            warn!("pause asserted, dispatcher restart with fresh metadata is required");
        }
    }

    if dispatcher.start_slow_shutdown(Instant::now()).await.is_err() {
        // a connector-initiated pause can race the signal path
        warn!("slow shutdown rejected, falling back to join");
    }
    dispatcher.join_all().await?;

    for broker_index in 0..dispatcher.broker_count() {
        let send_wait = dispatcher.take_send_wait_queue_after_shutdown(broker_index)?;
        let no_ack = dispatcher.take_no_ack_queue_after_shutdown(broker_index)?;
        let send_wait_msgs: usize = send_wait.iter().map(|l| l.len()).sum();
        let no_ack_msgs: usize = no_ack.iter().map(|l| l.len()).sum();
        if send_wait_msgs > 0 || no_ack_msgs > 0 {
            warn!(
                broker_index,
                send_wait_msgs, no_ack_msgs, "residual messages left after shutdown"
            );
        }
    }

    info!(ok = dispatcher.shutdown_was_ok(), "dispatcher shutdown complete");
    Ok(())
}
