//! The mixer daemon: runs the engine and serves the registration RPC.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jobmix::ledger::HttpClient;
use jobmix::mixer::{MixConfig, PollConfig};
use jobmix::{rpc, Amount, Mixer};

#[derive(Parser, Debug)]
#[command(version, about = "Jobcoin mixer daemon", long_about = None)]
struct Args {
    /// Address for the registration RPC listener
    #[arg(long, default_value = "127.0.0.1:9090", env = "JOBMIX_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// Base URL of the Jobcoin API instance
    #[arg(
        long,
        default_value = "https://jobcoin.gemini.com/jobmix",
        env = "JOBMIX_API_URL"
    )]
    api_url: String,

    /// Fee to charge for mixing
    #[arg(long, default_value = "0", env = "JOBMIX_FEE")]
    fee: Amount,

    /// Address that collects fees; generated when omitted
    #[arg(long, env = "JOBMIX_ADDRESS")]
    address: Option<String>,

    /// Mean delay between polls of the Jobcoin API
    #[arg(long, default_value = "10s", env = "JOBMIX_POLL_DELAY")]
    poll_delay: humantime::Duration,

    /// Standard deviation of the delay between polls
    #[arg(long, default_value = "3s", env = "JOBMIX_POLL_DEV")]
    poll_dev: humantime::Duration,

    /// Minimum delay between polls
    #[arg(long, default_value = "2s", env = "JOBMIX_POLL_MIN_DELAY")]
    poll_min_delay: humantime::Duration,

    /// Maximum delay between polls
    #[arg(long, default_value = "20s", env = "JOBMIX_POLL_MAX_DELAY")]
    poll_max_delay: humantime::Duration,

    /// Mean delay between mix payments
    #[arg(long, default_value = "1s", env = "JOBMIX_MIX_DELAY")]
    mix_delay: humantime::Duration,

    /// Standard deviation of the delay between mix payments
    #[arg(long, default_value = "250ms", env = "JOBMIX_MIX_DEV")]
    mix_dev: humantime::Duration,

    /// Minimum delay between mix payments
    #[arg(long, default_value = "50ms", env = "JOBMIX_MIX_MIN_DELAY")]
    mix_min_delay: humantime::Duration,

    /// Maximum delay between mix payments
    #[arg(long, default_value = "3s", env = "JOBMIX_MIX_MAX_DELAY")]
    mix_max_delay: humantime::Duration,

    /// Delay between finding a deposit and its first mix payment
    #[arg(long, default_value = "3m", env = "JOBMIX_MIX_INITIAL_DELAY")]
    mix_initial_delay: humantime::Duration,

    /// Mean amount of Jobcoins sent per payment
    #[arg(long, default_value_t = 10.0, env = "JOBMIX_MIX_AMOUNT")]
    mix_amount: f64,

    /// Standard deviation of the amount sent per payment
    #[arg(long, default_value_t = 8.0, env = "JOBMIX_MIX_DEV_AMOUNT")]
    mix_dev_amount: f64,

    /// Minimum amount of Jobcoins sent per payment
    #[arg(long, default_value_t = 5.0, env = "JOBMIX_MIX_MIN_AMOUNT")]
    mix_min_amount: f64,

    /// Maximum amount of Jobcoins sent per payment
    #[arg(long, default_value_t = 100.0, env = "JOBMIX_MIX_MAX_AMOUNT")]
    mix_max_amount: f64,
}

impl Args {
    fn poll_config(&self) -> PollConfig {
        PollConfig {
            mean_delay: *self.poll_delay,
            std_dev_delay: *self.poll_dev,
            min_delay: *self.poll_min_delay,
            max_delay: *self.poll_max_delay,
        }
    }

    fn mix_config(&self) -> MixConfig {
        MixConfig {
            mean_delay: *self.mix_delay,
            std_dev_delay: *self.mix_dev,
            min_delay: *self.mix_min_delay,
            max_delay: *self.mix_max_delay,
            initial_delay: *self.mix_initial_delay,
            mean_amount: self.mix_amount,
            std_dev_amount: self.mix_dev_amount,
            min_amount: self.mix_min_amount,
            max_amount: self.mix_max_amount,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let client = HttpClient::new(&args.api_url).context("invalid API url")?;
    let mut builder = Mixer::builder(client)
        .with_fee(args.fee)
        .with_poll_config(args.poll_config())
        .with_mix_config(args.mix_config());
    if let Some(address) = &args.address {
        builder = builder.with_address(address.clone());
    }
    let mixer = builder.build();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
                shutdown.cancel();
            }
        }
    });

    let server = {
        let mixer = mixer.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(error) = rpc::serve(mixer, args.listen_addr, shutdown.clone()).await {
                error!(%error, "registration RPC failed");
                shutdown.cancel();
            }
        })
    };

    mixer.start(shutdown).await;
    let _ = server.await;

    Ok(())
}
