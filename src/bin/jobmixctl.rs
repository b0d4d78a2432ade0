//! Command-line client for the mixer and the Jobcoin API.

use anyhow::Context;
use clap::{Parser, Subcommand};

use jobmix::ledger::HttpClient;
use jobmix::rpc::{MixerClient, RegisterRequest};
use jobmix::{Amount, JobcoinClient};

#[derive(Parser, Debug)]
#[command(version, about = "Jobcoin mixer client", long_about = None)]
struct Args {
    /// Base URL of the Jobcoin API instance
    #[arg(
        long,
        global = true,
        default_value = "https://jobcoin.gemini.com/jobmix",
        env = "JOBMIX_API_URL"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register your addresses with a mixer and print the deposit address
    Register {
        /// gRPC address of the mixer, e.g. http://127.0.0.1:9090
        mixer_addr: String,
        /// Addresses that will receive your mixed Jobcoins
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Send Jobcoins from one address to another
    Send {
        from: String,
        to: String,
        amount: Amount,
    },
    /// Print the balance and history of an address
    AddrInfo { addr: String },
    /// Mint Jobcoins for an address
    Create { addr: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Register {
            mixer_addr,
            addresses,
        } => {
            let mut client = MixerClient::connect(mixer_addr.clone())
                .await
                .with_context(|| format!("connecting to {mixer_addr}"))?;
            let response = client
                .register(RegisterRequest { addresses })
                .await
                .context("registration failed")?;
            println!("{}", response.into_inner().address);
        }
        Command::Send { from, to, amount } => {
            let client = HttpClient::new(&args.api_url)?;
            client.post_transaction(&from, &to, amount).await?;
            println!("sent {amount} from {from} to {to}");
        }
        Command::AddrInfo { addr } => {
            let client = HttpClient::new(&args.api_url)?;
            let info = client.address_info(&addr).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Create { addr } => {
            let client = HttpClient::new(&args.api_url)?;
            client.create(&addr).await?;
            println!("created Jobcoins for {addr}");
        }
    }

    Ok(())
}
