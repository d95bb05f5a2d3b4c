//! Marketboard CLI - look up market board prices
//!
//! Prints the lowest listed price for each requested item, answering from
//! the local cache where possible.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use futures::future::join_all;

use marketboard::cli::Cli;
use marketboard::client::HttpTransport;
use marketboard::format::LowestListing;
use marketboard::{ItemId, PriceClient, PriceError};

/// User agent sent with every price request
const USER_AGENT: &str = concat!("marketboard/", env!("CARGO_PKG_VERSION"));

/// Prints one lookup result to stdout
fn print_price(item: &ItemId, price: Option<f64>) {
    match price {
        Some(price) => println!("{}\t{}", item, price),
        None => println!("{}\tno listings", item),
    }
}

/// Looks up every item concurrently through the shared client
async fn lookup_each(client: &PriceClient, items: &[ItemId], server: &str) -> Result<(), PriceError> {
    let lookups = items
        .iter()
        .map(|item| async move { (item, client.get_price(item, server).await) });

    let mut first_error = None;
    for (item, result) in join_all(lookups).await {
        match result {
            Ok(price) => print_price(item, price),
            Err(e) => {
                eprintln!("{}\terror: {}", item, e);
                first_error.get_or_insert(e);
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Looks up every item with a single batch request
async fn lookup_batch(client: &PriceClient, items: &[ItemId], server: &str) -> Result<(), PriceError> {
    let prices = client.get_prices(items, server).await?;
    for item in items {
        print_price(item, prices.get(item).copied().flatten());
    }
    Ok(())
}

/// Builds the client, runs every lookup and flushes the cache
async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.client_config()?;
    let formatter = if cli.hq {
        LowestListing::hq_only()
    } else {
        LowestListing::new()
    };
    let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let client = PriceClient::new(config, formatter, HttpTransport::with_client(http))?;

    let server = client.config().server.clone();
    let items: Vec<ItemId> = cli.items.iter().map(ItemId::from).collect();

    let outcome = if cli.batch {
        lookup_batch(&client, &items, &server).await
    } else {
        lookup_each(&client, &items, &server).await
    };

    // Save whatever was fetched even if a lookup failed
    client.close().await?;
    outcome?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(cli.log_level())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
