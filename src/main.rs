use std::env;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tasks_eng::Marketplace;
use tasks_eng::csv::{read_events, write_leaderboard, write_wallets};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args().nth(1).expect("usage: tasks-eng <events.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let market = Marketplace::new();
    let (event_sender, event_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_events(&path) {
            match result {
                Ok(event) => {
                    event_sender.send(event).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    market.run(ReceiverStream::new(event_receiver)).await;

    write_wallets(market.wallets());
    write_leaderboard(market.leaderboard());
}
