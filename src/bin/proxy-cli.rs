use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Inspect a running forward proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:6777")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full status report
    Status,
    /// Cache occupancy and hit ratio
    Cache,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    // Talk to the proxy directly, never through HTTP(S)_PROXY.
    let client = reqwest::Client::builder().no_proxy().build()?;

    let res = client
        .get(format!("{}/proxy-status", cli.url.trim_end_matches('/')))
        .send()
        .await?;
    let Some(report) = read_report(res).await? else {
        return Ok(());
    };

    match cli.command {
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Cache => match report.get("cache") {
            Some(cache) => println!("{}", serde_json::to_string_pretty(cache)?),
            None => println!("Cache is disabled"),
        },
    }

    Ok(())
}

async fn read_report(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }

    Ok(Some(res.json().await?))
}
