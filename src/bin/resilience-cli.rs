use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Inspect and reset a running resilience-core daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "RESILIENCE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon version and breaker count
    Status,
    /// Call and error statistics
    Stats,
    /// Circuit breaker states
    Breakers,
    /// Health report with the issues found
    Health,
    /// Zero the error statistics
    Reset,
    /// Force a circuit breaker closed
    ResetBreaker {
        /// Breaker (policy) name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Stats => client.get(format!("{}/admin/stats", cli.url)),
        Commands::Breakers => client.get(format!("{}/admin/breakers", cli.url)),
        Commands::Health => client.get(format!("{}/admin/health", cli.url)),
        Commands::Reset => client.post(format!("{}/admin/stats/reset", cli.url)),
        Commands::ResetBreaker { name } => {
            client.post(format!("{}/admin/breakers/{}/reset", cli.url, name))
        }
    };

    let res = request.headers(headers).send().await?;
    let health = matches!(cli.command, Commands::Health);
    print_response(res, health).await
}

async fn print_response(
    res: reqwest::Response,
    health: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    // An unhealthy report still carries a JSON body worth printing.
    let has_report = health && status == StatusCode::SERVICE_UNAVAILABLE;
    if !status.is_success() && !has_report {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    if has_report {
        std::process::exit(2);
    }
    Ok(())
}
