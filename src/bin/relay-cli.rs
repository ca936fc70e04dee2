use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Operator CLI for the API relay", long_about = None)]
struct Cli {
    /// Base URL of the relay service.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Origin presented to the relay. Defaults to the relay's own URL.
    #[arg(short, long)]
    origin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay status
    Health,
    /// Relay a single request through the service
    Send {
        /// Target URL
        target: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// JSON body (sent as a string if it is not valid JSON)
        #[arg(short, long)]
        data: Option<String>,

        /// Auth type: bearer, basic or api-key
        #[arg(long, requires = "credentials")]
        auth: Option<String>,

        #[arg(long)]
        credentials: Option<String>,

        /// Header name for api-key auth
        #[arg(long)]
        header_name: Option<String>,

        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            print_response(res).await?;
        }
        Commands::Send {
            target,
            method,
            data,
            auth,
            credentials,
            header_name,
            timeout_ms,
        } => {
            let mut payload = json!({ "url": target, "method": method.to_uppercase() });
            if let Some(data) = data {
                payload["body"] = serde_json::from_str(&data).unwrap_or(Value::String(data));
            }
            if let (Some(kind), Some(credentials)) = (auth, credentials) {
                let mut spec = json!({ "type": kind, "credentials": credentials });
                if let Some(name) = header_name {
                    spec["headerName"] = Value::String(name);
                }
                payload["auth"] = spec;
            }
            if let Some(ms) = timeout_ms {
                payload["timeoutMs"] = json!(ms);
            }

            let origin = cli.origin.as_deref().unwrap_or(base);
            let mut headers = HeaderMap::new();
            headers.insert(ORIGIN, HeaderValue::from_str(origin)?);

            let res = client
                .post(format!("{base}/api/relay"))
                .headers(headers)
                .json(&payload)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
