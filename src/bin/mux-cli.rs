use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde_json::{json, Value};

use http_multiplexer::http::MuxResponse;

#[derive(Parser)]
#[command(name = "mux-cli")]
#[command(about = "Send a fan-out request to an http-multiplexer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080/api/mux")]
    url: String,

    /// Print payloads as text instead of base64
    #[arg(short, long)]
    decode: bool,

    /// Target URLs, in order
    #[arg(required = true)]
    targets: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = client
        .post(&cli.url)
        .json(&json!({ "urls": cli.targets }))
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: multiplexer returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let body: MuxResponse = res.json().await?;
    if cli.decode {
        for response in &body.responses {
            let payload = STANDARD.decode(&response.base64_payload)?;
            println!(
                "== {} [{}] {}",
                response.service_url, response.http_status_code, response.content_type
            );
            println!("{}", String::from_utf8_lossy(&payload));
        }
    } else {
        let value: Value = serde_json::to_value(&body)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(())
}
