use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "akashic-mcp-cli")]
#[command(about = "Call akashic-mcp tools through the HTTP facade", long_about = None)]
struct Cli {
    /// Base URL of a running server
    #[arg(long, env = "AKASHIC_MCP_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available tools
    Tools {
        /// Print full descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Call a tool
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Tools { json } => {
            let tools: Vec<Value> = fetch(client.get(format!("{}/proxy/tools", base))).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else if tools.is_empty() {
                println!("No tools registered.");
            } else {
                println!("{:<24} DESCRIPTION", "NAME");
                println!("{}", "-".repeat(72));
                for tool in &tools {
                    println!(
                        "{:<24} {}",
                        tool["name"].as_str().unwrap_or_default(),
                        tool["description"].as_str().unwrap_or_default()
                    );
                }
            }
        }

        Commands::Call { name, args } => {
            let arguments: Value =
                serde_json::from_str(&args).context("--args must be valid JSON")?;
            if !arguments.is_object() {
                bail!("--args must be a JSON object");
            }

            let result: Value = fetch(
                client
                    .post(format!("{}/proxy/call", base))
                    .json(&serde_json::json!({ "name": name, "arguments": arguments })),
            )
            .await?;

            println!("{}", serde_json::to_string_pretty(&result)?);
            if result["isError"].as_bool().unwrap_or(false) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn fetch<T: serde::de::DeserializeOwned>(request: reqwest::RequestBuilder) -> anyhow::Result<T> {
    let response = request.send().await.context("Server unreachable")?;
    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body["error"].as_str().unwrap_or("no error message");
        bail!("Server returned {}: {}", status, message);
    }
    response.json().await.context("Unexpected response body")
}
