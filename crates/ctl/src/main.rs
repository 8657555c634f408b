use anyhow::Context;
use clap::{Parser, Subcommand};
use mcpforge_core::api::{
    DeployRequest, DeployResponse, ErrorBody, GenerateResponse, LogResponse, PreviewResponse,
    StopRequest, StopResponse,
};
use mcpforge_core::model::{PreprocessJob, ProcessInfo, RegistryEntry, WorkflowSpec};
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(name = "mcpforgectl", version, about = "Client for the mcpforge daemon")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Preview the synthesized server for a workflow spec file.
    Preview {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        file: String,
    },
    /// Generate, persist and register a server.
    Generate {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        file: String,
    },
    Deploy {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        path: String,
    },
    Stop {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        pid: u32,
    },
    /// List registry entries.
    Servers {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
    },
    /// List supervised processes.
    Processes {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
    },
    /// Print the log of a generated server.
    Logs {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
    },
    /// Show a batch preprocess job.
    Preprocess {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        daemon: String,
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = reqwest::Client::new();

    match args.cmd {
        Cmd::Preview { daemon, file } => {
            let spec = read_spec(&file).await?;
            let resp: PreviewResponse =
                send(client.post(url(&daemon, "/api/generate_preview")).json(&spec)).await?;
            println!("{}", resp.preview);
        }
        Cmd::Generate { daemon, file } => {
            let spec = read_spec(&file).await?;
            let resp: GenerateResponse =
                send(client.post(url(&daemon, "/api/generate")).json(&spec)).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Cmd::Deploy { daemon, path } => {
            let req = DeployRequest { path };
            let resp: DeployResponse = send(client.post(url(&daemon, "/api/deploy")).json(&req)).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Cmd::Stop { daemon, pid } => {
            let req = StopRequest { pid };
            let resp: StopResponse = send(client.post(url(&daemon, "/api/stop")).json(&req)).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Cmd::Servers { daemon } => {
            let resp: Vec<RegistryEntry> = send(client.get(url(&daemon, "/api/servers"))).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Cmd::Processes { daemon } => {
            let resp: Vec<ProcessInfo> = send(client.get(url(&daemon, "/api/processes"))).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Cmd::Logs {
            daemon,
            name,
            version,
        } => {
            let path = format!("/api/logs/{name}/{version}");
            let resp: LogResponse = send(client.get(url(&daemon, &path))).await?;
            print!("{}", resp.log);
        }
        Cmd::Preprocess { daemon, id } => {
            let path = format!("/api/preprocess/{id}");
            let resp: PreprocessJob = send(client.get(url(&daemon, &path))).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}

fn url(daemon: &str, path: &str) -> String {
    format!("{}{path}", daemon.trim_end_matches('/'))
}

async fn read_spec(file: &str) -> anyhow::Result<WorkflowSpec> {
    let bytes = tokio::fs::read(file).await.context("read file")?;
    serde_json::from_slice(&bytes).context("parse workflow spec")
}

/// Sends the request; non-success answers become errors carrying the daemon's
/// message.
async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> anyhow::Result<T> {
    let resp = req.send().await.context("daemon unreachable")?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let msg = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => format!("{} ({})", body.error, body.kind),
            Err(_) => text,
        };
        anyhow::bail!("daemon returned {status}: {msg}");
    }
    resp.json().await.context("decode response")
}
