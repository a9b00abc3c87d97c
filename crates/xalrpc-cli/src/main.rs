//! # xalrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Host the demo services
//! xalrpc serve --bind 127.0.0.1:9001
//!
//! # Call a method (prints the result as JSON)
//! xalrpc call 127.0.0.1:9001 calc add --params '[3, 4]'
//!
//! # Send a one-way call
//! xalrpc call 127.0.0.1:9001 calc log --params '["hello"]' --one-way
//! ```

use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use xalrpc_client::{PoolConfig, ProxyConfig, RemoteProxy};
use xalrpc_common::coding::interop::to_json;
use xalrpc_common::{Interface, JsonCoder, Value};
use xalrpc_server::RpcServer;

/// Splits a `host:port` address.
///
/// # Errors
///
/// Returns an error if there is no port or it is not a valid number.
fn parse_endpoint(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid address '{}': expected host:port", addr))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| anyhow::anyhow!("Invalid port in '{}': {}", addr, e))?;
    Ok((host.to_string(), port))
}

#[derive(FromArgs)]
/// xalrpc - JSON RPC with shared object graphs
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for hosting the demo services.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// host the demo calc and echo services
struct ServeArgs {
    /// address to listen on
    ///
    /// Defaults to "127.0.0.1:9001". Use port 0 for a random port; the bound
    /// address is logged at startup.
    #[argh(option, short = 'b', default = "\"127.0.0.1:9001\".into()")]
    bind: String,
}

/// Arguments for making a single call.
///
/// The result is printed to stdout as pretty JSON so it can be piped into
/// other tools. Errors go to stderr with a non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method of a remote service
struct CallArgs {
    /// address of the server, as host:port
    #[argh(positional)]
    server_address: String,

    /// name of the service
    #[argh(positional)]
    service: String,

    /// name of the method
    #[argh(positional)]
    method: String,

    /// JSON array of positional arguments
    #[argh(option, short = 'p', long = "params", default = "\"[]\".into()")]
    params: String,

    /// send without waiting for a response
    #[argh(switch, long = "one-way")]
    one_way: bool,

    /// give up waiting for the response after this many milliseconds
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server = RpcServer::bind(&args.bind, Arc::new(JsonCoder::standard())).await?;
    xalrpc_cli::demo::register(&server);
    tracing::info!(
        addr = %server.local_addr(),
        services = ?server.service_names(),
        "Serving demo services"
    );

    let stopper = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            stopper.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if the address or params are malformed, the service
/// cannot be reached, or the remote method fails.
async fn run_call(args: CallArgs) -> Result<()> {
    let (host, port) = parse_endpoint(&args.server_address)?;
    let params = parse_params(&args.params)?;

    let coder = Arc::new(JsonCoder::standard());
    let config = ProxyConfig {
        pool: PoolConfig::default(),
        read_timeout_ms: args.timeout_ms,
    };
    let proxy = RemoteProxy::with_config(host, port, &args.service, Interface::open("cli"), coder.clone(), config);

    if args.one_way {
        proxy.notify(&args.method, params).await?;
        return Ok(());
    }

    let result = proxy.invoke(&args.method, params).await?;
    println!("{}", serde_json::to_string_pretty(&to_json(&result, coder.adaptors())?)?);
    Ok(())
}

/// Parses the `--params` JSON array.
fn parse_params(text: &str) -> Result<Vec<Value>> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| anyhow::anyhow!("Invalid JSON in params: {}", e))?;
    match Value::from(json) {
        Value::Array(items) => Ok(items.to_vec()),
        other => Err(anyhow::anyhow!("params must be a JSON array, got {}", other.type_label())),
    }
}
