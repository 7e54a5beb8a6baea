// =============================================================================
// calc-tools — stdio JSON-RPC entrypoint
// =============================================================================
//
// stdout is reserved for protocol frames; every log line goes to stderr.
// =============================================================================

use aurora_gateway::calc_tools::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    if let Err(err) = server::run(stdin, stdout).await {
        tracing::error!(error = %err, "calc tools server exited with error");
        std::process::exit(1);
    }
}
