use anyhow::Context;
use quill::server;

/// Speaks LSP on stdin/stdout. Logs go to stderr; set RUST_LOG to control verbosity.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    server::serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Lua language server stopped")
}
