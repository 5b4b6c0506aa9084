//! Tracing setup for shells embedding the core.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` directives are honoured; the core and SDK default to `info`.
/// Set `DAPAI_LOG_JSON=1` for JSON lines instead of human-readable output.
/// Calling this twice (or after the shell installed its own subscriber) is an
/// error, not a panic.
pub fn init_logging() -> anyhow::Result<()> {
    let json_logs = std::env::var("DAPAI_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("dapai_core=info".parse()?)
        .add_directive("dapai_sdk=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}
