//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target the managed server's console lines are logged under
pub const SERVER_TARGET: &str = "server";

/// Initialize logging with the specified level
pub fn init(level: &str, server_output: bool) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(level, server_output))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// `RUST_LOG` wins over `level`; an unparsable level falls back to `info`.
/// Unless `server_output`, the server target is switched off.
fn build_filter(level: &str, server_output: bool) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if server_output {
        return filter;
    }
    match format!("{}=off", SERVER_TARGET).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
