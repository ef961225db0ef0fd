//! Countdown, stop and wait sequence run before touching the live world.

use crate::host::ServerControl;
use crate::utils::Result;
use std::time::Duration;
use tracing::info;

/// Count down `seconds` with one broadcast per second, stop the server (with
/// `stop_command` when given, the default stop otherwise) and wait until it
/// has stopped. The server is not restarted.
pub async fn countdown_then_stop(
    server: &dyn ServerControl,
    seconds: u32,
    stop_command: Option<&str>,
) -> Result<()> {
    for num in 0..seconds {
        server.broadcast(&format!("Countdown: {}", seconds - num)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    match stop_command {
        Some(command) => {
            info!("Stopping server with \"{}\"", command);
            server.execute(command).await?;
        }
        None => {
            info!("Stopping server");
            server.stop().await?;
        }
    }

    server.wait_for_start().await
}
