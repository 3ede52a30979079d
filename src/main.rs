use anyhow::Result;
use lms_client::LmStudioConnectorBuilder;
use lms_unloader::{unload_all, StdoutReporter, UnloadConfig};

const WORKSPACE_CRATES: &[&str] = &[
    "lms-unload",
    "lms-client",
    "lms-unloader",
    "lms-host-traits",
    "lms-utils",
];

// One logical thread: the unload requests interleave at their network waits.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = UnloadConfig::load()?;
    lms_utils::log::logger::init_logger(&config.log_level, WORKSPACE_CRATES)?;

    let connector = LmStudioConnectorBuilder::new()
        .host(config.host.clone())
        .timeout(config.timeout())
        .build()?;
    log::debug!(
        "Unloading {} models via {}",
        config.models.len(),
        connector.base_url()
    );

    unload_all(&connector, &config.models, &StdoutReporter).await?;

    Ok(())
}
