use anyhow::Context;
use tracing::{error, info};

use kirundi_filter_worker::{
    config::Config,
    observability,
    pipeline::{PipelineOrchestrator, RunContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    observability::tracing::init().context("failed to initialize tracing")?;

    let config = Config::from_env().context("failed to load configuration")?;
    let orchestrator =
        PipelineOrchestrator::from_config(&config).context("failed to build pipeline")?;

    let run = RunContext::new();
    let result = orchestrator.execute(&run).await?;

    info!(
        run_id = %result.run_id,
        kirundi_count = result.target_count,
        other_count = result.other_count,
        target_path = %result.target_path.display(),
        other_path = %result.other_path.display(),
        "run summary"
    );

    Ok(())
}
