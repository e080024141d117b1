//! Default command, run by the Stop hook after every assistant turn

/// Never fails: errors are logged and the process still exits with status 0
pub fn run() -> anyhow::Result<()> {
    let invocation = match super::prepare() {
        Ok(Some(invocation)) => invocation,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "failed to start run");
            return Ok(());
        }
    };

    tracing::debug!(
        max_sessions = invocation.config.max_sessions_per_run,
        budget_ms = invocation.config.time_budget.as_millis() as u64,
        "run started"
    );
    invocation
        .runtime
        .block_on(invocation.orchestrator.run());
    Ok(())
}
