/// Retry queued records without looking for new turns, printing the report
pub fn run() -> anyhow::Result<()> {
    let Some(invocation) = super::prepare()? else {
        println!("{}", serde_json::json!({"enabled": false}));
        return Ok(());
    };

    let report = invocation.runtime.block_on(invocation.orchestrator.drain(None));
    let output = serde_json::json!({
        "delivered": report.delivered,
        "pending": report.pending,
        "deliveries": report.deliveries,
        "queue_depth": invocation.orchestrator.queue().len(),
    });
    println!("{output}");
    Ok(())
}
