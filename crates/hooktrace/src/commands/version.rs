pub fn run() -> anyhow::Result<()> {
    println!("hooktrace {}", env!("CARGO_PKG_VERSION"));
    println!("Turn-level tracing for assistant sessions");
    Ok(())
}
