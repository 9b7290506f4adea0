pub fn run() -> anyhow::Result<()> {
    println!("edge-diag {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
