pub fn main() -> miette::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed building the Runtime");

    let result = runtime.block_on(repack::cli::execute());

    // Avoid waiting for pending tasks to complete.
    runtime.shutdown_background();

    result
}
