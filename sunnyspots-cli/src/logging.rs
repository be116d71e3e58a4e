use anyhow::Context;

/// Initialize logging from `RUST_LOG`, defaulting to `info`.
pub fn init() -> anyhow::Result<()> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .try_init()
        .context("failed to initialize the logger")
}
