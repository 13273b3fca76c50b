use env_logger;
use log;

/// Logs at `Info` unless `RUST_LOG` says otherwise.
pub fn setup_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
