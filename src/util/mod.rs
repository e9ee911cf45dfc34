pub(crate) mod metrics;
pub mod summary;

use std::time::Duration;

pub trait Builder<T>: Sync + Send {
    fn build(&self) -> T;
}

impl<T, F: Fn() -> T + Sync + Send> Builder<T> for F {
    fn build(&self) -> T {
        self()
    }
}

/// Install the stdout logger at Info level, `RUST_LOG` overrides the filter.
pub fn init_globals() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .target(env_logger::Target::Stdout)
        .try_init();
}

/// Format a duration as `H:MM:SS`, the way progress lines print elapsed time and ETA.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
