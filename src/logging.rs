use env_logger::{Builder, Env};

/// `RUST_LOG` wins; otherwise `info` for everything.
pub fn init() {
    let env = Env::default().default_filter_or("info");
    let _ = Builder::from_env(env).format_timestamp_millis().try_init();
}
