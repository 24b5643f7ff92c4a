use env_logger::Env;

/// Set up the global logger. RUST_LOG overrides the verbosity flag.
pub fn setup_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env = Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}
