/// Initialize logging for the playback helper.
///
/// Defaults to `error` level unless overridden by `UNDERTONE_LOG`; passing
/// `verbose` raises the default to `info` so stream selection and decode
/// lifecycle events show up.
pub fn init(verbose: bool) {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::ERROR
    };

    let filter = EnvFilter::builder()
        .with_env_var("UNDERTONE_LOG")
        .with_default_directive(default.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
    }
}
