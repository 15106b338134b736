use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber for a binary. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init() {
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,countrypanel=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_target(false)
        .init();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));
}

/// Test logging; safe to call from every test.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,countrypanel=debug")),
        )
        .with_test_writer()
        .try_init();
}
