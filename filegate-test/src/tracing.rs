use tracing_subscriber::EnvFilter;

/// Crates whose logs are captured at full verbosity: the `filegate` binary target, the gateway,
/// and the storage service with its backends.
const CRATE_NAMES: &[&str] = &["filegate", "filegate_server", "filegate_service"];

/// Initialize the logger for gateway tests.
///
/// Output goes to the test runner's captured stdout, so it only shows for failing tests. Backend
/// spans such as the object path of an upload are traced; all other crates log errors only. Set
/// `RUST_LOG` to replace these directives, e.g. `RUST_LOG=tower_http=debug` to see request spans.
///
/// Calling this more than once is harmless.
///
/// # Example
///
/// ```
/// filegate_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        CRATE_NAMES
            .iter()
            .fold(EnvFilter::new("ERROR"), |filter, name| {
                filter.add_directive(format!("{name}=TRACE").parse().unwrap())
            })
    });

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
