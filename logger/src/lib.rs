//! Process-wide logger setup.
//!
//! Every crate in the workspace logs through the `log` facade; binaries and
//! tests call one of the `setup*` functions once to install an
//! `env_logger` backend. `RUST_LOG` takes precedence over the filter
//! passed in, except for [`setup_with`].

use std::sync::Once;

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "error";

fn install(filter: &str, honour_env: bool, is_test: bool) {
    INIT.call_once(|| {
        let mut builder = if honour_env {
            env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(filter))
        } else {
            let mut builder = env_logger::Builder::new();
            builder.parse_filters(filter);
            builder
        };
        builder
            .format_timestamp_millis()
            .format_target(true)
            .is_test(is_test);
        // A logger installed by some other component is not an error here.
        let _ = builder.try_init();
    });
}

/// Configures logging with the given filter unless `RUST_LOG` overrides it.
pub fn setup_with_default(filter: &str) {
    install(filter, true, false);
}

/// Configures logging with exactly the given filter; `RUST_LOG` is ignored.
pub fn setup_with(filter: &str) {
    install(filter, false, false);
}

/// Configures logging with the default `error` filter.
pub fn setup() {
    setup_with_default(DEFAULT_FILTER);
}

/// Test variant: output is captured by the test harness.
pub fn setup_for_tests(filter: &str) {
    install(filter, true, true);
}
