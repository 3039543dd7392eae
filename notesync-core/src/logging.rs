use tracing_subscriber::prelude::*;

/// Installs the global subscriber, writing to stderr. `RUST_LOG` wins over `default_directives`.
pub fn setup_tracing(default_directives: &str, json: bool) {
    let tracing = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()),
    );

    if json {
        tracing
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .ok();
    } else {
        tracing
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    };
}
