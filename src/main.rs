use campusone_admin::env::{load_dotenv, Settings};
use campusone_admin::update::{exit_status, report, run_configured};
use std::io::{stderr, stdout};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("campusone_admin=info,add_fees_custom_fields=info"));
    #[cfg(debug_assertions)]
    tracing_subscriber::fmt()
        .compact()
        .with_writer(stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .without_time()
        .with_env_filter(filter)
        .init();
    #[cfg(not(debug_assertions))]
    tracing_subscriber::fmt()
        .compact()
        .with_writer(stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .with_env_filter(filter)
        .init();
    let lookup = |name: &str| std::env::var(name).ok();
    let (result, status) = match load_dotenv() {
        Ok(()) => run_configured(lookup).await,
        Err(err) => {
            let result = Err(err);
            let status = exit_status(&result, Settings::strict_exit_status_from_lookup(lookup));
            (result, status)
        }
    };
    if let Err(err) = report(&result, &mut stdout().lock(), &mut stderr().lock()) {
        warn!("failed to print the report: {err}");
    }
    ExitCode::from(status)
}
