//! timebox CLI entry point

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use timebox::cli::{self, exit_code_for, render_error};
use timebox::tracing::{TracingConfig, init_tracing};

fn main() {
    // NOTE: tracing may be unusable during a panic, so print directly
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("{e:?}");
        std::process::exit(cli::EXIT_CLI);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(cli::EXIT_RUN);
        }
    };

    let exit_code = match rt.block_on(timebox::commands::execute(&cli)) {
        Ok(code) => code,
        Err(err) => {
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    };

    // Stdin may still be held by the reader thread; do not wait for it
    rt.shutdown_background();
    std::process::exit(exit_code);
}
