//! Demonstration entry point: construct a `Config` by value and run it to
//! completion. No CLI parsing, no config file loading — an integrator
//! wanting either wraps this crate's `Config` construction in their own
//! front end.

use std::process::ExitCode;
use std::sync::Arc;

use woof_protocol::config::Config;
use woofalytics::Engine;

fn main() -> ExitCode {
    env_logger::init();

    let config = Config::default();

    let engine = match Engine::new(config) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            eprintln!("error: failed to start woofalytics: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = engine.run() {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
