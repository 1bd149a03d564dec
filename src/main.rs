mod app;
mod config;
mod connection;
mod dispatch;
mod handlers;
mod model;
mod outbound;
mod plugins;
mod protocol;
mod pump;
mod session;
mod state;
mod ui;

use std::io::Write;

const CRASH_LOG: &str = "crash.log";

#[tokio::main]
async fn main() {
    init_logging();
    install_crash_hook();
    if let Err(err) = app::run().await {
        tracing::error!(error = %err, "fatal");
        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn install_crash_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        let entry = format!(
            "[{}] {}\n{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            info,
            backtrace
        );
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(CRASH_LOG)
            .and_then(|mut file| file.write_all(entry.as_bytes()));
        match written {
            Ok(()) => eprintln!("the application crashed, details were written to {CRASH_LOG}"),
            Err(err) => eprintln!("the application crashed and {CRASH_LOG} could not be written: {err}"),
        }
        default_hook(info);
    }));
}
