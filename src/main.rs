// src/main.rs

use pkgmake::{cli, logging, run, ExitStatus};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("pkgmake: {err:#}");
    }

    let status = match run(args).await {
        Ok(status) => status,
        Err(err) => {
            eprintln!("pkgmake error: {err}");
            ExitStatus::ConfigError
        }
    };
    std::process::exit(status.code());
}
