//! CUBIST - In-Memory Multidimensional OLAP Server
//!
//! Main entry point. Loads the server options, opens (or creates) the
//! data directory and brings the object tree up; the request dispatchers
//! attach on top of the `cubist` library.

use cubist::core::ServerOptions;
use cubist::server::Server;

fn main() {
    // Initialize logging with configurable level
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("  CUBIST - In-Memory Multidimensional OLAP Server");
    log::info!("  Version: {}", cubist::VERSION);
    log::info!("═══════════════════════════════════════════════════════════");

    let options = match std::env::args().nth(1) {
        Some(path) => match ServerOptions::from_file(&path) {
            Ok(options) => options,
            Err(err) => {
                log::error!("cannot read options file '{}': {}", path, err);
                std::process::exit(1);
            }
        },
        None => ServerOptions::default(),
    };

    log::info!("data directory: {}", options.data_directory.display());

    let mut server = match Server::open(options) {
        Ok(server) => server,
        Err(err) => {
            log::error!("cannot open server: {}", err);
            std::process::exit(1);
        }
    };

    log::info!(
        "server ready: {} databases, token {}",
        server.database_count(),
        server.token.value()
    );

    // final save so a clean shutdown leaves no journal behind
    if let Err(err) = server.save() {
        log::error!("cannot save server: {}", err);
        std::process::exit(1);
    }
}
