use forum_auth::{Config, build_rocket, init_tracing};

#[rocket::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level, config.logging.json_format);

    // Ignition fails when the store is unreachable; nothing is served then.
    if let Err(err) = build_rocket(config).launch().await {
        tracing::error!(error = %err, "Server failed to start");
        std::process::exit(1);
    }
}
