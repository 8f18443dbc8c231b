use dotenvy::dotenv;
use std::{path::Path, sync::Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Load `.env` from the working directory or its parents. Missing file is fine.
pub fn load_dotenv() {
    match dotenv() {
        Ok(path) => eprintln!(".env read successfully from {}", path.display()),
        Err(e) => eprintln!("Could not load .env file: {e}"),
    };
}

// should be built after dotenv() so RUST_LOG in .env file will be loaded
fn init_env_layer() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

pub fn init_tracing_to_stdout() {
    let env_layer = init_env_layer();

    let stdout_layer = tracing_subscriber::fmt::layer().with_ansi(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_layer)
        .with(stdout_layer)
        .try_init()
    {
        eprintln!("tracing already initialized: {e}");
    }
}

pub fn init_tracing_to_file(log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref();
    let env_layer = init_env_layer();

    let file_log_layer = {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Failed to create log dir: {}", e);
            init_tracing_to_stdout(); // fallback to stdout tracing
            return;
        }
        let file = match std::fs::File::create(log_dir.join("app.log")) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Failed to create log file: {}", e);
                init_tracing_to_stdout(); // fallback to stdout tracing
                return;
            }
        };
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(env_layer)
        .with(file_log_layer)
        .try_init()
    {
        eprintln!("tracing already initialized: {e}");
    }
}
