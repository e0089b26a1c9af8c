use std::sync::Arc;

use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod handler;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("glraw_driver", log::LevelFilter::Debug)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();

    let config = match config::ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.prepare_directories() {
        log::error!("Failed to prepare directories: {:#}", e);
        std::process::exit(1);
    }
    log::info!(
        "encoder {}, results in {}, staging in {}",
        config.encoder_program().display(),
        config.result_dir().display(),
        config.tmp_dir().display()
    );

    let cancel = CancellationToken::new();
    let server = api::start_api_server(Arc::new(config), cancel.clone());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    match server.await {
        Ok(Ok(())) => std::process::exit(0),
        Ok(Err(e)) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("API server task failed: {}", e);
            std::process::exit(1);
        }
    }
}
