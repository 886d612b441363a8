use std::{net::SocketAddr, sync::Arc};

use actix_web::{web, App, HttpServer};
use anyhow::{Context as AnyContext, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::info;
use metrics_exporter_prometheus::PrometheusBuilder;
use mint_common::time::SystemClock;
use mint_daemon::{
    api::{self, AdminToken},
    config::Config,
    core::{ids::RandomIdGenerator, ledger::Ledger, storage::MemoryStorage},
    rpc,
};

fn setup_logger(level: log::LevelFilter) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Magenta)
        .trace(Color::BrightBlack);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                mint_common::time::get_current_time_in_millis(),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .context("Could not initialize the logger")?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    setup_logger(config.log_level)?;

    if !config.disable_metrics {
        let addr: SocketAddr = config
            .metrics_bind_address
            .parse()
            .context("Invalid metrics bind address")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Could not install the Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let ledger = Ledger::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(SystemClock),
        Arc::new(RandomIdGenerator),
    );
    let ledger = web::Data::new(ledger);
    let admin_token = web::Data::new(AdminToken(config.admin_token.clone()));
    if admin_token.0.is_none() {
        info!("No admin token configured, the /admin surface is disabled");
    }

    info!("Ledger API listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(ledger.clone())
            .app_data(admin_token.clone())
            .configure(rpc::configure::<MemoryStorage>)
            .configure(api::configure_user::<MemoryStorage>)
            .configure(api::configure_admin::<MemoryStorage>)
    })
    .bind(&config.bind_address)
    .with_context(|| format!("Could not bind {}", config.bind_address))?
    .run()
    .await?;

    Ok(())
}
