use anyhow::{Context, Result};
use helios::config::Config;
use helios::driver::{DriverCommand, EmsDriver, http_plug_factory};
use helios::inverter::DeyeInverter;
use helios::logging::{get_logger, init_logging};
use helios::modbus::ModbusConnectionManager;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::resolve_path();
    let config = match &config_path {
        Some(path) => Config::load_validated(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::default(),
    };

    init_logging(&config.logging).context("Failed to initialize logging")?;
    let logger = get_logger("main");
    logger.info(&format!("Helios {} starting up", env!("APP_VERSION")));
    match &config_path {
        Some(path) => logger.info(&format!("Configuration loaded from {}", path)),
        None => logger.warn("No configuration file found; using defaults"),
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();
    let inverter = DeyeInverter::new(
        ModbusConnectionManager::new(&config.inverter),
        config.registers.clone(),
    );
    let web_config = config.web.clone();
    let mut driver = EmsDriver::new(config, Box::new(inverter), http_plug_factory(), cmd_rx)
        .context("Failed to create driver")?;
    if let Some(path) = config_path {
        driver = driver.with_config_path(path);
    }

    let shutdown = driver.shutdown_handle();
    let (web_stop_tx, web_stop_rx) = tokio::sync::oneshot::channel::<()>();

    #[cfg(feature = "web")]
    let web_task = web_config.enabled.then(|| {
        let state = helios::web::AppState {
            commands_tx: cmd_tx.clone(),
            snapshot_rx: driver.subscribe_snapshot(),
        };
        tokio::spawn(async move {
            let stop = async {
                let _ = web_stop_rx.await;
            };
            if let Err(e) = helios::web::serve(state, &web_config.host, web_config.port, stop).await
            {
                get_logger("web").error(&format!("Web server error: {}", e));
            }
        })
    });
    #[cfg(not(feature = "web"))]
    let _ = (web_config, web_stop_rx, &cmd_tx);

    let signal_logger = logger.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_logger.info("Interrupt received, stopping");
            let _ = shutdown.send(());
        }
    });

    let result = driver.run().await;
    let _ = web_stop_tx.send(());
    #[cfg(feature = "web")]
    if let Some(task) = web_task {
        let _ = task.await;
    }

    match result {
        Ok(()) => {
            logger.info("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            logger.error(&format!("Driver failed with error: {}", e));
            Err(e.into())
        }
    }
}
