use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use confsync::{load_config, ConfigSync, NoticeKind};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CONFSYNC_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }

    // The library logs through `log`; forward those records into tracing.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
}

fn main() {
    init_logging();

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: confsync <config.yaml>");
        std::process::exit(2);
    };

    if let Err(e) = run(&config_path) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config_path: &str) -> confsync::Result<()> {
    info!("Starting confsync v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config_path)?;
    let pipeline = config.build_pipeline()?;
    let drivers = config.build_drivers()?;
    let sync = Arc::new(ConfigSync::with_capacity(
        pipeline,
        drivers,
        config.channel_capacity,
    ));

    let mut actions = sync.subscribe();
    let mut notices = sync.subscribe_notices();

    {
        let sync = Arc::clone(&sync);
        ctrlc::set_handler(move || sync.stop())
            .map_err(|e| confsync::SyncError::Runtime(format!("Failed to set Ctrl-C handler: {}", e)))?;
    }

    sync.start()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| confsync::SyncError::Runtime(e.to_string()))?;

    let printer_sync = Arc::clone(&sync);
    runtime.block_on(async move {
        loop {
            tokio::select! {
                action = actions.recv() => match action {
                    Ok(action) => match serde_json::to_string(&action) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize action: {}", e),
                    },
                    Err(RecvError::Lagged(n)) => warn!("Dropped {} actions", n),
                    Err(RecvError::Closed) => break,
                },
                notice = notices.recv() => match notice {
                    Ok(notice) => match &notice.kind {
                        NoticeKind::ValidationFailed { filename, details } => {
                            warn!("{} rejected: {}", filename, details.join("; "));
                        }
                        NoticeKind::SourceFailed { source, message } => {
                            error!("{} failed: {}", source, message);
                        }
                        NoticeKind::IdentityReassigned(r) => {
                            info!("{} now defined in {} (was {})", r.id, r.filename, r.previous_filename);
                        }
                    },
                    Err(RecvError::Lagged(n)) => warn!("Dropped {} notices", n),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                    if !printer_sync.is_running() {
                        break;
                    }
                }
            }
        }
    });

    sync.wait()?;
    info!("confsync stopped");
    Ok(())
}
