//! AV Matrix Router
//!
//! Drives an HDMI matrix and a component matrix so that clients can ask for
//! "virtual input X on virtual output Y" without knowing how the two are
//! wired together.

mod control;
mod settings;

use anyhow::Context;
use av_detect::{discover_ports, DiscoveryRequest};
use av_mux::{DriverId, MatrixDriver, MatrixEvent, MatrixHandle, Router};
use av_protocol::Protocol;
use av_sim::{spawn_simulated, SimulatedMatrix};
use settings::Settings;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the driver event channel
const EVENT_CAPACITY: usize = 256;

/// Running matrix drivers
struct Matrices {
    hdmi: MatrixHandle,
    component: MatrixHandle,
    /// Simulated devices stop when their handles are dropped
    _simulated: Vec<SimulatedMatrix>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "avrouter=info,av_protocol=info,av_detect=info,av_mux=info,av_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting AV matrix router");

    let settings = Settings::load();
    if let Some(path) = Settings::settings_path() {
        tracing::debug!("Settings file: {}", path.display());
    }
    tracing::info!(
        "Component matrix: {}, skip: {}, simulate: {}",
        settings.component_protocol.name(),
        settings.skip_matrices,
        settings.simulate_matrices
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    let matrices = start_matrices(&settings, event_tx).await?;

    let router = Router::start(matrices.hdmi, matrices.component, event_rx);
    control::spawn_state_printer(router.subscribe());
    control::run_console(&router)
        .await
        .context("console input failed")?;

    router.shutdown();
    tracing::info!("AV matrix router stopped");
    Ok(())
}

async fn start_matrices(
    settings: &Settings,
    event_tx: mpsc::Sender<MatrixEvent>,
) -> anyhow::Result<Matrices> {
    let hdmi = MatrixDriver::new(DriverId::Hdmi, Protocol::Hdmi, event_tx.clone())
        .with_baud_rate(settings.hdmi_baud_rate);
    let component = MatrixDriver::new(
        DriverId::Component,
        settings.component_protocol,
        event_tx,
    )
    .with_baud_rate(settings.component_baud_rate);

    if settings.skip_matrices {
        tracing::warn!("Matrix I/O disabled; every route succeeds without hardware");
        return Ok(Matrices {
            hdmi: hdmi.init_offline(),
            component: component.init_offline(),
            _simulated: Vec::new(),
        });
    }

    if settings.simulate_matrices {
        tracing::info!("Using simulated matrices");
        let (hdmi_io, hdmi_sim) = spawn_simulated(Protocol::Hdmi);
        let (component_io, component_sim) = spawn_simulated(settings.component_protocol);
        return Ok(Matrices {
            hdmi: hdmi.init_with_io("sim:hdmi", hdmi_io),
            component: component.init_with_io("sim:component", component_io),
            _simulated: vec![hdmi_sim, component_sim],
        });
    }

    // Configured paths are probed too; a silent device aborts start-up
    let request = DiscoveryRequest {
        component: settings.component_protocol,
        hdmi_path: settings.hdmi_path(),
        component_path: settings.component_path(),
        hdmi_baud_rate: settings.hdmi_baud_rate,
        component_baud_rate: settings.component_baud_rate,
    };
    let assignment = discover_ports(&request)
        .await
        .context("matrix discovery failed")?;

    Ok(Matrices {
        hdmi: hdmi.init(&assignment.hdmi)?,
        component: component.init(&assignment.component)?,
        _simulated: Vec::new(),
    })
}
