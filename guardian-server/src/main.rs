use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use guardian_core::Tracker;
use guardian_server::bus::EventBus;
use guardian_server::producer::{Producer, Simulator};
use guardian_server::web::Web;
use guardian_server::{config, Cli, Monitor};
use miette::IntoDiagnostic;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let tracker_config = config::tracker_config(&cli).into_diagnostic()?;
    let tracker = Tracker::new(tracker_config).into_diagnostic()?;
    let session = Monitor::new(
        cli.device_name.clone(),
        tracker,
        EventBus::new(cli.bus_capacity),
    );
    log::info!("{}: tracking with {:?}", session.key(), tracker_config);

    let addr = SocketAddr::new(cli.bind, cli.port);
    let interval = Duration::from_millis(cli.interval);

    Toplevel::new(move |s| async move {
        // No radio backend is linked in, so readings come from the simulator
        let producer = Producer::new(session.clone(), Box::new(Simulator::new()), interval);
        s.start(SubsystemBuilder::new(
            "producer",
            move |s: SubsystemHandle| producer.run(s),
        ));

        let web = Web::new(session, addr);
        s.start(SubsystemBuilder::new("web", move |s: SubsystemHandle| {
            web.run(s)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(2000))
    .await
    .into_diagnostic()
}
