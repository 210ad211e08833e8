//! HTTP API
//!
//! | Route                  | Method   | Purpose                               |
//! |------------------------|----------|---------------------------------------|
//! | `/`                    | GET      | API description                       |
//! | `/api/status`          | GET      | Device state and last known location  |
//! | `/api/parent-location` | POST     | Observer position and heading         |
//! | `/api/calibrate`       | POST     | Calibrate from a reading at a distance|
//! | `/api/test-fall`       | POST     | Raise a test fall alert               |
//! | `/api/config`          | GET/POST | Read or change calibration            |
//! | `/ingest`              | POST     | Samples pushed by hardware            |
//! | `/events`              | GET      | Server-Sent Events stream             |

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_graceful_shutdown::SubsystemHandle;
use tower_http::cors::CorsLayer;

use crate::{ServerError, Session};

mod api;
mod events;

pub fn router(session: Session) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/api/status", get(api::status))
        .route("/api/parent-location", post(api::parent_location))
        .route("/api/calibrate", post(api::calibrate))
        .route("/api/test-fall", post(api::test_fall))
        .route("/api/config", get(api::get_config).post(api::set_config))
        .route("/ingest", post(api::ingest))
        .route("/events", get(events::subscribe))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

pub struct Web {
    session: Session,
    addr: SocketAddr,
}

impl Web {
    pub fn new(session: Session, addr: SocketAddr) -> Self {
        Web { session, addr }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        log::info!(
            "{}: HTTP API on http://{}",
            self.session.key(),
            listener.local_addr()?
        );

        let session = self.session.clone();
        axum::serve(listener, router(self.session))
            .with_graceful_shutdown(async move {
                subsys.on_shutdown_requested().await;
                // Event streams never end by themselves
                session.bus().close();
                log::debug!("{}: HTTP API shutting down", session.key());
            })
            .await?;
        Ok(())
    }
}
