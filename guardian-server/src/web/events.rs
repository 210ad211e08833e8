use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, Sse};
use futures::stream::{self, Stream};

use crate::bus::{Delivery, Subscription, KEEPALIVE_INTERVAL};
use crate::Session;

/// `GET /events`
///
/// Every bus event goes out as `data: <json>`. While nothing happens a
/// `: keepalive` comment is sent every half second. The stream ends when the
/// bus closes or this client falls too far behind.
pub(super) async fn subscribe(
    State(session): State<Session>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    log::debug!(
        "{}: event stream opened, {} listening",
        session.key(),
        session.bus().subscriber_count() + 1
    );
    Sse::new(frames(session.bus().subscribe()))
}

fn frames(subscription: Subscription) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(subscription, |mut sub| async move {
        let frame = match sub.next(KEEPALIVE_INTERVAL).await {
            Delivery::Event(event) => match event.to_json() {
                Ok(json) => SseEvent::default().data(json),
                Err(e) => {
                    log::error!("Cannot encode {} event: {}", event.type_name(), e);
                    SseEvent::default().comment("keepalive")
                }
            },
            Delivery::Keepalive => SseEvent::default().comment("keepalive"),
            Delivery::Closed => return None,
        };
        Some((Ok(frame), sub))
    })
}

#[cfg(test)]
mod tests {
    use crate::testing;
    use crate::web::router;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn open(session: &crate::Session) -> Body {
        let request = Request::builder().uri("/events").body(Body::empty()).unwrap();
        let response = router(session.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        response.into_body()
    }

    async fn next_frame(body: &mut Body) -> Option<String> {
        let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
            .await
            .expect("no frame in time")?
            .unwrap();
        Some(String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_keepalive_when_idle() {
        let session = testing::session();
        let mut body = open(&session).await;
        assert_eq!(next_frame(&mut body).await.unwrap(), ": keepalive\n\n");
    }

    #[tokio::test]
    async fn test_event_frame() {
        let session = testing::session();
        let mut body = open(&session).await;

        session.apply_signal(-60, "AA");
        let frame = next_frame(&mut body).await.unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.contains("\"type\":\"status_update\""));
        assert!(frame.contains("\"ts\":"));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_no_replay_of_earlier_events() {
        let session = testing::session();
        session.test_fall();

        let mut body = open(&session).await;
        assert_eq!(next_frame(&mut body).await.unwrap(), ": keepalive\n\n");
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let session = testing::session();
        let mut body = open(&session).await;
        session.bus().close();
        assert!(next_frame(&mut body).await.is_none());
    }
}
