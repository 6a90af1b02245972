//! Overlays reaching the renderer while media is still being prepared
//!
//! Real sockets, so this runs on the real clock.

mod helpers;

use futures::{SinkExt, StreamExt};
use helpers::{FakeInspector, ScriptedProbe, TestRendererBuilder};
use kiosk_common::events::{KioskEvent, OverlayPhase};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use kiosk_display::overlay::OverlayChannelConfig;

/// Accept one connection, send `frame`, then keep the session open
async fn serve_one(frame: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(frame.to_string())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    format!("ws://{}", addr)
}

#[tokio::test]
async fn test_overlay_published_during_slow_inspection() {
    let url = serve_one(r#"{"html":"x","duration":1000,"fadeinMs":0}"#).await;

    let probe = ScriptedProbe::new();
    probe.push_token("t1");
    let inspector = FakeInspector::new(10.0);
    inspector.set_delay(Duration::from_secs(3));

    let started = Instant::now();
    let mut renderer = TestRendererBuilder::new("http://media.local/{screen}/loop.mp4")
        .probe(probe)
        .inspector(inspector)
        .channel(OverlayChannelConfig {
            connect_timeout: Duration::from_secs(2),
            ..OverlayChannelConfig::new(url)
        })
        .start();

    let mut phases = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), async {
        while phases.last() != Some(&OverlayPhase::Visible) {
            match renderer.events.recv().await {
                Ok(KioskEvent::OverlayChanged { overlay, .. }) => {
                    assert_eq!(overlay.html, "x");
                    phases.push(overlay.phase);
                }
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("overlay was held back by media inspection");

    assert_eq!(phases, vec![OverlayPhase::Created, OverlayPhase::Visible]);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(renderer.shown_url().await, None, "inspection still running");
    assert_eq!(renderer.handle.scene().await.overlays.len(), 1);

    renderer.stop().await;
}
