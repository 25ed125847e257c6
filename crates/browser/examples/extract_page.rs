//! Extract a page and print its interactive elements
//!
//! Connects to a running Chrome when `CDP_URL` is set, otherwise launches one.

use jsonfy_browser::{BrowserSession, SessionConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());
    let config = SessionConfig {
        cdp_url: std::env::var("CDP_URL").ok(),
        settle_delay: Duration::from_millis(500),
        ..SessionConfig::default()
    };

    let session = BrowserSession::new(config);

    let mut event_rx = session.event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            println!("Event: {:?}", event);
        }
    });

    session.start().await?;
    session.navigate(&url).await?;

    let state = session.extract().await?;
    for element in &state.scan.interactive_elements {
        println!("[{}] {} <{}>", element.id, element.element_type, element.tag_name);
    }
    for iframe in &state.scan.iframe_infos {
        println!("{} accessible={} src={}", iframe.id, iframe.accessible, iframe.src);
    }

    let composite = state.composite();
    println!("Consolidated HTML: {} bytes, {} unmatched iframes", composite.html.len(), composite.unmatched.len());

    session.stop().await?;
    Ok(())
}
