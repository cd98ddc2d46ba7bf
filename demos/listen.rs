use std::sync::Arc;

use twitch_pubsub::{Client, Event, EventKind, ListenerError, Listeners};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).unwrap();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn print_event(event: Arc<Event>) -> Result<(), ListenerError> {
    log::info!("[{}] {}: {}", event.kind, event.topic, event.data);
    Ok(())
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let token = std::env::var("TWITCH_TOKEN")
        .map_err(|_| {
            println!("No TWITCH_TOKEN env var or invalid");
            std::process::exit(1);
        })
        .unwrap();

    let topics: Vec<String> = std::env::var("TWITCH_TOPICS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    let mut listeners = Listeners::new();
    for kind in EventKind::ALL {
        listeners.listen(kind, print_event);
    }

    let client = Client::new(listeners);

    let mut closed = client.observers().connection_closed();
    tokio::spawn(async move {
        while let Ok(closed) = closed.recv().await {
            log::warn!("Connection closed: {:?} {}", closed.code, closed.reason);
        }
    });

    client.run(token, topics, shutdown_signal()).await.unwrap();
}
