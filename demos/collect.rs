use ddna::{Dispatcher, HttpTransport, JsonObject, NetworkConfig, NetworkSettings, Result};
use serde_json::json;

pub fn main() {
    env_logger::init();

    let collect_url = std::env::var("DDNA_COLLECT_URL").unwrap();
    let engage_url = std::env::var("DDNA_ENGAGE_URL").unwrap();
    let project_id = std::env::var("DDNA_PROJECT_ID").unwrap();

    let dispatcher = Dispatcher::start(HttpTransport::new()).unwrap();
    let mut config = NetworkConfig::new(project_id, "dev", collect_url, engage_url)
        .settings(NetworkSettings::new().with_max_retries(2));
    if let Ok(secret) = std::env::var("DDNA_HASH_SECRET") {
        config = config.hash_secret(secret);
    }
    let network = config.to_manager(dispatcher).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();

    // Upload a batch of events.
    let events: JsonObject = serde_json::from_value(json!({
        "eventList": [
            {"eventName": "gameStarted", "eventParams": {"platform": "RUST"}},
            {"eventName": "newPlayer", "eventParams": {}},
        ]
    }))
    .unwrap();
    let collected = tx.clone();
    network
        .collect(&events, move |result: Result<()>| {
            let _ = collected.send(format!("collect: {result:?}"));
        })
        .unwrap();

    // Ask for a decision.
    let mut decision = JsonObject::new();
    decision.insert("decisionPoint".to_owned(), "gameLoaded".into());
    network
        .engage(
            &decision,
            move |result: Result<JsonObject>| {
                let _ = tx.send(format!("engage: {result:?}"));
            },
            false,
        )
        .unwrap();

    for message in rx.iter().take(2) {
        println!("{message}");
    }

    network.shutdown().unwrap();
}
