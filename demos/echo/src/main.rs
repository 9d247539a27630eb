use msgforge::prelude::*;

async fn echo_handler(msg: Message, State(registry): State<Registry>, conn: Connection) {
    if let Some(text) = msg.as_text() {
        registry.send(conn.id(), text).await;
    }
}

async fn whoami_handler(conn: Connection, ConnectInfo(info): ConnectInfo) -> Result<()> {
    let details = serde_json::json!({
        "id": conn.id(),
        "addr": info.addr.to_string(),
        "path": info.path(),
    });
    conn.send_data("whoami", &details).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .handle("echo", handler(echo_handler))
        .handle("whoami", handler(whoami_handler))
        .on_open(|_registry, id| async move {
            tracing::info!("Client connected: {}", id);
        })
        .on_close(|_registry, id| async move {
            tracing::info!("Client disconnected: {}", id);
        });

    println!("Echo server running on ws://127.0.0.1:8080");
    println!(r#"Send: {{"type":"echo","n":5}}"#);
    router.listen("127.0.0.1:8080").await
}
