use msgforge::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Login {
    username: String,
}

#[derive(Debug, Deserialize)]
struct Say {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatLine<'a> {
    from: &'a str,
    text: &'a str,
}

struct Nickname(String);

async fn login_handler(Json(login): Json<Login>, conn: Connection) -> Result<()> {
    if login.username.trim().is_empty() {
        return conn.send_data("loginFailed", "username is required").await;
    }
    conn.set_context(Nickname(login.username));
    conn.send("loggedIn").await
}

async fn say_handler(
    Json(say): Json<Say>,
    conn: Connection,
    State(registry): State<Registry>,
) -> Result<()> {
    let Some(nick) = conn.context::<Nickname>() else {
        return conn.send_data("loginFailed", "log in first").await;
    };

    let mut peers = Vec::new();
    registry.range(|_, peer| {
        peers.push(peer.clone());
        ControlFlow::Continue(())
    });

    for peer in peers {
        let line = ChatLine {
            from: &nick.0,
            text: &say.text,
        };
        if let Err(e) = peer.send_data("chat", &line).await {
            tracing::debug!("Skipping {}: {}", peer.id(), e);
        }
    }
    Ok(())
}

async fn who_handler(conn: Connection, State(registry): State<Registry>) -> Result<()> {
    conn.send_data("who", &registry.all_ids()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .handle("login", handler(login_handler))
        .handle("say", handler(say_handler))
        .handle("who", handler(who_handler))
        .on_open(|registry: Arc<Registry>, id| async move {
            if let Some(conn) = registry.get(&id) {
                let _ = conn.send_data("welcome", &id).await;
            }
        })
        .on_close(|registry: Arc<Registry>, id| async move {
            let left = serde_json::json!({ "type": "left", "data": id });
            registry.broadcast_except(&id, left.to_string()).await;
        });

    println!("Chat server running on ws://127.0.0.1:9000");
    println!(r#"Send: {{"type":"login","username":"Alice"}} then {{"type":"say","text":"hi"}}"#);
    router.listen("127.0.0.1:9000").await
}
