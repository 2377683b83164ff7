mod codec;
mod commands;
mod config;
mod origin;
mod rest;
mod session;
mod store;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    commands::Dispatcher,
    config::{Args, RunMode},
    origin::OriginPolicy,
    store::{Datastore, SqliteStore},
};

#[derive(Clone)]
pub struct AppState {
    pub(crate) store: Arc<dyn Datastore>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) origin: OriginPolicy,
    pub(crate) audit: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn Datastore>, mode: RunMode) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&store)),
            store,
            origin: OriginPolicy::for_mode(mode),
            audit: mode.is_production(),
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(rest::health).layer(CorsLayer::permissive()))
        .route("/content", get(rest::get_content).post(rest::add_content))
        .route("/ws", get(session::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let mode = RunMode::from_value(&args.mode);
    let bind: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid --host/--port")?;

    let store = SqliteStore::open(&args.database)
        .with_context(|| format!("open database {}", args.database))?;
    let state = AppState::new(Arc::new(store), mode);

    info!(?mode, "listening on http://{bind}");
    axum::serve(
        tokio::net::TcpListener::bind(bind).await?,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        origin::ALLOWED_ORIGINS,
        store::{content, Content},
    };
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::{
        connect_async,
        tungstenite::{client::IntoClientRequest, http::HeaderValue, Error as WsError, Message},
    };

    async fn spawn_server(mode: RunMode) -> (SocketAddr, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory());
        for (name, dir, body) in [
            ("readme.txt", "home", "hi, I build things"),
            ("projects.md", "home", "- terminal site"),
            ("hosts", "etc", "127.0.0.1 localhost"),
        ] {
            store.add_content(content(name, dir, body)).await.unwrap();
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState::new(store.clone(), mode));
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });
        (addr, store)
    }

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn roundtrip(ws: &mut Client, msg: Message) -> Message {
        ws.send(msg).await.unwrap();
        ws.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn terminal_session_end_to_end() {
        let (addr, _store) = spawn_server(RunMode::Development).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let cases = [
            ("home:ls:", "readme.txt projects.md"),
            ("home:cat:readme.txt", "hi, I build things"),
            ("home:cat:", "usage: cat [file_name]"),
            ("home:cat:nope", "cat: nope: No such file or directory"),
            ("home:foo:bar", "command not found: foo. Try using the 'help'"),
            ("onlyonecolon:x", "malformed command"),
            ("etc:ls:", "hosts"),
            ("home:clear:", ""),
        ];
        for (sent, want) in cases {
            assert_eq!(
                roundtrip(&mut ws, Message::Text(sent.into())).await,
                Message::Text(want.into()),
                "{sent}"
            );
        }

        assert_eq!(
            roundtrip(&mut ws, Message::Binary(b"home:cat:readme.txt".to_vec())).await,
            Message::Binary(b"hi, I build things".to_vec())
        );

        ws.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn ping_gets_no_reply_and_peer_close_ends_session() {
        let (addr, _store) = spawn_server(RunMode::Development).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        assert_eq!(
            roundtrip(&mut ws, Message::Text("etc:ls:".into())).await,
            Message::Text("hosts".into())
        );

        ws.send(Message::Ping(b"still there?".to_vec())).await.unwrap();
        ws.send(Message::Text("home:cat:readme.txt".into())).await.unwrap();
        let next_data = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Pong(_) => continue,
                msg => break msg,
            }
        };
        assert_eq!(next_data, Message::Text("hi, I build things".into()));

        ws.close(None).await.unwrap();
        let after_close = tokio::time::timeout(Duration::from_secs(5), async {
            let mut data = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if !matches!(msg, Message::Close(_) | Message::Pong(_)) {
                    data.push(msg);
                }
            }
            data
        })
        .await
        .expect("server should close its side after the peer closes");
        assert!(after_close.is_empty(), "{after_close:?}");
    }

    #[tokio::test]
    async fn production_rejects_foreign_origins() {
        let (addr, _store) = spawn_server(RunMode::Production).await;
        let url = format!("ws://{addr}/ws");

        match connect_async(url.as_str()).await {
            Err(WsError::Http(resp)) => assert_eq!(resp.status(), 403),
            other => panic!("expected 403, got {:?}", other.map(|_| ())),
        }

        let mut req = url.as_str().into_client_request().unwrap();
        req.headers_mut()
            .insert("origin", HeaderValue::from_static("https://evil.example"));
        match connect_async(req).await {
            Err(WsError::Http(resp)) => assert_eq!(resp.status(), 403),
            other => panic!("expected 403, got {:?}", other.map(|_| ())),
        }

        let mut req = url.as_str().into_client_request().unwrap();
        req.headers_mut()
            .insert("origin", HeaderValue::from_static(ALLOWED_ORIGINS[1]));
        let (mut ws, _) = connect_async(req).await.unwrap();
        assert_eq!(
            roundtrip(&mut ws, Message::Text("etc:ls:".into())).await,
            Message::Text("hosts".into())
        );
    }

    #[tokio::test]
    async fn health_reports_up() {
        let (addr, _store) = spawn_server(RunMode::Development).await;
        let resp = reqwest::Client::new()
            .get(format!("http://{addr}/health"))
            .header("origin", "https://somewhere.example")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": true, "message": "Api up and running" })
        );
    }

    #[tokio::test]
    async fn content_endpoints() {
        let (addr, _store) = spawn_server(RunMode::Development).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/content");

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 422);
        assert_eq!(resp.text().await.unwrap(), "'name' query param is required");

        let resp = client.get(format!("{url}?name=")).send().await.unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client.get(format!("{url}?name=hosts")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.json::<Content>().await.unwrap(),
            content("hosts", "etc", "127.0.0.1 localhost")
        );

        let resp = client.get(format!("{url}?name=ghost")).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(resp.text().await.unwrap(), "content not found: ghost");

        let created = serde_json::json!({ "name": "cv.pdf", "parentDir": "home", "fileBody": "resume" });
        let resp = client.post(&url).json(&created).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.json::<serde_json::Value>().await.unwrap(), created);

        let resp = client.post(&url).json(&created).send().await.unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client.post(&url).body("not json").send().await.unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client.post(&url).json(&serde_json::json!({ "parentDir": "home" })).send().await.unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client.delete(&url).send().await.unwrap();
        assert_eq!(resp.status(), 405);

        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        assert_eq!(
            roundtrip(&mut ws, Message::Text("home:ls:".into())).await,
            Message::Text("readme.txt projects.md cv.pdf".into())
        );
    }
}
