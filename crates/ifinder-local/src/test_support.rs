use axum::Router;
use ifinder_core::Config;
use std::net::SocketAddr;

/// Serve `app` on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Defaults pointed at a mock portal.
pub fn config_for(addr: SocketAddr) -> Config {
    Config {
        base_url: format!("http://{addr}"),
        http_timeout_ms: 2_000,
        document_timeout_ms: 2_000,
        ..Config::default()
    }
}
