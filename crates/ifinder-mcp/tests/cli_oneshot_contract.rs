use axum::{http::StatusCode, response::Html, routing::get, Router};
use std::net::SocketAddr;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn portal() -> Router {
    Router::new()
        .route(
            "/barbacena/cursos",
            get(|| async {
                Html(
                    "<div id='portal-column-one'>\
                       <a href='/barbacena/cursos/tecnicos'>Cursos técnicos</a>\
                       <a href='/barbacena/cursos/superiores'>Cursos superiores</a>\
                     </div><p>Oferta de cursos do campus.</p>",
                )
            }),
        )
        .route("/barbacena/antigo", get(|| async { StatusCode::GONE }))
}

fn ifinder(addr: SocketAddr, args: &[&str]) -> std::process::Output {
    let bin = assert_cmd::cargo::cargo_bin!("ifinder");
    std::process::Command::new(bin)
        .args(args)
        .env_remove("IFINDER_ENV_FILE")
        .env("IFINDER_LOG", "error")
        .args(["--base-url", &format!("http://{addr}")])
        .output()
        .expect("run ifinder")
}

#[test]
fn cli_one_shots_print_the_same_envelope_as_the_tools() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let addr = rt.block_on(serve(portal()));

    let out = ifinder(addr, &["navigation", "/barbacena/cursos"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse envelope");
    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("extract_navigation"));
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert_eq!(v["result"]["count"].as_u64(), Some(2));

    let out = ifinder(addr, &["navigation", "/barbacena/cursos", "--output", "text"]);
    let text = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        text.trim_end(),
        format!(
            "[Cursos técnicos](http://{addr}/barbacena/cursos/tecnicos)\n\
             [Cursos superiores](http://{addr}/barbacena/cursos/superiores)"
        )
    );
}

#[test]
fn cli_failure_exits_nonzero_with_classified_error() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let addr = rt.block_on(serve(portal()));

    let out = ifinder(addr, &["fetch", "/barbacena/antigo"]);
    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse envelope");
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert_eq!(v["state"].as_str(), Some("failed"));
    assert_eq!(v["error"]["code"].as_str(), Some("network"));
    assert!(v["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("/barbacena/antigo"));
}
