use anyhow::Result;
use clap::{Parser, Subcommand};
use ifinder_core::Config;
use ifinder_local::Retrieval;
use std::process::ExitCode;

mod mcp;

use mcp::Capabilities;

#[derive(Parser, Debug)]
#[command(name = "ifinder")]
#[command(
    about = "Retrieval over the IF Sudeste MG portal (CLI one-shots + MCP stdio server)",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    portal: PortalArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", global = true, default_value = "json")]
    output: String,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of `Config::from_env()`.
#[derive(clap::Args, Debug)]
struct PortalArgs {
    /// Origin that relative references resolve against.
    #[arg(long, global = true, env = "IFINDER_BASE_URL")]
    base_url: Option<String>,
    /// Per-request timeout for pages and searches (ms).
    #[arg(long, global = true, env = "IFINDER_HTTP_TIMEOUT_MS")]
    http_timeout_ms: Option<u64>,
    /// Ceiling for one browser render, launch included (ms).
    #[arg(long, global = true, env = "IFINDER_RENDER_TIMEOUT_MS")]
    render_timeout_ms: Option<u64>,
    /// Enclosing deadline for one capability call (ms).
    #[arg(long, global = true, env = "IFINDER_CALL_DEADLINE_MS")]
    call_deadline_ms: Option<u64>,
    /// Node.js binary that drives Playwright.
    #[arg(long, global = true, env = "IFINDER_NODE")]
    node_bin: Option<String>,
}

impl PortalArgs {
    fn config(&self) -> Config {
        let mut c = Config::from_env();
        if let Some(v) = &self.base_url {
            c.base_url = v.clone();
        }
        if let Some(v) = self.http_timeout_ms {
            c.http_timeout_ms = v;
        }
        if let Some(v) = self.render_timeout_ms {
            c.render_timeout_ms = v;
        }
        if let Some(v) = self.call_deadline_ms {
            c.call_deadline_ms = v;
        }
        if let Some(v) = &self.node_bin {
            c.node_bin = v.clone();
        }
        c
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server.
    #[cfg(feature = "stdio")]
    McpStdio,
    /// Fetch a page over plain HTTP (text or raw markup).
    Fetch(FetchCmd),
    /// Render a page in a headless browser.
    Render(ReferenceCmd),
    /// Extract a PDF (URL or local path) as markdown.
    Document(ReferenceCmd),
    /// List PDF documents linked from a page.
    DocumentLinks(ReferenceCmd),
    /// Search the portal; any filter flag switches to the filtered search.
    Search(SearchCmd),
    /// Links from a page's navigation regions.
    Navigation(ReferenceCmd),
    /// Latest headlines from the news index.
    Highlights,
    /// Diagnose local tooling (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version,
}

#[derive(clap::Args, Debug)]
struct ReferenceCmd {
    /// Portal path (`/barbacena/contato`) or absolute URL.
    reference: String,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    reference: String,
    /// text|raw
    #[arg(long, default_value = "text")]
    mode: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    term: String,
    /// Content type word (repeatable): noticias, editais, eventos, arquivos...
    #[arg(long = "type")]
    item_types: Vec<String>,
    /// ontem | semana | mes
    #[arg(long)]
    date_range: Option<String>,
    /// relevancia | data | alfabetica
    #[arg(long)]
    sort: Option<String>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Attempt a local stdio MCP handshake (list_tools).
    ///
    /// Spawns a child `ifinder mcp-stdio` process. It performs no portal request.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for each probe (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

/// Optional env-file loader (opt-in via `IFINDER_ENV_FILE`).
///
/// Sets only variables that are not already present in the process environment.
fn load_env_file() {
    let Ok(p) = std::env::var("IFINDER_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim().trim_matches('"'));
        }
    }
}

/// Logs go to stderr: stdout carries the MCP transport or the one-shot envelope.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("IFINDER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_outcome(o: &mcp::envelope::Outcome, output: &str) -> ExitCode {
    match output.to_ascii_lowercase().as_str() {
        "text" => println!("{}", o.text),
        _ => println!("{}", o.payload),
    }
    if o.ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(feature = "stdio")]
async fn check_stdio(
    config: &Config,
    timeout: std::time::Duration,
) -> Result<usize, serde_json::Value> {
    use rmcp::service::ServiceExt;
    use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
    use tokio::process::Command;

    let exe = std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("ifinder"));
    let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
        cmd.args(["mcp-stdio"]);
        cmd.env("IFINDER_BASE_URL", &config.base_url);
        cmd.env("IFINDER_LOG", "error");
    }))
    .map_err(|e| {
        serde_json::json!({
            "code": "spawn_failed",
            "message": e.to_string(),
            "hint": "Could not start `ifinder mcp-stdio`. Reinstall the binary."
        })
    })?;
    let service = ().serve(child).await.map_err(|e| {
        serde_json::json!({
            "code": "handshake_failed",
            "message": e.to_string(),
            "hint": "The child closed the stdio transport early. Check that nothing is printed to stdout in mcp-stdio mode."
        })
    })?;
    let res = tokio::time::timeout(timeout, service.list_tools(Default::default())).await;
    let _ = service.cancel().await;
    match res {
        Ok(Ok(tools)) => Ok(tools.tools.len()),
        Ok(Err(e)) => Err(serde_json::json!({
            "code": "handshake_failed",
            "message": e.to_string(),
            "hint": "Stdio MCP handshake failed. Verify the client config runs `ifinder` with args [\"mcp-stdio\"]."
        })),
        Err(_) => Err(serde_json::json!({
            "code": "timeout",
            "message": format!("stdio handshake timed out after {}ms", timeout.as_millis()),
            "hint": "The child did not answer list_tools in time."
        })),
    }
}

async fn doctor(config: &Config, args: &DoctorCmd) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let probe_timeout = std::time::Duration::from_millis(args.timeout_ms);
    let mut checks: Vec<serde_json::Value> = Vec::new();

    let base_ok = url::Url::parse(&config.base_url).is_ok_and(|u| u.has_host());
    checks.push(serde_json::json!({
        "name": "base_url_valid",
        "ok": base_ok,
        "message": if base_ok { "base URL parses" } else { "base URL is not an absolute http(s) URL" },
        "hint": if base_ok { "" } else { "Set IFINDER_BASE_URL (or --base-url) to the portal origin." },
    }));

    let node_ok = ifinder_local::shellout::has(&config.node_bin);
    checks.push(serde_json::json!({
        "name": "node_available",
        "ok": node_ok,
        "required_for": ["fetch_rendered"],
        "message": if node_ok { "node found" } else { "node not found" },
        "hint": if node_ok { "" } else { "Install Node.js or set IFINDER_NODE to its path." },
    }));

    let playwright_ok =
        node_ok && ifinder_local::render::playwright_resolvable(&config.node_bin, probe_timeout);
    checks.push(serde_json::json!({
        "name": "playwright_resolvable",
        "ok": playwright_ok,
        "required_for": ["fetch_rendered"],
        "message": if playwright_ok { "playwright is requireable" } else { "playwright is not requireable" },
        "hint": if playwright_ok { "" } else { "npm i -g playwright && npx playwright install chromium firefox (or set IFINDER_NODE_PATH)." },
    }));

    let pdftotext_ok = ifinder_local::shellout::has("pdftotext");
    checks.push(serde_json::json!({
        "name": "pdftotext_available",
        "ok": pdftotext_ok,
        "required_for": [],
        "message": if pdftotext_ok { "pdftotext found" } else { "pdftotext not found (optional fallback)" },
        "hint": if pdftotext_ok { "" } else { "Install poppler-utils for a second PDF extraction engine." },
    }));

    let mut stdio_result: Option<Result<usize, serde_json::Value>> = None;
    #[cfg(feature = "stdio")]
    if args.check_stdio {
        stdio_result = Some(check_stdio(config, probe_timeout).await);
    }
    #[cfg(not(feature = "stdio"))]
    if args.check_stdio {
        stdio_result = Some(Err(serde_json::json!({
            "code": "not_supported",
            "message": "built without feature `stdio`",
            "hint": "Rebuild with the default features."
        })));
    }
    let stdio_ok = stdio_result.as_ref().map_or(true, |r| r.is_ok());
    checks.push(serde_json::json!({
        "name": "mcp_stdio_handshake",
        "ok": stdio_ok,
        "skipped": !args.check_stdio,
        "message": match &stdio_result {
            None => "stdio MCP handshake skipped",
            Some(Ok(_)) => "stdio MCP handshake succeeded",
            Some(Err(_)) => "stdio MCP handshake failed",
        },
        "tool_count": stdio_result.as_ref().and_then(|r| r.as_ref().ok()),
        "error": stdio_result.as_ref().and_then(|r| r.as_ref().err()),
    }));

    // Rendering and pdftotext are optional: the static capabilities work without them.
    let ok = base_ok && stdio_ok;
    serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "ifinder",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "features": {
            "stdio": cfg!(feature = "stdio"),
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "base_url": config.base_url,
            "node_bin": config.node_bin,
            "render_engines": config.render_engines,
        },
        "checks": checks,
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing();
    let config = cli.portal.config();

    match &cli.command {
        Commands::Version => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "ifinder",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match cli.output.to_ascii_lowercase().as_str() {
                "text" => println!("ifinder {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Doctor(args) => {
            let v = doctor(&config, args).await;
            match cli.output.to_ascii_lowercase().as_str() {
                "text" => {
                    for c in v["checks"].as_array().into_iter().flatten() {
                        let mark = if c["ok"].as_bool().unwrap_or(false) { "ok" } else { "!!" };
                        println!(
                            "[{mark}] {}: {}",
                            c["name"].as_str().unwrap_or(""),
                            c["message"].as_str().unwrap_or("")
                        );
                    }
                }
                _ => println!("{v}"),
            }
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let caps = Capabilities::new(Retrieval::new(config)?);
    {
        let caps = caps.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                caps.shutdown();
            }
        });
    }

    let outcome = match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            mcp::serve_stdio(caps)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Fetch(args) => caps.fetch(Some(&args.reference), Some(&args.mode)).await,
        Commands::Render(args) => caps.fetch_rendered(Some(&args.reference)).await,
        Commands::Document(args) => caps.extract_document(Some(&args.reference)).await,
        Commands::DocumentLinks(args) => caps.find_document_links(Some(&args.reference)).await,
        Commands::Search(args) => {
            if args.item_types.is_empty() && args.date_range.is_none() && args.sort.is_none() {
                caps.search_simple(Some(&args.term)).await
            } else {
                caps.search_filtered(
                    Some(&args.term),
                    &args.item_types,
                    args.date_range.as_deref(),
                    args.sort.as_deref(),
                )
                .await
            }
        }
        Commands::Navigation(args) => caps.extract_navigation(Some(&args.reference)).await,
        Commands::Highlights => caps.get_highlights().await,
        Commands::Version | Commands::Doctor(_) => return Ok(ExitCode::SUCCESS),
    };
    Ok(print_outcome(&outcome, &cli.output))
}
