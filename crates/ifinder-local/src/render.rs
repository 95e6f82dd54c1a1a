//! Headless-browser rendering through a Node.js + Playwright child process.
//!
//! Each call spawns its own driver process and owns it until the call ends: success, failure,
//! timeout and cancellation all kill (if needed) and reap the child before returning. On unix the
//! driver leads its own process group, so the browser it launched is signalled with it.

use ifinder_core::{
    truncate_chars, Config, Error, RenderBackend, RenderRequest, RenderedPage, Result,
};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stdout is JSON only; every failure is reported as `{ok:false,error:{code,message}}`.
const RENDER_JS: &str = r#"
const fs = require('fs');

function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(code, message) { ok({ ok: false, error: { code, message } }); }
function msg(e) { return String(e && e.message ? e.message : e); }

async function main() {
  let req;
  try { req = JSON.parse(fs.readFileSync(0, 'utf8')); } catch (e) { return bad('invalid_params', 'bad JSON args'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('not_configured', 'Playwright is not installed for Node.js (require("playwright") failed)');
  }

  const engine = String(req.engine || 'chromium');
  const browserType = pw[engine];
  if (!browserType || typeof browserType.launch !== 'function') {
    return bad('launch_failed', 'unknown browser engine: ' + engine);
  }
  const timeoutMs = Math.max(1000, Number(req.timeout_ms || 30000));
  const maxChars = Number(req.max_html_chars || 20000);

  const t0 = Date.now();
  let browser;
  try {
    browser = await browserType.launch({ headless: true, timeout: timeoutMs });
  } catch (e) {
    return bad('launch_failed', msg(e));
  }
  try {
    const context = await browser.newContext({ serviceWorkers: 'block' });
    const page = await context.newPage();
    const resp = await page.goto(String(req.url), { waitUntil: 'load', timeout: timeoutMs });
    let html = await page.content();
    let truncated = false;
    // Cut on code points so the JSON never carries a lone surrogate.
    const cps = Array.from(html);
    if (cps.length > maxChars) { html = cps.slice(0, maxChars).join(''); truncated = true; }
    ok({ ok: true, final_url: page.url(), status: resp ? resp.status() : null, html, truncated, elapsed_ms: Date.now() - t0 });
  } catch (e) {
    bad(e && e.name === 'TimeoutError' ? 'timeout' : 'navigation_failed', msg(e));
  } finally {
    try { await browser.close(); } catch (_) {}
  }
}

main().catch((e) => bad('navigation_failed', msg(e)));
"#;

/// Headroom left for browser shutdown inside the hard ceiling.
const NAVIGATION_MARGIN_MS: u64 = 1_000;
/// How long a signalled driver gets to exit before its group is killed outright.
const TERMINATE_GRACE: Duration = Duration::from_millis(300);

fn node_path_candidates() -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(home.join(".npm-global").join("lib").join("node_modules"));
    }
    out.push("/opt/homebrew/lib/node_modules".into());
    out.push("/usr/local/lib/node_modules".into());
    out.push("/usr/lib/node_modules".into());
    out
}

/// `NODE_PATH` that makes a globally installed Playwright requireable, when one is needed.
fn node_path_for_playwright() -> Option<String> {
    if let Ok(v) = std::env::var("IFINDER_NODE_PATH") {
        if !v.trim().is_empty() {
            return Some(v.trim().to_string());
        }
    }
    let existing = std::env::var("NODE_PATH").unwrap_or_default();
    if std::env::split_paths(&existing).any(|p| p.join("playwright").is_dir()) {
        return None;
    }
    let found = node_path_candidates()
        .into_iter()
        .find(|root| root.join("playwright").is_dir())?;
    let found = found.to_string_lossy().to_string();
    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

/// Whether `node_bin` can `require('playwright')`. Used by diagnostics; rendering never calls it.
pub fn playwright_resolvable(node_bin: &str, timeout: Duration) -> bool {
    let mut cmd = std::process::Command::new(node_bin);
    cmd.args(["-e", "require.resolve('playwright'); process.stdout.write('ok')"]);
    if let Some(node_path) = node_path_for_playwright() {
        cmd.env("NODE_PATH", node_path);
    }
    crate::shellout::run_stdout_bounded(cmd, timeout, 64).is_ok_and(|out| out == b"ok")
}

/// Outcome of one engine attempt.
enum Attempt {
    Page(RenderedPage),
    /// The browser never started; the next engine may.
    LaunchFailed(String),
}

enum Exit {
    Done(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PlaywrightRenderer {
    config: Arc<Config>,
}

impl PlaywrightRenderer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    async fn attempt(
        &self,
        engine: &str,
        req: &RenderRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Attempt> {
        let t0 = std::time::Instant::now();
        let remaining_ms = deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        let navigation_ms = remaining_ms
            .saturating_sub(NAVIGATION_MARGIN_MS)
            .max(NAVIGATION_MARGIN_MS);
        let args_json = serde_json::json!({
            "engine": engine,
            "url": req.url,
            "timeout_ms": navigation_ms,
            "max_html_chars": self.config.max_html_chars,
        })
        .to_string();

        let mut cmd = tokio::process::Command::new(&self.config.node_bin);
        if let Some(node_path) = node_path_for_playwright() {
            cmd.env("NODE_PATH", node_path);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .arg("-e")
            .arg(RENDER_JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::NotConfigured(format!(
                    "renderização requer Node.js ({}) e o pacote Playwright: {e}",
                    self.config.node_bin
                ))
            })?;
        let group = child.id();
        tracing::debug!(engine, pid = group, url = %req.url, "render driver spawned");

        if let Some(mut stdin) = child.stdin.take() {
            // A driver that never reads stdin fails on its own; the exit path below reports it.
            let _ = stdin.write_all(args_json.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let exit = tokio::select! {
            r = child.wait() => Exit::Done(r),
            _ = tokio::time::sleep_until(deadline) => Exit::TimedOut,
            _ = cancel.cancelled() => Exit::Cancelled,
        };
        let status = match exit {
            Exit::Done(r) => {
                // Whatever the driver left behind (a browser that outlived it) goes with it.
                kill_group(group);
                r.map_err(|e| Error::network(&req.reference, format!("renderizador: {e}")))?
            }
            Exit::TimedOut => {
                reap(&mut child, group, [stdout_task, stderr_task]).await;
                return Err(Error::Timeout {
                    reference: req.reference.clone(),
                    after_ms: req.timeout_ms,
                });
            }
            Exit::Cancelled => {
                reap(&mut child, group, [stdout_task, stderr_task]).await;
                return Err(Error::Cancelled {
                    reference: req.reference.clone(),
                });
            }
        };

        let pipes = tokio::time::timeout_at(deadline, async {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            (stdout, stderr)
        });
        let Ok((stdout, stderr)) = pipes.await else {
            return Err(Error::Timeout {
                reference: req.reference.clone(),
                after_ms: req.timeout_ms,
            });
        };
        let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
        let v: serde_json::Value = serde_json::from_str(&stdout).map_err(|_| {
            let stderr = String::from_utf8_lossy(&stderr);
            let tail = ifinder_core::clip_with_ellipsis(stderr.trim(), 300);
            Error::network(
                &req.reference,
                format!("renderizador terminou sem resposta válida ({status}) {tail}").trim_end(),
            )
        })?;

        if v.get("ok").and_then(|x| x.as_bool()) != Some(true) {
            let code = v
                .pointer("/error/code")
                .and_then(|x| x.as_str())
                .unwrap_or("navigation_failed");
            let message = v
                .pointer("/error/message")
                .and_then(|x| x.as_str())
                .unwrap_or("falha na renderização")
                .to_string();
            return match code {
                "launch_failed" => Ok(Attempt::LaunchFailed(message)),
                "not_configured" => Err(Error::NotConfigured(message)),
                "timeout" => Err(Error::Timeout {
                    reference: req.reference.clone(),
                    after_ms: req.timeout_ms,
                }),
                _ => Err(Error::network(&req.reference, message)),
            };
        }

        let html = v.get("html").and_then(|x| x.as_str()).unwrap_or("");
        if html.trim().is_empty() {
            return Err(Error::EmptyContent {
                reference: req.reference.clone(),
            });
        }
        let (html, cut) = truncate_chars(html, self.config.max_html_chars);
        Ok(Attempt::Page(RenderedPage {
            reference: req.reference.clone(),
            final_url: v
                .get("final_url")
                .and_then(|x| x.as_str())
                .unwrap_or(&req.url)
                .to_string(),
            status: v.get("status").and_then(|x| x.as_u64()).map(|n| n as u16),
            html,
            truncated: cut || v.get("truncated").and_then(|x| x.as_bool()).unwrap_or(false),
            engine: engine.to_string(),
            elapsed_ms: t0.elapsed().as_millis() as u64,
        }))
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut p, &mut buf).await;
        }
        buf
    })
}

/// Terminate the driver's group, then kill and wait, so neither the driver nor its browser
/// outlives the call.
async fn reap(child: &mut Child, group: Option<u32>, tasks: [JoinHandle<Vec<u8>>; 2]) {
    terminate_group(group);
    let _ = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await;
    kill_group(group);
    let _ = child.kill().await;
    let _ = child.wait().await;
    for t in tasks {
        t.abort();
    }
}

#[cfg(unix)]
fn signal_group(group: Option<u32>, signal: libc::c_int) {
    // Group 0 would be our own.
    let Some(pgid) = group
        .and_then(|p| libc::pid_t::try_from(p).ok())
        .filter(|p| *p > 0)
    else {
        return;
    };
    // SAFETY: killpg only sends a signal; a group that already exited yields ESRCH, ignored.
    unsafe {
        libc::killpg(pgid, signal);
    }
}

#[cfg(unix)]
fn terminate_group(group: Option<u32>) {
    signal_group(group, libc::SIGTERM);
}

#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    signal_group(group, libc::SIGKILL);
}

#[cfg(not(unix))]
fn terminate_group(_group: Option<u32>) {}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

#[async_trait::async_trait]
impl RenderBackend for PlaywrightRenderer {
    async fn render(
        &self,
        req: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedPage> {
        if self.config.render_engines.is_empty() {
            return Err(Error::NotConfigured(
                "nenhum navegador configurado (IFINDER_RENDER_ENGINES)".to_string(),
            ));
        }
        let deadline = Instant::now() + Duration::from_millis(req.timeout_ms);
        let mut launch_failures = Vec::new();
        for engine in &self.config.render_engines {
            match self.attempt(engine, req, deadline, cancel).await? {
                Attempt::Page(page) => return Ok(page),
                Attempt::LaunchFailed(m) => {
                    tracing::warn!(engine = %engine, cause = %m, "browser launch failed");
                    launch_failures.push(format!("{engine}: {m}"));
                }
            }
        }
        Err(Error::NotConfigured(format!(
            "nenhum navegador pôde ser iniciado ({})",
            launch_failures.join("; ")
        )))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use ifinder_core::ErrorKind;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Stand-in for `node`: a shell script that ignores `-e <js>` and plays a canned driver.
    fn fake_node(dir: &Path, body: &str) -> String {
        let path = dir.join("node");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn renderer(node_bin: String) -> PlaywrightRenderer {
        PlaywrightRenderer::new(Arc::new(Config {
            node_bin,
            max_html_chars: 40,
            ..Config::default()
        }))
    }

    fn req(timeout_ms: u64) -> RenderRequest {
        RenderRequest {
            reference: "/barbacena/agenda".to_string(),
            url: "https://x.test/barbacena/agenda".to_string(),
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_engine_only_on_launch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let node = fake_node(
            tmp.path(),
            r#"input=$(cat)
case "$input" in
  *'"engine":"chromium"'*) printf '%s' '{"ok":false,"error":{"code":"launch_failed","message":"chromium missing"}}' ;;
  *) printf '%s' '{"ok":true,"final_url":"https://x.test/barbacena/agenda","status":200,"html":"<html><body>agenda de eventos do campus barbacena</body></html>","truncated":false}' ;;
esac"#,
        );
        let page = renderer(node)
            .render(&req(5_000), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.engine, "firefox");
        assert_eq!(page.status, Some(200));
        assert_eq!(page.html.chars().count(), 40);
        assert!(page.truncated);
    }

    #[tokio::test]
    async fn navigation_failure_is_network_and_does_not_try_other_engines() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = tmp.path().join("calls");
        let node = fake_node(
            tmp.path(),
            &format!(
                r#"cat > /dev/null
echo x >> '{}'
printf '%s' '{{"ok":false,"error":{{"code":"navigation_failed","message":"net::ERR_NAME_NOT_RESOLVED"}}}}'
exit 1"#,
                calls.display()
            ),
        );
        let err = renderer(node)
            .render(&req(5_000), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("/barbacena/agenda"));
        let n = std::fs::read_to_string(&calls).unwrap().lines().count();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn all_engines_failing_to_launch_is_not_configured() {
        let tmp = tempfile::tempdir().unwrap();
        let node = fake_node(
            tmp.path(),
            r#"cat > /dev/null
printf '%s' '{"ok":false,"error":{"code":"launch_failed","message":"no browser"}}'"#,
        );
        let err = renderer(node)
            .render(&req(5_000), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
        assert!(err.to_string().contains("firefox"));
    }

    #[tokio::test]
    async fn missing_node_is_not_configured() {
        let err = renderer("/nonexistent/ifinder/node".to_string())
            .render(&req(1_000), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
    }

    /// Absent, or a zombie waiting for init: either way no longer running.
    #[cfg(target_os = "linux")]
    fn process_gone(pid: &str) -> bool {
        let until = std::time::Instant::now() + Duration::from_secs(3);
        loop {
            let gone = match std::fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
                Err(_) => true,
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            };
            if gone || std::time::Instant::now() >= until {
                return gone;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timed_out_render_takes_the_browser_down_too() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("browser");
        let node = fake_node(
            tmp.path(),
            &format!("sleep 30 &\necho $! > '{}'\nexec sleep 30", pidfile.display()),
        );
        let err = renderer(node)
            .render(&req(500), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(process_gone(&pid), "browser {} still running", pid.trim());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn driver_exiting_early_does_not_leave_its_browser_or_stall_on_pipes() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("browser");
        let node = fake_node(
            tmp.path(),
            &format!(
                r#"cat > /dev/null
sleep 30 &
echo $! > '{}'
printf '%s' '{{"ok":true,"final_url":"https://x.test/barbacena/agenda","status":200,"html":"<p>agenda</p>"}}'"#,
                pidfile.display()
            ),
        );
        let t0 = std::time::Instant::now();
        let page = renderer(node)
            .render(&req(10_000), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.html, "<p>agenda</p>");
        assert!(t0.elapsed() < Duration::from_secs(5));
        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(process_gone(&pid), "browser {} still running", pid.trim());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn hung_driver_times_out_and_is_reaped() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("pid");
        let node = fake_node(
            tmp.path(),
            &format!("echo $$ > '{}'\nexec sleep 30", pidfile.display()),
        );
        let t0 = std::time::Instant::now();
        let err = renderer(node)
            .render(&req(500), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(t0.elapsed() < Duration::from_secs(5));
        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(!Path::new(&format!("/proc/{}", pid.trim())).exists());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancelled_render_is_reaped() {
        let tmp = tempfile::tempdir().unwrap();
        let pidfile = tmp.path().join("pid");
        let node = fake_node(
            tmp.path(),
            &format!("echo $$ > '{}'\nexec sleep 30", pidfile.display()),
        );
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            c2.cancel();
        });
        let err = renderer(node)
            .render(&req(10_000), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(!Path::new(&format!("/proc/{}", pid.trim())).exists());
    }
}
