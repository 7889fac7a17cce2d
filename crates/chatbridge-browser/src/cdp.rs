//! `BrowserEngine` over the Chrome DevTools Protocol.
//!
//! Each launch starts a dedicated Chrome/Chromium process with a throwaway
//! profile, opens one page target and keeps a WebSocket to it. Commands are
//! correlated with replies by message id; events are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatbridge_core::{Error, Result, Tier};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::engine::BrowserEngine;
use crate::types::{EngineHandle, LaunchOptions};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type CallResult = std::result::Result<Value, String>;
type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<CallResult>>>>;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined });
if (!window.chrome) { window.chrome = { runtime: {} }; }
"#;

const CLICK_FN: &str = r#"function (sel) {
  const el = document.querySelector(sel);
  if (!el) return false;
  el.scrollIntoView({ block: 'center' });
  el.click();
  return true;
}"#;

const FILL_FN: &str = r#"function (sel, text) {
  const el = document.querySelector(sel);
  if (!el) return false;
  el.focus();
  if (el.isContentEditable) {
    el.textContent = text;
  } else {
    const proto = el instanceof HTMLTextAreaElement
      ? HTMLTextAreaElement.prototype
      : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, text);
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}"#;

const LAST_TEXT_FN: &str = r#"function (sel) {
  const els = document.querySelectorAll(sel);
  if (els.length === 0) return null;
  return els[els.length - 1].innerText;
}"#;

fn cdp_error(message: impl Into<String>) -> Error {
    Error::transport(Tier::Browser, message)
}

/// Quote `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    Value::from(s).to_string()
}

/// `/json/new` response subset.
#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// WebSocket session to one page target.
struct CdpConnection {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: PendingCalls,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl CdpConnection {
    fn new(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(stream, pending.clone()));
        Self {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        let sent = self.sink.lock().await.send(Message::Text(frame)).await;
        if let Err(e) = sent {
            self.pending.lock().remove(&id);
            return Err(cdp_error(format!("{} send failed: {}", method, e)));
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(cdp_error(format!("{} failed: {}", method, message))),
            Ok(Err(_)) => Err(cdp_error(format!("{}: connection closed", method))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(cdp_error(format!("{} timed out", method)))
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, pending: PendingCalls) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("CDP socket error: {}", e);
                break;
            }
        };
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        // Events carry no id
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            continue;
        };
        let slot = pending.lock().remove(&id);
        if let Some(tx) = slot {
            let outcome = match message.get("error") {
                Some(err) => Err(err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string()),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
    }
    // Dropping the senders wakes every outstanding caller
    pending.lock().clear();
}

/// One launched browser: process, profile directory and page connection.
struct CdpInstance {
    conn: CdpConnection,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
}

impl CdpInstance {
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .conn
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("script error");
            return Err(cdp_error(format!("Script failed: {}", text)));
        }
        Ok(result["result"]["value"].clone())
    }

    async fn call_fn(&self, function: &str, args: &[&str]) -> Result<Value> {
        let args: Vec<String> = args.iter().map(|a| js_str(a)).collect();
        self.evaluate(&format!("({})({})", function, args.join(", ")))
            .await
    }

    async fn prepare(&self, options: &LaunchOptions) -> Result<()> {
        self.conn.call("Page.enable", json!({})).await?;
        if options.stealth {
            self.conn
                .call(
                    "Page.addScriptToEvaluateOnNewDocument",
                    json!({ "source": STEALTH_SCRIPT }),
                )
                .await?;
        }
        if let Some(user_agent) = &options.user_agent {
            self.conn
                .call(
                    "Network.setUserAgentOverride",
                    json!({ "userAgent": user_agent }),
                )
                .await?;
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let _ = tokio::time::timeout(
            Duration::from_secs(2),
            self.conn.call("Browser.close", json!({})),
        )
        .await;
        self.conn.reader.abort();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.start_kill() {
                debug!("Browser process already gone: {}", e);
            }
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        }

        let profile = self.profile.lock().take();
        if let Some(dir) = profile {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove browser profile {}: {}", path.display(), e);
            }
        }
    }
}

/// Chrome DevTools Protocol engine.
pub struct CdpEngine {
    instances: Mutex<HashMap<String, Arc<CdpInstance>>>,
    http: reqwest::Client,
}

impl CdpEngine {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            instances: Mutex::new(HashMap::new()),
            http,
        })
    }

    /// Number of live browser instances.
    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn instance(&self, handle: &EngineHandle) -> Result<Arc<CdpInstance>> {
        self.instances
            .lock()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| cdp_error(format!("Unknown browser context {}", handle)))
    }

    async fn open_page(&self, port: u16) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/new?about:blank", port);
        let response = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| cdp_error(format!("Failed to open page target: {}", e)))?;
        if !response.status().is_success() {
            return Err(cdp_error(format!(
                "Opening page target returned {}",
                response.status()
            )));
        }
        let target: TargetInfo = response
            .json()
            .await
            .map_err(|e| cdp_error(format!("Failed to parse target info: {}", e)))?;
        Ok(target.web_socket_debugger_url)
    }
}

#[async_trait]
impl BrowserEngine for CdpEngine {
    async fn launch(&self, options: &LaunchOptions) -> Result<EngineHandle> {
        let executable = match &options.executable {
            Some(path) => path.clone(),
            None => find_chrome_executable().ok_or_else(|| {
                cdp_error("Could not find a Chrome/Chromium executable; set chrome_path")
            })?,
        };

        // Declared before the child so the process is killed before the
        // profile directory is removed on early return.
        let profile = tempfile::Builder::new()
            .prefix("chatbridge-profile-")
            .tempdir()?;

        let mut child = Command::new(&executable)
            .args(launch_args(options, profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| cdp_error(format!("Failed to launch {}: {}", executable, e)))?;

        let timeout = Duration::from_millis(options.launch_timeout_ms);
        let port = wait_for_devtools_port(&mut child, profile.path(), timeout).await?;
        let ws_url = self.open_page(port).await?;
        let (ws, _) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .map_err(|e| cdp_error(format!("CDP connect failed: {}", e)))?;

        let instance = Arc::new(CdpInstance {
            conn: CdpConnection::new(ws),
            child: Mutex::new(Some(child)),
            profile: Mutex::new(Some(profile)),
        });
        if let Err(e) = instance.prepare(options).await {
            instance.shutdown().await;
            return Err(e);
        }

        let handle = EngineHandle::new(uuid::Uuid::new_v4().to_string());
        self.instances
            .lock()
            .insert(handle.id().to_string(), instance);
        info!("Launched browser context {} on DevTools port {}", handle, port);
        Ok(handle)
    }

    async fn navigate(&self, handle: &EngineHandle, url: &str) -> Result<()> {
        let instance = self.instance(handle)?;
        let result = instance
            .conn
            .call("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(cdp_error(format!("Navigation to {} failed: {}", url, error)));
            }
        }

        let deadline = Instant::now() + PAGE_LOAD_TIMEOUT;
        loop {
            let state = instance.evaluate("document.readyState").await?;
            if state.as_str().is_some_and(|s| s != "loading") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(cdp_error(format!("Page {} did not finish loading", url)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn find(&self, handle: &EngineHandle, selector: &str) -> Result<bool> {
        let instance = self.instance(handle)?;
        let found = instance
            .evaluate(&format!(
                "document.querySelector({}) !== null",
                js_str(selector)
            ))
            .await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn count(&self, handle: &EngineHandle, selector: &str) -> Result<usize> {
        let instance = self.instance(handle)?;
        let count = instance
            .evaluate(&format!(
                "document.querySelectorAll({}).length",
                js_str(selector)
            ))
            .await?;
        Ok(count.as_u64().unwrap_or(0) as usize)
    }

    async fn click(&self, handle: &EngineHandle, selector: &str) -> Result<()> {
        let instance = self.instance(handle)?;
        match instance.call_fn(CLICK_FN, &[selector]).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(cdp_error(format!("No element matches {}", selector))),
        }
    }

    async fn fill(&self, handle: &EngineHandle, selector: &str, text: &str) -> Result<()> {
        let instance = self.instance(handle)?;
        match instance.call_fn(FILL_FN, &[selector, text]).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(cdp_error(format!("No element matches {}", selector))),
        }
    }

    async fn wait_for(
        &self,
        handle: &EngineHandle,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.find(handle, selector).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_count(
        &self,
        handle: &EngineHandle,
        selector: &str,
        at_least: usize,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(handle, selector).await? >= at_least {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn extract_text(&self, handle: &EngineHandle, selector: &str) -> Result<String> {
        let instance = self.instance(handle)?;
        match instance.call_fn(LAST_TEXT_FN, &[selector]).await? {
            Value::String(text) => Ok(text.trim().to_string()),
            _ => Err(cdp_error(format!("No element matches {}", selector))),
        }
    }

    async fn close(&self, handle: &EngineHandle) -> Result<()> {
        let instance = self.instances.lock().remove(handle.id());
        if let Some(instance) = instance {
            instance.shutdown().await;
            info!("Closed browser context {}", handle);
        }
        Ok(())
    }
}

fn launch_args(options: &LaunchOptions, profile: &Path) -> Vec<String> {
    let mut args = vec![
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-popup-blocking".to_string(),
        format!(
            "--window-size={},{}",
            options.window_width, options.window_height
        ),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
    }
    if options.stealth {
        args.push("--disable-blink-features=AutomationControlled".to_string());
    }
    if let Some(user_agent) = &options.user_agent {
        args.push(format!("--user-agent={}", user_agent));
    }
    args.push("about:blank".to_string());
    args
}

/// Chrome writes the chosen port to `DevToolsActivePort` in the profile
/// directory once the debugging endpoint is listening.
async fn wait_for_devtools_port(child: &mut Child, profile: &Path, timeout: Duration) -> Result<u16> {
    let port_file = profile.join("DevToolsActivePort");
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(cdp_error(format!(
                "Browser exited before the debugging endpoint became available ({})",
                status
            )));
        }
        if let Ok(contents) = tokio::fs::read_to_string(&port_file).await {
            if let Some(port) = parse_devtools_port(&contents) {
                return Ok(port);
            }
        }
        if Instant::now() >= deadline {
            return Err(cdp_error("Timed out waiting for the browser debugging endpoint"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn parse_devtools_port(contents: &str) -> Option<u16> {
    contents
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
}

fn find_chrome_executable() -> Option<String> {
    let absolute: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    };
    if let Some(path) = absolute.iter().find(|p| Path::new(p).exists()) {
        return Some(path.to_string());
    }

    let names = [
        "google-chrome-stable",
        "google-chrome",
        "chromium-browser",
        "chromium",
        "chrome",
    ];
    let paths: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    names.iter().find_map(|name| {
        paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map(|candidate| candidate.display().to_string())
    })
}
