//! Browser driver: one isolated browser context per session, driving the
//! service's web UI through a `BrowserEngine`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chatbridge_core::{Credentials, Error, Result, Tier};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::BrowserDriverConfig;
use crate::engine::BrowserEngine;
use crate::types::{ContextInfo, DriverState, EngineHandle};

struct BrowserContext {
    handle: EngineHandle,
    state: Mutex<DriverState>,
    authenticated: AtomicBool,
    launched_at: String,
    /// Serializes page operations on this context.
    op: tokio::sync::Mutex<()>,
}

impl BrowserContext {
    fn state(&self) -> DriverState {
        *self.state.lock()
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Move to `state` unless the context was closed meanwhile. Returns
    /// whether the transition happened.
    fn advance(&self, session_id: &str, state: DriverState) -> bool {
        let mut current = self.state.lock();
        if *current == DriverState::Closed && state != DriverState::Closed {
            return false;
        }
        debug!("Browser session {} -> {}", session_id, state);
        *current = state;
        true
    }
}

/// Browser tier transport keyed by session id.
pub struct BrowserDriver {
    engine: Arc<dyn BrowserEngine>,
    config: RwLock<BrowserDriverConfig>,
    contexts: Mutex<HashMap<String, Arc<BrowserContext>>>,
}

impl BrowserDriver {
    pub fn new(engine: Arc<dyn BrowserEngine>, config: BrowserDriverConfig) -> Self {
        Self {
            engine,
            config: RwLock::new(config),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> BrowserDriverConfig {
        self.config.read().clone()
    }

    pub fn update_config(&self, config: BrowserDriverConfig) {
        *self.config.write() = config;
    }

    /// Launch a context for `session_id`, open the service and sign in when
    /// a login pair is available. Returns whether the session is
    /// authenticated; a failed sign-in is not an error.
    ///
    /// The context is registered as soon as the browser is up, so `state`
    /// reports each step. Submits wait until creation finished.
    pub async fn create(&self, session_id: &str, credentials: &Credentials) -> Result<bool> {
        if self.contexts.lock().contains_key(session_id) {
            return Err(duplicate(session_id));
        }

        let config = self.config();
        let handle = self.engine.launch(&config.launch_options()).await?;
        let context = Arc::new(BrowserContext {
            handle,
            state: Mutex::new(DriverState::Launched),
            authenticated: AtomicBool::new(false),
            launched_at: chrono::Utc::now().to_rfc3339(),
            op: tokio::sync::Mutex::new(()),
        });
        let Ok(_op) = context.op.try_lock() else {
            return Err(Error::Internal("Fresh browser context is locked".into()));
        };

        // A concurrent create for the same id may have won the race.
        let inserted = {
            let mut contexts = self.contexts.lock();
            if contexts.contains_key(session_id) {
                false
            } else {
                contexts.insert(session_id.to_string(), context.clone());
                true
            }
        };
        if !inserted {
            self.release(&context.handle).await;
            return Err(duplicate(session_id));
        }
        debug!("Browser session {} -> {}", session_id, DriverState::Launched);

        if let Err(e) = self
            .engine
            .navigate(&context.handle, &config.service_url)
            .await
        {
            self.discard(session_id, &context).await;
            return Err(match e {
                Error::Transport { .. } => e,
                other => Error::transport(Tier::Browser, other.to_string()),
            });
        }

        let authenticated = match credentials.login() {
            Some((email, password)) => {
                context.advance(session_id, DriverState::Authenticating);
                match self
                    .authenticate(&context.handle, &config, email, password)
                    .await
                {
                    Ok(()) => {
                        info!("Browser session {} authenticated", session_id);
                        true
                    }
                    Err(e) => {
                        warn!(
                            "Browser sign-in failed for session {}, continuing unauthenticated: {}",
                            session_id, e
                        );
                        false
                    }
                }
            }
            None => false,
        };
        context.authenticated.store(authenticated, Ordering::SeqCst);
        context.advance(
            session_id,
            if authenticated {
                DriverState::Authenticated
            } else {
                DriverState::Unauthenticated
            },
        );

        if !context.advance(session_id, DriverState::Ready) {
            return Err(Error::transport(
                Tier::Browser,
                format!("Browser session {} closed during creation", session_id),
            ));
        }
        Ok(authenticated)
    }

    /// Drop a context that never became ready, unless `close` already did.
    async fn discard(&self, session_id: &str, context: &Arc<BrowserContext>) {
        let removed = {
            let mut contexts = self.contexts.lock();
            match contexts.get(session_id) {
                Some(current) if Arc::ptr_eq(current, context) => contexts.remove(session_id),
                _ => None,
            }
        };
        if removed.is_some() {
            context.advance(session_id, DriverState::Closed);
            self.release(&context.handle).await;
        }
    }

    async fn authenticate(
        &self,
        handle: &EngineHandle,
        config: &BrowserDriverConfig,
        email: &str,
        password: &str,
    ) -> Result<()> {
        let selectors = &config.selectors;
        let timeout = config.login_timeout();
        let fail = |step: &str| Error::AuthenticationFailed(format!("{} not found", step));

        if self.engine.find(handle, &selectors.authenticated_marker).await? {
            return Ok(());
        }
        if self.engine.find(handle, &selectors.login_button).await? {
            self.engine.click(handle, &selectors.login_button).await?;
        }

        if !self
            .engine
            .wait_for(handle, &selectors.email_input, timeout)
            .await?
        {
            return Err(fail("email input"));
        }
        self.engine
            .fill(handle, &selectors.email_input, email)
            .await?;

        // Two-step forms reveal the password field after continuing.
        if !self.engine.find(handle, &selectors.password_input).await? {
            self.engine.click(handle, &selectors.email_continue).await?;
        }
        if !self
            .engine
            .wait_for(handle, &selectors.password_input, timeout)
            .await?
        {
            return Err(fail("password input"));
        }
        self.engine
            .fill(handle, &selectors.password_input, password)
            .await?;
        self.engine.click(handle, &selectors.login_submit).await?;

        if self
            .engine
            .wait_for(handle, &selectors.authenticated_marker, timeout)
            .await?
        {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed(
                "signed-in marker did not appear".into(),
            ))
        }
    }

    /// Submit `prompt` in the session's page and return the response text.
    pub async fn submit(&self, session_id: &str, prompt: &str, model: Option<&str>) -> Result<String> {
        let context = self
            .contexts
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let _op = context.op.lock().await;
        match context.state() {
            DriverState::Ready => {}
            DriverState::Closed => return Err(Error::SessionNotFound(session_id.to_string())),
            other => {
                return Err(Error::transport(
                    Tier::Browser,
                    format!("Browser session {} is {}, not ready", session_id, other),
                ))
            }
        }

        let config = self.config();
        let selectors = &config.selectors;
        let handle = &context.handle;

        if let Some(model) = model {
            if let Err(e) = self.select_model(handle, &config, model).await {
                warn!("Model selection '{}' failed, using current model: {}", model, e);
            }
        }

        if !self
            .engine
            .wait_for(handle, &selectors.prompt_input, config.navigation_timeout())
            .await?
        {
            return Err(Error::transport(Tier::Browser, "Prompt input not found"));
        }
        // Earlier turns already carry a completion marker; only a new one
        // means this prompt has been answered.
        let completed = self
            .engine
            .count(handle, &selectors.response_complete)
            .await?;
        self.engine
            .fill(handle, &selectors.prompt_input, prompt)
            .await?;
        self.engine.click(handle, &selectors.send_button).await?;

        let timeout = config.response_timeout();
        if !self
            .engine
            .wait_for_count(handle, &selectors.response_complete, completed + 1, timeout)
            .await?
        {
            return Err(Error::ResponseTimeout {
                tier: Tier::Browser,
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        let text = self
            .engine
            .extract_text(handle, &selectors.response_text)
            .await?;
        Ok(text)
    }

    async fn select_model(
        &self,
        handle: &EngineHandle,
        config: &BrowserDriverConfig,
        model: &str,
    ) -> Result<()> {
        let selectors = &config.selectors;
        if !self.engine.find(handle, &selectors.model_selector).await? {
            debug!("No model selector on page; ignoring model '{}'", model);
            return Ok(());
        }
        self.engine.click(handle, &selectors.model_selector).await?;
        let option = selectors.model_option_for(model);
        if !self
            .engine
            .wait_for(handle, &option, config.login_timeout())
            .await?
        {
            return Err(Error::transport(
                Tier::Browser,
                format!("Model option {} not found", option),
            ));
        }
        self.engine.click(handle, &option).await
    }

    /// Release the session's browser context. Unknown or already closed
    /// ids return `false`.
    pub async fn close(&self, session_id: &str) -> bool {
        let Some(context) = self.contexts.lock().remove(session_id) else {
            return false;
        };
        context.advance(session_id, DriverState::Closed);
        self.release(&context.handle).await;
        info!("Closed browser session {}", session_id);
        true
    }

    /// Close every open context. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<String> = self.contexts.lock().keys().cloned().collect();
        let mut closed = 0;
        for id in ids {
            if self.close(&id).await {
                closed += 1;
            }
        }
        closed
    }

    async fn release(&self, handle: &EngineHandle) {
        if let Err(e) = self.engine.close(handle).await {
            warn!("Failed to release browser context {}: {}", handle, e);
        }
    }

    pub fn state(&self, session_id: &str) -> Option<DriverState> {
        self.contexts.lock().get(session_id).map(|c| c.state())
    }

    pub fn is_authenticated(&self, session_id: &str) -> bool {
        self.contexts
            .lock()
            .get(session_id)
            .is_some_and(|c| c.is_authenticated())
    }

    pub fn contexts(&self) -> Vec<ContextInfo> {
        self.contexts
            .lock()
            .iter()
            .map(|(id, c)| ContextInfo {
                session_id: id.clone(),
                state: c.state(),
                authenticated: c.is_authenticated(),
                launched_at: c.launched_at.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn duplicate(session_id: &str) -> Error {
    Error::Internal(format!(
        "Browser context for session {} already exists",
        session_id
    ))
}
