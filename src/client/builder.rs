//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//! The backing transport is chosen here: a native host bridge if one was
//! supplied (or detected), the web transport otherwise.
//!
//! # Example
//!
//! ```no_run
//! use console_transport::Client;
//!
//! # async fn example() -> console_transport::Result<()> {
//! let client = Client::builder()
//!     .base_url("https://console.example.com")
//!     .auth_token("secret")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::listener::{DirectContext, Dispatcher, ListenerRegistry, UpdateContext};
use crate::transport::{AuthToken, NativeHost, NativeTransport, NoToken, TokenProvider, WebTransport};

use super::core::{Backend, Client};
use super::options::TransportOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Web transport configuration.
    options: TransportOptions,
    /// Host bridge; selects the native transport when set.
    native_host: Option<Arc<dyn NativeHost>>,
    /// Fallback token source.
    token_provider: Option<Arc<dyn TokenProvider>>,
    /// Initial runtime token.
    auth_token: Option<String>,
    /// Host update cycle for listener dispatch.
    update_context: Option<Arc<dyn UpdateContext>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("native_host", &self.native_host.is_some())
            .field("token_provider", &self.token_provider.is_some())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("update_context", &self.update_context.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the web transport options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the backend base URL.
    #[inline]
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.options.base_url = base_url.into();
        self
    }

    /// Uses `host` as the backing transport.
    #[inline]
    #[must_use]
    pub fn native_host(mut self, host: Arc<dyn NativeHost>) -> Self {
        self.native_host = Some(host);
        self
    }

    /// Runs `detect` and uses the bridge it finds, if any.
    #[inline]
    #[must_use]
    pub fn detect_native_host(
        mut self,
        detect: impl FnOnce() -> Option<Arc<dyn NativeHost>>,
    ) -> Self {
        if let Some(host) = detect() {
            self.native_host = Some(host);
        }
        self
    }

    /// Sets the fallback token source (e.g. the persisted login).
    #[inline]
    #[must_use]
    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the initial runtime token.
    #[inline]
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the host update cycle listeners run in.
    #[inline]
    #[must_use]
    pub fn update_context(mut self, context: impl UpdateContext + 'static) -> Self {
        self.update_context = Some(Arc::new(context));
        self
    }

    /// Builds the client.
    ///
    /// With the web transport and `auto_connect` enabled, the WebSocket is
    /// opened immediately, which requires a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid, the base URL is not
    ///   `http`/`https`, or `auto_connect` is set outside a Tokio runtime
    /// - [`Error::Url`] if the base URL does not parse
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn build(self) -> Result<Client> {
        let id = ClientId::generate();
        let context = self
            .update_context
            .unwrap_or_else(|| Arc::new(DirectContext));
        let dispatcher = Arc::new(Dispatcher::new(ListenerRegistry::new(), context));

        let provider = self.token_provider.unwrap_or_else(|| Arc::new(NoToken));
        let auth = Arc::new(AuthToken::new(provider));
        auth.set(self.auth_token);

        if let Some(host) = self.native_host {
            info!(client = %id, "Using native host transport");
            let native = NativeTransport::new(host, Arc::clone(&dispatcher));
            return Ok(Client::from_parts(id, Backend::Native(native), dispatcher, auth));
        }

        self.options.validate()?;
        let base_url = parse_base_url(&self.options.base_url)?;
        let ws_url = derive_ws_url(&base_url, &self.options.ws_path)?;

        if self.options.auto_connect && Handle::try_current().is_err() {
            return Err(Error::config(
                "auto_connect requires a Tokio runtime. Build inside one or use \
                 TransportOptions::without_auto_connect()",
            ));
        }

        info!(client = %id, base_url = %base_url, ws_url = %ws_url, "Using web transport");
        let web = WebTransport::new(
            id,
            &base_url,
            ws_url,
            &self.options,
            Arc::clone(&auth),
            Arc::clone(&dispatcher),
        )?;

        if self.options.auto_connect {
            web.connect();
        }

        Ok(Client::from_parts(id, Backend::Web(web), dispatcher, auth))
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Parses the base URL; only `http` and `https` are accepted.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!(
            "base URL must be http or https, got `{other}://`"
        ))),
    }
}

/// Derives the WebSocket URL: `http→ws`, `https→wss`, path appended.
pub(crate) fn derive_ws_url(base: &Url, ws_path: &str) -> Result<Url> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };

    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot derive {scheme} URL from {base}")))?;

    let prefix = base.path().trim_end_matches('/');
    let suffix = ws_path.trim_start_matches('/');
    url.set_path(&format!("{prefix}/{suffix}"));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
