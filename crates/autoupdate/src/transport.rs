use crate::error::Result;
use reqwest::{Client, Proxy};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Builder for [`Transport`].
#[derive(Default)]
pub struct TransportBuilder {
    client: Option<Client>,
    proxy: Option<String>,
}

impl TransportBuilder {
    /// Provide a custom reqwest client instance.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Route requests through the given HTTP/S proxy. Empty means direct.
    pub fn proxy(mut self, addr: impl Into<String>) -> Self {
        self.proxy = Some(addr.into());
        self
    }

    /// Build the transport. An explicit client takes precedence over `proxy`;
    /// without either, requests go out directly.
    pub fn build(self) -> Result<Transport> {
        let client = match (self.client, self.proxy.as_deref()) {
            (Some(client), _) => client,
            (None, Some(addr)) if !addr.is_empty() => proxied_client(addr)?,
            (None, _) => direct_client()?,
        };

        Ok(Transport {
            client: Arc::new(RwLock::new(client)),
        })
    }
}

/// HTTP client shared by every check and download of one update source.
///
/// Cloning shares the underlying slot, so [`Transport::set_proxy`] on any clone
/// affects all of them. Requests already in flight keep the client they
/// started with; the next request picks up the latest one.
#[derive(Clone)]
pub struct Transport {
    client: Arc<RwLock<Client>>,
}

impl Transport {
    /// Create a new builder.
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// Snapshot of the current client.
    pub fn client(&self) -> Client {
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Reconfigure the proxy used by subsequent requests.
    ///
    /// An empty address resets to a direct client. An address reqwest rejects
    /// is logged and the previously configured client stays in place.
    pub fn set_proxy(&self, addr: &str) {
        let client = if addr.is_empty() {
            debug!("resetting update transport to direct connections");
            direct_client()
        } else {
            debug!(proxy = addr, "routing update transport through proxy");
            proxied_client(addr)
        };
        let client = match client {
            Ok(client) => client,
            Err(err) => {
                error!(proxy = addr, "could not use proxy: {}", err);
                return;
            }
        };

        match self.client.write() {
            Ok(mut guard) => *guard = client,
            Err(poisoned) => *poisoned.into_inner() = client,
        }
    }
}

/// Client that ignores `HTTP_PROXY` and friends from the environment.
fn direct_client() -> Result<Client> {
    Ok(Client::builder().no_proxy().build()?)
}

fn proxied_client(addr: &str) -> Result<Client> {
    let proxy = Proxy::all(addr)?;
    Ok(Client::builder().proxy(proxy).build()?)
}
