use crate::config;
use crate::response::ScanResponse;
use crate::settings::{SettingsError, SettingsStore, SERVER_URL_KEY};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid server url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("saving server url: {0}")]
    Settings(#[from] SettingsError),
}

/// Handle for one in-flight request, see [`AppState::begin_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Everything the client remembers between user actions.
pub struct AppState {
    store: SettingsStore,
    server_url: Url,
    last_result: Option<ScanResponse>,
    loading: bool,
    generation: u64,
}

impl AppState {
    /// Loads the saved server url once; falls back to the configured default.
    pub async fn load(store: SettingsStore, config: &config::Server) -> Self {
        let server_url = match store.get(SERVER_URL_KEY).await {
            Ok(Some(saved)) => match Url::parse(&saved) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring saved server url {:?}: {}", saved, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load server url: {}", e);
                None
            }
        };

        let server_url = server_url.unwrap_or_else(|| config.default_base_url.clone());
        debug!("Using server {}", server_url);

        AppState {
            store,
            server_url,
            last_result: None,
            loading: false,
            generation: 0,
        }
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Validates, persists, then adopts a new server url.
    pub async fn set_server_url(&mut self, url: &str) -> Result<&Url, StateError> {
        let parsed = Url::parse(url.trim()).map_err(|source| StateError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        self.store.set(SERVER_URL_KEY, parsed.as_str()).await?;
        info!("Server url saved: {}", parsed);
        self.server_url = parsed;
        Ok(&self.server_url)
    }

    /// Forgets the saved url and goes back to the configured default.
    pub async fn reset_server_url(&mut self, config: &config::Server) -> Result<&Url, StateError> {
        match self.store.remove(SERVER_URL_KEY).await {
            Ok(()) | Err(SettingsError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.server_url = config.default_base_url.clone();
        Ok(&self.server_url)
    }

    pub fn last_result(&self) -> Option<&ScanResponse> {
        self.last_result.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Starts a request; any request begun earlier is superseded by this one.
    pub fn begin_request(&mut self) -> Ticket {
        self.generation += 1;
        self.loading = true;
        self.last_result = None;
        Ticket(self.generation)
    }

    /// Stores `response` unless a newer request was started meanwhile.
    /// Returns whether the response was kept.
    pub fn finish_request(&mut self, ticket: Ticket, response: ScanResponse) -> bool {
        if ticket.0 != self.generation {
            debug!("Dropping response of superseded request {:?}", ticket);
            return false;
        }

        self.loading = false;
        self.last_result = Some(response);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn state() -> AppState {
        let store = SettingsStore::open_in_memory().await.unwrap();
        AppState::load(store, &config::Server::default()).await
    }

    #[tokio::test]
    async fn starts_with_configured_default() {
        let state = state().await;
        assert_eq!(state.server_url().as_str(), "http://127.0.0.1:5000/");
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn saved_url_is_loaded_on_startup() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        store.set(SERVER_URL_KEY, "http://192.168.0.7:5000/").await.unwrap();

        let state = AppState::load(store, &config::Server::default()).await;
        assert_eq!(state.server_url().host_str(), Some("192.168.0.7"));
    }

    #[tokio::test]
    async fn corrupt_saved_url_falls_back_to_default() {
        let store = SettingsStore::open_in_memory().await.unwrap();
        store.set(SERVER_URL_KEY, "::nope::").await.unwrap();

        let state = AppState::load(store, &config::Server::default()).await;
        assert_eq!(state.server_url().host_str(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn invalid_url_is_not_persisted() {
        let mut state = state().await;
        assert!(matches!(
            state.set_server_url("192.168.x.y").await,
            Err(StateError::InvalidUrl { .. })
        ));
        assert_eq!(state.store.get(SERVER_URL_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn setter_writes_through() {
        let mut state = state().await;
        state.set_server_url(" http://10.0.0.9:5000 ").await.unwrap();
        assert_eq!(
            state.store.get(SERVER_URL_KEY).await.unwrap().as_deref(),
            Some("http://10.0.0.9:5000/")
        );

        state.reset_server_url(&config::Server::default()).await.unwrap();
        assert_eq!(state.server_url().host_str(), Some("127.0.0.1"));
        assert_eq!(state.store.get(SERVER_URL_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn superseded_response_is_dropped() {
        let mut state = state().await;
        let first = state.begin_request();
        let second = state.begin_request();

        let newer = ScanResponse::from_exchange(200, None);
        assert!(state.finish_request(second, newer.clone()));
        assert!(!state.finish_request(first, ScanResponse::from_exchange(500, None)));

        assert_eq!(state.last_result(), Some(&newer));
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn loading_stays_set_until_latest_finishes() {
        let mut state = state().await;
        let first = state.begin_request();
        let second = state.begin_request();

        state.finish_request(first, ScanResponse::default());
        assert!(state.is_loading());

        state.finish_request(second, ScanResponse::default());
        assert!(!state.is_loading());
    }
}
