pub mod browser;
pub mod identity;
pub mod registry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use swiftsell_schema::{
    AuthProviderKind, ConnectionState, Error, PlatformId, PreferenceUpdate, UserProfile,
};
use swiftsell_store::{PreferenceStore, USER_PROFILE_KEY};

pub use browser::{SystemBrowser, UrlOpener};
pub use identity::{IdentityProvider, IdentityUser, StubIdentityProvider};
pub use registry::{Authorization, PlatformRegistry, PlatformSpec};

type Callback = Arc<dyn Fn(Option<&UserProfile>) + Send + Sync>;

struct Listener {
    id: u64,
    callback: Callback,
}

/// Handle returned by [`AuthGateway::subscribe`]; pass back to
/// [`AuthGateway::unsubscribe`] to stop notifications.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

/// Session context bridging the identity provider, the marketplace
/// authorization registry and the preference store into one profile and
/// one notification channel. All collaborators are injected.
pub struct AuthGateway {
    store: Arc<dyn PreferenceStore>,
    identity: Arc<dyn IdentityProvider>,
    browser: Arc<dyn UrlOpener>,
    registry: PlatformRegistry,
    current: Mutex<Option<UserProfile>>,
    listeners: StdMutex<Vec<Listener>>,
    next_listener_id: AtomicU64,
}

impl AuthGateway {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        identity: Arc<dyn IdentityProvider>,
        registry: PlatformRegistry,
    ) -> Self {
        Self {
            store,
            identity,
            browser: Arc::new(SystemBrowser),
            registry,
            current: Mutex::new(None),
            listeners: StdMutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn UrlOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// Restore a previously persisted session on startup.
    pub async fn initialize(&self) {
        if let Some(profile) = self.load_stored().await {
            *self.current.lock().await = Some(profile.clone());
            self.notify(Some(&profile));
        }
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.current.lock().await.clone()
    }

    pub async fn sign_in(&self, kind: AuthProviderKind) -> Result<UserProfile, Error> {
        let user = self.identity.sign_in(kind).await.map_err(|err| {
            tracing::error!(provider = %kind, error = %err, "sign-in failed");
            Error::AuthFailed(kind)
        })?;

        let profile = self.build_profile(user, kind).await;
        *self.current.lock().await = Some(profile.clone());
        self.persist(&profile).await;
        self.notify(Some(&profile));
        Ok(profile)
    }

    pub async fn sign_out(&self) -> Result<(), Error> {
        self.identity
            .sign_out()
            .await
            .map_err(|err| Error::Backend(err.context("failed to sign out")))?;
        *self.current.lock().await = None;
        if let Err(err) = self.store.remove(USER_PROFILE_KEY).await {
            tracing::warn!(error = %err, "failed to clear persisted profile");
        }
        self.notify(None);
        Ok(())
    }

    /// Start connecting a marketplace. Platforms with an authorization
    /// endpoint open it in the external browser and park at `Pending`
    /// until [`complete_connection`](Self::complete_connection); the rest
    /// connect directly.
    pub async fn connect(&self, platform: PlatformId) -> Result<ConnectionState, Error> {
        if self.current.lock().await.is_none() {
            return Err(Error::NotSignedIn);
        }

        let target = if self.registry.spec(platform).requires_authorization() {
            if let Some(url) = self.registry.authorization_url(platform) {
                self.browser.open(&url).map_err(|err| {
                    tracing::error!(%platform, error = %err, "authorization redirect failed");
                    Error::ConnectionFailed(platform)
                })?;
            } else {
                tracing::warn!(%platform, "no client id configured, skipping authorization redirect");
            }
            ConnectionState::Pending
        } else {
            ConnectionState::Connected
        };

        self.mutate_profile(|profile| {
            profile.connected_platforms.insert(platform, target);
        })
        .await?;
        Ok(target)
    }

    /// Callback seam: a verified authorization callback completes the
    /// pending transition.
    pub async fn complete_connection(&self, platform: PlatformId) -> Result<(), Error> {
        self.mutate_profile(|profile| {
            if profile.connection(platform) != ConnectionState::Pending {
                tracing::warn!(%platform, "completing a connection that was not pending");
            }
            profile
                .connected_platforms
                .insert(platform, ConnectionState::Connected);
        })
        .await
    }

    pub async fn disconnect(&self, platform: PlatformId) -> Result<(), Error> {
        self.mutate_profile(|profile| {
            profile
                .connected_platforms
                .insert(platform, ConnectionState::Disconnected);
        })
        .await
    }

    pub async fn update_preferences(&self, update: PreferenceUpdate) -> Result<(), Error> {
        self.mutate_profile(|profile| {
            if let Some(platform) = update.default_platform {
                profile.preferences.default_platform = Some(platform);
            }
            if let Some(auto_sync) = update.auto_sync {
                profile.preferences.auto_sync = auto_sync;
            }
            if let Some(notifications) = update.notifications {
                profile.preferences.notifications = notifications;
            }
        })
        .await
    }

    /// Register a profile-change listener. Listeners run synchronously in
    /// registration order, though no ordering is guaranteed; mutating the
    /// listener set from inside a callback is unsupported.
    pub fn subscribe(
        &self,
        callback: impl Fn(Option<&UserProfile>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Listener {
                id,
                callback: Arc::new(callback),
            });
        }
        Subscription { id }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|l| l.id != subscription.id);
        }
    }

    async fn mutate_profile(
        &self,
        apply: impl FnOnce(&mut UserProfile),
    ) -> Result<(), Error> {
        let snapshot = {
            let mut current = self.current.lock().await;
            let profile = current.as_mut().ok_or(Error::NotSignedIn)?;
            apply(profile);
            profile.clone()
        };
        self.persist(&snapshot).await;
        self.notify(Some(&snapshot));
        Ok(())
    }

    async fn build_profile(&self, user: IdentityUser, kind: AuthProviderKind) -> UserProfile {
        // Connection and preference state survives re-sign-in of the same
        // user; a different uid starts from defaults.
        let stored = self.load_stored().await.filter(|p| p.uid == user.uid);

        let mut connected = stored
            .as_ref()
            .map(|p| p.connected_platforms.clone())
            .unwrap_or_default();
        let own_platform = match kind {
            AuthProviderKind::Google => PlatformId::Google,
            AuthProviderKind::Facebook => PlatformId::Facebook,
        };
        connected.insert(own_platform, ConnectionState::Connected);

        UserProfile {
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            photo_url: user.photo_url,
            provider: user.provider_tag,
            connected_platforms: connected,
            preferences: stored.map(|p| p.preferences).unwrap_or_default(),
        }
    }

    async fn load_stored(&self) -> Option<UserProfile> {
        let value = match self.store.get(USER_PROFILE_KEY).await {
            Ok(value) => value?,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read persisted profile");
                return None;
            }
        };
        match serde_json::from_str(&value) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!(error = %err, "persisted profile is unreadable, ignoring");
                None
            }
        }
    }

    // Persistence is fire-and-forget: a storage fault never fails the
    // profile mutation that triggered it.
    async fn persist(&self, profile: &UserProfile) {
        let value = match serde_json::to_string(profile) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize profile");
                return;
            }
        };
        if let Err(err) = self.store.set(USER_PROFILE_KEY, &value).await {
            tracing::warn!(error = %err, "failed to persist profile");
        }
    }

    fn notify(&self, profile: Option<&UserProfile>) {
        let callbacks: Vec<Callback> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|l| l.callback.clone()).collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(profile);
        }
    }
}
