use anyhow::Result;
use async_trait::async_trait;
use swiftsell_schema::AuthProviderKind;

/// Raw identity returned by the external provider's sign-in surface.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider_tag: String,
}

/// External identity provider boundary. The popup-based OAuth surface
/// lives outside this crate; embedders inject their own implementation.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, kind: AuthProviderKind) -> Result<IdentityUser>;

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

/// Deterministic identities used when no provider credential is
/// configured. Keeps the sign-in flow exercisable offline.
pub struct StubIdentityProvider;

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    async fn sign_in(&self, kind: AuthProviderKind) -> Result<IdentityUser> {
        let user = match kind {
            AuthProviderKind::Google => IdentityUser {
                uid: "mock-google-user".to_string(),
                email: Some("test@gmail.com".to_string()),
                display_name: Some("Test User".to_string()),
                photo_url: Some("https://via.placeholder.com/40".to_string()),
                provider_tag: kind.provider_tag().to_string(),
            },
            AuthProviderKind::Facebook => IdentityUser {
                uid: "mock-facebook-user".to_string(),
                email: Some("test@facebook.com".to_string()),
                display_name: Some("Facebook Test User".to_string()),
                photo_url: Some("https://via.placeholder.com/40".to_string()),
                provider_tag: kind.provider_tag().to_string(),
            },
        };
        tracing::info!(provider = %kind, "mock sign-in");
        Ok(user)
    }
}
