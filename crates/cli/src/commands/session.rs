//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! kaptaze session login -e ayse@example.com -n "Ayşe" -t "$TOKEN"
//! kaptaze session show
//! kaptaze session logout
//! ```

use kaptaze_client::ClientContext;
use kaptaze_client::models::{AuthToken, UserSession};
use kaptaze_core::Email;

use super::CommandError;

/// Log the signed-in user.
pub async fn show(ctx: &ClientContext) {
    let store = ctx.store();
    match store.current_user().await {
        Some(user) => {
            let partition = store.partition_key().await;
            tracing::info!(
                "Signed in as {} ({})",
                user.name.as_deref().unwrap_or("-"),
                partition.as_ref().map_or("-", |p| p.as_str())
            );
            tracing::info!(
                "  Orders: {}, favorites: {}",
                store.user_orders().await.len(),
                store.user_favorites().await.len()
            );
        }
        None => tracing::info!("Not signed in"),
    }
}

/// Sign in as `email` with a token issued elsewhere.
///
/// # Errors
///
/// Returns an error if the email is invalid.
pub async fn login(
    ctx: &ClientContext,
    email: &str,
    name: Option<String>,
    token: String,
) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::InvalidEmail(e.to_string()))?;
    let mut user = UserSession::with_email(email);
    user.name = name;

    ctx.sign_in(user, AuthToken::new(token)).await;
    show(ctx).await;
    Ok(())
}

/// Sign out.
pub async fn logout(ctx: &ClientContext) {
    ctx.logout().await;
    tracing::info!("Signed out");
}
