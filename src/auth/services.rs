use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::google::{IdentityProvider, ProviderError};
use crate::{
    error::{AppError, AppResult},
    store::{Store, User},
};

pub struct GoogleLogin {
    pub user: User,
    pub first_login: bool,
}

/// Random value for the OAuth `state` parameter.
pub fn oauth_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Verifies a Google ID token and returns the matching local user,
/// creating it on first sight.
pub async fn login_with_google(
    store: &dyn Store,
    identity: &dyn IdentityProvider,
    token: &str,
) -> AppResult<GoogleLogin> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("Invalid request"));
    }

    let profile = match identity.verify_id_token(token).await {
        Ok(p) => p,
        Err(ProviderError::Rejected) => {
            warn!("google token rejected");
            return Err(AppError::unauthorized("Invalid Google token"));
        }
        Err(ProviderError::Upstream(e)) => {
            return Err(AppError::internal("Failed to decode user info")(e));
        }
    };

    let email = profile.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::unauthorized("Invalid Google token"));
    }

    if let Some(user) = store
        .find_user_by_email(&email)
        .await
        .map_err(AppError::internal("Failed to fetch user"))?
    {
        return Ok(GoogleLogin {
            user,
            first_login: false,
        });
    }

    let now = OffsetDateTime::now_utc();
    let user = User {
        id: Uuid::new_v4(),
        name: profile.name,
        email,
        image: profile.picture,
        created_at: now,
        updated_at: now,
    };
    let created = store
        .insert_user(&user)
        .await
        .map_err(AppError::internal("Failed to create user"))?;
    if created {
        info!(user_id = %user.id, "user created");
        return Ok(GoogleLogin {
            user,
            first_login: true,
        });
    }

    // Lost a race against a concurrent first login for the same email.
    let user = store
        .find_user_by_email(&user.email)
        .await
        .map_err(AppError::internal("Failed to fetch user"))?
        .ok_or_else(|| {
            AppError::internal("Failed to create user")(anyhow::anyhow!(
                "user vanished after email conflict"
            ))
        })?;
    Ok(GoogleLogin {
        user,
        first_login: false,
    })
}
