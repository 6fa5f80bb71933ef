use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::dto::TokenKind;
use super::jwt::JwtKeys;
use crate::state::AppState;
use crate::store::get_as;
use crate::users::model::{user_path, Role, UserRecord};

/// Who is calling and in which mode. Passed explicitly to everything that
/// acts on behalf of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub mode: Role,
}

/// Extracts and validates the bearer access token.
#[derive(Debug)]
pub struct AuthUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Access token required".to_string(),
            ));
        }

        Ok(AuthUser(Session {
            user_id: claims.sub,
            mode: claims.mode,
        }))
    }
}

/// An access token in admin mode whose user is still an admin.
#[derive(Debug)]
pub struct AdminUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(session) = AuthUser::from_request_parts(parts, state).await?;
        if session.mode != Role::Admin {
            return Err((StatusCode::FORBIDDEN, "Admin mode required".to_string()));
        }

        let path = user_path(&session.user_id).map_err(crate::error::internal)?;
        let record: Option<UserRecord> = get_as(state.store.as_ref(), &path)
            .await
            .map_err(crate::error::internal)?;
        match record {
            Some(r) if r.role == Role::Admin => Ok(AdminUser(session)),
            _ => {
                warn!(user_id = %session.user_id, "admin token for non-admin user");
                Err((StatusCode::FORBIDDEN, "Admin privileges required".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use serde_json::json;

    fn parts_with(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/me");
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_or_bad_tokens_are_rejected() {
        let state = AppState::fake();
        let err = AuthUser::from_request_parts(&mut parts_with(None), &state).await.err().unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
        let err = AuthUser::from_request_parts(&mut parts_with(Some("junk")), &state).await.err().unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_tokens_cannot_be_used_as_access() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let refresh = keys.sign_refresh(Uuid::new_v4(), Role::User, 0).unwrap();
        let err = AuthUser::from_request_parts(&mut parts_with(Some(&refresh)), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.1, "Access token required");
    }

    #[tokio::test]
    async fn admin_needs_admin_mode_and_live_admin_role() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let uid = Uuid::new_v4();
        state
            .store
            .set(&user_path(&uid).unwrap(), json!({"name": "Boss", "role": "admin"}))
            .await
            .unwrap();

        let user_mode = keys.sign_access(uid, Role::User, 0).unwrap();
        let err = AdminUser::from_request_parts(&mut parts_with(Some(&user_mode)), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let admin_mode = keys.sign_access(uid, Role::Admin, 0).unwrap();
        let AdminUser(session) = AdminUser::from_request_parts(&mut parts_with(Some(&admin_mode)), &state)
            .await
            .map_err(|e| e.1)
            .unwrap();
        assert_eq!(session.user_id, uid);

        // demoted after the token was issued
        state
            .store
            .set(&user_path(&uid).unwrap().child("role").unwrap(), json!("user"))
            .await
            .unwrap();
        let err = AdminUser::from_request_parts(&mut parts_with(Some(&admin_mode)), &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }
}
