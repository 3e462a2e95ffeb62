use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::context::{Principal, SecurityContext};
use super::error::AuthError;

/// User id of the caller, or `"anonymous"` for unauthenticated requests.
///
/// For handlers that permit anonymous access.
///
/// ```rust,ignore
/// async fn list_tasks(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
///     store.tasks_for(&user_id)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .extensions
            .get::<SecurityContext>()
            .map_or(super::context::ANONYMOUS_USER, SecurityContext::current_user_id);
        Ok(Self(user_id.to_owned()))
    }
}

/// The authenticated caller. Returns `401 Unauthorized` otherwise.
///
/// ```rust,ignore
/// async fn protected(Authenticated(principal): Authenticated) -> impl IntoResponse {
///     format!("Hello, {}", principal.user_id())
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(principal: Option<Authenticated>) -> impl IntoResponse { /* … */ }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .and_then(SecurityContext::into_principal)
            .map(Self)
            .ok_or(AuthError::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Authenticated {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .and_then(SecurityContext::into_principal)
            .map(Self))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for SecurityContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserIdentity;
    use crate::middleware::classifier::CredentialKind;
    use crate::types::UserId;
    use axum::http::Request;

    fn parts(ctx: Option<SecurityContext>) -> Parts {
        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        if let Some(ctx) = ctx {
            parts.extensions.insert(ctx);
        }
        parts
    }

    fn signed_in() -> SecurityContext {
        let mut ctx = SecurityContext::anonymous();
        ctx.authenticate(UserIdentity::new(UserId("u1".into()), []), CredentialKind::Session);
        ctx
    }

    #[tokio::test]
    async fn current_user_falls_back_to_anonymous() {
        let mut p = parts(None);
        let CurrentUser(id) = CurrentUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(id, "anonymous");

        let mut p = parts(Some(signed_in()));
        let CurrentUser(id) = CurrentUser::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(id, "u1");
    }

    #[tokio::test]
    async fn authenticated_rejects_anonymous() {
        let mut p = parts(Some(SecurityContext::anonymous()));
        let result = <Authenticated as FromRequestParts<()>>::from_request_parts(&mut p, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));

        let mut p = parts(Some(signed_in()));
        let Authenticated(principal) =
            <Authenticated as FromRequestParts<()>>::from_request_parts(&mut p, &())
                .await
                .unwrap();
        assert_eq!(principal.user_id().as_str(), "u1");
    }
}
