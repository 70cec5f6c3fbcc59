//! Request extractors: caller identity, client address and JSON bodies
//! with API-shaped rejections.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tutor_core::Account;

use crate::{auth::Authenticator, session_cookie, state::AppState, ApiError};

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal(pub Account);

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Account);

/// The caller, if a valid session cookie was presented.
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Account>);

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_cookie::read(&parts.headers);
        state.auth.authenticate(token.as_ref()).await.map(Self)
    }
}

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Principal(account) = Principal::from_request_parts(parts, state).await?;
        Authenticator::require_admin(&account)?;
        Ok(Self(account))
    }
}

impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = session_cookie::read(&parts.headers) else {
            return Ok(Self(None));
        };
        match state.auth.authenticate(Some(&token)).await {
            Ok(account) => Ok(Self(Some(account))),
            Err(ApiError::Unauthorized(_)) => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}

/// Peer address of the connection. Falls back to `0.0.0.0` when the router
/// is served without connect info, as in unit tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());
        Ok(Self(ip))
    }
}

/// `Json` whose rejection is an [`ApiError::BadRequest`] JSON body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
    }
}
