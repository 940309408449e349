//! Request extractors: tenant headers and JSON/query decoding with
//! [`AppError`] rejections.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::str::FromStr;

use tourdesk_core::{Actor, AgencyId, UserId};

use crate::error::AppError;

pub const AGENCY_HEADER: &str = "x-agency-id";
pub const USER_HEADER: &str = "x-user-id";

/// Caller identity taken from `X-Agency-Id` and the optional `X-User-Id`
#[derive(Debug, Clone, Copy)]
pub struct Tenant {
    pub agency: AgencyId,
    user: Option<UserId>,
}

impl Tenant {
    /// Required by routes that record who acted
    pub fn user(&self) -> Result<UserId, AppError> {
        self.user.ok_or(AppError::MissingHeader(USER_HEADER))
    }

    pub fn actor(&self) -> Result<Actor, AppError> {
        self.user().map(Actor::User)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let agency =
            header::<AgencyId>(parts, AGENCY_HEADER)?.ok_or(AppError::MissingHeader(AGENCY_HEADER))?;
        let user = header::<UserId>(parts, USER_HEADER)?;
        Ok(Self { agency, user })
    }
}

fn header<T>(parts: &Parts, name: &'static str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    let invalid = |reason: String| AppError::InvalidHeader {
        header: name,
        reason,
    };
    let text = value.to_str().map_err(|err| invalid(err.to_string()))?;
    text.trim()
        .parse()
        .map(Some)
        .map_err(|err: T::Err| invalid(err.to_string()))
}

/// JSON body; decoding failures become 400 responses
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string; decoding failures become 400 responses
#[derive(Debug, Clone)]
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}
