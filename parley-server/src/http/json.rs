//! JSON body extraction with errors in the API taxonomy.

use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// `axum::Json` with the rejection mapped to a 400 problem response, so
/// a malformed body (bad JSON, a non-UUID id) surfaces like every other
/// invalid argument instead of axum's plain-text 422.
pub struct ApiJson<T>(pub T);

impl<T> std::fmt::Debug for ApiJson<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiJson").field(&self.0).finish()
    }
}

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(request, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}
