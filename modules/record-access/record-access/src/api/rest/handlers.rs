use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Query};
use axum::{Extension, Json};
use http::request::Parts;
use http::{HeaderMap, StatusCode, header};
use recordkit_schema::QueryMode;
use recordkit_security::filter_keys;
use serde_json::{Map, Value, json};

use crate::api::rest::error::ApiResult;
use crate::domain::error::AccessError;
use crate::domain::mount::Mount;
use crate::domain::ports::Credentials;
use crate::domain::service::Endpoints;

type Params = Path<HashMap<String, String>>;

/// Credentials from the `Authorization: Bearer` header; anonymous without one.
pub(crate) struct Bearer(pub Credentials);

impl<S: Send + Sync> FromRequestParts<S> for Bearer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(credentials(&parts.headers)))
    }
}

pub(crate) async fn list_records(
    Extension(endpoints): Extension<Endpoints>,
    Path(params): Params,
    Query(query): Query<HashMap<String, String>>,
    Bearer(credentials): Bearer,
) -> ApiResult<Json<Value>> {
    let layer_ids = layer_ids(endpoints.mount(), &params)?;
    let query: Map<String, Value> = query
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let records = endpoints
        .list(&credentials, &layer_ids, &query, QueryMode::Server)
        .await?;
    Ok(Json(json!({ "data": records })))
}

pub(crate) async fn create_record(
    Extension(endpoints): Extension<Endpoints>,
    Path(params): Params,
    Bearer(credentials): Bearer,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let layer_ids = layer_ids(endpoints.mount(), &params)?;
    let created = endpoints
        .create(&credentials, &layer_ids, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": created }))))
}

pub(crate) async fn get_record(
    Extension(endpoints): Extension<Endpoints>,
    Path(params): Params,
    Bearer(credentials): Bearer,
) -> ApiResult<Json<Value>> {
    let layer_ids = layer_ids(endpoints.mount(), &params)?;
    let id = record_id(endpoints.mount(), &params)?;
    let record = endpoints
        .get_one(&credentials, &layer_ids, id)
        .await?;
    Ok(Json(json!({ "data": record })))
}

pub(crate) async fn update_record(
    Extension(endpoints): Extension<Endpoints>,
    Path(params): Params,
    Bearer(credentials): Bearer,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let layer_ids = layer_ids(endpoints.mount(), &params)?;
    let id = record_id(endpoints.mount(), &params)?;
    let updated = endpoints
        .update_one(&credentials, &layer_ids, id, &body)
        .await?;
    Ok(Json(json!({ "data": updated })))
}

pub(crate) async fn delete_record(
    Extension(endpoints): Extension<Endpoints>,
    Path(params): Params,
    Bearer(credentials): Bearer,
) -> ApiResult<Json<Value>> {
    let layer_ids = layer_ids(endpoints.mount(), &params)?;
    let id = record_id(endpoints.mount(), &params)?;
    let deleted = endpoints
        .delete_one(&credentials, &layer_ids, id)
        .await?;
    Ok(Json(json!({ "data": deleted })))
}

fn credentials(headers: &HeaderMap) -> Credentials {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").map(str::trim))
        .map_or_else(Credentials::anonymous, |token| {
            Credentials::bearer(token.to_owned())
        })
}

fn layer_ids(
    mount: &Mount,
    params: &HashMap<String, String>,
) -> Result<Vec<String>, AccessError> {
    mount
        .layers()
        .iter()
        .map(|layer| path_param(params, &filter_keys::layer_key(layer)).map(str::to_owned))
        .collect()
}

fn record_id<'p>(
    mount: &Mount,
    params: &'p HashMap<String, String>,
) -> Result<&'p str, AccessError> {
    path_param(params, mount.id_field())
}

fn path_param<'p>(
    params: &'p HashMap<String, String>,
    name: &str,
) -> Result<&'p str, AccessError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| AccessError::internal(format!("path parameter `{name}` not captured")))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;
    use secrecy::ExposeSecret;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert!(credentials(&headers).bearer_token().is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(credentials(&headers).bearer_token().is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  t-1 "));
        let creds = credentials(&headers);
        assert_eq!(
            creds.bearer_token().map(ExposeSecret::expose_secret),
            Some("t-1")
        );
    }
}
