//! Form value extraction for the delete endpoints.
//!
//! Clients send parameters as a query string, a urlencoded body or a
//! multipart body. Body values win over query values of the same name.

use crate::error::ApiError;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use std::collections::HashMap;

/// All named form values of a request, flattened to their first occurrence.
#[derive(Debug, Default, Clone)]
pub struct FormValues(pub HashMap<String, String>);

impl FormValues {
    /// Returns the value for `name`, or an empty string when absent.
    pub fn get(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or_default()
    }
}

impl<S> FromRequest<S> for FormValues
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut values = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map(|Query(query)| query)
            .unwrap_or_default();

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

            while let Some(field) = multipart.next_field().await? {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let text = field.text().await?;
                values.insert(name, text);
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            values.extend(body);
        }

        Ok(FormValues(values))
    }
}
