//! Request shapes accepted by the user-management endpoints.
//!
//! Each form is validated as a whole: a rejected form reports every field that
//! broke a rule, not only the first one. Emails are trimmed and lowercased
//! before validation, so the value handed back is the one to store or compare.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::email::valid_email;

/// Field-level validation failure for a whole form.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FormError(#[from] ValidationErrors);

impl FormError {
    /// Names of the fields that failed, sorted.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.violations().into_keys().collect()
    }

    /// Failed fields mapped to the codes of the rules they broke.
    #[must_use]
    pub fn violations(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                (
                    field.to_string(),
                    errors.iter().map(|error| error.code.to_string()).collect(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn errors(&self) -> &ValidationErrors {
        &self.0
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let body: Value = json!({ "errors": self.violations() });
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}

/// Canonical form of a request before its rules are checked.
pub trait Normalize {
    #[must_use]
    fn normalize(self) -> Self;
}

/// Normalize then validate a form.
///
/// # Errors
/// Returns a [`FormError`] listing every violated field.
pub fn parse<T: Normalize + Validate>(form: T) -> Result<T, FormError> {
    let form = form.normalize();
    form.validate()?;
    Ok(form)
}

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn well_formed_email(email: &str) -> Result<(), ValidationError> {
    if valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("email"))
    }
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq)]
pub struct SignUp {
    #[validate(length(min = 4, max = 60))]
    pub name: String,
    #[validate(custom(function = "well_formed_email"))]
    pub email: String,
    #[validate(length(min = 4))]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq)]
pub struct SignIn {
    #[validate(custom(function = "well_formed_email"))]
    pub email: String,
    #[validate(length(min = 4))]
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq)]
pub struct RecoverPassword {
    #[validate(custom(function = "well_formed_email"))]
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq)]
pub struct ResetPassword {
    #[validate(custom(function = "well_formed_email"))]
    pub email: String,
    #[validate(length(min = 4))]
    pub password: String,
    #[validate(length(min = 1))]
    pub token: String,
}

/// Passwordless sign-in request: where to send the link, and where to land.
#[derive(ToSchema, Serialize, Deserialize, Validate, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailSignIn {
    #[validate(custom(function = "well_formed_email"))]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl Normalize for SignUp {
    fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

impl Normalize for SignIn {
    fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

impl Normalize for RecoverPassword {
    fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

impl Normalize for ResetPassword {
    fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

impl Normalize for EmailSignIn {
    fn normalize(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self.callback_url = self
            .callback_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        self
    }
}
