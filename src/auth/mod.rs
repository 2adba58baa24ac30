//! Bearer-token authentication against the external auth provider.
//!
//! Requests carry an HS256-signed JWT whose `sub` claim is the provider's
//! subject id. Customer rows are auto-provisioned on first authenticated
//! request from the token's claims; deactivated customers are rejected at
//! this boundary so no handler has to re-check `is_active`.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::{
    entities::customer::{self, Entity as CustomerEntity},
    errors::ServiceError,
    AppState,
};

pub const ROLE_ADMIN: &str = "admin";

/// Claims carried by the auth provider's tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Auth provider subject id
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ROLE_ADMIN)
    }
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            token_ttl,
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "token verification failed");
                ServiceError::Unauthorized("invalid or expired token".to_string())
            })
    }

    /// Issues a token signed with the shared secret. Used by tests and
    /// operational tooling; production tokens come from the auth provider.
    pub fn issue_token(
        &self,
        subject: &str,
        email: Option<&str>,
        name: Option<&str>,
        role: Option<&str>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            email: email.map(str::to_string),
            name: name.map(str::to_string),
            role: role.map(str::to_string),
            iat: now,
            exp: now + self.token_ttl.as_secs() as i64,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))
}

/// Looks up the customer row for a verified token, creating it on first
/// contact. The auth provider is the source of truth for identity; this
/// service only mirrors what it needs for orders and notifications.
async fn load_or_provision_customer(
    state: &AppState,
    claims: &Claims,
) -> Result<customer::Model, ServiceError> {
    let existing = CustomerEntity::find()
        .filter(customer::Column::AuthSubject.eq(claims.sub.clone()))
        .one(&*state.db)
        .await?;

    if let Some(found) = existing {
        return Ok(found);
    }

    let email = claims.email.clone().ok_or_else(|| {
        ServiceError::Unauthorized("token carries no email for provisioning".to_string())
    })?;
    let name = claims.name.clone().unwrap_or_else(|| email.clone());

    let fresh = customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        auth_subject: Set(claims.sub.clone()),
        email: Set(email),
        name: Set(name),
        gateway_customer_id: Set(None),
        is_active: Set(true),
        email_notifications: Set(true),
        marketing_emails: Set(false),
        document_type: Set(None),
        document_number: Set(None),
        gender: Set(None),
        date_of_birth: Set(None),
        phone: Set(None),
        ..Default::default()
    };

    match fresh.insert(&*state.db).await {
        Ok(created) => Ok(created),
        // Lost a provisioning race; the row exists now.
        Err(_) => CustomerEntity::find()
            .filter(customer::Column::AuthSubject.eq(claims.sub.clone()))
            .one(&*state.db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("customer provisioning failed".to_string())),
    }
}

/// Extractor for customer-facing endpoints.
#[derive(Debug, Clone)]
pub struct AuthenticatedCustomer {
    pub customer: customer::Model,
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedCustomer {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.services.auth.verify_token(token)?;
        let customer = load_or_provision_customer(state, &claims).await?;

        if !customer.is_active {
            return Err(ServiceError::Forbidden("account is deactivated".to_string()));
        }

        Ok(Self { customer, claims })
    }
}

/// Extractor for admin-only endpoints.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub claims: Claims,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = state.services.auth.verify_token(token)?;

        if !claims.is_admin() {
            return Err(ServiceError::Forbidden("admin access required".to_string()));
        }

        Ok(Self { claims })
    }
}
