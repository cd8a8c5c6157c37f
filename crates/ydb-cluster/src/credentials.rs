//! Token providers.
//!
//! Credentials are a collaborator, not process-global state: the connection
//! asks its provider for a token on every RPC and attaches it as request
//! metadata. Providers that cache are free to do so internally; the driver
//! itself never caches tokens.

use crate::context::Context;
use crate::error::{Result, YdbError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Source of authentication tokens. An empty token means "send no
/// authentication metadata".
#[async_trait]
pub trait Credentials: Send + Sync + fmt::Debug {
    async fn token(&self, ctx: &Context) -> Result<String>;
}

/// Static token, e.g. from `YDB_ACCESS_TOKEN_CREDENTIALS`.
#[derive(Clone)]
pub struct AccessTokenCredentials {
    token: String,
}

impl AccessTokenCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        AccessTokenCredentials {
            token: token.into(),
        }
    }
}

impl fmt::Debug for AccessTokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never leak the token into logs
        f.write_str("AccessTokenCredentials")
    }
}

#[async_trait]
impl Credentials for AccessTokenCredentials {
    async fn token(&self, _ctx: &Context) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// No authentication.
#[derive(Debug, Clone, Default)]
pub struct AnonymousCredentials;

#[async_trait]
impl Credentials for AnonymousCredentials {
    async fn token(&self, _ctx: &Context) -> Result<String> {
        Ok(String::new())
    }
}

/// Tries several providers in order, returning the first token obtained and
/// the last error if all fail.
#[derive(Debug)]
pub struct MultiCredentials {
    providers: Vec<Arc<dyn Credentials>>,
}

impl MultiCredentials {
    pub fn new(providers: Vec<Arc<dyn Credentials>>) -> Self {
        MultiCredentials { providers }
    }
}

#[async_trait]
impl Credentials for MultiCredentials {
    async fn token(&self, ctx: &Context) -> Result<String> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.token(ctx).await {
                Ok(token) => return Ok(token),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or(YdbError::Credentials {
            message: "no credentials".to_string(),
        }))
    }
}
