//! REST client for a remote fee sponsor.
//!
//! | Operation | Request |
//! |---|---|
//! | account | `GET /v1/account` |
//! | credit | `GET /v1/account/credit/{asset}` |
//! | create / read / update | `POST /v1/{asset}/exchanges`, `GET` / `PUT /v1/{asset}/exchanges/{id}` |
//! | list | `GET /v1/exchanges` |
//! | create / read final | `POST /v1/{asset}/final-exchanges`, `GET /v1/{asset}/final-exchanges/{id}` |
//! | list final | `GET /v1/final-exchanges` |
//!
//! Request bodies are `{"blob": "..."}`. A 4xx answer is the sponsor
//! declining (`ExchangeRejected`, carrying the body's `error` text); 5xx,
//! timeouts and unreadable bodies are `NetworkFailure`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AccountInfo, CreditBalance, ExchangeRecord, SponsorBackend};
use crate::config::{Credentials, SponsorConfig};
use crate::error::{ExchangeError, Result};
use crate::transaction::{Asset, TransactionBlob};

#[derive(Debug, Serialize)]
struct BlobBody<'a> {
    blob: &'a TransactionBlob,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Identifies the call in error reports.
#[derive(Debug, Clone, Copy)]
struct CallContext<'a> {
    step: &'static str,
    asset: &'a str,
    id: &'a str,
}

impl<'a> CallContext<'a> {
    fn new(step: &'static str, asset: &'a str, id: &'a str) -> Self {
        Self { step, asset, id }
    }

    fn network(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::NetworkFailure {
            collaborator: "sponsor".to_string(),
            step: self.step.to_string(),
            reason: reason.into(),
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::ExchangeRejected {
            asset: self.asset.to_string(),
            id: self.id.to_string(),
            step: self.step.to_string(),
            reason: reason.into(),
        }
    }
}

/// [`SponsorBackend`] over HTTP.
pub struct HttpSponsor {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpSponsor {
    pub fn new(config: &SponsorConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.api.timeout)
            .build()
            .map_err(|e| ExchangeError::InvalidConfig {
                reason: format!("sponsor http client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.api.base_url().to_string(),
            credentials: config.api.credentials.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Credentials::None => builder,
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            Credentials::Bearer { token } => builder.bearer_auth(token),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        ctx: CallContext<'_>,
    ) -> Result<T> {
        debug!(step = ctx.step, asset = ctx.asset, id = ctx.id, "sponsor request");
        let response = builder.send().await.map_err(|e| ctx.network(e.to_string()))?;
        let status = response.status();

        if status.is_client_error() {
            let reason = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            warn!(step = ctx.step, %status, %reason, "sponsor declined request");
            return Err(ctx.rejected(reason));
        }
        if !status.is_success() {
            return Err(ctx.network(format!("HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ctx.network(format!("unreadable response: {e}")))
    }
}

#[async_trait]
impl SponsorBackend for HttpSponsor {
    async fn account(&self) -> Result<AccountInfo> {
        let ctx = CallContext::new("account", "", "");
        self.send(self.request(Method::GET, "/v1/account"), ctx).await
    }

    async fn credit(&self, asset: &Asset) -> Result<CreditBalance> {
        let ctx = CallContext::new("credit", asset.as_str(), "");
        let path = format!("/v1/account/credit/{asset}");
        self.send(self.request(Method::GET, &path), ctx).await
    }

    async fn create_exchange(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        let ctx = CallContext::new("create_exchange", asset.as_str(), "");
        let path = format!("/v1/{asset}/exchanges");
        let req = self.request(Method::POST, &path).json(&BlobBody { blob });
        self.send(req, ctx).await
    }

    async fn read_exchange(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let ctx = CallContext::new("read_exchange", asset.as_str(), id);
        let path = format!("/v1/{asset}/exchanges/{id}");
        self.send(self.request(Method::GET, &path), ctx).await
    }

    async fn update_exchange(
        &self,
        asset: &Asset,
        id: &str,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        let ctx = CallContext::new("update_exchange", asset.as_str(), id);
        let path = format!("/v1/{asset}/exchanges/{id}");
        let req = self.request(Method::PUT, &path).json(&BlobBody { blob });
        self.send(req, ctx).await
    }

    async fn list_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        let ctx = CallContext::new("list_exchanges", "", "");
        self.send(self.request(Method::GET, "/v1/exchanges"), ctx).await
    }

    async fn create_exchange_final(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        let ctx = CallContext::new("create_exchange_final", asset.as_str(), "");
        let path = format!("/v1/{asset}/final-exchanges");
        let req = self.request(Method::POST, &path).json(&BlobBody { blob });
        self.send(req, ctx).await
    }

    async fn read_exchange_final(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let ctx = CallContext::new("read_exchange_final", asset.as_str(), id);
        let path = format!("/v1/{asset}/final-exchanges/{id}");
        self.send(self.request(Method::GET, &path), ctx).await
    }

    async fn list_exchanges_final(&self) -> Result<Vec<ExchangeRecord>> {
        let ctx = CallContext::new("list_exchanges_final", "", "");
        self.send(self.request(Method::GET, "/v1/final-exchanges"), ctx)
            .await
    }
}
