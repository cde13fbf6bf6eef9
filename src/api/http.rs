//! reqwest implementation of [`RideApi`].
//!
//! Paths are relative to the configured base URL, e.g. `POST {base}/rides`.
//! Non-2xx responses become `ApiError::Api`; 2xx responses with
//! `success: false` become `ApiError::Server`.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{AvailabilityBody, CancelBody, Envelope, ErrorBody, LoginBody, RouteBody};
use super::{ApiError, RideApi};
use crate::core::auth::{AuthSession, RegisterRequest};
use crate::core::geo::Coordinates;
use crate::core::location::{Place, Route};
use crate::core::payment::{NewPaymentMethod, PaymentMethodInfo};
use crate::core::ride::{
    BookingConfirmation, BookingRequest, EstimateRequest, RideEstimate, RideOption, RideRecord,
    RideUpdate,
};

pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        let token = self.token.read().ok().and_then(|t| t.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let envelope: Envelope<T> = Self::read_envelope(response).await?;
        envelope.into_data()
    }

    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        let response = builder.send().await?;
        let envelope: Envelope<serde_json::Value> = Self::read_envelope(response).await?;
        envelope.into_unit()
    }

    async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("API error: {} - {}", status, body);
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: parsed.error.or(parsed.message).unwrap_or(body),
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn json<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> RequestBuilder {
        self.request(method, path).json(body)
    }
}

#[async_trait]
impl RideApi for HttpApi {
    fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(_) => warn!("Token lock poisoned; token not updated"),
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        info!("Logging in as {}", email);
        self.send(self.json(Method::POST, "/auth/login", &LoginBody { email, password }))
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthSession, ApiError> {
        info!("Registering {}", request.email);
        self.send(self.json(Method::POST, "/auth/register", request))
            .await
    }

    async fn ride_options(&self) -> Result<Vec<RideOption>, ApiError> {
        self.send(self.request(Method::GET, "/rides/options")).await
    }

    async fn book_ride(&self, request: &BookingRequest) -> Result<BookingConfirmation, ApiError> {
        info!(
            "Booking {} from {} to {}",
            request.option_id,
            request.pickup.label(),
            request.dropoff.label()
        );
        self.send(self.json(Method::POST, "/rides", request)).await
    }

    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> Result<(), ApiError> {
        info!("Cancelling ride {}", ride_id);
        let path = format!("/rides/{ride_id}/cancel");
        self.send_unit(self.json(Method::POST, &path, &CancelBody { reason }))
            .await
    }

    async fn ride_estimate(&self, request: &EstimateRequest) -> Result<RideEstimate, ApiError> {
        self.send(self.json(Method::POST, "/rides/estimate", request))
            .await
    }

    async fn ride_history(&self) -> Result<Vec<RideRecord>, ApiError> {
        self.send(self.request(Method::GET, "/rides/history")).await
    }

    async fn ride_details(&self, ride_id: &str) -> Result<RideUpdate, ApiError> {
        self.send(self.request(Method::GET, &format!("/rides/{ride_id}")))
            .await
    }

    async fn search_places(
        &self,
        query: &str,
        near: Option<Coordinates>,
    ) -> Result<Vec<Place>, ApiError> {
        let mut params = vec![("q", query.to_string())];
        if let Some(near) = near {
            params.push(("lat", near.lat.to_string()));
            params.push(("lon", near.lon.to_string()));
        }
        self.send(self.request(Method::GET, "/locations/search").query(&params))
            .await
    }

    async fn route(&self, from: Coordinates, to: Coordinates) -> Result<Route, ApiError> {
        self.send(self.json(Method::POST, "/locations/route", &RouteBody { from, to }))
            .await
    }

    async fn set_availability(&self, online: bool) -> Result<(), ApiError> {
        self.send_unit(self.json(
            Method::PUT,
            "/drivers/me/availability",
            &AvailabilityBody { online },
        ))
        .await
    }

    async fn respond_to_request(&self, request_id: &str, accept: bool) -> Result<(), ApiError> {
        let verb = if accept { "accept" } else { "reject" };
        self.send_unit(self.request(Method::POST, &format!("/drivers/requests/{request_id}/{verb}")))
            .await
    }

    async fn payment_methods(&self) -> Result<Vec<PaymentMethodInfo>, ApiError> {
        self.send(self.request(Method::GET, "/payments/methods")).await
    }

    async fn add_payment_method(
        &self,
        method: &NewPaymentMethod,
    ) -> Result<PaymentMethodInfo, ApiError> {
        self.send(self.json(Method::POST, "/payments/methods", method))
            .await
    }

    async fn remove_payment_method(&self, id: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::DELETE, &format!("/payments/methods/{id}")))
            .await
    }

    async fn set_default_payment_method(&self, id: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::PUT, &format!("/payments/methods/{id}/default")))
            .await
    }
}
