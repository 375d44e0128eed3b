use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use reservation_engine::{
    BookingReceipt, Campground, CatalogGateway, GatewayError, Promotion, PromotionAdminGateway,
    PromotionDraft, Reservation, ReservationGateway, ReservationPatch, ReservationRequest,
};

/// Settings for the booking API client
#[derive(Debug, Clone)]
pub struct BookingApiConfig {
    /// Base URL, without the `/api/v1` prefix
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for BookingApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("campground-reservations/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Response envelope used by every endpoint of the booking API
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    count: Option<usize>,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    #[serde(rename = "_id", alias = "id")]
    id: String,
}

/// Client for the booking API
pub struct BookingApiClient {
    client: Client,
    base_url: String,
}

impl BookingApiClient {
    /// Create a new booking API client
    pub fn new(config: BookingApiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Sends a request and unwraps the `{success, data, message}` envelope.
    ///
    /// Non-2xx statuses and `success: false` bodies both become
    /// [`GatewayError::Rejected`] with the server's message.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Envelope<serde_json::Value>>(&body)
                .ok()
                .and_then(|envelope| envelope.message)
                .unwrap_or_else(|| format!("Request failed with status {}", status));
            warn!("Booking API rejected request ({}): {}", status, message);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::DataFormat(format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| "Request was not successful".to_string());
            warn!("Booking API reported failure: {}", message);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(envelope)
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Vec<T>, GatewayError> {
        let envelope: Envelope<Vec<T>> = self.send(request).await?;
        let items = envelope.data.unwrap_or_default();
        if let Some(count) = envelope.count {
            if count != items.len() {
                debug!("Envelope count {} differs from {} items", count, items.len());
            }
        }
        Ok(items)
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let envelope: Envelope<T> = self.send(request).await?;
        envelope
            .data
            .ok_or_else(|| GatewayError::DataFormat("Response has no data".to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), GatewayError> {
        self.send::<serde_json::Value>(request).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl CatalogGateway for BookingApiClient {
    async fn list_campgrounds(&self) -> Result<Vec<Campground>, GatewayError> {
        debug!("Fetching campgrounds");
        self.fetch_list(self.client.get(self.url("/campgrounds")))
            .await
    }

    async fn list_promotions(&self) -> Result<Vec<Promotion>, GatewayError> {
        debug!("Fetching promotions");
        self.fetch_list(self.client.get(self.url("/promotions")))
            .await
    }
}

#[async_trait::async_trait]
impl ReservationGateway for BookingApiClient {
    async fn create_reservation(
        &self,
        token: &str,
        request: &ReservationRequest,
    ) -> Result<BookingReceipt, GatewayError> {
        let url = self.url(&format!(
            "/bookings/{}",
            urlencoding::encode(&request.campground_id)
        ));
        debug!("Creating reservation at campground {}", request.campground_id);

        let envelope: Envelope<CreatedDocument> = self
            .send(self.client.post(url).bearer_auth(token).json(request))
            .await?;
        let created = envelope
            .data
            .ok_or_else(|| GatewayError::DataFormat("Response has no reservation".to_string()))?;

        Ok(BookingReceipt {
            reservation_id: created.id,
            message: envelope.message,
        })
    }

    async fn update_reservation(
        &self,
        token: &str,
        reservation_id: &str,
        patch: &ReservationPatch,
    ) -> Result<(), GatewayError> {
        let url = self.url(&format!("/bookings/{}", urlencoding::encode(reservation_id)));
        self.execute(self.client.put(url).bearer_auth(token).json(patch))
            .await
    }

    async fn delete_reservation(&self, token: &str, reservation_id: &str) -> Result<(), GatewayError> {
        let url = self.url(&format!("/bookings/{}", urlencoding::encode(reservation_id)));
        self.execute(self.client.delete(url).bearer_auth(token))
            .await
    }

    /// Bookings that cannot be read as reservations are logged and left out, so one
    /// malformed record does not hide the rest.
    async fn list_reservations(&self, token: &str) -> Result<Vec<Reservation>, GatewayError> {
        let records: Vec<serde_json::Value> = self
            .fetch_list(self.client.get(self.url("/bookings")).bearer_auth(token))
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let id = record.get("_id").and_then(|id| id.as_str()).map(str::to_string);
                match serde_json::from_value::<Reservation>(record) {
                    Ok(reservation) => Some(reservation),
                    Err(e) => {
                        warn!("Skipping unreadable booking {:?}: {}", id, e);
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PromotionAdminGateway for BookingApiClient {
    async fn create_promotion(
        &self,
        token: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError> {
        self.fetch_one(
            self.client
                .post(self.url("/promotions"))
                .bearer_auth(token)
                .json(draft),
        )
        .await
    }

    async fn update_promotion(
        &self,
        token: &str,
        promotion_id: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError> {
        let url = self.url(&format!("/promotions/{}", urlencoding::encode(promotion_id)));
        self.fetch_one(self.client.put(url).bearer_auth(token).json(draft))
            .await
    }

    async fn delete_promotion(&self, token: &str, promotion_id: &str) -> Result<(), GatewayError> {
        let url = self.url(&format!("/promotions/{}", urlencoding::encode(promotion_id)));
        self.execute(self.client.delete(url).bearer_auth(token))
            .await
    }
}
