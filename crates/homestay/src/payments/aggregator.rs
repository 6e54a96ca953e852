use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::gateway::{
    GatewayError, GatewaySettlement, PaymentGateway, PaymentInitiation, PaymentInstruction,
    PaymentRequest, Reconciliation,
};
use super::GatewayKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub base_url: Url,
    pub api_key: String,
    pub return_url: String,
}

impl AggregatorConfig {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        return_url: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            return_url: return_url.into(),
        })
    }
}

/// Hosted checkout adapter (cards and UPI collect).
pub struct AggregatorGateway {
    config: AggregatorConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateOrder<'a> {
    amount: Decimal,
    currency: &'static str,
    receipt: &'a str,
    return_url: &'a str,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    application_id: &'a str,
    payer: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    amount_paid: Option<Decimal>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl AggregatorGateway {
    pub fn new(config: AggregatorConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.config
            .base_url
            .join(path)
            .map_err(|err| GatewayError::InvalidResponse {
                gateway: GatewayKind::Aggregator,
                message: format!("cannot build endpoint '{path}': {err}"),
            })
    }

    async fn read_order(response: reqwest::Response) -> Result<OrderResponse, GatewayError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transport {
                gateway: GatewayKind::Aggregator,
                message: format!("aggregator answered {status}"),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                gateway: GatewayKind::Aggregator,
                message: format!("{status}: {body}"),
            });
        }
        response
            .json::<OrderResponse>()
            .await
            .map_err(|err| GatewayError::InvalidResponse {
                gateway: GatewayKind::Aggregator,
                message: err.to_string(),
            })
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        gateway: GatewayKind::Aggregator,
        message: err.to_string(),
    }
}

fn settlement_for(order: &OrderResponse) -> Result<GatewaySettlement, GatewayError> {
    match order.status.as_str() {
        "created" => Ok(GatewaySettlement::Unpaid),
        "attempted" | "authorized" => Ok(GatewaySettlement::Pending),
        "paid" | "captured" => order
            .amount_paid
            .map(|amount| GatewaySettlement::Success { amount })
            .ok_or_else(|| GatewayError::InvalidResponse {
                gateway: GatewayKind::Aggregator,
                message: format!("order {} paid without amount_paid", order.id),
            }),
        "failed" | "expired" => Ok(GatewaySettlement::Failed {
            reason: order
                .failure_reason
                .clone()
                .unwrap_or_else(|| format!("order {}", order.status)),
        }),
        other => Err(GatewayError::InvalidResponse {
            gateway: GatewayKind::Aggregator,
            message: format!("unknown order status '{other}'"),
        }),
    }
}

#[async_trait]
impl PaymentGateway for AggregatorGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Aggregator
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let body = CreateOrder {
            amount: request.amount,
            currency: "INR",
            receipt: &request.application_number,
            return_url: &self.config.return_url,
            notes: OrderNotes {
                application_id: &request.application_id,
                payer: &request.payer,
            },
        };

        let response = self
            .client
            .post(self.endpoint("v1/orders")?)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let order = Self::read_order(response).await?;
        debug!(
            order = %order.id,
            application = %request.application_number,
            "aggregator order created"
        );

        let url = order
            .checkout_url
            .ok_or_else(|| GatewayError::InvalidResponse {
                gateway: GatewayKind::Aggregator,
                message: format!("order {} has no checkout_url", order.id),
            })?;

        Ok(PaymentInitiation {
            external_ref: order.id,
            instruction: PaymentInstruction::Redirect { url },
        })
    }

    async fn reconcile(&self, external_ref: &str) -> Result<Reconciliation, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("v1/orders/{external_ref}"))?)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(transport)?;
        let order = Self::read_order(response).await?;

        Ok(Reconciliation {
            external_ref: external_ref.to_string(),
            settlement: settlement_for(&order)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: &str, amount_paid: Option<Decimal>) -> OrderResponse {
        OrderResponse {
            id: "order_1".to_string(),
            status: status.to_string(),
            checkout_url: None,
            amount_paid,
            failure_reason: None,
        }
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = AggregatorConfig::new("https://pay.example/api", "key", "https://r")
            .expect("valid url");
        assert_eq!(
            config.base_url.join("v1/orders").expect("joins").as_str(),
            "https://pay.example/api/v1/orders"
        );
    }

    #[test]
    fn maps_order_statuses_to_settlements() {
        assert_eq!(
            settlement_for(&order("created", None)),
            Ok(GatewaySettlement::Unpaid)
        );
        assert_eq!(
            settlement_for(&order("attempted", None)),
            Ok(GatewaySettlement::Pending)
        );
        assert_eq!(
            settlement_for(&order("paid", Some(Decimal::new(330400, 2)))),
            Ok(GatewaySettlement::Success {
                amount: Decimal::new(330400, 2)
            })
        );
        assert_eq!(
            settlement_for(&order("failed", None)),
            Ok(GatewaySettlement::Failed {
                reason: "order failed".to_string()
            })
        );
    }

    #[test]
    fn paid_orders_must_report_an_amount() {
        assert!(matches!(
            settlement_for(&order("paid", None)),
            Err(GatewayError::InvalidResponse { .. })
        ));
    }
}
