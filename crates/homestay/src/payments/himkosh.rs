use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::gateway::{
    GatewayError, GatewaySettlement, PaymentGateway, PaymentInitiation, PaymentInstruction,
    PaymentRequest, Reconciliation,
};
use super::GatewayKind;

/// Treasury portal credentials and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HimKoshConfig {
    pub portal_url: String,
    pub verify_url: String,
    pub merchant_code: String,
    pub department_id: String,
    pub service_code: String,
    pub return_url: String,
    pub checksum_key: String,
}

/// Treasury adapter: payments start with a signed form post and settle through the
/// verification endpoint.
pub struct HimKoshGateway {
    config: HimKoshConfig,
    client: reqwest::Client,
}

impl HimKoshGateway {
    pub fn new(config: HimKoshConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Transport {
                gateway: GatewayKind::Himkosh,
                message: err.to_string(),
            })?;
        Ok(Self { config, client })
    }

    fn checksum(&self, fields: &BTreeMap<String, String>) -> String {
        let mut hasher = Sha256::new();
        for value in fields.values() {
            hasher.update(value.as_bytes());
            hasher.update(b"|");
        }
        hasher.update(self.config.checksum_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub(crate) fn form_fields(
        &self,
        request: &PaymentRequest,
        external_ref: &str,
    ) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("AppRefNo".to_string(), external_ref.to_string());
        fields.insert(
            "DeptID".to_string(),
            self.config.department_id.to_string(),
        );
        fields.insert(
            "DeptRefNo".to_string(),
            request.application_number.to_string(),
        );
        fields.insert(
            "MerchantCode".to_string(),
            self.config.merchant_code.to_string(),
        );
        fields.insert("ReturnURL".to_string(), self.config.return_url.to_string());
        fields.insert(
            "ServiceCode".to_string(),
            self.config.service_code.to_string(),
        );
        fields.insert("TenderBy".to_string(), request.payer.to_string());
        fields.insert("TotalAmount".to_string(), request.amount.to_string());
        let checksum = self.checksum(&fields);
        fields.insert("checkSum".to_string(), checksum);
        fields
    }
}

#[async_trait]
impl PaymentGateway for HimKoshGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Himkosh
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        let external_ref = format!("HK{}", Uuid::new_v4().simple()).to_uppercase();
        let fields = self.form_fields(request, &external_ref);
        debug!(
            %external_ref,
            application = %request.application_number,
            "prepared treasury challan"
        );

        Ok(PaymentInitiation {
            external_ref,
            instruction: PaymentInstruction::FormPost {
                action: self.config.portal_url.clone(),
                fields,
            },
        })
    }

    async fn reconcile(&self, external_ref: &str) -> Result<Reconciliation, GatewayError> {
        let response = self
            .client
            .get(&self.config.verify_url)
            .query(&[
                ("AppRefNo", external_ref),
                ("MerchantCode", self.config.merchant_code.as_str()),
            ])
            .send()
            .await
            .map_err(|err| GatewayError::Transport {
                gateway: GatewayKind::Himkosh,
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Transport {
                gateway: GatewayKind::Himkosh,
                message: format!("verification endpoint answered {status}"),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                gateway: GatewayKind::Himkosh,
                message: format!("verification endpoint answered {status}"),
            });
        }

        let body = response.text().await.map_err(|err| GatewayError::Transport {
            gateway: GatewayKind::Himkosh,
            message: err.to_string(),
        })?;
        let settlement =
            parse_verification(&body).map_err(|message| GatewayError::InvalidResponse {
                gateway: GatewayKind::Himkosh,
                message,
            })?;

        Ok(Reconciliation {
            external_ref: external_ref.to_string(),
            settlement,
        })
    }
}

/// Parse the pipe-delimited `Key=Value|Key=Value` verification reply.
pub(crate) fn parse_verification(body: &str) -> Result<GatewaySettlement, String> {
    let pairs: BTreeMap<String, String> = body
        .trim()
        .split('|')
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let status = pairs
        .get("status")
        .ok_or_else(|| "missing Status field".to_string())?;

    match status.to_ascii_uppercase().as_str() {
        "SUCCESS" | "PAID" => {
            let raw = pairs
                .get("totalamount")
                .or_else(|| pairs.get("amount"))
                .ok_or_else(|| "successful reply without TotalAmount".to_string())?;
            let amount =
                Decimal::from_str(raw).map_err(|err| format!("bad amount '{raw}': {err}"))?;
            Ok(GatewaySettlement::Success { amount })
        }
        "PENDING" | "INPROCESS" => Ok(GatewaySettlement::Pending),
        "NOTFOUND" | "NOT FOUND" | "INITIATED" => Ok(GatewaySettlement::Unpaid),
        "FAILED" | "FAILURE" | "CANCELLED" => Ok(GatewaySettlement::Failed {
            reason: pairs
                .get("reason")
                .cloned()
                .unwrap_or_else(|| format!("treasury reported {status}")),
        }),
        other => Err(format!("unrecognised treasury status '{other}'")),
    }
}
