//! Proxy OTP flows: send an OTP to a contact address, and validate one while
//! recording the attempt in the event ledger.

use sqlx::PgPool;
use tracing::{error, info};

use crate::audit::{self, AuditRecord, AuditSink};
use crate::clients::IdentityClient;
use crate::clients::identity::mask_id;
use crate::db::models::{EventStatus, RequestType};
use crate::error::{AppError, ServiceError};
use crate::ledger::{close_event, TrackedEvent};
use crate::otp::OtpManager;
use crate::validation::{
    self, OtpChannel, validate_otp_format, validate_transaction_id, validate_user_id,
};

#[derive(Debug, Clone)]
pub struct SendOtpOutcome {
    pub delivered: bool,
    pub channel: OtpChannel,
}

#[derive(Clone)]
pub struct OtpFlowService {
    db: PgPool,
    otp: OtpManager,
    identity: IdentityClient,
    audit: AuditSink,
    mandatory_language: String,
}

impl OtpFlowService {
    pub fn new(
        db: PgPool,
        otp: OtpManager,
        identity: IdentityClient,
        audit: AuditSink,
        mandatory_language: String,
    ) -> Self {
        Self {
            db,
            otp,
            identity,
            audit,
            mandatory_language,
        }
    }

    /// Issues an OTP over the channel derived from the user id. The send path
    /// writes audit events but no ledger record.
    pub async fn send_otp(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<SendOtpOutcome, ServiceError> {
        let outcome: Result<SendOtpOutcome, AppError> = async {
            let channel = validate_user_id(user_id)?;
            validate_transaction_id(transaction_id)?;

            let delivered = self
                .otp
                .send_otp(user_id, transaction_id, channel, &self.mandatory_language)
                .await?;

            Ok(SendOtpOutcome { delivered, channel })
        }
        .await;

        match &outcome {
            Ok(sent) => {
                info!(channel = sent.channel.as_str(), "OTP sent");
                self.audit.record(AuditRecord {
                    event_name: audit::SEND_OTP_SUCCESS,
                    event_id: None,
                    actor: user_id.to_string(),
                    description: "Send OTP".to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, "OTP send failed");
                self.audit.record(AuditRecord {
                    event_name: audit::SEND_OTP_FAILURE,
                    event_id: None,
                    actor: user_id.to_string(),
                    description: "Send OTP".to_string(),
                });
            }
        }

        outcome.map_err(ServiceError::from)
    }

    /// Validates an OTP and records the attempt as an UPDATE_MY_UIN ledger
    /// event. Every exit path leaves the record terminal; the event id is
    /// returned for client-side correlation.
    pub async fn validate_otp(
        &self,
        individual_id: &str,
        user_id: &str,
        otp: &str,
        transaction_id: &str,
    ) -> Result<String, ServiceError> {
        validation::validate_individual_id(individual_id).map_err(AppError::from)?;

        // Resolving the identity precedes the ledger record; failures here
        // propagate without an event id.
        let identity = self
            .identity
            .resolve(individual_id)
            .await
            .map_err(AppError::from)?;

        let mut tracked = TrackedEvent::begin(RequestType::UpdateMyUin, identity.token_id.as_str());
        {
            let record = tracked.record_mut();
            record.ref_id = Some(mask_id(individual_id));
            record.ref_id_type = Some(identity.id_type.clone());
            record.request_trn_id = Some(transaction_id.to_string());
            record.status_comment = match validate_user_id(user_id) {
                Ok(OtpChannel::Phone) => Some(format!("Update phone as {}", user_id)),
                Ok(OtpChannel::Email) => Some(format!("Update email as {}", user_id)),
                Err(_) => None,
            };
        }

        let outcome: Result<(), AppError> = async {
            validate_user_id(user_id)?;
            validate_transaction_id(transaction_id)?;
            validate_otp_format(otp)?;

            let validated = self.otp.validate_otp(otp, user_id, transaction_id).await?;
            if !validated {
                return Err(AppError::OtpValidationFailed);
            }
            Ok(())
        }
        .await;

        if outcome.is_ok() {
            tracked.complete(EventStatus::Success, "OTP validated successfully");
        }

        self.audit.record(AuditRecord {
            event_name: if outcome.is_ok() {
                audit::VALIDATE_OTP_SUCCESS
            } else {
                audit::VALIDATE_OTP_FAILURE
            },
            event_id: Some(tracked.event_id().to_string()),
            actor: user_id.to_string(),
            description: "Validate OTP".to_string(),
        });

        let ((), event_id) = close_event(&self.db, tracked, outcome).await?;
        Ok(event_id)
    }
}
