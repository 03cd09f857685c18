//! Card download flows and the credential-status poller that finishes
//! asynchronously issued cards.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::PgPool;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::audit::{self, AuditRecord, AuditSink};
use crate::clients::credential::CardFetch;
use crate::clients::notification::TemplateType;
use crate::clients::{CredentialClient, IdentityClient, NotificationClient};
use crate::db::models::{EventStatus, RequestType};
use crate::db::queries;
use crate::error::{AppError, ServiceError};
use crate::ledger::{close_event, TrackedEvent};
use crate::otp::OtpManager;
use crate::clients::identity::mask_id;
use crate::validation::{validate_individual_id, validate_otp_format, validate_transaction_id};

const POLLER_ACTOR: &str = "system";

/// Outcome of a card download: the document itself, or an acknowledgement
/// that issuance continues asynchronously.
#[derive(Debug, Clone)]
pub enum CardDownload {
    Ready(Vec<u8>),
    Accepted,
}

#[derive(Clone)]
pub struct CardService {
    db: PgPool,
    otp: OtpManager,
    identity: IdentityClient,
    credential: CredentialClient,
    notifier: NotificationClient,
    audit: AuditSink,
}

impl CardService {
    pub fn new(
        db: PgPool,
        otp: OtpManager,
        identity: IdentityClient,
        credential: CredentialClient,
        notifier: NotificationClient,
        audit: AuditSink,
    ) -> Self {
        Self {
            db,
            otp,
            identity,
            credential,
            notifier,
            audit,
        }
    }

    /// OTP-authenticated download of the resident's ID card. When the
    /// credential service answers with an issuance job instead of a document,
    /// the ledger record stays IN_PROGRESS with the job id for the poller.
    pub async fn download_card(
        &self,
        individual_id: &str,
        otp: &str,
        transaction_id: &str,
    ) -> Result<(CardDownload, String), ServiceError> {
        validate_individual_id(individual_id).map_err(AppError::from)?;

        let identity = self
            .identity
            .resolve(individual_id)
            .await
            .map_err(AppError::from)?;

        let mut tracked = TrackedEvent::begin(RequestType::GetMyId, identity.token_id.as_str());
        {
            let record = tracked.record_mut();
            record.ref_id = Some(mask_id(individual_id));
            record.ref_id_type = Some(identity.id_type.clone());
            record.request_trn_id = Some(transaction_id.to_string());
            record.purpose = Some("Download card".to_string());
        }

        let outcome: Result<CardDownload, AppError> = async {
            validate_otp_format(otp)?;
            validate_transaction_id(transaction_id)?;

            let validated = self
                .otp
                .validate_otp(otp, individual_id, transaction_id)
                .await?;
            if !validated {
                return Err(AppError::OtpValidationFailed);
            }

            match self
                .credential
                .fetch_card(individual_id, &identity.id_type)
                .await
                .map_err(AppError::from)?
            {
                CardFetch::Ready(bytes) if bytes.is_empty() => Err(AppError::DownstreamAccess(
                    "credential service returned an empty document".to_string(),
                )),
                CardFetch::Ready(bytes) => Ok(CardDownload::Ready(bytes)),
                CardFetch::Pending { request_id } => {
                    tracked.record_mut().credential_request_id = Some(request_id);
                    Ok(CardDownload::Accepted)
                }
            }
        }
        .await;

        match &outcome {
            Ok(CardDownload::Ready(_)) => {
                tracked.complete(EventStatus::Success, "Card downloaded");
            }
            Ok(CardDownload::Accepted) => {
                tracked.complete(EventStatus::InProgress, "in-progress");
                // Acknowledge the queued request; the poller sends the
                // terminal notification later.
                if let Err(e) = self
                    .notifier
                    .notify_event(
                        &identity.token_id,
                        tracked.event_id(),
                        TemplateType::RequestReceived,
                    )
                    .await
                {
                    warn!(event_id = %tracked.event_id(), error = %e, "event notification dropped");
                }
            }
            Err(_) => {}
        }

        self.audit.record(AuditRecord {
            event_name: if outcome.is_ok() {
                audit::CARD_DOWNLOAD_SUCCESS
            } else {
                audit::CARD_DOWNLOAD_FAILURE
            },
            event_id: Some(tracked.event_id().to_string()),
            actor: mask_id(individual_id),
            description: "Download card".to_string(),
        });

        close_event(&self.db, tracked, outcome).await
    }

    /// Renders a personalized card from resident-supplied HTML (base64) and
    /// the attribute list shown on it.
    pub async fn download_personalized_card(
        &self,
        token_id: &str,
        html_b64: &str,
        attributes: &[String],
    ) -> Result<(Vec<u8>, String), ServiceError> {
        let mut tracked = TrackedEvent::begin(RequestType::DownloadPersonalizedCard, token_id);
        {
            let record = tracked.record_mut();
            record.purpose = Some("Download personalized card".to_string());
            if !attributes.is_empty() {
                record.attribute_list = Some(attributes.join(","));
            }
        }

        let outcome: Result<Vec<u8>, AppError> = async {
            let html = BASE64
                .decode(html_b64)
                .map_err(|_| AppError::Validation("html must be valid base64".to_string()))?;

            let pdf = self
                .credential
                .render_card(&html)
                .await
                .map_err(AppError::from)?;

            if pdf.is_empty() {
                return Err(AppError::DownstreamAccess(
                    "credential service returned an empty document".to_string(),
                ));
            }
            Ok(pdf)
        }
        .await;

        if outcome.is_ok() {
            tracked.complete(EventStatus::Success, "Card downloaded");
        }

        self.audit.record(AuditRecord {
            event_name: if outcome.is_ok() {
                audit::CARD_DOWNLOAD_SUCCESS
            } else {
                audit::CARD_DOWNLOAD_FAILURE
            },
            event_id: Some(tracked.event_id().to_string()),
            actor: token_id.to_string(),
            description: "Download personalized card".to_string(),
        });

        close_event(&self.db, tracked, outcome).await
    }
}

/// Runs the credential-status poller loop. Finishes ledger records whose
/// issuance job completed while the resident was offline. Runs alongside the
/// HTTP server without blocking it.
pub async fn run_status_poller(
    pool: PgPool,
    credential: CredentialClient,
    notifier: NotificationClient,
    interval_secs: u64,
) {
    info!("credential status poller started");

    loop {
        if let Err(e) = process_status_batch(&pool, &credential, &notifier).await {
            error!("status poller batch error: {}", e);
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}

pub async fn process_status_batch(
    pool: &PgPool,
    credential: &CredentialClient,
    notifier: &NotificationClient,
) -> anyhow::Result<()> {
    let pending_statuses = vec![
        EventStatus::New.as_str().to_string(),
        EventStatus::InProgress.as_str().to_string(),
    ];
    let request_types = vec![
        RequestType::GetMyId.as_str().to_string(),
        RequestType::DownloadPersonalizedCard.as_str().to_string(),
    ];

    let pending =
        queries::list_pending_credential_events(pool, &pending_statuses, &request_types).await?;

    if pending.is_empty() {
        return Ok(());
    }

    debug!("polling {} pending credential request(s)", pending.len());

    for event in pending {
        let Some(request_id) = event.credential_request_id.as_deref() else {
            continue;
        };

        let status = match credential.request_status(request_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "credential status check failed, will retry next cycle"
                );
                continue;
            }
        };

        let transition = match status.to_ascii_uppercase().as_str() {
            "ISSUED" | "STORED" | "READY" => Some((
                EventStatus::CardReadyToDownload,
                "Card ready to download",
                TemplateType::Success,
            )),
            "FAILED" => Some((EventStatus::Failed, "failed", TemplateType::Failure)),
            _ => None,
        };

        let Some((next_status, summary, template)) = transition else {
            continue;
        };

        let updated = queries::update_event_status(
            pool,
            &event.event_id,
            next_status.as_str(),
            summary,
            None,
            POLLER_ACTOR,
        )
        .await?;

        if updated == 0 {
            warn!(event_id = %event.event_id, "pending event vanished before status update");
            continue;
        }

        info!(event_id = %event.event_id, status = next_status.as_str(), "credential request finished");

        if let Err(e) = notifier
            .notify_event(&event.token_id, &event.event_id, template)
            .await
        {
            warn!(event_id = %event.event_id, error = %e, "event notification dropped");
        }
    }

    Ok(())
}
