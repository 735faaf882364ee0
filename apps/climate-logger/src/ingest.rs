use crate::clock::Clock;
use crate::store::{LogHandle, Reading};
use crate::validate::{validate, Field, RejectReason, ValidationResult};
use thiserror::Error;

/// Raw query values as received from the device.
#[derive(Debug, Clone, Default)]
pub struct RawReadingInput {
    pub temperature: Option<String>,
    pub humidity: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{reason} ({})", .field.as_str())]
    Rejected { reason: RejectReason, field: Field },
    #[error("storage failure: {0:#}")]
    StorageFailure(anyhow::Error),
}

/// Validates one request and appends at most one reading.
///
/// The log is initialized on every call; rejected input never reaches the
/// append path.
pub async fn ingest(
    log: &LogHandle,
    clock: &dyn Clock,
    raw: &RawReadingInput,
) -> Result<Reading, IngestError> {
    log.ensure_initialized().await.map_err(|err| {
        tracing::error!(error = %format!("{err:#}"), "reading log initialization failed");
        IngestError::StorageFailure(err)
    })?;

    let (temperature, humidity) =
        match validate(raw.temperature.as_deref(), raw.humidity.as_deref()) {
            ValidationResult::Valid {
                temperature,
                humidity,
            } => (temperature, humidity),
            ValidationResult::Invalid { reason, field } => {
                tracing::warn!(
                    reason = ?reason,
                    field = field.as_str(),
                    "rejected reading"
                );
                return Err(IngestError::Rejected { reason, field });
            }
        };

    let reading = Reading {
        timestamp: clock.now(),
        temperature,
        humidity,
    };

    let stored = log.append(reading).await.map_err(|err| {
        tracing::error!(error = %format!("{err:#}"), "failed to append reading");
        IngestError::StorageFailure(err)
    })?;

    tracing::debug!(
        timestamp = %stored.timestamp,
        temperature = stored.temperature,
        humidity = stored.humidity,
        "reading logged"
    );
    Ok(stored)
}
