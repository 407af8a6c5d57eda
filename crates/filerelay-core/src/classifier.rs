use crate::client::{SendError, SendResult};
use crate::types::DeliveryOutcome;

/// HTTP statuses that mean the downstream took the payload.
pub const ACCEPTED_STATUSES: [u16; 2] = [200, 201];

/// Map one send attempt onto a [`DeliveryOutcome`].
///
/// Precedence:
/// 1. transport failure → `Undelivered`
/// 2. 200/201 → `DeliveredSuccess` or `DeliveredError` from the embedded
///    processing result
/// 3. any other status → `Undelivered`
/// 4. any other failure → `UnexpectedFailure`
///
/// A 200/201 without a processing result is `DeliveredError`: the payload
/// arrived but the downstream never confirmed it was processed.
pub fn classify(attempt: &SendResult) -> DeliveryOutcome {
    match attempt {
        Err(SendError::Transport(reason)) => DeliveryOutcome::Undelivered {
            http_status: None,
            reason: reason.clone(),
        },
        Ok(resp) if ACCEPTED_STATUSES.contains(&resp.http_status_code) => {
            if resp.processing_success == Some(true) {
                DeliveryOutcome::DeliveredSuccess {
                    http_status: resp.http_status_code,
                    id: resp.id.clone(),
                }
            } else {
                DeliveryOutcome::DeliveredError {
                    http_status: resp.http_status_code,
                    id: resp.id.clone(),
                }
            }
        }
        Ok(resp) => DeliveryOutcome::Undelivered {
            http_status: Some(resp.http_status_code),
            reason: format!("downstream returned HTTP {}", resp.http_status_code),
        },
        Err(SendError::Unexpected(reason)) => DeliveryOutcome::UnexpectedFailure {
            reason: reason.clone(),
        },
    }
}

/// A file that could not be read never reaches the network.
pub fn classify_read_failure(err: &std::io::Error) -> DeliveryOutcome {
    let reason = match err.kind() {
        std::io::ErrorKind::InvalidData => format!("file is not valid UTF-8: {err}"),
        std::io::ErrorKind::PermissionDenied => format!("permission denied: {err}"),
        std::io::ErrorKind::NotFound => format!("file not found: {err}"),
        _ => err.to_string(),
    };
    DeliveryOutcome::LocalReadFailure { reason }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DeliveryResponse;
    use crate::types::OutcomeKind;

    fn resp(status: u16, success: Option<bool>) -> SendResult {
        Ok(DeliveryResponse {
            http_status_code: status,
            id: Some("m-1".to_string()),
            processing_success: success,
        })
    }

    #[test]
    fn created_and_processed_is_success() {
        let outcome = classify(&resp(201, Some(true)));
        assert_eq!(
            outcome,
            DeliveryOutcome::DeliveredSuccess {
                http_status: 201,
                id: Some("m-1".to_string())
            }
        );
    }

    #[test]
    fn ok_with_processing_error_is_delivered_error() {
        assert_eq!(
            classify(&resp(200, Some(false))).kind(),
            OutcomeKind::DeliveredError
        );
    }

    #[test]
    fn ok_without_processing_result_is_delivered_error() {
        assert_eq!(classify(&resp(200, None)).kind(), OutcomeKind::DeliveredError);
    }

    #[test]
    fn server_error_is_undelivered_with_status() {
        let outcome = classify(&Ok(DeliveryResponse::status(500)));
        assert_eq!(outcome.kind(), OutcomeKind::Undelivered);
        assert_eq!(outcome.http_status(), Some(500));
    }

    #[test]
    fn other_statuses_are_undelivered_even_with_success_flag() {
        for status in [202, 204, 301, 400, 401, 404, 429, 503] {
            assert_eq!(
                classify(&resp(status, Some(true))).kind(),
                OutcomeKind::Undelivered,
                "status {status}"
            );
        }
    }

    #[test]
    fn transport_error_is_undelivered() {
        let outcome = classify(&Err(SendError::Transport("connection refused".into())));
        assert_eq!(outcome.kind(), OutcomeKind::Undelivered);
        assert_eq!(outcome.http_status(), None);
    }

    #[test]
    fn unrelated_error_is_unexpected() {
        let outcome = classify(&Err(SendError::Unexpected("invalid JSON".into())));
        assert_eq!(outcome.kind(), OutcomeKind::UnexpectedFailure);
        assert!(!outcome.is_terminal());
    }

    #[test]
    fn read_failure_reason_names_the_cause() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        match classify_read_failure(&err) {
            DeliveryOutcome::LocalReadFailure { reason } => {
                assert!(reason.contains("permission denied"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
