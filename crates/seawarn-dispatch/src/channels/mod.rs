pub mod email;
pub mod sms;
pub mod voice;
pub mod whatsapp;

use crate::DispatchError;
use reqwest::StatusCode;

/// Map an HTTP error status from a provider API to the dispatch error
/// taxonomy: 429 and 5xx are transient, other 4xx mean the recipient
/// address (or request) was permanently rejected.
pub(crate) fn classify_status(provider: &str, status: StatusCode, address: &str) -> DispatchError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DispatchError::TransientProvider(format!("{provider} returned HTTP {status}"))
    } else {
        DispatchError::InvalidAddress(format!("{address} (HTTP {status} from {provider})"))
    }
}

/// Map a reqwest transport error (connect, timeout, TLS) to the dispatch
/// error taxonomy. Transport failures are always transient.
pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> DispatchError {
    DispatchError::TransientProvider(format!("{provider} request failed: {err}"))
}
