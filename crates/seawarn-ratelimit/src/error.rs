/// A denied rate-limit check.
///
/// Carries how long the caller should wait before retrying; the HTTP
/// layer maps this onto a 429 with a `Retry-After` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Deny {
    /// Too many requests inside the sliding window.
    #[error("RateLimit: too many requests, retry in {retry_after_secs}s")]
    WindowExceeded { retry_after_secs: i64 },

    /// A failure streak imposed an exponential backoff delay.
    #[error("RateLimit: backing off after failed attempts, retry in {retry_after_secs}s")]
    Backoff { retry_after_secs: i64 },

    /// The key passed the failure threshold and is locked out.
    #[error("RateLimit: locked out, retry in {retry_after_secs}s")]
    Locked { retry_after_secs: i64 },
}

impl Deny {
    pub fn retry_after_secs(&self) -> i64 {
        match self {
            Deny::WindowExceeded { retry_after_secs }
            | Deny::Backoff { retry_after_secs }
            | Deny::Locked { retry_after_secs } => *retry_after_secs,
        }
    }
}
