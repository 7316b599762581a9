//! Provider-specific webhook normalizers.
//!
//! Each normalizer owns the quirks of one callback format: the SMS/voice
//! gateway posts form-encoded single events, the WhatsApp API and the
//! mail provider post JSON batches.

pub mod email;
pub mod sms_gateway;
pub mod whatsapp;

pub use email::EmailNormalizer;
pub use sms_gateway::SmsGatewayNormalizer;
pub use whatsapp::WhatsappNormalizer;
