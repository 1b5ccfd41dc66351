//! Clients for the services the lead router talks to.
//!
//! Each collaborator sits behind a trait so the pipeline can run against
//! test doubles. The HTTP clients switch to mock mode when their base URL is
//! `mock`.

pub mod billing;
pub mod config;
pub mod document;
pub mod error;
mod http;
pub mod mail;
pub mod webhook;

pub use billing::{BillingProvider, HttpBillingProvider, PaymentStatus};
pub use config::*;
pub use document::{extract_postal_code, DocumentRef, DocumentSource, ExtractedRegion, HttpDocumentSource};
pub use error::IntegrationError;
pub use http::MOCK_URL;
pub use mail::{HttpMailer, Message, NotificationSender};
pub use webhook::{parse_event, sign_payload, verify_signature, BillingEvent, WebhookError, SIGNATURE_HEADER};
