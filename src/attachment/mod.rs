//! Attachment text extraction: eligibility of attached files and dispatch to the helper.

pub mod dispatch;
pub mod eligibility;

pub use dispatch::{DispatchMemo, ExtractionClient, ExtractionRequest, HttpExtractionClient, NoopExtractionClient};
pub use eligibility::{AttachmentDescriptor, Eligibility, SaveContext, evaluate};
