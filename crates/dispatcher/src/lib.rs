//! Sequential bulk message dispatch.

pub mod dispatcher;
pub mod job;
pub mod rows;
pub mod template;

pub use dispatcher::{
    BulkDispatcher, DispatchEvent, DispatchReport, DispatchStatus, MessagePreview, StatusCounts,
    Transport,
};
pub use job::{Attachment, AttachmentInfo, DispatchJob};
pub use template::render_template;
