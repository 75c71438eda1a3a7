//! Application services: the use cases behind the HTTP surface.
//!
//! Services depend only on the port traits from `domains`, so every adapter
//! can be swapped or mocked.

pub mod color;
pub mod media;
pub mod moments;
pub mod ranking;
pub mod slug;
pub mod submissions;
pub mod validation;

pub use media::{MediaService, UploadReceipt};
pub use moments::{CategoryInfo, MomentDetail, MomentInput, MomentPatch, MomentQuery, MomentService};
pub use submissions::{
    ApprovalInput, ApprovalOutcome, SubmissionInput, SubmissionQueue, SubmissionReceipt,
    SubmissionService,
};
