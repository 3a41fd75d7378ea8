//! Service layer: orchestration of the external collaborators.
//!
//! [`detection`] owns the asynchronous task lifecycle and the model call;
//! [`storage`] owns the temporary-credential cache and the upload flow.

pub mod detection;
pub mod storage;
