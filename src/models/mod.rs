//! Data types shared by the annotation, browse, and VQA entrypoints.
//!
//! Everything here is request-scoped; durable state lives in the buckets.

pub mod catalog;
pub mod event;
pub mod feature;
pub mod naming;
pub mod vqa;
