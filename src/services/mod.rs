//! Collaborator clients and the orchestration built on top of them.

pub mod annotation_service;
pub mod auth;
pub mod catalog_service;
pub mod gcs_store;
pub mod local_store;
pub mod object_store;
pub mod vision_client;
pub mod vqa_client;
pub mod vqa_service;
