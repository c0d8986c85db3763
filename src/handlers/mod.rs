pub mod annotate_handlers;
pub mod bucket_handlers;
pub mod event_handlers;
pub mod vqa_handlers;
