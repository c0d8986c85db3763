//! Image annotation orchestration shared by the HTTP and event entrypoints.

use crate::{
    config::{FEATURES_ENV, WritePolicy},
    models::{
        event::{EventOutcome, StorageEvent},
        feature::{Feature, build_features_list},
        naming::json_filename_for_image,
    },
    services::{
        object_store::{ObjectStore, StorageResult},
        vision_client::VisionImage,
    },
    state::AppState,
};
use bytes::Bytes;
use tracing::{debug, error, info, warn};

/// Features for one invocation: a non-empty request list replaces the
/// configured default entirely.
pub fn resolve_features(configured: Option<&str>, requested: Option<&str>) -> Vec<Feature> {
    match requested.filter(|r| !r.trim().is_empty()) {
        Some(requested) => {
            info!("Request features: {}", requested);
            build_features_list(requested)
        }
        None => configured.map(build_features_list).unwrap_or_default(),
    }
}

/// Read an image into memory. A missing or empty object is `None`.
pub async fn read_image(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> StorageResult<Option<Bytes>> {
    info!("Reading image {}/{}", bucket, key);
    match store.read(bucket, key).await {
        Ok(content) if content.is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Annotate an image that just landed in a bucket and store `<key>.json`.
pub async fn annotate_stored_image(state: &AppState, event: &StorageEvent) -> EventOutcome {
    let event_id = &event.id;
    let src_bucket = &event.data.bucket;
    let image_name = &event.data.name;
    info!(
        "Received event {} id={} from {} for file {}",
        event.event_type, event_id, src_bucket, image_name
    );
    debug!(
        "{}: source={:?} contentType={:?} size={:?} created={:?} updated={:?}",
        event_id,
        event.source,
        event.data.content_type,
        event.data.size,
        event.data.time_created,
        event.data.updated
    );

    let features = match state.config.features.as_deref() {
        Some(configured) => {
            info!("{}: Env. features: {}", event_id, configured);
            build_features_list(configured)
        }
        None => {
            warn!(
                "Annotation features aren't defined in the environment variable {}",
                FEATURES_ENV
            );
            Vec::new()
        }
    };
    info!("{}: Annotating for features: {:?}", event_id, features);

    let annotations_bucket = match state.config.annotations_bucket() {
        Ok(bucket) => bucket,
        Err(err) => {
            error!("{}: {}", event_id, err);
            return EventOutcome::Aborted(err.to_string());
        }
    };
    let annotation_name = json_filename_for_image(image_name);

    let content = match read_image(state.store.as_ref(), src_bucket, image_name).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            error!("{}: Image {} could not be read.", event_id, image_name);
            return EventOutcome::Aborted(format!("image {} could not be read", image_name));
        }
        Err(err) => {
            error!("{}: Reading {} failed: {}", event_id, image_name, err);
            return EventOutcome::Failed(err.to_string());
        }
    };
    info!("{}: Loaded {}, executing annotations.", event_id, image_name);

    let result = match state
        .vision
        .annotate(&VisionImage::Content(content), &features)
        .await
    {
        Ok(Some(result)) => result,
        Ok(None) => {
            warn!("{}: Annotation result for {} is empty.", event_id, image_name);
            return EventOutcome::Completed;
        }
        Err(err) => {
            error!("{}: Annotating {} failed: {}", event_id, image_name, err);
            return EventOutcome::Failed(err.to_string());
        }
    };
    info!("{}: Annotated image {}", event_id, image_name);

    info!(
        "{}: Saving JSON: {}/{}",
        event_id, annotations_bucket, annotation_name
    );
    if let Err(err) = state
        .store
        .write(
            annotations_bucket,
            &annotation_name,
            "application/json",
            Bytes::from(result),
        )
        .await
    {
        match state.config.write_policy {
            WritePolicy::BestEffort => {
                warn!("{}: Saving {} failed: {}", event_id, annotation_name, err);
            }
            WritePolicy::Fail => {
                error!("{}: Saving {} failed: {}", event_id, annotation_name, err);
                return EventOutcome::Failed(err.to_string());
            }
        }
    }

    info!("Event {} is processed", event_id);
    EventOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, Args, test_config},
        models::{event::StorageObjectData, feature::FeatureType},
        test_support::{ANNOTATIONS, FakeVision, FakeVqa, Fixture, IMAGES, VisionReply},
    };

    fn event(name: &str) -> StorageEvent {
        StorageEvent {
            id: "evt-1".into(),
            event_type: "google.cloud.storage.object.v1.finalized".into(),
            source: None,
            data: StorageObjectData {
                bucket: IMAGES.into(),
                name: name.into(),
                content_type: None,
                size: None,
                time_created: None,
                updated: None,
            },
        }
    }

    #[test]
    fn request_features_replace_configured_ones() {
        let features = resolve_features(Some("LABEL_DETECTION"), Some("face_detection"));
        assert_eq!(features, vec![Feature::from(FeatureType::FaceDetection)]);

        let features = resolve_features(Some("LABEL_DETECTION"), Some("  "));
        assert_eq!(features, vec![Feature::from(FeatureType::LabelDetection)]);

        assert!(resolve_features(None, None).is_empty());
    }

    #[tokio::test]
    async fn empty_and_missing_images_read_as_none() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "empty.jpg", b"").await;

        let store = fixture.store.as_ref();
        assert!(read_image(store, IMAGES, "empty.jpg").await.unwrap().is_none());
        assert!(read_image(store, IMAGES, "missing.jpg").await.unwrap().is_none());
        assert!(read_image(store, "nobucket", "x.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_annotation_next_to_image_name() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let vision = FakeVision::replying(VisionReply::Json(r#"{"labelAnnotations":[]}"#.into()));
        let mut config = test_config();
        config.features = Some("LABEL_DETECTION,TEXT_DETECTION".into());
        let state = fixture.state_with(config, vision.clone(), FakeVqa::answering(&[]));

        let outcome = annotate_stored_image(&state, &event("cat.jpg")).await;

        assert_eq!(outcome, EventOutcome::Completed);
        let saved = fixture.get(ANNOTATIONS, "cat.jpg.json").await.unwrap();
        assert_eq!(&saved[..], br#"{"labelAnnotations":[]}"#);
        let calls = vision.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, VisionImage::Content(Bytes::from_static(b"jpeg")));
        assert_eq!(calls[0].1.len(), 2);
    }

    #[tokio::test]
    async fn missing_features_still_annotate() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let vision = FakeVision::replying(VisionReply::Json("{}".into()));
        let state = fixture.state(vision.clone(), FakeVqa::answering(&[]));

        let outcome = annotate_stored_image(&state, &event("cat.jpg")).await;

        assert_eq!(outcome, EventOutcome::Completed);
        assert!(vision.calls()[0].1.is_empty());
    }

    #[tokio::test]
    async fn missing_destination_bucket_aborts_before_reading() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let vision = FakeVision::replying(VisionReply::Json("{}".into()));
        let config = AppConfig::from_lookup(Args::default(), |_| None).unwrap();
        let state = fixture.state_with(config, vision.clone(), FakeVqa::answering(&[]));

        let outcome = annotate_stored_image(&state, &event("cat.jpg")).await;

        assert!(matches!(outcome, EventOutcome::Aborted(_)));
        assert!(vision.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_image_is_terminal() {
        let fixture = Fixture::new().await;
        let vision = FakeVision::replying(VisionReply::Json("{}".into()));
        let state = fixture.state(vision.clone(), FakeVqa::answering(&[]));

        let outcome = annotate_stored_image(&state, &event("gone.jpg")).await;

        assert!(matches!(outcome, EventOutcome::Aborted(_)));
        assert!(vision.calls().is_empty());
        assert!(fixture.get(ANNOTATIONS, "gone.jpg.json").await.is_none());
    }

    #[tokio::test]
    async fn inference_failure_asks_for_redelivery() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let vision = FakeVision::replying(VisionReply::ApiError(503, "unavailable".into()));
        let state = fixture.state(vision, FakeVqa::answering(&[]));

        let outcome = annotate_stored_image(&state, &event("cat.jpg")).await;

        assert!(matches!(outcome, EventOutcome::Failed(_)));
        assert!(fixture.get(ANNOTATIONS, "cat.jpg.json").await.is_none());
    }

    #[tokio::test]
    async fn write_failure_follows_policy() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let vision = FakeVision::replying(VisionReply::Json("{}".into()));

        // The destination bucket does not exist, so the write fails.
        let mut config = test_config();
        config.annotations_bucket = Some("missing-bucket".into());
        let state = fixture.state_with(config.clone(), vision.clone(), FakeVqa::answering(&[]));
        assert_eq!(
            annotate_stored_image(&state, &event("cat.jpg")).await,
            EventOutcome::Completed
        );

        config.write_policy = WritePolicy::Fail;
        let state = fixture.state_with(config, vision, FakeVqa::answering(&[]));
        assert!(matches!(
            annotate_stored_image(&state, &event("cat.jpg")).await,
            EventOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn redelivery_overwrites_same_result() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "cat.jpg", b"jpeg").await;
        let state = fixture.state(
            FakeVision::replying(VisionReply::Json("{}".into())),
            FakeVqa::answering(&[]),
        );

        annotate_stored_image(&state, &event("cat.jpg")).await;
        annotate_stored_image(&state, &event("cat.jpg")).await;

        assert_eq!(&fixture.get(ANNOTATIONS, "cat.jpg.json").await.unwrap()[..], b"{}");
    }
}
