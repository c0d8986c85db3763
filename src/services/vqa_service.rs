//! Visual question answering over stored images.
//!
//! Images are processed one after another. A failing image is recorded in
//! the batch report and the remaining images are still processed.

use crate::{
    config::ConfigError,
    models::{
        event::{EventOutcome, StorageEvent},
        naming::answer_filename_for_image,
        vqa::{VqaBatchReport, VqaOutcome, VqaRequest, VqaResult, gs_uri},
    },
    services::{
        annotation_service::read_image,
        object_store::{FILE_LIST_SIZE_MAX, StorageError},
        vqa_client::VqaError,
    },
    state::AppState,
};
use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum VqaServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no image at {0}")]
    NoImage(String),
    #[error("no images in bucket `{0}`")]
    EmptyBucket(String),
    #[error(transparent)]
    Inference(#[from] VqaError),
    #[error("could not encode answers: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Answer `question` for one image and store the result; returns the output key.
pub async fn answer_image(
    state: &AppState,
    bucket: &str,
    name: &str,
    question: &str,
    number_of_results: u32,
) -> Result<String, VqaServiceError> {
    let output_bucket = state.config.output_bucket()?;
    let file_uri = gs_uri(bucket, name);

    let image = read_image(state.store.as_ref(), bucket, name)
        .await?
        .ok_or_else(|| VqaServiceError::NoImage(file_uri.clone()))?;
    let answers = state.vqa.ask(&image, question, number_of_results).await?;
    info!("{}: {} answers", file_uri, answers.len());

    let result = VqaResult::new(file_uri, question, number_of_results, &answers);
    let output_name = answer_filename_for_image(name);
    state
        .store
        .write(
            output_bucket,
            &output_name,
            "text/plain",
            Bytes::from(serde_json::to_vec(&result)?),
        )
        .await?;
    Ok(output_name)
}

/// Run a batch request, collecting one outcome per image.
pub async fn run_batch(
    state: &AppState,
    request: &VqaRequest,
) -> Result<VqaBatchReport, VqaServiceError> {
    // Checked up front so a misconfigured batch fails as a whole.
    state.config.output_bucket()?;

    let names = match &request.name {
        Some(name) => vec![name.clone()],
        None => {
            let names = state.store.list(&request.bucket, FILE_LIST_SIZE_MAX).await?;
            if names.is_empty() {
                return Err(VqaServiceError::EmptyBucket(request.bucket.clone()));
            }
            names
        }
    };

    let question = request.question();
    let number_of_results = request.number_of_results();
    info!(
        "Answering \"{}\" for {} images in {}",
        question,
        names.len(),
        request.bucket
    );

    let mut report = VqaBatchReport::default();
    for name in names {
        let file_uri = gs_uri(&request.bucket, &name);
        let outcome =
            match answer_image(state, &request.bucket, &name, question, number_of_results).await {
                Ok(output) => VqaOutcome::succeeded(file_uri, output),
                Err(err) => {
                    error!("{}: {}", file_uri, err);
                    VqaOutcome::failed(file_uri, err)
                }
            };
        report.record(outcome);
    }
    Ok(report)
}

/// Event entrypoint: answer the default question for a newly stored image.
pub async fn answer_stored_image(state: &AppState, event: &StorageEvent) -> EventOutcome {
    info!(
        "Received event {} id={} from {} for file {}",
        event.event_type, event.id, event.data.bucket, event.data.name
    );
    let request = VqaRequest {
        bucket: event.data.bucket.clone(),
        name: Some(event.data.name.clone()),
        ..VqaRequest::default()
    };

    match answer_image(
        state,
        &request.bucket,
        &event.data.name,
        request.question(),
        request.number_of_results(),
    )
    .await
    {
        Ok(output) => {
            info!("Event {} is processed, wrote {}", event.id, output);
            EventOutcome::Completed
        }
        Err(err @ (VqaServiceError::Config(_) | VqaServiceError::NoImage(_))) => {
            error!("{}: {}", event.id, err);
            EventOutcome::Aborted(err.to_string())
        }
        Err(err) => {
            error!("{}: {}", event.id, err);
            EventOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_config,
        models::{
            event::StorageObjectData,
            vqa::{DEFAULT_NUMBER_OF_RESULTS, DEFAULT_QUESTION},
        },
        test_support::{ANSWERS, FakeVision, FakeVqa, Fixture, IMAGES, VisionReply},
    };

    fn no_vision() -> std::sync::Arc<FakeVision> {
        FakeVision::replying(VisionReply::Empty)
    }

    #[tokio::test]
    async fn single_image_writes_answer_document() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "pets/cat.jpg", b"jpeg").await;
        let vqa = FakeVqa::answering(&["cat", "kitten"]);
        let state = fixture.state(no_vision(), vqa.clone());
        let request = VqaRequest {
            bucket: IMAGES.into(),
            name: Some("pets/cat.jpg".into()),
            question: Some("What animal?".into()),
            number_of_results: Some(2),
        };

        let report = run_batch(&state, &request).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.outcomes[0].output.as_deref(), Some("cat.txt"));
        let saved = fixture.get(ANSWERS, "cat.txt").await.unwrap();
        let result: VqaResult = serde_json::from_slice(&saved).unwrap();
        assert_eq!(
            result,
            VqaResult {
                file_uri: "gs://images/pets/cat.jpg".into(),
                prompt: "What animal?".into(),
                number_of_results: 2,
                responses: "cat,kitten".into(),
            }
        );
        assert_eq!(vqa.questions.lock().unwrap()[0], ("What animal?".to_string(), 2));
    }

    #[tokio::test]
    async fn bucket_batch_continues_past_failures() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "a.jpg", b"jpeg").await;
        fixture.put(IMAGES, "b.jpg", b"bad").await;
        fixture.put(IMAGES, "c.jpg", b"jpeg").await;
        let state = fixture.state(no_vision(), FakeVqa::answering(&["x"]));
        let request = VqaRequest {
            bucket: IMAGES.into(),
            ..VqaRequest::default()
        };

        let report = run_batch(&state, &request).await.unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        let failed = &report.outcomes[1];
        assert_eq!(failed.file_uri, "gs://images/b.jpg");
        assert!(failed.output.is_none());
        assert!(fixture.get(ANSWERS, "a.txt").await.is_some());
        assert!(fixture.get(ANSWERS, "b.txt").await.is_none());
        assert!(fixture.get(ANSWERS, "c.txt").await.is_some());
    }

    #[tokio::test]
    async fn empty_bucket_and_missing_config_fail_the_batch() {
        let fixture = Fixture::new().await;
        let state = fixture.state(no_vision(), FakeVqa::answering(&["x"]));
        let request = VqaRequest {
            bucket: IMAGES.into(),
            ..VqaRequest::default()
        };
        assert!(matches!(
            run_batch(&state, &request).await,
            Err(VqaServiceError::EmptyBucket(_))
        ));

        let mut config = test_config();
        config.output_bucket = None;
        let state = fixture.state_with(config, no_vision(), FakeVqa::answering(&["x"]));
        assert!(matches!(
            run_batch(&state, &request).await,
            Err(VqaServiceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn event_uses_default_question() {
        let fixture = Fixture::new().await;
        fixture.put(IMAGES, "dog.png", b"png").await;
        let vqa = FakeVqa::answering(&["dog"]);
        let state = fixture.state(no_vision(), vqa.clone());
        let event = StorageEvent {
            id: "e1".into(),
            event_type: "google.cloud.storage.object.v1.finalized".into(),
            source: None,
            data: StorageObjectData {
                bucket: IMAGES.into(),
                name: "dog.png".into(),
                content_type: None,
                size: None,
                time_created: None,
                updated: None,
            },
        };

        assert_eq!(answer_stored_image(&state, &event).await, EventOutcome::Completed);
        assert_eq!(
            vqa.questions.lock().unwrap()[0],
            (DEFAULT_QUESTION.to_string(), DEFAULT_NUMBER_OF_RESULTS)
        );
        assert!(fixture.get(ANSWERS, "dog.txt").await.is_some());

        let missing = StorageEvent {
            data: StorageObjectData {
                name: "gone.png".into(),
                ..event.data.clone()
            },
            ..event.clone()
        };
        assert!(matches!(
            answer_stored_image(&state, &missing).await,
            EventOutcome::Aborted(_)
        ));
    }
}
