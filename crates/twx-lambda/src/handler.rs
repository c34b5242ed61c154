// ai
//! 📬 The S3 notification handler: turns `S3Event` records into object refs and hands
//! them to the shared pipeline.
//!
//! Always answers `Ok(report)`. A failed object is in the report and in the dead letters;
//! returning `Err` would only make the platform redeliver the whole event and redo the
//! objects that went fine.

use std::borrow::Cow;
use std::string::FromUtf8Error;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{Error as LambdaError, LambdaEvent};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use twx::common::ObjectRef;
use twx::pipeline::Pipeline;
use twx::report::{InvocationReport, ObjectOutcome};

/// ⏰ Time kept in reserve for writing dead letters and answering the runtime.
const DEADLINE_MARGIN: Duration = Duration::from_secs(5);

/// 📬 One event, sorted: the objects worth fetching, and the records that never named one.
#[derive(Debug, Default)]
pub(crate) struct Notifications {
    pub(crate) objects: Vec<ObjectRef>,
    pub(crate) unusable: Vec<ObjectOutcome>,
}

/// 🔣 S3 hands keys over form-encoded: `+` is a space, `%3D` is `=`.
pub(crate) fn decode_key(key: &str) -> Result<String, FromUtf8Error> {
    urlencoding::decode(&key.replace('+', " ")).map(Cow::into_owned)
}

/// 🪣 One ref per record with a bucket and a decodable key. Every other record becomes a
/// failed outcome, so it shows up in the report instead of vanishing.
pub(crate) fn read_notifications(event: &S3Event) -> Notifications {
    let mut notifications = Notifications::default();
    for (position, record) in event.records.iter().enumerate() {
        let bucket = record.s3.bucket.name.as_deref();
        let raw_key = record.s3.object.key.as_deref();
        let problem = match (bucket, raw_key) {
            (Some(bucket), Some(raw_key)) => match decode_key(raw_key) {
                Ok(key) => {
                    notifications.objects.push(ObjectRef::new(bucket, key));
                    continue;
                }
                Err(err) => format!("S3 record {position}: key '{raw_key}' does not decode to UTF-8: {err}"),
            },
            _ => format!("S3 record {position} has no bucket name or no object key"),
        };
        warn!("⚠️ {problem}");
        let mut outcome = ObjectOutcome::new(ObjectRef::new(bucket.unwrap_or_default(), raw_key.unwrap_or_default()));
        outcome.fail(problem);
        notifications.unusable.push(outcome);
    }
    notifications
}

/// ⏰ The invocation deadline minus the margin, on the tokio clock. `None` when the
/// runtime did not give us a deadline.
pub(crate) fn retry_deadline(deadline_ms: u64) -> Option<Instant> {
    if deadline_ms == 0 {
        return None;
    }
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    let remaining = deadline.duration_since(SystemTime::now()).unwrap_or_default();
    Some(Instant::now() + remaining.saturating_sub(DEADLINE_MARGIN))
}

#[instrument(skip_all, fields(request_id = %event.context.request_id, records = event.payload.records.len()))]
pub(crate) async fn handle(
    pipeline: &Pipeline,
    event: LambdaEvent<S3Event>,
) -> Result<InvocationReport, LambdaError> {
    let Notifications { objects, unusable } = read_notifications(&event.payload);
    info!("📬 {} objects to process, {} unusable records", objects.len(), unusable.len());
    let mut report = pipeline
        .process_until(&objects, retry_deadline(event.context.deadline))
        .await;
    report.objects.extend(unusable);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_runtime::Context;
    use twx::backends::{
        DeadLetterBackend, InMemoryDeadLetter, InMemorySink, InMemorySource, SinkBackend, SourceBackend,
    };
    use twx::indexer::BulkIndexer;
    use twx::report::ObjectStatus;
    use twx::retry::RetryConfig;
    use twx::transforms::TweetNormalizer;

    const THE_SAMPLE_EVENT: &str = r#"{
      "Records": [
        {
          "eventVersion": "2.1",
          "eventSource": "aws:s3",
          "awsRegion": "us-east-1",
          "eventTime": "2020-05-11T15:52:25.000Z",
          "eventName": "ObjectCreated:Put",
          "userIdentity": { "principalId": "EXAMPLE" },
          "requestParameters": { "sourceIPAddress": "127.0.0.1" },
          "responseElements": {
            "x-amz-request-id": "EXAMPLE123456789",
            "x-amz-id-2": "EXAMPLE123/5678abcdefghijklambdaisawesome/mnopqrstuvwxyzABCDEFGH"
          },
          "s3": {
            "s3SchemaVersion": "1.0",
            "configurationId": "tweets-landed",
            "bucket": {
              "name": "tweets-bucket",
              "ownerIdentity": { "principalId": "EXAMPLE" },
              "arn": "arn:aws:s3:::tweets-bucket"
            },
            "object": {
              "key": "2020/05/11/15/tweets-1",
              "size": 1024,
              "eTag": "0123456789abcdef0123456789abcdef",
              "sequencer": "0A1B2C3D4E5F678901"
            }
          }
        }
      ]
    }"#;

    fn the_sample_event() -> S3Event {
        serde_json::from_str(THE_SAMPLE_EVENT).expect("💀 the AWS sample event should deserialize")
    }

    fn the_sample_event_with(edit: impl FnOnce(&mut serde_json::Value)) -> S3Event {
        let mut the_json: serde_json::Value =
            serde_json::from_str(THE_SAMPLE_EVENT).expect("💀 the AWS sample event is JSON");
        edit(&mut the_json);
        serde_json::from_value(the_json).expect("💀 the edited event should still deserialize")
    }

    #[test]
    fn the_one_where_a_notification_becomes_an_object_ref() {
        let the_notifications = read_notifications(&the_sample_event());
        assert_eq!(
            the_notifications.objects,
            vec![ObjectRef::new("tweets-bucket", "2020/05/11/15/tweets-1")]
        );
        assert!(the_notifications.unusable.is_empty());
    }

    #[test]
    fn the_one_where_a_form_encoded_key_is_decoded_before_fetching() {
        let the_event = the_sample_event_with(|the_json| {
            the_json["Records"][0]["s3"]["object"]["key"] = "year%3D2020/month%3D05/tweets+batch+1%2Bextra".into();
        });
        assert_eq!(
            read_notifications(&the_event).objects,
            vec![ObjectRef::new("tweets-bucket", "year=2020/month=05/tweets batch 1+extra")]
        );
        assert!(decode_key("broken%FF%FE").is_err());
    }

    #[test]
    fn the_one_where_a_record_without_a_key_is_reported_not_forgotten() {
        let the_event = the_sample_event_with(|the_json| {
            let the_keyless = {
                let mut the_record = the_json["Records"][0].clone();
                the_record["s3"]["object"]
                    .as_object_mut()
                    .expect("object")
                    .remove("key");
                the_record
            };
            the_json["Records"]
                .as_array_mut()
                .expect("records")
                .push(the_keyless);
        });
        let the_notifications = read_notifications(&the_event);
        assert_eq!(the_notifications.objects.len(), 1);
        assert_eq!(the_notifications.unusable.len(), 1);
        let the_orphan = &the_notifications.unusable[0];
        assert_eq!(the_orphan.status, ObjectStatus::Failed);
        assert_eq!(the_orphan.object, ObjectRef::new("tweets-bucket", ""));
        assert!(the_orphan.errors[0].contains("record 1"));
    }

    #[test]
    fn the_one_where_the_deadline_keeps_a_margin_in_reserve() {
        assert!(retry_deadline(0).is_none());

        let the_now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("💀 the clock went backwards")
            .as_millis() as u64;
        let the_deadline = retry_deadline(the_now_ms + 60_000).expect("a deadline");
        let the_budget = the_deadline.saturating_duration_since(Instant::now());
        assert!(the_budget <= Duration::from_secs(55));
        assert!(the_budget > Duration::from_secs(50));

        // -- already late: the budget is zero, not negative, not a panic
        let the_late = retry_deadline(the_now_ms.saturating_sub(1_000)).expect("a deadline");
        assert!(the_late <= Instant::now());
    }

    #[tokio::test]
    async fn the_one_where_the_handler_always_answers_ok() {
        let the_source = InMemorySource::new();
        let the_sink = InMemorySink::new();
        let the_body = format!(
            "{},\n",
            serde_json::json!({
                "id_str": "1254",
                "text": "hello @lambda #rust",
                "timestamp_ms": "1589212345678",
                "user": { "id": 7, "name": "Grace" },
                "entities": { "hashtags": [ { "text": "rust" } ] }
            })
        );
        the_source
            .put(ObjectRef::new("tweets-bucket", "2020/05/11/15/tweets-1"), the_body)
            .await;
        let the_pipeline = Pipeline::new(
            SourceBackend::InMemory(the_source),
            TweetNormalizer::new(Box::new(|_: &str| 0.0)),
            BulkIndexer::new(SinkBackend::InMemory(the_sink.clone()), "tweets", 1000, RetryConfig::default()),
            DeadLetterBackend::InMemory(InMemoryDeadLetter::new()),
        );

        let the_report = handle(&the_pipeline, LambdaEvent::new(the_sample_event(), Context::default()))
            .await
            .expect("💀 the handler should never return Err");
        assert_eq!(the_report.objects.len(), 1);
        assert_eq!(the_report.objects[0].status, ObjectStatus::Ok);
        assert_eq!(the_sink.documents().await["1254"]["mentions"][0], "@lambda");

        // -- an empty bucket: the object fails, the handler still answers Ok
        let the_empty = Pipeline::new(
            SourceBackend::InMemory(InMemorySource::new()),
            TweetNormalizer::new(Box::new(|_: &str| 0.0)),
            BulkIndexer::new(SinkBackend::InMemory(InMemorySink::new()), "tweets", 1000, RetryConfig::default()),
            DeadLetterBackend::Disabled,
        );
        let the_report = handle(&the_empty, LambdaEvent::new(the_sample_event(), Context::default()))
            .await
            .expect("💀 still Ok");
        assert_eq!(the_report.objects[0].status, ObjectStatus::Failed);

        // -- a keyless record lands in the report as a failure of its own
        let the_keyless = the_sample_event_with(|the_json| {
            the_json["Records"][0]["s3"]["object"]
                .as_object_mut()
                .expect("object")
                .remove("key");
        });
        let the_report = handle(&the_empty, LambdaEvent::new(the_keyless, Context::default()))
            .await
            .expect("💀 still Ok");
        assert_eq!(the_report.objects.len(), 1);
        assert_eq!(the_report.objects[0].status, ObjectStatus::Failed);
        assert!(the_report.has_failures());
    }
}
