//! End-to-end tests against the `QueueService` facade.

use jobforge_model::{JobOptions, JobStatus, QueueConfig, StopOptions};
use jobforge_queue::JobContext;
use jobforge_service::QueueService;
use std::sync::Arc;
use std::time::Duration;

async fn wait_terminal(
    service: &QueueService,
    id: jobforge_model::JobId,
) -> jobforge_model::Job {
    for _ in 0..200 {
        if let Some(job) = service.get_job(id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job did not terminate in time");
}

#[tokio::test]
async fn enqueue_then_get_job_round_trips() {
    let service = QueueService::in_memory();
    service.create_queue("q", QueueConfig::new()).unwrap();
    service
        .register_handler(
            "q",
            "echo",
            Arc::new(|ctx: JobContext| async move {
                    Ok::<_, jobforge_model::JobError>(ctx.data().clone())
                }),
        )
        .unwrap();
    service.start_all().await.unwrap();

    let payload = serde_json::json!({"hello": "world"});
    let id = service
        .add_job("q", "echo", payload.clone(), JobOptions::default())
        .await
        .unwrap();

    let job = wait_terminal(&service, id).await;
    assert_eq!(job.id, id);
    assert_eq!(job.data, payload);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(payload));

    service.stop_all(StopOptions::default()).await.unwrap();
}

#[tokio::test]
async fn cancel_job_is_idempotent_through_the_facade() {
    let service = QueueService::in_memory();
    service.create_queue("q", QueueConfig::new()).unwrap();
    service
        .register_handler(
            "q",
            "slow",
            Arc::new(|_ctx: JobContext| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, jobforge_model::JobError>(serde_json::Value::Null)
            }),
        )
        .unwrap();
    service.start_all().await.unwrap();

    let id = service
        .add_job("q", "slow", serde_json::Value::Null, JobOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(service.cancel_job(id, Some("idempotency check".to_string())).await.unwrap());
    service.cancel_job(id, None).await.unwrap();

    let job = wait_terminal(&service, id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    service.stop_all(StopOptions::default()).await.unwrap();
}

#[tokio::test]
async fn stop_then_start_resumes_without_losing_queued_jobs() {
    let service = QueueService::in_memory();
    service.create_queue("q", QueueConfig::new()).unwrap();
    service
        .register_handler(
            "q",
            "echo",
            Arc::new(|ctx: JobContext| async move {
                    Ok::<_, jobforge_model::JobError>(ctx.data().clone())
                }),
        )
        .unwrap();

    // Queue a job before the scheduling loop is even running.
    let id = service
        .add_job("q", "echo", serde_json::json!(1), JobOptions::default())
        .await
        .unwrap();

    let queued = service.get_job(id).await.unwrap().unwrap();
    assert_eq!(queued.status, JobStatus::Queued);

    service.start_all().await.unwrap();
    let job = wait_terminal(&service, id).await;
    assert_eq!(job.status, JobStatus::Completed);

    service.stop_all(StopOptions::default()).await.unwrap();

    // A job added while stopped stays queued until started again.
    let second_id = service
        .add_job("q", "echo", serde_json::json!(2), JobOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let still_queued = service.get_job(second_id).await.unwrap().unwrap();
    assert_eq!(still_queued.status, JobStatus::Queued);

    service.start_all().await.unwrap();
    let job = wait_terminal(&service, second_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    service.stop_all(StopOptions::default()).await.unwrap();
}

#[tokio::test]
async fn immediate_stop_reconciles_aborted_job_on_next_start() {
    let service = QueueService::in_memory();
    service.create_queue("q", QueueConfig::new()).unwrap();
    service
        .register_handler(
            "q",
            "slow",
            Arc::new(|_ctx: JobContext| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, jobforge_model::JobError>(serde_json::Value::Null)
            }),
        )
        .unwrap();
    service.start_all().await.unwrap();

    let id = service
        .add_job("q", "slow", serde_json::Value::Null, JobOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        service.get_job(id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    service
        .stop_all(StopOptions::immediate())
        .await
        .unwrap();
    assert_eq!(
        service.get_job(id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    // Restarting reconciles the job that was aborted mid-flight back to
    // `queued` rather than leaving it stuck `running` forever.
    service.start_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = service.get_job(id).await.unwrap().unwrap();
    assert!(matches!(job.status, JobStatus::Queued | JobStatus::Running));
    service.stop_all(StopOptions::immediate()).await.unwrap();
}
