//! Tests for the Redis queue backend.
//!
//! These run against a live server and are skipped unless `REDIS_URL` is set.

#![cfg(feature = "redis-backend")]

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use resume_ingest::core::{SchedulerError, StatusBoard, TaskId, TaskQueue, TaskStatus};
use resume_ingest::infra::queue::redis::connect;
use resume_ingest::infra::{RedisQueue, RedisStatusBoard};

async fn connection() -> Option<redis::aio::ConnectionManager> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping");
        return None;
    };
    Some(connect(&url).await.expect("connect to redis"))
}

fn unique_prefix() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_redis_fifo_and_depth() {
    let Some(conn) = connection().await else {
        return;
    };
    let queue = RedisQueue::new(conn, &unique_prefix(), 1, 2);

    queue.enqueue(&TaskId::from("a")).await.unwrap();
    queue.enqueue(&TaskId::from("b")).await.unwrap();
    assert!(matches!(
        queue.enqueue(&TaskId::from("c")).await,
        Err(SchedulerError::QueueFull(_))
    ));

    assert_eq!(queue.dequeue_pending().await.unwrap(), Some(TaskId::from("a")));
    assert_eq!(queue.dequeue_pending().await.unwrap(), Some(TaskId::from("b")));
    assert_eq!(queue.dequeue_pending().await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_reservation_storm() {
    let Some(conn) = connection().await else {
        return;
    };
    let queue = Arc::new(RedisQueue::new(conn, &unique_prefix(), 3, 10));

    let attempts = (0..40).map(|_| {
        let queue = queue.clone();
        async move { queue.try_reserve_slot().await.unwrap() }
    });
    let granted = join_all(attempts).await.into_iter().filter(|ok| *ok).count();
    assert_eq!(granted, 3);
    assert_eq!(queue.running_count().await.unwrap(), 3);

    for _ in 0..4 {
        queue.release_slot().await.unwrap();
    }
    assert_eq!(queue.running_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_redis_status_cells() {
    let Some(conn) = connection().await else {
        return;
    };
    let board = RedisStatusBoard::new(conn, &unique_prefix(), Duration::from_secs(60));
    let id = TaskId::from("t");

    assert_eq!(board.get_status(&id).await.unwrap(), None);
    board.set_status(&id, TaskStatus::Committing).await.unwrap();
    assert_eq!(board.get_status(&id).await.unwrap(), Some(TaskStatus::Committing));
}

#[tokio::test]
async fn test_redis_enqueue_storm_respects_depth() {
    let Some(conn) = connection().await else {
        return;
    };
    let queue = Arc::new(RedisQueue::new(conn, &unique_prefix(), 1, 5));

    let submissions = (0..40).map(|i| {
        let queue = queue.clone();
        async move { queue.enqueue(&TaskId::from(format!("task-{i}"))).await }
    });
    let results = join_all(submissions).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 5);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, SchedulerError::QueueFull(_))));
    assert_eq!(queue.pending_len().await.unwrap(), 5);
}

#[tokio::test]
async fn test_redis_requeue_front_keeps_order() {
    let Some(conn) = connection().await else {
        return;
    };
    let queue = RedisQueue::new(conn, &unique_prefix(), 1, 2);
    queue.enqueue(&TaskId::from("a")).await.unwrap();
    queue.enqueue(&TaskId::from("b")).await.unwrap();

    let head = queue.dequeue_pending().await.unwrap().unwrap();
    queue.enqueue(&TaskId::from("c")).await.unwrap();
    queue.requeue_front(&head).await.unwrap();

    assert_eq!(queue.pending_len().await.unwrap(), 3);
    assert_eq!(queue.dequeue_pending().await.unwrap(), Some(TaskId::from("a")));
    assert_eq!(queue.dequeue_pending().await.unwrap(), Some(TaskId::from("b")));
}
