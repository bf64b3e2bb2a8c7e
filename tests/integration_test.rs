use std::sync::Arc;
use std::time::Duration;

use dropqueue::{
    FileInput, MemoryGateway, QueueConfig, QueueEvent, UploadQueueManager, UploadStatus,
};

/// 测试用的快节奏配置，成功率拉满保证确定性
fn test_config() -> QueueConfig {
    QueueConfig {
        tick_interval: Duration::from_millis(10),
        min_step: 25.0,
        max_step: 40.0,
        settle_delay: Duration::from_millis(10),
        auto_start_delay: Duration::from_millis(20),
        retry_delay: Duration::from_millis(10),
        success_probability: 1.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_concurrent_batch_upload() {
    let gateway = Arc::new(MemoryGateway::new());
    let handle = UploadQueueManager::new(test_config(), gateway.clone());
    let manager = handle.manager.clone();

    // 批量入队
    let inputs: Vec<FileInput> = (0..5)
        .map(|i| {
            FileInput::new(
                format!("batch_{}.png", i),
                "image/png",
                format!("content {}", i).into_bytes(),
            )
        })
        .collect();
    let ids = manager.add_files(inputs).await.unwrap();
    assert_eq!(ids.len(), 5);

    // 等待全部落定
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = manager.stats().await.unwrap();
        if stats.completed == 5 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "batch did not complete in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // 每条记录都成功并持久化
    let snapshot = manager.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 5);
    for record in &snapshot {
        assert_eq!(record.status, UploadStatus::Success);
        assert_eq!(record.progress, 100.0);
        assert!(record.preview.is_some());
    }
    assert_eq!(gateway.len(), 5);

    // 快照保持入队顺序
    let names: Vec<&str> = snapshot.iter().map(|record| record.name.as_str()).collect();
    assert_eq!(names, vec!["batch_0.png", "batch_1.png", "batch_2.png", "batch_3.png", "batch_4.png"]);

    drop(manager);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_event_stream_covers_lifecycle() {
    let gateway = Arc::new(MemoryGateway::new());
    let handle = UploadQueueManager::new(test_config(), gateway);
    let manager = handle.manager.clone();
    let mut events = manager.subscribe_events();

    let ids = manager
        .add_files(vec![FileInput::new("life.png", "image/png", vec![0u8; 256])])
        .await
        .unwrap();
    let id = ids[0];

    // 收集事件直到持久化完成
    let mut received = Vec::new();
    let start = tokio::time::Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Ok(event)) => {
                let done = matches!(&event, QueueEvent::Persisted { id: event_id, .. } if *event_id == id);
                received.push(event);
                if done {
                    break;
                }
            }
            _ => break,
        }
    }

    assert!(received.iter().any(|e| matches!(e, QueueEvent::FileQueued { .. })));
    assert!(received.iter().any(|e| matches!(
        e,
        QueueEvent::StatusChanged {
            old_status: UploadStatus::Idle,
            new_status: UploadStatus::Uploading,
            ..
        }
    )));
    assert!(received.iter().any(|e| matches!(e, QueueEvent::Progress { .. })));
    assert!(received.iter().any(|e| matches!(e, QueueEvent::Completed { .. })));
    assert!(received.iter().any(|e| matches!(e, QueueEvent::Persisted { .. })));

    drop(events);
    drop(manager);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_clear_after_batch() {
    let gateway = Arc::new(MemoryGateway::new());
    let handle = UploadQueueManager::new(test_config(), gateway);
    let manager = handle.manager.clone();

    let inputs: Vec<FileInput> = (0..3)
        .map(|i| FileInput::new(format!("tmp_{}.txt", i), "text/plain", vec![0u8; 32]))
        .collect();
    let ids = manager.add_files(inputs).await.unwrap();
    assert_eq!(ids.len(), 3);

    let cleared = manager.clear_all().await.unwrap();
    assert_eq!(cleared, 3);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(manager.snapshot().await.unwrap().is_empty());

    // 清空后入队照常工作
    let ids = manager
        .add_files(vec![FileInput::new("after.txt", "text/plain", vec![0u8; 8])])
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    drop(manager);
    handle.shutdown().await.unwrap();
}
