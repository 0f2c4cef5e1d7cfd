use sensor_anomaly::source::jsonl::write_jsonl;
use sensor_anomaly::utils::synthetic::make_dataset;
use sensor_anomaly::{
    Batch, Detector, DetectorKind, JsonlSink, JsonlStore, MemorySink, MemoryStore, ModelConfig, ModelDetector,
    Orchestrator, PipelineConfig, PipelineError, PreprocessConfig, Preprocessor, Reading, SourceMode,
    StoreBatchSource, TrainingReuse,
};
use std::collections::HashSet;
use std::future::pending;
use std::time::Duration;

fn config() -> PipelineConfig {
    PipelineConfig {
        pacing_ms: 0,
        ..Default::default()
    }
}

fn model_config(train_batches: usize) -> PipelineConfig {
    let mut cfg = config();
    cfg.detector = DetectorKind::Model;
    cfg.train_batches = train_batches;
    cfg.model.contamination = 0.05;
    cfg.model.n_estimators = 50;
    cfg
}

fn source(readings: Vec<Reading>) -> StoreBatchSource<MemoryStore> {
    StoreBatchSource::bounded(MemoryStore::from_readings(readings))
}

fn timestamps(readings: &[Reading]) -> HashSet<u64> {
    readings.iter().map(|r| r.timestamp.to_bits()).collect()
}

#[tokio::test]
async fn flagged_timestamps_come_from_the_source() {
    let data = make_dataset(3000, 0.03, Some(21));
    let sink = MemorySink::new();
    let mut cfg = config();
    cfg.threshold_sigma = 3.0;

    let mut orch = Orchestrator::new(cfg, source(data.clone()), sink.clone()).unwrap();
    let summary = orch.run(pending()).await.unwrap();

    assert_eq!(summary.batches, 6);
    assert_eq!(summary.readings, 3000);
    assert_eq!(summary.scored_rows, 6 * (500 - 24));
    assert!(!summary.interrupted);
    assert!(summary.anomalies > 0);
    assert_eq!(sink.len(), summary.anomalies);

    let known = timestamps(&data);
    let records = sink.records();
    assert!(records.iter().all(|r| known.contains(&r.timestamp().to_bits())));
    assert!(records.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    assert!(summary.metrics().is_some());
}

#[tokio::test]
async fn sink_is_cleared_before_the_first_batch() {
    let sink = MemorySink::new();
    let mut first = Orchestrator::new(config(), source(make_dataset(1000, 0.05, Some(3))), sink.clone()).unwrap();
    let a = first.run(pending()).await.unwrap();

    let mut second = Orchestrator::new(config(), source(make_dataset(1000, 0.05, Some(3))), sink.clone()).unwrap();
    let b = second.run(pending()).await.unwrap();

    assert_eq!(a.anomalies, b.anomalies);
    assert_eq!(sink.len(), b.anomalies);
}

#[tokio::test]
async fn missing_model_is_an_error_without_training() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = model_config(3);
    cfg.model_path = Some(dir.path().join("absent.json"));
    cfg.train_if_missing = false;

    let mut orch = Orchestrator::new(cfg, source(make_dataset(1000, 0.0, Some(1))), MemorySink::new()).unwrap();
    let err = orch.run(pending()).await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelNotFound { .. }));
}

#[tokio::test]
async fn training_batches_are_discarded_by_default() {
    let data = make_dataset(2000, 0.02, Some(8));

    let mut discard = Orchestrator::new(model_config(3), source(data.clone()), MemorySink::new()).unwrap();
    let s = discard.run(pending()).await.unwrap();
    assert_eq!(s.batches, 1);
    assert_eq!(s.readings, 500);
    assert_eq!(s.training_rows, 3 * 476);

    let mut cfg = model_config(3);
    cfg.training_reuse = TrainingReuse::Replay;
    let mut replay = Orchestrator::new(cfg, source(data), MemorySink::new()).unwrap();
    let s = replay.run(pending()).await.unwrap();
    assert_eq!(s.batches, 4);
    assert_eq!(s.readings, 2000);
}

#[tokio::test]
async fn trained_model_is_saved_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models").join("forest.json");
    let data = make_dataset(2000, 0.02, Some(13));

    let mut cfg = model_config(2);
    cfg.model_path = Some(path.clone());

    let mut first = Orchestrator::new(cfg.clone(), source(data.clone()), MemorySink::new()).unwrap();
    let s = first.run(pending()).await.unwrap();
    assert!(path.exists());
    assert_eq!(s.training_rows, 2 * 476);
    assert_eq!(s.batches, 2);

    let mut second = Orchestrator::new(cfg, source(data), MemorySink::new()).unwrap();
    let s = second.run(pending()).await.unwrap();
    assert_eq!(s.training_rows, 0);
    assert_eq!(s.batches, 4);
}

#[tokio::test]
async fn empty_source_cannot_train_a_model() {
    let mut orch = Orchestrator::new(model_config(3), source(Vec::new()), MemorySink::new()).unwrap();
    let err = orch.run(pending()).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyTrainingSet));
}

#[tokio::test]
async fn max_batches_stops_early() {
    let mut cfg = config();
    cfg.max_batches = Some(3);
    let mut orch = Orchestrator::new(cfg, source(make_dataset(5000, 0.01, Some(2))), MemorySink::new()).unwrap();
    let s = orch.run(pending()).await.unwrap();
    assert_eq!(s.batches, 3);
    assert_eq!(s.readings, 1500);
    assert!(!s.interrupted);
}

#[tokio::test]
async fn immediate_shutdown_writes_nothing() {
    let sink = MemorySink::new();
    let mut orch = Orchestrator::new(config(), source(make_dataset(2000, 0.05, Some(4))), sink.clone()).unwrap();
    let s = orch.run(std::future::ready(())).await.unwrap();
    assert!(s.interrupted);
    assert_eq!(s.batches, 0);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn shutdown_while_waiting_keeps_whole_batches() {
    let store = MemoryStore::from_readings(make_dataset(600, 0.05, Some(9)));
    let follow = StoreBatchSource::new(store, SourceMode::Follow { poll_interval: Duration::from_millis(5) });
    let sink = MemorySink::new();
    let mut cfg = config();
    cfg.threshold_sigma = 3.0;

    let mut orch = Orchestrator::new(cfg, follow, sink.clone()).unwrap();
    let s = tokio::time::timeout(
        Duration::from_secs(5),
        orch.run(tokio::time::sleep(Duration::from_millis(200))),
    )
    .await
    .expect("pipeline ignored shutdown")
    .unwrap();

    assert!(s.interrupted);
    assert_eq!(s.batches, 1);
    assert_eq!(s.readings, 500);
    assert_eq!(sink.len(), s.anomalies);
}

#[tokio::test]
async fn jsonl_files_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("readings.jsonl");
    let output = dir.path().join("anomalies.jsonl");
    let data = make_dataset(1500, 0.04, Some(17));
    assert_eq!(write_jsonl(&input, &data).unwrap(), 1500);
    std::fs::write(&output, "stale\n").unwrap();

    let mut cfg = config();
    cfg.batch_size = 400;
    cfg.threshold_sigma = 3.0;
    let mut orch = Orchestrator::new(
        cfg,
        StoreBatchSource::bounded(JsonlStore::new(&input)),
        JsonlSink::new(&output),
    )
    .unwrap();
    let s = orch.run(pending()).await.unwrap();
    assert_eq!(s.batches, 4);
    assert_eq!(s.readings, 1500);

    let text = std::fs::read_to_string(&output).unwrap();
    let written: Vec<Reading> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(written.len(), s.anomalies);
    let known = timestamps(&data);
    assert!(written.iter().all(|r| known.contains(&r.timestamp.to_bits())));
}

#[tokio::test]
async fn interrupted_training_does_not_replay_stale_batches() {
    let data = make_dataset(2100, 0.02, Some(31));
    let store = MemoryStore::from_readings(data[..600].to_vec());
    let writer = store.clone();
    let follow = StoreBatchSource::new(store, SourceMode::Follow { poll_interval: Duration::from_millis(5) });
    let sink = MemorySink::new();

    let mut cfg = model_config(3);
    cfg.training_reuse = TrainingReuse::Replay;
    cfg.max_batches = Some(3);
    let mut orch = Orchestrator::new(cfg, follow, sink.clone()).unwrap();

    // first batch is drained for training, then the source stalls
    let s = orch.run(tokio::time::sleep(Duration::from_millis(150))).await.unwrap();
    assert!(s.interrupted);
    assert_eq!(s.batches, 0);

    writer.extend(data[600..].iter().copied());
    let s = tokio::time::timeout(Duration::from_secs(10), orch.run(pending()))
        .await
        .expect("pipeline stalled")
        .unwrap();
    assert_eq!(s.training_rows, 3 * 476);
    assert_eq!(s.batches, 3);

    // only the batches the model was trained on are replayed
    let first_trained = data[500].timestamp;
    let records = sink.records();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.timestamp() >= first_trained));
}

#[tokio::test]
async fn prefitted_detector_skips_training() {
    let pre = Preprocessor::new(PreprocessConfig::default()).unwrap();
    let reference = pre.preprocess(&Batch::new(make_dataset(1000, 0.0, Some(40))));
    let mut det = ModelDetector::new(ModelConfig { n_estimators: 50, ..Default::default() }).unwrap();
    det.fit(&reference).unwrap();

    let mut cfg = model_config(3);
    cfg.train_if_missing = false;
    let mut orch = Orchestrator::new(cfg, source(make_dataset(1500, 0.03, Some(41))), MemorySink::new())
        .unwrap()
        .with_detector(det);
    let s = orch.run(pending()).await.unwrap();
    assert_eq!(s.training_rows, 0);
    assert_eq!(s.batches, 3);
    assert_eq!(orch.detector().map(|d| d.name()), Some("isolation_forest"));
}

#[tokio::test]
async fn null_channel_drops_only_its_window() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("gappy.jsonl");
    let data = make_dataset(500, 0.03, Some(44));
    let lines: Vec<String> = data
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut v = serde_json::to_value(r).unwrap();
            if i == 200 {
                v["gyro_y"] = serde_json::Value::Null;
            }
            v.to_string()
        })
        .collect();
    std::fs::write(&input, lines.join("\n") + "\n").unwrap();

    let sink = MemorySink::new();
    let mut cfg = config();
    cfg.threshold_sigma = 3.0;
    let mut orch =
        Orchestrator::new(cfg, StoreBatchSource::bounded(JsonlStore::new(&input)), sink.clone()).unwrap();
    let s = orch.run(pending()).await.unwrap();

    assert_eq!(s.readings, 500);
    assert_eq!(s.scored_rows, 476 - 25);
    assert!(sink.records().iter().all(|r| r.reading.values.iter().all(|v| v.is_finite())));
}
