// 该文件是 Kuangxuan （框选） 项目的一部分。
// tests/session.rs - 会话端到端测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod common;

use std::time::Duration;

use image::RgbImage;
use kuangxuan::{
  bridge::{self, InboundCommand, OutboundEvent},
  input::ImageFileInput,
  marker::ScreenPlaneProjector,
  output::{CaptureExportFormat, CaptureExporter},
  session::{DEFAULT_METERS_PER_PIXEL, Session, SessionConfig},
  settings::{JsonFileStore, MemoryStore, ModelEndpoint, SettingsStore},
  task::{ContinuousTask, Task},
};
use tempfile::tempdir;

use common::{TOY_RESPONSE, spawn_responder};

fn session_with_endpoint(
  endpoint: &str,
  config: SessionConfig,
) -> Session<MemoryStore, ScreenPlaneProjector> {
  let mut settings = SettingsStore::load(MemoryStore::default());
  settings.set_active_endpoint(Some(ModelEndpoint::new(Some("local"), Some(endpoint))));
  let projector = ScreenPlaneProjector::new(config.screen, DEFAULT_METERS_PER_PIXEL);
  Session::new(config, settings, projector).unwrap()
}

#[test]
fn continuous_task_reuses_one_marker_and_captures_every_cycle() {
  let server = spawn_responder(200, TOY_RESPONSE, Duration::ZERO, 3);

  let images = tempdir().unwrap();
  for name in ["a.png", "b.png", "c.png"] {
    RgbImage::new(64, 36).save(images.path().join(name)).unwrap();
  }
  let captures = tempdir().unwrap();
  let url = url::Url::parse(&format!(
    "folder://{}?format=OriginalImageWithJsonAnnotations",
    captures.path().display()
  ))
  .unwrap();
  let exporter = <CaptureExporter as kuangxuan::FromUrl>::from_url(&url).unwrap();

  let config = SessionConfig {
    auto_capture: true,
    ..SessionConfig::default()
  };
  let mut session = session_with_endpoint(&server.url, config).with_exporter(exporter);

  let frames = ImageFileInput::open(images.path(), 1)
    .unwrap()
    .into_frames(*session.geometry());
  let stats = ContinuousTask::default()
    .without_interrupt_handler()
    .with_frame_interval(Duration::from_millis(250))
    .with_drain_timeout(Duration::from_secs(10))
    .run_task(frames, &mut session, ())
    .unwrap();

  assert_eq!(stats.frames_received, 3);
  assert_eq!(stats.requests_dispatched, 3);
  assert_eq!(stats.cycles_applied, 3);
  assert_eq!(stats.captures, 3);

  // book_1 的分数低于默认阈值 0.75
  assert_eq!(session.pool().len(), 1);
  assert_eq!(session.pool().markers()[0].label, "toy_1");
  assert_eq!(session.pool().markers()[0].text(), "toy_1 - 90%");

  let document = session.exporter().unwrap().document();
  assert_eq!(document.images.len(), 3);
  assert_eq!(document.annotations.len(), 3);
  assert!(document.annotations.iter().all(|a| a.category_id == 5));
}

#[test]
fn threshold_from_bridge_admits_low_scores() {
  let server = spawn_responder(200, TOY_RESPONSE, Duration::ZERO, 1);
  let config = SessionConfig {
    updates_per_second: 0.0,
    ..SessionConfig::default()
  };
  let mut session = session_with_endpoint(&server.url, config);
  let handle = session.handle();

  handle
    .send_to_engine(
      InboundCommand::SetSettingsModelFromJson(format!(
        r#"{{"predictionScoreThreshold":0.1,"modelEndpoints":[{{"name":"local","url":"{}"}}],"activeEndpoint":{{"name":"local","url":"{}"}}}}"#,
        server.url, server.url
      ))
      .into(),
    )
    .unwrap();
  session.pump();
  assert_eq!(session.settings().threshold(), 0.1);

  let frame = kuangxuan::frame::CameraFrame::from_jpeg(vec![0xff, 0xd8, 0xff, 0xd9], 1280, 720);
  handle.submit_frame(frame).unwrap();
  session.pump();
  assert!(session.drain(Duration::from_secs(10)));

  assert_eq!(session.pool().len(), 2);
  assert_eq!(session.current_classifications().unwrap().len(), 2);
}

#[test]
fn settings_changes_are_announced_and_persisted() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("settings.json");
  let (sender, outbound) = bridge::channel();

  {
    let store = JsonFileStore::open(&path).unwrap();
    let projector = ScreenPlaneProjector::new(SessionConfig::default().screen, DEFAULT_METERS_PER_PIXEL);
    let mut session = Session::new(SessionConfig::default(), SettingsStore::load(store), projector)
      .unwrap()
      .with_notifier(sender);
    let handle = session.handle();

    handle
      .send_to_engine(
        InboundCommand::SetActiveEndpointFromJson(
          r#"{"name":"lab","url":"https://10.0.0.2:8443/predict"}"#.to_string(),
        )
        .into(),
      )
      .unwrap();
    handle.send_to_engine(InboundCommand::SaveSettings.into()).unwrap();
    assert_eq!(session.pump(), 2);
  }

  let last = outbound
    .try_iter()
    .filter_map(|m| OutboundEvent::try_from(m).ok())
    .filter_map(|e| match e {
      OutboundEvent::SettingsJsonDidChange(json) => Some(json),
      _ => None,
    })
    .last()
    .unwrap();
  assert!(last.contains("https://10.0.0.2:8443/predict"));

  let reloaded = SettingsStore::load(JsonFileStore::open(&path).unwrap());
  assert_eq!(reloaded.active_url(), Some("https://10.0.0.2:8443/predict"));
}

#[test]
fn delete_all_through_bridge_clears_captures() {
  let captures = tempdir().unwrap();
  let mut exporter = CaptureExporter::open(captures.path()).unwrap();
  exporter
    .export_capture(CaptureExportFormat::LabeledImage, Some(b"l"), None, (8, 8), None)
    .unwrap();

  let mut session = session_with_endpoint("http://127.0.0.1:1/predict", SessionConfig::default())
    .with_exporter(exporter);
  session
    .handle()
    .send_to_engine(InboundCommand::DeleteAllCaptures.into())
    .unwrap();
  session.pump();

  let exporter = session.exporter().unwrap();
  assert_eq!(std::fs::read_dir(exporter.labeled_path()).unwrap().count(), 0);
}
