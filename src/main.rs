// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kuangxuan::{
  FromUrl,
  input::InputWrapper,
  marker::ScreenPlaneProjector,
  output::CaptureExporter,
  session::{DEFAULT_METERS_PER_PIXEL, Session, SessionConfig},
  settings::{JsonFileStore, KeyValueStore, MemoryStore, ModelEndpoint, SettingsStore},
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("屏幕: {}x{} {:?}", args.screen.width, args.screen.height, args.orientation);

  match &args.settings {
    Some(path) => {
      info!("设置文件: {}", path.display());
      run(&args, JsonFileStore::open(path)?)
    }
    None => run(&args, MemoryStore::default()),
  }
}

fn run<S: KeyValueStore>(args: &args::Args, store: S) -> Result<()> {
  let mut settings = SettingsStore::load(store);
  if let Some(threshold) = args.threshold {
    settings.set_threshold(threshold);
  }
  if let Some(endpoint) = &args.endpoint {
    settings.set_active_endpoint(Some(ModelEndpoint::new(
      Some("command-line"),
      Some(endpoint.as_str()),
    )));
  }
  info!(
    "推理服务: {}，阈值: {}",
    settings.active_url().unwrap_or("<未设置>"),
    settings.threshold()
  );

  let config = SessionConfig {
    screen: args.screen,
    orientation: args.orientation,
    request_timeout: Duration::from_millis(args.timeout_ms),
    score_floor: args.score_floor,
    auto_capture: args.capture,
    ..SessionConfig::default()
  };
  let projector = ScreenPlaneProjector::new(config.screen, DEFAULT_METERS_PER_PIXEL);
  let mut session = Session::new(config, settings, projector)?;

  if let Some(url) = &args.export {
    info!("导出目录: {}", url);
    session = session.with_exporter(CaptureExporter::from_url(url)?);
  }

  #[cfg(feature = "draw_labeled_image")]
  if let Some(font) = &args.font {
    session = session.with_draw(kuangxuan::output::Draw::with_font_file(font)?);
  }

  let input = InputWrapper::from_url(&args.input)?;
  let frames = input.into_frames(*session.geometry());

  ContinuousTask::default()
    .with_frame_number(args.max_frames)
    .with_frame_interval(Duration::from_millis(args.frame_interval_ms))
    .run_task(frames, &mut session, ())?;

  for marker in session.pool().markers() {
    info!("标记 #{}: {}", marker.id, marker.text());
  }

  if args.save_settings {
    session.settings_mut().save()?;
    info!("设置已保存");
  }

  Ok(())
}
