// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续分类
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kuangxuan::{
  FromUrl,
  input::InputWrapper,
  marker::ScreenPlaneProjector,
  session::{DEFAULT_METERS_PER_PIXEL, Session, SessionConfig},
  settings::{MemoryStore, ModelEndpoint, SettingsStore},
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Kuangxuan 连续分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理服务地址
  #[arg(long, value_name = "MODEL")]
  pub endpoint: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理服务: {}", args.endpoint);
  info!("输入来源: {}", args.input);

  let mut settings = SettingsStore::load(MemoryStore::default());
  settings.set_active_endpoint(Some(ModelEndpoint::new(None, Some(args.endpoint.as_str()))));

  let config = SessionConfig::default();
  let projector = ScreenPlaneProjector::new(config.screen, DEFAULT_METERS_PER_PIXEL);
  let mut session = Session::new(config, settings, projector)?;

  let input = InputWrapper::from_url(&args.input)?;
  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input.into_frames(*session.geometry()), &mut session, ())?;

  for marker in session.pool().markers() {
    info!("{}", marker.text());
  }

  Ok(())
}
