// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像分类
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
  frame::{CameraFrame, ProcessingGeometry},
  geometry::ImageSize,
  input::InputWrapper,
  model::{HttpClassifierBuilder, ObjectClassification},
  output::{CaptureExporter, ExportError, Render},
  task::{OneShotTask, Task},
};
use tracing::info;

/// Kuangxuan 单张图像分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理服务地址，可带 timeout_ms 参数
  #[arg(long, value_name = "MODEL")]
  pub endpoint: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 导出目录（可选），结果以原始图像加标注的形式记录
  #[arg(long, value_name = "OUTPUT")]
  pub export: Option<Url>,
}

/// 把结果以 JSON 打印到标准输出，并按需记录到导出目录
struct PrintOutput {
  exporter: Option<CaptureExporter>,
}

impl Render<CameraFrame, Vec<ObjectClassification>> for PrintOutput {
  type Error = ExportError;

  fn render_result(
    &mut self,
    frame: &CameraFrame,
    result: &Vec<ObjectClassification>,
  ) -> Result<(), Self::Error> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if let Some(exporter) = &mut self.exporter {
      exporter.render_result(frame, result)?;
    }
    Ok(())
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理服务: {}", args.endpoint);
  info!("输入来源: {}", args.input);

  let model = HttpClassifierBuilder::from_url(&args.endpoint)?.build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let exporter = args
    .export
    .as_ref()
    .map(CaptureExporter::from_url)
    .transpose()?;

  // 单张图像按横向 16:9 处理
  let geometry = ProcessingGeometry::for_screen(ImageSize::new(1920.0, 1080.0));
  let result = OneShotTask.run_task(input.into_frames(geometry), model, PrintOutput { exporter })?;
  info!("共 {} 个分类结果", result.len());

  Ok(())
}
