// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use kuangxuan::geometry::{ImageSize, ScreenOrientation};

/// Kuangxuan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，例如 image:///path/to/dir?repeat=3
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 推理服务地址，覆盖设置中的当前地址
  #[arg(long, value_name = "URL")]
  pub endpoint: Option<Url>,

  /// 设置文件（JSON），不指定时只保存在内存中
  #[arg(long, value_name = "FILE")]
  pub settings: Option<PathBuf>,

  /// 结束时保存设置
  #[arg(long)]
  pub save_settings: bool,

  /// 截图导出目录，例如 folder:///data?format=Both
  #[arg(long, value_name = "OUTPUT")]
  pub export: Option<Url>,

  /// 每轮结果应用后自动截图
  #[arg(long, requires = "export")]
  pub capture: bool,

  /// 屏幕方向：portrait, landscape-left, portrait-upside-down, landscape-right
  #[arg(long, default_value = "landscape-right")]
  pub orientation: ScreenOrientation,

  /// 屏幕尺寸（像素），格式为 WxH
  #[arg(long, value_name = "WxH", default_value = "1920x1080", value_parser = parse_screen)]
  pub screen: ImageSize,

  /// 分类分数阈值，写入设置
  #[arg(long)]
  pub threshold: Option<f32>,

  /// 分数下限，与设置中的阈值取较大者
  #[arg(long)]
  pub score_floor: Option<f32>,

  /// 请求超时（毫秒）
  #[arg(long, default_value_t = 2000)]
  pub timeout_ms: u64,

  /// 送帧间隔（毫秒）
  #[arg(long, default_value_t = 200)]
  pub frame_interval_ms: u64,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<usize>,

  /// 标注截图使用的字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn parse_screen(s: &str) -> Result<ImageSize, String> {
  let (w, h) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("屏幕尺寸格式应为 WxH: {}", s))?;
  let width: u32 = w.trim().parse().map_err(|_| format!("无效的宽度: {}", w))?;
  let height: u32 = h.trim().parse().map_err(|_| format!("无效的高度: {}", h))?;
  if width == 0 || height == 0 {
    return Err(format!("屏幕尺寸不能为零: {}", s));
  }
  Ok(ImageSize::new(width as f32, height as f32))
}
