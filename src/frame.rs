// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/frame.rs - 摄像头帧定义
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

use std::io::Cursor;

use image::{
  ImageFormat, RgbImage,
  codecs::jpeg::JpegEncoder,
  imageops::{self, FilterType},
};
use thiserror::Error;

use crate::geometry::ImageSize;

/// 送入推理服务的图像宽度，高度按屏幕宽高比推算
pub const PROCESSING_WIDTH: f32 = 1280.0;

const JPEG_QUALITY: u8 = 75;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无效的帧尺寸: {0}x{1}")]
  InvalidSize(u32, u32),
}

/// 由屏幕尺寸推出的处理尺寸与回到屏幕坐标的缩放因子
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingGeometry {
  pub image_size: ImageSize,
  pub scale_factor: f32,
}

impl ProcessingGeometry {
  pub fn for_screen(screen: ImageSize) -> Self {
    let long = screen.width.max(screen.height);
    let short = screen.width.min(screen.height);
    let height = if long > 0.0 {
      PROCESSING_WIDTH * short / long
    } else {
      0.0
    };

    Self {
      image_size: ImageSize::new(PROCESSING_WIDTH, height),
      scale_factor: long / PROCESSING_WIDTH,
    }
  }

  pub fn width(&self) -> u32 {
    self.image_size.width as u32
  }

  pub fn height(&self) -> u32 {
    self.image_size.height as u32
  }
}

/// 一帧已编码为 JPEG 的摄像头图像
#[derive(Debug, Clone)]
pub struct CameraFrame {
  jpeg: Box<[u8]>,
  width: u32,
  height: u32,
  index: u64,
}

impl CameraFrame {
  pub fn from_jpeg(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
    Self {
      jpeg: jpeg.into_boxed_slice(),
      width,
      height,
      index: 0,
    }
  }

  /// 缩放到处理尺寸并编码为 JPEG
  pub fn from_rgb_image(image: &RgbImage, geometry: &ProcessingGeometry) -> Result<Self, FrameError> {
    let (width, height) = (geometry.width(), geometry.height());
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidSize(width, height));
    }

    let resized = if image.dimensions() == (width, height) {
      image.clone()
    } else {
      imageops::resize(image, width, height, FilterType::Triangle)
    };

    Ok(Self::from_jpeg(encode_jpeg(&resized)?, width, height))
  }

  pub fn with_index(mut self, index: u64) -> Self {
    self.index = index;
    self
  }

  pub fn jpeg(&self) -> &[u8] {
    &self.jpeg
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn size(&self) -> ImageSize {
    ImageSize::new(self.width as f32, self.height as f32)
  }

  pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
    let image = image::load_from_memory_with_format(&self.jpeg, ImageFormat::Jpeg)?;
    Ok(image.to_rgb8())
  }
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, FrameError> {
  let mut bytes = Vec::new();
  {
    let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), JPEG_QUALITY);
    encoder.encode_image(image)?;
  }
  Ok(bytes)
}
