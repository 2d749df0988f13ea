// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{CameraFrame, ProcessingGeometry},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  EmptyDirectory(PathBuf),
  #[error("无效的参数 {0}: {1}")]
  InvalidParameter(String, String),
}

/// `image:///path/to/file.jpg` 或 `image:///path/to/dir?repeat=3`
///
/// 目录按文件名排序读取，`repeat` 指定整个序列重复的次数。
pub struct ImageFileInput {
  files: Vec<PathBuf>,
  repeat: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let repeat = match url.query_pairs().find(|(k, _)| k == "repeat") {
      Some((_, v)) => v
        .parse::<usize>()
        .map_err(|_| ImageFileInputError::InvalidParameter("repeat".to_string(), v.to_string()))?,
      None => 1,
    };

    Self::open(Path::new(url.path()), repeat)
  }
}

impl ImageFileInput {
  pub fn open(path: &Path, repeat: usize) -> Result<Self, ImageFileInputError> {
    let files = if path.is_dir() {
      let mut files = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        if is_image_file(&file) {
          files.push(file);
        }
      }
      files.sort();
      if files.is_empty() {
        return Err(ImageFileInputError::EmptyDirectory(path.to_path_buf()));
      }
      files
    } else {
      std::fs::metadata(path)?;
      vec![path.to_path_buf()]
    };

    Ok(Self { files, repeat })
  }

  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  pub fn into_frames(self, geometry: ProcessingGeometry) -> ImageFileFrames {
    ImageFileFrames {
      inner: self,
      geometry,
      cursor: 0,
      index: 0,
    }
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// 逐个读取图像并缩放到处理尺寸，无法解码的文件记录日志后跳过
pub struct ImageFileFrames {
  inner: ImageFileInput,
  geometry: ProcessingGeometry,
  cursor: usize,
  index: u64,
}

impl Iterator for ImageFileFrames {
  type Item = CameraFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let total = self.inner.files.len() * self.inner.repeat;
    while self.cursor < total {
      let path = &self.inner.files[self.cursor % self.inner.files.len()];
      self.cursor += 1;

      let image = match ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|r| r.decode())
      {
        Ok(image) => image.into_rgb8(),
        Err(e) => {
          warn!("无法读取图像 {}: {}", path.display(), e);
          continue;
        }
      };

      match CameraFrame::from_rgb_image(&image, &self.geometry) {
        Ok(frame) => {
          let frame = frame.with_index(self.index);
          self.index += 1;
          return Some(frame);
        }
        Err(e) => warn!("无法转换图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}
