// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/coco_export.rs - 截图与 COCO 标注导出
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
use std::str::FromStr;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::CameraFrame,
  model::ObjectClassification,
  output::{
    Render,
    coco::{CocoAnnotation, CocoDocument, CocoImage, DEFAULT_LICENSE_ID, coco_date},
  },
  utils::write_atomically,
};

pub const CAPTURES_FOLDER: &str = "Captures";
pub const LABELED_IMAGES_FOLDER: &str = "LabeledImages";
pub const ANNOTATIONS_FILE: &str = "annotations.json";

const LABELED_IMAGE_PREFIX: &str = "labeled_";
const ORIGINAL_IMAGE_PREFIX: &str = "image_";
const IMAGE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的导出格式: {0}")]
  UnknownFormat(String),
  #[error("缺少带标注的截图")]
  MissingLabeledBytes,
  #[error("缺少原始图像")]
  MissingOriginalBytes,
  #[error("缺少分类结果")]
  MissingClassifications,
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureExportFormat {
  LabeledImage,
  OriginalImageWithJsonAnnotations,
  #[default]
  Both,
}

impl CaptureExportFormat {
  pub fn wants_labeled(&self) -> bool {
    matches!(self, Self::LabeledImage | Self::Both)
  }

  pub fn wants_original(&self) -> bool {
    matches!(self, Self::OriginalImageWithJsonAnnotations | Self::Both)
  }
}

impl FromStr for CaptureExportFormat {
  type Err = ExportError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "LabeledImage" => Ok(Self::LabeledImage),
      "OriginalImageWithJsonAnnotations" => Ok(Self::OriginalImageWithJsonAnnotations),
      "Both" => Ok(Self::Both),
      other => Err(ExportError::UnknownFormat(other.to_string())),
    }
  }
}

/// 一次导出实际写入的内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureReceipt {
  pub labeled_image: Option<PathBuf>,
  pub original_image: Option<PathBuf>,
  pub image_id: Option<i64>,
  pub annotation_ids: Vec<i64>,
}

/// 截图导出器
///
/// 目录结构：
/// ```text
/// <root>/Captures/annotations.json
/// <root>/Captures/image_<id>.jpg
/// <root>/Captures/LabeledImages/labeled_<n>.jpg
/// ```
///
/// 所有文件先写入临时文件再重命名；只有在标注文件写入成功之后，
/// 内存中的文档才会更新。
pub struct CaptureExporter {
  storage_path: PathBuf,
  labeled_path: PathBuf,
  document: CocoDocument,
  default_format: CaptureExportFormat,
}

impl FromUrlWithScheme for CaptureExporter {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for CaptureExporter {
  type Error = ExportError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ExportError::SchemeMismatch);
    }

    let format = match uri.query_pairs().find(|(k, _)| k == "format") {
      Some((_, v)) => v.parse()?,
      None => CaptureExportFormat::default(),
    };

    let mut exporter = Self::open(Path::new(uri.path()))?;
    exporter.default_format = format;
    Ok(exporter)
  }
}

impl CaptureExporter {
  /// 打开（或创建）导出目录，载入已有的标注文档并重写其元数据
  pub fn open(root: &Path) -> Result<Self, ExportError> {
    let storage_path = root.join(CAPTURES_FOLDER);
    let labeled_path = storage_path.join(LABELED_IMAGES_FOLDER);
    std::fs::create_dir_all(&labeled_path)?;

    let now = Local::now();
    let annotations = storage_path.join(ANNOTATIONS_FILE);
    // 无法解析的文件保留在磁盘上，直到下一次导出成功写入
    let (document, loaded) = match std::fs::read_to_string(&annotations) {
      Ok(text) => match CocoDocument::load(&text, &now) {
        Ok(document) => (document, true),
        Err(e) => {
          warn!("无法解析标注文件 {}，将重新开始: {}", annotations.display(), e);
          (CocoDocument::empty(&now), false)
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => (CocoDocument::empty(&now), true),
      Err(e) => return Err(e.into()),
    };

    let exporter = Self {
      storage_path,
      labeled_path,
      document,
      default_format: CaptureExportFormat::default(),
    };
    if loaded {
      exporter.write_document(&exporter.document)?;
    }
    info!(
      "导出目录 {}，已有 {} 张图像",
      exporter.storage_path.display(),
      exporter.document.images.len()
    );
    Ok(exporter)
  }

  pub fn storage_path(&self) -> &Path {
    &self.storage_path
  }

  pub fn labeled_path(&self) -> &Path {
    &self.labeled_path
  }

  pub fn document(&self) -> &CocoDocument {
    &self.document
  }

  pub fn default_format(&self) -> CaptureExportFormat {
    self.default_format
  }

  /// 导出一次截图。
  ///
  /// 格式要求的输入缺失时直接返回错误，不写入任何文件。
  /// `image_size` 为原始图像（同时也是标注坐标）的宽高。
  pub fn export_capture(
    &mut self,
    format: CaptureExportFormat,
    labeled: Option<&[u8]>,
    original: Option<&[u8]>,
    image_size: (u32, u32),
    classifications: Option<&[ObjectClassification]>,
  ) -> Result<CaptureReceipt, ExportError> {
    if format.wants_labeled() && labeled.is_none() {
      return Err(ExportError::MissingLabeledBytes);
    }
    if format.wants_original() {
      if original.is_none() {
        return Err(ExportError::MissingOriginalBytes);
      }
      if classifications.is_none() {
        return Err(ExportError::MissingClassifications);
      }
    }

    let mut receipt = CaptureReceipt::default();

    if let (true, Some(bytes)) = (format.wants_labeled(), labeled) {
      receipt.labeled_image = Some(self.save_labeled_image(bytes)?);
    }

    if let (true, Some(bytes), Some(items)) = (format.wants_original(), original, classifications) {
      self.save_original_with_annotations(bytes, image_size, items, &mut receipt)?;
    }

    Ok(receipt)
  }

  fn save_labeled_image(&self, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let next = next_labeled_index(&self.labeled_path)?;
    let path = self
      .labeled_path
      .join(format!("{LABELED_IMAGE_PREFIX}{next}.{IMAGE_EXTENSION}"));
    write_atomically(&path, bytes)?;
    debug!("保存标注截图 {}", path.display());
    Ok(path)
  }

  fn save_original_with_annotations(
    &mut self,
    bytes: &[u8],
    (width, height): (u32, u32),
    items: &[ObjectClassification],
    receipt: &mut CaptureReceipt,
  ) -> Result<(), ExportError> {
    let mut document = self.document.clone();
    let image_id = document.next_image_id();
    let file_name = format!("{ORIGINAL_IMAGE_PREFIX}{image_id}.{IMAGE_EXTENSION}");

    document.images.push(CocoImage {
      id: image_id,
      width: width as i64,
      height: height as i64,
      file_name: file_name.clone(),
      license: DEFAULT_LICENSE_ID,
      date_captured: coco_date(&Local::now()),
    });

    for item in items {
      let id = document.next_annotation_id();
      document
        .annotations
        .push(CocoAnnotation::from_classification(id, image_id, item));
      receipt.annotation_ids.push(id);
    }

    let path = self.storage_path.join(&file_name);
    write_atomically(&path, bytes)?;
    self.write_document(&document)?;
    self.document = document;

    debug!(
      "保存原始图像 {}，{} 条标注",
      path.display(),
      receipt.annotation_ids.len()
    );
    receipt.original_image = Some(path);
    receipt.image_id = Some(image_id);
    Ok(())
  }

  fn write_document(&self, document: &CocoDocument) -> Result<(), ExportError> {
    let json = serde_json::to_vec_pretty(document)?;
    write_atomically(&self.storage_path.join(ANNOTATIONS_FILE), &json)?;
    Ok(())
  }

  /// 删除全部截图，重建空目录与空标注文档
  pub fn delete_all_captures(&mut self) -> Result<(), ExportError> {
    match std::fs::remove_dir_all(&self.storage_path) {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(&self.labeled_path)?;

    let document = CocoDocument::empty(&Local::now());
    self.write_document(&document)?;
    self.document = document;
    info!("已删除全部截图: {}", self.storage_path.display());
    Ok(())
  }
}

fn next_labeled_index(directory: &Path) -> Result<u64, ExportError> {
  let mut next = 0;
  for entry in std::fs::read_dir(directory)? {
    let name = entry?.file_name();
    let index = name
      .to_str()
      .and_then(|n| n.strip_prefix(LABELED_IMAGE_PREFIX))
      .and_then(|n| n.strip_suffix(&format!(".{IMAGE_EXTENSION}")))
      .and_then(|n| n.parse::<u64>().ok());
    if let Some(index) = index {
      next = next.max(index + 1);
    }
  }
  Ok(next)
}

/// 把每一帧及其分类结果作为原始图像与标注记录下来
impl Render<CameraFrame, Vec<ObjectClassification>> for CaptureExporter {
  type Error = ExportError;

  fn render_result(
    &mut self,
    frame: &CameraFrame,
    result: &Vec<ObjectClassification>,
  ) -> Result<(), Self::Error> {
    self.export_capture(
      CaptureExportFormat::OriginalImageWithJsonAnnotations,
      None,
      Some(frame.jpeg()),
      (frame.width(), frame.height()),
      Some(result),
    )?;
    Ok(())
  }
}
