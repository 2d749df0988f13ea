// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/coco.rs - COCO 标注文档
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

use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};

use crate::model::ObjectClassification;

pub const CATEGORY_COUNT: i64 = 64;
pub const DEFAULT_LICENSE_ID: i64 = 1;

const INFO_VERSION: &str = "1.0";
const INFO_DESCRIPTION: &str = "COCO Export of Captures from Kuangxuan Object Detection";
const INFO_CONTRIBUTOR: &str = "Kuangxuan";
const CATEGORY_SUPERCATEGORY: &str = "label_id";

/// COCO 日期格式（与原生端一致的 `MM/dd/yyyy HH:mm:ss`）
pub fn coco_date(now: &DateTime<Local>) -> String {
  now.format("%m/%d/%Y %H:%M:%S").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoInfo {
  pub year: String,
  pub version: String,
  pub description: String,
  pub contributor: String,
  pub url: String,
  pub date_created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoLicense {
  pub id: i64,
  pub name: String,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoCategory {
  pub id: i64,
  pub name: String,
  pub supercategory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoImage {
  pub id: i64,
  pub width: i64,
  pub height: i64,
  pub file_name: String,
  pub license: i64,
  pub date_captured: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoAnnotation {
  pub id: i64,
  pub image_id: i64,
  pub category_id: i64,
  pub segmentation: Vec<i64>,
  pub area: f32,
  pub bbox: Vec<i64>,
  pub iscrowd: i64,
}

impl CocoAnnotation {
  /// 由分类结果构造标注，坐标全部截断为整数。
  /// `segmentation` 依次为左上、左下、右下、右上四个角点。
  pub fn from_classification(id: i64, image_id: i64, classification: &ObjectClassification) -> Self {
    let b = &classification.bbox;
    let (left, top) = (b.top_left.x as i64, b.top_left.y as i64);
    let (right, bottom) = (b.bottom_right.x as i64, b.bottom_right.y as i64);
    let (width, height) = (b.width() as i64, b.height() as i64);

    Self {
      id,
      image_id,
      category_id: classification.label_id as i64,
      segmentation: vec![left, top, left, bottom, right, bottom, right, top],
      area: (width * height) as f32,
      bbox: vec![left, top, width, height],
      iscrowd: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CocoDocument {
  pub info: CocoInfo,
  #[serde(default)]
  pub licenses: Vec<CocoLicense>,
  #[serde(default)]
  pub categories: Vec<CocoCategory>,
  #[serde(default)]
  pub images: Vec<CocoImage>,
  #[serde(default)]
  pub annotations: Vec<CocoAnnotation>,
}

/// 读取已有文档时只取 images 与 annotations，其余字段忽略
#[derive(Deserialize)]
struct StoredCaptures {
  #[serde(default)]
  images: Vec<CocoImage>,
  #[serde(default)]
  annotations: Vec<CocoAnnotation>,
}

impl CocoDocument {
  /// 从已有的标注文件载入，元数据按 `now` 重新生成
  pub fn load(text: &str, now: &DateTime<Local>) -> Result<Self, serde_json::Error> {
    let stored: StoredCaptures = serde_json::from_str(text)?;
    let mut document = Self::empty(now);
    document.images = stored.images;
    document.annotations = stored.annotations;
    Ok(document)
  }

  pub fn empty(now: &DateTime<Local>) -> Self {
    let mut document = Self {
      info: CocoInfo {
        year: String::new(),
        version: String::new(),
        description: String::new(),
        contributor: String::new(),
        url: String::new(),
        date_created: String::new(),
      },
      licenses: Vec::new(),
      categories: Vec::new(),
      images: Vec::new(),
      annotations: Vec::new(),
    };
    document.regenerate_metadata(now);
    document
  }

  /// 重写 info/licenses/categories，保留 images 与 annotations
  pub fn regenerate_metadata(&mut self, now: &DateTime<Local>) {
    self.info = CocoInfo {
      year: now.year().to_string(),
      version: INFO_VERSION.to_string(),
      description: INFO_DESCRIPTION.to_string(),
      contributor: INFO_CONTRIBUTOR.to_string(),
      url: String::new(),
      date_created: coco_date(now),
    };
    self.licenses = vec![CocoLicense {
      id: DEFAULT_LICENSE_ID,
      name: "Unknown".to_string(),
      url: String::new(),
    }];
    self.categories = (1..=CATEGORY_COUNT)
      .map(|n| CocoCategory {
        id: n,
        name: n.to_string(),
        supercategory: CATEGORY_SUPERCATEGORY.to_string(),
      })
      .collect();
  }

  pub fn next_image_id(&self) -> i64 {
    self.images.iter().map(|i| i.id).max().unwrap_or(-1) + 1
  }

  pub fn next_annotation_id(&self) -> i64 {
    self.annotations.iter().map(|a| a.id).max().unwrap_or(-1) + 1
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::{BoundingBox, Point2D};

  #[test]
  fn empty_document_metadata() {
    let doc = CocoDocument::empty(&Local::now());
    assert_eq!(doc.categories.len(), 64);
    assert_eq!(doc.categories[0].id, 1);
    assert_eq!(doc.categories[63].name, "64");
    assert_eq!(doc.licenses[0].id, 1);
    assert_eq!(doc.next_image_id(), 0);
    assert_eq!(doc.next_annotation_id(), 0);
  }

  #[test]
  fn annotation_truncates_coordinates() {
    let c = ObjectClassification::new(
      "book_1",
      7,
      BoundingBox::new(Point2D::new(10.9, 20.2), Point2D::new(40.7, 60.99)),
      0.9,
    );
    let a = CocoAnnotation::from_classification(4, 2, &c);
    assert_eq!(a.category_id, 7);
    assert_eq!(a.segmentation, vec![10, 20, 10, 60, 40, 60, 40, 20]);
    assert_eq!(a.bbox, vec![10, 20, 29, 40]);
    assert_eq!(a.area, 1160.0);
  }

  #[test]
  fn ids_continue_after_max() {
    let mut doc = CocoDocument::empty(&Local::now());
    doc.images.push(CocoImage {
      id: 9,
      width: 1,
      height: 1,
      file_name: "image_9.jpg".to_string(),
      license: 1,
      date_captured: String::new(),
    });
    assert_eq!(doc.next_image_id(), 10);
  }
}
