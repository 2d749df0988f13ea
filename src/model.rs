// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/model.rs - 模型与分类结果
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

use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, ImageSize, Rotation};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理服务返回的一条分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClassification {
  pub label: String,
  #[serde(default)]
  pub label_id: i32,
  #[serde(rename = "box")]
  pub bbox: BoundingBox,
  pub score: f32,
}

impl ObjectClassification {
  pub fn new(label: impl Into<String>, label_id: i32, bbox: BoundingBox, score: f32) -> Self {
    Self {
      label: label.into(),
      label_id,
      bbox,
      score,
    }
  }

  /// 旋转并缩放到屏幕坐标
  pub fn to_screen(&self, rotation: Rotation, image_size: ImageSize, scale: f32) -> Self {
    Self {
      bbox: self.bbox.rotated(rotation, image_size).scaled(scale),
      ..self.clone()
    }
  }
}

/// 置信度过滤。
///
/// 实际阈值为 `max(threshold, floor)`，`floor` 为空时直接使用设置中的阈值。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreFilter {
  pub floor: Option<f32>,
}

impl ScoreFilter {
  pub fn with_floor(floor: Option<f32>) -> Self {
    Self { floor }
  }

  pub fn effective_threshold(&self, threshold: f32) -> f32 {
    match self.floor {
      Some(floor) => threshold.max(floor),
      None => threshold,
    }
  }

  pub fn apply(
    &self,
    classifications: Vec<ObjectClassification>,
    threshold: f32,
  ) -> Vec<ObjectClassification> {
    let threshold = self.effective_threshold(threshold);
    classifications
      .into_iter()
      .filter(|c| c.score >= threshold)
      .collect()
  }
}

mod http_classifier;
pub use self::http_classifier::{
  ClassifyError, DEFAULT_REQUEST_TIMEOUT, EndpointClassifier, HttpClassifier,
  HttpClassifierBuilder, InFlightLimiter, MAXIMUM_ACTIVE_REQUESTS, parse_classifications,
  parse_endpoint,
};
