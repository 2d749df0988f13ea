// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/marker.rs - 场景中的标注框池
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

//! # 标注框池
//!
//! 每一轮分类结果到达时，尽量复用场景中已有的同标签标注框，而不是全部销毁重建，
//! 避免画面闪烁。
//!
//! 每个标注框带有一个宽限计数：创建或被复用时置为 1，每轮开始时减 1，
//! 计数为 0 且本轮仍未被复用的框会在下一轮开始时销毁。也就是说，
//! 一个框可以在一轮没有匹配的情况下继续存在，以平滑单帧漏检。

use tracing::debug;

use crate::geometry::{BoundingBox, ImageSize, Point2D};
use crate::model::ObjectClassification;

/// 标注框在未被复用的情况下可经历的更新次数
pub const TRANSIENT_BOX_UPDATE_COUNT: u32 = 1;

/// 估算每像素对应距离时，向四个方向探测的像素数
pub const SURROUNDING_PIXEL_DISTANCE: f32 = 10.0;

// 预制体自身与其矩形的缩放
const LABELED_BOUNDING_BOX_SCALE: f32 = 0.1;
const RECTANGLE_SCALE: f32 = 0.1;

pub type WorldPosition = [f32; 3];

fn world_distance(a: &WorldPosition, b: &WorldPosition) -> f32 {
  a.iter()
    .zip(b.iter())
    .map(|(a, b)| (a - b).powi(2))
    .sum::<f32>()
    .sqrt()
}

/// 把屏幕坐标（y 轴向上）投射到场景中
pub trait SceneProjector {
  fn raycast(&self, screen_point: Point2D) -> Option<WorldPosition>;
}

impl<F> SceneProjector for F
where
  F: Fn(Point2D) -> Option<WorldPosition>,
{
  fn raycast(&self, screen_point: Point2D) -> Option<WorldPosition> {
    self(screen_point)
  }
}

/// 把屏幕视为 z = 0 的平面，屏幕外的点视为未命中
#[derive(Debug, Clone, Copy)]
pub struct ScreenPlaneProjector {
  screen: ImageSize,
  meters_per_pixel: f32,
}

impl ScreenPlaneProjector {
  pub fn new(screen: ImageSize, meters_per_pixel: f32) -> Self {
    Self {
      screen,
      meters_per_pixel,
    }
  }
}

impl SceneProjector for ScreenPlaneProjector {
  fn raycast(&self, p: Point2D) -> Option<WorldPosition> {
    let inside = (0.0..=self.screen.width).contains(&p.x) && (0.0..=self.screen.height).contains(&p.y);
    inside.then(|| [p.x * self.meters_per_pixel, p.y * self.meters_per_pixel, 0.0])
  }
}

const LABEL_PREFIX_COLORS: &[(&str, [u8; 3])] = &[
  ("NONE", [0, 0, 0]),
  ("book", [0, 122, 255]),
  ("candy", [52, 199, 89]),
  ("cereal", [108, 106, 234]),
  ("chips", [255, 149, 0]),
  ("cleaning", [255, 45, 85]),
  ("cracker", [175, 82, 222]),
  ("craft", [255, 59, 48]),
  ("drink", [90, 200, 250]),
  ("footware", [255, 204, 0]),
  ("hygiene", [255, 204, 0]),
  ("lotion", [0, 122, 255]),
  ("pasta", [52, 199, 89]),
  ("pest", [88, 86, 214]),
  ("porridge", [255, 149, 0]),
  ("seasoning", [255, 45, 85]),
  ("snack", [175, 82, 222]),
  ("soup", [255, 59, 48]),
  ("storage", [90, 200, 250]),
  ("toiletry", [255, 204, 0]),
  ("toy", [255, 204, 0]),
  ("utensil", [0, 122, 255]),
  ("vitamin", [52, 199, 89]),
];

pub const DEFAULT_MARKER_COLOR: [u8; 3] = [0, 0, 0];

/// 按标签中第一个 `_` 之前的前缀取颜色；没有 `_` 的标签前缀为空
pub fn color_for_label(label: &str) -> Option<[u8; 3]> {
  let prefix = label.split_once('_').map(|(prefix, _)| prefix).unwrap_or("");
  LABEL_PREFIX_COLORS
    .iter()
    .find(|(p, _)| *p == prefix)
    .map(|(_, color)| *color)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
  pub id: u64,
  pub world_position: WorldPosition,
  /// 最近一次匹配时的屏幕坐标框
  pub screen_box: BoundingBox,
  pub width: f32,
  pub height: f32,
  pub color: [u8; 3],
  pub label: String,
  pub score: f32,
  pub updates_remaining: u32,
  pub sort_order: u64,
}

impl Marker {
  pub fn text(&self) -> String {
    format!("{} - {}%", self.label, (self.score * 100.0).round())
  }

  fn refresh(&mut self, classification: &ObjectClassification) {
    self.updates_remaining = TRANSIENT_BOX_UPDATE_COUNT;
    self.score = classification.score;
    self.screen_box = classification.bbox;
  }
}

/// 一轮更新中的创建、复用与销毁
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolUpdate {
  pub created: Vec<u64>,
  pub refreshed: Vec<u64>,
  pub destroyed: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct MarkerPool {
  markers: Vec<Marker>,
  screen: ImageSize,
  next_id: u64,
  next_sort_order: u64,
}

impl MarkerPool {
  pub fn new(screen: ImageSize) -> Self {
    Self {
      markers: Vec::new(),
      screen,
      next_id: 0,
      next_sort_order: 0,
    }
  }

  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  pub fn len(&self) -> usize {
    self.markers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.markers.is_empty()
  }

  pub fn get(&self, id: u64) -> Option<&Marker> {
    self.markers.iter().find(|m| m.id == id)
  }

  pub fn clear(&mut self) {
    self.markers.clear();
  }

  /// 应用一轮屏幕坐标下的分类结果
  pub fn set_object_classifications<P: SceneProjector>(
    &mut self,
    classifications: &[ObjectClassification],
    projector: &P,
  ) -> PoolUpdate {
    let mut update = PoolUpdate::default();

    self.markers.retain(|m| {
      if m.updates_remaining == 0 {
        update.destroyed.push(m.id);
        false
      } else {
        true
      }
    });

    for marker in self.markers.iter_mut() {
      marker.updates_remaining -= 1;
    }

    for classification in classifications {
      self.add_object_classification(classification, projector, &mut update);
    }

    debug!(
      "标注框更新: 新建 {}, 复用 {}, 销毁 {}",
      update.created.len(),
      update.refreshed.len(),
      update.destroyed.len()
    );

    update
  }

  fn add_object_classification<P: SceneProjector>(
    &mut self,
    classification: &ObjectClassification,
    projector: &P,
    update: &mut PoolUpdate,
  ) {
    let mut middle = classification.bbox.middle_point();
    // 图像坐标 y 向下，场景投射使用 y 向上
    middle.y = self.screen.height - middle.y;

    let Some(hit) = projector.raycast(middle) else {
      // 无法投射时只按标签复用，不创建新框
      if let Some(index) = self.find_close_marker(&classification.label, None) {
        let marker = &mut self.markers[index];
        debug!("在原位置复用标注框: {:?}", marker.world_position);
        marker.refresh(classification);
        update.refreshed.push(marker.id);
      }
      return;
    };

    if let Some(index) = self.find_close_marker(&classification.label, Some(&hit)) {
      let marker = &mut self.markers[index];
      debug!("复用标注框: {:?}", hit);
      marker.refresh(classification);
      update.refreshed.push(marker.id);
      return;
    }

    let distance_per_pixel = distance_per_pixel(projector, middle, &hit);
    let marker = self.new_marker(classification, hit, distance_per_pixel);
    debug!("新建标注框: {:?}", hit);
    update.created.push(marker.id);
    self.markers.push(marker);
  }

  /// 在同标签的框中找离 `center` 最近的一个；`center` 为空时取第一个
  fn find_close_marker(&self, label: &str, center: Option<&WorldPosition>) -> Option<usize> {
    let mut candidates = self
      .markers
      .iter()
      .enumerate()
      .filter(|(_, m)| m.label == label);

    match center {
      None => candidates.next().map(|(i, _)| i),
      Some(center) => candidates
        .min_by(|(_, a), (_, b)| {
          world_distance(&a.world_position, center).total_cmp(&world_distance(&b.world_position, center))
        })
        .map(|(i, _)| i),
    }
  }

  fn new_marker(
    &mut self,
    classification: &ObjectClassification,
    position: WorldPosition,
    distance_per_pixel: f32,
  ) -> Marker {
    let id = self.next_id;
    self.next_id += 1;
    self.next_sort_order += 1;

    let scale = LABELED_BOUNDING_BOX_SCALE * RECTANGLE_SCALE;
    Marker {
      id,
      world_position: position,
      screen_box: classification.bbox,
      width: classification.bbox.width() * distance_per_pixel / scale,
      height: classification.bbox.height() * distance_per_pixel / scale,
      color: color_for_label(&classification.label).unwrap_or(DEFAULT_MARKER_COLOR),
      label: classification.label.clone(),
      score: classification.score,
      updates_remaining: TRANSIENT_BOX_UPDATE_COUNT,
      sort_order: self.next_sort_order,
    }
  }
}

/// 向上下左右各探测若干像素，求每像素对应的平均场景距离
fn distance_per_pixel<P: SceneProjector>(projector: &P, middle: Point2D, hit: &WorldPosition) -> f32 {
  let probes = [(0.0, -1.0), (-1.0, 0.0), (0.0, 1.0), (1.0, 0.0)].map(|(dx, dy)| {
    projector.raycast(Point2D::new(
      middle.x + dx * SURROUNDING_PIXEL_DISTANCE,
      middle.y + dy * SURROUNDING_PIXEL_DISTANCE,
    ))
  });

  let hits: Vec<WorldPosition> = probes.into_iter().flatten().collect();
  if hits.is_empty() {
    return 0.0;
  }

  hits
    .iter()
    .map(|p| world_distance(p, hit) / hits.len() as f32 / SURROUNDING_PIXEL_DISTANCE)
    .sum()
}
