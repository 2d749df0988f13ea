// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/draw.rs - 分类结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;

use crate::{
  frame::{CameraFrame, FrameError, encode_jpeg},
  geometry::BoundingBox,
  marker::{DEFAULT_MARKER_COLOR, color_for_label},
  model::ObjectClassification,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BORDER_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件")]
  InvalidFont,
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 在图像上绘制分类框。没有字体时只画边框。
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont)?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 把 `items`（图像坐标）画到 `frame` 上并重新编码为 JPEG
  pub fn label_frame(
    &self,
    frame: &CameraFrame,
    items: &[ObjectClassification],
  ) -> Result<Vec<u8>, DrawError> {
    let mut image = frame.to_rgb_image()?;
    self.draw_classifications(&mut image, items);
    Ok(encode_jpeg(&image)?)
  }

  pub fn draw_classifications(&self, image: &mut RgbImage, items: &[ObjectClassification]) {
    for item in items {
      let color = color_for_label(&item.label).unwrap_or(DEFAULT_MARKER_COLOR);
      let label = format!("{} - {}%", item.label, (item.score * 100.0).round() as i32);
      self.draw_bbox_with_label(image, &item.bbox, &label, color);
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox.top_left.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.top_left.y.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.bottom_right.x.ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox.bottom_right.y.ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for thickness in 0..BORDER_THICKNESS {
      let x_min_t = (x_min + thickness).min(x_max) as u32;
      let y_min_t = (y_min + thickness).min(y_max) as u32;
      let x_max_t = (x_max - thickness).max(x_min) as u32;
      let y_max_t = (y_max - thickness).max(y_min) as u32;

      for x in x_min_t..=x_max_t {
        image.put_pixel(x, y_min_t, Rgb(color));
        image.put_pixel(x, y_max_t, Rgb(color));
      }
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t, y, Rgb(color));
        image.put_pixel(x_max_t, y, Rgb(color));
      }
    }

    let Some(font) = &self.font else {
      return;
    };

    // 标签放在边框上方，超出图像时截断
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;
    let label_height = self.label_text_height as u32;

    if label_width > 0 {
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, Rgb(color));
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Point2D;

  #[test]
  fn border_uses_label_color() {
    let mut image = RgbImage::new(64, 64);
    let item = ObjectClassification::new(
      "cereal_box_1",
      1,
      BoundingBox::new(Point2D::new(10.0, 10.0), Point2D::new(40.0, 30.0)),
      0.8,
    );
    Draw::default().draw_classifications(&mut image, &[item]);

    let expected = color_for_label("cereal_box_1").unwrap();
    assert_eq!(image.get_pixel(10, 10).0, expected);
    assert_eq!(image.get_pixel(40, 30).0, expected);
    assert_eq!(image.get_pixel(25, 20).0, [0, 0, 0]);
  }

  #[test]
  fn boxes_outside_image_are_skipped() {
    let mut image = RgbImage::new(16, 16);
    let item = ObjectClassification::new(
      "toy",
      1,
      BoundingBox::new(Point2D::new(100.0, 100.0), Point2D::new(200.0, 200.0)),
      0.8,
    );
    Draw::default().draw_classifications(&mut image, &[item]);
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      Draw::with_font_file(&dir.path().join("none.ttf")),
      Err(DrawError::IoError(_))
    ));
  }
}
