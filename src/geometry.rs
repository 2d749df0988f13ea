// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/geometry.rs - 二维点与边界框
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

/// 图像坐标系中的点（y 轴向下）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
  pub x: f32,
  pub y: f32,
}

impl Point2D {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point2D) -> f32 {
    ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
  }
}

/// 图像尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageSize {
  pub width: f32,
  pub height: f32,
}

impl ImageSize {
  pub const fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  /// 宽高互换，对应旋转 90° 后的图像
  pub fn swapped(&self) -> Self {
    Self {
      width: self.height,
      height: self.width,
    }
  }
}

/// 坐标系的旋转方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
  /// 不旋转
  Up,
  /// 向左旋转 90°
  Left,
  /// 向右旋转 90°
  Right,
  /// 旋转 180°
  HalfTurn,
}

/// 设备屏幕方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenOrientation {
  Portrait,
  LandscapeLeft,
  PortraitUpsideDown,
  LandscapeRight,
  #[default]
  Unknown,
}

impl std::str::FromStr for ScreenOrientation {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "portrait" => Ok(ScreenOrientation::Portrait),
      "landscape-left" | "landscapeleft" => Ok(ScreenOrientation::LandscapeLeft),
      "portrait-upside-down" | "portraitupsidedown" => Ok(ScreenOrientation::PortraitUpsideDown),
      "landscape-right" | "landscaperight" => Ok(ScreenOrientation::LandscapeRight),
      "unknown" => Ok(ScreenOrientation::Unknown),
      other => Err(format!("未知的屏幕方向: {}", other)),
    }
  }
}

impl Rotation {
  /// 摄像头图像始终为横向（Home 键在右），按屏幕方向求出所需的坐标旋转
  pub fn for_orientation(orientation: ScreenOrientation) -> Option<Self> {
    match orientation {
      ScreenOrientation::Portrait => Some(Rotation::Left),
      ScreenOrientation::LandscapeRight => Some(Rotation::Up),
      ScreenOrientation::PortraitUpsideDown => Some(Rotation::Right),
      ScreenOrientation::LandscapeLeft => Some(Rotation::HalfTurn),
      ScreenOrientation::Unknown => None,
    }
  }
}

/// 边界框，`top_left` 各分量不大于 `bottom_right`（构造时不做检查）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
  pub top_left: Point2D,
  pub bottom_right: Point2D,
}

impl BoundingBox {
  pub const fn new(top_left: Point2D, bottom_right: Point2D) -> Self {
    Self {
      top_left,
      bottom_right,
    }
  }

  pub fn width(&self) -> f32 {
    self.bottom_right.x - self.top_left.x
  }

  pub fn height(&self) -> f32 {
    self.bottom_right.y - self.top_left.y
  }

  pub fn size(&self) -> ImageSize {
    ImageSize::new(self.width(), self.height())
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn top_right(&self) -> Point2D {
    Point2D::new(self.bottom_right.x, self.top_left.y)
  }

  pub fn bottom_left(&self) -> Point2D {
    Point2D::new(self.top_left.x, self.bottom_right.y)
  }

  pub fn middle_point(&self) -> Point2D {
    Point2D::new(
      (self.top_left.x + self.bottom_right.x) / 2.0,
      (self.top_left.y + self.bottom_right.y) / 2.0,
    )
  }

  /// 将边界框随坐标系一起旋转。
  ///
  /// `image_size` 为旋转前图像的尺寸。旋转的是坐标系，而不是框本身的朝向；
  /// 连续两次 `Left`（第二次使用互换后的尺寸）等价于一次 `HalfTurn`，
  /// `Left` 之后再 `Right` 则回到原框。
  pub fn rotated(&self, rotation: Rotation, image_size: ImageSize) -> BoundingBox {
    let ImageSize { width, height } = image_size;
    let (tl, br) = (self.top_left, self.bottom_right);

    match rotation {
      Rotation::Up => *self,
      Rotation::HalfTurn => BoundingBox::new(
        Point2D::new(width - br.x, height - br.y),
        Point2D::new(width - tl.x, height - tl.y),
      ),
      Rotation::Left => BoundingBox::new(
        Point2D::new(tl.y, width - br.x),
        Point2D::new(br.y, width - tl.x),
      ),
      Rotation::Right => BoundingBox::new(
        Point2D::new(height - br.y, tl.x),
        Point2D::new(height - tl.y, br.x),
      ),
    }
  }

  /// 两个角点同乘缩放因子，不以中心为基准
  pub fn scaled(&self, factor: f32) -> BoundingBox {
    BoundingBox::new(
      Point2D::new(self.top_left.x * factor, self.top_left.y * factor),
      Point2D::new(self.bottom_right.x * factor, self.bottom_right.y * factor),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> (BoundingBox, ImageSize) {
    (
      BoundingBox::new(Point2D::new(100.0, 100.0), Point2D::new(200.0, 300.0)),
      ImageSize::new(500.0, 600.0),
    )
  }

  #[test]
  fn rotate_left() {
    let (b, size) = sample();
    let expected = BoundingBox::new(Point2D::new(100.0, 300.0), Point2D::new(300.0, 400.0));
    assert_eq!(b.rotated(Rotation::Left, size), expected);
  }

  #[test]
  fn rotate_right() {
    let (b, size) = sample();
    let expected = BoundingBox::new(Point2D::new(300.0, 100.0), Point2D::new(500.0, 200.0));
    assert_eq!(b.rotated(Rotation::Right, size), expected);
  }

  #[test]
  fn rotate_half_turn() {
    let (b, size) = sample();
    let expected = BoundingBox::new(Point2D::new(300.0, 300.0), Point2D::new(400.0, 500.0));
    assert_eq!(b.rotated(Rotation::HalfTurn, size), expected);
  }

  #[test]
  fn rotate_up_is_identity() {
    let (b, size) = sample();
    assert_eq!(b.rotated(Rotation::Up, size), b);
  }

  #[test]
  fn left_twice_is_half_turn() {
    let (b, size) = sample();
    let twice = b
      .rotated(Rotation::Left, size)
      .rotated(Rotation::Left, size.swapped());
    assert_eq!(twice, b.rotated(Rotation::HalfTurn, size));
  }

  #[test]
  fn right_twice_is_half_turn() {
    let (b, size) = sample();
    let twice = b
      .rotated(Rotation::Right, size)
      .rotated(Rotation::Right, size.swapped());
    assert_eq!(twice, b.rotated(Rotation::HalfTurn, size));
  }

  #[test]
  fn left_then_right_is_identity() {
    let boxes = [
      BoundingBox::new(Point2D::new(0.0, 0.0), Point2D::new(10.0, 20.0)),
      BoundingBox::new(Point2D::new(12.0, 7.0), Point2D::new(640.0, 33.0)),
      BoundingBox::new(Point2D::new(300.0, 200.0), Point2D::new(1280.0, 960.0)),
    ];
    let size = ImageSize::new(1280.0, 960.0);
    for b in boxes {
      let back = b
        .rotated(Rotation::Left, size)
        .rotated(Rotation::Right, size.swapped());
      assert_eq!(back, b);
    }
  }

  #[test]
  fn scale_does_not_recenter() {
    let (b, _) = sample();
    let s = b.scaled(0.5);
    assert_eq!(s.top_left, Point2D::new(50.0, 50.0));
    assert_eq!(s.bottom_right, Point2D::new(100.0, 150.0));
  }

  #[test]
  fn derived_corners() {
    let (b, _) = sample();
    assert_eq!(b.top_right(), Point2D::new(200.0, 100.0));
    assert_eq!(b.bottom_left(), Point2D::new(100.0, 300.0));
    assert_eq!(b.middle_point(), Point2D::new(150.0, 200.0));
    assert_eq!(b.size(), ImageSize::new(100.0, 200.0));
    assert_eq!(b.area(), 20000.0);
  }

  #[test]
  fn orientation_rotation_table() {
    assert_eq!(
      Rotation::for_orientation(ScreenOrientation::Portrait),
      Some(Rotation::Left)
    );
    assert_eq!(
      Rotation::for_orientation(ScreenOrientation::LandscapeLeft),
      Some(Rotation::HalfTurn)
    );
    assert_eq!(Rotation::for_orientation(ScreenOrientation::Unknown), None);
  }

  #[test]
  fn box_json_uses_snake_case_corners() {
    let json = r#"{"top_left":{"x":1,"y":2},"bottom_right":{"x":3.5,"y":4}}"#;
    let b: BoundingBox = serde_json::from_str(json).unwrap();
    assert_eq!(b.top_left, Point2D::new(1.0, 2.0));
    assert_eq!(b.bottom_right, Point2D::new(3.5, 4.0));
  }
}
