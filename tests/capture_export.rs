// 该文件是 Kuangxuan （框选） 项目的一部分。
// tests/capture_export.rs - 截图导出测试
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

use std::fs;

use kuangxuan::{
  geometry::{BoundingBox, Point2D},
  model::ObjectClassification,
  output::{ANNOTATIONS_FILE, CaptureExportFormat, CaptureExporter, coco::CocoDocument},
};
use tempfile::tempdir;

fn item(label: &str, label_id: i32) -> ObjectClassification {
  ObjectClassification::new(
    label,
    label_id,
    BoundingBox::new(Point2D::new(10.0, 20.0), Point2D::new(50.0, 80.0)),
    0.9,
  )
}

fn read_document(exporter: &CaptureExporter) -> CocoDocument {
  let text = fs::read_to_string(exporter.storage_path().join(ANNOTATIONS_FILE)).unwrap();
  serde_json::from_str(&text).unwrap()
}

#[test]
fn consecutive_captures_continue_ids() {
  let tmp = tempdir().unwrap();
  let mut exporter = CaptureExporter::open(tmp.path()).unwrap();

  let first = exporter
    .export_capture(
      CaptureExportFormat::Both,
      Some(b"labeled-0"),
      Some(b"original-0"),
      (1280, 720),
      Some(&[item("toy_1", 5), item("book_2", 3)]),
    )
    .unwrap();
  let second = exporter
    .export_capture(
      CaptureExportFormat::Both,
      Some(b"labeled-1"),
      Some(b"original-1"),
      (1280, 720),
      Some(&[item("snack_3", 9)]),
    )
    .unwrap();

  assert_eq!(first.image_id, Some(0));
  assert_eq!(second.image_id, Some(1));
  assert_eq!(first.annotation_ids, vec![0, 1]);
  assert_eq!(second.annotation_ids, vec![2]);

  let document = read_document(&exporter);
  assert_eq!(document.images.len(), 2);
  assert_eq!(document.annotations.len(), 3);
  assert_eq!(document.annotations[2].image_id, 1);
  assert_eq!(document.annotations[2].category_id, 9);

  assert_eq!(fs::read(exporter.labeled_path().join("labeled_1.jpg")).unwrap(), b"labeled-1");
  assert_eq!(fs::read(exporter.storage_path().join("image_1.jpg")).unwrap(), b"original-1");
}

#[test]
fn reopening_keeps_images_and_regenerates_metadata() {
  let tmp = tempdir().unwrap();
  {
    let mut exporter = CaptureExporter::open(tmp.path()).unwrap();
    exporter
      .export_capture(
        CaptureExportFormat::OriginalImageWithJsonAnnotations,
        None,
        Some(b"original"),
        (640, 360),
        Some(&[item("toy_1", 5)]),
      )
      .unwrap();
  }

  let mut exporter = CaptureExporter::open(tmp.path()).unwrap();
  assert_eq!(exporter.document().images.len(), 1);
  assert_eq!(exporter.document().categories.len(), 64);
  assert_eq!(exporter.document().info.version, "1.0");

  let receipt = exporter
    .export_capture(
      CaptureExportFormat::OriginalImageWithJsonAnnotations,
      None,
      Some(b"original"),
      (640, 360),
      Some(&[]),
    )
    .unwrap();
  assert_eq!(receipt.image_id, Some(1));
  assert!(receipt.annotation_ids.is_empty());
}

#[test]
fn delete_all_resets_ids() {
  let tmp = tempdir().unwrap();
  let mut exporter = CaptureExporter::open(tmp.path()).unwrap();
  for _ in 0..2 {
    exporter
      .export_capture(
        CaptureExportFormat::Both,
        Some(b"l"),
        Some(b"o"),
        (8, 8),
        Some(&[item("toy_1", 5)]),
      )
      .unwrap();
  }

  exporter.delete_all_captures().unwrap();
  assert!(read_document(&exporter).images.is_empty());

  let receipt = exporter
    .export_capture(
      CaptureExportFormat::Both,
      Some(b"l"),
      Some(b"o"),
      (8, 8),
      Some(&[item("toy_1", 5)]),
    )
    .unwrap();
  assert_eq!(receipt.image_id, Some(0));
  assert_eq!(receipt.annotation_ids, vec![0]);
  assert_eq!(
    receipt.labeled_image.unwrap(),
    exporter.labeled_path().join("labeled_0.jpg")
  );
}

#[test]
fn failed_write_keeps_previous_document() {
  let tmp = tempdir().unwrap();
  let mut exporter = CaptureExporter::open(tmp.path()).unwrap();
  exporter
    .export_capture(
      CaptureExportFormat::OriginalImageWithJsonAnnotations,
      None,
      Some(b"o"),
      (8, 8),
      Some(&[item("toy_1", 5)]),
    )
    .unwrap();

  // 同名目录占住下一张图像的文件名，使写入失败
  fs::create_dir(exporter.storage_path().join("image_1.jpg")).unwrap();
  assert!(
    exporter
      .export_capture(
        CaptureExportFormat::OriginalImageWithJsonAnnotations,
        None,
        Some(b"o"),
        (8, 8),
        Some(&[item("toy_1", 5)]),
      )
      .is_err()
  );

  assert_eq!(exporter.document().images.len(), 1);
  assert_eq!(read_document(&exporter).images.len(), 1);
}
