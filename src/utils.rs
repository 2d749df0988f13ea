// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/utils.rs - 工具函数
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

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// 先写入同目录下的临时文件，再原子地重命名为目标文件。
/// 写入失败时目标文件保持原样。
pub fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let parent = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };

  let mut file = NamedTempFile::new_in(parent)?;
  file.write_all(bytes)?;
  file.as_file().sync_all()?;
  file.persist(path).map_err(|e| e.error)?;
  Ok(())
}
