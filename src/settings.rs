// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/settings.rs - 设置与模型地址管理
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

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeSender, OutboundEvent};
use crate::utils::write_atomically;

/// 设置在键值存储中的固定键
pub const SETTINGS_KEY: &str = "com.unity3d.synthdet-viewer-app.SettingsPlayerPrefKey";

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.75;

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("模型地址索引越界: {0}")]
  IndexOutOfRange(usize),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelEndpoint {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
}

impl ModelEndpoint {
  pub fn new(name: Option<&str>, url: Option<&str>) -> Self {
    Self {
      name: name.map(str::to_string),
      url: url.map(str::to_string),
    }
  }

  pub fn is_valid(&self) -> bool {
    self.url.as_deref().is_some_and(|url| !url.is_empty())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsModel {
  #[serde(default = "default_threshold")]
  pub prediction_score_threshold: f32,
  #[serde(default)]
  pub model_endpoints: Vec<ModelEndpoint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub active_endpoint: Option<ModelEndpoint>,
}

fn default_threshold() -> f32 {
  DEFAULT_SCORE_THRESHOLD
}

impl Default for SettingsModel {
  fn default() -> Self {
    Self {
      prediction_score_threshold: DEFAULT_SCORE_THRESHOLD,
      model_endpoints: Vec::new(),
      active_endpoint: None,
    }
  }
}

impl SettingsModel {
  pub fn active_url(&self) -> Option<&str> {
    self.active_endpoint.as_ref().and_then(|e| e.url.as_deref())
  }

  /// 当前激活的地址已不在列表中时，退回到列表中第一个有效地址，没有则置空
  pub fn reconcile_active_endpoint(&mut self) {
    let still_listed = match &self.active_endpoint {
      Some(active) => self.model_endpoints.contains(active),
      None => return,
    };

    if !still_listed {
      self.active_endpoint = self
        .model_endpoints
        .iter()
        .find(|e| e.is_valid())
        .cloned();
      debug!("激活的模型地址已变更为: {:?}", self.active_endpoint);
    }
  }
}

/// 平台键值存储
pub trait KeyValueStore {
  fn get(&self, key: &str) -> Option<String>;
  fn set(&mut self, key: &str, value: String);
  fn flush(&mut self) -> Result<(), SettingsError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
  values: BTreeMap<String, String>,
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: String) {
    self.values.insert(key.to_string(), value);
  }

  fn flush(&mut self) -> Result<(), SettingsError> {
    Ok(())
  }
}

/// 以单个 JSON 对象文件保存的键值存储
#[derive(Debug)]
pub struct JsonFileStore {
  path: PathBuf,
  values: BTreeMap<String, String>,
}

impl JsonFileStore {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
    let path = path.as_ref().to_path_buf();
    let values = if path.exists() {
      let text = std::fs::read_to_string(&path)?;
      serde_json::from_str(&text)?
    } else {
      BTreeMap::new()
    };

    Ok(Self { path, values })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl KeyValueStore for JsonFileStore {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: String) {
    self.values.insert(key.to_string(), value);
  }

  fn flush(&mut self) -> Result<(), SettingsError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(&self.values)?;
    write_atomically(&self.path, text.as_bytes())?;
    Ok(())
  }
}

/// 设置的唯一来源。每次修改后都会把完整的设置 JSON 推送给原生端。
pub struct SettingsStore<S: KeyValueStore> {
  store: S,
  model: SettingsModel,
  notifier: Option<BridgeSender>,
}

impl<S: KeyValueStore> SettingsStore<S> {
  pub fn load(store: S) -> Self {
    let model = match store.get(SETTINGS_KEY) {
      Some(json) => match serde_json::from_str::<SettingsModel>(&json) {
        Ok(model) => model,
        Err(e) => {
          warn!("已保存的设置无法解析，使用默认设置: {}", e);
          SettingsModel::default()
        }
      },
      None => {
        info!("未找到已保存的设置，使用默认设置");
        SettingsModel::default()
      }
    };

    Self {
      store,
      model,
      notifier: None,
    }
  }

  pub fn with_notifier(mut self, notifier: BridgeSender) -> Self {
    self.notifier = Some(notifier);
    self.notify();
    self
  }

  pub fn model(&self) -> &SettingsModel {
    &self.model
  }

  pub fn threshold(&self) -> f32 {
    self.model.prediction_score_threshold
  }

  pub fn active_url(&self) -> Option<&str> {
    self.model.active_url()
  }

  pub fn to_json(&self) -> Result<String, SettingsError> {
    Ok(serde_json::to_string(&self.model)?)
  }

  pub fn set_settings_model(&mut self, mut model: SettingsModel) {
    model.prediction_score_threshold = model.prediction_score_threshold.clamp(0.0, 1.0);
    model.reconcile_active_endpoint();
    self.model = model;
    self.notify();
  }

  pub fn set_settings_model_from_json(&mut self, json: &str) -> Result<(), SettingsError> {
    let model = serde_json::from_str::<SettingsModel>(json)?;
    self.set_settings_model(model);
    Ok(())
  }

  pub fn set_active_endpoint(&mut self, endpoint: Option<ModelEndpoint>) {
    self.model.active_endpoint = endpoint;
    self.notify();
  }

  pub fn set_active_endpoint_from_json(&mut self, json: &str) -> Result<(), SettingsError> {
    let endpoint = serde_json::from_str::<ModelEndpoint>(json)?;
    self.set_active_endpoint(Some(endpoint));
    Ok(())
  }

  pub fn set_threshold(&mut self, threshold: f32) {
    self.model.prediction_score_threshold = threshold.clamp(0.0, 1.0);
    self.notify();
  }

  pub fn add_endpoint(&mut self, endpoint: ModelEndpoint) {
    self.model.model_endpoints.push(endpoint);
    self.notify();
  }

  /// 编辑列表中的地址；被编辑的若是当前激活地址，激活地址随之更新
  pub fn update_endpoint(
    &mut self,
    index: usize,
    endpoint: ModelEndpoint,
  ) -> Result<(), SettingsError> {
    let slot = self
      .model
      .model_endpoints
      .get_mut(index)
      .ok_or(SettingsError::IndexOutOfRange(index))?;

    if self.model.active_endpoint.as_ref() == Some(&*slot) {
      self.model.active_endpoint = Some(endpoint.clone());
    }
    *slot = endpoint;

    self.model.reconcile_active_endpoint();
    self.notify();
    Ok(())
  }

  pub fn remove_endpoint(&mut self, index: usize) -> Result<ModelEndpoint, SettingsError> {
    if index >= self.model.model_endpoints.len() {
      return Err(SettingsError::IndexOutOfRange(index));
    }
    let removed = self.model.model_endpoints.remove(index);
    self.model.reconcile_active_endpoint();
    self.notify();
    Ok(removed)
  }

  pub fn save(&mut self) -> Result<(), SettingsError> {
    let json = self.to_json()?;
    self.store.set(SETTINGS_KEY, json);
    self.store.flush()?;
    debug!("设置已保存");
    Ok(())
  }

  pub fn into_store(self) -> S {
    self.store
  }

  fn notify(&self) {
    let Some(notifier) = &self.notifier else {
      return;
    };
    match self.to_json() {
      Ok(json) => notifier.notify(OutboundEvent::SettingsJsonDidChange(json)),
      Err(e) => warn!("无法序列化设置: {}", e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bridge;

  fn endpoint(name: &str, url: &str) -> ModelEndpoint {
    ModelEndpoint::new(Some(name), Some(url))
  }

  fn store_with(endpoints: Vec<ModelEndpoint>, active: usize) -> SettingsStore<MemoryStore> {
    let mut store = SettingsStore::load(MemoryStore::default());
    let model = SettingsModel {
      active_endpoint: endpoints.get(active).cloned(),
      model_endpoints: endpoints,
      ..SettingsModel::default()
    };
    store.set_settings_model(model);
    store
  }

  #[test]
  fn defaults_when_nothing_saved() {
    let store = SettingsStore::load(MemoryStore::default());
    assert_eq!(store.threshold(), DEFAULT_SCORE_THRESHOLD);
    assert!(store.model().model_endpoints.is_empty());
    assert!(store.active_url().is_none());
  }

  #[test]
  fn json_uses_camel_case_and_omits_missing_active() {
    let mut store = SettingsStore::load(MemoryStore::default());
    store.add_endpoint(ModelEndpoint::new(None, Some("https://a")));
    let json = store.to_json().unwrap();
    assert_eq!(
      json,
      r#"{"predictionScoreThreshold":0.75,"modelEndpoints":[{"url":"https://a"}]}"#
    );
  }

  #[test]
  fn removing_active_falls_back_to_first_valid() {
    let mut store = store_with(
      vec![
        endpoint("a", "https://a"),
        ModelEndpoint::new(Some("blank"), Some("")),
        endpoint("c", "https://c"),
      ],
      0,
    );
    store.remove_endpoint(0).unwrap();
    assert_eq!(store.active_url(), Some("https://c"));
  }

  #[test]
  fn removing_last_endpoint_clears_active() {
    let mut store = store_with(vec![endpoint("a", "https://a")], 0);
    store.remove_endpoint(0).unwrap();
    assert!(store.model().active_endpoint.is_none());
  }

  #[test]
  fn removing_other_endpoint_keeps_active() {
    let mut store = store_with(vec![endpoint("a", "https://a"), endpoint("b", "https://b")], 1);
    store.remove_endpoint(0).unwrap();
    assert_eq!(store.active_url(), Some("https://b"));
  }

  #[test]
  fn editing_active_endpoint_follows_edit() {
    let mut store = store_with(vec![endpoint("a", "https://a")], 0);
    store
      .update_endpoint(0, endpoint("a", "https://a2"))
      .unwrap();
    assert_eq!(store.active_url(), Some("https://a2"));
  }

  #[test]
  fn out_of_range_index_is_error() {
    let mut store = SettingsStore::load(MemoryStore::default());
    assert!(matches!(
      store.remove_endpoint(3),
      Err(SettingsError::IndexOutOfRange(3))
    ));
  }

  #[test]
  fn save_and_reload() {
    let mut store = store_with(vec![endpoint("a", "https://a")], 0);
    store.set_threshold(1.7);
    store.save().unwrap();
    let reloaded = SettingsStore::load(store.into_store());
    assert_eq!(reloaded.threshold(), 1.0);
    assert_eq!(reloaded.active_url(), Some("https://a"));
  }

  #[test]
  fn unparsable_saved_settings_fall_back_to_default() {
    let mut kv = MemoryStore::default();
    kv.set(SETTINGS_KEY, "not json".to_string());
    let store = SettingsStore::load(kv);
    assert_eq!(store.model(), &SettingsModel::default());
  }

  #[test]
  fn every_mutation_is_pushed_to_native() {
    let (sender, rx) = bridge::channel();
    let mut store = SettingsStore::load(MemoryStore::default()).with_notifier(sender);
    store.set_threshold(0.6);
    store
      .set_active_endpoint_from_json(r#"{"name":"n","url":"https://n"}"#)
      .unwrap();

    let events: Vec<_> = rx
      .try_iter()
      .map(|m| OutboundEvent::try_from(m).unwrap())
      .collect();
    assert_eq!(events.len(), 3);
    let OutboundEvent::SettingsJsonDidChange(last) = &events[2] else {
      panic!("unexpected event: {:?}", events[2]);
    };
    let model: SettingsModel = serde_json::from_str(last).unwrap();
    assert_eq!(model.active_url(), Some("https://n"));
    assert!((model.prediction_score_threshold - 0.6).abs() < 1e-6);
  }

  #[test]
  fn json_file_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs").join("settings.json");
    let mut kv = JsonFileStore::open(&path).unwrap();
    kv.set("k", "v".to_string());
    kv.flush().unwrap();
    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.get("k").as_deref(), Some("v"));
  }
}
