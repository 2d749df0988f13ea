// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/session.rs - 会话上下文
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

//! 会话把所有状态集中在一个上下文对象里。
//!
//! 相机帧、原生端消息与推理完成事件都进入同一个队列，
//! 由 [`Session::pump`] 在主循环中逐个处理。推理请求在独立线程上执行，
//! 结果作为 [`SessionEvent::ClassificationFinished`] 送回队列；
//! 进行中请求计数只在主循环里修改。

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  bridge::{BridgeError, BridgeMessage, BridgeSender, InboundCommand, OutboundEvent},
  frame::{CameraFrame, ProcessingGeometry},
  geometry::{ImageSize, Rotation, ScreenOrientation},
  marker::{MarkerPool, PoolUpdate, SceneProjector},
  model::{
    ClassifyError, DEFAULT_REQUEST_TIMEOUT, HttpClassifier, InFlightLimiter,
    MAXIMUM_ACTIVE_REQUESTS, ObjectClassification, ScoreFilter, parse_endpoint,
  },
  output::{CaptureExportFormat, CaptureExporter, CaptureReceipt, ExportError},
  settings::{KeyValueStore, SettingsStore},
};

#[cfg(feature = "draw_labeled_image")]
use crate::output::Draw;

pub const DEFAULT_UPDATES_PER_SECOND: f32 = 5.0;
pub const DEFAULT_METERS_PER_PIXEL: f32 = 0.001;

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("推理客户端错误: {0}")]
  Classify(#[from] ClassifyError),
  #[error("导出错误: {0}")]
  Export(#[from] ExportError),
  #[error("未配置导出目录")]
  ExporterMissing,
}

/// 按墙钟限制处理帧率，间隔不足的帧直接丢弃
#[derive(Debug, Clone)]
pub struct FrameRateLimiter {
  interval: Duration,
  last: Option<Instant>,
}

impl FrameRateLimiter {
  /// `updates_per_second <= 0` 表示不限制
  pub fn new(updates_per_second: f32) -> Self {
    let interval = if updates_per_second > 0.0 {
      Duration::from_nanos((1e9 / updates_per_second as f64).round() as u64)
    } else {
      Duration::ZERO
    };
    Self {
      interval,
      last: None,
    }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn admit(&mut self, now: Instant) -> bool {
    if let Some(last) = self.last {
      if now.saturating_duration_since(last) < self.interval {
        return false;
      }
    }
    self.last = Some(now);
    true
  }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
  pub screen: ImageSize,
  pub orientation: ScreenOrientation,
  pub updates_per_second: f32,
  pub max_active_requests: usize,
  pub request_timeout: Duration,
  pub score_floor: Option<f32>,
  pub meters_per_pixel: f32,
  /// 把每个被接受的帧转发给原生端
  pub forward_frames: bool,
  /// 每次应用分类结果后按导出器的默认格式截图
  pub auto_capture: bool,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      screen: ImageSize::new(1920.0, 1080.0),
      orientation: ScreenOrientation::LandscapeRight,
      updates_per_second: DEFAULT_UPDATES_PER_SECOND,
      max_active_requests: MAXIMUM_ACTIVE_REQUESTS,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      score_floor: None,
      meters_per_pixel: DEFAULT_METERS_PER_PIXEL,
      forward_frames: false,
      auto_capture: false,
    }
  }
}

pub enum SessionEvent {
  Frame(CameraFrame),
  Bridge(BridgeMessage),
  Orientation(ScreenOrientation),
  ClassificationFinished {
    frame: CameraFrame,
    result: Result<Vec<ObjectClassification>, ClassifyError>,
  },
}

/// 向会话队列投递事件的句柄
#[derive(Debug, Clone)]
pub struct SessionHandle {
  tx: Sender<SessionEvent>,
}

impl SessionHandle {
  pub fn submit_frame(&self, frame: CameraFrame) -> Result<(), BridgeError> {
    self.send(SessionEvent::Frame(frame))
  }

  pub fn send_to_engine(&self, message: BridgeMessage) -> Result<(), BridgeError> {
    self.send(SessionEvent::Bridge(message))
  }

  pub fn set_orientation(&self, orientation: ScreenOrientation) -> Result<(), BridgeError> {
    self.send(SessionEvent::Orientation(orientation))
  }

  fn send(&self, event: SessionEvent) -> Result<(), BridgeError> {
    self.tx.send(event).map_err(|_| BridgeError::Disconnected)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
  pub frames_received: u64,
  pub frames_rate_limited: u64,
  pub frames_saturated: u64,
  pub frames_invalid_endpoint: u64,
  pub requests_dispatched: u64,
  pub cycles_applied: u64,
  pub classification_failures: u64,
  pub captures: u64,
}

pub struct Session<S: KeyValueStore, P: SceneProjector> {
  config: SessionConfig,
  geometry: ProcessingGeometry,
  settings: SettingsStore<S>,
  classifier: HttpClassifier,
  filter: ScoreFilter,
  in_flight: InFlightLimiter,
  rate: FrameRateLimiter,
  orientation: ScreenOrientation,
  pool: MarkerPool,
  projector: P,
  exporter: Option<CaptureExporter>,
  #[cfg(feature = "draw_labeled_image")]
  draw: Draw,
  notifier: Option<BridgeSender>,
  current: Option<(CameraFrame, Vec<ObjectClassification>)>,
  last_update: Option<PoolUpdate>,
  stats: SessionStats,
  tx: Sender<SessionEvent>,
  rx: Receiver<SessionEvent>,
}

impl<S: KeyValueStore, P: SceneProjector> Session<S, P> {
  pub fn new(
    config: SessionConfig,
    settings: SettingsStore<S>,
    projector: P,
  ) -> Result<Self, SessionError> {
    let (tx, rx) = mpsc::channel();
    let classifier = HttpClassifier::new(config.request_timeout)?;

    Ok(Self {
      geometry: ProcessingGeometry::for_screen(config.screen),
      filter: ScoreFilter::with_floor(config.score_floor),
      in_flight: InFlightLimiter::new(config.max_active_requests),
      rate: FrameRateLimiter::new(config.updates_per_second),
      orientation: config.orientation,
      pool: MarkerPool::new(config.screen),
      settings,
      classifier,
      projector,
      exporter: None,
      #[cfg(feature = "draw_labeled_image")]
      draw: Draw::default(),
      notifier: None,
      current: None,
      last_update: None,
      stats: SessionStats::default(),
      tx,
      rx,
      config,
    })
  }

  pub fn with_exporter(mut self, exporter: CaptureExporter) -> Self {
    self.exporter = Some(exporter);
    self
  }

  /// 同时作为设置变更的通知端
  pub fn with_notifier(mut self, notifier: BridgeSender) -> Self {
    self.settings = self.settings.with_notifier(notifier.clone());
    self.notifier = Some(notifier);
    self
  }

  #[cfg(feature = "draw_labeled_image")]
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn handle(&self) -> SessionHandle {
    SessionHandle {
      tx: self.tx.clone(),
    }
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn geometry(&self) -> &ProcessingGeometry {
    &self.geometry
  }

  pub fn settings(&self) -> &SettingsStore<S> {
    &self.settings
  }

  pub fn settings_mut(&mut self) -> &mut SettingsStore<S> {
    &mut self.settings
  }

  pub fn pool(&self) -> &MarkerPool {
    &self.pool
  }

  pub fn exporter(&self) -> Option<&CaptureExporter> {
    self.exporter.as_ref()
  }

  pub fn stats(&self) -> SessionStats {
    self.stats
  }

  pub fn last_update(&self) -> Option<&PoolUpdate> {
    self.last_update.as_ref()
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.active()
  }

  pub fn orientation(&self) -> ScreenOrientation {
    self.orientation
  }

  /// 最近一次应用的分类结果（图像坐标，已按阈值过滤）
  pub fn current_classifications(&self) -> Option<&[ObjectClassification]> {
    self.current.as_ref().map(|(_, items)| items.as_slice())
  }

  /// 处理队列中已有的全部事件，不阻塞
  pub fn pump(&mut self) -> usize {
    let mut handled = 0;
    while let Ok(event) = self.rx.try_recv() {
      self.handle_event(event);
      handled += 1;
    }
    handled
  }

  /// 最多等待 `timeout` 直到至少一个事件到达，然后处理队列
  pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
    match self.rx.recv_timeout(timeout) {
      Ok(event) => {
        self.handle_event(event);
        1 + self.pump()
      }
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
    }
  }

  /// 等待所有进行中的请求完成，超时返回 `false`
  pub fn drain(&mut self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while self.in_flight.active() > 0 {
      let now = Instant::now();
      if now >= deadline {
        warn!("仍有 {} 个请求未完成", self.in_flight.active());
        return false;
      }
      self.pump_timeout(deadline - now);
    }
    self.pump();
    true
  }

  pub fn handle_event(&mut self, event: SessionEvent) {
    match event {
      SessionEvent::Frame(frame) => self.on_frame(frame),
      SessionEvent::Bridge(message) => self.on_bridge_message(message),
      SessionEvent::Orientation(orientation) => {
        debug!("屏幕方向: {:?}", orientation);
        self.orientation = orientation;
      }
      SessionEvent::ClassificationFinished { frame, result } => {
        self.on_classification_finished(frame, result)
      }
    }
  }

  fn on_frame(&mut self, frame: CameraFrame) {
    self.stats.frames_received += 1;

    if !self.rate.admit(Instant::now()) {
      self.stats.frames_rate_limited += 1;
      return;
    }

    if !self.in_flight.try_acquire() {
      debug!("进行中请求已满，丢弃第 {} 帧", frame.index());
      self.stats.frames_saturated += 1;
      return;
    }

    let endpoint = match parse_endpoint(self.settings.active_url()) {
      Ok(endpoint) => endpoint,
      Err(e) => {
        error!("{}", e);
        self.in_flight.release();
        self.stats.frames_invalid_endpoint += 1;
        return;
      }
    };

    if self.config.forward_frames {
      if let Some(notifier) = &self.notifier {
        notifier.notify(OutboundEvent::CameraFrame(frame.jpeg().to_vec()));
      }
    }

    self.stats.requests_dispatched += 1;
    debug!("发送第 {} 帧到 {}", frame.index(), endpoint);

    let classifier = self.classifier.clone();
    let tx = self.tx.clone();
    thread::spawn(move || {
      let result = classifier.classify(&endpoint, frame.jpeg());
      if tx
        .send(SessionEvent::ClassificationFinished { frame, result })
        .is_err()
      {
        debug!("会话已结束，丢弃推理结果");
      }
    });
  }

  fn on_classification_finished(
    &mut self,
    frame: CameraFrame,
    result: Result<Vec<ObjectClassification>, ClassifyError>,
  ) {
    self.in_flight.release();

    let items = match result {
      Ok(items) => items,
      Err(e) => {
        error!("第 {} 帧分类失败: {}", frame.index(), e);
        self.stats.classification_failures += 1;
        return;
      }
    };

    let Some(rotation) = Rotation::for_orientation(self.orientation) else {
      error!("无效的屏幕方向: {:?}", self.orientation);
      return;
    };

    let filtered = self.filter.apply(items, self.settings.threshold());
    let on_screen: Vec<ObjectClassification> = filtered
      .iter()
      .map(|c| c.to_screen(rotation, self.geometry.image_size, self.geometry.scale_factor))
      .collect();
    self.current = Some((frame, filtered));

    let update = self.pool.set_object_classifications(&on_screen, &self.projector);
    debug!(
      "新建 {} 个，刷新 {} 个，移除 {} 个标记",
      update.created.len(),
      update.refreshed.len(),
      update.destroyed.len()
    );
    self.last_update = Some(update);
    self.stats.cycles_applied += 1;

    if self.config.auto_capture {
      if let Some(format) = self.exporter.as_ref().map(|e| e.default_format()) {
        if let Err(e) = self.capture(format) {
          error!("自动截图失败: {}", e);
        }
      }
    }
  }

  fn on_bridge_message(&mut self, message: BridgeMessage) {
    let command = match InboundCommand::try_from(message) {
      Ok(command) => command,
      Err(e) => {
        warn!("忽略原生端消息: {}", e);
        return;
      }
    };

    match command {
      InboundCommand::SetSettingsModelFromJson(json) => {
        if let Err(e) = self.settings.set_settings_model_from_json(&json) {
          error!("无法应用设置: {}", e);
        }
      }
      InboundCommand::SaveSettings => {
        if let Err(e) = self.settings.save() {
          error!("无法保存设置: {}", e);
        }
      }
      InboundCommand::SetActiveEndpointFromJson(json) => {
        if let Err(e) = self.settings.set_active_endpoint_from_json(&json) {
          error!("无法设置当前模型地址: {}", e);
        }
      }
      InboundCommand::CaptureWithFormat(format) => {
        if let Err(e) = self.capture_with_format(&format) {
          error!("截图失败: {}", e);
        }
      }
      InboundCommand::DeleteAllCaptures => {
        if let Err(e) = self.delete_all_captures() {
          error!("删除截图失败: {}", e);
        }
      }
    }
  }

  pub fn capture_with_format(&mut self, format: &str) -> Result<CaptureReceipt, SessionError> {
    let format: CaptureExportFormat = format.parse()?;
    self.capture(format)
  }

  /// 导出最近一次应用的帧与分类结果
  pub fn capture(&mut self, format: CaptureExportFormat) -> Result<CaptureReceipt, SessionError> {
    let labeled = if format.wants_labeled() {
      self.labeled_capture()
    } else {
      None
    };

    let exporter = self.exporter.as_mut().ok_or(SessionError::ExporterMissing)?;
    let (original, size, items) = match &self.current {
      Some((frame, items)) => (
        Some(frame.jpeg()),
        (frame.width(), frame.height()),
        Some(items.as_slice()),
      ),
      None => (None, (self.geometry.width(), self.geometry.height()), None),
    };

    let receipt = exporter.export_capture(format, labeled.as_deref(), original, size, items)?;
    self.stats.captures += 1;
    info!("截图完成: {:?}", receipt);

    if let (Some(bytes), Some(notifier)) = (labeled, &self.notifier) {
      notifier.notify(OutboundEvent::ImageRequest(bytes));
    }
    Ok(receipt)
  }

  #[cfg(feature = "draw_labeled_image")]
  fn labeled_capture(&self) -> Option<Vec<u8>> {
    let (frame, items) = self.current.as_ref()?;
    match self.draw.label_frame(frame, items) {
      Ok(bytes) => Some(bytes),
      Err(e) => {
        warn!("无法生成标注截图: {}", e);
        None
      }
    }
  }

  #[cfg(not(feature = "draw_labeled_image"))]
  fn labeled_capture(&self) -> Option<Vec<u8>> {
    None
  }

  pub fn delete_all_captures(&mut self) -> Result<(), SessionError> {
    let exporter = self.exporter.as_mut().ok_or(SessionError::ExporterMissing)?;
    exporter.delete_all_captures()?;
    Ok(())
  }
}
