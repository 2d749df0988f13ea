// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/bridge.rs - 原生端与渲染端之间的消息通道
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

//! 消息以 `(目标对象, 方法名)` 为键，载荷为 UTF-8 JSON 文本或原始字节。
//!
//! 原生端 → 渲染端：
//! - `Settings.SetSettingsModelFromJson`（文本）
//! - `Settings.SaveSettings`
//! - `Settings.SetActiveEndpointFromJson`（文本）
//! - `ARSession.CaptureWithFormat`（文本）
//! - `ARSession.DeleteAllCaptures`
//!
//! 渲染端 → 原生端：
//! - `Native.arFoundationDidReceiveCameraFrame`（字节）
//! - `Native.settingsJsonDidChange`（文本）
//! - `Native.imageRequestHandler`（字节）

use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;
use tracing::warn;

pub const SETTINGS_OBJECT: &str = "Settings";
pub const SESSION_OBJECT: &str = "ARSession";
pub const NATIVE_OBJECT: &str = "Native";

#[derive(Error, Debug, PartialEq)]
pub enum BridgeError {
  #[error("未知消息: {0}.{1}")]
  UnknownMessage(String, String),
  #[error("消息 {0} 的载荷类型错误")]
  PayloadMismatch(String),
  #[error("消息通道已关闭")]
  Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
  Empty,
  Text(String),
  Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMessage {
  pub target: String,
  pub method: String,
  pub payload: Payload,
}

impl BridgeMessage {
  pub fn new(target: &str, method: &str, payload: Payload) -> Self {
    Self {
      target: target.to_string(),
      method: method.to_string(),
      payload,
    }
  }

  fn into_text(self) -> Result<String, BridgeError> {
    match self.payload {
      Payload::Text(text) => Ok(text),
      _ => Err(BridgeError::PayloadMismatch(self.method)),
    }
  }

  fn into_bytes(self) -> Result<Vec<u8>, BridgeError> {
    match self.payload {
      Payload::Bytes(bytes) => Ok(bytes),
      _ => Err(BridgeError::PayloadMismatch(self.method)),
    }
  }
}

/// 原生端发往渲染端的指令
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
  SetSettingsModelFromJson(String),
  SaveSettings,
  SetActiveEndpointFromJson(String),
  CaptureWithFormat(String),
  DeleteAllCaptures,
}

impl TryFrom<BridgeMessage> for InboundCommand {
  type Error = BridgeError;

  fn try_from(message: BridgeMessage) -> Result<Self, Self::Error> {
    match (message.target.as_str(), message.method.as_str()) {
      (SETTINGS_OBJECT, "SetSettingsModelFromJson") => {
        Ok(InboundCommand::SetSettingsModelFromJson(message.into_text()?))
      }
      (SETTINGS_OBJECT, "SaveSettings") => Ok(InboundCommand::SaveSettings),
      (SETTINGS_OBJECT, "SetActiveEndpointFromJson") => {
        Ok(InboundCommand::SetActiveEndpointFromJson(message.into_text()?))
      }
      (SESSION_OBJECT, "CaptureWithFormat") => {
        Ok(InboundCommand::CaptureWithFormat(message.into_text()?))
      }
      (SESSION_OBJECT, "DeleteAllCaptures") => Ok(InboundCommand::DeleteAllCaptures),
      _ => Err(BridgeError::UnknownMessage(message.target, message.method)),
    }
  }
}

impl From<InboundCommand> for BridgeMessage {
  fn from(command: InboundCommand) -> Self {
    match command {
      InboundCommand::SetSettingsModelFromJson(json) => {
        BridgeMessage::new(SETTINGS_OBJECT, "SetSettingsModelFromJson", Payload::Text(json))
      }
      InboundCommand::SaveSettings => {
        BridgeMessage::new(SETTINGS_OBJECT, "SaveSettings", Payload::Empty)
      }
      InboundCommand::SetActiveEndpointFromJson(json) => {
        BridgeMessage::new(SETTINGS_OBJECT, "SetActiveEndpointFromJson", Payload::Text(json))
      }
      InboundCommand::CaptureWithFormat(format) => {
        BridgeMessage::new(SESSION_OBJECT, "CaptureWithFormat", Payload::Text(format))
      }
      InboundCommand::DeleteAllCaptures => {
        BridgeMessage::new(SESSION_OBJECT, "DeleteAllCaptures", Payload::Empty)
      }
    }
  }
}

/// 渲染端发往原生端的通知
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
  CameraFrame(Vec<u8>),
  SettingsJsonDidChange(String),
  ImageRequest(Vec<u8>),
}

impl From<OutboundEvent> for BridgeMessage {
  fn from(event: OutboundEvent) -> Self {
    match event {
      OutboundEvent::CameraFrame(bytes) => BridgeMessage::new(
        NATIVE_OBJECT,
        "arFoundationDidReceiveCameraFrame",
        Payload::Bytes(bytes),
      ),
      OutboundEvent::SettingsJsonDidChange(json) => {
        BridgeMessage::new(NATIVE_OBJECT, "settingsJsonDidChange", Payload::Text(json))
      }
      OutboundEvent::ImageRequest(bytes) => {
        BridgeMessage::new(NATIVE_OBJECT, "imageRequestHandler", Payload::Bytes(bytes))
      }
    }
  }
}

impl TryFrom<BridgeMessage> for OutboundEvent {
  type Error = BridgeError;

  fn try_from(message: BridgeMessage) -> Result<Self, Self::Error> {
    match (message.target.as_str(), message.method.as_str()) {
      (NATIVE_OBJECT, "arFoundationDidReceiveCameraFrame") => {
        Ok(OutboundEvent::CameraFrame(message.into_bytes()?))
      }
      (NATIVE_OBJECT, "settingsJsonDidChange") => {
        Ok(OutboundEvent::SettingsJsonDidChange(message.into_text()?))
      }
      (NATIVE_OBJECT, "imageRequestHandler") => {
        Ok(OutboundEvent::ImageRequest(message.into_bytes()?))
      }
      _ => Err(BridgeError::UnknownMessage(message.target, message.method)),
    }
  }
}

/// 发往原生端的发送端，可克隆后交给各组件
#[derive(Debug, Clone)]
pub struct BridgeSender {
  tx: Sender<BridgeMessage>,
}

impl BridgeSender {
  pub fn send(&self, event: OutboundEvent) -> Result<(), BridgeError> {
    self
      .tx
      .send(event.into())
      .map_err(|_| BridgeError::Disconnected)
  }

  /// 发送失败只记录日志，原生端不在时渲染端照常运行
  pub fn notify(&self, event: OutboundEvent) {
    if let Err(e) = self.send(event) {
      warn!("通知原生端失败: {}", e);
    }
  }
}

pub fn channel() -> (BridgeSender, Receiver<BridgeMessage>) {
  let (tx, rx) = mpsc::channel();
  (BridgeSender { tx }, rx)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn inbound_commands_round_trip_through_messages() {
    let commands = [
      InboundCommand::SetSettingsModelFromJson("{}".to_string()),
      InboundCommand::SaveSettings,
      InboundCommand::SetActiveEndpointFromJson("{\"url\":\"x\"}".to_string()),
      InboundCommand::CaptureWithFormat("Both".to_string()),
      InboundCommand::DeleteAllCaptures,
    ];
    for command in commands {
      let message = BridgeMessage::from(command.clone());
      assert_eq!(InboundCommand::try_from(message).unwrap(), command);
    }
  }

  #[test]
  fn unknown_message_is_rejected() {
    let message = BridgeMessage::new("Settings", "Explode", Payload::Empty);
    assert_eq!(
      InboundCommand::try_from(message),
      Err(BridgeError::UnknownMessage(
        "Settings".to_string(),
        "Explode".to_string()
      ))
    );
  }

  #[test]
  fn payload_type_is_checked() {
    let message = BridgeMessage::new(SESSION_OBJECT, "CaptureWithFormat", Payload::Bytes(vec![1]));
    assert!(matches!(
      InboundCommand::try_from(message),
      Err(BridgeError::PayloadMismatch(_))
    ));
  }

  #[test]
  fn sender_reports_disconnect() {
    let (sender, rx) = channel();
    sender
      .send(OutboundEvent::SettingsJsonDidChange("{}".to_string()))
      .unwrap();
    let received = OutboundEvent::try_from(rx.recv().unwrap()).unwrap();
    assert_eq!(received, OutboundEvent::SettingsJsonDidChange("{}".to_string()));
    drop(rx);
    assert_eq!(
      sender.send(OutboundEvent::ImageRequest(vec![])),
      Err(BridgeError::Disconnected)
    );
  }
}
