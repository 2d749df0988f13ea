// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/model/http_classifier.rs - HTTP 推理服务客户端
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

//! # HTTP 推理客户端
//!
//! 将一帧 JPEG 图像以 `POST` 方式发送到推理服务，解析返回的 JSON 数组：
//!
//! ```json
//! [{"label": "book_01", "label_id": 3,
//!   "box": {"top_left": {"x": 10, "y": 20}, "bottom_right": {"x": 30, "y": 40}},
//!   "score": 0.91}]
//! ```
//!
//! 推理服务通常部署在自签名证书之后，因此客户端接受任何证书。
//!
//! ```no_run
//! use kuangxuan::{FromUrl, model::HttpClassifierBuilder};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("https://10.0.0.2:8443/predictions/synthdet?timeout_ms=1500")?;
//! let classifier = HttpClassifierBuilder::from_url(&url)?.build()?;
//! let jpeg = std::fs::read("frame.jpg")?;
//! let items = classifier.classify_bytes(&jpeg)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::CameraFrame,
  model::{Model, ObjectClassification},
};

/// 单次请求的超时时间
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

/// 同时进行中的请求上限
pub const MAXIMUM_ACTIVE_REQUESTS: usize = 5;

const IMAGE_CONTENT_TYPE: &str = "image/jpg";

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("无效的模型地址: {0}")]
  InvalidEndpoint(String),
  #[error("请求超时 ({0:?})")]
  RequestTimeout(Duration),
  #[error("网络错误: {0}")]
  NetworkError(reqwest::Error),
  #[error("推理错误: {0}")]
  PredictionError(String),
}

/// 校验模型地址：必须是带主机名的 http/https 绝对地址
pub fn parse_endpoint(url: Option<&str>) -> Result<Url, ClassifyError> {
  let raw = match url {
    Some(raw) if !raw.trim().is_empty() => raw.trim(),
    _ => return Err(ClassifyError::InvalidEndpoint("<空>".to_string())),
  };

  let parsed = Url::parse(raw).map_err(|e| {
    ClassifyError::InvalidEndpoint(format!("{}: {}", raw, e))
  })?;

  match parsed.scheme() {
    "http" | "https" if parsed.has_host() => Ok(parsed),
    _ => Err(ClassifyError::InvalidEndpoint(raw.to_string())),
  }
}

/// HTTP 推理客户端，可在多个地址之间共享连接池
#[derive(Debug, Clone)]
pub struct HttpClassifier {
  client: Client,
  timeout: Duration,
}

impl HttpClassifier {
  pub fn new(timeout: Duration) -> Result<Self, ClassifyError> {
    let client = Client::builder()
      .timeout(timeout)
      .danger_accept_invalid_certs(true)
      .build()
      .map_err(ClassifyError::NetworkError)?;

    Ok(Self { client, timeout })
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// 校验地址后发送请求；地址无效时不会产生任何网络访问
  pub fn classify_at(
    &self,
    endpoint: Option<&str>,
    jpeg: &[u8],
  ) -> Result<Vec<ObjectClassification>, ClassifyError> {
    let url = parse_endpoint(endpoint)?;
    self.classify(&url, jpeg)
  }

  pub fn classify(
    &self,
    endpoint: &Url,
    jpeg: &[u8],
  ) -> Result<Vec<ObjectClassification>, ClassifyError> {
    debug!("发送 {} 字节图像到 {}", jpeg.len(), endpoint);

    let response = self
      .client
      .post(endpoint.clone())
      .header(CONTENT_TYPE, IMAGE_CONTENT_TYPE)
      .body(jpeg.to_vec())
      .send()
      .map_err(|e| self.map_transport_error(e))?;

    let status = response.status();
    let body = response.text().map_err(|e| self.map_transport_error(e))?;

    if !status.is_success() {
      error!("推理服务返回错误状态 {}: {}", status, body);
      return Err(ClassifyError::PredictionError(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body
      )));
    }

    parse_classifications(&body)
  }

  fn map_transport_error(&self, err: reqwest::Error) -> ClassifyError {
    if err.is_timeout() {
      warn!("请求超过 {:?} 未完成，放弃本次结果", self.timeout);
      ClassifyError::RequestTimeout(self.timeout)
    } else {
      ClassifyError::NetworkError(err)
    }
  }
}

/// 解析推理服务返回的 JSON 数组
pub fn parse_classifications(body: &str) -> Result<Vec<ObjectClassification>, ClassifyError> {
  serde_json::from_str::<Vec<ObjectClassification>>(body).map_err(|e| {
    error!("无法解析推理结果: {}", body);
    ClassifyError::PredictionError(e.to_string())
  })
}

pub struct HttpClassifierBuilder {
  endpoint: Url,
  timeout: Duration,
}

impl FromUrl for HttpClassifierBuilder {
  type Error = ClassifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut endpoint = parse_endpoint(Some(url.as_str()))?;

    let mut timeout = DEFAULT_REQUEST_TIMEOUT;
    let mut rest = Vec::new();
    for (k, v) in url.query_pairs() {
      if k == "timeout_ms" {
        let ms: u64 = v
          .parse()
          .map_err(|_| ClassifyError::InvalidEndpoint(format!("timeout_ms={}", v)))?;
        timeout = Duration::from_millis(ms);
      } else {
        rest.push((k.into_owned(), v.into_owned()));
      }
    }

    if rest.is_empty() {
      endpoint.set_query(None);
    } else {
      endpoint.query_pairs_mut().clear().extend_pairs(rest);
    }

    Ok(Self { endpoint, timeout })
  }
}

impl HttpClassifierBuilder {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  pub fn build(self) -> Result<EndpointClassifier, ClassifyError> {
    Ok(EndpointClassifier {
      inner: HttpClassifier::new(self.timeout)?,
      endpoint: self.endpoint,
    })
  }
}

/// 绑定到固定地址的推理客户端
pub struct EndpointClassifier {
  inner: HttpClassifier,
  endpoint: Url,
}

impl EndpointClassifier {
  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  pub fn classify_bytes(&self, jpeg: &[u8]) -> Result<Vec<ObjectClassification>, ClassifyError> {
    self.inner.classify(&self.endpoint, jpeg)
  }
}

impl Model for EndpointClassifier {
  type Input = CameraFrame;
  type Output = Vec<ObjectClassification>;
  type Error = ClassifyError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify_bytes(input.jpeg())
  }
}

/// 进行中请求计数。达到上限时新帧直接丢弃，不排队。
#[derive(Debug, Clone)]
pub struct InFlightLimiter {
  active: usize,
  ceiling: usize,
}

impl Default for InFlightLimiter {
  fn default() -> Self {
    Self::new(MAXIMUM_ACTIVE_REQUESTS)
  }
}

impl InFlightLimiter {
  pub fn new(ceiling: usize) -> Self {
    Self { active: 0, ceiling }
  }

  pub fn active(&self) -> usize {
    self.active
  }

  pub fn try_acquire(&mut self) -> bool {
    if self.active >= self.ceiling {
      return false;
    }
    self.active += 1;
    true
  }

  pub fn release(&mut self) {
    self.active = self.active.saturating_sub(1);
  }
}
