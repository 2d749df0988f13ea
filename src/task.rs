// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
  frame::CameraFrame,
  marker::SceneProjector,
  model::Model,
  output::Render,
  session::{Session, SessionEvent, SessionStats},
  settings::KeyValueStore,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  type Output;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 只处理第一帧：推理、输出并返回结果
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;
  type Output = D;

  fn run_task(self, mut input: I, model: M, mut output: O) -> Result<D, Self::Error> {
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    Ok(result)
  }
}

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 按固定间隔把帧送入会话，直到输入耗尽、达到帧数或收到 Ctrl-C
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  frame_interval: Duration,
  drain_timeout: Duration,
  interrupt_handler: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      frame_interval: DEFAULT_FRAME_INTERVAL,
      drain_timeout: DEFAULT_DRAIN_TIMEOUT,
      interrupt_handler: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
    self.frame_interval = frame_interval;
    self
  }

  pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
    self.drain_timeout = drain_timeout;
    self
  }

  /// Ctrl-C 处理只能在进程内安装一次
  pub fn without_interrupt_handler(mut self) -> Self {
    self.interrupt_handler = false;
    self
  }
}

impl<I, S, P> Task<I, &mut Session<S, P>, ()> for ContinuousTask
where
  I: Iterator<Item = CameraFrame>,
  S: KeyValueStore,
  P: SceneProjector,
{
  type Error = anyhow::Error;
  type Output = SessionStats;

  fn run_task(self, input: I, session: &mut Session<S, P>, _: ()) -> Result<SessionStats, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    if self.interrupt_handler {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let mut frame_count = 0;
    for frame in input {
      frame_count += 1;
      let next_frame = Instant::now() + self.frame_interval;
      session.handle_event(SessionEvent::Frame(frame));

      loop {
        let now = Instant::now();
        if now >= next_frame {
          break;
        }
        session.pump_timeout(next_frame - now);
      }

      if self.frame_number.is_some_and(|n| frame_count >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_count);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    if !session.drain(self.drain_timeout) {
      warn!("等待推理结果超时");
    }

    let stats = session.stats();
    info!(
      "任务完成: 共 {} 帧，发送 {} 个请求，应用 {} 轮结果，失败 {} 次",
      stats.frames_received,
      stats.requests_dispatched,
      stats.cycles_applied,
      stats.classification_failures
    );
    Ok(stats)
  }
}
