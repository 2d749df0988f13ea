// 该文件是 Kuangxuan （框选） 项目的一部分。
// tests/common/mod.rs - 测试用的本地推理服务
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

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// 服务端收到的一次请求
#[derive(Debug, Clone)]
pub struct SeenRequest {
  pub method: String,
  pub content_type: Option<String>,
  pub body_len: usize,
}

pub struct Responder {
  pub url: String,
  pub seen: Receiver<SeenRequest>,
}

pub const TOY_RESPONSE: &str = r#"[
  {"label": "toy_1", "label_id": 5,
   "box": {"top_left": {"x": 100, "y": 100}, "bottom_right": {"x": 200, "y": 180}},
   "score": 0.9},
  {"label": "book_1", "label_id": 3,
   "box": {"top_left": {"x": 400, "y": 300}, "bottom_right": {"x": 500, "y": 380}},
   "score": 0.2}
]"#;

/// 启动一个最多处理 `requests` 次请求的 HTTP 服务，每次都返回相同的响应
pub fn spawn_responder(status: u16, body: &'static str, delay: Duration, requests: usize) -> Responder {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let port = listener.local_addr().unwrap().port();
  let (tx, seen) = mpsc::channel();

  thread::spawn(move || {
    for stream in listener.incoming().take(requests) {
      let Ok(mut stream) = stream else { continue };
      let mut reader = BufReader::new(stream.try_clone().unwrap());

      let mut request_line = String::new();
      if reader.read_line(&mut request_line).is_err() {
        continue;
      }
      let mut content_type = None;
      let mut content_length = 0;
      loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
          break;
        }
        if let Some((name, value)) = line.split_once(':') {
          let value = value.trim().to_string();
          match name.to_ascii_lowercase().as_str() {
            "content-type" => content_type = Some(value),
            "content-length" => content_length = value.parse().unwrap_or(0),
            _ => {}
          }
        }
      }
      let mut payload = vec![0u8; content_length];
      let _ = reader.read_exact(&mut payload);

      let _ = tx.send(SeenRequest {
        method: request_line.split_whitespace().next().unwrap_or("").to_string(),
        content_type,
        body_len: payload.len(),
      });

      thread::sleep(delay);
      let response = format!(
        "HTTP/1.1 {status} STATUS\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
      );
      let _ = stream.write_all(response.as_bytes());
      let _ = stream.flush();
    }
  });

  Responder {
    url: format!("http://127.0.0.1:{port}/predictions/synthdet"),
    seen,
  }
}
