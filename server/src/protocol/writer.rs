/*
 * Created on Sun Mar 16 2025
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use super::ProtocolVersion;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Emits RESP2/RESP3 response frames onto a buffered async writer. RESP3 aggregate types
/// (map/set/push/boolean/double/null) degrade to their RESP2 equivalents when the connection
/// hasn't negotiated protocol 3 via `HELLO` (§4.1).
pub struct RespWriter<W> {
    stream: BufWriter<W>,
    pub proto: ProtocolVersion,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    pub fn new(stream: W, proto: ProtocolVersion) -> Self {
        Self {
            stream: BufWriter::new(stream),
            proto,
        }
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    pub async fn write_simple_string(&mut self, s: &str) -> io::Result<()> {
        self.stream.write_all(b"+").await?;
        self.stream.write_all(s.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await
    }

    pub async fn write_error(&mut self, msg: &str) -> io::Result<()> {
        self.stream.write_all(b"-").await?;
        self.stream.write_all(msg.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await
    }

    pub async fn write_integer(&mut self, n: i64) -> io::Result<()> {
        self.stream
            .write_all(format!(":{}\r\n", n).as_bytes())
            .await
    }

    /// `None` writes the null bulk string (`$-1` / RESP3 `_`).
    pub async fn write_bulk(&mut self, data: Option<&[u8]>) -> io::Result<()> {
        match data {
            None => self.write_null().await,
            Some(d) => {
                self.stream
                    .write_all(format!("${}\r\n", d.len()).as_bytes())
                    .await?;
                self.stream.write_all(d).await?;
                self.stream.write_all(b"\r\n").await
            }
        }
    }

    /// The top-level null reply: `$-1\r\n` on RESP2, `_\r\n` on RESP3.
    pub async fn write_null(&mut self) -> io::Result<()> {
        if self.proto.is_resp3() {
            self.stream.write_all(b"_\r\n").await
        } else {
            self.stream.write_all(b"$-1\r\n").await
        }
    }

    /// `n < 0` writes the null array (`*-1` / RESP3 `_`).
    pub async fn write_array_header(&mut self, n: i64) -> io::Result<()> {
        if n < 0 {
            return self.write_null().await;
        }
        self.stream
            .write_all(format!("*{}\r\n", n).as_bytes())
            .await
    }

    pub async fn write_map_header(&mut self, n: usize) -> io::Result<()> {
        if self.proto.is_resp3() {
            self.stream
                .write_all(format!("%{}\r\n", n).as_bytes())
                .await
        } else {
            self.stream
                .write_all(format!("*{}\r\n", n * 2).as_bytes())
                .await
        }
    }

    pub async fn write_set_header(&mut self, n: usize) -> io::Result<()> {
        if self.proto.is_resp3() {
            self.stream
                .write_all(format!("~{}\r\n", n).as_bytes())
                .await
        } else {
            self.stream
                .write_all(format!("*{}\r\n", n).as_bytes())
                .await
        }
    }

    pub async fn write_push_header(&mut self, n: usize) -> io::Result<()> {
        if self.proto.is_resp3() {
            self.stream
                .write_all(format!(">{}\r\n", n).as_bytes())
                .await
        } else {
            self.stream
                .write_all(format!("*{}\r\n", n).as_bytes())
                .await
        }
    }

    pub async fn write_bool(&mut self, b: bool) -> io::Result<()> {
        if self.proto.is_resp3() {
            self.stream
                .write_all(if b { b"#t\r\n" } else { b"#f\r\n" })
                .await
        } else {
            self.write_integer(b as i64).await
        }
    }

    pub async fn write_double(&mut self, d: f64) -> io::Result<()> {
        if self.proto.is_resp3() {
            let rendered = render_double(d);
            self.stream
                .write_all(format!(",{}\r\n", rendered).as_bytes())
                .await
        } else {
            let rendered = render_double(d);
            self.write_bulk(Some(rendered.as_bytes())).await
        }
    }
}

/// Redis renders doubles without a trailing `.0` for integral values, `inf`/`-inf` for the
/// infinities, and otherwise the shortest round-tripping decimal form.
fn render_double(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 {
            "inf".to_owned()
        } else {
            "-inf".to_owned()
        }
    } else if d == d.trunc() && d.abs() < 1e17 {
        format!("{}", d as i64)
    } else {
        format!("{}", d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolVersion;

    async fn render<F>(proto: ProtocolVersion, f: F) -> Vec<u8>
    where
        F: for<'a> FnOnce(
            &'a mut RespWriter<&'a mut Vec<u8>>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = io::Result<()>> + 'a>>,
    {
        let mut buf = Vec::new();
        {
            let mut w = RespWriter::new(&mut buf, proto);
            f(&mut w).await.unwrap();
            w.flush().await.unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn bulk_string_round_trip_bytes() {
        let out = render(ProtocolVersion::Resp2, |w| Box::pin(w.write_bulk(Some(b"hello")))).await;
        assert_eq!(out, b"$5\r\nhello\r\n");
    }

    #[tokio::test]
    async fn null_bulk_differs_by_protocol() {
        let v2 = render(ProtocolVersion::Resp2, |w| Box::pin(w.write_bulk(None))).await;
        assert_eq!(v2, b"$-1\r\n");
        let v3 = render(ProtocolVersion::Resp3, |w| Box::pin(w.write_bulk(None))).await;
        assert_eq!(v3, b"_\r\n");
    }

    #[tokio::test]
    async fn map_header_degrades_to_flat_array_on_resp2() {
        let out = render(ProtocolVersion::Resp2, |w| Box::pin(w.write_map_header(2))).await;
        assert_eq!(out, b"*4\r\n");
        let out = render(ProtocolVersion::Resp3, |w| Box::pin(w.write_map_header(2))).await;
        assert_eq!(out, b"%2\r\n");
    }
}
