//! netsift: zero-copy, SIMD-accelerated protocol parsing
//!
//! A byte scanner with runtime-selected SIMD kernels, and decoders built on
//! it for HTTP/1.x, HTTP/2 detection, WebSocket, DNS, TLS ClientHello, ICMP
//! and UDP-over-IP.
//!
//! Decoders are plain functions over a caller-owned buffer. They never
//! allocate, block or keep global mutable state; results borrow from (or
//! hold offsets into) the input. Every fallible call returns a module error
//! enum whose `code()` is the stable integer status, `Truncated` (-1) being
//! the only one that invites a retry with more bytes.
//!
//! ```
//! use netsift::protocols::http;
//!
//! let mut buf = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n".to_vec();
//! let req = http::parse(&mut buf).unwrap();
//! assert_eq!(req.method(&buf), b"GET");
//! assert_eq!(req.header(&buf, "host"), Some(&b"h"[..]));
//! ```

pub mod config;
pub mod error;
pub mod inline;
pub mod protocols;
pub mod scan;
pub mod telemetry;

pub use config::{ConfigError, FramingConflict, ParserConfig};
pub use error::{ErrorKind, ParseError};
pub use inline::InlineBytes;
pub use protocols::{detect, Protocol};
pub use scan::{backend, find_char, find_set2, find_set4, xor_stream, Scanner, SimdLevel};
