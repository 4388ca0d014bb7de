//! High-level WebDriver client.
//!
//! Ties the pieces together: commands are scheduled on a
//! [`ControlFlow`](webwire_flow::ControlFlow), dispatched through the
//! HTTP [`WireExecutor`](webwire_http::WireExecutor), and results decode
//! into typed handles like [`WebElement`].

pub mod args;
pub mod client;
pub mod element;

pub use args::{encode_args, Arg};
pub use client::{By, WebDriverClient};
pub use element::{WebElement, WireValue};

use std::sync::OnceLock;
use webwire_flow::ControlFlow;

static DEFAULT_FLOW: OnceLock<ControlFlow> = OnceLock::new();

/// The process-wide default control flow, created lazily. Intended for
/// application entry points; library code should take a flow explicitly.
pub fn default_flow() -> ControlFlow {
    DEFAULT_FLOW.get_or_init(ControlFlow::new).clone()
}
