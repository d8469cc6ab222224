//! hx Engine
//!
//! Headless hypermedia exchange engine. Elements declare requests through
//! `hx-*` attributes; the engine binds their triggers, issues the requests
//! through a [`Transport`](hx_net::Transport), and swaps the HTML responses
//! back into the document.
//!
//! # Example
//! ```rust,ignore
//! use hx_engine::{Config, Engine, ExtensionRegistry};
//! use hx_net::HttpClient;
//!
//! let engine = Engine::new(Config::default(), HttpClient::new(), ExtensionRegistry::create());
//! engine.load_html(r#"<button hx-get="/clicked">Click</button>"#, "http://localhost/")?;
//! let button = engine.query("button").unwrap();
//! engine.trigger(button, "click");
//! engine.run(smol::Timer::after(std::time::Duration::from_millis(100)));
//! ```

mod binding;
mod engine;
mod exchange;
mod events;

pub mod attributes;
pub mod config;
pub mod error;
pub mod extension;
pub mod headers;
pub mod history;
pub mod observer;
pub mod oob;
pub mod request;
pub mod swap;
pub mod sync;
pub mod target;
pub mod time;
pub mod trigger;

pub use attributes::{AttributeResolver, ResolvedAttributes};
pub use config::Config;
pub use engine::{ConfirmHandler, Engine, Navigation, PromptHandler, ScrollRequest};
pub use error::{EngineError, ExtensionError, FailureKind, RegistryError, TransitionError};
pub use events::{Listener, ListenerId};
pub use extension::{EventVerdict, Extension, ExtensionHandle, ExtensionRegistry};
pub use history::{HistoryCache, HistoryEntry, NavigationStack};
pub use observer::{IntersectionEntry, IntersectionObserver, Rect};
pub use request::{ActiveRequest, RequestConfig, RequestId, RequestState};
pub use swap::{ScrollPosition, ScrollSpec, SwapSpec, SwapStyle};
pub use sync::{QueueMode, SyncSpec, SyncStrategy};
pub use trigger::{TriggerEvent, TriggerSpec};

// Re-export sub-crates for hosts
pub use hx_dom as dom;
pub use hx_html as html;
pub use hx_net as net;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
