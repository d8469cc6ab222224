//! hx-demo: load a page, fire one event and print the resulting document
//!
//! Usage: `hx-demo <page.html> <base-url> [selector] [event] [wait-ms]`

use std::time::Duration;

use anyhow::{bail, Context, Result};
use hx_engine::{Config, Engine, ExtensionRegistry};
use hx_net::HttpClient;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, base) = match args.as_slice() {
        [path, base, ..] => (path, base),
        _ => bail!("usage: hx-demo <page.html> <base-url> [selector] [event] [wait-ms]"),
    };
    let selector = args.get(2);
    let event = args.get(3).map(String::as_str).unwrap_or("click");
    let wait = match args.get(4) {
        Some(ms) => Duration::from_millis(ms.parse().context("wait-ms must be a number")?),
        None => Duration::from_millis(500),
    };

    let html = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let page = hx_html::parse_document(&html, base)?;
    let config = Config::from_document(&page)?;

    let engine = Engine::new(config, HttpClient::new(), ExtensionRegistry::create());
    engine.load_html(&html, base)?;
    println!("hx v{} loaded {} ({} bound elements)", hx_engine::VERSION, base, engine.binding_count());

    if let Some(selector) = selector {
        let node = engine
            .query(selector)
            .with_context(|| format!("no element matches {}", selector))?;
        engine.trigger(node, event);
    }
    engine.run(smol::Timer::after(wait));

    for request in engine.requests() {
        println!("{} {} -> {:?}", request.method, request.url, request.state());
    }
    for navigation in engine.take_navigations() {
        println!("navigation: {:?}", navigation);
    }
    println!("{}", engine.outer_html(hx_dom::NodeId::ROOT));
    engine.dispose();
    Ok(())
}
