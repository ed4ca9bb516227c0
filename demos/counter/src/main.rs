//! # Counter Demo
//!
//! A counter app with two systems: a ticker that increments on its own, and
//! a limiter that resets the count once it gets too high. The "UI" renders
//! markup to stdout and simulates a few clicks.
//!
//! Run with `RUST_LOG=brook=debug` to see devtools output.

use std::time::Duration;

use anyhow::Result;
use brook::attributes::{self, DomEvent};
use brook::{Bootstrap, BootstrapConfig, Enhancer, Store, Stream, TaggedAction, INIT};
use tracing_subscriber::EnvFilter;

const LIMIT: i64 = 5;

// ============================================================================
// Reducer
// ============================================================================

fn counter(count: &i64, action: &TaggedAction) -> Result<i64> {
    Ok(match action.kind() {
        "INCREMENT" => count + action.get("by").and_then(|v| v.as_i64()).unwrap_or(1),
        "RESET" => 0,
        _ => *count,
    })
}

// ============================================================================
// Systems
// ============================================================================

/// Three increments, one every 300ms, starting once the app is up.
fn ticker(actions: Stream<TaggedAction>, _states: Stream<i64>) -> Stream<TaggedAction> {
    actions.filter(|a| a.is(INIT)).flat_map(|_| {
        Stream::interval(Duration::from_millis(300))
            .take(3)
            .map(|_| TaggedAction::new("INCREMENT").with("source", "ticker"))
    })
}

/// Resets the count shortly after it passes the limit.
fn limiter(actions: Stream<TaggedAction>, states: Stream<i64>) -> Stream<TaggedAction> {
    actions
        .with_latest_from(&states)
        .filter(|(a, count)| a.is("INCREMENT") && *count > LIMIT)
        .map(|(_, count)| TaggedAction::new("RESET").with("from", count))
        .delay(Duration::from_millis(100))
}

// ============================================================================
// Root
// ============================================================================

fn render(count: i64) -> String {
    format!(
        "<div {}><span>{count}</span><button {}=\"increment\">+</button></div>",
        attributes::container("counter"),
        DomEvent::Click.attribute(),
    )
}

fn app(element: &'static str, store: &Store<i64, TaggedAction>) -> Stream<TaggedAction> {
    println!("mounting into {element}");
    println!("{}", render(store.state()));
    store.subscribe(|count| println!("{}", render(*count))).detach();

    // Simulated clicks on the increment button.
    Stream::interval(Duration::from_millis(450))
        .take(4)
        .map(|n| TaggedAction::new("INCREMENT").with("by", n as i64 + 1))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let enhancer = Enhancer::builder()
        .with_named_system("ticker", ticker)
        .with_named_system("limiter", limiter)
        .build();

    let bootstrap = Bootstrap::new(counter, app)
        .with_enhancer(enhancer)
        .with_config(BootstrapConfig::development());

    let mut mounted = bootstrap.mount("#app", None)?;
    mounted.initialized().await?;

    if let Some(actions) = mounted.store().actions() {
        actions
            .on_value(|action| match serde_json::to_string(&action) {
                Ok(json) => println!("action: {json}"),
                Err(error) => eprintln!("unserializable action: {error}"),
            })
            .detach();
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    tracing::info!(count = mounted.store().state(), "demo finished");
    println!("final count: {}", mounted.store().state());
    mounted.unmount();

    Ok(())
}
