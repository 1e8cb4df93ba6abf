//! Demonstrates optimistic concurrency control for handling concurrent writes.
//!
//! Two clerks reserve stock from the same inventory stream. Each reads the
//! stream, decides, and writes expecting the version it read. The second
//! write is rejected because the first one moved the stream on; the clerk
//! then retries against fresh state.
//!
//! Run with: `cargo run --example optimistic_concurrency --features test-util`

use appendlog::{
    Condition, EventEnvelope, EventStream, Repository, WriteCondition, WriteError,
    store::inmemory, test::RepositoryTestExt,
};

const STREAM: &str = "inventory-sku-42";

// =============================================================================
// Events
// =============================================================================

fn restocked(id: &str, quantity: u32) -> EventEnvelope {
    EventEnvelope::new(id, format!("restocked:{quantity}").into_bytes())
}

fn reserved(id: &str, quantity: u32) -> EventEnvelope {
    EventEnvelope::new(id, format!("reserved:{quantity}").into_bytes())
}

/// Fold the stream into the quantity still available.
fn available(stream: &EventStream) -> u32 {
    stream.events().iter().fold(0, |available, event| {
        let payload = String::from_utf8_lossy(event.payload());
        match payload.split_once(':') {
            Some(("restocked", n)) => available + n.parse::<u32>().unwrap_or(0),
            Some(("reserved", n)) => available.saturating_sub(n.parse().unwrap_or(0)),
            _ => available,
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,appendlog_core=debug".into()),
        )
        .init();

    let repo = Repository::new(inmemory::Store::new());

    // Create the stream exactly once.
    repo.write(
        STREAM,
        &WriteCondition::stream_version_eq(0),
        &[restocked("r-1", 10)],
    )
    .await?;
    println!("created stream with 10 units");

    // Both clerks read version 1.
    let alice_view = repo.read_all(STREAM).await?;
    let bob_view = repo.read_all(STREAM).await?;
    println!(
        "alice and bob both see version {} with {} units",
        alice_view.version(),
        available(&alice_view)
    );

    // Alice writes first and wins.
    let alice = repo
        .write(
            STREAM,
            &WriteCondition::stream_version_eq(alice_view.version()),
            &[reserved("alice-1", 6)],
        )
        .await?;
    println!("alice reserved 6 units, stream at version {}", alice.version);

    // Bob's view is stale, so his write is rejected.
    match repo
        .write(
            STREAM,
            &WriteCondition::stream_version_eq(bob_view.version()),
            &[reserved("bob-1", 6)],
        )
        .await
    {
        Err(WriteError::Rejected(rejected)) => println!("bob rejected: {rejected}"),
        Err(e) => return Err(e.into()),
        Ok(_) => unreachable!("stale write must be rejected"),
    }

    // Another process restocks behind the repository's back.
    repo.inject_concurrent_write(STREAM, vec![restocked("r-2", 5)])
        .await?;

    // Bob retries against fresh state and only reserves what is left.
    let outcome = repo
        .write_with_retry(STREAM, 3, |stream| {
            let quantity = available(stream).min(6);
            vec![reserved("bob-2", quantity)]
        })
        .await?;
    println!(
        "bob succeeded after {} attempt(s), stream at version {}",
        outcome.attempts, outcome.version
    );

    // Composite conditions: only accept an audit marker while the stream is
    // past creation and has not been closed off at version 10.
    let window = WriteCondition::stream_version(Condition::and([
        Condition::gt(1),
        Condition::not([Condition::gte(10)]),
    ]));
    repo.write(STREAM, &window, &[EventEnvelope::new("audit-1", Vec::new())])
        .await?;

    let stream = repo.read_all(STREAM).await?;
    println!(
        "final version {} with {} events and {} units available",
        stream.version(),
        stream.events().len(),
        available(&stream)
    );

    Ok(())
}
