//! Per-key stream filters.
//!
//! Each filter consumes a channel on its own task and returns the filtered
//! channel. The output closes once the input closes.

use std::collections::HashMap;

use tokio::sync::mpsc;

use super::CHANNEL_CAPACITY;
use crate::observability::{Event, Logger};
use crate::store::KeyValue;

/// Forward an event only if its value differs from the last value forwarded
/// for the same key.
pub fn dedupe_filter(logger: Logger, input: mpsc::Receiver<KeyValue>) -> mpsc::Receiver<KeyValue> {
    let mut last_values: HashMap<String, String> = HashMap::new();

    spawn_filter(logger, "dedupe", input, move |event| {
        if last_values.get(&event.key) == Some(&event.value) {
            return Err((Event::FilterValueUnchanged, String::new()));
        }
        last_values.insert(event.key.clone(), event.value.clone());
        Ok(())
    })
}

/// Forward an event only if its revision is strictly greater than the last
/// revision forwarded for the same key.
pub fn revision_filter(logger: Logger, input: mpsc::Receiver<KeyValue>) -> mpsc::Receiver<KeyValue> {
    let mut last_revisions: HashMap<String, i64> = HashMap::new();

    spawn_filter(logger, "revision", input, move |event| {
        let previous = last_revisions.get(&event.key).copied().unwrap_or(0);
        if event.mod_revision <= previous {
            return Err((Event::FilterStaleRevision, previous.to_string()));
        }
        last_revisions.insert(event.key.clone(), event.mod_revision);
        Ok(())
    })
}

/// `admit` returns the drop event and the previous value/revision on rejection
fn spawn_filter<F>(
    logger: Logger,
    name: &'static str,
    mut input: mpsc::Receiver<KeyValue>,
    mut admit: F,
) -> mpsc::Receiver<KeyValue>
where
    F: FnMut(&KeyValue) -> Result<(), (Event, String)> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(event) = input.recv().await {
            match admit(&event) {
                Ok(()) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err((drop_event, previous)) => {
                    logger.trace(
                        drop_event,
                        &[
                            ("filter", name),
                            ("key", &event.key),
                            ("previous", &previous),
                            ("revision", &event.mod_revision.to_string()),
                            ("value", &event.value),
                        ],
                    );
                }
            }
        }

        logger.trace(Event::FilterClose, &[("filter", name)]);
    });

    rx
}
