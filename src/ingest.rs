//! Batched archive ingestion.
//!
//! Files are read in sequential batches of `archive.batch_size`. Each batch
//! is parsed file by file, then written through the store in a single
//! transaction. A file that cannot be read or parsed is logged and folded
//! into the [`BuildReport`]; a store write failure aborts the build.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{list_archive, read_archive_file};
use crate::error::Result;
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::store::{ConversationRecord, SqliteStore};

/// A file skipped during ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub files_discovered: usize,
    pub files_processed: usize,
    /// Distinct conversation ids. Files sharing an id upsert one row.
    pub conversations: usize,
    pub messages: usize,
    pub commands: usize,
    pub batches: usize,
    pub failures: Vec<FileFailure>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl BuildReport {
    fn absorb(&mut self, records: &[ConversationRecord], failures: Vec<FileFailure>) {
        self.batches += 1;
        self.files_processed += records.len();
        for record in records {
            self.seen.insert(record.conversation.conversation_id.clone());
        }
        self.conversations = self.seen.len();
        self.messages += records.iter().map(|r| r.messages.len()).sum::<usize>();
        self.commands += records.iter().map(|r| r.commands.len()).sum::<usize>();
        self.failures.extend(failures);
    }
}

/// Parses a batch of files, splitting successes from failures.
pub fn read_batch(paths: &[PathBuf]) -> (Vec<ConversationRecord>, Vec<FileFailure>) {
    paths.iter().fold(
        (Vec::new(), Vec::new()),
        |(mut records, mut failures), path| {
            match read_archive_file(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let error = format!("{:#}", e);
                    warn!(path = %path.display(), %error, "skipping archive file");
                    failures.push(FileFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
            (records, failures)
        },
    )
}

/// Reads every archive file into the store. The store is expected to be
/// empty; clearing is the caller's job.
pub async fn ingest_archive(
    store: &SqliteStore,
    archive: &Path,
    batch_size: usize,
    reporter: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    let files = list_archive(archive)?;
    let total = files.len() as u64;

    info!(archive = %archive.display(), files = total, "discovered archive files");
    reporter.report(BuildProgressEvent::Discovered { files: total });

    let mut report = BuildReport {
        files_discovered: files.len(),
        ..Default::default()
    };
    let mut done = 0u64;

    for (i, batch) in files.chunks(batch_size.max(1)).enumerate() {
        let (records, failures) = read_batch(batch);
        store.write_batch(&records).await?;

        done += batch.len() as u64;
        debug!(
            batch = i + 1,
            written = records.len(),
            skipped = failures.len(),
            "batch written"
        );
        report.absorb(&records, failures);
        reporter.report(BuildProgressEvent::Batch {
            batch: (i + 1) as u64,
            n: done,
            total,
        });
    }

    info!(
        conversations = report.conversations,
        messages = report.messages,
        commands = report.commands,
        failures = report.failures.len(),
        "archive ingested"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::progress::NoProgress;
    use crate::{db, migrate};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Recording(Mutex<Vec<BuildProgressEvent>>);

    impl BuildProgressReporter for Recording {
        fn report(&self, event: BuildProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    async fn memory_store() -> SqliteStore {
        let pool = db::connect(&Config::minimal()).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn write_conversation(dir: &Path, name: &str, id: &str) {
        let body = serde_json::json!({
            "title": format!("conversation {}", id),
            "metadata": { "conversation_id": id, "created_at": "2024-01-01" },
            "messages": [
                { "role": "user", "content": "how do I check the repo state?" },
                { "role": "assistant", "content": "$ git status --short" }
            ]
        });
        std::fs::write(dir.join(name), body.to_string()).unwrap();
    }

    #[tokio::test]
    async fn batches_and_failures_are_reported() {
        let tmp = TempDir::new().unwrap();
        for i in 0..5 {
            write_conversation(tmp.path(), &format!("c{}.json", i), &format!("conv-{}", i));
        }
        std::fs::write(tmp.path().join("zz-broken.json"), "{ nope").unwrap();

        let store = memory_store().await;
        let reporter = Recording(Mutex::new(Vec::new()));
        let report = ingest_archive(&store, tmp.path(), 2, &reporter).await.unwrap();

        assert_eq!(report.files_discovered, 6);
        assert_eq!(report.files_processed, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(report.messages, 10);
        assert_eq!(report.commands, 5);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("zz-broken.json"));

        assert_eq!(store.count_conversations().await.unwrap(), 5);

        let events = reporter.0.lock().unwrap();
        assert_eq!(events[0], BuildProgressEvent::Discovered { files: 6 });
        assert_eq!(
            events.last(),
            Some(&BuildProgressEvent::Batch {
                batch: 3,
                n: 6,
                total: 6
            })
        );
    }

    #[tokio::test]
    async fn shared_ids_count_once() {
        let tmp = TempDir::new().unwrap();
        write_conversation(tmp.path(), "a.json", "same");
        write_conversation(tmp.path(), "b.json", "same");
        write_conversation(tmp.path(), "c.json", "other");

        let store = memory_store().await;
        let report = ingest_archive(&store, tmp.path(), 1, &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.files_processed, 3);
        assert_eq!(report.conversations, 2);
        assert_eq!(
            store.count_conversations().await.unwrap() as usize,
            report.conversations
        );
    }

    #[tokio::test]
    async fn empty_archive_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = memory_store().await;
        let report = ingest_archive(&store, tmp.path(), 50, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.files_discovered, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(store.count_conversations().await.unwrap(), 0);
    }
}
