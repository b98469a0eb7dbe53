use std::{path::PathBuf, str, time::Instant};

use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};

use metrics::{counter, histogram};

use super::{
    error::{QuestionError, Result},
    ident::{IdGenerator, QuestionId},
    model::{Question, QuestionEvent},
};

const SEP: u8 = 0x1F;
const PREFIX_QUESTION: &str = "question";
const PREFIX_DELETED: &str = "deleted";

/// The contract the HTTP layer consumes. Every operation takes a caller
/// supplied key; results and typed errors carry no transport semantics.
pub trait QuestionManager: Send + Sync {
    fn new_question(&self, key: &str, value: &str) -> Result<Question>;
    fn get(&self, key: &str) -> Result<Question>;
    fn update(&self, key: &str, value: &str) -> Result<Question>;
    fn delete(&self, key: &str) -> Result<()>;
    fn list(&self) -> Result<Vec<Question>>;
    fn history(&self, key: &str) -> Result<Vec<QuestionEvent>>;
}

/// Durable question storage over two logical partitions of one RocksDB key
/// space: `question` holds serialized aggregate snapshots, `deleted` holds
/// tombstones (key -> identifier). A key is visible iff it has a snapshot
/// and no tombstone.
///
/// Mutations serialize on `write_lock` so the read-modify-write of a key is
/// atomic with respect to other writers; the resulting multi-key commit goes
/// through a single `WriteBatch`. Readers take no lock.
pub struct QuestionStore {
    db: DBWithThreadMode<MultiThreaded>,
    write_lock: Mutex<()>,
    id_generator: Box<dyn IdGenerator>,
}

impl QuestionStore {
    pub fn open(path: PathBuf, id_generator: Box<dyn IdGenerator>) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&options, path)
            .map_err(|err| QuestionError::Storage(err.to_string()))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            id_generator,
        })
    }

    fn snapshot_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .get(question_key(key))
            .map_err(|err| QuestionError::Storage(format!("get '{key}': {err}")))
    }

    fn load_snapshot(&self, key: &str) -> Result<Option<Question>> {
        match self.snapshot_bytes(key)? {
            Some(bytes) => {
                let question = serde_json::from_slice(&bytes).map_err(|err| {
                    QuestionError::Decode(format!("snapshot for '{key}': {err}"))
                })?;
                Ok(Some(question))
            }
            None => Ok(None),
        }
    }

    fn tombstone(&self, key: &str) -> Result<Option<QuestionId>> {
        let bytes = self
            .db
            .get(tombstone_key(key))
            .map_err(|err| QuestionError::Storage(format!("get tombstone '{key}': {err}")))?;
        Ok(bytes.map(QuestionId::from_bytes))
    }

    /// Loads a key through the visibility rule shared by Get/Update/Delete:
    /// tombstoned keys fail `Deleted` before absence is reported.
    fn load_visible(&self, key: &str) -> Result<Question> {
        if self.tombstone(key)?.is_some() {
            return Err(QuestionError::Deleted);
        }
        self.load_snapshot(key)?.ok_or(QuestionError::NotFound)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let start = Instant::now();
        let result = self
            .db
            .write(batch)
            .map_err(|err| QuestionError::Storage(err.to_string()));
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_write",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }
}

impl QuestionManager for QuestionStore {
    fn new_question(&self, key: &str, value: &str) -> Result<Question> {
        let _guard = self.write_lock.lock();

        // A live snapshot only blocks creation while it is not shadowed by a
        // tombstone; deleted keys may be reused for a fresh aggregate.
        if self.snapshot_bytes(key)?.is_some() && self.tombstone(key)?.is_none() {
            return Err(QuestionError::AlreadyExists);
        }

        let question = Question::new(self.id_generator.next_id(), key, value);

        let mut batch = WriteBatch::default();
        batch.put(question_key(key), serde_json::to_vec(&question)?);
        batch.delete(tombstone_key(key));
        self.write_batch(batch)?;

        Ok(question)
    }

    fn get(&self, key: &str) -> Result<Question> {
        self.load_visible(key)
    }

    fn update(&self, key: &str, value: &str) -> Result<Question> {
        let _guard = self.write_lock.lock();

        let mut question = self.load_visible(key)?;
        question.update(value)?;

        let mut batch = WriteBatch::default();
        batch.put(question_key(key), serde_json::to_vec(&question)?);
        self.write_batch(batch)?;

        Ok(question)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut question = self.load_visible(key)?;
        question.delete()?;

        // The snapshot is rewritten so the delete event lands in the durable
        // history, then shadowed by the tombstone; it is retained, not
        // reclaimed.
        let mut batch = WriteBatch::default();
        batch.put(question_key(key), serde_json::to_vec(&question)?);
        batch.put(tombstone_key(key), question.id.as_bytes().to_vec());
        self.write_batch(batch)?;

        Ok(())
    }

    fn list(&self) -> Result<Vec<Question>> {
        let start = Instant::now();
        let mut status = "ok";

        let prefix = key_with_segments(&[PREFIX_QUESTION]);
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

        let mut questions = Vec::new();
        for item in iter {
            let (raw_key, value) = match item {
                Ok(entry) => entry,
                Err(err) => {
                    record_store_op(
                        "rocksdb_iter_questions",
                        "err",
                        start.elapsed().as_secs_f64(),
                    );
                    return Err(QuestionError::Storage(err.to_string()));
                }
            };
            if !raw_key.starts_with(prefix.as_slice()) {
                break;
            }
            if raw_key.len() <= prefix.len() || raw_key[prefix.len()] != SEP {
                break;
            }

            let key = match str::from_utf8(&raw_key[prefix.len() + 1..]) {
                Ok(key) => key,
                Err(_) => {
                    status = "err";
                    continue;
                }
            };
            if self.tombstone(key)?.is_some() {
                continue;
            }

            let question: Question = serde_json::from_slice(&value)
                .map_err(|err| QuestionError::Decode(format!("snapshot for '{key}': {err}")))?;
            questions.push(question);
        }

        record_store_op("rocksdb_iter_questions", status, start.elapsed().as_secs_f64());
        Ok(questions)
    }

    fn history(&self, key: &str) -> Result<Vec<QuestionEvent>> {
        // History reads past the tombstone: a deleted record's audit trail
        // stays reachable as long as its snapshot is retained.
        let question = self.load_snapshot(key)?.ok_or(QuestionError::NotFound)?;
        Ok(question.history)
    }
}

fn question_key(key: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_QUESTION, key])
}

fn tombstone_key(key: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_DELETED, key])
}

fn key_with_segments(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::new();
    let mut iter = parts.iter();
    if let Some(first) = iter.next() {
        key.extend_from_slice(first.as_bytes());
    }
    for part in iter {
        key.push(SEP);
        key.extend_from_slice(part.as_bytes());
    }
    key
}

fn record_store_op(operation: &'static str, status: &'static str, duration: f64) {
    let labels = [("operation", operation), ("status", status)];
    counter!("answerdb_store_operations_total", &labels).increment(1);
    histogram!("answerdb_store_operation_duration_seconds", &labels).record(duration);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    struct SequenceGenerator(AtomicU64);

    impl SequenceGenerator {
        fn new() -> Self {
            Self(AtomicU64::new(1))
        }
    }

    impl IdGenerator for SequenceGenerator {
        fn next_id(&self) -> QuestionId {
            let next = self.0.fetch_add(1, Ordering::SeqCst);
            QuestionId::from_bytes(next.to_be_bytes().to_vec())
        }
    }

    fn open_store(path: PathBuf) -> QuestionStore {
        QuestionStore::open(path, Box::new(SequenceGenerator::new())).unwrap()
    }

    #[test]
    fn create_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        let created = store.new_question("capital", "Paris").unwrap();
        assert_eq!(created.version, 0);

        let fetched = store.get("capital").unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.key, "capital");
        assert_eq!(fetched.value, "Paris");
        assert!(!fetched.deleted);
        assert_eq!(fetched.events().len(), 1);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        let first = store.new_question("capital", "Paris").unwrap();
        let err = store.new_question("capital", "Lyon").unwrap_err();
        assert!(matches!(err, QuestionError::AlreadyExists));

        assert_eq!(store.get("capital").unwrap(), first);
    }

    #[test]
    fn deleted_key_can_be_recreated_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        let first = store.new_question("capital", "Paris").unwrap();
        store.delete("capital").unwrap();

        let second = store.new_question("capital", "Lyon").unwrap();
        assert_ne!(second.id, first.id);

        let fetched = store.get("capital").unwrap();
        assert_eq!(fetched.value, "Lyon");
        assert_eq!(fetched.version, 0);
        assert_eq!(fetched.events().len(), 1);
    }

    #[test]
    fn update_round_trips_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        store.new_question("capital", "Paris").unwrap();
        let updated = store.update("capital", "Lyon").unwrap();
        assert_eq!(updated.value, "Lyon");
        assert_eq!(updated.version, 1);

        let fetched = store.get("capital").unwrap();
        assert_eq!(fetched, updated);
        assert_eq!(fetched.events().len(), 2);
    }

    #[test]
    fn update_missing_key_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        let err = store.update("missing", "value").unwrap_err();
        assert!(matches!(err, QuestionError::NotFound));
    }

    #[test]
    fn operations_on_deleted_key_fail_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        store.new_question("capital", "Paris").unwrap();
        store.delete("capital").unwrap();

        assert!(matches!(
            store.get("capital").unwrap_err(),
            QuestionError::Deleted
        ));
        assert!(matches!(
            store.update("capital", "Lyon").unwrap_err(),
            QuestionError::Deleted
        ));
        assert!(matches!(
            store.delete("capital").unwrap_err(),
            QuestionError::Deleted
        ));
    }

    #[test]
    fn list_skips_tombstoned_keys_and_orders_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        store.new_question("name", "John").unwrap();
        store.new_question("last_name", "Doe").unwrap();
        store.delete("name").unwrap();

        let visible = store.list().unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].key, "last_name");

        store.new_question("age", "42").unwrap();
        let keys: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|question| question.key)
            .collect();
        assert_eq!(keys, ["age", "last_name"]);
    }

    #[test]
    fn history_survives_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        store.new_question("capital", "Paris").unwrap();
        store.update("capital", "Lyon").unwrap();
        store.delete("capital").unwrap();

        let history = store.history("capital").unwrap();
        let names: Vec<_> = history.iter().map(QuestionEvent::short_name).collect();
        assert_eq!(names, ["add", "update", "delete"]);
        assert_eq!(history[0].data().value, "Paris");
        assert_eq!(history[1].data().value, "Lyon");

        let err = store.history("missing").unwrap_err();
        assert!(matches!(err, QuestionError::NotFound));
    }

    #[test]
    fn snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions");

        {
            let store = open_store(path.clone());
            store.new_question("capital", "Paris").unwrap();
            store.update("capital", "Lyon").unwrap();
        }

        let reopened = open_store(path);
        let fetched = reopened.get("capital").unwrap();
        assert_eq!(fetched.value, "Lyon");
        assert_eq!(fetched.version, 1);

        let rehydrated = Question::from_events(fetched.history.clone()).unwrap();
        assert_eq!(rehydrated, fetched);
    }

    #[test]
    fn snapshot_matches_replay_of_its_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path().join("questions"));

        store.new_question("capital", "Paris").unwrap();
        store.update("capital", "Lyon").unwrap();
        store.update("capital", "Marseille").unwrap();

        let fetched = store.get("capital").unwrap();
        let rehydrated = Question::from_events(fetched.history.clone()).unwrap();
        assert_eq!(rehydrated, fetched);
    }
}
