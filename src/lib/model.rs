use serde::{Deserialize, Serialize};

use super::{
    error::{QuestionError, Result},
    ident::QuestionId,
};

/// Lifecycle events of a question. The set is closed: replay matches
/// exhaustively, so adding a variant forces every call site to handle it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QuestionEvent {
    Added {
        id: QuestionId,
        key: String,
        value: String,
    },
    Updated {
        key: String,
        new_value: String,
    },
    Deleted {
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventData {
    pub key: String,
    pub value: String,
}

impl QuestionEvent {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "add",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
        }
    }

    pub fn data(&self) -> EventData {
        match self {
            Self::Added { key, value, .. } => EventData {
                key: key.clone(),
                value: value.clone(),
            },
            Self::Updated { key, new_value } => EventData {
                key: key.clone(),
                value: new_value.clone(),
            },
            Self::Deleted { key } => EventData {
                key: key.clone(),
                value: String::new(),
            },
        }
    }
}

/// A question aggregate. Current state is derived from `history`; replaying
/// the log from an empty aggregate reproduces every other field.
///
/// `version` counts the events applied after the initial `Added`, so a fresh
/// aggregate and one rehydrated from the same log always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub version: u64,
    pub history: Vec<QuestionEvent>,
}

impl Question {
    pub fn new(id: QuestionId, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let mut question = Self {
            id: id.clone(),
            key: key.clone(),
            value: value.clone(),
            deleted: false,
            version: 0,
            history: Vec::new(),
        };
        question.raise(QuestionEvent::Added { id, key, value });
        question
    }

    /// Rehydrates an aggregate by folding `events` in order without raising
    /// anything new. The input becomes the aggregate's history verbatim.
    pub fn from_events(events: Vec<QuestionEvent>) -> Result<Self> {
        let mut iter = events.iter();
        let first = iter
            .next()
            .ok_or_else(|| QuestionError::Decode("event history is empty".into()))?;
        let QuestionEvent::Added { id, key, value } = first else {
            return Err(QuestionError::Decode(
                "event history must begin with an add event".into(),
            ));
        };

        let mut question = Self {
            id: id.clone(),
            key: key.clone(),
            value: value.clone(),
            deleted: false,
            version: 0,
            history: Vec::new(),
        };
        for event in iter {
            question.apply(event, false);
        }
        question.history = events;
        Ok(question)
    }

    pub fn update(&mut self, value: impl Into<String>) -> Result<()> {
        if self.deleted {
            return Err(QuestionError::AlreadyDeleted);
        }
        self.raise(QuestionEvent::Updated {
            key: self.key.clone(),
            new_value: value.into(),
        });
        Ok(())
    }

    pub fn delete(&mut self) -> Result<()> {
        if self.deleted {
            return Err(QuestionError::AlreadyDeleted);
        }
        self.raise(QuestionEvent::Deleted {
            key: self.key.clone(),
        });
        Ok(())
    }

    pub fn events(&self) -> &[QuestionEvent] {
        &self.history
    }

    fn raise(&mut self, event: QuestionEvent) {
        let is_initial = self.history.is_empty();
        self.history.push(event.clone());
        self.apply(&event, is_initial);
    }

    fn apply(&mut self, event: &QuestionEvent, is_initial: bool) {
        match event {
            QuestionEvent::Added { id, key, value } => {
                self.id = id.clone();
                self.key = key.clone();
                self.value = value.clone();
            }
            QuestionEvent::Updated { new_value, .. } => {
                self.value = new_value.clone();
            }
            QuestionEvent::Deleted { .. } => {
                self.deleted = true;
            }
        }
        if !is_initial {
            self.version += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id() -> QuestionId {
        QuestionId::from_bytes(b"test_id".to_vec())
    }

    fn lifecycle_events() -> Vec<QuestionEvent> {
        vec![
            QuestionEvent::Added {
                id: test_id(),
                key: "capital".into(),
                value: "Paris".into(),
            },
            QuestionEvent::Updated {
                key: "capital".into(),
                new_value: "Lyon".into(),
            },
            QuestionEvent::Updated {
                key: "capital".into(),
                new_value: "Marseille".into(),
            },
            QuestionEvent::Deleted {
                key: "capital".into(),
            },
        ]
    }

    #[test]
    fn fresh_question_has_single_event_history() {
        let question = Question::new(test_id(), "capital", "Paris");
        assert_eq!(question.key, "capital");
        assert_eq!(question.value, "Paris");
        assert_eq!(question.version, 0);
        assert!(!question.deleted);
        assert_eq!(question.events().len(), 1);
        assert_eq!(question.events()[0].short_name(), "add");
    }

    #[test]
    fn rehydrates_full_lifecycle() {
        let events = lifecycle_events();
        let question = Question::from_events(events.clone()).unwrap();

        assert_eq!(question.id, test_id());
        assert_eq!(question.key, "capital");
        assert_eq!(question.value, "Marseille");
        assert!(question.deleted);
        assert_eq!(question.version, 3);
        assert_eq!(question.events(), events.as_slice());
    }

    #[test]
    fn version_rule_is_replay_consistent() {
        let mut fresh = Question::new(test_id(), "capital", "Paris");
        fresh.update("Lyon").unwrap();
        fresh.update("Marseille").unwrap();
        fresh.delete().unwrap();

        let rehydrated = Question::from_events(fresh.history.clone()).unwrap();
        assert_eq!(fresh, rehydrated);
        assert_eq!(rehydrated.version, 3);
    }

    #[test]
    fn replay_is_idempotent() {
        let first = Question::from_events(lifecycle_events()).unwrap();
        let second = Question::from_events(first.history.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn update_after_delete_is_rejected() {
        let mut question = Question::new(test_id(), "capital", "Paris");
        question.delete().unwrap();

        let before = question.clone();
        assert!(matches!(
            question.update("Lyon"),
            Err(QuestionError::AlreadyDeleted)
        ));
        assert!(matches!(
            question.delete(),
            Err(QuestionError::AlreadyDeleted)
        ));
        assert_eq!(question, before);
    }

    #[test]
    fn rejects_empty_history() {
        let err = Question::from_events(Vec::new()).unwrap_err();
        assert!(matches!(err, QuestionError::Decode(_)));
    }

    #[test]
    fn rejects_history_not_starting_with_add() {
        let err = Question::from_events(vec![QuestionEvent::Deleted {
            key: "capital".into(),
        }])
        .unwrap_err();
        assert!(matches!(err, QuestionError::Decode(_)));
    }

    #[test]
    fn events_render_short_names_and_data() {
        let events = lifecycle_events();
        let names: Vec<_> = events.iter().map(QuestionEvent::short_name).collect();
        assert_eq!(names, ["add", "update", "update", "delete"]);

        assert_eq!(events[1].data().value, "Lyon");
        assert_eq!(events[3].data().key, "capital");
        assert_eq!(events[3].data().value, "");
    }
}
