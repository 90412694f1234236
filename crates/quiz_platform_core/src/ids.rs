//! crates/quiz_platform_core/src/ids.rs
//!
//! Compact, prefixed, zero-padded sequential identifiers such as `TE003`,
//! `QU012` or `TR000007`.
//!
//! Store adapters call [`allocate`] around their insert. Each attempt is
//! expected to compute the next id inside the same store transaction as the
//! insert; a primary-key collision surfaces as `PortError::IdCollision` and is
//! retried, and after the bounded retries a single timestamp-derived id is
//! tried before giving up.

use crate::domain::Role;
use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::warn;

/// Sequential attempts before falling back to a timestamp-derived id.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSequence {
    pub prefix: &'static str,
    pub width: usize,
}

impl IdSequence {
    pub const TEACHER: IdSequence = IdSequence { prefix: "TE", width: 3 };
    pub const STUDENT: IdSequence = IdSequence { prefix: "ST", width: 3 };
    pub const ADMIN: IdSequence = IdSequence { prefix: "AD", width: 3 };
    pub const SUBSCRIPTION: IdSequence = IdSequence { prefix: "SB", width: 3 };
    pub const AVATAR: IdSequence = IdSequence { prefix: "AV", width: 3 };
    pub const QUIZ: IdSequence = IdSequence { prefix: "QZ", width: 3 };
    pub const QUESTION: IdSequence = IdSequence { prefix: "QU", width: 3 };
    pub const TRANSACTION: IdSequence = IdSequence { prefix: "TR", width: 6 };

    pub fn for_role(role: Role) -> IdSequence {
        match role {
            Role::Teacher => Self::TEACHER,
            Role::Student => Self::STUDENT,
            Role::Admin => Self::ADMIN,
        }
    }

    pub fn format(&self, n: u64) -> String {
        format!("{}{:0width$}", self.prefix, n, width = self.width)
    }

    /// The numeric suffix of `id` if it belongs to this sequence.
    pub fn suffix_of(&self, id: &str) -> Option<u64> {
        let digits = id.strip_prefix(self.prefix)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Next id after the numerically largest existing suffix. Ids that do not
    /// belong to the sequence are ignored.
    pub fn next_after<'a, I>(&self, existing: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        let max = existing
            .into_iter()
            .filter_map(|id| self.suffix_of(id))
            .max()
            .unwrap_or(0);
        self.format(max + 1)
    }

    /// Id derived from the current time, used once retries are exhausted.
    pub fn fallback(&self, now: DateTime<Utc>) -> String {
        format!("{}{}", self.prefix, now.timestamp_millis())
    }
}

/// What a single insert attempt should use as its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdCandidate {
    /// Compute max + 1 inside the insert's own store transaction.
    Next,
    /// Use this exact id.
    Fixed(String),
}

/// Runs `insert` until it stops reporting id collisions.
pub async fn allocate<T, F, Fut>(seq: IdSequence, mut insert: F) -> PortResult<T>
where
    F: FnMut(IdCandidate) -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        match insert(IdCandidate::Next).await {
            Err(PortError::IdCollision(id)) => {
                warn!(prefix = seq.prefix, attempt, "id {} already taken, retrying", id);
            }
            other => return other,
        }
    }

    let fallback = seq.fallback(Utc::now());
    warn!(prefix = seq.prefix, "sequential allocation exhausted, trying {}", fallback);
    match insert(IdCandidate::Fixed(fallback)).await {
        Err(PortError::IdCollision(_)) => Err(PortError::IdCollision(seq.prefix.to_string())),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn formats_with_fixed_width() {
        assert_eq!(IdSequence::TEACHER.format(3), "TE003");
        assert_eq!(IdSequence::TRANSACTION.format(7), "TR000007");
        assert_eq!(IdSequence::QUESTION.format(1234), "QU1234");
    }

    #[test]
    fn next_uses_numeric_not_lexicographic_order() {
        let existing = ["TE9", "TE10", "TE002"];
        assert_eq!(IdSequence::TEACHER.next_after(existing), "TE011");
    }

    #[test]
    fn next_ignores_foreign_prefixes_and_starts_at_one() {
        assert_eq!(IdSequence::STUDENT.next_after(["TE005", "STX", "ST"]), "ST001");
        assert_eq!(IdSequence::STUDENT.next_after(Vec::<&str>::new()), "ST001");
    }

    #[tokio::test]
    async fn retries_collisions_then_succeeds() {
        let calls = AtomicU32::new(0);
        let id = allocate(IdSequence::QUIZ, |candidate| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(candidate, IdCandidate::Next);
                if n < 2 {
                    Err(PortError::IdCollision("QZ001".to_string()))
                } else {
                    Ok("QZ002".to_string())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(id, "QZ002");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_to_timestamp_then_gives_up() {
        let seen = std::sync::Mutex::new(Vec::new());
        let result: PortResult<String> = allocate(IdSequence::QUIZ, |candidate| {
            seen.lock().unwrap().push(candidate);
            async { Err(PortError::IdCollision("QZ001".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(PortError::IdCollision(_))));
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), MAX_ATTEMPTS as usize + 1);
        assert!(matches!(seen.last(), Some(IdCandidate::Fixed(id)) if id.starts_with("QZ")));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: PortResult<()> = allocate(IdSequence::AVATAR, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PortError::Unexpected("db down".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(PortError::Unexpected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
