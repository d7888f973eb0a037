use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::publish::RssPublisher;
use crate::storage::entities::{AttemptStatus, Program, ProgramAttempt};
use crate::storage::{NewAttemptRow, NewProgramRow, Storage};

#[derive(Deserialize, Debug, Clone)]
pub struct NewProgram {
    pub title: String,
    pub audio_url: String,

    /// In milliseconds.
    pub audio_duration: i64,

    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewAttempt {
    pub status: AttemptStatus,

    #[serde(default)]
    pub reason: Option<String>,
    pub post_count: i64,

    #[serde(default)]
    pub program: Option<NewProgram>,
}

impl NewAttempt {
    fn validate(&self) -> Result<()> {
        if self.post_count < 0 {
            return Err(Error::validation("post_count must not be negative"));
        }

        let Some(program) = &self.program else {
            return Ok(());
        };

        if self.status != AttemptStatus::Success {
            return Err(Error::validation(
                "only a successful attempt can produce a program",
            ));
        }

        if program.title.trim().is_empty() {
            return Err(Error::validation("program title must not be empty"));
        }

        if program.audio_url.trim().is_empty() {
            return Err(Error::validation("program audio URL must not be empty"));
        }

        if program.audio_duration <= 0 {
            return Err(Error::validation("program duration must be positive"));
        }

        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecordedAttempt {
    pub attempt: ProgramAttempt,
    pub program: Option<Program>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AttemptStats {
    pub total: i64,
    pub success: i64,
    pub skipped: i64,
    pub failed: i64,

    /// `success / total`, or zero without attempts.
    pub success_rate: f64,

    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
}

impl AttemptStats {
    fn new(counts: &[(AttemptStatus, i64)], last_attempt_at: Option<OffsetDateTime>) -> Self {
        let count_of = |status: AttemptStatus| {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| n)
                .sum::<i64>()
        };

        let success = count_of(AttemptStatus::Success);
        let skipped = count_of(AttemptStatus::Skipped);
        let failed = count_of(AttemptStatus::Failed);
        let total = success + skipped + failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            success as f64 / total as f64
        };

        Self {
            total,
            success,
            skipped,
            failed,
            success_rate,
            last_attempt_at,
        }
    }
}

/// Records the outcome of each program generation run for a feed.
#[derive(Clone)]
pub struct Attempts {
    storage: Arc<Storage>,
    publisher: RssPublisher,
    notifier: Notifier,
}

impl Attempts {
    pub fn new(storage: Arc<Storage>, publisher: RssPublisher, notifier: Notifier) -> Self {
        Self {
            storage,
            publisher,
            notifier,
        }
    }

    /// Stores an attempt along with the program it produced, if any.
    ///
    /// A new program is pushed to the user's RSS feed once the attempt is committed.
    #[instrument(level = "DEBUG", skip(self, attempt), fields(status = ?attempt.status))]
    pub async fn record(
        &self,
        user_id: &str,
        feed_id: i64,
        attempt: NewAttempt,
    ) -> Result<RecordedAttempt> {
        attempt.validate()?;

        let mut tx = self.storage.begin().await?;
        let feed = tx
            .find_owned_feed(user_id, feed_id)
            .await?
            .ok_or(Error::NotFound("feed"))?;

        let program = match &attempt.program {
            Some(program) => Some(
                tx.insert_program(NewProgramRow {
                    user_id,
                    feed_id,
                    title: &program.title,
                    audio_url: &program.audio_url,
                    audio_duration: program.audio_duration,
                    image_url: program.image_url.as_deref(),
                    created_at: OffsetDateTime::now_utc(),
                })
                .await?,
            ),

            None => None,
        };

        let recorded = tx
            .insert_attempt(NewAttemptRow {
                user_id,
                feed_id,
                status: attempt.status,
                reason: attempt.reason.as_deref(),
                post_count: attempt.post_count,
                program_id: program.as_ref().map(|program| program.id),
            })
            .await?;
        tx.commit().await?;

        info!(
            feed_id,
            attempt_id = recorded.id,
            post_count = recorded.post_count,
            "Recorded a program attempt"
        );

        match recorded.status {
            AttemptStatus::Success if program.is_some() => {
                if let Err(e) = self.publisher.refresh(user_id).await {
                    warn!(user_id, "Could not refresh the RSS feed: {e:#}");
                }
            }

            AttemptStatus::Failed => self.notifier.notify(format!(
                "Program generation failed for the feed \"{}\" ({}): {}",
                feed.name,
                feed.id,
                recorded.reason.as_deref().unwrap_or("no reason given"),
            )),

            _ => {}
        }

        Ok(RecordedAttempt {
            attempt: recorded,
            program,
        })
    }

    /// Returns the feed's latest attempts, newest first.
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn list(&self, user_id: &str, feed_id: i64, limit: usize) -> Result<Vec<ProgramAttempt>> {
        let mut tx = self.storage.begin().await?;
        tx.find_owned_feed(user_id, feed_id)
            .await?
            .ok_or(Error::NotFound("feed"))?;
        let attempts = tx.get_attempts(feed_id, limit).await?;
        tx.commit().await?;

        Ok(attempts)
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn stats(&self, user_id: &str, feed_id: i64) -> Result<AttemptStats> {
        let mut tx = self.storage.begin().await?;
        tx.find_owned_feed(user_id, feed_id)
            .await?
            .ok_or(Error::NotFound("feed"))?;
        let (counts, last_attempt_at) = tx.get_attempt_counts(feed_id).await?;
        tx.commit().await?;

        Ok(AttemptStats::new(&counts, last_attempt_at))
    }

    /// Returns the user's latest programs, newest first.
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn programs(&self, user_id: &str, limit: usize) -> Result<Vec<Program>> {
        let mut tx = self.storage.begin().await?;
        let programs = tx.get_recent_programs(user_id, limit).await?;
        tx.commit().await?;

        Ok(programs)
    }
}
