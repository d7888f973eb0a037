use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::instrument;

use super::entities::{AttemptStatus, Program, ProgramAttempt};
use super::Tx;

const PROGRAM_COLUMNS: &str =
    "id, user_id, feed_id, title, audio_url, audio_duration, image_url, created_at";
const ATTEMPT_COLUMNS: &str =
    "id, user_id, feed_id, status, reason, post_count, program_id, created_at";

pub struct NewProgramRow<'a> {
    pub user_id: &'a str,
    pub feed_id: i64,
    pub title: &'a str,
    pub audio_url: &'a str,
    pub audio_duration: i64,
    pub image_url: Option<&'a str>,
    pub created_at: OffsetDateTime,
}

pub struct NewAttemptRow<'a> {
    pub user_id: &'a str,
    pub feed_id: i64,
    pub status: AttemptStatus,
    pub reason: Option<&'a str>,
    pub post_count: i64,
    pub program_id: Option<i64>,
}

impl Tx {
    #[instrument(level = "TRACE", skip(self, program), fields(user_id = program.user_id))]
    pub async fn insert_program(&mut self, program: NewProgramRow<'_>) -> Result<Program> {
        sqlx::query_as(&format!(
            "INSERT
            INTO programs (user_id, feed_id, title, audio_url, audio_duration, image_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {PROGRAM_COLUMNS}"
        ))
        .bind(program.user_id)
        .bind(program.feed_id)
        .bind(program.title)
        .bind(program.audio_url)
        .bind(program.audio_duration)
        .bind(program.image_url)
        .bind(program.created_at)
        .fetch_one(self.0.as_mut())
        .await
        .context("could not insert a program")
    }

    /// Returns the user's `count` most recently created programs, newest first.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_recent_programs(&mut self, user_id: &str, count: usize) -> Result<Vec<Program>> {
        sqlx::query_as(&format!(
            "SELECT {PROGRAM_COLUMNS}
            FROM programs
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2"
        ))
        .bind(user_id)
        .bind(count as i64)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve recent programs")
    }

    #[instrument(level = "TRACE", skip(self, attempt), fields(feed_id = attempt.feed_id))]
    pub async fn insert_attempt(&mut self, attempt: NewAttemptRow<'_>) -> Result<ProgramAttempt> {
        sqlx::query_as(&format!(
            "INSERT
            INTO program_attempts (user_id, feed_id, status, reason, post_count, program_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(attempt.user_id)
        .bind(attempt.feed_id)
        .bind(attempt.status)
        .bind(attempt.reason)
        .bind(attempt.post_count)
        .bind(attempt.program_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.0.as_mut())
        .await
        .context("could not insert a program attempt")
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_attempts(&mut self, feed_id: i64, count: usize) -> Result<Vec<ProgramAttempt>> {
        sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS}
            FROM program_attempts
            WHERE feed_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2"
        ))
        .bind(feed_id)
        .bind(count as i64)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve program attempts")
    }

    /// Returns the number of attempts per status along with the latest attempt time.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_attempt_counts(
        &mut self,
        feed_id: i64,
    ) -> Result<(Vec<(AttemptStatus, i64)>, Option<OffsetDateTime>)> {
        let counts = sqlx::query_as(
            "SELECT status, COUNT(*)
            FROM program_attempts
            WHERE feed_id = ?1
            GROUP BY status",
        )
        .bind(feed_id)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not count program attempts")?;

        let last_attempt_at = sqlx::query_scalar(
            "SELECT created_at
            FROM program_attempts
            WHERE feed_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT 1",
        )
        .bind(feed_id)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve the last attempt time")?;

        Ok((counts, last_attempt_at))
    }
}
