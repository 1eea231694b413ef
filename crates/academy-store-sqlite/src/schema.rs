//! SQL schema for the academy SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS enrollments (
    enrollment_id  TEXT PRIMARY KEY,  -- payment_<id> or enrollment_<user>_<course>_<ms>
    user_id        TEXT NOT NULL,
    course_id      TEXT NOT NULL,
    cohort_id      TEXT NOT NULL,
    status         TEXT NOT NULL,     -- 'pending' | 'active' | 'completed' | 'cancelled'
    payment_status TEXT NOT NULL,     -- 'pending' | 'paid' | 'failed' | 'refunded'
    enrolled_at    TEXT NOT NULL,     -- ISO 8601 UTC; store-assigned
    completed_at   TEXT,
    payment_id     TEXT,
    customer_ref   TEXT,
    amount_cents   INTEGER,
    updated_at     TEXT NOT NULL
);

-- Backstop for the creation transaction: one active enrollment per
-- (user, course).
CREATE UNIQUE INDEX IF NOT EXISTS enrollments_one_active_idx
    ON enrollments(user_id, course_id) WHERE status = 'active';

CREATE INDEX IF NOT EXISTS enrollments_user_idx   ON enrollments(user_id);
CREATE INDEX IF NOT EXISTS enrollments_cohort_idx ON enrollments(cohort_id);
CREATE INDEX IF NOT EXISTS enrollments_course_idx ON enrollments(course_id);
CREATE INDEX IF NOT EXISTS enrollments_status_idx ON enrollments(status);

CREATE TABLE IF NOT EXISTS cohorts (
    cohort_id        TEXT PRIMARY KEY,
    course_id        TEXT NOT NULL,
    name             TEXT NOT NULL,
    start_date       TEXT NOT NULL,
    end_date         TEXT NOT NULL,
    max_students     INTEGER NOT NULL,
    current_students INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL,
    pricing_json     TEXT NOT NULL,   -- JSON Pricing
    coupons_json     TEXT NOT NULL DEFAULT '[]'  -- JSON array; dates in mixed forms
);

CREATE TABLE IF NOT EXISTS lessons (
    lesson_id        TEXT PRIMARY KEY,
    course_id        TEXT NOT NULL,
    title            TEXT NOT NULL,
    lesson_order     INTEGER NOT NULL,
    duration_minutes INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS lessons_course_idx ON lessons(course_id, lesson_order);

CREATE TABLE IF NOT EXISTS lesson_progress (
    user_id            TEXT NOT NULL,
    lesson_id          TEXT NOT NULL,
    course_id          TEXT NOT NULL,
    completed          INTEGER NOT NULL DEFAULT 0,
    completed_at       TEXT,
    watched_percentage REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, lesson_id)
);

CREATE TABLE IF NOT EXISTS user_achievements (
    achievement_id TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    kind           TEXT NOT NULL,
    awarded_at     TEXT NOT NULL,
    UNIQUE (user_id, kind)
);

CREATE TABLE IF NOT EXISTS user_profiles (
    user_id         TEXT PRIMARY KEY,
    cached_progress TEXT,             -- JSON CachedProgress
    updated_at      TEXT NOT NULL
);

PRAGMA user_version = 1;
";
