//! Integration tests for `SqliteStore` against an in-memory database.

use academy_core::{
  achievement::AchievementKind,
  cohort::{Cohort, CohortStatus, Coupon, Pricing},
  course::Lesson,
  enrollment::{
    Creation, EnrollmentQuery, EnrollmentStatus, EnrollmentUpdate, NewEnrollment,
    PaymentStatus, Reactivation,
  },
  progress::{LessonProgress, ProgressInputs, compute_progress},
  store::{EnrollmentStore, ProgressStore},
};
use chrono::{Duration, TimeZone, Utc};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn cohort(id: &str, course: &str) -> Cohort {
  let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
  Cohort {
    cohort_id:        id.into(),
    course_id:        course.into(),
    name:             format!("Cohort {id}"),
    start_date:       start,
    end_date:         start + Duration::weeks(8),
    max_students:     25,
    current_students: 0,
    status:           CohortStatus::Upcoming,
    pricing:          Pricing {
      base_price_cents:       29_900,
      currency:               "usd".into(),
      early_bird_price_cents: Some(19_900),
      early_bird_deadline:    Some(start - Duration::days(7)),
    },
    coupons:          vec![Coupon {
      code:             "FRIENDS".into(),
      discount_percent: 20,
      valid_from:       None,
      valid_until:      Some(start),
      max_uses:         Some(10),
      used_count:       2,
    }],
  }
}

async fn seeded() -> SqliteStore {
  let s = store().await;
  s.put_cohort(cohort("h1", "c1")).await.unwrap();
  s.put_cohort(cohort("h2", "c2")).await.unwrap();
  s
}

async fn current_students(s: &SqliteStore, cohort_id: &str) -> u32 {
  s.get_cohort(cohort_id).await.unwrap().unwrap().current_students
}

fn created_id(c: Creation) -> String {
  match c {
    Creation::Created(id) => id,
    other => panic!("expected a new enrollment, got {other:?}"),
  }
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_enrollment() {
  let s = seeded().await;

  let mut input = NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1");
  input.payment_status = Some(PaymentStatus::Paid);
  input.amount_cents = Some(29_900);
  let id = created_id(s.create_enrollment(input).await.unwrap());
  assert_eq!(id, "payment_pi_1");

  let e = s.get_enrollment(&id).await.unwrap().unwrap();
  assert_eq!(e.user_id, "u1");
  assert_eq!(e.status, EnrollmentStatus::Active);
  assert_eq!(e.payment_status, PaymentStatus::Paid);
  assert_eq!(e.payment_id.as_deref(), Some("pi_1"));
  assert_eq!(e.amount_cents, Some(29_900));
  assert!(e.completed_at.is_none());
}

#[tokio::test]
async fn get_enrollment_missing_returns_none() {
  let s = store().await;
  assert!(s.get_enrollment("payment_nope").await.unwrap().is_none());
}

#[tokio::test]
async fn replaying_a_payment_is_idempotent() {
  let s = seeded().await;
  let input = NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1");

  let first = s.create_enrollment(input.clone()).await.unwrap();
  let second = s.create_enrollment(input).await.unwrap();

  assert_eq!(first, Creation::Created("payment_pi_1".into()));
  assert_eq!(second, Creation::Existing("payment_pi_1".into()));
  let all = s.list_enrollments(&EnrollmentQuery::All).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(current_students(&s, "h1").await, 1);
}

#[tokio::test]
async fn second_payment_reuses_active_enrollment() {
  let s = seeded().await;
  let first = created_id(
    s.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1"))
      .await
      .unwrap(),
  );
  let second = s
    .create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_2"))
    .await
    .unwrap();

  assert_eq!(second, Creation::Existing(first));
  assert!(s.get_enrollment("payment_pi_2").await.unwrap().is_none());
  assert_eq!(current_students(&s, "h1").await, 1);
}

#[tokio::test]
async fn concurrent_creates_yield_one_active_enrollment() {
  let s = seeded().await;
  let a = s.clone();
  let b = s.clone();

  let (ra, rb) = tokio::join!(
    tokio::spawn(async move {
      a.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_a"))
        .await
    }),
    tokio::spawn(async move {
      b.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_b"))
        .await
    }),
  );
  let (ra, rb) = (ra.unwrap().unwrap(), rb.unwrap().unwrap());

  let active = s
    .list_enrollments(&EnrollmentQuery::Status(EnrollmentStatus::Active))
    .await
    .unwrap();
  assert_eq!(active.len(), 1);

  let winner = active[0].enrollment_id.clone();
  let ids: Vec<String> = [ra, rb]
    .into_iter()
    .map(|c| match c {
      Creation::Created(id) | Creation::Existing(id) => id,
      Creation::CohortNotFound(_) => panic!("cohort exists"),
    })
    .collect();
  assert_eq!(ids, vec![winner.clone(), winner]);
  assert_eq!(current_students(&s, "h1").await, 1);
}

#[tokio::test]
async fn cohort_counter_tracks_new_active_enrollments() {
  let s = seeded().await;
  for n in 0..5 {
    let input = NewEnrollment::new(format!("user{n}"), "c1", "h1")
      .with_payment(format!("pi_{n}"));
    created_id(s.create_enrollment(input.clone()).await.unwrap());
    // Replays never move the counter.
    s.create_enrollment(input).await.unwrap();
  }
  assert_eq!(current_students(&s, "h1").await, 5);
  assert_eq!(current_students(&s, "h2").await, 0);
}

#[tokio::test]
async fn pending_enrollment_leaves_counter_alone() {
  let s = seeded().await;
  let input = NewEnrollment::new("u1", "c1", "h1")
    .with_payment("pi_1")
    .with_status(EnrollmentStatus::Pending);
  created_id(s.create_enrollment(input).await.unwrap());
  assert_eq!(current_students(&s, "h1").await, 0);

  // A pending record does not block an active one.
  let active = NewEnrollment::new("u1", "c1", "h1").with_payment("pi_2");
  created_id(s.create_enrollment(active).await.unwrap());
  assert_eq!(current_students(&s, "h1").await, 1);
}

#[tokio::test]
async fn missing_cohort_rolls_back_creation() {
  let s = store().await;
  let result = s
    .create_enrollment(NewEnrollment::new("u1", "c1", "ghost").with_payment("pi_1"))
    .await
    .unwrap();
  assert_eq!(result, Creation::CohortNotFound("ghost".into()));
  assert!(s.get_enrollment("payment_pi_1").await.unwrap().is_none());
}

#[tokio::test]
async fn enrollment_without_payment_gets_synthesized_key() {
  let s = seeded().await;
  let id = created_id(
    s.create_enrollment(NewEnrollment::new("u9", "c2", "h2"))
      .await
      .unwrap(),
  );
  assert!(id.starts_with("enrollment_u9_c2_"));
}

// ─── Updates ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_applies_supplied_fields_only() {
  let s = seeded().await;
  let mut input = NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1");
  input.customer_ref = Some("cus_1".into());
  let id = created_id(s.create_enrollment(input).await.unwrap());

  let done_at = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
  let updated = s
    .update_enrollment(
      &id,
      EnrollmentUpdate {
        status: Some(EnrollmentStatus::Completed),
        completed_at: Some(done_at),
        ..Default::default()
      },
    )
    .await
    .unwrap()
    .unwrap();

  assert_eq!(updated.status, EnrollmentStatus::Completed);
  assert_eq!(updated.completed_at, Some(done_at));
  assert_eq!(updated.customer_ref.as_deref(), Some("cus_1"));
  assert_eq!(updated.payment_status, PaymentStatus::Pending);
  assert!(updated.updated_at >= updated.enrolled_at);
}

#[tokio::test]
async fn update_missing_enrollment_returns_none() {
  let s = store().await;
  let result = s
    .update_enrollment("payment_x", EnrollmentUpdate::default())
    .await
    .unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn cancelling_keeps_the_seat() {
  let s = seeded().await;
  let id = created_id(
    s.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1"))
      .await
      .unwrap(),
  );
  s.update_enrollment(
    &id,
    EnrollmentUpdate {
      status: Some(EnrollmentStatus::Cancelled),
      ..Default::default()
    },
  )
  .await
  .unwrap();
  assert_eq!(current_students(&s, "h1").await, 1);
}

// ─── Reactivation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reactivation_rechecks_uniqueness() {
  let s = seeded().await;
  let cancel = EnrollmentUpdate {
    status: Some(EnrollmentStatus::Cancelled),
    ..Default::default()
  };

  let old = created_id(
    s.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_1"))
      .await
      .unwrap(),
  );
  s.update_enrollment(&old, cancel.clone()).await.unwrap();

  let new = created_id(
    s.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("pi_2"))
      .await
      .unwrap(),
  );

  let r = s.reactivate_enrollment(&old).await.unwrap();
  assert_eq!(r, Reactivation::Conflict { active_enrollment_id: new.clone() });

  s.update_enrollment(&new, cancel).await.unwrap();
  let r = s.reactivate_enrollment(&old).await.unwrap();
  assert!(matches!(r, Reactivation::Reactivated(ref e) if e.status == EnrollmentStatus::Active));

  let r = s.reactivate_enrollment(&old).await.unwrap();
  assert!(matches!(r, Reactivation::AlreadyActive(_)));

  let r = s.reactivate_enrollment("payment_missing").await.unwrap();
  assert_eq!(r, Reactivation::NotFound);
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn queries_filter_by_field() {
  let s = seeded().await;
  s.create_enrollment(NewEnrollment::new("u1", "c1", "h1").with_payment("p1"))
    .await
    .unwrap();
  s.create_enrollment(NewEnrollment::new("u1", "c2", "h2").with_payment("p2"))
    .await
    .unwrap();
  s.create_enrollment(NewEnrollment::new("u2", "c1", "h1").with_payment("p3"))
    .await
    .unwrap();
  s.update_enrollment(
    "payment_p3",
    EnrollmentUpdate {
      status: Some(EnrollmentStatus::Cancelled),
      ..Default::default()
    },
  )
  .await
  .unwrap();

  let by_user = s.list_enrollments(&EnrollmentQuery::User("u1".into())).await.unwrap();
  assert_eq!(by_user.len(), 2);
  let by_cohort = s.list_enrollments(&EnrollmentQuery::Cohort("h1".into())).await.unwrap();
  assert_eq!(by_cohort.len(), 2);
  let by_course = s.list_enrollments(&EnrollmentQuery::Course("c2".into())).await.unwrap();
  assert_eq!(by_course.len(), 1);
  let cancelled = s
    .list_enrollments(&EnrollmentQuery::Status(EnrollmentStatus::Cancelled))
    .await
    .unwrap();
  assert_eq!(cancelled.len(), 1);
  assert_eq!(cancelled[0].enrollment_id, "payment_p3");

  let active = s.find_active_enrollment("u1", "c2").await.unwrap().unwrap();
  assert_eq!(active.enrollment_id, "payment_p2");
  assert!(s.find_active_enrollment("u2", "c1").await.unwrap().is_none());
}

// ─── Cohorts ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cohort_roundtrip() {
  let s = store().await;
  let c = cohort("h1", "c1");
  s.put_cohort(c.clone()).await.unwrap();
  assert_eq!(s.get_cohort("h1").await.unwrap().unwrap(), c);
  assert!(s.get_cohort("h9").await.unwrap().is_none());
}

#[tokio::test]
async fn coupon_dates_are_normalised_on_read() {
  let s = store().await;
  s.execute_raw(
    r#"INSERT INTO cohorts (
         cohort_id, course_id, name, start_date, end_date, max_students,
         current_students, status, pricing_json, coupons_json
       ) VALUES (
         'h1', 'c1', 'Legacy', '2025-01-01T00:00:00+00:00', '2025-03-01T00:00:00+00:00',
         10, 3, 'active',
         '{"base_price_cents":1000,"currency":"usd","early_bird_price_cents":null,"early_bird_deadline":null}',
         '[{"code":"A","discount_percent":5,"valid_from":{"seconds":1735689600,"nanoseconds":0},"valid_until":1738368000000},
           {"code":"B","discount_percent":5,"valid_from":"2025-01-01","valid_until":"2025-02-01T12:30"}]'
       );"#,
  )
  .await
  .unwrap();

  let c = s.get_cohort("h1").await.unwrap().unwrap();
  let jan_1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
  assert_eq!(c.coupons[0].valid_from, Some(jan_1));
  assert_eq!(
    c.coupons[0].valid_until,
    Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
  );
  assert_eq!(c.coupons[1].valid_from, Some(jan_1));
  assert_eq!(
    c.coupons[1].valid_until,
    Some(Utc.with_ymd_and_hms(2025, 2, 1, 12, 30, 0).unwrap())
  );
}

// ─── Progress collections ────────────────────────────────────────────────────

#[tokio::test]
async fn lessons_come_back_in_order() {
  let s = store().await;
  for n in [3, 1, 2] {
    s.save_lesson(Lesson {
      lesson_id:        format!("l{n}"),
      course_id:        "c1".into(),
      title:            format!("Lesson {n}"),
      order:            n,
      duration_minutes: 15,
    })
    .await
    .unwrap();
  }
  let lessons = s.load_course_lessons("c1").await.unwrap();
  assert_eq!(
    lessons.iter().map(|l| l.order).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );
  assert!(s.load_course_lessons("c9").await.unwrap().is_empty());
}

#[tokio::test]
async fn lesson_progress_upserts() {
  let s = store().await;
  let mut record = LessonProgress {
    user_id:            "u1".into(),
    lesson_id:          "l1".into(),
    course_id:          "c1".into(),
    completed:          false,
    completed_at:       None,
    watched_percentage: 40.0,
  };
  s.save_lesson_progress(record.clone()).await.unwrap();
  record.completed = true;
  record.completed_at = Some(Utc::now());
  record.watched_percentage = 100.0;
  s.save_lesson_progress(record.clone()).await.unwrap();

  let records = s.load_lesson_progress("u1").await.unwrap();
  assert_eq!(records.len(), 1);
  assert!(records[0].completed);
  assert!((records[0].watched_percentage - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn achievements_are_awarded_once() {
  let s = store().await;
  let first = s.award_achievement("u1", AchievementKind::FirstLesson).await.unwrap();
  assert!(first.is_some());
  let again = s.award_achievement("u1", AchievementKind::FirstLesson).await.unwrap();
  assert!(again.is_none());
  s.award_achievement("u1", AchievementKind::FiveLessons).await.unwrap();

  let held = s.load_achievements("u1").await.unwrap();
  assert_eq!(held.len(), 2);
  assert!(s.load_achievements("u2").await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_progress_persists_and_overwrites() {
  let s = store().await;
  assert!(s.load_cached_progress("u1").await.unwrap().is_none());

  let now = Utc::now();
  let mut p = compute_progress("u1", &ProgressInputs::default(), now);
  s.save_cached_progress(&p).await.unwrap();
  assert_eq!(s.load_cached_progress("u1").await.unwrap().unwrap(), p);

  p.completed_lessons = 4;
  s.save_cached_progress(&p).await.unwrap();
  assert_eq!(
    s.load_cached_progress("u1").await.unwrap().unwrap().completed_lessons,
    4
  );
}
