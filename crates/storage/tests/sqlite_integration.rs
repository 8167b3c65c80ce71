use chrono::Duration;
use course_core::model::UserId;
use course_core::time::fixed_now;
use storage::repository::{StorageError, UserProfile, UserRecordRepository};
use storage::sqlite::SqliteRepository;

fn profile() -> UserProfile {
    UserProfile {
        username: Some("learner".into()),
        first_name: Some("Ada".into()),
        last_name: None,
    }
}

#[tokio::test]
async fn sqlite_get_or_create_persists_profile_and_touches_activity() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_users?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo.migrate().await.expect("migrations are idempotent");

    let user = UserId::new(-100_500);
    let created = repo
        .get_or_create(user, &profile(), fixed_now())
        .await
        .unwrap();
    assert_eq!(created.resume_cursor, 0);
    assert_eq!(created.created_at, fixed_now());

    let later = fixed_now() + Duration::days(4);
    let again = repo
        .get_or_create(user, &UserProfile::default(), later)
        .await
        .unwrap();
    assert_eq!(again.last_activity, fixed_now());
    assert_eq!(again.profile.username.as_deref(), Some("learner"));
    assert_eq!(again.profile.last_name, None);

    let third = repo.get_or_create(user, &profile(), later).await.unwrap();
    assert_eq!(third.last_activity, later);
}

#[tokio::test]
async fn sqlite_cursor_updates_and_inactive_lookup() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_inactive?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let old = fixed_now() - Duration::days(10);
    let idle = UserId::new(1);
    let fresh = UserId::new(2);
    let never_started = UserId::new(3);

    repo.get_or_create(idle, &profile(), old).await.unwrap();
    repo.update_cursor(idle, 5, old).await.unwrap();
    repo.get_or_create(fresh, &profile(), fixed_now()).await.unwrap();
    repo.update_cursor(fresh, 2, fixed_now()).await.unwrap();
    repo.get_or_create(never_started, &profile(), old).await.unwrap();

    let found = repo
        .inactive_since(fixed_now() - Duration::days(3))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].user_id, idle);
    assert_eq!(found[0].resume_cursor, 5);

    let err = repo
        .update_cursor(UserId::new(99), 1, fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_completion_mark_hides_finished_learners() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_completed?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let old = fixed_now() - Duration::days(10);
    let user = UserId::new(7);
    repo.get_or_create(user, &profile(), old).await.unwrap();
    repo.update_cursor(user, 3, old).await.unwrap();
    repo.mark_completed(user, old).await.unwrap();

    let cutoff = fixed_now() - Duration::days(3);
    assert!(repo.inactive_since(cutoff).await.unwrap().is_empty());
    let record = repo.get_or_create(user, &profile(), old).await.unwrap();
    assert_eq!(record.completed_at, Some(old));

    repo.update_cursor(user, 0, old).await.unwrap();
    repo.update_cursor(user, 1, old).await.unwrap();
    let idle = repo.inactive_since(cutoff).await.unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].completed_at, None);

    let err = repo
        .mark_completed(UserId::new(99), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}
