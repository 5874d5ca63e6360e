use meversedb::accounts::{AccountCreate, AccountPatch};
use meversedb::errors::DbError;
use meversedb::{Database, StoreOptions};
use tempfile::tempdir;

fn open_db(dir: &std::path::Path) -> Database {
    Database::open(StoreOptions { data_dir: dir.to_path_buf(), db_name: "meverse".into() })
        .unwrap()
}

fn candidate(email: &str, username: &str) -> AccountCreate {
    AccountCreate {
        email: email.into(),
        username: username.into(),
        password: "Secret123".into(),
        full_name: None,
        github_id: None,
    }
}

#[test]
fn create_then_case_insensitive_clash() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let accounts = db.accounts();

    accounts.create(&candidate("a@x.com", "alice")).unwrap();
    let err = accounts.create(&candidate("A@X.com", "bob")).unwrap_err();
    assert!(matches!(err, DbError::UniquenessViolation(_)));
    assert_eq!(accounts.list().len(), 1);
}

#[test]
fn rename_moves_the_username_index() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let accounts = db.accounts();

    let a = accounts.create(&candidate("a@x.com", "alice")).unwrap();
    let patch = AccountPatch { username: Some("alice2".into()), ..AccountPatch::default() };
    accounts.update(&a.id, &patch).unwrap().unwrap();

    assert!(accounts.get_by_username("alice").is_none());
    assert_eq!(accounts.get_by_username("alice2").unwrap().id, a.id);
}

#[test]
fn snapshot_survives_reopen_with_timestamps_intact() {
    let dir = tempdir().unwrap();
    let created;
    {
        let db = open_db(dir.path());
        let accounts = db.accounts();
        created = accounts.create(&candidate("a@x.com", "alice")).unwrap();
        assert!(accounts.touch_last_login(&created.id).unwrap());
    }
    let db = open_db(dir.path());
    let accounts = db.accounts();
    let reloaded = accounts.get_by_id(&created.id).unwrap();
    assert_eq!(reloaded.created_at, created.created_at);
    assert!(reloaded.last_login.is_some());
    assert!(reloaded.verify_password("Secret123"));
}

#[test]
fn list_excludes_credential_material() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let accounts = db.accounts();
    accounts.create(&candidate("a@x.com", "alice")).unwrap();

    let listed = accounts.list();
    let body = serde_json::to_string(&listed).unwrap();
    assert!(!body.contains("hashed_password"));
    assert!(!body.contains("Secret123"));
}

#[test]
fn password_change_rehashes() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let accounts = db.accounts();
    let a = accounts.create(&candidate("a@x.com", "alice")).unwrap();

    let patch = AccountPatch { password: Some("NewSecret9".into()), ..AccountPatch::default() };
    let updated = accounts.update(&a.id, &patch).unwrap().unwrap();
    assert!(updated.verify_password("NewSecret9"));
    assert!(!updated.verify_password("Secret123"));
}

#[test]
fn delete_frees_email_and_username() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    let accounts = db.accounts();
    let a = accounts.create(&candidate("a@x.com", "alice")).unwrap();

    assert!(accounts.delete(&a.id).unwrap());
    // Both unique fields are reusable after deletion.
    accounts.create(&candidate("A@x.com", "Alice")).unwrap();
}
