//! Storage layer tests for the vault database.

use super::db::VaultDatabase;
use super::models::{AccountScope, ModelParams, NewSigningLog, SigningLogQuery, UserParams};
use super::DatabaseError;

async fn test_db() -> VaultDatabase {
    VaultDatabase::open_in_memory().await.unwrap()
}

/// Account `system` with one keypair and model `alder` using it.
async fn seeded_db() -> VaultDatabase {
    let db = test_db().await;
    db.put_account("system", "account text", false).await.unwrap();
    db.put_keypair("system", "key-1", "serial", "c2VhbGVk").await.unwrap();
    db.create_model(&model_params("system", "alder", "ValidAPIKey"))
        .await
        .unwrap();
    db
}

fn model_params(brand: &str, name: &str, api_key: &str) -> ModelParams {
    ModelParams {
        brand_id: brand.into(),
        name: name.into(),
        api_key: api_key.into(),
        keypair_id: 1,
        keypair_id_user: 1,
        ..Default::default()
    }
}

fn log_entry(serial: &str, fingerprint: &str) -> NewSigningLog {
    NewSigningLog {
        brand_id: "system".into(),
        model_name: "alder".into(),
        serial_number: serial.into(),
        fingerprint: fingerprint.into(),
        username: String::new(),
        created_at: 1_700_000_000,
    }
}

fn user_params(username: &str, accounts: &[&str]) -> UserParams {
    UserParams {
        username: username.into(),
        name: username.into(),
        email: format!("{username}@example.com"),
        role: 100,
        api_key: format!("{username}-key"),
        accounts: accounts.iter().map(|a| (*a).to_string()).collect(),
    }
}

// === Account tests ===

#[tokio::test]
async fn put_account_upserts() {
    let db = test_db().await;
    let first = db.put_account("system", "v1", false).await.unwrap();
    let second = db.put_account("system", "v2", true).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.assertion, "v2");
    assert!(second.reseller_api);
}

#[tokio::test]
async fn get_missing_account_is_not_found() {
    let db = test_db().await;
    let err = db.get_account("nobody").await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

#[tokio::test]
async fn account_listing_respects_scope() {
    let db = test_db().await;
    db.put_account("system", "", false).await.unwrap();
    db.put_account("other", "", false).await.unwrap();
    let user = db.create_user(&user_params("alice", &["system"])).await.unwrap();

    let all = db.list_allowed_accounts(AccountScope::All).await.unwrap();
    assert_eq!(all.len(), 2);

    let mine = db
        .list_allowed_accounts(AccountScope::User(user.id))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].authority_id, "system");
}

// === Keypair tests ===

#[tokio::test]
async fn duplicate_keypair_is_conflict() {
    let db = test_db().await;
    db.put_keypair("system", "key-1", "serial", "x").await.unwrap();
    let err = db
        .put_keypair("system", "key-1", "again", "y")
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn keypair_toggle_and_rename() {
    let db = seeded_db().await;
    let kp = db.get_keypair_by_key_id("system", "key-1").await.unwrap();
    assert!(kp.active);

    db.set_keypair_active(kp.id, false).await.unwrap();
    db.update_keypair_name(kp.id, "renamed").await.unwrap();
    db.update_keypair_assertion(kp.id, "account-key text").await.unwrap();

    let kp = db.get_keypair_by_name("system", "renamed").await.unwrap();
    assert!(!kp.active);
    assert_eq!(kp.assertion, "account-key text");

    let err = db.set_keypair_active(99, true).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

#[tokio::test]
async fn keypair_status_keeps_keypair_id() {
    let db = test_db().await;
    db.upsert_keypair_status("system", "gen", "creating", None)
        .await
        .unwrap();
    db.upsert_keypair_status("system", "gen", "storing", Some(7))
        .await
        .unwrap();
    db.upsert_keypair_status("system", "gen", "complete", None)
        .await
        .unwrap();

    let status = db.get_keypair_status("system", "gen").await.unwrap();
    assert_eq!(status.status, "complete");
    assert_eq!(status.keypair_id, Some(7));
}

// === Model tests ===

#[tokio::test]
async fn find_model_needs_matching_api_key() {
    let db = seeded_db().await;
    let model = db.find_model("system", "alder", "ValidAPIKey").await.unwrap();
    assert_eq!(model.series, "16");

    let err = db.find_model("system", "alder", "wrong").await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
    assert!(db.model_api_key_exists("ValidAPIKey").await.unwrap());
    assert!(!db.model_api_key_exists("wrong").await.unwrap());
}

#[tokio::test]
async fn model_required_snaps_roundtrip() {
    let db = seeded_db().await;
    let mut params = model_params("system", "alder", "ValidAPIKey");
    params.required_snaps = vec!["core".into(), "network-manager".into()];
    let model = db.update_model(1, &params).await.unwrap();
    assert_eq!(model.required_snaps(), vec!["core", "network-manager"]);
}

#[tokio::test]
async fn duplicate_model_name_is_conflict() {
    let db = seeded_db().await;
    let err = db
        .create_model(&model_params("system", "alder", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

// === Sub-store tests ===

#[tokio::test]
async fn substore_lookup_by_model_and_serial() {
    let db = seeded_db().await;
    db.create_substore(1, 1, "mybrand", "a11112222", "alder-mybrand")
        .await
        .unwrap();

    let hit = db.get_substore(1, "a11112222").await.unwrap().unwrap();
    assert_eq!(hit.model_name, "alder-mybrand");
    assert!(db.get_substore(1, "other").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_model_removes_its_substores() {
    let db = seeded_db().await;
    let sub = db
        .create_substore(1, 1, "mybrand", "a11112222", "alder-mybrand")
        .await
        .unwrap();
    db.delete_model(1).await.unwrap();
    let err = db.get_substore_by_id(sub.id).await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

// === Nonce tests ===

#[tokio::test]
async fn nonce_consumes_once() {
    let db = test_db().await;
    let nonce = db.create_nonce(1_000).await.unwrap();
    assert_eq!(nonce.nonce.len(), 40);

    assert!(db.validate_and_consume_nonce(&nonce.nonce, 1_010, 600).await.unwrap());
    assert!(!db.validate_and_consume_nonce(&nonce.nonce, 1_010, 600).await.unwrap());
}

#[tokio::test]
async fn expired_nonce_is_rejected_and_removed() {
    let db = test_db().await;
    let nonce = db.create_nonce(1_000).await.unwrap();
    assert!(!db.validate_and_consume_nonce(&nonce.nonce, 1_601, 600).await.unwrap());
    assert!(!db.validate_and_consume_nonce(&nonce.nonce, 1_010, 600).await.unwrap());
}

#[tokio::test]
async fn sweep_deletes_only_old_nonces() {
    let db = test_db().await;
    db.create_nonce(100).await.unwrap();
    let fresh = db.create_nonce(1_000).await.unwrap();

    assert_eq!(db.delete_expired_nonces(500).await.unwrap(), 1);
    assert!(db.validate_and_consume_nonce(&fresh.nonce, 1_000, 600).await.unwrap());
}

// === Signing log tests ===

#[tokio::test]
async fn duplicate_detection_by_serial_or_fingerprint() {
    let db = seeded_db().await;
    db.create_signing_log(&log_entry("A-1", "fp-1")).await.unwrap();

    assert!(db.check_for_duplicate(&log_entry("A-1", "fp-2")).await.unwrap());
    assert!(db.check_for_duplicate(&log_entry("A-2", "fp-1")).await.unwrap());
    assert!(!db.check_for_duplicate(&log_entry("A-2", "fp-2")).await.unwrap());
}

#[tokio::test]
async fn unique_index_rejects_racing_insert() {
    let db = seeded_db().await;
    db.create_signing_log(&log_entry("A-1", "fp-1")).await.unwrap();
    let err = db
        .create_signing_log(&log_entry("A-1", "fp-9"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn signing_log_pages_newest_first() {
    let db = seeded_db().await;
    for i in 0..5 {
        db.create_signing_log(&log_entry(&format!("A-{i}"), &format!("fp-{i}")))
            .await
            .unwrap();
    }
    let page = db
        .list_signing_log(
            AccountScope::All,
            &SigningLogQuery {
                limit: 2,
                offset: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let serials: Vec<_> = page.iter().map(|e| e.serial_number.as_str()).collect();
    assert_eq!(serials, vec!["A-3", "A-2"]);

    let filtered = db
        .list_signing_log(
            AccountScope::All,
            &SigningLogQuery {
                serial_number: Some("-4".into()),
                models: vec!["alder".into()],
                limit: 50,
                offset: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
}

#[tokio::test]
async fn serial_filter_matches_wildcards_literally() {
    let db = seeded_db().await;
    db.create_signing_log(&log_entry("A_1", "fp-1")).await.unwrap();
    db.create_signing_log(&log_entry("AB1", "fp-2")).await.unwrap();
    db.create_signing_log(&log_entry("C%9", "fp-3")).await.unwrap();

    let search = |serial: &str| SigningLogQuery {
        serial_number: Some(serial.into()),
        limit: 50,
        ..Default::default()
    };
    let hits = db.list_signing_log(AccountScope::All, &search("A_1")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].serial_number, "A_1");

    let hits = db.list_signing_log(AccountScope::All, &search("%")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].serial_number, "C%9");
}

#[tokio::test]
async fn signing_log_scope_hides_other_brands() {
    let db = seeded_db().await;
    db.put_account("other", "", false).await.unwrap();
    db.create_signing_log(&log_entry("A-1", "fp-1")).await.unwrap();
    let user = db.create_user(&user_params("bob", &["other"])).await.unwrap();

    let query = SigningLogQuery {
        limit: 50,
        ..Default::default()
    };
    let visible = db
        .list_signing_log(AccountScope::User(user.id), &query)
        .await
        .unwrap();
    assert!(visible.is_empty());

    let filters = db
        .signing_log_filter_values(AccountScope::All)
        .await
        .unwrap();
    assert_eq!(filters.brands, vec!["system"]);
    assert_eq!(filters.models, vec!["alder"]);
}

#[tokio::test]
async fn sync_matches_existing_and_inserts_new() {
    let db = seeded_db().await;
    let local = db.create_signing_log(&log_entry("A-1", "fp-1")).await.unwrap();
    assert!(!local.synced);

    let inserted = db
        .sync_signing_log(&[
            log_entry("A-1", "fp-1"),
            log_entry("A-2", "fp-2"),
            log_entry("A-1", "fp-collides"),
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    assert!(db.get_signing_log(local.id).await.unwrap().synced);

    let after = db.list_signing_log_from(AccountScope::All, local.id, 10).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].serial_number, "A-2");
}

// === Test log tests ===

#[tokio::test]
async fn test_log_upsert_is_idempotent() {
    let db = seeded_db().await;
    let first = db
        .upsert_test_log("system", "alder", "run.log", "aGVsbG8=")
        .await
        .unwrap();
    let again = db
        .upsert_test_log("system", "alder", "run.log", "b3RoZXI=")
        .await
        .unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(again.data, "aGVsbG8=");

    assert_eq!(db.list_unsynced_test_logs(AccountScope::All).await.unwrap().len(), 1);
    assert_eq!(
        db.mark_test_logs_synced(AccountScope::All, &[first.id]).await.unwrap(),
        1
    );
    assert!(db.list_unsynced_test_logs(AccountScope::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_synced_skips_other_accounts() {
    let db = seeded_db().await;
    db.put_account("other", "account text", false).await.unwrap();
    let alice = db.create_user(&user_params("alice", &["system"])).await.unwrap();
    let own = db
        .upsert_test_log("system", "alder", "own.log", "aGVsbG8=")
        .await
        .unwrap();
    let foreign = db
        .upsert_test_log("other", "birch", "foreign.log", "aGVsbG8=")
        .await
        .unwrap();

    let updated = db
        .mark_test_logs_synced(AccountScope::User(alice.id), &[own.id, foreign.id])
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let unsynced = db.list_unsynced_test_logs(AccountScope::All).await.unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].id, foreign.id);
}

// === User tests ===

#[tokio::test]
async fn api_key_lookup_with_and_without_username() {
    let db = seeded_db().await;
    db.create_user(&user_params("alice", &["system"])).await.unwrap();

    assert_eq!(
        db.get_user_by_api_key("alice-key", "").await.unwrap().username,
        "alice"
    );
    assert!(db.get_user_by_api_key("alice-key", "alice").await.is_ok());
    assert!(db.get_user_by_api_key("alice-key", "bob").await.is_err());
    assert!(db.get_user_by_api_key("", "").await.is_err());
}

#[tokio::test]
async fn user_accounts_are_replaced_on_update() {
    let db = seeded_db().await;
    db.put_account("other", "", false).await.unwrap();
    let user = db.create_user(&user_params("alice", &["system"])).await.unwrap();
    assert_eq!(db.list_user_accounts(user.id).await.unwrap(), vec!["system"]);

    db.update_user(user.id, &user_params("alice", &["other"]))
        .await
        .unwrap();
    assert_eq!(db.list_user_accounts(user.id).await.unwrap(), vec!["other"]);
}

#[tokio::test]
async fn user_with_unknown_account_is_rolled_back() {
    let db = test_db().await;
    let err = db
        .create_user(&user_params("alice", &["missing"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
    assert!(db.get_user_by_username("alice").await.is_err());
}

// === Settings tests ===

#[tokio::test]
async fn settings_upsert() {
    let db = test_db().await;
    assert!(db.get_setting("parent").await.unwrap().is_none());
    db.put_setting("parent", "a").await.unwrap();
    db.put_setting("parent", "b").await.unwrap();
    assert_eq!(db.get_setting("parent").await.unwrap().unwrap().data, "b");
}
