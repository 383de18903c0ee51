//! End-to-end tests of the service provider facade.
//!
//! Each test drives the flow a host module would: configuration is loaded
//! from TOML, an assertion is applied, and later requests present the
//! session id and cookie token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use portcullis::authz::RequestContext;
use portcullis::config::{PortcullisConfig, load_config_file};
use portcullis::session::{
    ManualClock, MemoryStore, NameId, StoreAdapter, StoreError, StoreResult,
};
use portcullis::{Assertion, GateError, ServiceProvider};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

const CONFIG: &str = r#"
[session]
sp_entity_id = "https://sp.example.com"
session_length_secs = 3600
idle_timeout_secs = 600

[attributes]
user_attribute = "uid"
count_in_n = true

[attributes.set_env]
"urn:oid:0.9.2342.19200300.100.1.3" = { name = "MAIL" }

[[rule]]
name = "dept"
value = "^eng"
options = "[REG]"

[[rule]]
name = "dept"
value = "^sales"
options = "[REG,OR]"

[[rule]]
require = "role"
values = ["admin", "staff"]
"#;

/// A memory store that can be told to fail every operation.
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn fail(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

impl StoreAdapter for FlakyStore {
    fn put(&self, key: &str, value: &[u8], ttl: StdDuration) -> StoreResult<()> {
        self.fail()?;
        self.inner.put(key, value, ttl)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.fail()?;
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.fail()?;
        self.inner.delete(key)
    }

    fn acquire(&self, timeout: StdDuration) -> StoreResult<()> {
        self.inner.acquire(timeout)
    }

    fn release(&self) {
        self.inner.release()
    }
}

struct Harness {
    sp: ServiceProvider<Arc<FlakyStore>>,
    store: Arc<FlakyStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
    ));
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::with_clock(clock.clone()),
        failing: AtomicBool::new(false),
    });
    let config = PortcullisConfig::from_toml(CONFIG).unwrap();
    let sp = ServiceProvider::from_config_with_clock(&config, Arc::clone(&store), clock.clone())
        .unwrap();
    Harness { sp, store, clock }
}

fn idp() -> NameId {
    NameId::new("https://idp.example.com")
}

fn engineer() -> Assertion {
    Assertion::new(NameId::new("AAdzZWNyZXQx"), idp())
        .with_attribute("uid", ["alice"])
        .with_attribute("dept", ["eng-platform"])
        .with_attribute("role", ["staff"])
        .with_attribute("urn:oid:0.9.2342.19200300.100.1.3", ["alice@example.com"])
}

// ─────────────────────────────────────────────────────────────────────────────
// Login and lookup
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_login_then_authorized_request() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();

    assert!(session.logged_in);
    assert_eq!(session.user.as_deref(), Some("alice"));
    assert!(h.sp.authorize(
        session.session_id.as_str(),
        &session.cookie_token,
        &RequestContext::new()
    ));
}

#[test]
fn test_rules_deny_wrong_department() {
    let h = harness();
    let assertion = Assertion::new(NameId::new("bob"), idp())
        .with_attribute("uid", ["bob"])
        .with_attribute("dept", ["hr"])
        .with_attribute("role", ["admin"]);
    let session = h.sp.apply_assertion(None, &assertion).unwrap();

    assert!(!h.sp.authorize(
        session.session_id.as_str(),
        &session.cookie_token,
        &RequestContext::new()
    ));
}

#[test]
fn test_request_attributes_join_session_attributes() {
    let h = harness();
    let assertion = Assertion::new(NameId::new("carol"), idp())
        .with_attribute("uid", ["carol"])
        .with_attribute("dept", ["sales-east"]);
    let session = h.sp.apply_assertion(None, &assertion).unwrap();

    assert!(!h.sp.check_permissions(&session, &RequestContext::new()));
    let request = RequestContext::new().with_values("role", ["admin"]);
    assert!(h.sp.check_permissions(&session, &request));
}

#[test]
fn test_placeholder_session_never_authorizes() {
    let h = harness();
    let placeholder = h.sp.new_request_session().unwrap();
    assert!(!placeholder.logged_in);

    let found = h
        .sp
        .request_session(placeholder.session_id.as_str(), &placeholder.cookie_token)
        .unwrap()
        .unwrap();
    assert_eq!(found.session_id, placeholder.session_id);

    let request = RequestContext::new()
        .with_values("dept", ["eng"])
        .with_values("role", ["admin"]);
    assert!(!h.sp.check_permissions(&found, &request));
}

#[test]
fn test_login_keeps_placeholder_identity() {
    let h = harness();
    let placeholder = h.sp.new_request_session().unwrap();
    let session = h
        .sp
        .apply_assertion(Some(placeholder.clone()), &engineer())
        .unwrap();

    assert_eq!(session.session_id, placeholder.session_id);
    assert_eq!(session.cookie_token, placeholder.cookie_token);
}

#[test]
fn test_wrong_cookie_token_is_no_session() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();

    let found = h
        .sp
        .request_session(session.session_id.as_str(), "00000000000000000000000000000000")
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn test_lookup_by_identity_and_logout() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();

    let name_id = NameId::new("AAdzZWNyZXQx");
    let found = h.sp.session_by_identity(&name_id, &idp()).unwrap().unwrap();
    assert_eq!(found.session_id, session.session_id);

    assert!(h.sp.logout_identity(&name_id, &idp()).unwrap());
    assert!(h.sp.session_by_identity(&name_id, &idp()).unwrap().is_none());
    assert!(
        h.sp
            .request_session(session.session_id.as_str(), &session.cookie_token)
            .unwrap()
            .is_none()
    );
    assert!(!h.sp.logout_identity(&name_id, &idp()).unwrap());
}

#[test]
fn test_relogin_same_subject_takes_new_user_and_merges() {
    let h = harness();
    let first = h.sp.apply_assertion(None, &engineer()).unwrap();

    let again = Assertion::new(NameId::new("AAdzZWNyZXQx"), idp())
        .with_attribute("uid", ["alice.renamed"])
        .with_attribute("role", ["admin"]);
    let session = h.sp.apply_assertion(Some(first.clone()), &again).unwrap();

    assert_eq!(session.session_id, first.session_id);
    assert_eq!(session.user.as_deref(), Some("alice.renamed"));
    assert_eq!(
        session.values("role").unwrap(),
        &["staff".to_string(), "admin".to_string()]
    );
    assert_eq!(session.first_value("dept"), Some("eng-platform"));
}

#[test]
fn test_login_as_other_subject_starts_clean() {
    let h = harness();
    let alice = h.sp.apply_assertion(None, &engineer()).unwrap();

    let bob = Assertion::new(NameId::new("bob-id"), idp())
        .with_attribute("uid", ["bob"])
        .with_attribute("dept", ["hr"]);
    let session = h.sp.apply_assertion(Some(alice.clone()), &bob).unwrap();

    assert_eq!(session.session_id, alice.session_id);
    assert_eq!(session.user.as_deref(), Some("bob"));
    assert_eq!(session.values("dept").unwrap(), &["hr".to_string()]);
    assert_eq!(session.values("role"), None);
    assert_eq!(session.first_value("NAME_ID"), Some("bob-id"));

    // Alice's identity no longer reaches the session, so her logout leaves
    // bob alone.
    let alice_id = NameId::new("AAdzZWNyZXQx");
    assert!(h.sp.session_by_identity(&alice_id, &idp()).unwrap().is_none());
    assert!(!h.sp.logout_identity(&alice_id, &idp()).unwrap());
    assert!(
        h.sp
            .request_session(session.session_id.as_str(), &session.cookie_token)
            .unwrap()
            .is_some()
    );

    let bob_id = NameId::new("bob-id");
    let found = h.sp.session_by_identity(&bob_id, &idp()).unwrap().unwrap();
    assert_eq!(found.session_id, session.session_id);
}

#[test]
fn test_logout_of_older_session_keeps_newer_one_reachable() {
    let h = harness();
    let older = h.sp.apply_assertion(None, &engineer()).unwrap();
    let newer = h.sp.apply_assertion(None, &engineer()).unwrap();

    h.sp.logout(&older).unwrap();

    let name_id = NameId::new("AAdzZWNyZXQx");
    let found = h.sp.session_by_identity(&name_id, &idp()).unwrap().unwrap();
    assert_eq!(found.session_id, newer.session_id);

    assert!(h.sp.logout_identity(&name_id, &idp()).unwrap());
    assert!(
        h.sp
            .request_session(newer.session_id.as_str(), &newer.cookie_token)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_wall_clock_session_matches_stored_copy() {
    let config = PortcullisConfig::from_toml(CONFIG).unwrap();
    let sp = ServiceProvider::from_config(&config, MemoryStore::default()).unwrap();

    let placeholder = sp.new_request_session().unwrap();
    let loaded = sp
        .cache()
        .load_by_session_id(placeholder.session_id.as_str())
        .unwrap();
    assert_eq!(loaded, placeholder);

    let session = sp.apply_assertion(Some(placeholder), &engineer()).unwrap();
    let loaded = sp
        .cache()
        .load_by_session_id(session.session_id.as_str())
        .unwrap();
    assert_eq!(loaded, session);
}

// ─────────────────────────────────────────────────────────────────────────────
// Expiry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_session_not_on_or_after_caps_expiry() {
    let h = harness();
    let limit = h.sp.cache().now() + Duration::minutes(5);
    let session = h
        .sp
        .apply_assertion(None, &engineer().with_session_not_on_or_after(limit))
        .unwrap();
    assert_eq!(session.expires, limit);

    h.clock.advance(Duration::minutes(5));
    assert!(
        h.sp
            .request_session(session.session_id.as_str(), &session.cookie_token)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_expired_assertion_rejected() {
    let h = harness();
    let past = h.sp.cache().now() - Duration::seconds(1);
    let err = h
        .sp
        .apply_assertion(None, &engineer().with_session_not_on_or_after(past))
        .unwrap_err();
    assert!(matches!(err, GateError::AssertionExpired(_)));
}

#[test]
fn test_activity_refreshes_idle_timeout() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();
    let id = session.session_id.as_str().to_string();

    // Idle timeout is ten minutes; keep the session busy past that.
    for _ in 0..3 {
        h.clock.advance(Duration::minutes(8));
        assert!(h.sp.authorize(&id, &session.cookie_token, &RequestContext::new()));
    }

    h.clock.advance(Duration::minutes(11));
    assert!(!h.sp.authorize(&id, &session.cookie_token, &RequestContext::new()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure handling
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_store_failure_denies() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();

    h.store.failing.store(true, Ordering::SeqCst);
    let lookup = h
        .sp
        .request_session(session.session_id.as_str(), &session.cookie_token);
    assert!(matches!(lookup, Err(GateError::Session(_))));
    assert!(!h.sp.authorize(
        session.session_id.as_str(),
        &session.cookie_token,
        &RequestContext::new()
    ));
}

#[test]
fn test_missing_user_attribute() {
    let h = harness();
    let assertion = Assertion::new(NameId::new("dave"), idp()).with_attribute("dept", ["eng"]);
    let err = h.sp.apply_assertion(None, &assertion).unwrap_err();
    assert!(matches!(err, GateError::MissingUser(ref attr) if attr == "uid"));
}

#[test]
fn test_incomplete_assertion() {
    let h = harness();
    let err = h.sp.apply_assertion(None, &Assertion::default()).unwrap_err();
    assert!(matches!(err, GateError::IncompleteAssertion("name-id")));
}

// ─────────────────────────────────────────────────────────────────────────────
// Export and configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_export_env() {
    let h = harness();
    let session = h.sp.apply_assertion(None, &engineer()).unwrap();
    let vars = h.sp.export_env(&session);
    let get = |name: &str| {
        vars.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    assert_eq!(get("SAML_MAIL"), Some("alice@example.com"));
    assert_eq!(get("SAML_uid"), Some("alice"));
    assert_eq!(get("SAML_dept_N"), Some("1"));
    assert_eq!(get("SAML_NAME_ID"), Some("AAdzZWNyZXQx"));
}

#[test]
fn test_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portcullis.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = load_config_file(&path).unwrap();
    let sp = ServiceProvider::from_config(&config, MemoryStore::default()).unwrap();
    assert_eq!(sp.rules().len(), 4);
}

#[test]
fn test_invalid_config_rejected() {
    let config = PortcullisConfig::from_toml("[[rule]]\nname = \"x\"\nvalue = \"y\"\n").unwrap();
    let result = ServiceProvider::from_config(&config, MemoryStore::default());
    assert!(matches!(result, Err(GateError::Config(_))));
}
