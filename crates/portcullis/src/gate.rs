//! The per-request entry points of a service provider.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use portcullis_authz::{AttributeLookup, ConditionEngine, RequestContext, RuleSet};
use portcullis_config::PortcullisConfig;
use portcullis_session::{
    Clock, NameId, SessionCache, SessionRecord, StoreAdapter, SystemClock, time,
};
use tracing::{debug, info, warn};

use crate::assertion::Assertion;
use crate::error::{GateError, Result};
use crate::export::{self, ExportSettings, NAME_ID_ATTRIBUTE};

/// Ties the session cache, the rule engine and attribute export together.
pub struct ServiceProvider<S: StoreAdapter> {
    cache: SessionCache<S>,
    engine: ConditionEngine,
    rules: RuleSet,
    export: ExportSettings,
    user_attribute: String,
    idle_timeout_secs: Option<u64>,
}

impl<S: StoreAdapter> ServiceProvider<S> {
    /// Build from a configuration, validating it first.
    pub fn from_config(config: &PortcullisConfig, store: S) -> Result<Self> {
        Self::from_config_with_clock(config, store, Arc::new(SystemClock))
    }

    /// Build from a configuration with an explicit time source.
    pub fn from_config_with_clock(
        config: &PortcullisConfig,
        store: S,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let aliases = config.alias_table();
        Ok(Self {
            cache: SessionCache::with_clock(store, config.cache_config(), clock),
            engine: ConditionEngine::new(aliases.clone()),
            rules: config.build_rules()?,
            export: ExportSettings::from_section(&config.attributes, aliases),
            user_attribute: config.attributes.user_attribute.clone(),
            idle_timeout_secs: config.session.idle_timeout_secs,
        })
    }

    /// The session cache.
    pub fn cache(&self) -> &SessionCache<S> {
        &self.cache
    }

    /// The configured rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Start a session before authentication (e.g. to track a login
    /// request). The session is stored but not logged in.
    pub fn new_request_session(&self) -> Result<SessionRecord> {
        Ok(self.cache.create_session()?)
    }

    /// The session named by a request's cookie, if any.
    ///
    /// An unknown, expired or token-mismatched session is `Ok(None)`; store
    /// failures are errors. A logged-in session's idle deadline is pushed
    /// forward when idle timeouts are configured.
    pub fn request_session(&self, session_id: &str, cookie_token: &str) -> Result<Option<SessionRecord>> {
        let mut record = match self.cache.load_for_request(session_id, cookie_token) {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if record.logged_in
            && let Some(secs) = self.idle_timeout_secs
        {
            self.cache.update_idle_timeout(&mut record, secs)?;
        }
        Ok(Some(record))
    }

    /// Turn a validated assertion into a logged-in session.
    ///
    /// `session` is the request's existing session, if there is one; its id
    /// and cookie token are kept. Attributes are merged only when it already
    /// belongs to the assertion's subject; a session of another subject
    /// starts over with the assertion's attributes and gives up its identity
    /// index entry. Without a session a new one is created. The principal
    /// always comes from the assertion.
    pub fn apply_assertion(
        &self,
        session: Option<SessionRecord>,
        assertion: &Assertion,
    ) -> Result<SessionRecord> {
        let name_id = assertion
            .name_id
            .as_ref()
            .ok_or(GateError::IncompleteAssertion("name-id"))?;
        let issuer = assertion
            .issuer
            .as_ref()
            .ok_or(GateError::IncompleteAssertion("issuer"))?;

        let now = self.cache.now();
        let expires = self.session_expiry(now, assertion.session_not_on_or_after)?;

        let user = self
            .assertion_user(assertion, name_id)
            .ok_or_else(|| GateError::MissingUser(self.user_attribute.clone()))?;

        let name_id = self.cache.normalize(name_id);
        let issuer = self.cache.normalize(issuer);

        let mut record = match session {
            Some(record) => record,
            None => SessionRecord::new(expires),
        };
        let same_subject = record.identity().is_some_and(|(n, i)| {
            self.cache.normalize(n) == name_id && self.cache.normalize(i) == issuer
        });
        if !same_subject {
            if record.identity().is_some() {
                debug!(session_id = %record.session_id, "Session changes subject, dropping previous identity");
                self.cache.release_identity(&record)?;
            }
            record.attributes.clear();
            record.saml_response = None;
            record.set_logged_out();
        }

        record.merge_attributes(assertion.attributes.clone());
        record.add_value(NAME_ID_ATTRIBUTE, name_id.value.clone());
        record.name_id = Some(name_id);
        record.issuer = Some(issuer);
        record.set_logged_in(user);

        record.expires = time::clamp(expires);
        record.idle_timeout = self
            .idle_timeout_secs
            .map(|secs| time::clamp(add_secs(now, secs)));
        record.identity_dump = assertion.identity_dump.clone();
        record.session_dump = assertion.session_dump.clone();
        if assertion.saml_response.is_some() {
            record.saml_response = assertion.saml_response.clone();
        }

        self.cache.store(&record)?;
        info!(
            session_id = %record.session_id,
            user = record.user.as_deref().unwrap_or_default(),
            "Session logged in"
        );
        Ok(record)
    }

    /// The principal named by an assertion: the first value of the user
    /// attribute, or the name-id when that attribute is `NAME_ID`.
    fn assertion_user(&self, assertion: &Assertion, name_id: &NameId) -> Option<String> {
        assertion
            .attributes
            .get(&self.user_attribute)
            .and_then(|values| values.first())
            .cloned()
            .or_else(|| (self.user_attribute == NAME_ID_ATTRIBUTE).then(|| name_id.value.clone()))
    }

    /// Whether a session may access the protected location.
    ///
    /// `request` carries attributes derived from the request itself; the
    /// session's attributes are added to it. Sessions that are not logged in
    /// or have expired are always denied.
    pub fn check_permissions(&self, record: &SessionRecord, request: &RequestContext) -> bool {
        self.check_rules(&self.rules, record, request)
    }

    /// [`check_permissions`](Self::check_permissions) against another rule
    /// set.
    pub fn check_rules(&self, rules: &RuleSet, record: &SessionRecord, request: &RequestContext) -> bool {
        let Some(user) = record.user.as_deref().filter(|_| record.logged_in) else {
            debug!(session_id = %record.session_id, "Denied: session not logged in");
            return false;
        };
        if record.is_expired_at(self.cache.now()) {
            debug!(session_id = %record.session_id, "Denied: session expired");
            return false;
        }

        let mut context = request.clone().with_user(user);
        context.extend(record.attributes.clone());
        let allowed = self.engine.evaluate(rules, &context, &context);
        debug!(
            session_id = %record.session_id,
            attributes = context.names().len(),
            allowed,
            "Permission check"
        );
        allowed
    }

    /// Look the request's session up and check it in one step.
    ///
    /// Every failure, store errors included, denies.
    pub fn authorize(&self, session_id: &str, cookie_token: &str, request: &RequestContext) -> bool {
        match self.request_session(session_id, cookie_token) {
            Ok(Some(record)) => self.check_permissions(&record, request),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Denied: session lookup failed");
                false
            }
        }
    }

    /// The live session of a subject, if any.
    pub fn session_by_identity(&self, name_id: &NameId, issuer: &NameId) -> Result<Option<SessionRecord>> {
        match self.cache.load_by_identity(name_id, issuer) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// End a session.
    pub fn logout(&self, record: &SessionRecord) -> Result<()> {
        self.cache.delete_record(record)?;
        info!(session_id = %record.session_id, "Session logged out");
        Ok(())
    }

    /// End a subject's session, as on an identity provider initiated logout.
    ///
    /// Returns whether a session was found.
    pub fn logout_identity(&self, name_id: &NameId, issuer: &NameId) -> Result<bool> {
        match self.session_by_identity(name_id, issuer)? {
            Some(record) => {
                self.logout(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Environment variables for a session's attributes.
    pub fn export_env(&self, record: &SessionRecord) -> Vec<(String, String)> {
        export::export_env(record, &self.export)
    }

    fn session_expiry(
        &self,
        now: DateTime<Utc>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>> {
        let mut expires = add_secs(now, self.cache.config().session_length.as_secs());
        if let Some(limit) = not_on_or_after {
            if limit <= now {
                return Err(GateError::AssertionExpired(limit));
            }
            expires = expires.min(limit);
        }
        Ok(expires)
    }
}

fn add_secs(at: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
