use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    configatron::ConfiguredUser,
    error::{CustomCssError, ErrorAction, ErrorKind},
    optionarium::Optionarium,
    timekeeper::Timekeeper,
    CustomCssResult,
};

/// Option holding the secret that keys every anti-forgery token.
pub const NONCE_SALT_OPTION: &str = "customcss_nonce_salt";

const NONCE_KEY_CONTEXT: &str = "customcss 2012-2013 anti-forgery nonce v1";

/// Dashboard roles.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Subscriber,
}

/// Capabilities checked before a screen or action is served.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    /// Change site-wide settings. Required by every settings screen.
    ManageOptions,
    EditPosts,
    Read,
}

impl Role {
    /// Administrators hold every capability. Editors hold all but `ManageOptions`.
    pub fn has_cap(&self, capability: Capability) -> bool {
        match self {
            Role::Administrator => true,
            Role::Editor => capability != Capability::ManageOptions,
            Role::Subscriber => capability == Capability::Read,
        }
    }
}

/// The user a request acts on behalf of. Anonymous visitors have id `0` and no role.
#[derive(Clone, PartialEq, Debug)]
pub struct Actor {
    pub id: u64,
    pub login: String,
    pub role: Option<Role>,
    session_token: String,
}

impl Actor {
    /// A visitor without a session.
    pub fn anonymous() -> Self {
        Self {
            id: 0,
            login: String::new(),
            role: None,
            session_token: String::new(),
        }
    }

    /// Whether the actor's role grants `capability`. Anonymous visitors hold none.
    pub fn can(&self, capability: Capability) -> bool {
        self.role.map(|role| role.has_cap(capability)).unwrap_or(false)
    }

    pub fn is_anonymous(&self) -> bool {
        self.role.is_none()
    }
}

impl From<&ConfiguredUser> for Actor {
    fn from(user: &ConfiguredUser) -> Self {
        Self {
            id: user.id,
            login: user.login.clone(),
            role: Some(user.role),
            session_token: user.session_token.clone(),
        }
    }
}

/// Resolves actors from session tokens and issues/verifies per-action anti-forgery tokens.
///
/// A nonce is the first 10 hex characters of a keyed BLAKE3 hash over the current tick, the
/// action, the user id and the session. A tick is half the nonce lifetime, and nonces from the
/// current and the previous tick are accepted.
#[derive(Debug)]
pub struct Gatekeeper {
    users: Vec<ConfiguredUser>,
    key: [u8; 32],
    nonce_lifetime: u64,
    timekeeper: Arc<dyn Timekeeper>,
}

impl Gatekeeper {
    /// Builds the gatekeeper, generating and storing the nonce salt on first use.
    pub async fn new(
        optionarium: &Optionarium,
        users: Vec<ConfiguredUser>,
        nonce_lifetime: u64,
        timekeeper: Arc<dyn Timekeeper>,
    ) -> CustomCssResult<Self> {
        if !optionarium.has_option(NONCE_SALT_OPTION) {
            let salt: [u8; 32] = rand::thread_rng().gen();

            tracing::info!("Generating a new anti-forgery salt");

            optionarium
                .add_option(NONCE_SALT_OPTION, Value::String(hex::encode(salt)))
                .await?;
        }

        let salt = optionarium.get_string(NONCE_SALT_OPTION, "");

        if salt.is_empty() {
            return Err(CustomCssError::raise_critical_runtime_error(
                ErrorKind::Other,
                "The anti-forgery salt option is empty",
                ErrorAction::Fix,
            ));
        }

        Ok(Self::with_salt(&salt, users, nonce_lifetime, timekeeper))
    }

    /// Builds the gatekeeper from a known salt without touching the option store.
    pub fn with_salt(
        salt: &str,
        users: Vec<ConfiguredUser>,
        nonce_lifetime: u64,
        timekeeper: Arc<dyn Timekeeper>,
    ) -> Self {
        Self {
            users,
            key: blake3::derive_key(NONCE_KEY_CONTEXT, salt.as_bytes()),
            nonce_lifetime: nonce_lifetime.max(2),
            timekeeper,
        }
    }

    /// Finds the configured user owning `session_token`. Unknown or missing tokens are anonymous.
    pub fn identify(&self, session_token: Option<&str>) -> Actor {
        let Some(session_token) = session_token.filter(|token| !token.is_empty()) else {
            return Actor::anonymous();
        };

        self.users
            .iter()
            .find(|user| constant_time_eq(user.session_token.as_bytes(), session_token.as_bytes()))
            .map(Actor::from)
            .unwrap_or_else(|| {
                tracing::debug!("Unknown session token presented, treating as anonymous");
                Actor::anonymous()
            })
    }

    fn tick(&self) -> i64 {
        let half_life = (self.nonce_lifetime / 2) as i64;
        let now = self.timekeeper.now().timestamp();

        // Ceiling division, matching how tick boundaries are counted on creation and verification.
        (now + half_life - 1).div_euclid(half_life)
    }

    fn nonce_for_tick(&self, tick: i64, action: &str, actor: &Actor) -> String {
        let material = format!(
            "{}|{}|{}|{}",
            tick, action, actor.id, actor.session_token
        );
        let hash = blake3::keyed_hash(&self.key, material.as_bytes());

        hex::encode(&hash.as_bytes()[..5])
    }

    /// Issues a token for `action` on behalf of `actor`.
    pub fn create_nonce(&self, action: &str, actor: &Actor) -> String {
        self.nonce_for_tick(self.tick(), action, actor)
    }

    /// Returns `Some(1)` for a token minted in the current tick, `Some(2)` for the previous one.
    pub fn verify_nonce(&self, nonce: &str, action: &str, actor: &Actor) -> Option<u8> {
        if nonce.is_empty() {
            return None;
        }

        let tick = self.tick();

        if constant_time_eq(
            self.nonce_for_tick(tick, action, actor).as_bytes(),
            nonce.as_bytes(),
        ) {
            return Some(1);
        }

        if constant_time_eq(
            self.nonce_for_tick(tick - 1, action, actor).as_bytes(),
            nonce.as_bytes(),
        ) {
            return Some(2);
        }

        None
    }

    /// Fails with `NonceVerificationFailed` unless `nonce` is a valid token for `action`.
    pub fn check_admin_referer(
        &self,
        nonce: Option<&str>,
        action: &str,
        actor: &Actor,
    ) -> CustomCssResult<()> {
        match nonce.and_then(|nonce| self.verify_nonce(nonce, action, actor)) {
            Some(_) => Ok(()),
            None => Err(CustomCssError::raise_general_screen_error(
                ErrorKind::NonceVerificationFailed,
                &format!(
                    "The link you followed has expired (action `{}`, user {}).",
                    action, actor.id
                ),
                ErrorAction::Notify,
            )),
        }
    }

    /// Fails with `AccessDenied` unless `actor` holds `capability`.
    pub fn require(&self, actor: &Actor, capability: Capability) -> CustomCssResult<()> {
        if actor.can(capability) {
            return Ok(());
        }

        if actor.is_anonymous() {
            tracing::debug!("Anonymous visitor lacks {:?}", capability);
        } else {
            tracing::debug!("User `{}` lacks {:?}", actor.login, capability);
        }

        Err(CustomCssError::raise_general_screen_error(
            ErrorKind::AccessDenied,
            "You do not have permission to access this feature.",
            ErrorAction::Notify,
        ))
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right.iter())
        .fold(0u8, |diff, (l, r)| diff | (l ^ r))
        == 0
}
