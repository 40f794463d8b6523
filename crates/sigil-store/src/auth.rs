//! Authentication orchestrator: one fixed resolution cascade.
//!
//! ```text
//! agent token set   → decrypt via token, enforce expiry
//! agent xpub set    → metadata only, no seed, spends fail fast
//! valid session     → seed from session (fall through on any failure)
//! otherwise         → password prompt → vault load → maybe start session
//! ```
//!
//! Callers that might prompt pass a prompt capability; in agent mode and in
//! tests there is none, and needing one is a hard error rather than a
//! surprise stdin read.

use std::time::Duration;

use tracing::{debug, warn};

use sigil_core::secret::{SecretBytes, Seed};
use sigil_keys::xpub::validate_xpub;

use crate::agent::{AgentCredential, AgentStore};
use crate::error::StoreError;
use crate::session::SessionManager;
use crate::vault::WalletVault;
use crate::wallet::Wallet;

/// How the wallet context was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    AgentToken,
    Xpub,
    Session,
    Password,
}

/// Prompt capability: asks the user for a secret, or fails.
pub type PromptFn = dyn Fn(&str) -> Result<SecretBytes, StoreError> + Send + Sync;

/// Resolved wallet context handed to command handlers.
#[derive(Debug)]
pub struct AuthContext {
    pub wallet: Wallet,
    /// `None` in xpub-only mode. The holder owns zeroization (drop).
    pub seed: Option<Seed>,
    pub mode: AuthMode,
    /// Present when resolved through an agent token.
    pub agent: Option<AgentCredential>,
    /// Present in xpub-only mode.
    pub xpub: Option<String>,
}

impl AuthContext {
    /// The seed, or the fast xpub-mode spend denial.
    pub fn require_seed(&self) -> Result<&Seed, StoreError> {
        match (&self.seed, self.mode) {
            (Some(seed), _) => Ok(seed),
            (None, AuthMode::Xpub) => Err(StoreError::AgentXpubWriteDenied),
            (None, _) => Err(StoreError::SessionNotFound(self.wallet.name.clone())),
        }
    }
}

/// Environment inputs to the cascade, read once at startup.
#[derive(Default)]
pub struct AuthEnv {
    pub agent_token: Option<SecretBytes>,
    pub agent_xpub: Option<String>,
}

impl AuthEnv {
    /// Read `SIGIL_AGENT_TOKEN` / `SIGIL_AGENT_XPUB`.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            agent_token: read("SIGIL_AGENT_TOKEN").map(SecretBytes::from_string),
            agent_xpub: read("SIGIL_AGENT_XPUB"),
        }
    }
}

/// The orchestrator owns the three stores it arbitrates between.
pub struct AuthOrchestrator {
    vault: WalletVault,
    sessions: SessionManager,
    agents: AgentStore,
    env: AuthEnv,
    sessions_enabled: bool,
    session_ttl: Duration,
}

impl AuthOrchestrator {
    pub fn new(
        vault: WalletVault,
        sessions: SessionManager,
        agents: AgentStore,
        env: AuthEnv,
        sessions_enabled: bool,
        session_ttl: Duration,
    ) -> Self {
        Self {
            vault,
            sessions,
            agents,
            env,
            sessions_enabled,
            session_ttl,
        }
    }

    pub fn vault(&self) -> &WalletVault {
        &self.vault
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    /// Resolve a wallet context through the cascade.
    pub fn resolve(
        &self,
        name: &str,
        prompt: Option<&PromptFn>,
    ) -> Result<AuthContext, StoreError> {
        if let Some(token) = &self.env.agent_token {
            return self.resolve_agent_token(name, token);
        }
        if let Some(xpub) = &self.env.agent_xpub {
            return self.resolve_xpub(name, xpub);
        }

        if self.sessions_enabled
            && self.sessions.keyring_available()
            && self.sessions.has_valid_session(name)
        {
            match self.sessions.get_session(name) {
                Ok((seed, _session)) => {
                    debug!(wallet = %name, "resolved via session");
                    return Ok(AuthContext {
                        wallet: self.vault.load_metadata(name)?,
                        seed: Some(seed),
                        mode: AuthMode::Session,
                        agent: None,
                        xpub: None,
                    });
                }
                // Session died between the check and the read (expired,
                // corrupted, keyring half gone): fall through to password.
                Err(err) => warn!(wallet = %name, %err, "session fallthrough"),
            }
        }

        self.resolve_password(name, prompt)
    }

    fn resolve_agent_token(
        &self,
        name: &str,
        token: &SecretBytes,
    ) -> Result<AuthContext, StoreError> {
        let (seed, credential) = self.agents.load_by_token(name, token)?;
        if credential.is_expired() {
            // The seed copy dies here, before the error propagates.
            drop(seed);
            return Err(StoreError::AgentTokenExpired);
        }
        debug!(wallet = %name, agent = %credential.id, "resolved via agent token");
        Ok(AuthContext {
            wallet: self.vault.load_metadata(name)?,
            seed: Some(seed),
            mode: AuthMode::AgentToken,
            agent: Some(credential),
            xpub: None,
        })
    }

    fn resolve_xpub(&self, name: &str, xpub: &str) -> Result<AuthContext, StoreError> {
        validate_xpub(xpub).map_err(|e| StoreError::AgentXpubInvalid(e.to_string()))?;
        debug!(wallet = %name, "resolved via xpub (read-only)");
        Ok(AuthContext {
            wallet: self.vault.load_metadata(name)?,
            seed: None,
            mode: AuthMode::Xpub,
            agent: None,
            xpub: Some(xpub.trim().to_string()),
        })
    }

    fn resolve_password(
        &self,
        name: &str,
        prompt: Option<&PromptFn>,
    ) -> Result<AuthContext, StoreError> {
        let Some(prompt) = prompt else {
            return Err(StoreError::PromptUnavailable(format!(
                "password required for wallet {name}"
            )));
        };
        let password = prompt(&format!("Password for wallet '{name}'"))?;
        let (wallet, seed) = self.vault.load(name, password.as_bytes())?;

        if self.sessions_enabled && self.sessions.keyring_available() {
            // Best effort: a failed session start must not fail the load.
            if let Err(err) = self.sessions.start_session(name, &seed, self.session_ttl) {
                warn!(wallet = %name, %err, "could not start session");
            }
        }

        debug!(wallet = %name, "resolved via password");
        Ok(AuthContext {
            wallet,
            seed: Some(seed),
            mode: AuthMode::Password,
            agent: None,
            xpub: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::chain::Chain;
    use sigil_core::kdf::KdfParams;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::agent::AgentPolicy;
    use crate::session::MemoryKeyStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        orchestrator: AuthOrchestrator,
        prompt_calls: Arc<AtomicUsize>,
        prompt: Box<PromptFn>,
    }

    fn seed() -> Seed {
        Seed::from_bytes([0x77u8; 64])
    }

    fn fixture(env: AuthEnv) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let vault = WalletVault::with_kdf(dir.path().join("wallets"), KdfParams::for_tests());
        let sessions = SessionManager::with_store(
            dir.path().join("sessions"),
            Box::new(MemoryKeyStore::default()),
        );
        let agents = AgentStore::with_kdf(dir.path().join("agents"), KdfParams::for_tests());

        let wallet = Wallet::new("main", vec![Chain::Bsv, Chain::Eth]).unwrap();
        vault.save(&wallet, &seed(), b"hunter2").unwrap();

        let prompt_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&prompt_calls);
        let prompt: Box<PromptFn> = Box::new(move |_msg| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(SecretBytes::new(b"hunter2".to_vec()))
        });

        let orchestrator = AuthOrchestrator::new(
            vault,
            sessions,
            agents,
            env,
            true,
            Duration::from_secs(900),
        );
        Fixture {
            _dir: dir,
            orchestrator,
            prompt_calls,
            prompt,
        }
    }

    #[test]
    fn password_path_loads_and_starts_session() {
        let f = fixture(AuthEnv::default());
        let ctx = f.orchestrator.resolve("main", Some(&*f.prompt)).unwrap();
        assert_eq!(ctx.mode, AuthMode::Password);
        assert_eq!(ctx.seed.as_ref().unwrap().as_bytes(), seed().as_bytes());
        assert_eq!(f.prompt_calls.load(Ordering::SeqCst), 1);
        assert!(f.orchestrator.sessions.has_valid_session("main"));
    }

    #[test]
    fn second_resolve_uses_session_not_prompt() {
        let f = fixture(AuthEnv::default());
        f.orchestrator.resolve("main", Some(&*f.prompt)).unwrap();
        let ctx = f.orchestrator.resolve("main", Some(&*f.prompt)).unwrap();
        assert_eq!(ctx.mode, AuthMode::Session);
        assert_eq!(f.prompt_calls.load(Ordering::SeqCst), 1, "no second prompt");
    }

    #[test]
    fn no_prompt_capability_is_hard_error() {
        let f = fixture(AuthEnv::default());
        assert!(matches!(
            f.orchestrator.resolve("main", None).unwrap_err(),
            StoreError::PromptUnavailable(_)
        ));
    }

    #[test]
    fn agent_token_path() {
        let token = SecretBytes::new(b"robot-token".to_vec());
        let f = fixture(AuthEnv {
            agent_token: Some(token.clone()),
            agent_xpub: None,
        });
        f.orchestrator
            .agents
            .create_credential(
                "bot",
                "main",
                vec![Chain::Bsv],
                None,
                AgentPolicy::default(),
                &token,
                &seed(),
            )
            .unwrap();

        let ctx = f.orchestrator.resolve("main", None).unwrap();
        assert_eq!(ctx.mode, AuthMode::AgentToken);
        assert!(ctx.seed.is_some());
        assert_eq!(ctx.agent.as_ref().unwrap().label, "bot");
        assert_eq!(f.prompt_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn expired_agent_token_rejected() {
        let token = SecretBytes::new(b"robot-token".to_vec());
        let f = fixture(AuthEnv {
            agent_token: Some(token.clone()),
            agent_xpub: None,
        });
        f.orchestrator
            .agents
            .create_credential(
                "bot",
                "main",
                vec![Chain::Bsv],
                Some(chrono::Utc::now() - chrono::Duration::minutes(1)),
                AgentPolicy::default(),
                &token,
                &seed(),
            )
            .unwrap();

        assert!(matches!(
            f.orchestrator.resolve("main", None).unwrap_err(),
            StoreError::AgentTokenExpired
        ));
    }

    #[test]
    fn unknown_agent_token_rejected() {
        let f = fixture(AuthEnv {
            agent_token: Some(SecretBytes::new(b"never-created".to_vec())),
            agent_xpub: None,
        });
        assert!(matches!(
            f.orchestrator.resolve("main", None).unwrap_err(),
            StoreError::AgentTokenInvalid
        ));
    }

    #[test]
    fn xpub_mode_has_no_seed_and_denies_spends() {
        // Build a real xpub from the test seed.
        let xpub = sigil_keys::xpub::derive_account_xpub(&seed(), Chain::Bsv, 0).unwrap();
        let f = fixture(AuthEnv {
            agent_token: None,
            agent_xpub: Some(xpub.clone()),
        });

        let ctx = f.orchestrator.resolve("main", None).unwrap();
        assert_eq!(ctx.mode, AuthMode::Xpub);
        assert!(ctx.seed.is_none());
        assert_eq!(ctx.xpub.as_deref(), Some(xpub.as_str()));
        assert!(matches!(
            ctx.require_seed().unwrap_err(),
            StoreError::AgentXpubWriteDenied
        ));
    }

    #[test]
    fn invalid_xpub_rejected() {
        let f = fixture(AuthEnv {
            agent_token: None,
            agent_xpub: Some("xprv-garbage".to_string()),
        });
        assert!(matches!(
            f.orchestrator.resolve("main", None).unwrap_err(),
            StoreError::AgentXpubInvalid(_)
        ));
    }

    #[test]
    fn agent_token_wins_over_xpub() {
        let token = SecretBytes::new(b"robot-token".to_vec());
        let xpub = sigil_keys::xpub::derive_account_xpub(&seed(), Chain::Bsv, 0).unwrap();
        let f = fixture(AuthEnv {
            agent_token: Some(token.clone()),
            agent_xpub: Some(xpub),
        });
        f.orchestrator
            .agents
            .create_credential(
                "bot",
                "main",
                vec![Chain::Bsv],
                None,
                AgentPolicy::default(),
                &token,
                &seed(),
            )
            .unwrap();

        let ctx = f.orchestrator.resolve("main", None).unwrap();
        assert_eq!(ctx.mode, AuthMode::AgentToken);
    }

    #[test]
    fn require_seed_on_password_context() {
        let f = fixture(AuthEnv::default());
        let ctx = f.orchestrator.resolve("main", Some(&*f.prompt)).unwrap();
        assert!(ctx.require_seed().is_ok());
    }
}
