//! Wallet-wide constants. Monetary values are in each chain's minimal unit.

/// Directory under the user's home holding all Sigil state.
pub const HOME_DIR_NAME: &str = ".sigil";

/// Extension for encrypted wallet files.
pub const WALLET_FILE_EXT: &str = "wallet";

/// Extension for session files.
pub const SESSION_FILE_EXT: &str = "session";

/// Extension for agent credential files.
pub const AGENT_FILE_EXT: &str = "agent";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

/// Maximum wallet name length in characters.
pub const MAX_WALLET_NAME_LEN: usize = 64;

/// Default BIP-44 address gap limit for discovery scans.
pub const ADDRESS_GAP: u32 = 20;

/// Number of BIP-39 words in a default mnemonic.
pub const DEFAULT_MNEMONIC_WORDS: usize = 12;

/// scrypt work factor (log2 N) for production key derivation.
pub const KDF_LOG_N: u8 = 17;

/// Lowered scrypt work factor for tests.
pub const KDF_LOG_N_TEST: u8 = 10;

/// scrypt block size parameter.
pub const KDF_R: u8 = 8;

/// scrypt parallelism parameter.
pub const KDF_P: u8 = 1;

/// Minimum session time-to-live in seconds.
pub const SESSION_TTL_MIN_SECS: u64 = 60;

/// Maximum session time-to-live in seconds.
pub const SESSION_TTL_MAX_SECS: u64 = 60 * 60;

/// Default session time-to-live in seconds.
pub const SESSION_TTL_DEFAULT_SECS: u64 = 15 * 60;

/// OS keyring service name for session keys.
pub const KEYRING_SERVICE: &str = "sigil-session";

/// OS keyring service name used only for the availability probe.
pub const KEYRING_PROBE_SERVICE: &str = "sigil-session-probe";

/// Keyring availability probe deadline in seconds.
pub const KEYRING_PROBE_TIMEOUT_SECS: u64 = 3;

/// Maximum concurrent network requests during refresh and discovery.
pub const MAX_CONCURRENT_REQUESTS: usize = 8;

/// Network retry attempts for idempotent reads.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Base network retry delay in milliseconds.
pub const RETRY_BASE_MS: u64 = 500;

/// Network retry delay cap in milliseconds.
pub const RETRY_CAP_MS: u64 = 8_000;

/// Default miner quorum for the `normal` BSV fee strategy.
pub const DEFAULT_MIN_MINERS: usize = 2;

/// Balance cache staleness threshold for dormant addresses, in seconds.
pub const CACHE_DORMANT_TTL_SECS: i64 = 30 * 60;

/// Balance cache staleness threshold for never-used addresses, in seconds.
pub const CACHE_NEVER_USED_TTL_SECS: i64 = 2 * 60 * 60;

/// Age under which an address is considered `recent`, in seconds.
pub const CACHE_RECENT_AGE_SECS: i64 = 24 * 60 * 60;

/// Unix permission bits for secret-bearing files.
pub const FILE_MODE_SECRET: u32 = 0o600;

/// Unix permission bits for the shared balance cache file.
pub const FILE_MODE_CACHE: u32 = 0o640;

/// Unix permission bits for Sigil-owned directories.
pub const DIR_MODE: u32 = 0o750;
