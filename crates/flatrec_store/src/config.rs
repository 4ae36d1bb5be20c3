//! Store configuration.

use std::fmt;
use std::ops::BitOr;
use std::path::PathBuf;

/// Default size limit in kilobytes (1 GiB).
pub const DEFAULT_MAX_DB_SIZE_KB: u64 = 1024 * 1024;

/// Default number of concurrent read transactions.
pub const DEFAULT_MAX_READERS: u32 = 126;

/// Default unix mode for created files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Diagnostic logging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DebugFlags(u32);

impl DebugFlags {
    /// Log begin/end of read transactions.
    pub const LOG_TRANSACTIONS_READ: Self = Self(1);
    /// Log begin/end of write transactions.
    pub const LOG_TRANSACTIONS_WRITE: Self = Self(2);
    /// Log executed queries.
    pub const LOG_QUERIES: Self = Self(4);
    /// Log query parameter values along with queries.
    pub const LOG_QUERY_PARAMETERS: Self = Self(8);

    /// No flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from raw bits. Unknown bits are kept.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for DebugFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.0)
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the data file. `None` keeps everything in memory.
    pub directory: Option<PathBuf>,

    /// Size limit in kilobytes (0 = [`DEFAULT_MAX_DB_SIZE_KB`]).
    pub max_db_size_kb: u64,

    /// Unix mode for created files (0 = [`DEFAULT_FILE_MODE`]).
    pub file_mode: u32,

    /// Maximum concurrent read transactions (0 = [`DEFAULT_MAX_READERS`]).
    pub max_readers: u32,

    /// Whether to fsync the data file on every commit.
    pub sync_on_commit: bool,

    /// Diagnostic logging switches.
    pub debug_flags: DebugFlags,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_db_size_kb: 0,
            file_mode: 0,
            max_readers: 0,
            sync_on_commit: true,
            debug_flags: DebugFlags::empty(),
        }
    }
}

impl StoreConfig {
    /// Creates a new in-memory configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory.
    #[must_use]
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Sets the size limit in kilobytes.
    #[must_use]
    pub const fn max_db_size_kb(mut self, size_kb: u64) -> Self {
        self.max_db_size_kb = size_kb;
        self
    }

    /// Sets the unix mode for created files.
    #[must_use]
    pub const fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Sets the maximum number of concurrent read transactions.
    #[must_use]
    pub const fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the diagnostic logging switches.
    #[must_use]
    pub const fn debug_flags(mut self, flags: DebugFlags) -> Self {
        self.debug_flags = flags;
        self
    }

    /// Size limit in bytes, with the default applied.
    #[must_use]
    pub const fn max_db_size_bytes(&self) -> u64 {
        let kb = if self.max_db_size_kb == 0 {
            DEFAULT_MAX_DB_SIZE_KB
        } else {
            self.max_db_size_kb
        };
        kb.saturating_mul(1024)
    }

    /// Reader limit, with the default applied.
    #[must_use]
    pub const fn effective_max_readers(&self) -> u32 {
        if self.max_readers == 0 {
            DEFAULT_MAX_READERS
        } else {
            self.max_readers
        }
    }

    /// File mode, with the default applied.
    #[must_use]
    pub const fn effective_file_mode(&self) -> u32 {
        if self.file_mode == 0 {
            DEFAULT_FILE_MODE
        } else {
            self.file_mode
        }
    }
}
