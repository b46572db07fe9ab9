//! Static builtin module registry.
//!
//! Maps reserved `node:`-prefixed names (and their bare aliases) to the
//! export names each builtin provides. The table is static; redirection is
//! only possible through the resolve-hook path, whose returned identity is
//! authoritative.

use crate::identity::ModuleIdentity;

/// A registered builtin module.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinModule {
    /// Bare name (`zlib`, not `node:zlib`).
    pub name: &'static str,
    /// Export names the builtin's namespace carries.
    pub exports: &'static [&'static str],
}

/// Builtin table entries.
static BUILTINS: &[BuiltinModule] = &[
    BuiltinModule {
        name: "assert",
        exports: &[
            "ok", "equal", "notEqual", "strictEqual", "notStrictEqual", "deepStrictEqual",
            "throws", "rejects", "fail", "match", "AssertionError",
        ],
    },
    BuiltinModule {
        name: "buffer",
        exports: &["Buffer", "SlowBuffer", "constants", "kMaxLength"],
    },
    BuiltinModule {
        name: "events",
        exports: &["EventEmitter", "once", "on", "captureRejections"],
    },
    BuiltinModule {
        name: "fs",
        exports: &[
            "readFileSync", "writeFileSync", "existsSync", "mkdirSync", "readdirSync",
            "statSync", "promises", "constants",
        ],
    },
    BuiltinModule {
        name: "os",
        exports: &["platform", "arch", "cpus", "homedir", "tmpdir", "EOL"],
    },
    BuiltinModule {
        name: "path",
        exports: &[
            "join", "resolve", "dirname", "basename", "extname", "normalize", "isAbsolute",
            "relative", "parse", "format", "sep", "delimiter", "posix", "win32",
        ],
    },
    BuiltinModule {
        name: "process",
        exports: &["argv", "env", "cwd", "exit", "platform", "version", "nextTick"],
    },
    BuiltinModule {
        name: "url",
        exports: &["URL", "URLSearchParams", "fileURLToPath", "pathToFileURL", "domainToASCII"],
    },
    BuiltinModule {
        name: "util",
        exports: &["format", "inspect", "promisify", "callbackify", "types", "TextDecoder"],
    },
    BuiltinModule {
        name: "zlib",
        exports: &[
            "deflateSync", "inflateSync", "gzipSync", "gunzipSync", "brotliCompressSync",
            "brotliDecompressSync", "constants",
        ],
    },
];

/// Read-only registry over the static builtin table.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRegistry;

impl BuiltinRegistry {
    /// Create a registry over the static table.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Look up a builtin by bare name or `node:`-prefixed name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static BuiltinModule> {
        let bare = name.strip_prefix("node:").unwrap_or(name);
        BUILTINS.iter().find(|b| b.name == bare)
    }

    /// Whether the name (bare or prefixed) is a registered builtin.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Canonical identity for a registered builtin name.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<ModuleIdentity> {
        self.get(name).map(|b| ModuleIdentity::builtin(b.name))
    }

    /// Iterate all registered builtins.
    pub fn iter(&self) -> impl Iterator<Item = &'static BuiltinModule> {
        BUILTINS.iter()
    }
}
