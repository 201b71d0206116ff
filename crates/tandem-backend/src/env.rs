//! Environment passed to child processes.
//!
//! Children get an allow-listed subset of the parent environment: shell
//! basics, proxy settings and provider credentials.

/// Variables copied verbatim when present.
const ALLOWED_VARS: &[&str] = &[
    // Shell basics
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "TERM",
    "TMPDIR",
    "TZ",
    // Windows essentials
    "SYSTEMROOT",
    "SystemRoot",
    "COMSPEC",
    "PATHEXT",
    "USERPROFILE",
    "APPDATA",
    "LOCALAPPDATA",
    "TEMP",
    "TMP",
    // Proxies
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "all_proxy",
    // Certificates
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "NODE_EXTRA_CA_CERTS",
];

/// Prefixes whose variables are copied (locale, XDG dirs, provider settings).
const ALLOWED_PREFIXES: &[&str] = &["LC_", "XDG_", "GEMINI_", "GOOGLE_", "OPENAI_", "CODEX_"];

/// Whether a variable may be passed to a child process.
pub fn is_allowed(name: &str) -> bool {
    ALLOWED_VARS.contains(&name) || ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Filter an environment down to the allow-list.
pub fn filter_env<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter().filter(|(k, _)| is_allowed(k)).collect()
}

/// The current process environment, filtered.
pub fn child_env() -> Vec<(String, String)> {
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    filter_env(vars)
}
