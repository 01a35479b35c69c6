/// Browser-like request headers sent by every connector. Several civic
/// listing sites answer 403 to the default reqwest user agent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";
pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.8,it;q=0.5,de;q=0.3";

/// Directory scanned for per-source registry documents.
pub const SOURCE_REGISTRY_DIR: &str = "registry/sources";

/// Fallback country when a source document carries none. Kept deliberately
/// explicit so no event ever reaches the store without a country code.
pub const DEFAULT_COUNTRY: &str = "IT";
