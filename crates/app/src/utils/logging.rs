use bilimon_domain::BiliMonError;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,bilimon=debug";

/// Install the global subscriber.
///
/// `RUST_LOG` selects levels; `BILIMON_LOG_FORMAT=json` switches to
/// one JSON object per line. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("BILIMON_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Convert a `BiliMonError` into a stable label suitable for logging.
#[inline]
pub const fn error_label(error: &BiliMonError) -> &'static str {
    match error {
        BiliMonError::Config(_) => "config",
        BiliMonError::Io(_) => "io",
        BiliMonError::Network(_) => "network",
        BiliMonError::Auth(_) => "auth",
        BiliMonError::NotAuthenticated(_) => "not_authenticated",
        BiliMonError::NotFound(_) => "not_found",
        BiliMonError::InvalidInput(_) => "invalid_input",
        BiliMonError::Serialization(_) => "serialization",
        BiliMonError::Internal(_) => "internal",
    }
}
