//! Application constants
//!
//! Centralized location for the platform constants the signing, ticket and
//! login flows depend on. These values are fixed by the remote platform.

// Signing
/// Permutation applied to `img_key + sub_key` to derive the mixin key.
pub const MIXIN_KEY_ENC_TAB: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];
/// Mixin key is the first this-many permuted characters.
pub const MIXIN_KEY_LEN: usize = 32;
/// Stripped from parameter values before signing.
pub const SIGN_SANITIZE_CHARS: [char; 5] = ['!', '\'', '(', ')', '*'];
pub const PARAM_WTS: &str = "wts";
pub const PARAM_W_RID: &str = "w_rid";
/// Signing keys older than this are refreshed before use.
pub const SIGNED_KEY_TTL_SECS: i64 = 3600;
/// Longest accepted task interval (366 days).
pub const MAX_TASK_INTERVAL_SECS: u64 = 366 * 24 * 3600;

// Ticket
pub const TICKET_HMAC_SECRET: &str = "XgwSnGZ1p";
/// `key_id` sent with the ticket request.
pub const TICKET_KEY_ID: &str = "ec02";
pub const TICKET_COOKIE: &str = "bili_ticket";
pub const CSRF_COOKIE: &str = "bili_jct";

// Remote status codes
pub const CODE_OK: i64 = 0;
pub const CODE_AUTH_DENIED: i64 = -403;
pub const CODE_SIGNATURE_REJECTED: i64 = -352;
pub const CODE_NOT_FOUND: i64 = 404;
/// Some endpoints report a missing resource with the negated code.
pub const CODE_NOT_FOUND_NEG: i64 = -404;

// QR login poll codes
pub const QR_CODE_SUCCESS: i64 = 0;
pub const QR_CODE_EXPIRED: i64 = 86038;
pub const QR_CODE_SCANNED: i64 = 86090;
pub const QR_CODE_NOT_SCANNED: i64 = 86101;

// Endpoints (relative to the configured bases)
pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";
pub const DEFAULT_PASSPORT_BASE: &str = "https://passport.bilibili.com";
pub const NAV_PATH: &str = "/x/web-interface/nav";
pub const TICKET_PATH: &str = "/bapis/bilibili.api.ticket.v1.Ticket/GenWebTicket";
pub const QR_GENERATE_PATH: &str = "/x/passport-login/web/qrcode/generate";
pub const QR_POLL_PATH: &str = "/x/passport-login/web/qrcode/poll";

// Browser-like headers
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.bilibili.com/";
pub const DEFAULT_ORIGIN: &str = "https://www.bilibili.com";

// Diagnostics
/// Failed response bodies are logged up to this many bytes.
pub const MAX_LOGGED_BODY_BYTES: usize = 2048;
