/// Application name
pub const APP_NAME: &str = "chatsync";

/// Default REST base URL (local development server)
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

/// Default realtime endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Query parameter carrying the credential during the WebSocket handshake
pub const WS_TOKEN_PARAM: &str = "token";

/// Realtime event type tags
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_UNREAD_UPDATE: &str = "unread_update";

/// Response envelope codes returned by the chat server
pub const CODE_SUCCESS: i64 = 1000;
pub const CODE_INVALID_PARAM: i64 = 1001;
pub const CODE_IS_NOT_FRIEND: i64 = 1009;
pub const CODE_NEED_LOGIN: i64 = 1013;
pub const CODE_INVALID_TOKEN: i64 = 1014;

/// Messages closer together than this share one visible timestamp
pub const DEFAULT_GROUPING_GAP_SECS: i64 = 5 * 60;

/// Avatar shown when neither the session nor the payload carries one
pub const DEFAULT_AVATAR_URL: &str = "/static/images/default-avatar.png";

/// Reconnect backoff defaults
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Largest attachment the server accepts (10 MiB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Bounded channel capacity between the transport task and the application
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

/// Prefix of identifiers derived from payload contents when the server omits one
pub const FINGERPRINT_ID_PREFIX: &str = "h:";
