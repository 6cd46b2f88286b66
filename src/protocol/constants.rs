// Client-emitted event names.
pub const EVENT_PING: &str = "ping";
pub const EVENT_DOCTYPE_SUBSCRIBE: &str = "doctype_subscribe";
pub const EVENT_DOCTYPE_UNSUBSCRIBE: &str = "doctype_unsubscribe";
pub const EVENT_TASK_SUBSCRIBE: &str = "task_subscribe";
/// Legacy alias for `task_subscribe`, still sent by older clients.
pub const EVENT_PROGRESS_SUBSCRIBE: &str = "progress_subscribe";
pub const EVENT_TASK_UNSUBSCRIBE: &str = "task_unsubscribe";
pub const EVENT_DOC_SUBSCRIBE: &str = "doc_subscribe";
pub const EVENT_DOC_UNSUBSCRIBE: &str = "doc_unsubscribe";
pub const EVENT_DOC_OPEN: &str = "doc_open";
pub const EVENT_DOC_CLOSE: &str = "doc_close";

// Gateway-emitted event names.
pub const EVENT_PONG: &str = "pong";
pub const EVENT_DOC_VIEWERS: &str = "doc_viewers";

/// Header a reverse proxy may set to name the tenant site explicitly.
pub const SITE_NAME_HEADER: &str = "x-site-name";

/// `user_type` value granting membership of the site-wide `all` room.
pub const SYSTEM_USER_TYPE: &str = "System User";
