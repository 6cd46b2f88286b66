use std::fmt;

/// Logical broadcast topics. A room only exists in the registry under its
/// site-qualified key (`<site>:<topic>`), which is also the form relay
/// messages address rooms by, so events can never leak across tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Room {
    /// Session-specific deliveries for one user.
    User(String),
    /// Every connection of the site, including guests.
    Website,
    /// Site-wide room joined by system users only.
    All,
    /// List-update subscribers for one doctype.
    Doctype(String),
    /// Document-level update subscribers.
    Doc { doctype: String, docname: String },
    /// Presence: who currently has the document open.
    OpenDoc { doctype: String, docname: String },
    /// Progress stream of one long-running task.
    TaskProgress(String),
}

impl Room {
    pub fn user(user: impl Into<String>) -> Self {
        Room::User(user.into())
    }

    pub fn doctype(doctype: impl Into<String>) -> Self {
        Room::Doctype(doctype.into())
    }

    pub fn doc(doctype: impl Into<String>, docname: impl Into<String>) -> Self {
        Room::Doc {
            doctype: doctype.into(),
            docname: docname.into(),
        }
    }

    pub fn open_doc(doctype: impl Into<String>, docname: impl Into<String>) -> Self {
        Room::OpenDoc {
            doctype: doctype.into(),
            docname: docname.into(),
        }
    }

    pub fn task_progress(task_id: impl Into<String>) -> Self {
        Room::TaskProgress(task_id.into())
    }

    /// Registry key for this room within `site`.
    pub fn key(&self, site: &str) -> String {
        format!("{site}:{self}")
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(user) => write!(f, "user:{user}"),
            Room::Website => write!(f, "website"),
            Room::All => write!(f, "all"),
            Room::Doctype(doctype) => write!(f, "doctype:{doctype}"),
            Room::Doc { doctype, docname } => write!(f, "doc:{doctype}/{docname}"),
            Room::OpenDoc { doctype, docname } => write!(f, "open_doc:{doctype}/{docname}"),
            Room::TaskProgress(task_id) => write!(f, "task_progress:{task_id}"),
        }
    }
}
