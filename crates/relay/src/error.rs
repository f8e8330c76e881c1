use {crosstalk_channels::ProvisionError, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store operation failed: {message}")]
    Store { message: String },

    #[error("failed to provision endpoint for {group_id}: {source}")]
    Provision {
        group_id: String,
        #[source]
        source: ProvisionError,
    },

    #[error("relay is not enabled in {group_id}")]
    NotEnabled { group_id: String },

    #[error("user {user_id} is already banned")]
    AlreadyBanned { user_id: String },

    #[error("user {user_id} is not banned")]
    NotBanned { user_id: String },

    #[error("permission denied: {action} requires {required}")]
    PermissionDenied {
        action: &'static str,
        required: &'static str,
    },

    #[error("relay queue is closed")]
    QueueClosed,
}

impl Error {
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn provision(group_id: impl Into<String>, source: ProvisionError) -> Self {
        Self::Provision {
            group_id: group_id.into(),
            source,
        }
    }

    #[must_use]
    pub fn not_enabled(group_id: impl Into<String>) -> Self {
        Self::NotEnabled {
            group_id: group_id.into(),
        }
    }

    #[must_use]
    pub fn already_banned(user_id: impl Into<String>) -> Self {
        Self::AlreadyBanned {
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn not_banned(user_id: impl Into<String>) -> Self {
        Self::NotBanned {
            user_id: user_id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
