//! Record store configuration.

/// Configuration for opening a [`SyncTable`](crate::SyncTable).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to sync the journal log to durable storage on every commit.
    pub sync_on_commit: bool,

    /// Field names declared for the collection.
    ///
    /// When non-empty, local inserts naming any other field are rejected.
    /// Remote changes are accepted as sent.
    pub fields: Vec<String>,

    /// Whether to create the collection directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            fields: Vec::new(),
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync the journal log on every commit.
    #[must_use]
    pub fn with_sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Declares the collection's field names.
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether to create a missing collection directory.
    #[must_use]
    pub fn with_create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Returns true if `name` may be written by a local insert.
    #[must_use]
    pub fn allows_field(&self, name: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == name)
    }
}
