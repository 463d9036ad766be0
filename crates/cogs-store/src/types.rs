use cogs_core::StoreConfig;

/// Per-write attributes. Mirrors the medium's cookie attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Lifetime in days. Positive expires that many days out, zero writes a
    /// session-scoped entry, negative expires immediately (a delete).
    pub days: i32,
    /// `path=` attribute.
    pub path: String,
    /// Optional `domain=` attribute.
    pub domain: Option<String>,
    /// Whether to append the bare `secure` attribute.
    pub secure: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            days: 7,
            path: "/".to_string(),
            domain: None,
            secure: false,
        }
    }
}

impl WriteOptions {
    /// Default options with a specific lifetime.
    pub fn days(days: i32) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    /// The expired variant of these options, used to erase an entry while
    /// keeping its path/domain scope.
    pub(crate) fn expired(&self) -> Self {
        Self {
            days: -1,
            ..self.clone()
        }
    }
}

impl From<&StoreConfig> for WriteOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            days: config.ttl_days,
            path: config.path.clone(),
            domain: None,
            secure: false,
        }
    }
}

/// Arithmetic applied by [`CookieStore::modify`] between the stored number
/// and an operand.
///
/// [`CookieStore::modify`]: crate::CookieStore::modify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ModifyOp {
    pub(crate) fn apply(self, current: f64, operand: f64) -> f64 {
        match self {
            ModifyOp::Add => current + operand,
            ModifyOp::Sub => current - operand,
            ModifyOp::Mul => current * operand,
            ModifyOp::Div => current / operand,
        }
    }
}
