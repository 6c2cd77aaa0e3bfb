use std::fmt;

// ── Requests ────────────────────────────────────────────────────

/// Wire shape of a scheduled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetJson,
    GetText,
    PostJson,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetJson => "GET",
            Self::GetText => "GET_PLAIN",
            Self::PostJson => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical slot a request is deduplicated under.
///
/// The same name used with different methods gives independent slots, so a
/// `get("jobs")` never overwrites a pending `post("jobs")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub method: Method,
    pub name: String,
}

impl SlotKey {
    pub fn new(method: Method, name: impl Into<String>) -> Self {
        Self {
            method,
            name: name.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.name)
    }
}

// ── Status ──────────────────────────────────────────────────────

/// Load reported by one source of work (local requests or a sibling manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Load {
    #[default]
    Idle,
    /// Always at least one.
    Busy(u32),
    Error,
}

impl Load {
    /// Map a signed count to a load; negative counts are the error sentinel.
    pub fn from_count(n: i64) -> Self {
        match n {
            n if n < 0 => Self::Error,
            0 => Self::Idle,
            n => Self::Busy(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }

    /// Inverse of [`Load::from_count`], with `-1` for error.
    pub fn as_count(&self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Busy(n) => i64::from(*n),
            Self::Error => -1,
        }
    }

    /// Combine two sources: error wins, otherwise counts add up.
    pub fn merge(self, other: Load) -> StatusDisplay {
        match (self, other) {
            (Self::Error, _) | (_, Self::Error) => StatusDisplay::Error,
            (a, b) => {
                let total = a.as_count() + b.as_count();
                if total > 0 {
                    StatusDisplay::Busy {
                        count: u32::try_from(total).unwrap_or(u32::MAX),
                    }
                } else {
                    StatusDisplay::Idle
                }
            }
        }
    }
}

/// What the status surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplay {
    #[default]
    Idle,
    Busy { count: u32 },
    Error,
}

impl StatusDisplay {
    /// The "x3" style label shown next to the spinner when more than one
    /// request is outstanding.
    pub fn count_label(&self) -> Option<String> {
        match self {
            Self::Busy { count } if *count > 1 => Some(format!("x{count}")),
            _ => None,
        }
    }
}

impl fmt::Display for StatusDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Busy { .. } => match self.count_label() {
                Some(label) => write!(f, "busy {label}"),
                None => f.write_str("busy"),
            },
            Self::Error => f.write_str("error"),
        }
    }
}

// ── Query arguments ─────────────────────────────────────────────

/// A query argument value. `Absent` drops the key from the query string,
/// which is different from an empty `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Text(String),
    Absent,
}

impl QueryValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Absent => None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for QueryValue {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

macro_rules! query_value_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for QueryValue {
                fn from(v: $t) -> Self {
                    Self::Text(v.to_string())
                }
            }
        )*
    };
}

query_value_from_display!(i32, i64, u32, u64, usize, f64, bool);

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Absent)
    }
}

/// Insertion-ordered query arguments. Setting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryArgs {
    entries: Vec<(String, QueryValue)>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`QueryArgs::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The text value of `key`, treating `Absent` like a missing key.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(QueryValue::as_text)
    }

    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.set(k, v);
        }
        args
    }
}
