//! Outcome classification: from a handler's return value or error to an
//! HTTP status code.

use std::convert::Infallible;
use std::error::Error as StdError;

use http::StatusCode;

pub const OK: u16 = 200;
pub const NO_CONTENT: u16 = 204;
pub const INTERNAL_SERVER_ERROR: u16 = 500;
/// Recorded when an invocation ends without an outcome (dropped mid-flight).
pub const UNDETERMINED: u16 = 0;

/// Shape of a handler's successful return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returned {
    /// A response object carrying its own status.
    Response(u16),
    /// Nothing was returned.
    Empty,
    /// Any other value.
    Value,
}

impl Returned {
    pub fn status(self) -> u16 {
        match self {
            Returned::Response(status) => status,
            Returned::Empty => NO_CONTENT,
            Returned::Value => OK,
        }
    }
}

/// Implemented by every type a timed handler may return.
pub trait HandlerReturn {
    fn returned(&self) -> Returned;
}

impl HandlerReturn for () {
    fn returned(&self) -> Returned {
        Returned::Empty
    }
}

impl<T: HandlerReturn> HandlerReturn for Option<T> {
    fn returned(&self) -> Returned {
        self.as_ref().map_or(Returned::Empty, HandlerReturn::returned)
    }
}

impl HandlerReturn for StatusCode {
    fn returned(&self) -> Returned {
        Returned::Response(self.as_u16())
    }
}

impl<B> HandlerReturn for http::Response<B> {
    fn returned(&self) -> Returned {
        Returned::Response(self.status().as_u16())
    }
}

impl<T> HandlerReturn for (StatusCode, T) {
    fn returned(&self) -> Returned {
        Returned::Response(self.0.as_u16())
    }
}

impl HandlerReturn for serde_json::Value {
    fn returned(&self) -> Returned {
        if self.is_null() {
            Returned::Empty
        } else {
            Returned::Value
        }
    }
}

#[cfg(feature = "axum")]
impl<T> HandlerReturn for axum::Json<T> {
    fn returned(&self) -> Returned {
        Returned::Value
    }
}

macro_rules! value_return {
    ($($t:ty),+) => {
        $(
            impl HandlerReturn for $t {
                fn returned(&self) -> Returned {
                    Returned::Value
                }
            }
        )+
    };
}

value_return!(
    String, &'static str, bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64
);

impl<T> HandlerReturn for Vec<T> {
    fn returned(&self) -> Returned {
        Returned::Value
    }
}

/// Implemented by every error type a timed handler may fail with.
///
/// Errors that already carry an HTTP response (web application errors)
/// report its status here; everything else goes through the
/// [`StatusClassifier`].
pub trait HandlerFailure: StdError + 'static {
    fn carried_status(&self) -> Option<u16> {
        None
    }
}

impl HandlerFailure for Infallible {}
impl HandlerFailure for std::io::Error {}
impl HandlerFailure for serde_json::Error {}

/// Lookup from error to response status (the exception-mapper table).
pub trait StatusClassifier: Send + Sync {
    fn find(&self, error: &(dyn StdError + 'static)) -> Option<u16>;
}

/// How a handler error was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The error carried its own response.
    Carried(u16),
    /// The mapping table resolved it.
    Mapped(u16),
    /// Nothing matched.
    Unmapped,
}

impl Classification {
    pub fn status(self) -> u16 {
        match self {
            Classification::Carried(s) | Classification::Mapped(s) => s,
            Classification::Unmapped => INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn classify<E: HandlerFailure>(error: &E, classifier: &dyn StatusClassifier) -> Classification {
    if let Some(status) = error.carried_status() {
        return Classification::Carried(status);
    }
    match classifier.find(error) {
        Some(status) => Classification::Mapped(status),
        None => Classification::Unmapped,
    }
}

type Mapper = Box<dyn Fn(&(dyn StdError + 'static)) -> Option<u16> + Send + Sync>;

struct MapperEntry {
    error_type: &'static str,
    map: Mapper,
}

/// Ordered table of typed exception mappers.
///
/// `find` walks the error and then its `source()` chain, nearest first; at
/// each level the mappers are tried in registration order.
#[derive(Default)]
pub struct ExceptionMappers {
    entries: Vec<MapperEntry>,
}

impl ExceptionMappers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map errors of type `E` through `f`.
    pub fn register<E, F>(&mut self, f: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> u16 + Send + Sync + 'static,
    {
        self.entries.push(MapperEntry {
            error_type: std::any::type_name::<E>(),
            map: Box::new(move |err| err.downcast_ref::<E>().map(&f)),
        });
        self
    }

    /// Map every error of type `E` to a fixed status.
    pub fn register_status<E>(&mut self, status: u16) -> &mut Self
    where
        E: StdError + 'static,
    {
        self.register::<E, _>(move |_| status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered error type names, in registration order.
    pub fn error_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.error_type)
    }
}

impl StatusClassifier for ExceptionMappers {
    fn find(&self, error: &(dyn StdError + 'static)) -> Option<u16> {
        let mut current = Some(error);
        while let Some(err) = current {
            if let Some(status) = self.entries.iter().find_map(|e| (e.map)(err)) {
                return Some(status);
            }
            current = err.source();
        }
        None
    }
}

impl std::fmt::Debug for ExceptionMappers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.error_types()).finish()
    }
}
