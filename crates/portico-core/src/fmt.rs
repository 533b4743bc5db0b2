//! Formatting helpers used when logging

use std::{error, fmt, result};

pub type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = result::Result<T, BoxedError>;

/// Display an error together with its whole `source()` chain on one line
pub struct FmtCompactError<'e, E: ?Sized>(pub &'e E);

impl<E> fmt::Display for FmtCompactError<'_, E>
where
    E: error::Error + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

pub trait FmtCompact {
    type Report: fmt::Display;
    fn fmt_compact(self) -> Self::Report;
}

impl<'e, E> FmtCompact for &'e E
where
    E: error::Error + ?Sized,
{
    type Report = FmtCompactError<'e, E>;

    fn fmt_compact(self) -> Self::Report {
        FmtCompactError(self)
    }
}

/// Short, non-secret hint of a bearer token: a few leading characters and
/// the total length
pub struct FmtTokenHint<'t>(pub &'t str);

const TOKEN_HINT_PREFIX_LEN: usize = 6;

impl fmt::Display for FmtTokenHint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.chars().count();
        if len <= TOKEN_HINT_PREFIX_LEN * 2 {
            return write!(f, "***({len})");
        }
        let prefix: String = self.0.chars().take(TOKEN_HINT_PREFIX_LEN).collect();
        write!(f, "{prefix}…({len})")
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[derive(Debug)]
    struct Outer(io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("outer failed")
        }
    }

    impl error::Error for Outer {
        fn source(&self) -> Option<&(dyn error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test_log::test]
    fn compact_error_includes_sources() {
        let err = Outer(io::Error::other("disk on fire"));

        assert_eq!(err.fmt_compact().to_string(), "outer failed: disk on fire");

        let boxed: BoxedError = Box::new(err);
        assert_eq!(
            boxed.as_ref().fmt_compact().to_string(),
            "outer failed: disk on fire"
        );
    }

    #[test_log::test]
    fn token_hint() {
        assert_eq!(FmtTokenHint("short").to_string(), "***(5)");
        assert_eq!(
            FmtTokenHint("abcdefghijklmnopqrstuvwxyz").to_string(),
            "abcdef…(26)"
        );
    }
}
