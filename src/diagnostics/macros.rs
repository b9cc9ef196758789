//! Diagnostic macros for user-facing API.
//!
//! Adapter authors use these to report misuse in the same format as the
//! tracker itself.

/// Emit a runtime diagnostic.
///
/// # Example
///
/// ```rust,ignore
/// mt_diagnostic!(
///     Error,
///     code = "MT950",
///     message = "arena handed back a block it never allocated",
///     note = "the address is not inside any arena chunk",
///     help = "release the block with memtrack::free() instead"
/// );
/// ```
#[macro_export]
macro_rules! mt_diagnostic {
    (
        $kind:ident,
        code = $code:expr,
        message = $msg:expr
        $(, note = $note:expr)?
        $(, help = $help:expr)?
        $(, context = $ctx:expr)?
    ) => {{
        let diag = $crate::diagnostics::Diagnostic {
            kind: $crate::diagnostics::DiagnosticKind::$kind,
            code: $code,
            message: $msg,
            note: None $(.or(Some($note)))?,
            help: None $(.or(Some($help)))?,
        };
        let context: Option<&str> = None $(.or(Some(&*$ctx)))?;
        match context {
            Some(context) => $crate::diagnostics::emit::emit_with_context(&diag, context),
            None => $crate::diagnostics::emit::emit(&diag),
        }
    }};
}

/// Emit a predefined diagnostic by code.
///
/// # Example
///
/// ```rust,ignore
/// mt_emit!(MT203);
/// mt_emit!(MT205, format!("{} address={:#x}", site, addr));
/// ```
#[macro_export]
macro_rules! mt_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
    ($code:ident, $ctx:expr) => {{
        $crate::diagnostics::emit::emit_with_context(&$crate::diagnostics::$code, &$ctx);
    }};
}

/// Assert a condition or emit a diagnostic.
///
/// # Example
///
/// ```rust,ignore
/// mt_assert!(alignment.is_power_of_two(), MT401);
/// ```
#[macro_export]
macro_rules! mt_assert {
    ($cond:expr, $code:ident) => {{
        if !$cond {
            $crate::mt_emit!($code);
        }
    }};
    ($cond:expr, $code:ident, $ctx:expr) => {{
        if !$cond {
            $crate::mt_emit!($code, $ctx);
        }
    }};
}

// Re-export macros at crate root for convenience
pub use crate::{mt_assert, mt_diagnostic, mt_emit};
